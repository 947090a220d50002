//! Session management: per-viewer projections and broadcast fan-out.
//!
//! A [`Session`] maps connected client IDs to their projection functions
//! and turns pending state changes into per-client patch bytes. Lock order
//! is always session → state; the session lock is held across the whole
//! fan-out so every client sees the same change.

use crate::effect::Effect;
use crate::state::{Projection, State};
use crate::timer::OneShot;
use crate::{Patch, PatchOp, PrismResult};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Callback invoked with the result of a (possibly debounced) broadcast.
pub type BroadcastHook<ID> = Arc<dyn Fn(HashMap<ID, Vec<u8>>) + Send + Sync>;

/// Manages multiple client connections over one [`State`].
///
/// `ID` identifies a client; each client carries an optional projection
/// determining what it sees (`None` = the full derived state). Two clients
/// with no projection receive byte-identical diffs, computed once.
pub struct Session<T, A, ID> {
    state: Arc<State<T, A>>,
    clients: RwLock<HashMap<ID, Option<Projection<T>>>>,
    debounce: Mutex<Debounce<ID>>,
    // Handed to background timers so they can re-enter tick() without
    // keeping the session alive.
    weak_self: Weak<Self>,
}

struct Debounce<ID> {
    delay: Duration,
    timer: Option<OneShot>,
    on_broadcast: Option<BroadcastHook<ID>>,
}

impl<T, A, ID> Session<T, A, ID>
where
    T: Serialize + DeserializeOwned,
    ID: Eq + Hash + Clone,
{
    /// Create a session manager for the given state.
    ///
    /// Returns `Arc<Self>` because background timers (debounce, effect
    /// expiration) hold weak references back to the session.
    pub fn new(state: Arc<State<T, A>>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            state,
            clients: RwLock::new(HashMap::new()),
            debounce: Mutex::new(Debounce {
                delay: Duration::ZERO,
                timer: None,
                on_broadcast: None,
            }),
            weak_self: weak.clone(),
        })
    }

    /// The underlying state, for direct modification.
    #[inline]
    pub fn state(&self) -> &Arc<State<T, A>> {
        &self.state
    }

    /// Register a client with its projection. `None` means the client sees
    /// the full derived state.
    pub fn connect(&self, id: ID, projection: Option<Projection<T>>) {
        self.clients.write().insert(id, projection);
    }

    /// Remove a client.
    pub fn disconnect(&self, id: &ID) {
        self.clients.write().remove(id);
    }

    /// Whether a client is registered.
    pub fn is_connected(&self, id: &ID) -> bool {
        self.clients.read().contains_key(id)
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.read().len()
    }

    /// All connected client IDs.
    pub fn ids(&self) -> Vec<ID> {
        self.clients.read().keys().cloned().collect()
    }

    /// Full projected state for a client, as a one-element `replace` patch
    /// at the root path. Used for initial sync.
    pub fn full(&self, id: &ID) -> PrismResult<Vec<u8>> {
        let clients = self.clients.read();
        let projection = clients.get(id).cloned().flatten();
        let state = self.state.full_state(projection.as_ref());
        drop(clients);

        let patch = Patch::with_ops(vec![PatchOp::replace("", serde_json::to_value(state)?)]);
        patch.to_bytes()
    }

    /// Projected diff bytes for a client since the last broadcast. An empty
    /// patch (or no pending change) is the literal document `[]`.
    pub fn diff(&self, id: &ID) -> PrismResult<Vec<u8>> {
        let clients = self.clients.read();
        let projection = clients.get(id).cloned().flatten();
        let patch = self.state.diff(projection.as_ref())?;
        drop(clients);

        match patch {
            Some(patch) if !patch.is_empty() => patch.to_bytes(),
            _ => Ok(b"[]".to_vec()),
        }
    }

    /// Diffs for every connected client with a visible change.
    ///
    /// Clients without a projection share one cached computation. Clients
    /// whose patch comes out empty are omitted. Returns an empty map
    /// immediately when no change is pending.
    pub fn broadcast(&self) -> HashMap<ID, Vec<u8>> {
        if !self.state.has_changes() {
            return HashMap::new();
        }

        let clients = self.clients.read();
        let mut result = HashMap::with_capacity(clients.len());

        // Computed on first demand, shared by every projection-less client.
        let mut identity_diff: Option<Option<Vec<u8>>> = None;

        for (id, projection) in clients.iter() {
            let bytes = match projection {
                None => identity_diff
                    .get_or_insert_with(|| encode_diff(self.state.diff(None)))
                    .clone(),
                Some(projection) => encode_diff(self.state.diff(Some(projection))),
            };

            if let Some(bytes) = bytes {
                result.insert(id.clone(), bytes);
            }
        }

        result
    }

    /// The canonical end-of-turn sequence: reap expired effects, broadcast,
    /// clear the previous-derived snapshot.
    pub fn tick(&self) -> HashMap<ID, Vec<u8>> {
        self.state.cleanup_expired();
        let result = self.broadcast();
        self.state.clear_previous();
        result
    }

    /// Run `f` against a transaction scope, then [`tick`](Self::tick).
    ///
    /// This makes it impossible to forget the broadcast/clear pair after a
    /// batch of updates.
    ///
    /// ```ignore
    /// let diffs = session.transaction(|tx| {
    ///     tx.update(|g| g.round += 1);
    ///     tx.update(|g| g.phase = "draw".into());
    /// });
    /// ```
    pub fn transaction(&self, f: impl FnOnce(&Tx<'_, T, A>)) -> HashMap<ID, Vec<u8>> {
        f(&Tx { state: &self.state });
        self.tick()
    }

    /// Shorthand for a single update with automatic broadcast.
    pub fn apply_update(&self, f: impl FnOnce(&mut T)) -> HashMap<ID, Vec<u8>> {
        self.state.update(f);
        self.tick()
    }

    /// Set the debounce window for [`schedule_broadcast`]. Zero (the
    /// default) broadcasts synchronously.
    ///
    /// [`schedule_broadcast`]: Self::schedule_broadcast
    pub fn set_debounce(&self, delay: Duration) {
        self.debounce.lock().delay = delay;
    }

    /// Set the callback receiving the diffs of each debounced broadcast.
    pub fn set_broadcast_callback(&self, hook: impl Fn(HashMap<ID, Vec<u8>>) + Send + Sync + 'static) {
        self.debounce.lock().on_broadcast = Some(Arc::new(hook));
    }
}

impl<T, A, ID> Session<T, A, ID>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    A: Send + Sync + 'static,
    ID: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Schedule a broadcast to all clients.
    ///
    /// With no debounce configured this ticks and invokes the broadcast
    /// callback synchronously. With a debounce window, it starts (or
    /// resets) a one-shot timer; bursts of calls inside the window collapse
    /// into a single broadcast when the timer fires.
    pub fn schedule_broadcast(&self) {
        let mut debounce = self.debounce.lock();

        if debounce.delay.is_zero() {
            let hook = debounce.on_broadcast.clone();
            drop(debounce);

            let diffs = self.tick();
            if let Some(hook) = hook {
                if !diffs.is_empty() {
                    (hook.as_ref())(diffs);
                }
            }
            return;
        }

        let weak = self.weak_self.clone();
        // Replacing the handle cancels the pending timer: the reset is what
        // collapses a burst into one broadcast.
        debounce.timer = Some(OneShot::spawn(debounce.delay, move || {
            let Some(session) = weak.upgrade() else { return };

            let hook = {
                let mut debounce = session.debounce.lock();
                debounce.timer = None;
                debounce.on_broadcast.clone()
            };

            let diffs = session.tick();
            if let Some(hook) = hook {
                if !diffs.is_empty() {
                    (hook.as_ref())(diffs);
                }
            }
        }));
    }

    /// Add an effect and schedule its automatic expiration: when the effect
    /// expires, a broadcast is enqueued through
    /// [`schedule_broadcast`](Self::schedule_broadcast) so viewers see the
    /// effect disappear without polling.
    ///
    /// Effects without the scheduling capability (or without an expiration)
    /// are simply added.
    pub fn add_effect_with_expiration(
        &self,
        effect: Arc<dyn Effect<T, A>>,
        activator: Option<A>,
    ) -> PrismResult<()> {
        self.state.add_effect(effect.clone(), activator)?;

        if let Some(sched) = effect.schedulable() {
            let weak = self.weak_self.clone();
            sched.schedule_expiration(Box::new(move |id| {
                if let Some(session) = weak.upgrade() {
                    tracing::debug!(effect = %id, "timed effect expired, scheduling broadcast");
                    session.schedule_broadcast();
                }
            }));
        }

        Ok(())
    }
}

/// A transaction scope over the session's state.
///
/// All updates inside the scope are batched into the single tick that
/// follows, so they broadcast together.
pub struct Tx<'a, T, A> {
    state: &'a State<T, A>,
}

impl<T, A> Tx<'_, T, A>
where
    T: Serialize + DeserializeOwned,
{
    /// Mutate the state within the transaction.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.state.update(f);
    }

    /// Replace the entire state within the transaction.
    pub fn set(&self, value: T) {
        self.state.set(value);
    }

    /// Current state with effects applied.
    pub fn get(&self) -> T {
        self.state.get()
    }

    /// Current state without effects.
    pub fn get_base(&self) -> T {
        self.state.get_base()
    }
}

/// Turn a diff result into wire bytes, skipping empty and failed patches.
/// Failures are logged and drop the client from the broadcast rather than
/// aborting the whole fan-out.
fn encode_diff(result: PrismResult<Option<Patch>>) -> Option<Vec<u8>> {
    match result {
        Ok(Some(patch)) if !patch.is_empty() => match patch.to_bytes() {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize broadcast patch");
                None
            }
        },
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(error = %err, "failed to compute broadcast diff");
            None
        }
    }
}
