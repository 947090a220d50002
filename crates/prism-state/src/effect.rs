//! Reversible read-time effects.
//!
//! Effects transform the derived state as it is read; the base state is
//! never mutated by them. Each effect has a stable ID, an optional
//! activator (the principal that instantiated it, `None` = system), and an
//! apply function. Effects are applied in insertion order, and order is
//! observable: apply is generally non-commutative.
//!
//! Capability checks are explicit trait methods rather than downcasts:
//! [`Effect::expired`] and [`Effect::schedulable`] have conservative
//! defaults that concrete kinds override.

use parking_lot::RwLock;
use std::sync::Arc;

/// Transform closure shared by the effect kinds.
pub(crate) type ApplyFn<T, A> = Box<dyn Fn(T, Option<&A>) -> T + Send + Sync>;

/// Callback invoked with the effect ID when a scheduled expiration fires.
pub type ExpireCallback = Box<dyn FnOnce(String) + Send + 'static>;

/// A reversible state transformation applied on read.
///
/// `T` is the state type, `A` the activator type. Implementations must be
/// shareable across threads; stateful kinds guard their interior with their
/// own lock and never touch the state container's lock.
pub trait Effect<T, A>: Send + Sync {
    /// Stable identifier, unique within a state container.
    fn id(&self) -> &str;

    /// Transform `state`. `activator` is the principal the effect was added
    /// under, letting transforms implement e.g. self-exclusion.
    fn apply(&self, state: T, activator: Option<&A>) -> T;

    /// The activator this effect currently carries.
    fn activator(&self) -> Option<A>;

    /// Replace the carried activator.
    fn set_activator(&self, activator: Option<A>);

    /// Whether this effect has expired and should be reaped.
    ///
    /// Only time-bounded kinds ever return `true`.
    fn expired(&self) -> bool {
        false
    }

    /// Access the expiration-scheduling capability, if this kind has one.
    fn schedulable(&self) -> Option<&dyn Schedulable> {
        None
    }
}

/// Capability for effects that can schedule an automatic expiration
/// callback, enabling cleanup without polling.
pub trait Schedulable: Send + Sync {
    /// Start a one-shot timer that invokes `on_expire` with the effect ID
    /// when the effect expires. Re-invocation replaces any pending timer.
    ///
    /// Returns `false` when there is nothing to schedule: no clock, no
    /// expiration bound, or the effect already expired.
    fn schedule_expiration(&self, on_expire: ExpireCallback) -> bool;

    /// Stop any pending expiration timer. Safe to call when none is
    /// scheduled.
    fn cancel_scheduled_expiration(&self);
}

/// A plain function effect: applies unconditionally.
///
/// # Examples
///
/// ```
/// use prism_state::FuncEffect;
///
/// let double = FuncEffect::<i64, String>::new("double", |v, _| v * 2);
/// # use prism_state::Effect;
/// assert_eq!(double.apply(21, None), 42);
/// ```
pub struct FuncEffect<T, A> {
    id: String,
    func: ApplyFn<T, A>,
    activator: RwLock<Option<A>>,
}

impl<T, A> FuncEffect<T, A> {
    /// Create a function effect.
    ///
    /// Returns `Arc<Self>` so the caller can register the effect and keep a
    /// handle to it at the same time.
    pub fn new(
        id: impl Into<String>,
        f: impl Fn(T, Option<&A>) -> T + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            func: Box::new(f),
            activator: RwLock::new(None),
        })
    }
}

impl<T, A> Effect<T, A> for FuncEffect<T, A>
where
    A: Clone + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&self, state: T, activator: Option<&A>) -> T {
        (self.func)(state, activator)
    }

    fn activator(&self) -> Option<A> {
        self.activator.read().clone()
    }

    fn set_activator(&self, activator: Option<A>) {
        *self.activator.write() = activator;
    }
}

/// An effect gated by a predicate over the current value and activator.
pub struct CondEffect<T, A> {
    id: String,
    cond: Box<dyn Fn(&T, Option<&A>) -> bool + Send + Sync>,
    func: ApplyFn<T, A>,
    activator: RwLock<Option<A>>,
}

impl<T, A> CondEffect<T, A> {
    /// Create a conditional effect: `f` runs only while `cond` holds.
    pub fn new(
        id: impl Into<String>,
        cond: impl Fn(&T, Option<&A>) -> bool + Send + Sync + 'static,
        f: impl Fn(T, Option<&A>) -> T + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            cond: Box::new(cond),
            func: Box::new(f),
            activator: RwLock::new(None),
        })
    }
}

impl<T, A> Effect<T, A> for CondEffect<T, A>
where
    A: Clone + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&self, state: T, activator: Option<&A>) -> T {
        if (self.cond)(&state, activator) {
            (self.func)(state, activator)
        } else {
            state
        }
    }

    fn activator(&self) -> Option<A> {
        self.activator.read().clone()
    }

    fn set_activator(&self, activator: Option<A>) {
        *self.activator.write() = activator;
    }
}

/// An effect that can be switched on and off without removing it.
pub struct ToggleEffect<T, A> {
    id: String,
    func: ApplyFn<T, A>,
    inner: RwLock<ToggleInner<A>>,
}

struct ToggleInner<A> {
    enabled: bool,
    activator: Option<A>,
}

impl<T, A> ToggleEffect<T, A> {
    /// Create a toggle effect, initially enabled.
    pub fn new(
        id: impl Into<String>,
        f: impl Fn(T, Option<&A>) -> T + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            func: Box::new(f),
            inner: RwLock::new(ToggleInner {
                enabled: true,
                activator: None,
            }),
        })
    }

    /// Enable the effect.
    pub fn enable(&self) {
        self.inner.write().enabled = true;
    }

    /// Disable the effect; apply becomes a pass-through.
    pub fn disable(&self) {
        self.inner.write().enabled = false;
    }

    /// Set the enabled flag directly.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.write().enabled = enabled;
    }

    /// Whether the effect currently applies.
    pub fn is_enabled(&self) -> bool {
        self.inner.read().enabled
    }
}

impl<T, A> Effect<T, A> for ToggleEffect<T, A>
where
    A: Clone + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&self, state: T, activator: Option<&A>) -> T {
        if self.inner.read().enabled {
            (self.func)(state, activator)
        } else {
            state
        }
    }

    fn activator(&self) -> Option<A> {
        self.inner.read().activator.clone()
    }

    fn set_activator(&self, activator: Option<A>) {
        self.inner.write().activator = activator;
    }
}

/// An effect that accumulates values and combines them in one pass.
///
/// The combine function receives the whole value list; with no values the
/// effect is a no-op. Typical use: stacking multipliers where the combined
/// factor is the product of every pushed value.
pub struct StackEffect<T, A, V> {
    id: String,
    combine: Box<dyn Fn(T, &[V], Option<&A>) -> T + Send + Sync>,
    inner: RwLock<StackInner<A, V>>,
}

struct StackInner<A, V> {
    values: Vec<V>,
    activator: Option<A>,
}

impl<T, A, V> StackEffect<T, A, V> {
    /// Create a stack effect with the given combine function.
    pub fn new(
        id: impl Into<String>,
        combine: impl Fn(T, &[V], Option<&A>) -> T + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            combine: Box::new(combine),
            inner: RwLock::new(StackInner {
                values: Vec::new(),
                activator: None,
            }),
        })
    }

    /// Push a value onto the stack.
    pub fn push(&self, value: V) {
        self.inner.write().values.push(value);
    }

    /// Pop the most recently pushed value.
    pub fn pop(&self) -> Option<V> {
        self.inner.write().values.pop()
    }

    /// Remove all values.
    pub fn clear(&self) {
        self.inner.write().values.clear();
    }

    /// Number of stacked values.
    pub fn count(&self) -> usize {
        self.inner.read().values.len()
    }
}

impl<T, A, V> Effect<T, A> for StackEffect<T, A, V>
where
    A: Clone + Send + Sync,
    V: Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&self, state: T, activator: Option<&A>) -> T {
        let inner = self.inner.read();
        if inner.values.is_empty() {
            return state;
        }
        (self.combine)(state, &inner.values, activator)
    }

    fn activator(&self) -> Option<A> {
        self.inner.read().activator.clone()
    }

    fn set_activator(&self, activator: Option<A>) {
        self.inner.write().activator = activator;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_func_effect_applies() {
        let double = FuncEffect::<i64, String>::new("double", |v, _| v * 2);
        assert_eq!(double.id(), "double");
        assert_eq!(double.apply(5, None), 10);
        assert!(!double.expired());
        assert!(double.schedulable().is_none());
    }

    #[test]
    fn test_activator_round_trip() {
        let e = FuncEffect::<i64, String>::new("e", |v, _| v);
        assert_eq!(e.activator(), None);
        e.set_activator(Some("alice".to_owned()));
        assert_eq!(e.activator(), Some("alice".to_owned()));
    }

    #[test]
    fn test_cond_effect_gates() {
        let e = CondEffect::<i64, String>::new("big-only", |v, _| *v > 10, |v, _| v + 1);
        assert_eq!(e.apply(5, None), 5);
        assert_eq!(e.apply(11, None), 12);
    }

    #[test]
    fn test_cond_effect_sees_activator() {
        let e = CondEffect::<i64, String>::new(
            "not-bob",
            |_, a| a.map(String::as_str) != Some("bob"),
            |v, _| v * 10,
        );
        let bob = "bob".to_owned();
        let eve = "eve".to_owned();
        assert_eq!(e.apply(1, Some(&bob)), 1);
        assert_eq!(e.apply(1, Some(&eve)), 10);
    }

    #[test]
    fn test_toggle_effect() {
        let e = ToggleEffect::<i64, String>::new("boost", |v, _| v + 100);
        assert!(e.is_enabled());
        assert_eq!(e.apply(1, None), 101);

        e.disable();
        assert!(!e.is_enabled());
        assert_eq!(e.apply(1, None), 1);

        e.set_enabled(true);
        assert_eq!(e.apply(1, None), 101);
    }

    #[test]
    fn test_stack_effect_combines_all() {
        let e = StackEffect::<f64, String, f64>::new("mult", |v, factors, _| {
            v * factors.iter().product::<f64>()
        });

        // Empty stack is a no-op.
        assert_eq!(e.apply(10.0, None), 10.0);

        e.push(1.5);
        e.push(2.0);
        assert_eq!(e.count(), 2);
        assert_eq!(e.apply(10.0, None), 30.0);

        assert_eq!(e.pop(), Some(2.0));
        assert_eq!(e.apply(10.0, None), 15.0);

        e.clear();
        assert_eq!(e.count(), 0);
        assert_eq!(e.pop(), None);
        assert_eq!(e.apply(10.0, None), 10.0);
    }
}
