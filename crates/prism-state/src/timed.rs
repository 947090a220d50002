//! Time-scoped effects with optional automatic expiration.

use crate::clock::{system_clock, Clock};
use crate::effect::{ApplyFn, Effect, ExpireCallback, Schedulable};
use crate::timer::OneShot;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;

/// An effect active only inside an optional `[starts_at, expires_at]`
/// window.
///
/// `None` for `starts_at` means active immediately; `None` for `expires_at`
/// means the effect never expires. Time is read through an injectable
/// [`Clock`]; clearing the clock with [`set_clock`](Self::set_clock)
/// disables time checks entirely, which keeps tests and replay
/// deterministic without mocking.
///
/// Outside its window the effect passes state through unchanged, so a
/// not-yet-started or expired effect is invisible to viewers even before it
/// is reaped.
pub struct TimedEffect<T, A> {
    id: String,
    func: ApplyFn<T, A>,
    inner: RwLock<TimedInner<A>>,
    timer: Mutex<Option<OneShot>>,
}

struct TimedInner<A> {
    activator: Option<A>,
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    clock: Option<Clock>,
}

impl<T, A> TimedEffect<T, A> {
    /// Create an effect that is active now and expires after `duration`.
    pub fn expiring(
        id: impl Into<String>,
        duration: Duration,
        f: impl Fn(T, Option<&A>) -> T + Send + Sync + 'static,
    ) -> Arc<Self> {
        let now = Utc::now();
        Self::build(id, f, Some(now), Some(now + to_delta(duration)))
    }

    /// Create an effect with explicit window bounds.
    ///
    /// Ideal for restoring persisted effects: save the bounds with
    /// [`starts_at`](Self::starts_at)/[`expires_at`](Self::expires_at) and
    /// recreate the window on load.
    pub fn window(
        id: impl Into<String>,
        starts_at: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
        f: impl Fn(T, Option<&A>) -> T + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::build(id, f, starts_at, expires_at)
    }

    /// Create an effect that activates after `delay` and lasts `duration`.
    pub fn delayed(
        id: impl Into<String>,
        delay: Duration,
        duration: Duration,
        f: impl Fn(T, Option<&A>) -> T + Send + Sync + 'static,
    ) -> Arc<Self> {
        let starts = Utc::now() + to_delta(delay);
        Self::build(id, f, Some(starts), Some(starts + to_delta(duration)))
    }

    fn build(
        id: impl Into<String>,
        f: impl Fn(T, Option<&A>) -> T + Send + Sync + 'static,
        starts_at: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            func: Box::new(f),
            inner: RwLock::new(TimedInner {
                activator: None,
                starts_at,
                expires_at,
                clock: Some(system_clock()),
            }),
            timer: Mutex::new(None),
        })
    }

    /// Replace the time source. `None` disables time checks: the effect
    /// reports active, started, not expired, and zero remaining time.
    pub fn set_clock(&self, clock: Option<Clock>) {
        self.inner.write().clock = clock;
    }

    /// Whether the effect is inside its window (started and not expired).
    pub fn active(&self) -> bool {
        let (starts_at, expires_at, clock) = self.bounds();
        let Some(clock) = clock else { return true };
        let now = (clock.as_ref())();
        if starts_at.is_some_and(|s| now < s) {
            return false;
        }
        !expires_at.is_some_and(|e| now > e)
    }

    /// Whether the window has opened (or there is no start bound).
    pub fn started(&self) -> bool {
        let (starts_at, _, clock) = self.bounds();
        let Some(clock) = clock else { return true };
        !starts_at.is_some_and(|s| (clock.as_ref())() < s)
    }

    /// Whether the window has closed.
    pub fn expired(&self) -> bool {
        let (_, expires_at, clock) = self.bounds();
        let Some(clock) = clock else { return false };
        expires_at.is_some_and(|e| (clock.as_ref())() > e)
    }

    /// Time left until expiration. Zero when expired, unbounded, or the
    /// clock is disabled.
    pub fn remaining(&self) -> Duration {
        let (_, expires_at, clock) = self.bounds();
        match (expires_at, clock) {
            (Some(e), Some(clock)) => (e - (clock.as_ref())()).to_std().unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        }
    }

    /// Time left until the window opens. Zero when already started or the
    /// clock is disabled.
    pub fn until_start(&self) -> Duration {
        let (starts_at, _, clock) = self.bounds();
        match (starts_at, clock) {
            (Some(s), Some(clock)) => (s - (clock.as_ref())()).to_std().unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        }
    }

    /// Push the expiration out by `extra`. No-op when the effect has no
    /// expiration bound.
    pub fn extend(&self, extra: Duration) {
        let mut inner = self.inner.write();
        if let Some(e) = inner.expires_at {
            inner.expires_at = Some(e + to_delta(extra));
        }
    }

    /// Change the start bound.
    pub fn set_starts_at(&self, at: Option<DateTime<Utc>>) {
        self.inner.write().starts_at = at;
    }

    /// Change the expiration bound.
    pub fn set_expires_at(&self, at: Option<DateTime<Utc>>) {
        self.inner.write().expires_at = at;
    }

    /// The start bound, if any.
    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().starts_at
    }

    /// The expiration bound, if any.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().expires_at
    }

    fn bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>, Option<Clock>) {
        let inner = self.inner.read();
        (inner.starts_at, inner.expires_at, inner.clock.clone())
    }
}

impl<T, A> Effect<T, A> for TimedEffect<T, A>
where
    A: Clone + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&self, state: T, activator: Option<&A>) -> T {
        let (starts_at, expires_at, clock) = self.bounds();

        // No clock: time checks are disabled, always apply.
        let Some(clock) = clock else {
            return (self.func)(state, activator);
        };

        let now = (clock.as_ref())();
        if starts_at.is_some_and(|s| now < s) {
            return state;
        }
        if expires_at.is_some_and(|e| now > e) {
            return state;
        }
        (self.func)(state, activator)
    }

    fn activator(&self) -> Option<A> {
        self.inner.read().activator.clone()
    }

    fn set_activator(&self, activator: Option<A>) {
        self.inner.write().activator = activator;
    }

    fn expired(&self) -> bool {
        TimedEffect::expired(self)
    }

    fn schedulable(&self) -> Option<&dyn Schedulable> {
        Some(self)
    }
}

impl<T, A> Schedulable for TimedEffect<T, A>
where
    A: Send + Sync,
{
    fn schedule_expiration(&self, on_expire: ExpireCallback) -> bool {
        let mut timer = self.timer.lock();
        // Replace any pending timer; dropping the old handle cancels it.
        *timer = None;

        let (_, expires_at, clock) = self.bounds();
        let (Some(expires_at), Some(clock)) = (expires_at, clock) else {
            return false;
        };

        let delay = (expires_at - (clock.as_ref())()).to_std().unwrap_or(Duration::ZERO);
        if delay.is_zero() {
            // Already expired.
            return false;
        }

        let id = self.id.clone();
        *timer = Some(OneShot::spawn(delay, move || on_expire(id)));
        true
    }

    fn cancel_scheduled_expiration(&self) {
        *self.timer.lock() = None;
    }
}

fn to_delta(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}
