//! Injectable time source for timed effects.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A shareable time source.
///
/// Timed effects read the current time through a `Clock` rather than the
/// system clock directly, so tests and replay can pin time without mocking.
/// A `None` clock on an effect disables its time checks entirely.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The default wall-clock time source.
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// A clock frozen at a fixed instant. Mostly useful in tests.
pub fn fixed_clock(at: DateTime<Utc>) -> Clock {
    Arc::new(move || at)
}
