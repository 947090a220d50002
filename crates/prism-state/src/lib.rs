//! Deterministic state synchronization for one authoritative value and many
//! concurrent viewers.
//!
//! A writer mutates a single base state; each viewer receives, on demand,
//! either a full snapshot or an RFC 6902 JSON Patch describing the delta
//! since the last broadcast, filtered through a viewer-specific projection.
//! Between the base state and what viewers see sits an ordered chain of
//! reversible effects: transforms applied on read that never touch the base.
//!
//! # Core Concepts
//!
//! - **Base state**: the authoritative value, the only thing persisted.
//! - **Derived state**: base with effects applied in insertion order,
//!   recomputed on every read.
//! - **Previous snapshot**: the derived state captured just before a
//!   mutation; it drives the next diff and is cleared after broadcasting.
//! - **Projection**: a per-viewer `T -> T` filter applied before diffing.
//! - **Tick**: the canonical cycle — reap expired effects, broadcast,
//!   clear the previous snapshot.
//!
//! # Quick Start
//!
//! ```
//! use prism_state::{Config, Session, State};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Game {
//!     round: u32,
//!     phase: String,
//! }
//!
//! let state = Arc::new(State::<Game, String>::new(
//!     Game { round: 1, phase: "lobby".into() },
//!     Config::default(),
//! ).unwrap());
//!
//! let session: Arc<Session<Game, String, String>> = Session::new(state);
//! session.connect("alice".into(), None);
//!
//! // Mutate, then tick: every client with a visible change gets its patch.
//! let diffs = session.apply_update(|g| g.phase = "playing".into());
//! assert_eq!(
//!     diffs["alice"],
//!     br#"[{"op":"replace","path":"/phase","value":"playing"}]"#.to_vec()
//! );
//! ```
//!
//! # Effects
//!
//! ```
//! use prism_state::{Config, FuncEffect, State};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Score { points: i64 }
//!
//! let state = State::<Score, String>::new(Score { points: 100 }, Config::default()).unwrap();
//!
//! // Activated by "alice"; the transform sees the activator.
//! let boost = FuncEffect::new("boost", |mut s: Score, _activator| {
//!     s.points *= 2;
//!     s
//! });
//! state.add_effect(boost, Some("alice".into())).unwrap();
//!
//! assert_eq!(state.get().points, 200);      // derived
//! assert_eq!(state.get_base().points, 100); // base untouched
//! ```

mod clock;
mod diff;
mod effect;
mod error;
mod patch;
mod persist;
mod pointer;
mod session;
mod state;
mod timed;
mod timer;

// Wire model
pub use patch::{OpKind, Patch, PatchOp};
pub use pointer::{escape, unescape};

// Diff engine
pub use diff::{diff, ArrayConfig, ArrayStrategy};

// Effects
pub use clock::{fixed_clock, system_clock, Clock};
pub use effect::{CondEffect, Effect, ExpireCallback, FuncEffect, Schedulable, StackEffect, ToggleEffect};
pub use timed::TimedEffect;

// State and sessions
pub use session::{BroadcastHook, Session, Tx};
pub use state::{Cloner, Config, Projection, State};

// Persistence
pub use persist::{load, restore, save, EffectFactory, EffectMeta, Restored, Snapshot};

// Errors
pub use error::{BoxError, EffectRestoreError, PrismError, PrismResult};

// Re-export serde_json::Value for convenience
pub use serde_json::Value;
