//! Runtime core: supervision loop and lifecycle.
//!
//! The public API from this module is [`Supervisor`] (with its builder and
//! shutdown summary) and [`ShutdownSignals`].
//!
//! Internal modules:
//! - [`runner`]: creates and drives one worker attempt, folds the result into a tagged outcome;
//! - [`supervisor`]: the respawn state machine, backoff, tunnel and shutdown ordering;
//! - [`builder`]: validates settings and wires factories and subscribers;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod runner;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use shutdown::ShutdownSignals;
pub use supervisor::{Shutdown, ShutdownCause, Supervisor};
