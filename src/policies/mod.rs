//! Respawn policies.
//!
//! ## Contents
//! - [`BackoffState`] capped failure counter; delay = `base_delay ^ failure_count`
//!
//! ## Quick wiring
//! ```text
//! SupervisorConfig { max_failure, respawn_delay }
//!      └─► SupervisorConfig::backoff() ─► BackoffState (owned by one Supervisor)
//!           └─► record_failure() on every transport failure
//! ```

mod backoff;

pub use backoff::BackoffState;
