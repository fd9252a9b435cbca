//! # Event subscribers for the shipvisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the fan-out [`SubscriberSet`]
//! and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Supervisor ── emit(Event) ──► SubscriberSet ──► per-subscriber queue + worker
//!                                                     │
//!                                            ┌────────┴────────┐
//!                                            ▼                 ▼
//!                                        LogWriter          Custom
//!                                        (tracing)     (metrics, alerts...)
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
