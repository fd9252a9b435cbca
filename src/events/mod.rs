//! Runtime events.
//!
//! The supervisor reports every lifecycle transition as an [`Event`] and hands it
//! to the [`SubscriberSet`](crate::SubscriberSet), which fans it out to the
//! configured subscribers ([`LogWriter`](crate::LogWriter) in the binary).
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata

mod event;

pub use event::{Event, EventKind};
