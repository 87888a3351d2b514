//! # imgto3d Common Library
//!
//! Shared code for the reconstruction backends including:
//! - Error taxonomy (`Error` enum) shared by every job kind
//! - Event types (`ReconEvent` enum) and the broadcast `EventBus`
//! - Configuration file discovery

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, EventSink, ReconEvent};
