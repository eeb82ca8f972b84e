//! # Aurora Common Library
//!
//! Shared code for the Aurora experiment composer including:
//! - Error and result types
//! - Configuration loading and data folder resolution
//! - Event types (AuroraEvent enum) and the EventBus
//! - Observable attributes with synchronous listeners
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod events;
pub mod observable;
pub mod time;

pub use error::{Error, Result};
pub use observable::Observable;
