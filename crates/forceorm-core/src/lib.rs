//! # forceorm-core
//!
//! Core types shared by every forceorm crate. This crate has no knowledge of
//! queries or transports and provides the foundation for all other crates.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and result alias
//! - [`settings`] - The explicit, construct-once configuration object
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;

// Re-export the most commonly used types at the crate root.
pub use error::{ForceError, ForceResult};
pub use settings::Settings;
