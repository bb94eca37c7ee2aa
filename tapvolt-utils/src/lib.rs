//! Common utilities for tapvolt
//!
//! Error type, logging bootstrap, XDG paths, and the persisted settings
//! store shared by the engine and the CLI.

mod error;
pub mod logging;
pub mod paths;
mod settings;

pub use error::{Result, TapvoltError};
pub use logging::{init_logging, LogConfig, LogOutput};
pub use settings::Settings;
