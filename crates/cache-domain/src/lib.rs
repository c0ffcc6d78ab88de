pub mod config;
pub mod error;

pub use config::{Config, ConfigIssue, ConfigSeverity};
pub use error::{Error, Result};
