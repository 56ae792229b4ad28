pub mod config;
pub mod error;
pub mod event_bus;
pub mod types;

pub use self::config::{AppConfig, FailurePolicy};
pub use error::{OutreachError, OutreachResult};
