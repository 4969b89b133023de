//! Desktop peer configuration.

pub mod config;

pub use config::DesktopConfig;
