pub mod analyzer;
pub mod auth;
pub mod config;
pub mod error;
pub mod generator;
pub mod interfaces;
pub mod logging;
pub mod providers;
pub mod runtime_paths;
pub mod server;
pub mod voice;

pub use error::WayfarerError;

pub type Result<T> = std::result::Result<T, WayfarerError>;
