//! Provider configuration module

pub mod null_handling;
pub mod provider_config;

pub use null_handling::*;
pub use provider_config::*;
