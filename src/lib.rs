// LMS setup records shared with the admin tier
pub mod setup;

// Credential vault and persisted access tokens
pub mod credentials;

// TOML / env configuration
pub mod config;

pub use setup::{LmsConfig, LmsSetupAttribute, LmsType};
