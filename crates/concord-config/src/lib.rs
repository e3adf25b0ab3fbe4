//! Configuration and file management for the Concord log tail tools
//!
//! This crate provides:
//! - File path utilities for config files
//! - Configuration file discovery (TOML)
//! - Application configuration (AppConfig) with environment overrides

pub mod app_config;
pub mod config_file;
pub mod paths;

pub use app_config::AppConfig;
pub use config_file::load_config_file;
pub use paths::{app_config_path, config_dir};

/// Server used when neither the config file nor the environment names one
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8001";
