//! Netscope Core - Foundation crate for the netscope scan engine.
//!
//! This crate provides the shared vocabulary every other netscope crate
//! depends on: scanner kinds, scan statuses, option maps, validated targets,
//! the central error type and TOML configuration.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared enums and newtypes (`ScannerKind`, `ScanStatus`, `ScanOptions`, `Target`)
//!
//! # Example
//!
//! ```rust
//! use netscope_core::{AppConfig, ScannerKind, ScanStatus};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert_eq!(config.tools.nmap_path, "nmap");
//!
//! let kind: ScannerKind = "network_analysis".parse()?;
//! assert_eq!(kind, ScannerKind::NetworkAnalysis);
//! assert!(ScanStatus::Pending.can_transition_to(ScanStatus::Running));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, DatabaseConfig, ScanningConfig, ToolsConfig};
pub use error::{ConfigError, ConfigResult, NetscopeError, Result};
pub use types::{ScanOptions, ScanStatus, ScanType, ScannerKind, Target};
