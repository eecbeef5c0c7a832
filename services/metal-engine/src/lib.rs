//! Metal Engine Service
//!
//! Hosts the nano execution engine:
//! - Configuration loading with environment overrides
//! - Inbound and outbound ring construction
//! - Engine loop on a dedicated named thread
//! - Outbound drain standing in for the wire transport
//! - Frame-file replay through the live pipeline

pub mod config;
pub mod supervisor;

pub use config::{ConfigError, ServiceConfig};
pub use supervisor::Pipeline;
