//! klar core library
//!
//! Resolves scan configuration and registry credentials, pulls an image
//! manifest, extracts per-layer build commands and submits the layers to a
//! Clair analysis service.

pub mod config;
pub mod credentials;
pub mod error;
pub mod observability;
pub mod registry;
pub mod scan;
pub mod security;
pub mod types;

// Re-export commonly used items
pub use config::{Config, EnvSource, OutputFormat, ProcessEnv};
pub use error::{ErrorKind, KlarError, Result};
pub use observability::init as init_observability;
pub use scan::{execute_scan, scan, ScanOutcome, ScanResult, VulnerabilitySummary};
pub use types::{FsLayerCommand, Image, Severity, Vulnerability};
