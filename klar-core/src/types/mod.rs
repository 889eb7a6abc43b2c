//! Core domain types for klar.

pub mod image;
pub mod vulnerability;

// Re-exports
pub use image::{trim_digest, FsLayer, FsLayerCommand, Image, RegistryConfig};
pub use vulnerability::{Severity, Vulnerability};
