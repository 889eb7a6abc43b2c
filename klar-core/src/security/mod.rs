//! Vulnerability analysis of pulled images.
//!
//! The analysis service is reached through the `VulnerabilityScanner` trait.
//! `ClairClient` speaks the Clair v1 HTTP API: every layer is pushed with the
//! URL Clair should fetch it from, then the top layer is queried for the
//! vulnerabilities of all its features.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use klar_core::security::{ClairClient, VulnerabilityScanner};
//! use klar_core::types::Image;
//!
//! async fn example(image: &Image) -> Result<(), Box<dyn std::error::Error>> {
//!     let clair = ClairClient::new("clair.local", Duration::from_secs(60))?;
//!     let vulnerabilities = clair.analyse(image).await?;
//!
//!     println!("Found {} vulnerabilities", vulnerabilities.len());
//!     Ok(())
//! }
//! ```

mod clair;

pub use clair::ClairClient;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Image, Vulnerability};

/// Vulnerability analysis service.
#[async_trait]
pub trait VulnerabilityScanner: Send + Sync {
    /// Submit a pulled image and return the findings for all its layers.
    async fn analyse(&self, image: &Image) -> Result<Vec<Vulnerability>>;
}
