//! Image domain types.

use serde::{Deserialize, Serialize};

use crate::credentials::reference::ImageReference;
use crate::credentials::CredentialTriple;
use crate::error::Result;

/// Registry-side settings for one scan: which image, how to authenticate, and
/// how long to wait for the registry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistryConfig {
    /// Image reference as given on the command line
    pub image_name: String,

    /// Resolved registry credentials
    pub credentials: CredentialTriple,

    /// Per-call registry timeout
    pub timeout: std::time::Duration,

    /// Platform selector for multi-arch indexes (e.g. "linux")
    pub platform_os: String,

    /// Platform selector for multi-arch indexes (e.g. "amd64")
    pub platform_arch: String,
}

/// Handle to a container image being scanned.
///
/// Created from the image name before any network access; the registry client
/// fills in digest, schema version and layers when the image is pulled.
#[derive(Debug, Clone)]
pub struct Image {
    /// Image reference as given on the command line
    pub name: String,

    /// Parsed, registry-qualified reference
    pub reference: ImageReference,

    /// Manifest digest (e.g. "sha256:...")
    pub digest: String,

    /// Manifest schema version
    pub schema_version: u8,

    /// Filesystem layers, base layer first
    pub fs_layers: Vec<FsLayer>,

    /// Raw image config blob, used to derive layer commands
    pub config: Option<String>,

    /// Credentials used against the registry
    pub credentials: CredentialTriple,
}

impl Image {
    /// Build an image handle from the registry settings.
    ///
    /// Fails only when the image name is not a valid reference.
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let reference = ImageReference::parse(&config.image_name)?;

        Ok(Self {
            name: config.image_name.clone(),
            reference,
            digest: String::new(),
            schema_version: 0,
            fs_layers: Vec::new(),
            config: None,
            credentials: config.credentials.clone(),
        })
    }

    /// Whether the pull produced at least one filesystem layer.
    pub fn has_layers(&self) -> bool {
        !self.fs_layers.is_empty()
    }

    /// Base URL of the registry API, honouring the insecure-registry flag.
    pub fn registry_url(&self) -> String {
        let scheme = if self.credentials.insecure_registry { "http" } else { "https" };
        format!("{}://{}", scheme, self.reference.api_host())
    }

    /// URL of a layer blob in the registry, as fetched by the analysis service.
    pub fn blob_url(&self, digest: &str) -> String {
        format!("{}/v2/{}/blobs/{}", self.registry_url(), self.reference.repository(), digest)
    }
}

/// One filesystem layer of a pulled image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsLayer {
    /// Layer digest
    pub digest: String,

    /// Layer media type
    pub media_type: String,

    /// Compressed size in bytes
    pub size: i64,
}

/// Build command recorded in the image history for one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsLayerCommand {
    /// Layer digest
    pub layer: String,

    /// Instruction that created this layer (empty when history is missing)
    pub command: String,
}

/// Remove the algorithm prefix from a digest ("sha256:abc" -> "abc").
pub fn trim_digest(digest: &str) -> &str {
    digest.split_once(':').map(|(_, hash)| hash).unwrap_or(digest)
}
