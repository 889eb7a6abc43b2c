//! OCI distribution registry client.

use async_trait::async_trait;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol};
use oci_distribution::manifest::ImageIndexEntry;
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::Reference;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::{layer_commands, RegistryClient};
use crate::credentials::CredentialTriple;
use crate::error::{KlarError, Result};
use crate::types::{FsLayer, FsLayerCommand, Image, RegistryConfig};

/// Placeholder username registries accept alongside a token password.
const TOKEN_USERNAME: &str = "<token>";

/// Registry client backed by `oci-distribution`.
///
/// Calls are not bounded here; the orchestrator applies the registry timeout.
pub struct OciRegistryClient {
    client: Mutex<Client>,
}

impl OciRegistryClient {
    /// Create a client honouring the TLS, protocol and platform settings.
    pub fn new(config: &RegistryConfig) -> Self {
        let credentials = &config.credentials;
        let protocol = if credentials.insecure_registry {
            ClientProtocol::Http
        } else {
            ClientProtocol::HttpsExcept(vec!["localhost".to_string()])
        };

        let (os, arch) = platform(config);
        let client_config = ClientConfig {
            protocol,
            accept_invalid_certificates: credentials.insecure_tls,
            platform_resolver: Some(Box::new(move |manifests: &[ImageIndexEntry]| {
                resolve_platform(manifests, &os, &arch)
            })),
            ..Default::default()
        };

        Self { client: Mutex::new(Client::new(client_config)) }
    }
}

#[async_trait]
impl RegistryClient for OciRegistryClient {
    #[instrument(skip(self, image), fields(image = %image.name))]
    async fn pull(&self, image: &mut Image) -> Result<()> {
        info!("Pulling image manifest from registry: {}", image.reference);

        let whole = image.reference.whole();
        let reference = Reference::try_from(whole.as_str()).map_err(|e| {
            KlarError::InvalidImageReference { image: image.name.clone(), reason: e.to_string() }
        })?;
        let auth = registry_auth(&image.credentials);

        let (manifest, digest, config) = self
            .client
            .lock()
            .await
            .pull_manifest_and_config(&reference, &auth)
            .await
            .map_err(|e| KlarError::PullFailed { image: image.name.clone(), reason: e.to_string() })?;

        image.digest = digest;
        image.schema_version = manifest.schema_version;
        image.fs_layers = manifest
            .layers
            .iter()
            .map(|layer| FsLayer {
                digest: layer.digest.clone(),
                media_type: layer.media_type.clone(),
                size: layer.size,
            })
            .collect();
        image.config = Some(config);

        info!(
            digest = %image.digest,
            schema_version = image.schema_version,
            layers = image.fs_layers.len(),
            "Image manifest fetched successfully"
        );

        Ok(())
    }

    async fn fetch_fs_commands(&self, image: &Image) -> Result<Vec<FsLayerCommand>> {
        layer_commands(image)
    }
}

/// Map resolved credentials onto registry auth.
///
/// A token without a password is sent as the password of a basic credential,
/// which is how registries accept personal access tokens.
fn registry_auth(credentials: &CredentialTriple) -> RegistryAuth {
    if !credentials.username.is_empty() || !credentials.password.is_empty() {
        RegistryAuth::Basic(credentials.username.clone(), credentials.password.clone())
    } else if !credentials.token.is_empty() {
        RegistryAuth::Basic(TOKEN_USERNAME.to_string(), credentials.token.clone())
    } else {
        RegistryAuth::Anonymous
    }
}

/// Requested platform, defaulting to linux on the host architecture.
fn platform(config: &RegistryConfig) -> (String, String) {
    let os = if config.platform_os.is_empty() { "linux" } else { config.platform_os.as_str() };
    let arch = if config.platform_arch.is_empty() {
        match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => other,
        }
    } else {
        config.platform_arch.as_str()
    };
    (os.to_string(), arch.to_string())
}

/// Pick the index entry for `os`/`arch`.
fn resolve_platform(manifests: &[ImageIndexEntry], os: &str, arch: &str) -> Option<String> {
    debug!("Looking for {}/{} image variant", os, arch);

    let found = manifests.iter().find(|entry| {
        entry
            .platform
            .as_ref()
            .is_some_and(|platform| platform.os == os && platform.architecture == arch)
    });

    match found {
        Some(entry) => Some(entry.digest.clone()),
        None => {
            debug!("No {}/{} image variant found", os, arch);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_auth() {
        let mut creds = CredentialTriple::default();
        assert!(matches!(registry_auth(&creds), RegistryAuth::Anonymous));

        creds.token = "tok".into();
        match registry_auth(&creds) {
            RegistryAuth::Basic(user, pass) => {
                assert_eq!(user, TOKEN_USERNAME);
                assert_eq!(pass, "tok");
            }
            _ => panic!("expected basic auth"),
        }

        creds.username = "user".into();
        creds.password = "pw".into();
        match registry_auth(&creds) {
            RegistryAuth::Basic(user, pass) => {
                assert_eq!(user, "user");
                assert_eq!(pass, "pw");
            }
            _ => panic!("expected basic auth"),
        }
    }

    #[test]
    fn test_platform_defaults() {
        let config = RegistryConfig::default();
        let (os, arch) = platform(&config);
        assert_eq!(os, "linux");
        assert!(!arch.is_empty());

        let config = RegistryConfig {
            platform_os: "windows".into(),
            platform_arch: "arm64".into(),
            ..Default::default()
        };
        assert_eq!(platform(&config), ("windows".to_string(), "arm64".to_string()));
    }

    #[test]
    fn test_resolve_platform_no_match() {
        assert_eq!(resolve_platform(&[], "linux", "amd64"), None);
    }
}
