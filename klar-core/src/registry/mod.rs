//! Registry access for the image being scanned.
//!
//! The pipeline only needs two things from a registry: the image manifest
//! (digest, schema version, layers) and the per-layer build history. Both go
//! through the `RegistryClient` trait so the orchestrator can be driven by any
//! implementation; `OciRegistryClient` is the production one.

mod oci;

pub use oci::OciRegistryClient;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{KlarError, Result};
use crate::types::{FsLayerCommand, Image};

/// Registry client trait.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch the manifest and config for `image`, recording digest, schema
    /// version, filesystem layers and the raw config on the handle.
    async fn pull(&self, image: &mut Image) -> Result<()>;

    /// Build commands for each filesystem layer, in layer order.
    async fn fetch_fs_commands(&self, image: &Image) -> Result<Vec<FsLayerCommand>>;
}

/// Image config blob (only the history is of interest).
#[derive(Debug, Default, Deserialize)]
struct ImageConfigBlob {
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryEntry {
    #[serde(default)]
    created_by: String,
    #[serde(default)]
    empty_layer: bool,
}

const NOP_PREFIXES: [&str; 2] = ["/bin/sh -c #(nop) ", "|1 /bin/sh -c #(nop) "];

/// Pair the image history with its filesystem layers.
///
/// History entries flagged `empty_layer` (ENV, LABEL, ...) produce no layer and
/// are skipped; layers without a history entry get an empty command.
pub fn layer_commands(image: &Image) -> Result<Vec<FsLayerCommand>> {
    let blob: ImageConfigBlob = match image.config.as_deref() {
        Some(raw) if !raw.trim().is_empty() => {
            serde_json::from_str(raw).map_err(|e| KlarError::LayerCommands {
                image: image.name.clone(),
                reason: format!("Failed to parse image config: {}", e),
            })?
        }
        _ => ImageConfigBlob::default(),
    };

    let mut history = blob.history.into_iter().filter(|h| !h.empty_layer);

    Ok(image
        .fs_layers
        .iter()
        .map(|layer| FsLayerCommand {
            layer: layer.digest.clone(),
            command: history.next().map(|h| trim_nop(&h.created_by).to_string()).unwrap_or_default(),
        })
        .collect())
}

fn trim_nop(command: &str) -> &str {
    let command = command.trim();
    NOP_PREFIXES
        .iter()
        .find_map(|prefix| command.strip_prefix(prefix))
        .map(str::trim)
        .unwrap_or(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FsLayer, RegistryConfig};

    fn image_with(layers: &[&str], config: Option<&str>) -> Image {
        let mut image =
            Image::new(&RegistryConfig { image_name: "nginx".into(), ..Default::default() })
                .unwrap();
        image.fs_layers = layers
            .iter()
            .map(|d| FsLayer { digest: d.to_string(), media_type: String::new(), size: 0 })
            .collect();
        image.config = config.map(str::to_string);
        image
    }

    #[test]
    fn test_layer_commands_skip_empty_layers() {
        let config = r#"{"history": [
            {"created_by": "/bin/sh -c #(nop) ADD file:abc in / "},
            {"created_by": "/bin/sh -c #(nop)  ENV PATH=/usr/bin", "empty_layer": true},
            {"created_by": "/bin/sh -c apt-get update"}
        ]}"#;
        let image = image_with(&["sha256:a", "sha256:b"], Some(config));
        let commands = layer_commands(&image).unwrap();
        assert_eq!(
            commands,
            vec![
                FsLayerCommand { layer: "sha256:a".into(), command: "ADD file:abc in /".into() },
                FsLayerCommand {
                    layer: "sha256:b".into(),
                    command: "/bin/sh -c apt-get update".into()
                },
            ]
        );
    }

    #[test]
    fn test_layer_commands_without_history() {
        let image = image_with(&["sha256:a", "sha256:b", "sha256:c"], None);
        let commands = layer_commands(&image).unwrap();
        assert_eq!(commands.len(), 3);
        assert!(commands.iter().all(|c| c.command.is_empty()));
    }

    #[test]
    fn test_layer_commands_bad_config() {
        let image = image_with(&["sha256:a"], Some("{not json"));
        assert!(matches!(layer_commands(&image), Err(KlarError::LayerCommands { .. })));
    }
}
