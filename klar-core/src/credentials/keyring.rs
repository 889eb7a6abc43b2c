//! Registry credential keyrings built from pull-secret documents.

use std::collections::BTreeMap;

use base64::Engine;
use serde::Deserialize;
use tracing::debug;

use super::reference::normalize_registry_host;
use crate::error::{KlarError, Result};

/// A username/password or identity-token pair found in a keyring.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
    pub identity_token: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("identity_token", &redacted(&self.identity_token))
            .finish()
    }
}

pub(crate) fn redacted(value: &str) -> &'static str {
    if value.is_empty() {
        ""
    } else {
        "<redacted>"
    }
}

/// Lookup of registry credentials by image name.
///
/// Implementations return every credential whose registry key matches the
/// normalised image name (`registry/repository`, no tag or digest).
pub trait CredentialKeyring {
    fn lookup(&self, image: &str) -> Vec<Credential>;
}

/// Keyring backed by a container-registry auth config document.
///
/// Accepts both the `{"auths": {...}}` layout and the legacy flat layout,
/// either as raw JSON or base64-encoded as stored in a cluster secret.
#[derive(Debug, Clone, Default)]
pub struct DockerConfigKeyring {
    /// Normalised key -> credentials registered under it
    entries: BTreeMap<String, Vec<Credential>>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfigEntry {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    auth: String,
    #[serde(default, rename = "identitytoken")]
    identity_token: String,
}

impl DockerConfigKeyring {
    /// Parse a pull-secret document into a keyring.
    pub fn parse(document: &str) -> Result<Self> {
        let value = parse_document(document)?;

        let auths = match value.get("auths") {
            Some(auths) => auths.clone(),
            None => value,
        };
        let auths: BTreeMap<String, DockerConfigEntry> = serde_json::from_value(auths)
            .map_err(|e| KlarError::MalformedPullSecret { reason: e.to_string() })?;

        let mut keyring = Self::default();
        for (location, entry) in auths {
            let credential = entry.into_credential(&location)?;
            keyring.add(&location, credential);
        }

        debug!(keys = keyring.entries.len(), "Parsed image pull secret");
        Ok(keyring)
    }

    /// Register a credential for a registry location such as
    /// `https://index.docker.io/v1/` or `quay.io/org`.
    pub fn add(&mut self, location: &str, credential: Credential) {
        let key = normalize_key(location);
        self.entries.entry(key).or_default().push(credential);
    }
}

impl CredentialKeyring for DockerConfigKeyring {
    fn lookup(&self, image: &str) -> Vec<Credential> {
        let mut matched: Vec<(&String, &Vec<Credential>)> =
            self.entries.iter().filter(|(key, _)| key_matches(key, image)).collect();
        // Deepest path first, then longest key.
        matched.sort_by(|(a, _), (b, _)| {
            specificity(b).cmp(&specificity(a)).then_with(|| a.cmp(b))
        });
        matched.into_iter().flat_map(|(_, creds)| creds.iter().cloned()).collect()
    }
}

impl DockerConfigEntry {
    fn into_credential(self, location: &str) -> Result<Credential> {
        let (mut username, mut password) = (self.username, self.password);

        if !self.auth.is_empty() {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(self.auth.trim())
                .map_err(|e| KlarError::MalformedPullSecret {
                    reason: format!("auth for {} is not valid base64: {}", location, e),
                })?;
            let decoded = String::from_utf8(decoded).map_err(|_| KlarError::MalformedPullSecret {
                reason: format!("auth for {} is not valid UTF-8", location),
            })?;
            let (user, pass) =
                decoded.split_once(':').ok_or_else(|| KlarError::MalformedPullSecret {
                    reason: format!("auth for {} must be in user:password form", location),
                })?;
            username = user.to_string();
            password = pass.to_string();
        }

        Ok(Credential { username, password, identity_token: self.identity_token })
    }
}

fn parse_document(document: &str) -> Result<serde_json::Value> {
    let document = document.trim();
    let value = match serde_json::from_str::<serde_json::Value>(document) {
        Ok(value) => value,
        Err(json_err) => base64::engine::general_purpose::STANDARD
            .decode(document)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(|| KlarError::MalformedPullSecret { reason: json_err.to_string() })?,
    };

    if !value.is_object() {
        return Err(KlarError::MalformedPullSecret {
            reason: "document must be a JSON object".to_string(),
        });
    }
    Ok(value)
}

/// Reduce a registry location to `host[:port][/path]` without scheme,
/// API version prefix or trailing slash.
fn normalize_key(location: &str) -> String {
    let location = location.trim();
    let location = location
        .strip_prefix("https://")
        .or_else(|| location.strip_prefix("http://"))
        .unwrap_or(location);

    let (host, path) = match location.split_once('/') {
        Some((host, path)) => (host, path),
        None => (location, ""),
    };
    let path = path.strip_prefix("v1/").or_else(|| path.strip_prefix("v2/")).unwrap_or(path);
    let path = match path {
        "v1" | "v2" => "",
        other => other,
    };
    let path = path.trim_matches('/');

    let host = normalize_registry_host(host);
    if path.is_empty() {
        host.to_string()
    } else {
        format!("{}/{}", host, path)
    }
}

fn specificity(key: &str) -> (usize, usize) {
    (key.matches('/').count(), key.len())
}

fn split_host_port(host: &str) -> (&str, &str) {
    host.rsplit_once(':').unwrap_or((host, ""))
}

fn key_matches(key: &str, image: &str) -> bool {
    let (key_host, key_path) = key.split_once('/').unwrap_or((key, ""));
    let (image_host, image_path) = image.split_once('/').unwrap_or((image, ""));

    let (key_host, key_port) = split_host_port(key_host);
    let (image_host, image_port) = split_host_port(image_host);
    if key_port != image_port {
        return false;
    }

    let key_labels: Vec<&str> = key_host.split('.').collect();
    let image_labels: Vec<&str> = image_host.split('.').collect();
    if key_labels.len() != image_labels.len() {
        return false;
    }
    let hosts_match = key_labels
        .iter()
        .zip(&image_labels)
        .all(|(pattern, label)| glob_match(&pattern.to_ascii_lowercase(), &label.to_ascii_lowercase()));
    if !hosts_match {
        return false;
    }

    if key_path.is_empty() {
        return true;
    }
    let image_components: Vec<&str> = image_path.split('/').collect();
    let key_components: Vec<&str> = key_path.split('/').collect();
    key_components.len() <= image_components.len()
        && key_components.iter().zip(&image_components).all(|(k, i)| k == i)
}

/// Shell-style match of a single host label, supporting `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            p = star_p + 1;
            t = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
