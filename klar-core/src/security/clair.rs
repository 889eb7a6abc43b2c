//! Clair v1 API client.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, instrument};

use super::VulnerabilityScanner;
use crate::credentials::CredentialTriple;
use crate::error::{ErrorKind, KlarError, Result};
use crate::types::{trim_digest, Image, Severity, Vulnerability};

const DEFAULT_CLAIR_PORT: u16 = 6060;
const LAYER_FORMAT: &str = "Docker";

/// Client for the Clair v1 HTTP API.
#[derive(Clone)]
pub struct ClairClient {
    http: reqwest::Client,
    address: String,
    timeout: Duration,
}

impl ClairClient {
    /// Create a client for `address`.
    ///
    /// A missing scheme defaults to `http://` and a missing port to 6060.
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KlarError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, address: normalize_address(address), timeout })
    }

    async fn push_layer(&self, image: &Image, layer: &ClairLayer) -> Result<()> {
        let url = format!("{}/v1/layers", self.address);
        debug!(layer = %layer.name, parent = %layer.parent_name, "Pushing layer to Clair");

        let response = self
            .http
            .post(&url)
            .json(&LayerEnvelope { layer: layer.clone() })
            .send()
            .await
            .map_err(|e| scanner_error(image, format!("Failed to push layer {}: {}", layer.name, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = error_message(response).await;
            return Err(scanner_error(
                image,
                format!("Clair rejected layer {} (HTTP {}): {}", layer.name, status, message),
            ));
        }

        Ok(())
    }

    async fn layer_vulnerabilities(&self, image: &Image, name: &str) -> Result<Vec<Vulnerability>> {
        let url = format!("{}/v1/layers/{}?features&vulnerabilities", self.address, name);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| scanner_error(image, format!("Failed to query layer {}: {}", name, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = error_message(response).await;
            return Err(scanner_error(
                image,
                format!("Clair query for layer {} failed (HTTP {}): {}", name, status, message),
            ));
        }

        let envelope: LayerResponse = response
            .json()
            .await
            .map_err(|e| scanner_error(image, format!("Failed to parse Clair response: {}", e)))?;

        Ok(envelope
            .layer
            .features
            .into_iter()
            .flat_map(|feature| {
                let (feature_name, feature_version) = (feature.name, feature.version);
                feature.vulnerabilities.into_iter().map(move |v| Vulnerability {
                    name: v.name,
                    namespace_name: v.namespace_name,
                    description: v.description,
                    link: v.link,
                    severity: Severity::parse(&v.severity),
                    fixed_by: v.fixed_by,
                    feature_name: feature_name.clone(),
                    feature_version: feature_version.clone(),
                })
            })
            .collect())
    }

    async fn run_analysis(&self, image: &Image) -> Result<Vec<Vulnerability>> {
        let headers = LayerHeaders { authorization: authorization_header(&image.credentials) };

        let mut parent = String::new();
        for fs_layer in &image.fs_layers {
            let layer = ClairLayer {
                name: trim_digest(&fs_layer.digest).to_string(),
                path: image.blob_url(&fs_layer.digest),
                parent_name: parent.clone(),
                format: LAYER_FORMAT.to_string(),
                headers: headers.clone(),
            };
            self.push_layer(image, &layer).await?;
            parent = layer.name;
        }

        if parent.is_empty() {
            return Ok(Vec::new());
        }

        self.layer_vulnerabilities(image, &parent).await
    }
}

#[async_trait]
impl VulnerabilityScanner for ClairClient {
    #[instrument(skip(self, image), fields(image = %image.name, clair = %self.address))]
    async fn analyse(&self, image: &Image) -> Result<Vec<Vulnerability>> {
        info!(layers = image.fs_layers.len(), "Analysing image with Clair");

        let vulnerabilities = timeout(self.timeout, self.run_analysis(image)).await.map_err(|_| {
            KlarError::Timeout {
                operation: "Clair analysis".to_string(),
                timeout: self.timeout,
                kind: ErrorKind::Scanner,
            }
        })??;

        info!(count = vulnerabilities.len(), "Got results from Clair API");
        Ok(vulnerabilities)
    }
}

fn scanner_error(image: &Image, reason: String) -> KlarError {
    KlarError::ScannerFailed { image: image.name.clone(), reason }
}

async fn error_message(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

fn normalize_address(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    let mut url = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let authority = url.split_once("://").map(|(_, rest)| rest).unwrap_or(&url);
    let host = authority.split('/').next().unwrap_or(authority);
    let has_port = host.rsplit_once(':').is_some_and(|(_, port)| {
        !port.is_empty() && port.chars().all(|c| c.is_ascii_digit())
    });
    if !has_port && !authority.contains('/') {
        url = format!("{}:{}", url, DEFAULT_CLAIR_PORT);
    }
    url
}

/// Authorization header Clair sends when fetching layers from the registry.
fn authorization_header(credentials: &CredentialTriple) -> String {
    if !credentials.token.is_empty() && credentials.password.is_empty() {
        format!("Bearer {}", credentials.token)
    } else if !credentials.username.is_empty() || !credentials.password.is_empty() {
        let pair = format!("{}:{}", credentials.username, credentials.password);
        format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(pair))
    } else {
        String::new()
    }
}

// Clair v1 JSON structures

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct LayerEnvelope {
    layer: ClairLayer,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ClairLayer {
    name: String,
    path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    parent_name: String,
    format: String,
    headers: LayerHeaders,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct LayerHeaders {
    #[serde(skip_serializing_if = "String::is_empty")]
    authorization: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LayerResponse {
    layer: LayerDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LayerDetails {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Feature {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    vulnerabilities: Vec<ClairVulnerability>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ClairVulnerability {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    fixed_by: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FsLayer, RegistryConfig};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pulled_image(layers: &[&str]) -> Image {
        let mut image = Image::new(&RegistryConfig {
            image_name: "quay.io/org/app:1.0".into(),
            ..Default::default()
        })
        .unwrap();
        image.fs_layers = layers
            .iter()
            .map(|d| FsLayer { digest: d.to_string(), media_type: String::new(), size: 1 })
            .collect();
        image
    }

    const LAYER_JSON: &str = r#"{
        "Layer": {
            "Name": "bbb",
            "Features": [
                {
                    "Name": "openssl",
                    "Version": "1.1.1",
                    "Vulnerabilities": [
                        {
                            "Name": "CVE-2024-12345",
                            "NamespaceName": "debian:12",
                            "Severity": "High",
                            "FixedBy": "1.1.2",
                            "Link": "https://security-tracker.debian.org/CVE-2024-12345"
                        }
                    ]
                },
                {"Name": "curl", "Version": "7.80.0"}
            ]
        }
    }"#;

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("clair"), "http://clair:6060");
        assert_eq!(normalize_address("clair:7000"), "http://clair:7000");
        assert_eq!(normalize_address("https://clair.example.com/"), "https://clair.example.com:6060");
        assert_eq!(normalize_address("http://10.0.0.1:6060"), "http://10.0.0.1:6060");
    }

    #[test]
    fn test_authorization_header() {
        let mut creds = CredentialTriple::default();
        assert_eq!(authorization_header(&creds), "");

        creds.token = "tok".into();
        assert_eq!(authorization_header(&creds), "Bearer tok");

        let creds = CredentialTriple {
            username: "user".into(),
            password: "pass".into(),
            ..Default::default()
        };
        assert_eq!(authorization_header(&creds), "Basic dXNlcjpwYXNz");
    }

    #[tokio::test]
    async fn test_analyse_collects_feature_vulnerabilities() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/layers"))
            .and(body_partial_json(serde_json::json!({
                "Layer": {"Name": "bbb", "ParentName": "aaa", "Format": "Docker"}
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/layers"))
            .and(body_partial_json(serde_json::json!({
                "Layer": {"Name": "aaa", "Path": "https://quay.io/v2/org/app/blobs/sha256:aaa"}
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/layers/bbb"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LAYER_JSON))
            .mount(&server)
            .await;

        let clair = ClairClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let vulns = clair.analyse(&pulled_image(&["sha256:aaa", "sha256:bbb"])).await.unwrap();

        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].name, "CVE-2024-12345");
        assert_eq!(vulns[0].severity, Severity::High);
        assert_eq!(vulns[0].feature_name, "openssl");
        assert_eq!(vulns[0].feature_version, "1.1.1");
        assert!(vulns[0].is_fixed());
    }

    #[tokio::test]
    async fn test_analyse_reports_rejected_layer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/layers"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_string(r#"{"Error": {"Message": "could not find layer"}}"#),
            )
            .mount(&server)
            .await;

        let clair = ClairClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = clair.analyse(&pulled_image(&["sha256:aaa"])).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Scanner);
        assert!(err.to_string().contains("could not find layer"));
    }

    #[tokio::test]
    async fn test_analyse_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/layers"))
            .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let clair = ClairClient::new(&server.uri(), Duration::from_millis(200)).unwrap();
        let err = clair.analyse(&pulled_image(&["sha256:aaa"])).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Scanner);
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_analyse_without_layers() {
        let clair = ClairClient::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        let vulns = clair.analyse(&pulled_image(&[])).await.unwrap();
        assert!(vulns.is_empty());
    }
}
