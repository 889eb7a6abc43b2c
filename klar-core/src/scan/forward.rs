//! Delivery of finished reports to a collector endpoint.

use std::time::Duration;

use tracing::{info, instrument};

use super::ScanResult;
use crate::error::{KlarError, Result};

/// POST the report as JSON to `url`.
#[instrument(skip(result))]
pub async fn forward_report(url: &str, result: &ScanResult, timeout: Duration) -> Result<()> {
    let client = reqwest::Client::builder().timeout(timeout).build().map_err(KlarError::internal)?;

    let response = client
        .post(url)
        .json(result)
        .send()
        .await
        .map_err(|e| KlarError::Other(anyhow::anyhow!("Failed to forward report to {url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(KlarError::Other(anyhow::anyhow!(
            "Report collector at {url} responded with {status}"
        )));
    }

    info!(%status, "Report forwarded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_forward_report_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reports"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let report = ScanResult { image_hash: "abc".into(), ..Default::default() };
        forward_report(&format!("{}/reports", server.uri()), &report, Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_forward_report_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = forward_report(&server.uri(), &ScanResult::default(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
