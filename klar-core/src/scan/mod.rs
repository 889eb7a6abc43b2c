//! Scan orchestration.
//!
//! A scan runs four stages in order: pull the manifest, extract layer
//! commands, analyse the layers, aggregate the report. The first three are
//! fatal on failure. Analysis failure is not: the report is still produced
//! with no vulnerabilities and the analysis error is returned beside it.

mod forward;
mod result;

pub use forward::forward_report;
pub use result::{aggregate, ScanResult, VulnerabilitySummary};

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::error::{ErrorKind, KlarError, Result};
use crate::observability::metrics;
use crate::registry::{OciRegistryClient, RegistryClient};
use crate::security::{ClairClient, VulnerabilityScanner};
use crate::types::Image;

/// Outcome of a scan that got past the fatal stages.
#[derive(Debug)]
pub struct ScanOutcome {
    pub result: ScanResult,

    /// Set when analysis failed; `result.vulnerabilities` is then empty.
    pub scanner_error: Option<KlarError>,
}

impl ScanOutcome {
    /// Whether the report lacks analysis results.
    pub fn is_degraded(&self) -> bool {
        self.scanner_error.is_some()
    }
}

/// Scan the configured image with the default registry and Clair clients.
pub async fn scan(config: &Config) -> Result<ScanOutcome> {
    let registry = OciRegistryClient::new(&config.registry);
    let scanner = ClairClient::new(&config.clair_addr, config.clair_timeout)?;
    execute_scan(config, &registry, &scanner).await
}

/// Run the scan pipeline against the given registry and analysis service.
#[instrument(skip_all, fields(image = %config.registry.image_name))]
pub async fn execute_scan(
    config: &Config,
    registry: &dyn RegistryClient,
    scanner: &dyn VulnerabilityScanner,
) -> Result<ScanOutcome> {
    metrics::record_scan_started();
    let started = Instant::now();

    let mut image = Image::new(&config.registry).map_err(|e| stage_failed("reference", e))?;

    bounded("Registry pull", config.registry.timeout, ErrorKind::Pull, registry.pull(&mut image))
        .await
        .map_err(|e| stage_failed("pull", e))?;

    if !image.has_layers() {
        return Err(stage_failed("layers", KlarError::NoFsLayers { image: image.name.clone() }));
    }

    let commands = registry.fetch_fs_commands(&image).await.map_err(|e| stage_failed("layers", e))?;
    info!(layers = image.fs_layers.len(), "Layer commands extracted");

    let analysis =
        bounded("Clair analysis", config.clair_timeout, ErrorKind::Scanner, scanner.analyse(&image))
            .await;

    let (vulnerabilities, scanner_error) = match analysis {
        Ok(vulnerabilities) => (vulnerabilities, None),
        Err(e) => {
            let e = into_scanner_error(&image, e);
            error!(error = %e, "Analysis failed, reporting without vulnerabilities");
            (Vec::new(), Some(e))
        }
    };

    let result = aggregate(&image, commands, vulnerabilities);
    let summary = VulnerabilitySummary::from_vulnerabilities(&result.vulnerabilities);
    for severity in crate::types::Severity::ALL {
        let count = summary.count(severity);
        if count > 0 {
            metrics::record_vulnerabilities(severity.as_str(), count as u64);
        }
    }

    let outcome = ScanOutcome { result, scanner_error };
    metrics::record_scan_finished(started.elapsed().as_secs_f64(), outcome.is_degraded());

    if outcome.is_degraded() {
        warn!(digest = %outcome.result.image_hash, "Scan completed without analysis results");
    } else {
        info!(
            digest = %outcome.result.image_hash,
            vulnerabilities = summary.total,
            "Scan completed"
        );
    }

    Ok(outcome)
}

/// Await `fut` for at most `limit`.
async fn bounded<T>(
    operation: &str,
    limit: Duration,
    kind: ErrorKind,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut).await.map_err(|_| KlarError::Timeout {
        operation: operation.to_string(),
        timeout: limit,
        kind,
    })?
}

fn stage_failed(stage: &str, err: KlarError) -> KlarError {
    metrics::record_stage_failure(stage);
    err
}

/// Anything raised during analysis is an analysis failure.
fn into_scanner_error(image: &Image, err: KlarError) -> KlarError {
    match err.kind() {
        ErrorKind::Scanner => err,
        _ => KlarError::ScannerFailed { image: image.name.clone(), reason: err.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegistryConfig;

    #[tokio::test]
    async fn test_bounded_times_out() {
        let err = bounded("sleep", Duration::from_millis(10), ErrorKind::Pull, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Pull);
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let value = bounded("quick", Duration::from_secs(1), ErrorKind::Scanner, async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_into_scanner_error_reclassifies() {
        let image =
            Image::new(&RegistryConfig { image_name: "alpine".into(), ..Default::default() })
                .unwrap();

        let err = into_scanner_error(&image, KlarError::Internal("boom".into()));
        assert_eq!(err.kind(), ErrorKind::Scanner);
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("boom"));

        let err = into_scanner_error(
            &image,
            KlarError::ScannerFailed { image: "alpine".into(), reason: "down".into() },
        );
        assert!(matches!(err, KlarError::ScannerFailed { ref reason, .. } if reason == "down"));
    }
}
