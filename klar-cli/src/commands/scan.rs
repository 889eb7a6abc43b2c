//! `klar <image>` command

use anyhow::{Context, Result};
use colored::Colorize;
use klar_core::scan::forward_report;
use klar_core::{Config, ScanOutcome};
use tracing::info;

use super::report;

/// How a finished scan should be reported to the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// Report complete and within the threshold
    Passed,
    /// More reportable vulnerabilities than the threshold allows
    ThresholdExceeded { found: usize, threshold: usize },
    /// Report produced without analysis results
    Degraded,
}

impl ScanStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            ScanStatus::Passed => 0,
            ScanStatus::ThresholdExceeded { .. } => 1,
            ScanStatus::Degraded => 2,
        }
    }
}

/// Scan the configured image, print the report and forward it if requested.
pub async fn scan(config: &Config) -> Result<ScanStatus> {
    let image = &config.registry.image_name;
    let outcome =
        klar_core::scan(config).await.with_context(|| format!("Failed to scan {}", image))?;

    println!("{}", report::render(config, &outcome.result)?);

    if let Some(url) = &config.forwarding_target_url {
        let shown = report::reportable(config, &outcome.result);
        forward_report(url, &shown, config.clair_timeout)
            .await
            .with_context(|| format!("Failed to forward report for {}", image))?;
        info!(url = %url, "Report forwarded");
    }

    let status = status_for(config, &outcome);
    match status {
        ScanStatus::Degraded => {
            if let Some(err) = &outcome.scanner_error {
                eprintln!("{} {}", "Analysis failed:".red().bold(), err);
            }
        }
        ScanStatus::ThresholdExceeded { found, threshold } => {
            eprintln!(
                "{} {} vulnerabilities found, threshold is {}",
                "Threshold exceeded:".red().bold(),
                found,
                threshold
            );
        }
        ScanStatus::Passed => {}
    }

    Ok(status)
}

fn status_for(config: &Config, outcome: &ScanOutcome) -> ScanStatus {
    if outcome.is_degraded() {
        return ScanStatus::Degraded;
    }

    let found = outcome.result.reportable(config.clair_output, config.ignore_unfixed).len();
    if found > config.threshold {
        ScanStatus::ThresholdExceeded { found, threshold: config.threshold }
    } else {
        ScanStatus::Passed
    }
}
