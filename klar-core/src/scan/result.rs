//! Scan report assembly.

use serde::{Deserialize, Serialize};

use crate::types::{trim_digest, FsLayerCommand, Image, Severity, Vulnerability};

/// Aggregated output of one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScanResult {
    /// Findings from the analysis service (empty if analysis failed)
    pub vulnerabilities: Vec<Vulnerability>,

    /// Build command for each layer, base layer first
    pub fs_layer_commands: Vec<FsLayerCommand>,

    /// Manifest digest without the algorithm prefix
    pub image_hash: String,

    /// Manifest schema version
    pub image_schema_version: u8,
}

/// Package whatever the pipeline produced into a report.
pub fn aggregate(
    image: &Image,
    fs_layer_commands: Vec<FsLayerCommand>,
    vulnerabilities: Vec<Vulnerability>,
) -> ScanResult {
    ScanResult {
        vulnerabilities,
        fs_layer_commands,
        image_hash: trim_digest(&image.digest).to_string(),
        image_schema_version: image.schema_version,
    }
}

impl ScanResult {
    /// Findings at or above `min_severity`, optionally dropping ones without a fix.
    pub fn reportable(&self, min_severity: Severity, ignore_unfixed: bool) -> Vec<&Vulnerability> {
        self.vulnerabilities
            .iter()
            .filter(|v| v.severity >= min_severity)
            .filter(|v| !ignore_unfixed || v.is_fixed())
            .collect()
    }
}

/// Vulnerability counts by severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilitySummary {
    pub unknown: usize,
    pub negligible: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
    pub defcon1: usize,
    pub total: usize,
}

impl VulnerabilitySummary {
    /// Create a new summary from a list of vulnerabilities.
    pub fn from_vulnerabilities<'a>(vulns: impl IntoIterator<Item = &'a Vulnerability>) -> Self {
        let mut summary = VulnerabilitySummary::default();
        for vuln in vulns {
            match vuln.severity {
                Severity::Unknown => summary.unknown += 1,
                Severity::Negligible => summary.negligible += 1,
                Severity::Low => summary.low += 1,
                Severity::Medium => summary.medium += 1,
                Severity::High => summary.high += 1,
                Severity::Critical => summary.critical += 1,
                Severity::Defcon1 => summary.defcon1 += 1,
            }
            summary.total += 1;
        }
        summary
    }

    /// Count for one severity.
    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Unknown => self.unknown,
            Severity::Negligible => self.negligible,
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
            Severity::Critical => self.critical,
            Severity::Defcon1 => self.defcon1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegistryConfig;

    fn pulled_image() -> Image {
        let mut image =
            Image::new(&RegistryConfig { image_name: "nginx:1.25".into(), ..Default::default() })
                .unwrap();
        image.digest = "sha256:deadbeef".into();
        image.schema_version = 2;
        image
    }

    fn vuln(name: &str, severity: Severity, fixed_by: &str) -> Vulnerability {
        Vulnerability {
            name: name.into(),
            severity,
            fixed_by: fixed_by.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_aggregate_normalizes_digest() {
        let commands =
            vec![FsLayerCommand { layer: "sha256:a".into(), command: "ADD rootfs".into() }];
        let result = aggregate(&pulled_image(), commands.clone(), Vec::new());

        assert_eq!(result.image_hash, "deadbeef");
        assert_eq!(result.image_schema_version, 2);
        assert_eq!(result.fs_layer_commands, commands);
        assert!(result.vulnerabilities.is_empty());
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let image = pulled_image();
        let commands = vec![FsLayerCommand { layer: "sha256:a".into(), command: "x".into() }];
        let vulns = vec![vuln("CVE-1", Severity::High, "")];

        let first = aggregate(&image, commands.clone(), vulns.clone());
        let second = aggregate(&image, commands, vulns);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reportable_filters() {
        let result = ScanResult {
            vulnerabilities: vec![
                vuln("CVE-1", Severity::Low, "1.0"),
                vuln("CVE-2", Severity::High, ""),
                vuln("CVE-3", Severity::Critical, "2.0"),
            ],
            ..Default::default()
        };

        assert_eq!(result.reportable(Severity::Unknown, false).len(), 3);
        assert_eq!(result.reportable(Severity::High, false).len(), 2);

        let fixed: Vec<_> =
            result.reportable(Severity::Unknown, true).iter().map(|v| v.name.as_str()).collect();
        assert_eq!(fixed, vec!["CVE-1", "CVE-3"]);
    }

    #[test]
    fn test_vulnerability_summary() {
        let vulns = vec![
            vuln("a", Severity::Critical, ""),
            vuln("b", Severity::Critical, ""),
            vuln("c", Severity::High, ""),
            vuln("d", Severity::Negligible, ""),
            vuln("e", Severity::Defcon1, ""),
        ];

        let summary = VulnerabilitySummary::from_vulnerabilities(&vulns);
        assert_eq!(summary.critical, 2);
        assert_eq!(summary.high, 1);
        assert_eq!(summary.negligible, 1);
        assert_eq!(summary.count(Severity::Defcon1), 1);
        assert_eq!(summary.total, 5);
    }
}
