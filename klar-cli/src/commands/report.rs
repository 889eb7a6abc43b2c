//! Report rendering for `klar`.
//!
//! Both formats only include vulnerabilities at or above the configured
//! output severity (and with a fix, when unfixed findings are ignored).

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use klar_core::{Config, OutputFormat, ScanResult, Severity, Vulnerability, VulnerabilitySummary};
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct LayerRow {
    #[tabled(rename = "LAYER")]
    layer: String,
    #[tabled(rename = "COMMAND")]
    command: String,
}

/// The report as it should be shown for `config`.
pub fn reportable(config: &Config, result: &ScanResult) -> ScanResult {
    ScanResult {
        vulnerabilities: result
            .reportable(config.clair_output, config.ignore_unfixed)
            .into_iter()
            .cloned()
            .collect(),
        ..result.clone()
    }
}

/// Render `result` in the configured format.
pub fn render(config: &Config, result: &ScanResult) -> Result<String> {
    let shown = reportable(config, result);
    match config.format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&shown).with_context(|| "Failed to encode report")
        }
        OutputFormat::Standard => Ok(render_standard(&config.registry.image_name, &shown)),
    }
}

fn render_standard(image: &str, result: &ScanResult) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Image: {} (digest {}, schema v{})\n\n",
        image,
        short_hash(&result.image_hash),
        result.image_schema_version
    ));

    let rows: Vec<LayerRow> = result
        .fs_layer_commands
        .iter()
        .map(|c| LayerRow {
            layer: short_hash(klar_core::types::trim_digest(&c.layer)).to_string(),
            command: if c.command.is_empty() { "-".to_string() } else { c.command.clone() },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::modern());
    out.push_str(&format!("{}\n\n", table));

    let summary = VulnerabilitySummary::from_vulnerabilities(&result.vulnerabilities);
    out.push_str(&format!("Found {} vulnerabilities\n", summary.total));
    for severity in Severity::ALL.into_iter().rev() {
        let count = summary.count(severity);
        if count > 0 {
            out.push_str(&format!("{}: {}\n", severity_label(severity), count));
        }
    }

    let mut vulns: Vec<&Vulnerability> = result.vulnerabilities.iter().collect();
    vulns.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.name.cmp(&b.name)));
    for vuln in vulns {
        out.push('\n');
        out.push_str(&format!("{}: [{}]\n", vuln.name, severity_label(vuln.severity)));
        if !vuln.feature_name.is_empty() {
            out.push_str(&format!("Found in: {} [{}]\n", vuln.feature_name, vuln.feature_version));
        }
        if vuln.is_fixed() {
            out.push_str(&format!("Fixed by: {}\n", vuln.fixed_by));
        }
        if !vuln.description.is_empty() {
            out.push_str(&format!("{}\n", vuln.description));
        }
        if !vuln.link.is_empty() {
            out.push_str(&format!("{}\n", vuln.link));
        }
    }

    out
}

fn severity_label(severity: Severity) -> ColoredString {
    let name = severity.as_str();
    match severity {
        Severity::Critical | Severity::Defcon1 => name.red().bold(),
        Severity::High => name.red(),
        Severity::Medium => name.yellow(),
        Severity::Low | Severity::Negligible => name.normal(),
        Severity::Unknown => name.dimmed(),
    }
}

/// First 12 characters of a hex digest.
fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
