//! Configuration management.
//!
//! All scan parameters are read from named environment settings, validated,
//! and frozen into one [`Config`] value before any network activity.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::credentials::{self, ExplicitCredentials};
use crate::error::{KlarError, Result};
use crate::types::{RegistryConfig, Severity};

pub const OPTION_CLAIR_ADDRESS: &str = "CLAIR_ADDR";
pub const OPTION_CLAIR_OUTPUT: &str = "CLAIR_OUTPUT";
pub const OPTION_KLAR_TRACE: &str = "KLAR_TRACE";
pub const OPTION_CLAIR_THRESHOLD: &str = "CLAIR_THRESHOLD";
pub const OPTION_CLAIR_TIMEOUT: &str = "CLAIR_TIMEOUT";
pub const OPTION_DOCKER_TIMEOUT: &str = "DOCKER_TIMEOUT";
pub const OPTION_JSON_OUTPUT: &str = "JSON_OUTPUT";
pub const OPTION_FORMAT_OUTPUT: &str = "FORMAT_OUTPUT";
pub const OPTION_DOCKER_USER: &str = "DOCKER_USER";
pub const OPTION_DOCKER_PASSWORD: &str = "DOCKER_PASSWORD";
pub const OPTION_DOCKER_TOKEN: &str = "DOCKER_TOKEN";
pub const OPTION_DOCKER_INSECURE: &str = "DOCKER_INSECURE";
pub const OPTION_DOCKER_PLATFORM_OS: &str = "DOCKER_PLATFORM_OS";
pub const OPTION_DOCKER_PLATFORM_ARCH: &str = "DOCKER_PLATFORM_ARCH";
pub const OPTION_REGISTRY_INSECURE: &str = "REGISTRY_INSECURE";
pub const OPTION_WHITELIST_FILE: &str = "WHITELIST_FILE";
pub const OPTION_IGNORE_UNFIXED: &str = "IGNORE_UNFIXED";
pub const OPTION_PULL_SECRET: &str = "K8S_IMAGE_PULL_SECRET";
pub const OPTION_STRICT_ENV: &str = "KLAR_STRICT_ENV";

/// Source of named settings.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// How the report is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Standard,
    Json,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 2] = [OutputFormat::Standard, OutputFormat::Json];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Standard => "standard",
            OutputFormat::Json => "json",
        }
    }
}

/// Longest accepted timeout (one year).
pub const MAX_TIMEOUT_MINUTES: i64 = 365 * 24 * 60;

/// Resolved, immutable scan configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Analysis service address
    pub clair_addr: String,

    /// Lowest severity included in the report
    pub clair_output: Severity,

    /// Maximum number of reported vulnerabilities before the scan is considered failed
    pub threshold: usize,

    /// Verbose tracing
    pub trace: bool,

    pub format: OutputFormat,

    /// Per-call analysis service timeout
    pub clair_timeout: Duration,

    /// Image, credentials and registry settings
    pub registry: RegistryConfig,

    /// Whitelist file; loading it is left to the caller
    pub whitelist_file: Option<PathBuf>,

    /// Drop findings that have no fix yet
    pub ignore_unfixed: bool,

    /// Settings that were malformed or deprecated and fell back to a default
    pub warnings: Vec<String>,

    /// Where to forward the final report, if anywhere
    pub forwarding_target_url: Option<String>,
}

/// Reads typed settings, either leniently (malformed values fall back to
/// defaults) or strictly (malformed values are errors).
pub struct SettingsReader<'a> {
    env: &'a dyn EnvSource,
    strict: bool,
    warnings: RefCell<Vec<String>>,
}

impl<'a> SettingsReader<'a> {
    pub fn new(env: &'a dyn EnvSource, strict: bool) -> Self {
        Self { env, strict, warnings: RefCell::new(Vec::new()) }
    }

    /// Record a setting that was accepted with a fallback.
    pub fn warn(&self, message: String) {
        self.warnings.borrow_mut().push(message);
    }

    /// Warnings collected so far.
    pub fn into_warnings(self) -> Vec<String> {
        self.warnings.into_inner()
    }

    /// Raw string value; unset and empty are both `None`.
    pub fn string(&self, key: &str) -> Option<String> {
        self.env.get(key).filter(|v| !v.is_empty())
    }

    /// Integer setting. Unset yields 0, as does an unparsable value in lenient mode.
    pub fn integer(&self, key: &str) -> Result<i64> {
        let Some(raw) = self.string(key) else {
            return Ok(0);
        };
        match raw.parse::<i64>() {
            Ok(value) => Ok(value),
            Err(_) if self.strict => Err(KlarError::InvalidSetting {
                name: key.to_string(),
                value: raw,
                expected: "integer",
            }),
            Err(_) => {
                self.warn(format!("{key}={raw:?} is not an integer, using 0"));
                Ok(0)
            }
        }
    }

    /// Boolean setting. Unset yields false, as does an unparsable value in lenient mode.
    pub fn flag(&self, key: &str) -> Result<bool> {
        let Some(raw) = self.string(key) else {
            return Ok(false);
        };
        match parse_bool(&raw) {
            Some(value) => Ok(value),
            None if self.strict => Err(KlarError::InvalidSetting {
                name: key.to_string(),
                value: raw,
                expected: "boolean",
            }),
            None => {
                self.warn(format!("{key}={raw:?} is not a boolean, using false"));
                Ok(false)
            }
        }
    }

    /// Timeout in minutes, clamped to `1..=MAX_TIMEOUT_MINUTES`.
    pub fn timeout_minutes(&self, key: &str) -> Result<Duration> {
        let minutes = self.integer(key)?;
        if minutes > MAX_TIMEOUT_MINUTES {
            self.warn(format!("{key}={minutes} exceeds {MAX_TIMEOUT_MINUTES} minutes, clamping"));
        }
        let minutes = minutes.clamp(1, MAX_TIMEOUT_MINUTES) as u64;
        Ok(Duration::from_secs(minutes * 60))
    }
}

/// Accepts the conventional spellings: 1, t, T, TRUE, true, True and their false counterparts.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Parse the output severity; unset means `Unknown`.
pub fn parse_output_priority(value: Option<&str>) -> Result<Severity> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(Severity::Unknown);
    };
    Severity::from_name(value).ok_or_else(|| KlarError::InvalidEnumValue {
        name: OPTION_CLAIR_OUTPUT.to_string(),
        value: value.to_string(),
        allowed: Severity::names(),
    })
}

fn parse_output_format(value: Option<&str>) -> Result<OutputFormat> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(OutputFormat::Standard);
    };
    let normalized = value.trim().to_lowercase();
    OutputFormat::ALL.into_iter().find(|f| f.as_str() == normalized).ok_or_else(|| {
        KlarError::InvalidEnumValue {
            name: OPTION_FORMAT_OUTPUT.to_string(),
            value: value.to_string(),
            allowed: OutputFormat::ALL.iter().map(|f| f.as_str().to_string()).collect(),
        }
    })
}

impl Config {
    /// Resolve the configuration for scanning `image_name` from `env`.
    pub fn resolve(env: &dyn EnvSource, image_name: &str) -> Result<Self> {
        let strict = parse_bool(&env.get(OPTION_STRICT_ENV).unwrap_or_default()).unwrap_or(false);
        let settings = SettingsReader::new(env, strict);

        let clair_addr = settings.string(OPTION_CLAIR_ADDRESS).ok_or_else(|| {
            KlarError::MissingRequired { name: OPTION_CLAIR_ADDRESS.to_string() }
        })?;

        let trace = settings.string(OPTION_KLAR_TRACE).is_some();
        let clair_output = parse_output_priority(settings.string(OPTION_CLAIR_OUTPUT).as_deref())?;

        let mut format = parse_output_format(settings.string(OPTION_FORMAT_OUTPUT).as_deref())?;
        if settings.flag(OPTION_JSON_OUTPUT)? {
            settings.warn(format!(
                "{} is deprecated, use {}=json",
                OPTION_JSON_OUTPUT, OPTION_FORMAT_OUTPUT
            ));
            format = OutputFormat::Json;
        }

        let threshold = settings.integer(OPTION_CLAIR_THRESHOLD)?.max(0) as usize;
        let clair_timeout = settings.timeout_minutes(OPTION_CLAIR_TIMEOUT)?;
        let docker_timeout = settings.timeout_minutes(OPTION_DOCKER_TIMEOUT)?;

        let explicit = ExplicitCredentials {
            username: settings.string(OPTION_DOCKER_USER).unwrap_or_default(),
            password: settings.string(OPTION_DOCKER_PASSWORD).unwrap_or_default(),
            token: settings.string(OPTION_DOCKER_TOKEN).unwrap_or_default(),
        };
        let pull_secret = settings.string(OPTION_PULL_SECRET);
        let mut credentials = credentials::resolve(image_name, explicit, pull_secret.as_deref())?;
        credentials.insecure_tls = settings.flag(OPTION_DOCKER_INSECURE)?;
        credentials.insecure_registry = settings.flag(OPTION_REGISTRY_INSECURE)?;
        let ignore_unfixed = settings.flag(OPTION_IGNORE_UNFIXED)?;

        Ok(Self {
            clair_addr,
            clair_output,
            threshold,
            trace,
            format,
            clair_timeout,
            registry: RegistryConfig {
                image_name: image_name.to_string(),
                credentials,
                timeout: docker_timeout,
                platform_os: settings.string(OPTION_DOCKER_PLATFORM_OS).unwrap_or_default(),
                platform_arch: settings.string(OPTION_DOCKER_PLATFORM_ARCH).unwrap_or_default(),
            },
            whitelist_file: settings.string(OPTION_WHITELIST_FILE).map(PathBuf::from),
            ignore_unfixed,
            forwarding_target_url: None,
            warnings: settings.into_warnings(),
        })
    }

    /// Log the warnings collected while resolving.
    ///
    /// Resolution runs before logging is set up, so callers emit these once
    /// a subscriber is installed.
    pub fn log_warnings(&self) {
        for message in &self.warnings {
            warn!("{}", message);
        }
    }

    /// Set the URL the final report is forwarded to.
    pub fn with_forwarding_target(mut self, url: Option<String>) -> Self {
        self.forwarding_target_url = url;
        self
    }
}
