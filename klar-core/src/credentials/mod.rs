//! Registry credential resolution.
//!
//! Credentials for the scanned image come from one of three places:
//! - explicit username/password/token settings, used as-is when any is set
//! - a pull-secret document (a registry auth config issued by the cluster),
//!   looked up by the image's registry host
//! - nothing at all, which means anonymous access

pub mod keyring;
pub mod reference;

pub use keyring::{Credential, CredentialKeyring, DockerConfigKeyring};
pub use reference::ImageReference;

use tracing::{debug, instrument};

use crate::error::{KlarError, Result};
use keyring::redacted;

/// Credentials used against the registry for one image.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialTriple {
    pub username: String,
    pub password: String,
    pub token: String,
    /// Skip TLS certificate verification
    pub insecure_tls: bool,
    /// Talk plain HTTP to the registry
    pub insecure_registry: bool,
}

impl CredentialTriple {
    /// No username, password or token: the registry is accessed anonymously.
    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty() && self.password.is_empty() && self.token.is_empty()
    }
}

impl std::fmt::Debug for CredentialTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialTriple")
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("token", &redacted(&self.token))
            .field("insecure_tls", &self.insecure_tls)
            .field("insecure_registry", &self.insecure_registry)
            .finish()
    }
}

/// Credentials supplied directly through settings.
#[derive(Clone, Default)]
pub struct ExplicitCredentials {
    pub username: String,
    pub password: String,
    pub token: String,
}

impl ExplicitCredentials {
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty() && self.token.is_empty()
    }
}

/// Resolve the credentials for `image`.
///
/// Explicit credentials win whenever any of them is non-empty. Otherwise the
/// pull-secret document, if present, must contain exactly one entry matching
/// the image's registry.
#[instrument(skip(explicit, pull_secret), fields(has_pull_secret = pull_secret.is_some()))]
pub fn resolve(
    image: &str,
    explicit: ExplicitCredentials,
    pull_secret: Option<&str>,
) -> Result<CredentialTriple> {
    if !explicit.is_empty() {
        debug!("Using explicitly configured registry credentials");
        return Ok(from_explicit(explicit));
    }

    match pull_secret {
        Some(document) => {
            let keyring = DockerConfigKeyring::parse(document)?;
            resolve_with_keyring(image, &keyring)
        }
        None => {
            debug!("No registry credentials configured, using anonymous access");
            Ok(CredentialTriple::default())
        }
    }
}

/// Look up the single credential for `image` in `keyring`.
pub fn resolve_with_keyring(
    image: &str,
    keyring: &dyn CredentialKeyring,
) -> Result<CredentialTriple> {
    let reference = ImageReference::parse(image)?;
    let name = reference.name();

    let mut matches = keyring.lookup(&name);
    if matches.len() != 1 {
        return Err(KlarError::CredentialLookup { image: name, matches: matches.len() });
    }

    let credential = matches.remove(0);
    debug!(image = %name, username = %credential.username, "Resolved registry credentials from pull secret");

    let token = if credential.username.is_empty() && credential.password.is_empty() {
        credential.identity_token
    } else {
        String::new()
    };

    Ok(CredentialTriple {
        username: credential.username,
        password: credential.password,
        token,
        ..Default::default()
    })
}

fn from_explicit(explicit: ExplicitCredentials) -> CredentialTriple {
    CredentialTriple {
        username: explicit.username,
        password: explicit.password,
        token: explicit.token,
        ..Default::default()
    }
}
