//! Container image reference parsing and normalisation.
//!
//! References follow the familiar `[registry[:port]/]repository[:tag][@digest]`
//! grammar. Short Docker Hub names are expanded to their canonical form:
//! `nginx` becomes `docker.io/library/nginx`.

use std::fmt;

use crate::error::{KlarError, Result};

/// Canonical Docker Hub domain.
pub const DOCKER_HUB_DOMAIN: &str = "docker.io";

/// Host serving the Docker Hub registry API.
pub const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";

const LEGACY_DOCKER_HUB_DOMAIN: &str = "index.docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";
const DEFAULT_TAG: &str = "latest";
const MAX_NAME_LEN: usize = 255;
const MAX_TAG_LEN: usize = 128;

/// A parsed, registry-qualified image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    domain: String,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    /// Parse and normalise an image reference.
    pub fn parse(image: &str) -> Result<Self> {
        let invalid = |reason: &str| KlarError::InvalidImageReference {
            image: image.to_string(),
            reason: reason.to_string(),
        };

        if image.is_empty() {
            return Err(invalid("reference is empty"));
        }

        let (remainder, digest) = match image.split_once('@') {
            Some((name, digest)) => {
                validate_digest(digest).map_err(|reason| invalid(&reason))?;
                (name, Some(digest.to_string()))
            }
            None => (image, None),
        };

        // A ':' after the last '/' separates the tag; one before it is a port.
        let last_slash = remainder.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match remainder[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                let tag = &remainder[split + 1..];
                validate_tag(tag).map_err(|reason| invalid(&reason))?;
                (&remainder[..split], Some(tag.to_string()))
            }
            None => (remainder, None),
        };

        let (domain, repository) = split_domain(name);
        validate_domain(&domain).map_err(|reason| invalid(&reason))?;
        validate_repository(&repository).map_err(|reason| invalid(&reason))?;

        let reference = Self { domain, repository, tag, digest };
        if reference.name().len() > MAX_NAME_LEN {
            return Err(invalid("repository name must not be more than 255 characters"));
        }

        Ok(reference)
    }

    /// Registry domain (e.g. "docker.io", "quay.io", "localhost:5000").
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Repository path within the registry (e.g. "library/nginx").
    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Fully-qualified name without tag or digest, used for credential lookup.
    pub fn name(&self) -> String {
        format!("{}/{}", self.domain, self.repository)
    }

    /// Host to talk to for registry API calls.
    pub fn api_host(&self) -> &str {
        if self.domain == DOCKER_HUB_DOMAIN {
            DOCKER_HUB_API_HOST
        } else {
            &self.domain
        }
    }

    /// Fully-qualified reference, defaulting the tag to "latest" when neither
    /// tag nor digest was given.
    pub fn whole(&self) -> String {
        let mut whole = self.name();
        match (&self.tag, &self.digest) {
            (tag, Some(digest)) => {
                if let Some(tag) = tag {
                    whole.push(':');
                    whole.push_str(tag);
                }
                whole.push('@');
                whole.push_str(digest);
            }
            (Some(tag), None) => {
                whole.push(':');
                whole.push_str(tag);
            }
            (None, None) => {
                whole.push(':');
                whole.push_str(DEFAULT_TAG);
            }
        }
        whole
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.whole())
    }
}

/// Normalise a registry host as written in a credential document, mapping the
/// Docker Hub aliases onto the canonical domain.
pub fn normalize_registry_host(host: &str) -> &str {
    match host {
        LEGACY_DOCKER_HUB_DOMAIN | DOCKER_HUB_API_HOST => DOCKER_HUB_DOMAIN,
        other => other,
    }
}

fn split_domain(name: &str) -> (String, String) {
    let (domain, repository) = match name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (normalize_registry_host(first).to_string(), rest.to_string())
        }
        _ => (DOCKER_HUB_DOMAIN.to_string(), name.to_string()),
    };

    let repository = if domain == DOCKER_HUB_DOMAIN && !repository.contains('/') {
        format!("{}{}", OFFICIAL_REPO_PREFIX, repository)
    } else {
        repository
    };

    (domain, repository)
}

fn validate_domain(domain: &str) -> std::result::Result<(), String> {
    let (host, port) = match domain.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (domain, None),
    };

    if let Some(port) = port {
        if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid registry port {:?}", port));
        }
    }

    let valid_label = |label: &str| {
        !label.is_empty()
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    };
    if host.is_empty() || !host.split('.').all(valid_label) {
        return Err(format!("invalid registry host {:?}", host));
    }

    Ok(())
}

fn validate_repository(repository: &str) -> std::result::Result<(), String> {
    if repository.is_empty() {
        return Err("repository name is empty".to_string());
    }

    for component in repository.split('/') {
        let valid = !component.is_empty()
            && component
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
            && component.starts_with(|c: char| c.is_ascii_alphanumeric())
            && component.ends_with(|c: char| c.is_ascii_alphanumeric());
        if !valid {
            return Err(format!(
                "repository component {:?} must be lowercase alphanumerics separated by '.', '_' or '-'",
                component
            ));
        }
    }

    Ok(())
}

fn validate_tag(tag: &str) -> std::result::Result<(), String> {
    let valid = !tag.is_empty()
        && tag.len() <= MAX_TAG_LEN
        && tag.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        && tag.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(format!("invalid tag {:?}", tag))
    }
}

fn validate_digest(digest: &str) -> std::result::Result<(), String> {
    match digest.split_once(':') {
        Some((algorithm, encoded))
            if !algorithm.is_empty()
                && algorithm.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                && encoded.len() >= 32
                && encoded.chars().all(|c| c.is_ascii_hexdigit()) =>
        {
            Ok(())
        }
        _ => Err(format!("invalid digest {:?}", digest)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_parse_short_name() {
        let r = ImageReference::parse("nginx").unwrap();
        assert_eq!(r.domain(), "docker.io");
        assert_eq!(r.repository(), "library/nginx");
        assert_eq!(r.name(), "docker.io/library/nginx");
        assert_eq!(r.tag(), None);
        assert_eq!(r.whole(), "docker.io/library/nginx:latest");
    }

    #[test]
    fn test_parse_org_repo_with_tag() {
        let r = ImageReference::parse("myorg/myapp:v1.0").unwrap();
        assert_eq!(r.name(), "docker.io/myorg/myapp");
        assert_eq!(r.tag(), Some("v1.0"));
    }

    #[test]
    fn test_parse_registry_with_port() {
        let r = ImageReference::parse("localhost:5000/team/app:2").unwrap();
        assert_eq!(r.domain(), "localhost:5000");
        assert_eq!(r.repository(), "team/app");
        assert_eq!(r.tag(), Some("2"));
        assert_eq!(r.api_host(), "localhost:5000");
    }

    #[test]
    fn test_parse_digest() {
        let image = format!("ghcr.io/org/repo@{}", DIGEST);
        let r = ImageReference::parse(&image).unwrap();
        assert_eq!(r.digest(), Some(DIGEST));
        assert_eq!(r.whole(), image);
    }

    #[test]
    fn test_legacy_docker_hub_domain_is_normalized() {
        let r = ImageReference::parse("index.docker.io/library/redis:7").unwrap();
        assert_eq!(r.domain(), "docker.io");
        assert_eq!(r.api_host(), DOCKER_HUB_API_HOST);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ImageReference::parse("").is_err());
        assert!(ImageReference::parse("Nginx").is_err());
        assert!(ImageReference::parse("nginx:").is_err());
        assert!(ImageReference::parse("nginx@sha256:zz").is_err());
        assert!(ImageReference::parse("quay.io//app").is_err());
        assert!(ImageReference::parse("registry:port/app").is_err());
    }
}
