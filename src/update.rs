//! Advisory version checks against the published markers.

use std::cmp::Ordering;

use semver::Version;

use crate::fetch::{self, FetchError};

/// Version of this build, compared against the published app marker.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Outcome of comparing a local version with the published one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCheck {
    /// `None` when there is no local copy (e.g. no catalog downloaded yet).
    pub local: Option<String>,
    pub remote: String,
    pub update_available: bool,
}

/// Compare two dotted versions. A leading `v` is ignored and missing minor or
/// patch components count as zero, so `1.2` equals `1.2.0`.
pub fn compare_versions(local: &str, remote: &str) -> Result<Ordering, UpdateError> {
    Ok(parse_version(local)?.cmp(&parse_version(remote)?))
}

/// Fetch the app version marker and compare it with [`APP_VERSION`].
pub fn check_app_version(url: &str) -> Result<VersionCheck, UpdateError> {
    let remote = fetch::fetch_text(url, fetch::MARKER_TIMEOUT)?;
    log::debug!("Local app version: {}, remote: {}", APP_VERSION, remote);
    let update_available = compare_versions(APP_VERSION, &remote)? == Ordering::Less;
    if update_available {
        log::info!("New version available: {} (current {})", remote, APP_VERSION);
    }
    Ok(VersionCheck {
        local: Some(APP_VERSION.to_string()),
        remote,
        update_available,
    })
}

/// Fetch the catalog version marker and compare it with the local catalog version.
/// A missing local catalog always counts as outdated.
pub fn check_catalog_version(local: Option<&str>, url: &str) -> Result<VersionCheck, UpdateError> {
    let remote = crate::catalog::check_remote_version(url)?;
    let update_available = match local {
        None => true,
        Some(local) => compare_versions(local, &remote)? == Ordering::Less,
    };
    if update_available {
        log::info!(
            "Marketplace update available: {} (local {})",
            remote,
            local.unwrap_or("not found")
        );
    }
    Ok(VersionCheck {
        local: local.map(String::from),
        remote,
        update_available,
    })
}

fn parse_version(raw: &str) -> Result<Version, UpdateError> {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);

    let core_len = bare.find(['-', '+']).unwrap_or(bare.len());
    let dots = bare[..core_len].matches('.').count();
    let padded = match dots {
        0 => format!("{}.0.0{}", &bare[..core_len], &bare[core_len..]),
        1 => format!("{}.0{}", &bare[..core_len], &bare[core_len..]),
        _ => bare.to_string(),
    };

    Version::parse(&padded).map_err(|source| UpdateError::Version {
        value: raw.to_string(),
        source,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Unrecognised version '{value}': {source}")]
    Version {
        value: String,
        #[source]
        source: semver::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::test_server::{closed_url, serve_once};
    use rstest::rstest;

    #[rstest]
    #[case("1.0.0", "1.0.1", Ordering::Less)]
    #[case("1.0.9", "1.0.10", Ordering::Less)]
    #[case("2.0.0", "1.9.9", Ordering::Greater)]
    #[case("v1.2.3", "1.2.3", Ordering::Equal)]
    #[case("1.2", "1.2.0", Ordering::Equal)]
    #[case("1", "1.0.1", Ordering::Less)]
    #[case("1.0.0-beta", "1.0.0", Ordering::Less)]
    fn compares_dotted_versions(#[case] local: &str, #[case] remote: &str, #[case] expected: Ordering) {
        assert_eq!(compare_versions(local, remote).unwrap(), expected);
    }

    #[test]
    fn garbage_is_a_version_error() {
        assert!(matches!(
            compare_versions("1.0.0", "<html>"),
            Err(UpdateError::Version { .. })
        ));
    }

    #[test]
    fn newer_remote_app_version_is_reported() {
        let url = serve_once("200 OK", b"999.0.0\n".to_vec());
        let check = check_app_version(&url).unwrap();
        assert!(check.update_available);
        assert_eq!(check.remote, "999.0.0");
        assert_eq!(check.local.as_deref(), Some(APP_VERSION));
    }

    #[test]
    fn same_app_version_is_up_to_date() {
        let url = serve_once("200 OK", APP_VERSION.as_bytes().to_vec());
        assert!(!check_app_version(&url).unwrap().update_available);
    }

    #[test]
    fn missing_local_catalog_is_outdated() {
        let url = serve_once("200 OK", b"1.0.0".to_vec());
        let check = check_catalog_version(None, &url).unwrap();
        assert!(check.update_available);
        assert_eq!(check.local, None);
    }

    #[test]
    fn local_catalog_ahead_of_remote_is_not_outdated() {
        let url = serve_once("200 OK", b"1.0.3".to_vec());
        assert!(!check_catalog_version(Some("1.0.5"), &url).unwrap().update_available);
    }

    #[test]
    fn unreachable_marker_is_a_fetch_error() {
        let err = check_app_version(&closed_url()).unwrap_err();
        assert!(matches!(err, UpdateError::Fetch(ref e) if e.is_connection()));
    }
}
