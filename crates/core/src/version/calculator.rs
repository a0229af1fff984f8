//! Release / development version calculations built on [`Version`].

use tracing::debug;

use super::{Version, VersionUpgradeStrategy, LATEST, SNAPSHOT_QUALIFIER};
use crate::errors::VersionError;

/// Whether `version` is a pre-release version: it ends with the qualifier or
/// is the `LATEST` sentinel (both case-insensitive).
pub fn is_snapshot(version: &str) -> bool {
    let upper = version.to_ascii_uppercase();
    upper.ends_with(SNAPSHOT_QUALIFIER) || upper == LATEST
}

/// Strip the pre-release qualifier (and the separator in front of it).
///
/// Versions that are not pre-releases are returned unchanged.
pub fn calculate_release_version(version: &str) -> Result<String, VersionError> {
    if version.is_empty() {
        return Err(VersionError::Empty);
    }
    let upper = version.to_ascii_uppercase();
    if !upper.ends_with(SNAPSHOT_QUALIFIER) {
        return Ok(version.to_string());
    }

    let stripped = &version[..version.len() - SNAPSHOT_QUALIFIER.len()];
    let stripped = stripped
        .strip_suffix(&['-', '.'][..])
        .unwrap_or(stripped);
    if stripped.is_empty() {
        return Err(VersionError::NoReleaseForm(version.to_string()));
    }
    debug!(version, release = stripped, "calculated release version");
    Ok(stripped.to_string())
}

/// The development version that follows the release of `version`.
pub fn calculate_next_snapshot_version(
    version: &str,
    strategy: VersionUpgradeStrategy,
) -> Result<String, VersionError> {
    let release = calculate_release_version(version)?;
    let mut next = Version::parse(&release)?;
    next.increase(strategy);
    let next = next.to_string();
    debug!(version, next = %next, %strategy, "calculated next development version");
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::is_newer_version;

    #[test]
    fn test_is_snapshot() {
        assert!(is_snapshot("1.0-SNAPSHOT"));
        assert!(is_snapshot("1.0-snapshot"));
        assert!(is_snapshot("LATEST"));
        assert!(is_snapshot("latest"));
        assert!(!is_snapshot("1.0"));
        assert!(!is_snapshot("1.0-SNAPSHOT.1"));
    }

    #[test]
    fn test_release_version() {
        assert_eq!(calculate_release_version("1.0.0").unwrap(), "1.0.0");
        assert_eq!(calculate_release_version("1.0.0-SNAPSHOT").unwrap(), "1.0.0");
        assert_eq!(calculate_release_version("1.0.0.snapshot").unwrap(), "1.0.0");
        assert_eq!(
            calculate_release_version("3-Alpha1-SNAPSHOT").unwrap(),
            "3-Alpha1"
        );
        assert!(matches!(
            calculate_release_version("SNAPSHOT"),
            Err(VersionError::NoReleaseForm(_))
        ));
        assert_eq!(calculate_release_version(""), Err(VersionError::Empty));
    }

    #[test]
    fn test_end_to_end_examples() {
        let release = calculate_release_version("1.0.0").unwrap();
        assert_eq!(release, "1.0.0");
        assert_eq!(
            calculate_next_snapshot_version(&release, VersionUpgradeStrategy::Default).unwrap(),
            "1.0.1-SNAPSHOT"
        );

        let release = calculate_release_version("3-Alpha1-SNAPSHOT").unwrap();
        assert_eq!(
            calculate_next_snapshot_version(&release, VersionUpgradeStrategy::Default).unwrap(),
            "3-Alpha2-SNAPSHOT"
        );
    }

    #[test]
    fn test_release_strips_only_the_appended_qualifier() {
        for v in ["1.0.0", "2.1", "3-Alpha1", "1.0.0-rc-1", "7"] {
            let next = calculate_next_snapshot_version(v, VersionUpgradeStrategy::Default).unwrap();
            let release = calculate_release_version(&next).unwrap();
            assert_eq!(format!("{release}-SNAPSHOT"), next);
            let (a, b) = (Version::parse(&release).unwrap(), Version::parse(v).unwrap());
            assert_eq!(a.segments().len(), b.segments().len());
            assert_eq!(a.separators(), b.separators());
        }
    }

    #[test]
    fn test_increment_is_monotonic() {
        for v in ["1.0.0", "1.0.9", "0.99", "3-Alpha1", "10.0.0-rc-9", "2024.12"] {
            let next = calculate_next_snapshot_version(v, VersionUpgradeStrategy::Default).unwrap();
            let next_release = calculate_release_version(&next).unwrap();
            assert!(is_newer_version(&next_release, v), "{next_release} > {v}");
        }
    }
}
