//! API versioning for the Backstep SDK, following semantic versioning
//! (SemVer 2.0.0).
//!
//! ## Versioning Strategy
//!
//! MAJOR.MINOR.PATCH — MAJOR for incompatible API changes, MINOR for
//! backward-compatible additions, PATCH for backward-compatible fixes.
//!
//! ## Deprecation Policy
//!
//! 1. Mark with `#[deprecated]` and a migration note.
//! 2. Keep deprecated APIs for at least one MINOR version.
//! 3. Remove in the next MAJOR version.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Current API version of the Backstep SDK.
pub const API_VERSION: Version = Version {
    major: 0,
    minor: 1,
    patch: 0,
};

/// Minimum supported API version.
pub const MIN_SUPPORTED_VERSION: Version = Version {
    major: 0,
    minor: 1,
    patch: 0,
};

/// A semantic version (MAJOR.MINOR.PATCH).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    major: u32,
    minor: u32,
    patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    pub fn parse(s: &str) -> Result<Self, VersionError> {
        s.parse()
    }

    pub const fn major(&self) -> u32 {
        self.major
    }

    pub const fn minor(&self) -> u32 {
        self.minor
    }

    pub const fn patch(&self) -> u32 {
        self.patch
    }

    /// Same major version, and this version is at least `required`.
    pub const fn is_compatible_with(&self, required: &Version) -> bool {
        if self.major != required.major {
            return false;
        }
        if self.minor < required.minor {
            return false;
        }
        if self.minor == required.minor && self.patch < required.patch {
            return false;
        }
        true
    }

    pub const fn is_supported(&self) -> bool {
        self.is_compatible_with(&MIN_SUPPORTED_VERSION) && API_VERSION.is_compatible_with(self)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(VersionError::InvalidFormat(s.to_string()));
        }
        let major = parts[0]
            .parse()
            .map_err(|_| VersionError::InvalidComponent("major".to_string(), parts[0].to_string()))?;
        let minor = parts[1]
            .parse()
            .map_err(|_| VersionError::InvalidComponent("minor".to_string(), parts[1].to_string()))?;
        let patch = parts[2]
            .parse()
            .map_err(|_| VersionError::InvalidComponent("patch".to_string(), parts[2].to_string()))?;
        Ok(Version { major, minor, patch })
    }
}

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("invalid version format: {0} (expected MAJOR.MINOR.PATCH)")]
    InvalidFormat(String),
    #[error("invalid {0} component: {1}")]
    InvalidComponent(String, String),
    #[error("incompatible version: requested {requested}, current API is {current}")]
    Incompatible { requested: Version, current: Version },
    #[error("unsupported version: {requested} (minimum supported is {min_supported})")]
    Unsupported {
        requested: Version,
        min_supported: Version,
    },
}

pub fn is_compatible(client_version: &Version) -> bool {
    API_VERSION.is_compatible_with(client_version) && client_version.is_supported()
}

pub fn negotiate_version(client_version: &Version) -> Result<(), VersionError> {
    if !client_version.is_supported() {
        return Err(VersionError::Unsupported {
            requested: *client_version,
            min_supported: MIN_SUPPORTED_VERSION,
        });
    }
    if !is_compatible(client_version) {
        return Err(VersionError::Incompatible {
            requested: *client_version,
            current: API_VERSION,
        });
    }
    Ok(())
}

pub fn version_string() -> String {
    API_VERSION.to_string()
}

pub fn version_info() -> String {
    format!(
        "Backstep SDK v{}\nMinimum Supported Version: v{}\nAPI Stability: {}",
        API_VERSION,
        MIN_SUPPORTED_VERSION,
        if API_VERSION.major == 0 {
            "Development (pre-1.0, API may change)"
        } else {
            "Stable"
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_roundtrips_through_display_and_parse() {
        let v = Version::new(1, 2, 3);
        assert_eq!(Version::parse(&v.to_string()).unwrap(), v);
        assert!(Version::parse("1.2").is_err());
        assert!(Version::parse("a.b.c").is_err());
    }

    #[test]
    fn newer_minor_is_compatible_with_older_required() {
        let v1_0_0 = Version::new(1, 0, 0);
        let v1_2_3 = Version::new(1, 2, 3);
        assert!(v1_2_3.is_compatible_with(&v1_0_0));
        assert!(!v1_0_0.is_compatible_with(&v1_2_3));
    }

    #[test]
    fn different_major_versions_are_incompatible() {
        assert!(!Version::new(2, 0, 0).is_compatible_with(&Version::new(1, 0, 0)));
    }

    #[test]
    fn negotiate_rejects_future_major_version() {
        assert!(negotiate_version(&Version::new(0, 1, 0)).is_ok());
        assert!(negotiate_version(&Version::new(1, 0, 0)).is_err());
    }
}
