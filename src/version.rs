use crate::arguments::Strategy;
use crate::errors::StampError;
use std::fmt;
use std::str::FromStr;

/// Version written into a project that has no `Version` field yet.
pub const INITIAL_VERSION: &str = "1.0.0.0";

/// A four-part `major.minor.revision.build` version.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub revision: u64,
    pub build: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, revision: u64, build: u64) -> Self {
        Version { major, minor, revision, build }
    }

    /// Parses exactly four dot-separated runs of ASCII digits.
    pub fn parse(text: &str) -> Result<Self, StampError> {
        let malformed = || StampError::Format(text.to_string());
        let mut parts = [0u64; 4];
        let mut count = 0;
        for part in text.split('.') {
            if count == parts.len() || part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            parts[count] = part.parse().map_err(|_| malformed())?;
            count += 1;
        }
        if count != parts.len() {
            return Err(malformed());
        }
        let [major, minor, revision, build] = parts;
        Ok(Version::new(major, minor, revision, build))
    }

    /// Applies `strategy`, then zeroes the build component when `reset_build` is set.
    pub fn bump(self, strategy: Strategy, reset_build: bool) -> Result<Self, StampError> {
        let mut next = match strategy {
            Strategy::FullRevision => self.increment_build()?.increment_revision()?,
            Strategy::RevisionOnly => self.increment_revision()?,
            Strategy::NewMinor => Version {
                minor: increment(self.minor, &self)?,
                revision: 0,
                ..self
            },
            Strategy::NewMajor => Version {
                major: increment(self.major, &self)?,
                minor: 0,
                revision: 0,
                ..self
            },
        };
        if reset_build {
            next.build = 0;
        }
        Ok(next)
    }

    pub fn increment_build(self) -> Result<Self, StampError> {
        Ok(Version { build: increment(self.build, &self)?, ..self })
    }

    pub fn increment_revision(self) -> Result<Self, StampError> {
        Ok(Version { revision: increment(self.revision, &self)?, ..self })
    }
}

fn increment(component: u64, version: &Version) -> Result<u64, StampError> {
    component
        .checked_add(1)
        .ok_or_else(|| StampError::Format(version.to_string()))
}

impl Default for Version {
    fn default() -> Self {
        Version::new(1, 0, 0, 0)
    }
}

impl FromStr for Version {
    type Err = StampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.revision, self.build)
    }
}
