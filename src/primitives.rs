use std::fmt;
use std::str::FromStr;

// --- Revisions ----------------------------------------------------------------

/// Revision of a boot artifact.
///
/// Positive values are store revisions and render as plain decimals (`42`).
/// Negative values are local, unasserted revisions and render with an `x`
/// prefix (`x3` is `-3`). Zero means "unset" and never appears in a filename.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Revision(pub i32);

impl Revision {
    pub const fn store(n: i32) -> Self {
        Revision(n)
    }

    /// Local revision `x<n>`. `n` must be positive.
    pub fn local(n: i32) -> Result<Self, PlacementError> {
        if n <= 0 {
            return Err(PlacementError::InvalidRevision(format!("x{n}")));
        }
        Ok(Revision(-n))
    }

    /// Zero is unset, and `i32::MIN` has no `x<N>` form that parses back.
    fn is_valid(&self) -> bool {
        self.0 != 0 && self.0 != i32::MIN
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            // Widened so that even an invalid i32::MIN renders.
            write!(f, "x{}", -(self.0 as i64))
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for Revision {
    type Err = PlacementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PlacementError::InvalidRevision(s.to_string());
        let (digits, local) = match s.strip_prefix('x') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let n: i32 = digits.parse().map_err(|_| invalid())?;
        if n == 0 {
            return Err(invalid());
        }
        if local {
            Revision::local(n)
        } else {
            Ok(Revision::store(n))
        }
    }
}

// --- Placement ----------------------------------------------------------------

const FILENAME_SUFFIX: &str = ".snap";
const MAX_NAME_LEN: usize = 40;

/// Errors decoding an artifact name, revision or filename.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error("invalid artifact name {0:?}")]
    InvalidName(String),
    #[error("invalid revision {0:?}")]
    InvalidRevision(String),
    #[error("{0:?} is not a <name>_<revision>.snap filename")]
    MalformedFilename(String),
}

/// Identity of one versioned boot artifact (a kernel or a base).
///
/// Two placements are equal when name and revision are equal; the filename is
/// derived and only used as the on-disk / boot-variable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactPlacement {
    name: String,
    revision: Revision,
}

impl ArtifactPlacement {
    pub fn new(name: impl Into<String>, revision: Revision) -> Result<Self, PlacementError> {
        let name = name.into();
        validate_name(&name)?;
        if !revision.is_valid() {
            return Err(PlacementError::InvalidRevision(revision.to_string()));
        }
        Ok(ArtifactPlacement { name, revision })
    }

    /// Decodes `<name>_<revision>.snap`.
    pub fn from_filename(filename: &str) -> Result<Self, PlacementError> {
        let malformed = || PlacementError::MalformedFilename(filename.to_string());
        let stem = filename.strip_suffix(FILENAME_SUFFIX).ok_or_else(malformed)?;
        // Names may not contain '_', so the last one separates the revision.
        let (name, revision) = stem.rsplit_once('_').ok_or_else(malformed)?;
        let revision: Revision = revision.parse()?;
        ArtifactPlacement::new(name, revision)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn filename(&self) -> String {
        format!("{}_{}{}", self.name, self.revision, FILENAME_SUFFIX)
    }

    /// Same artifact, ignoring how it was spelled on disk.
    pub fn same_artifact(&self, other: &ArtifactPlacement) -> bool {
        self.name == other.name && self.revision == other.revision
    }
}

impl fmt::Display for ArtifactPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename())
    }
}

impl FromStr for ArtifactPlacement {
    type Err = PlacementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactPlacement::from_filename(s)
    }
}

/// Store naming rule: lowercase letters, digits and single hyphens, at least
/// one letter, no hyphen at either end.
fn validate_name(name: &str) -> Result<(), PlacementError> {
    let ok = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && name.bytes().any(|b| b.is_ascii_lowercase())
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--");
    if ok {
        Ok(())
    } else {
        Err(PlacementError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_of_store_and_local_revisions() {
        let pc = ArtifactPlacement::new("pc-kernel", Revision::store(100)).unwrap();
        assert_eq!(pc.filename(), "pc-kernel_100.snap");
        let local = ArtifactPlacement::new("core20", Revision::local(2).unwrap()).unwrap();
        assert_eq!(local.filename(), "core20_x2.snap");
        assert_eq!((pc.name(), pc.revision()), ("pc-kernel", Revision(100)));
        assert_eq!(local.revision(), Revision(-2));
        assert_eq!(ArtifactPlacement::from_filename("core20_x2.snap").unwrap(), local);
    }

    #[test]
    fn rejects_bad_filenames() {
        for bad in [
            "",
            "pc-kernel_1",
            "pc-kernel.snap",
            "pc-kernel_0.snap",
            "pc-kernel_x0.snap",
            "pc-kernel_-1.snap",
            "pc-kernel_1a.snap",
            "Pc-kernel_1.snap",
            "_1.snap",
            "-pc_1.snap",
            "pc--kernel_1.snap",
            "123_1.snap",
        ] {
            assert!(ArtifactPlacement::from_filename(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn revision_range_boundaries() {
        assert!(ArtifactPlacement::new("pc-kernel", Revision(i32::MIN)).is_err());
        assert!(ArtifactPlacement::new("pc-kernel", Revision(0)).is_err());
        assert!(Revision::local(0).is_err());
        assert!(Revision::local(-5).is_err());
        assert!(Revision::local(i32::MIN).is_err());

        // The extremes that are accepted must survive their own filename.
        for rev in [Revision::store(i32::MAX), Revision::local(i32::MAX).unwrap()] {
            let p = ArtifactPlacement::new("pc-kernel", rev).unwrap();
            assert_eq!(ArtifactPlacement::from_filename(&p.filename()).unwrap(), p);
        }
        assert!(ArtifactPlacement::from_filename("pc-kernel_x2147483648.snap").is_err());
    }

    #[test]
    fn equality_is_name_and_revision() {
        let a = ArtifactPlacement::new("core20", Revision::store(7)).unwrap();
        let b = ArtifactPlacement::from_filename("core20_7.snap").unwrap();
        let c = ArtifactPlacement::new("core20", Revision::store(8)).unwrap();
        assert!(a.same_artifact(&b));
        assert_eq!(a, b);
        assert!(!a.same_artifact(&c));
    }
}
