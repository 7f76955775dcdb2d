//! Python interpreter changes and their effect on noarch packages.

use condor_spec::PackageInfo;
use std::fmt;
use std::sync::Arc;

/// Segments that must agree for two pythons to share compiled bytecode
const ABI_SEGMENTS: usize = 2;

/// The interpreter being replaced and its replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonChange {
    pub old: Arc<PackageInfo>,
    pub new: Arc<PackageInfo>,
    /// The new interpreter can load the old one's bytecode
    pub compatible: bool,
}

impl PythonChange {
    /// Compare the installed python against the one being linked.
    ///
    /// Returns `None` when either side is missing.
    pub fn detect<'a>(
        installed: impl IntoIterator<Item = &'a Arc<PackageInfo>>,
        links: impl IntoIterator<Item = &'a Arc<PackageInfo>>,
    ) -> Option<Self> {
        let old = find_python(installed)?;
        let new = find_python(links)?;
        let compatible = new.version.segments_equal(&old.version, ABI_SEGMENTS);

        Some(Self {
            old: Arc::clone(old),
            new: Arc::clone(new),
            compatible,
        })
    }

    pub fn needs_recompile(&self) -> bool {
        !self.compatible
    }
}

impl fmt::Display for PythonChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "python {} -> {}", self.old.version, self.new.version)
    }
}

fn find_python<'a>(packages: impl IntoIterator<Item = &'a Arc<PackageInfo>>) -> Option<&'a Arc<PackageInfo>> {
    packages.into_iter().find(|p| p.name.eq_ignore_ascii_case("python"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use condor_spec::Version;

    fn python(version: &str) -> Arc<PackageInfo> {
        Arc::new(PackageInfo::new("python", Version::parse(version).unwrap(), "h0_0"))
    }

    #[test]
    fn test_minor_bump_is_incompatible() {
        let change = PythonChange::detect(&[python("3.10.4")], &[python("3.11.0")]).unwrap();
        assert!(change.needs_recompile());
        assert_eq!(change.to_string(), "python 3.10.4 -> 3.11.0");
    }

    #[test]
    fn test_patch_bump_is_compatible() {
        let change = PythonChange::detect(&[python("3.10.4")], &[python("3.10.12")]).unwrap();
        assert!(!change.needs_recompile());
    }

    #[test]
    fn test_patch_downgrade_is_compatible() {
        let change = PythonChange::detect(&[python("3.10.9")], &[python("3.10.4")]).unwrap();
        assert!(change.compatible);

        let change = PythonChange::detect(&[python("3.11.0")], &[python("3.10.9")]).unwrap();
        assert!(change.needs_recompile());
    }

    #[test]
    fn test_fresh_install_is_no_change() {
        assert!(PythonChange::detect(&[], &[python("3.11.0")]).is_none());
        assert!(PythonChange::detect(&[python("3.11.0")], &[]).is_none());
    }
}
