//! Pinned specs: constraints every solve must respect without forcing
//! anything to be installed.

use condor_spec::{MatchSpec, PackageInfo};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::{CondorError, ParseError, Result};

/// Pin the installed python to its `major.minor` series, unless one of the
/// requested specs names python itself.
pub fn pin_python_spec(installed: &[Arc<PackageInfo>], specs: &[MatchSpec]) -> Option<MatchSpec> {
    if specs.iter().any(|s| s.name() == Some("python")) {
        return None;
    }

    let python = installed.iter().find(|p| p.name.eq_ignore_ascii_case("python"))?;
    let text = match (python.version.major(), python.version.minor()) {
        (Some(major), Some(minor)) => format!("python {}.{}.*", major, minor),
        (Some(major), None) => format!("python {}.*", major),
        _ => return None,
    };

    MatchSpec::parse(&text).ok()
}

/// Parse the `pinned-packages` list from the configuration
pub fn pin_config_specs<S: AsRef<str>>(pins: &[S]) -> Result<Vec<MatchSpec>> {
    pins.iter()
        .map(|p| MatchSpec::parse(p.as_ref()).map_err(|e| CondorError::Parse(ParseError::MatchSpec(e))))
        .collect()
}

/// Read a pin file: one spec per line, blank lines and `#` comments skipped.
///
/// A missing file pins nothing.
pub fn pin_file_specs(path: impl AsRef<Path>) -> Result<Vec<MatchSpec>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    let specs = content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(MatchSpec::parse)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    log::debug!("Read {} pins from {}", specs.len(), path.display());
    Ok(specs)
}

/// An ordered set of pins with duplicates collapsed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinSet {
    specs: Vec<MatchSpec>,
}

impl PinSet {
    /// Union the sources in order; the first occurrence of a spec wins
    pub fn merge<I>(sources: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoIterator<Item = MatchSpec>,
    {
        let mut seen = HashSet::new();
        let mut specs = Vec::new();

        for spec in sources.into_iter().flatten() {
            if seen.insert(spec.to_string()) {
                specs.push(spec);
            }
        }

        Self { specs }
    }

    pub fn specs(&self) -> &[MatchSpec] {
        &self.specs
    }

    pub fn into_specs(self) -> Vec<MatchSpec> {
        self.specs
    }

    /// Pins naming `name`
    pub fn for_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MatchSpec> {
        self.specs
            .iter()
            .filter(move |s| s.name().is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
