//! Runtime version directory parsing and selection.
//!
//! Hosting component directories are named after runtime versions, e.g.
//! `2.2.0` or `3.0.0-preview5-27626-15`. Selection picks the numerically
//! highest parseable name; directories that do not parse as versions are
//! skipped, never treated as version zero.

use std::cmp::Ordering;
use std::str::FromStr;

/// A parsed runtime version: numeric triple plus optional prerelease tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub prerelease: Option<String>,
}

impl FromStr for RuntimeVersion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (triple, prerelease) = match s.split_once('-') {
            Some((triple, tag)) if !tag.is_empty() => (triple, Some(tag.to_string())),
            Some(_) => return Err(()),
            None => (s, None),
        };

        let mut parts = triple.split('.');
        let major = parse_component(parts.next())?;
        let minor = parse_component(parts.next())?;
        let patch = parse_component(parts.next())?;
        if parts.next().is_some() {
            return Err(());
        }

        Ok(Self {
            major,
            minor,
            patch,
            prerelease,
        })
    }
}

fn parse_component(part: Option<&str>) -> Result<u32, ()> {
    part.filter(|p| !p.is_empty())
        .and_then(|p| p.parse().ok())
        .ok_or(())
}

impl Ord for RuntimeVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                // A release sorts above any prerelease of the same triple.
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for RuntimeVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pick the directory name carrying the highest parseable version.
///
/// Returns `None` when no name parses as a version.
pub fn highest_version_directory<I, S>(names: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| {
            let name = name.as_ref();
            name.parse::<RuntimeVersion>()
                .ok()
                .map(|version| (version, name.to_string()))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, name)| name)
}
