use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{CompileError, CompileResult};

/// The canonical identifier of one stylesheet source.
///
/// Two identifiers name the same source iff their canonical serializations
/// are byte-equal; the resolver that produced an identifier is responsible
/// for canonicalizing it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SourceUrl(Url);

impl SourceUrl {
    pub fn parse(input: &str) -> CompileResult<Self> {
        Url::parse(input)
            .map(SourceUrl)
            .map_err(|_| CompileError::InvalidUrl(input.to_string()))
    }

    /// Build a `file:` identifier from a filesystem path. Existing files are
    /// canonicalized through the filesystem so symlinked spellings of one
    /// file compare equal; nonexistent paths are only absolutized.
    pub fn from_file_path(path: &Path) -> CompileResult<Self> {
        let absolute = match std::fs::canonicalize(path) {
            Ok(resolved) => resolved,
            Err(_) if path.is_absolute() => normalize_components(path),
            Err(_) => normalize_components(&std::env::current_dir()?.join(path)),
        };
        Url::from_file_path(&absolute)
            .map(SourceUrl)
            .map_err(|()| CompileError::InvalidUrl(absolute.display().to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    pub fn to_file_path(&self) -> Option<PathBuf> {
        if self.0.scheme() == "file" {
            self.0.to_file_path().ok()
        } else {
            None
        }
    }

    /// Resolve a (possibly relative) reference against this identifier.
    pub fn join(&self, reference: &str) -> Option<SourceUrl> {
        self.0.join(reference).ok().map(SourceUrl)
    }

    fn file_name(&self) -> &str {
        self.0.path().rsplit('/').next().unwrap_or_default()
    }

    /// The default `@use` namespace: the basename without its extension and
    /// without a partial's leading underscore.
    pub fn stem(&self) -> String {
        let name = self.file_name();
        let name = name.strip_prefix('_').unwrap_or(name);
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => name.to_string(),
        }
    }

    pub fn is_partial(&self) -> bool {
        self.file_name().starts_with('_')
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl fmt::Debug for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceUrl({})", self.0)
    }
}

/// The scheme of a reference as written, if it is an absolute URL.
pub fn reference_scheme(reference: &str) -> Option<&str> {
    let colon = reference.find(':')?;
    let candidate = &reference[..colon];
    let mut chars = candidate.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return None,
    }
    if chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.')) {
        Some(candidate)
    } else {
        None
    }
}

fn normalize_components(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_strips_partial_prefix_and_extension() {
        let url = SourceUrl::parse("file:///lib/_venus.scss").expect("parse");
        assert_eq!(url.stem(), "venus");
        assert!(url.is_partial());

        let url = SourceUrl::parse("u:other").expect("parse");
        assert_eq!(url.stem(), "other");
    }

    #[test]
    fn reference_scheme_detection() {
        assert_eq!(reference_scheme("package:pkg/thing"), Some("package"));
        assert_eq!(reference_scheme("first:other"), Some("first"));
        assert_eq!(reference_scheme("dir/other"), None);
        assert_eq!(reference_scheme("other.scss"), None);
        assert_eq!(reference_scheme("../up"), None);
    }

    #[test]
    fn join_resolves_relative_references() {
        let base = SourceUrl::parse("file:///srv/styles/test.scss").expect("parse");
        let joined = base.join("sub/other").expect("join");
        assert_eq!(joined.as_str(), "file:///srv/styles/sub/other");
    }
}
