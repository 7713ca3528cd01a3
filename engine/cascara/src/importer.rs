use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CompileError, CompileResult, Span};
use crate::options::{Options, Syntax};
use crate::uri::{reference_scheme, SourceUrl};

/// The contents of one resolved stylesheet, immutable once produced.
#[derive(Clone, Debug)]
pub struct StylesheetSource {
    pub url: SourceUrl,
    pub contents: String,
    pub syntax: Syntax,
}

/// A resolver for one family of stylesheet references.
///
/// `canonicalize` turns a reference as written in `@use`, `@forward`,
/// `@import` or `meta.load-css` into the canonical identifier of a source,
/// or `None` to pass the reference on to the next resolver in the chain.
/// `load` fetches the contents of an identifier this resolver produced;
/// returning `None` after a successful `canonicalize` is a hard error.
///
/// Both operations are async so resolvers backed by real I/O can suspend;
/// they are the only suspension points of a compilation. Purely in-memory
/// resolvers implement them without awaiting and work with the synchronous
/// entry points.
#[async_trait(?Send)]
pub trait Importer {
    async fn canonicalize(
        &self,
        reference: &str,
        from: Option<&SourceUrl>,
    ) -> CompileResult<Option<SourceUrl>>;

    async fn load(&self, url: &SourceUrl) -> CompileResult<Option<StylesheetSource>>;

    /// A scheme this importer promises never to return from `canonicalize`,
    /// used to force references written in that scheme through the importer
    /// for rewriting.
    fn non_canonical_scheme(&self) -> Option<&str> {
        None
    }
}

fn syntax_for_path(path: &Path) -> Syntax {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("sass") => Syntax::Indented,
        Some("css") => Syntax::Css,
        _ => Syntax::Scss,
    }
}

/// Resolves references against one base directory, with the reference
/// implementation's probing order: the path as written, then `.scss`,
/// `.sass` and `.css` extensions, each together with its partial form, and
/// an `_index` file when the path names a directory. More than one match in
/// the same probing tier is an ambiguity error.
#[derive(Clone, Debug)]
pub struct FilesystemImporter {
    base: PathBuf,
}

impl FilesystemImporter {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Probe for the file a path refers to, without extension or partial
    /// spelled out.
    pub(crate) fn probe(candidate: &Path) -> CompileResult<Option<PathBuf>> {
        let has_known_extension = matches!(
            candidate.extension().and_then(|ext| ext.to_str()),
            Some("scss" | "sass" | "css")
        );

        if let Some(found) = probe_tier(&with_partial(candidate))? {
            return Ok(Some(found));
        }
        if !has_known_extension {
            let scss = candidate.with_extension("scss");
            let sass = candidate.with_extension("sass");
            let mut tier = with_partial(&scss);
            tier.extend(with_partial(&sass));
            if let Some(found) = probe_tier(&tier)? {
                return Ok(Some(found));
            }
            if let Some(found) = probe_tier(&with_partial(&candidate.with_extension("css")))? {
                return Ok(Some(found));
            }
        }
        if candidate.is_dir() {
            if let Some(found) = probe_tier(&[
                candidate.join("_index.scss"),
                candidate.join("_index.sass"),
            ])? {
                return Ok(Some(found));
            }
            if let Some(found) = probe_tier(&[candidate.join("_index.css")])? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn canonical_url(path: &Path) -> CompileResult<SourceUrl> {
        SourceUrl::from_file_path(path)
    }
}

fn with_partial(path: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);
    if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
        if !name.starts_with('_') {
            candidates.push(path.with_file_name(format!("_{name}")));
        }
    }
    candidates.push(path.to_path_buf());
    candidates
}

fn probe_tier(candidates: &[PathBuf]) -> CompileResult<Option<PathBuf>> {
    let existing: Vec<&PathBuf> = candidates
        .iter()
        .filter(|candidate| candidate.is_file())
        .collect();
    match existing.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some((*single).clone())),
        many => {
            let mut message = String::from("It's not clear which file to import. Found:");
            for path in many {
                message.push_str("\n  ");
                message.push_str(&path.display().to_string());
            }
            Err(CompileError::runtime(message, Span::default()))
        }
    }
}

#[async_trait(?Send)]
impl Importer for FilesystemImporter {
    async fn canonicalize(
        &self,
        reference: &str,
        _from: Option<&SourceUrl>,
    ) -> CompileResult<Option<SourceUrl>> {
        let candidate = match reference_scheme(reference) {
            Some("file") => match SourceUrl::parse(reference)?.to_file_path() {
                Some(path) => path,
                None => return Ok(None),
            },
            Some(_) => return Ok(None),
            None => self.base.join(reference),
        };
        match Self::probe(&candidate)? {
            Some(path) => Self::canonical_url(&path).map(Some),
            None => Ok(None),
        }
    }

    async fn load(&self, url: &SourceUrl) -> CompileResult<Option<StylesheetSource>> {
        let Some(path) = url.to_file_path() else {
            return Ok(None);
        };
        let contents = fs::read_to_string(&path)?;
        Ok(Some(StylesheetSource {
            url: url.clone(),
            contents,
            syntax: syntax_for_path(&path),
        }))
    }
}

/// Rewrites `package:name/rest` to a configured base identifier plus `rest`
/// and delegates to filesystem probing.
#[derive(Clone, Debug)]
pub struct PackageImporter {
    packages: HashMap<String, SourceUrl>,
}

impl PackageImporter {
    pub fn new(packages: HashMap<String, SourceUrl>) -> Self {
        Self { packages }
    }
}

#[async_trait(?Send)]
impl Importer for PackageImporter {
    async fn canonicalize(
        &self,
        reference: &str,
        _from: Option<&SourceUrl>,
    ) -> CompileResult<Option<SourceUrl>> {
        let Some(rest) = reference.strip_prefix("package:") else {
            return Ok(None);
        };
        let (name, subpath) = rest.split_once('/').unwrap_or((rest, ""));
        let Some(base) = self.packages.get(name) else {
            return Err(CompileError::runtime(
                format!("No configured base for package \"{name}\"."),
                Span::default(),
            ));
        };
        let Some(base_path) = base.to_file_path() else {
            return Err(CompileError::runtime(
                format!("Package \"{name}\" is not configured with a file: base."),
                Span::default(),
            ));
        };
        let candidate = if subpath.is_empty() {
            base_path
        } else {
            base_path.join(subpath)
        };
        match FilesystemImporter::probe(&candidate)? {
            Some(path) => SourceUrl::from_file_path(&path).map(Some),
            None => Ok(None),
        }
    }

    async fn load(&self, url: &SourceUrl) -> CompileResult<Option<StylesheetSource>> {
        FilesystemImporter::new(".").load(url).await
    }

    fn non_canonical_scheme(&self) -> Option<&str> {
        Some("package")
    }
}

/// An importer over an in-memory map, for embedded stylesheets and tests.
/// References canonicalize into the importer's own scheme.
#[derive(Clone, Debug, Default)]
pub struct InMemoryImporter {
    scheme: String,
    entries: HashMap<String, (String, Syntax)>,
}

impl InMemoryImporter {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, contents: impl Into<String>) {
        self.entries
            .insert(name.into(), (contents.into(), Syntax::Scss));
    }

    pub fn insert_with_syntax(
        &mut self,
        name: impl Into<String>,
        contents: impl Into<String>,
        syntax: Syntax,
    ) {
        self.entries.insert(name.into(), (contents.into(), syntax));
    }
}

#[async_trait(?Send)]
impl Importer for InMemoryImporter {
    async fn canonicalize(
        &self,
        reference: &str,
        _from: Option<&SourceUrl>,
    ) -> CompileResult<Option<SourceUrl>> {
        let name = match reference_scheme(reference) {
            Some(scheme) if scheme == self.scheme => &reference[scheme.len() + 1..],
            Some(_) => return Ok(None),
            None => reference,
        };
        if self.entries.contains_key(name) {
            SourceUrl::parse(&format!("{}:{name}", self.scheme)).map(Some)
        } else {
            Ok(None)
        }
    }

    async fn load(&self, url: &SourceUrl) -> CompileResult<Option<StylesheetSource>> {
        if url.scheme() != self.scheme {
            return Ok(None);
        }
        Ok(self.entries.get(url.path()).map(|(contents, syntax)| {
            StylesheetSource {
                url: url.clone(),
                contents: contents.clone(),
                syntax: *syntax,
            }
        }))
    }
}

/// Which resolver in the chain produced a canonical identifier. Relative
/// references resolve through the same resolver that produced their base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ImporterId {
    /// The resolver associated with the entrypoint (the `importer` option,
    /// or the implicit filesystem resolver of a path entrypoint).
    Entry,
    User(usize),
    LoadPath(usize),
    Package,
}

/// The prioritized resolver chain of one compilation.
pub(crate) struct ImporterChain {
    entry_importer: Option<Arc<dyn Importer + Send + Sync>>,
    importers: Vec<Arc<dyn Importer + Send + Sync>>,
    load_paths: Vec<FilesystemImporter>,
    package: Option<PackageImporter>,
    origins: RefCell<HashMap<SourceUrl, ImporterId>>,
}

impl ImporterChain {
    pub(crate) fn from_options(options: &Options) -> Self {
        let package = if options.package_config.is_empty() {
            None
        } else {
            Some(PackageImporter::new(options.package_config.clone()))
        };
        Self {
            entry_importer: options.importer.clone(),
            importers: options.importers.clone(),
            load_paths: options
                .load_paths
                .iter()
                .map(FilesystemImporter::new)
                .collect(),
            package,
            origins: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn origin_of(&self, url: &SourceUrl) -> Option<ImporterId> {
        self.origins.borrow().get(url).copied()
    }

    pub(crate) fn record_origin(&self, url: &SourceUrl, id: ImporterId) {
        self.origins.borrow_mut().insert(url.clone(), id);
    }

    /// Resolve a reference to a canonical identifier: the base's own
    /// resolver first for non-absolute references, then user importers in
    /// order, then load paths, then the `package:` resolver. Awaits each
    /// importer it consults.
    pub(crate) async fn resolve(
        &self,
        reference: &str,
        base: Option<&SourceUrl>,
    ) -> CompileResult<Option<(SourceUrl, ImporterId)>> {
        let absolute = reference_scheme(reference).is_some();

        if !absolute {
            match base {
                Some(base_url) => {
                    let origin = self.origin_of(base_url).unwrap_or(ImporterId::Entry);
                    if let Some(url) =
                        self.canonicalize_relative(reference, base_url, origin).await?
                    {
                        tracing::trace!(reference, base = %base_url, "resolved relative to base");
                        self.record_origin(&url, origin);
                        return Ok(Some((url, origin)));
                    }
                }
                // A string entrypoint without an identifier still resolves
                // relative references through its associated importer.
                None => {
                    if let Some(importer) = &self.entry_importer {
                        if let Some(url) = importer.canonicalize(reference, None).await? {
                            self.record_origin(&url, ImporterId::Entry);
                            return Ok(Some((url, ImporterId::Entry)));
                        }
                    }
                }
            }
        }

        for (index, importer) in self.importers.iter().enumerate() {
            if let Some(url) = importer.canonicalize(reference, base).await? {
                if Some(url.scheme()) == importer.non_canonical_scheme() {
                    return Err(CompileError::runtime(
                        format!(
                            "Importer canonicalized {url} with its declared non-canonical scheme."
                        ),
                        Span::default(),
                    ));
                }
                self.record_origin(&url, ImporterId::User(index));
                return Ok(Some((url, ImporterId::User(index))));
            }
        }

        for (index, load_path) in self.load_paths.iter().enumerate() {
            if let Some(url) = load_path.canonicalize(reference, base).await? {
                self.record_origin(&url, ImporterId::LoadPath(index));
                return Ok(Some((url, ImporterId::LoadPath(index))));
            }
        }

        if let Some(package) = &self.package {
            if let Some(url) = package.canonicalize(reference, base).await? {
                self.record_origin(&url, ImporterId::Package);
                return Ok(Some((url, ImporterId::Package)));
            }
        }

        // A bare absolute file: reference resolves without any configured
        // importer.
        if reference_scheme(reference) == Some("file") {
            if let Some(path) = SourceUrl::parse(reference)?.to_file_path() {
                if let Some(found) = FilesystemImporter::probe(&path)? {
                    let url = SourceUrl::from_file_path(&found)?;
                    self.record_origin(&url, ImporterId::Entry);
                    return Ok(Some((url, ImporterId::Entry)));
                }
            }
        }

        Ok(None)
    }

    async fn canonicalize_relative(
        &self,
        reference: &str,
        base: &SourceUrl,
        origin: ImporterId,
    ) -> CompileResult<Option<SourceUrl>> {
        match origin {
            ImporterId::Entry => {
                if let Some(importer) = &self.entry_importer {
                    importer.canonicalize(reference, Some(base)).await
                } else {
                    self.probe_relative_file(reference, base)
                }
            }
            ImporterId::User(index) => {
                self.importers[index].canonicalize(reference, Some(base)).await
            }
            ImporterId::LoadPath(_) | ImporterId::Package => {
                self.probe_relative_file(reference, base)
            }
        }
    }

    fn probe_relative_file(
        &self,
        reference: &str,
        base: &SourceUrl,
    ) -> CompileResult<Option<SourceUrl>> {
        let Some(base_path) = base.to_file_path() else {
            return Ok(None);
        };
        let Some(dir) = base_path.parent() else {
            return Ok(None);
        };
        match FilesystemImporter::probe(&dir.join(reference))? {
            Some(path) => SourceUrl::from_file_path(&path).map(Some),
            None => Ok(None),
        }
    }

    /// Fetch the contents of a canonical identifier through the resolver
    /// that produced it. `load` returning nothing after a successful
    /// `canonicalize` is a hard error at the call site.
    pub(crate) async fn load(
        &self,
        url: &SourceUrl,
        origin: ImporterId,
    ) -> CompileResult<Option<StylesheetSource>> {
        match origin {
            ImporterId::Entry => {
                if let Some(importer) = &self.entry_importer {
                    if let Some(source) = importer.load(url).await? {
                        return Ok(Some(source));
                    }
                }
                FilesystemImporter::new(".").load(url).await
            }
            ImporterId::User(index) => self.importers[index].load(url).await,
            ImporterId::LoadPath(index) => self.load_paths[index].load(url).await,
            ImporterId::Package => match &self.package {
                Some(package) => package.load(url).await,
                None => Ok(None),
            },
        }
    }
}

impl std::fmt::Debug for ImporterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImporterChain")
            .field("importers", &self.importers.len())
            .field("load_paths", &self.load_paths)
            .field("package", &self.package.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_on;

    #[test]
    fn in_memory_importer_claims_only_its_scheme() {
        let mut importer = InMemoryImporter::new("first");
        importer.insert("other", "a {b: c}");

        let url = block_on(importer.canonicalize("first:other", None))
            .expect("canonicalize")
            .expect("claimed");
        assert_eq!(url.as_str(), "first:other");

        assert!(block_on(importer.canonicalize("second:other", None))
            .expect("canonicalize")
            .is_none());
        assert!(block_on(importer.canonicalize("missing", None))
            .expect("canonicalize")
            .is_none());
    }

    #[test]
    fn in_memory_importer_loads_what_it_canonicalized() {
        let mut importer = InMemoryImporter::new("mem");
        importer.insert("styles", "a {b: c}");
        let url = block_on(importer.canonicalize("styles", None))
            .expect("canonicalize")
            .expect("claimed");
        let source = block_on(importer.load(&url)).expect("load").expect("present");
        assert_eq!(source.contents, "a {b: c}");
        assert!(matches!(source.syntax, Syntax::Scss));
    }
}
