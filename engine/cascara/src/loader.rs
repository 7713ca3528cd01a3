use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::css::CssNode;
use crate::error::{CompileError, SourceCatalog};
use crate::importer::StylesheetSource;
use crate::module::Module;
use crate::uri::SourceUrl;

/// The lifecycle of one canonical identifier inside a compilation. The
/// transition to `InProgress` happens before the module's own source is
/// fetched, so a second request for the same identifier arriving during a
/// resolver suspension observes the slot instead of starting a parallel
/// evaluation; the slot, not the fetch, is the mutual-exclusion point.
#[derive(Clone, Debug)]
pub(crate) enum ModuleSlot {
    InProgress(usize),
    Complete(usize),
    Failed(String),
}

/// Per-compilation cache of canonical identifier → evaluated module.
/// Modules live in an arena and slots hold indices, never back-pointers, so
/// the legacy `@import` cycles cannot form ownership cycles.
pub(crate) struct ModuleRegistry {
    slots: HashMap<String, ModuleSlot>,
    arena: Vec<Rc<RefCell<Module>>>,
    /// Modules in completion order; dependency css precedes dependent css.
    emit_order: Vec<usize>,
    loaded_urls: Vec<SourceUrl>,
    loaded_keys: HashSet<String>,
    /// Source text by identifier, for error excerpts.
    pub(crate) sources: SourceCatalog,
    /// Fetched stylesheets by canonical identifier: `load` runs at most
    /// once per identifier per compilation.
    source_cache: HashMap<String, StylesheetSource>,
    /// Canonical identifiers currently being textually merged by `@import`;
    /// a reference back into this stack is the tolerated legacy cycle.
    import_stack: Vec<String>,
}

impl ModuleRegistry {
    pub(crate) fn new() -> Self {
        Self {
            slots: HashMap::new(),
            arena: Vec::new(),
            emit_order: Vec::new(),
            loaded_urls: Vec::new(),
            loaded_keys: HashSet::new(),
            sources: SourceCatalog::default(),
            source_cache: HashMap::new(),
            import_stack: Vec::new(),
        }
    }

    pub(crate) fn record_loaded(&mut self, url: &SourceUrl) {
        if self.loaded_keys.insert(url.as_str().to_string()) {
            self.loaded_urls.push(url.clone());
        }
    }

    pub(crate) fn loaded_urls(&self) -> Vec<SourceUrl> {
        self.loaded_urls.clone()
    }

    /// A previously fetched stylesheet. The evaluator consults this before
    /// going to the chain, so `load` runs at most once per canonical
    /// identifier per compilation.
    pub(crate) fn cached_source(&self, url: &SourceUrl) -> Option<StylesheetSource> {
        self.source_cache.get(url.as_str()).cloned()
    }

    /// Record a fetched stylesheet: the text for error excerpts, the
    /// ordered loaded-urls set, and the fetch cache.
    pub(crate) fn store_source(&mut self, url: &SourceUrl, source: &StylesheetSource) {
        self.sources.insert(Some(url), &source.contents);
        self.record_loaded(url);
        self.source_cache
            .insert(url.as_str().to_string(), source.clone());
    }

    pub(crate) fn slot(&self, url: &SourceUrl) -> Option<ModuleSlot> {
        self.slots.get(url.as_str()).cloned()
    }

    pub(crate) fn module(&self, index: usize) -> Rc<RefCell<Module>> {
        Rc::clone(&self.arena[index])
    }

    /// Park a module cell in the arena without a slot; used for the
    /// entrypoint, which has no canonical identifier to key on.
    pub(crate) fn add_module(&mut self, module: Rc<RefCell<Module>>) -> usize {
        self.arena.push(module);
        self.arena.len() - 1
    }

    /// Install the `InProgress` slot for an identifier about to be
    /// evaluated.
    pub(crate) fn begin(&mut self, url: &SourceUrl, module: Rc<RefCell<Module>>) -> usize {
        let index = self.add_module(module);
        tracing::debug!(url = %url, index, "module evaluation started");
        self.slots
            .insert(url.as_str().to_string(), ModuleSlot::InProgress(index));
        index
    }

    pub(crate) fn complete(&mut self, url: &SourceUrl, index: usize, emit: bool) {
        tracing::debug!(url = %url, index, emit, "module evaluation complete");
        self.slots
            .insert(url.as_str().to_string(), ModuleSlot::Complete(index));
        if emit {
            self.emit_order.push(index);
        }
    }

    pub(crate) fn fail(&mut self, url: &SourceUrl, error: &CompileError) {
        self.slots.insert(
            url.as_str().to_string(),
            ModuleSlot::Failed(error.to_string()),
        );
    }

    pub(crate) fn push_emit(&mut self, index: usize) {
        self.emit_order.push(index);
    }

    pub(crate) fn importing(&self, url: &SourceUrl) -> bool {
        self.import_stack.iter().any(|key| key == url.as_str())
    }

    pub(crate) fn begin_import(&mut self, url: &SourceUrl) {
        self.import_stack.push(url.as_str().to_string());
    }

    pub(crate) fn end_import(&mut self) {
        self.import_stack.pop();
    }

    /// The whole compilation's css: every emitted module's tree in
    /// completion order.
    pub(crate) fn collect_css(&self) -> Vec<CssNode> {
        let mut nodes = Vec::new();
        for &index in &self.emit_order {
            nodes.extend(self.arena[index].borrow().css.iter().cloned());
        }
        nodes
    }

    /// Every extension recorded by any emitted module, in the same order as
    /// the css.
    pub(crate) fn collect_extensions(&self) -> Vec<crate::module::Extension> {
        let mut extensions = Vec::new();
        for &index in &self.emit_order {
            extensions.extend(self.arena[index].borrow().extensions.iter().cloned());
        }
        extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loaded_urls_is_an_ordered_set() {
        let mut registry = ModuleRegistry::new();
        let a = SourceUrl::parse("u:a").expect("parse");
        let b = SourceUrl::parse("u:b").expect("parse");
        registry.record_loaded(&a);
        registry.record_loaded(&b);
        registry.record_loaded(&a);
        let urls: Vec<String> = registry
            .loaded_urls()
            .iter()
            .map(|url| url.as_str().to_string())
            .collect();
        assert_eq!(urls, vec!["u:a".to_string(), "u:b".to_string()]);
    }

    #[test]
    fn slots_transition_in_progress_to_complete() {
        let mut registry = ModuleRegistry::new();
        let url = SourceUrl::parse("u:mod").expect("parse");
        let index = registry.begin(&url, Rc::new(RefCell::new(Module::new(Some(url.clone())))));
        assert!(matches!(
            registry.slot(&url),
            Some(ModuleSlot::InProgress(i)) if i == index
        ));
        registry.complete(&url, index, true);
        assert!(matches!(
            registry.slot(&url),
            Some(ModuleSlot::Complete(i)) if i == index
        ));
    }
}
