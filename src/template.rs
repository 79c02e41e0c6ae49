use crate::ast::Node;
use crate::config::EngineConfig;
use crate::error::{Error, RenderError, SyntaxError};
use crate::eval::Renderer;
use crate::funcs::FunctionRegistry;
use crate::value::Context;
use crate::{lexer, parser, trim};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// A parsed template. Immutable once built; render it as often as needed,
/// from as many threads as needed.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    tree: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, SyntaxError> {
        Self::parse_with(source, &EngineConfig::default())
    }

    /// Lex, trim and parse `source`. Errors carry line/column positions.
    pub fn parse_with(source: &str, config: &EngineConfig) -> Result<Self, SyntaxError> {
        let tokens = lexer::lex(source).map_err(|err| err.locate(source))?;
        let tokens = trim::apply(tokens);
        let tree = parser::parse(tokens, config.max_depth).map_err(|err| err.locate(source))?;
        debug!(bytes = source.len(), nodes = tree.len(), "parsed template");
        Ok(Self {
            source: source.to_string(),
            tree,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tree(&self) -> &[Node] {
        &self.tree
    }

    /// Render into a fresh string. Nothing is returned unless the whole
    /// render succeeds.
    pub fn render(&self, ctx: &Context, registry: &FunctionRegistry) -> Result<String, RenderError> {
        let mut out = String::new();
        self.render_fmt(&mut out, ctx, registry, None)?;
        Ok(out)
    }

    /// Stream into `sink`. On error, whatever was already written is
    /// incomplete and should be discarded by the caller.
    pub fn render_to<W: io::Write>(
        &self,
        sink: W,
        ctx: &Context,
        registry: &FunctionRegistry,
    ) -> Result<(), RenderError> {
        stream(sink, |out| self.render_fmt(out, ctx, registry, None))
    }

    /// Render into any `fmt::Write`, optionally bounded by `max_steps`.
    pub fn render_fmt(
        &self,
        out: &mut dyn fmt::Write,
        ctx: &Context,
        registry: &FunctionRegistry,
        max_steps: Option<u64>,
    ) -> Result<(), RenderError> {
        let mut renderer = Renderer::new(registry, max_steps);
        renderer.render(&self.tree, ctx, out)?;
        debug!(steps = renderer.steps(), "rendered template");
        Ok(())
    }
}

struct IoSink<W> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: io::Write> fmt::Write for IoSink<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.inner.write_all(s.as_bytes()).map_err(|err| {
            self.error = Some(err);
            fmt::Error
        })
    }
}

/// Run `render` against an `io::Write`, surfacing the underlying I/O error
/// instead of the opaque formatter error.
fn stream<W: io::Write>(
    sink: W,
    render: impl FnOnce(&mut dyn fmt::Write) -> Result<(), RenderError>,
) -> Result<(), RenderError> {
    let mut adapter = IoSink {
        inner: sink,
        error: None,
    };
    match render(&mut adapter) {
        Err(RenderError::Write) => Err(adapter
            .error
            .take()
            .map(RenderError::Io)
            .unwrap_or(RenderError::Write)),
        Err(err) => Err(err),
        Ok(()) => adapter.inner.flush().map_err(RenderError::Io),
    }
}

/// Parsed templates keyed by a hash of their source text.
///
/// The source is compared on lookup, so a hash collision costs a parse but
/// never returns the wrong template. Entries are parsed with the config
/// passed on first sight of a source.
#[derive(Debug, Default)]
pub struct TemplateCache {
    buckets: HashMap<u64, Vec<Arc<Template>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_parse(
        &mut self,
        source: &str,
        config: &EngineConfig,
    ) -> Result<Arc<Template>, SyntaxError> {
        if let Some(template) = self.get(source) {
            return Ok(template);
        }
        let template = Template::parse_with(source, config)?;
        Ok(self.insert(template))
    }

    pub fn get(&self, source: &str) -> Option<Arc<Template>> {
        let key = source_hash(source);
        let found = self
            .buckets
            .get(&key)
            .and_then(|bucket| bucket.iter().find(|t| t.source() == source))
            .map(Arc::clone);
        match found {
            Some(_) => debug!(hash = key, "template cache hit"),
            None => debug!(hash = key, "template cache miss"),
        }
        found
    }

    /// Store a parsed template. If the same source is already cached, the
    /// existing entry wins and is returned.
    pub fn insert(&mut self, template: Template) -> Arc<Template> {
        let key = source_hash(template.source());
        let bucket = self.buckets.entry(key).or_default();
        if let Some(existing) = bucket.iter().find(|t| t.source() == template.source()) {
            return Arc::clone(existing);
        }
        let template = Arc::new(template);
        bucket.push(Arc::clone(&template));
        template
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

fn source_hash(source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}

/// Registry, limits and a template cache bundled together. Each distinct
/// source is parsed at most once per engine.
#[derive(Debug)]
pub struct Engine {
    registry: Arc<FunctionRegistry>,
    config: EngineConfig,
    cache: Mutex<TemplateCache>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with the built-in functions and default limits.
    pub fn new() -> Self {
        Self::with_registry(FunctionRegistry::with_builtins())
    }

    pub fn with_registry(registry: impl Into<Arc<FunctionRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            config: EngineConfig::default(),
            cache: Mutex::new(TemplateCache::new()),
        }
    }

    /// Replace the limits. Templates already cached keep their parse.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch the parsed template for `source`, parsing it on first use.
    /// The parse runs outside the cache lock; two threads racing on a new
    /// source may both parse it, and the first insert is kept.
    pub fn template(&self, source: &str) -> Result<Arc<Template>, SyntaxError> {
        if let Some(template) = self.lock_cache().get(source) {
            return Ok(template);
        }
        let template = Template::parse_with(source, &self.config)?;
        Ok(self.lock_cache().insert(template))
    }

    fn lock_cache(&self) -> MutexGuard<'_, TemplateCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cached_templates(&self) -> usize {
        self.lock_cache().len()
    }

    pub fn render(&self, source: &str, ctx: &Context) -> Result<String, Error> {
        let template = self.template(source)?;
        let mut out = String::new();
        template.render_fmt(&mut out, ctx, &self.registry, self.config.max_steps)?;
        Ok(out)
    }

    pub fn render_to<W: io::Write>(&self, sink: W, source: &str, ctx: &Context) -> Result<(), Error> {
        let template = self.template(source)?;
        stream(sink, |out| {
            template.render_fmt(out, ctx, &self.registry, self.config.max_steps)
        })?;
        Ok(())
    }
}
