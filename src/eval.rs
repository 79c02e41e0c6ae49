use crate::ast::{Base, Expr, Node};
use crate::error::RenderError;
use crate::funcs::FunctionRegistry;
use crate::value::Context;
use std::borrow::Cow;
use std::fmt;
use tracing::trace;

/// One frame of the scope stack. Frames live on the evaluator's call stack:
/// a `range` iteration pushes the current element and the frame is gone as
/// soon as that iteration returns.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'p> {
    value: &'p Context,
    parent: Option<&'p Scope<'p>>,
}

impl<'p> Scope<'p> {
    pub fn root(value: &'p Context) -> Self {
        Self {
            value,
            parent: None,
        }
    }

    pub fn push<'c>(&'c self, value: &'c Context) -> Scope<'c> {
        Scope {
            value,
            parent: Some(self),
        }
    }

    /// The innermost frame's value (what `.` refers to).
    pub fn current(&self) -> &'p Context {
        self.value
    }

    /// The bottom frame's value (what `$` refers to).
    pub fn bottom(&self) -> &'p Context {
        let mut frame = self;
        while let Some(parent) = frame.parent {
            frame = parent;
        }
        frame.value
    }

    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut frame = self;
        while let Some(parent) = frame.parent {
            depth += 1;
            frame = parent;
        }
        depth
    }
}

/// Walks a parsed tree against a context. One renderer per render call; it
/// owns the step counter, the registry is only read.
pub struct Renderer<'r> {
    registry: &'r FunctionRegistry,
    max_steps: Option<u64>,
    steps: u64,
}

impl<'r> Renderer<'r> {
    pub fn new(registry: &'r FunctionRegistry, max_steps: Option<u64>) -> Self {
        Self {
            registry,
            max_steps,
            steps: 0,
        }
    }

    /// Node visits and function calls performed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn render(
        &mut self,
        tree: &[Node],
        root: &Context,
        out: &mut dyn fmt::Write,
    ) -> Result<(), RenderError> {
        self.block(tree, &Scope::root(root), out)
    }

    fn block(
        &mut self,
        nodes: &[Node],
        scope: &Scope<'_>,
        out: &mut dyn fmt::Write,
    ) -> Result<(), RenderError> {
        for node in nodes {
            self.step()?;
            match node {
                Node::Text(text) => out.write_str(text).map_err(|_| RenderError::Write)?,
                Node::Action(expr) => {
                    let value = self.eval(expr, scope)?;
                    write!(out, "{value}").map_err(|_| RenderError::Write)?;
                }
                Node::If {
                    condition,
                    then_branch,
                    else_branch,
                } => {
                    if self.eval(condition, scope)?.is_truthy() {
                        self.block(then_branch, scope, out)?;
                    } else if let Some(else_branch) = else_branch {
                        self.block(else_branch, scope, out)?;
                    }
                }
                Node::Range {
                    source,
                    body,
                    offset,
                } => {
                    let items = self.eval(source, scope)?;
                    let Context::Sequence(items) = &*items else {
                        return Err(RenderError::NotIterable {
                            kind: items.kind(),
                            offset: *offset,
                        });
                    };
                    for (index, item) in items.iter().enumerate() {
                        let frame = scope.push(item);
                        trace!(index, depth = frame.depth(), "range iteration");
                        self.block(body, &frame, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn eval<'s>(
        &mut self,
        expr: &Expr,
        scope: &Scope<'s>,
    ) -> Result<Cow<'s, Context>, RenderError> {
        match expr {
            Expr::Literal(value) => Ok(Cow::Owned(value.clone())),
            Expr::Field { base, path, offset } => {
                let start = match base {
                    Base::Current => scope.current(),
                    Base::Root => scope.bottom(),
                };
                resolve(start, path, *offset).map(Cow::Borrowed)
            }
            Expr::Call { name, args, offset } => {
                self.step()?;
                let registry = self.registry;
                let entry = registry
                    .lookup(name)
                    .ok_or_else(|| RenderError::UnknownFunction {
                        name: name.clone(),
                        offset: *offset,
                    })?;
                if !entry.arity.accepts(args.len()) {
                    return Err(RenderError::Arity {
                        name: name.clone(),
                        expected: entry.arity,
                        got: args.len(),
                        offset: *offset,
                    });
                }
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, scope)?.into_owned());
                }
                (entry.func)(&values)
                    .map(Cow::Owned)
                    .map_err(|source| RenderError::Function {
                        name: name.clone(),
                        offset: *offset,
                        source,
                    })
            }
        }
    }

    fn step(&mut self) -> Result<(), RenderError> {
        self.steps += 1;
        match self.max_steps {
            Some(limit) if self.steps > limit => Err(RenderError::ResourceLimitExceeded { limit }),
            _ => Ok(()),
        }
    }
}

/// Descend through records along `path`, starting at `start` only.
fn resolve<'a>(
    start: &'a Context,
    path: &[String],
    offset: usize,
) -> Result<&'a Context, RenderError> {
    let mut current = start;
    for (i, key) in path.iter().enumerate() {
        current = match current {
            Context::Record(map) => map.get(key).ok_or_else(|| RenderError::MissingField {
                path: format!(".{}", path[..=i].join(".")),
                offset,
            })?,
            other => {
                return Err(RenderError::NotARecord {
                    field: key.clone(),
                    kind: other.kind(),
                    offset,
                })
            }
        };
    }
    Ok(current)
}
