//! Named functions callable from template actions.
//!
//! A registry is built once, before rendering, and is only read while
//! templates render. The built-in entries are ordinary registrations and can
//! be replaced or removed like any other.

use crate::error::FuncError;
use crate::value::{Context, Number};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Signature shared by every registry function.
pub type Func = dyn Fn(&[Context]) -> Result<Context, FuncError> + Send + Sync;

/// Number of arguments a function accepts, checked before each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) arity: Arity,
    pub(crate) func: Arc<Func>,
}

/// Mapping from function name to callable.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    entries: HashMap<String, Entry>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl FunctionRegistry {
    /// A registry with no functions at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in functions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("upper", Arity::Exact(1), |args| {
            Ok(Context::String(string_arg(args, 0)?.to_uppercase()))
        });
        registry.register("lower", Arity::Exact(1), |args| {
            Ok(Context::String(string_arg(args, 0)?.to_lowercase()))
        });
        registry.register("title", Arity::Exact(1), |args| {
            Ok(Context::String(title_case(string_arg(args, 0)?)))
        });
        registry.register("len", Arity::Exact(1), |args| {
            let len = match &args[0] {
                Context::String(s) => s.chars().count(),
                Context::Sequence(items) => items.len(),
                Context::Record(map) => map.len(),
                other => return Err(FuncError::new(format!("len of {}", other.kind()))),
            };
            i64::try_from(len)
                .map(|n| Context::Number(Number::Int(n)))
                .map_err(|_| FuncError::new("length overflows an integer"))
        });
        registry.register("index", Arity::AtLeast(1), |args| {
            let mut current = &args[0];
            for key in &args[1..] {
                current = index_once(current, key)?;
            }
            Ok(current.clone())
        });
        registry.register("not", Arity::Exact(1), |args| {
            Ok(Context::Bool(!args[0].is_truthy()))
        });
        // `and`/`or` return the deciding argument rather than a bool.
        registry.register("and", Arity::AtLeast(1), |args| {
            let deciding = args
                .iter()
                .find(|arg| !arg.is_truthy())
                .unwrap_or(&args[args.len() - 1]);
            Ok(deciding.clone())
        });
        registry.register("or", Arity::AtLeast(1), |args| {
            let deciding = args
                .iter()
                .find(|arg| arg.is_truthy())
                .unwrap_or(&args[args.len() - 1]);
            Ok(deciding.clone())
        });
        registry.register("eq", Arity::AtLeast(2), |args| {
            Ok(Context::Bool(
                args[1..].iter().any(|other| values_equal(&args[0], other)),
            ))
        });
        registry.register("ne", Arity::Exact(2), |args| {
            Ok(Context::Bool(!values_equal(&args[0], &args[1])))
        });
        registry.register("lt", Arity::Exact(2), |args| {
            Ok(Context::Bool(compare(&args[0], &args[1])? == Ordering::Less))
        });
        registry.register("le", Arity::Exact(2), |args| {
            Ok(Context::Bool(compare(&args[0], &args[1])? != Ordering::Greater))
        });
        registry.register("gt", Arity::Exact(2), |args| {
            Ok(Context::Bool(compare(&args[0], &args[1])? == Ordering::Greater))
        });
        registry.register("ge", Arity::Exact(2), |args| {
            Ok(Context::Bool(compare(&args[0], &args[1])? != Ordering::Less))
        });
        registry.register("print", Arity::AtLeast(0), |args| {
            let parts: Vec<String> = args.iter().map(ToString::to_string).collect();
            Ok(Context::String(parts.join(" ")))
        });
        registry.register("join", Arity::Exact(2), |args| {
            let separator = string_arg(args, 1)?;
            match &args[0] {
                Context::Sequence(items) => {
                    let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                    Ok(Context::String(parts.join(separator)))
                }
                other => Err(FuncError::type_mismatch("sequence", other.kind())),
            }
        });
        // `default FALLBACK VALUE`, so that `.Port | default 80` reads naturally.
        registry.register("default", Arity::Exact(2), |args| {
            if args[1].is_truthy() {
                Ok(args[1].clone())
            } else {
                Ok(args[0].clone())
            }
        });
        registry
    }

    /// Register (or replace) a function.
    pub fn register<F>(&mut self, name: impl Into<String>, arity: Arity, func: F)
    where
        F: Fn(&[Context]) -> Result<Context, FuncError> + Send + Sync + 'static,
    {
        self.entries.insert(
            name.into(),
            Entry {
                arity,
                func: Arc::new(func),
            },
        );
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }
}

fn string_arg(args: &[Context], idx: usize) -> Result<&str, FuncError> {
    match &args[idx] {
        Context::String(s) => Ok(s),
        other => Err(FuncError::type_mismatch("string", other.kind())),
    }
}

/// Uppercase the first letter of every whitespace-separated word.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            at_word_start = false;
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn index_once<'a>(value: &'a Context, key: &Context) -> Result<&'a Context, FuncError> {
    match (value, key) {
        (Context::Record(map), Context::String(k)) => map
            .get(k)
            .ok_or_else(|| FuncError::new(format!("key `{k}` not found"))),
        (Context::Sequence(items), Context::Number(Number::Int(i))) => usize::try_from(*i)
            .ok()
            .and_then(|i| items.get(i))
            .ok_or_else(|| FuncError::new(format!("index {i} out of range"))),
        (container, key) => Err(FuncError::new(format!(
            "can't index {} with {}",
            container.kind(),
            key.kind()
        ))),
    }
}

fn values_equal(a: &Context, b: &Context) -> bool {
    match (a, b) {
        (Context::Number(Number::Int(x)), Context::Number(Number::Int(y))) => x == y,
        (Context::Number(x), Context::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &Context, b: &Context) -> Result<Ordering, FuncError> {
    match (a, b) {
        (Context::Number(Number::Int(x)), Context::Number(Number::Int(y))) => Ok(x.cmp(y)),
        (Context::Number(x), Context::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .ok_or_else(|| FuncError::new("numbers are not comparable")),
        (Context::String(x), Context::String(y)) => Ok(x.cmp(y)),
        _ => Err(FuncError::new(format!(
            "can't compare {} with {}",
            a.kind(),
            b.kind()
        ))),
    }
}
