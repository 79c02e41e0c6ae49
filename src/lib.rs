//! shimmytmpl: minimal action-template engine for generated text such as
//! configuration files.
//!
//! A template is literal text with actions between `{{` and `}}`:
//!
//! - `{{.Field.Path}}` prints a field of the current value; `{{.}}` prints
//!   the value itself and `{{$.Field}}` reads from the render root.
//! - `{{func arg ...}}` calls a registry function; `{{.X | func arg}}`
//!   passes `.X` as the last argument.
//! - `{{if X}} ... {{else if Y}} ... {{else}} ... {{end}}`.
//! - `{{range X}} ... {{end}}` renders its body once per sequence element,
//!   with that element as the current value.
//! - `{{/* comment */}}` renders nothing.
//! - `{{- ` and ` -}}` strip the whitespace before / after the action.
//!
//! Field paths only look at the current value: inside a `range`, `.Name`
//! is a field of the element, never of an enclosing value. Truthiness:
//! null is false, booleans are themselves, numbers are true when nonzero,
//! strings and sequences when nonempty, and records are always true.
//!
//! Templates are parsed once into an immutable tree ([`Template`]) and
//! rendered against a [`Context`] with a [`FunctionRegistry`]. [`Engine`]
//! bundles a registry, limits and a per-engine template cache.
//!
//! ```
//! use shimmytmpl::Context;
//!
//! let ctx = Context::record().with("Name", "World");
//! assert_eq!(shimmytmpl::render("Hello {{.Name}}!", &ctx).unwrap(), "Hello World!");
//! ```

pub mod ast;
mod config;
mod error;
mod eval;
mod funcs;
pub mod lexer;
pub mod parser;
mod template;
pub mod trim;
mod value;

pub use config::EngineConfig;
pub use error::{Error, FuncError, Position, RenderError, SyntaxError};
pub use eval::{Renderer, Scope};
pub use funcs::{Arity, Func, FunctionRegistry};
pub use template::{Engine, Template, TemplateCache};
pub use value::{Context, Number};

use std::io;
use std::sync::OnceLock;

fn builtins() -> &'static FunctionRegistry {
    static BUILTINS: OnceLock<FunctionRegistry> = OnceLock::new();
    BUILTINS.get_or_init(FunctionRegistry::with_builtins)
}

/// Parse `source` and render it against `ctx` with the built-in functions.
pub fn render(source: &str, ctx: &Context) -> Result<String, Error> {
    let template = Template::parse(source)?;
    Ok(template.render(ctx, builtins())?)
}

/// Like [`render`], but streams into `sink`. If an error is returned, the
/// output already written is incomplete and should be discarded.
pub fn render_to<W: io::Write>(sink: W, source: &str, ctx: &Context) -> Result<(), Error> {
    let template = Template::parse(source)?;
    template.render_to(sink, ctx, builtins())?;
    Ok(())
}
