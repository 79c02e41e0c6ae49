use crate::value::Context;

/// Where a field path starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    /// The innermost scope frame (`.X`).
    Current,
    /// The render root (`$.X`).
    Root,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `.`, `.Server.Host`, `$`, `$.AppName`; an empty path is the frame itself.
    Field {
        base: Base,
        path: Vec<String>,
        offset: usize,
    },
    /// `fname arg1 arg2`, also the desugared form of `x | fname arg1`.
    Call {
        name: String,
        args: Vec<Expr>,
        offset: usize,
    },
    Literal(Context),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    /// An action that prints the value of its expression.
    Action(Expr),
    If {
        condition: Expr,
        then_branch: Vec<Node>,
        else_branch: Option<Vec<Node>>,
    },
    Range {
        source: Expr,
        body: Vec<Node>,
        offset: usize,
    },
}

pub type Tree = Vec<Node>;
