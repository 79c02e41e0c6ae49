use crate::ast::{Base, Expr, Node, Tree};
use crate::error::SyntaxError;
use crate::lexer::{lex_action, Token, Word};
use crate::value::Context;

/// Keywords of other template dialects. Using one as an action is reported
/// as a syntax error instead of becoming a call to an unknown function.
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "with", "define", "template", "block", "break", "continue", "elif", "elseif", "endif",
    "endrange", "for", "endfor",
];

enum FrameKind {
    If {
        condition: Expr,
        /// Set once `else` is seen; `nodes` then collects the else-branch.
        then_branch: Option<Vec<Node>>,
        /// Opened by `else if`; closing it also closes the enclosing `if`.
        chained: bool,
    },
    Range {
        source: Expr,
    },
}

struct Frame {
    kind: FrameKind,
    nodes: Vec<Node>,
    offset: usize,
}

impl Frame {
    fn keyword(&self) -> &'static str {
        match self.kind {
            FrameKind::If { .. } => "if",
            FrameKind::Range { .. } => "range",
        }
    }

    fn into_node(self) -> Node {
        match self.kind {
            FrameKind::If {
                condition,
                then_branch: Some(then_branch),
                ..
            } => Node::If {
                condition,
                then_branch,
                else_branch: Some(self.nodes),
            },
            FrameKind::If {
                condition,
                then_branch: None,
                ..
            } => Node::If {
                condition,
                then_branch: self.nodes,
                else_branch: None,
            },
            FrameKind::Range { source } => Node::Range {
                source,
                body: self.nodes,
                offset: self.offset,
            },
        }
    }
}

/// What a single action asks the parser to do.
enum Action {
    Comment,
    If(Expr),
    Range(Expr),
    Else,
    ElseIf(Expr),
    End,
    Output(Expr),
}

/// Builds the action tree from (already trimmed) tokens.
///
/// Open `if`/`range` blocks live on an explicit frame stack rather than the
/// call stack, so nesting is limited by `max_depth` and reported as a
/// syntax error when exceeded.
pub struct Parser {
    root: Vec<Node>,
    frames: Vec<Frame>,
    max_depth: usize,
}

impl Parser {
    pub fn new(max_depth: usize) -> Self {
        Self {
            root: Vec::new(),
            frames: Vec::new(),
            max_depth,
        }
    }

    pub fn parse(mut self, tokens: Vec<Token>) -> Result<Tree, SyntaxError> {
        for token in tokens {
            match token {
                Token::Literal { text, .. } => self.push(Node::Text(text)),
                Token::Action {
                    content, offset, ..
                } => self.action(&content, offset)?,
            }
        }

        if let Some(frame) = self.frames.last() {
            return Err(SyntaxError::new(
                format!("unclosed `{}` block (missing `end`)", frame.keyword()),
                frame.offset,
            ));
        }
        Ok(self.root)
    }

    fn action(&mut self, content: &str, offset: usize) -> Result<(), SyntaxError> {
        match classify(content, offset, self.max_depth)? {
            Action::Comment => {}
            Action::Output(expr) => self.push(Node::Action(expr)),
            Action::If(condition) => self.open(
                FrameKind::If {
                    condition,
                    then_branch: None,
                    chained: false,
                },
                offset,
            )?,
            Action::Range(source) => self.open(FrameKind::Range { source }, offset)?,
            Action::Else => self.start_else(offset)?,
            Action::ElseIf(condition) => {
                self.start_else(offset)?;
                self.open(
                    FrameKind::If {
                        condition,
                        then_branch: None,
                        chained: true,
                    },
                    offset,
                )?;
            }
            Action::End => self.close(offset)?,
        }
        Ok(())
    }

    fn push(&mut self, node: Node) {
        match self.frames.last_mut() {
            Some(frame) => frame.nodes.push(node),
            None => self.root.push(node),
        }
    }

    fn open(&mut self, kind: FrameKind, offset: usize) -> Result<(), SyntaxError> {
        if self.frames.len() >= self.max_depth {
            return Err(SyntaxError::new(
                format!("nesting too deep (limit {})", self.max_depth),
                offset,
            ));
        }
        self.frames.push(Frame {
            kind,
            nodes: Vec::new(),
            offset,
        });
        Ok(())
    }

    fn start_else(&mut self, offset: usize) -> Result<(), SyntaxError> {
        let Some(frame) = self.frames.last_mut() else {
            return Err(SyntaxError::new("`else` outside of an `if` block", offset));
        };
        match &mut frame.kind {
            FrameKind::If {
                then_branch: then_branch @ None,
                ..
            } => {
                *then_branch = Some(std::mem::take(&mut frame.nodes));
                Ok(())
            }
            FrameKind::If { .. } => Err(SyntaxError::new(
                "more than one `else` in an `if` block",
                offset,
            )),
            FrameKind::Range { .. } => Err(SyntaxError::new(
                "`else` outside of an `if` block",
                offset,
            )),
        }
    }

    fn close(&mut self, offset: usize) -> Result<(), SyntaxError> {
        loop {
            let Some(frame) = self.frames.pop() else {
                return Err(SyntaxError::new("unexpected `end`", offset));
            };
            let chained = matches!(frame.kind, FrameKind::If { chained: true, .. });
            self.push(frame.into_node());
            if !chained {
                return Ok(());
            }
        }
    }
}

/// Parse with the given nesting limit.
pub fn parse(tokens: Vec<Token>, max_depth: usize) -> Result<Tree, SyntaxError> {
    Parser::new(max_depth).parse(tokens)
}

fn classify(content: &str, offset: usize, max_depth: usize) -> Result<Action, SyntaxError> {
    if content.starts_with("/*") {
        return if content.len() >= 4 && content.ends_with("*/") {
            Ok(Action::Comment)
        } else {
            Err(SyntaxError::new("unclosed comment", offset))
        };
    }

    let words = lex_action(content, offset)?;
    let Some(first) = words.first() else {
        return Err(SyntaxError::new("empty action", offset));
    };
    let keyword = match first {
        Word::Ident(name) => name.as_str(),
        _ => "",
    };
    let rest = &words[1..];

    match keyword {
        "if" => Ok(Action::If(condition(rest, "if", offset, max_depth)?)),
        "range" => Ok(Action::Range(condition(rest, "range", offset, max_depth)?)),
        "else" => match rest.first() {
            None => Ok(Action::Else),
            Some(Word::Ident(name)) if name == "if" => {
                Ok(Action::ElseIf(condition(&rest[1..], "else if", offset, max_depth)?))
            }
            Some(_) => Err(SyntaxError::new("unexpected words after `else`", offset)),
        },
        "end" if rest.is_empty() => Ok(Action::End),
        "end" => Err(SyntaxError::new("unexpected words after `end`", offset)),
        kw if UNSUPPORTED_KEYWORDS.contains(&kw) => Err(SyntaxError::new(
            format!("unknown block keyword `{kw}`"),
            offset,
        )),
        _ => Ok(Action::Output(expression(&words, offset, max_depth)?)),
    }
}

fn condition(
    words: &[Word],
    keyword: &str,
    offset: usize,
    max_depth: usize,
) -> Result<Expr, SyntaxError> {
    if words.is_empty() {
        return Err(SyntaxError::new(
            format!("missing value for `{keyword}`"),
            offset,
        ));
    }
    expression(words, offset, max_depth)
}

/// Parse a whole pipeline; every word must be consumed. Parentheses and
/// pipe stages both nest the resulting `Expr`, so together they may not go
/// deeper than `max_depth`.
fn expression(words: &[Word], offset: usize, max_depth: usize) -> Result<Expr, SyntaxError> {
    let mut parser = ExprParser {
        words,
        pos: 0,
        offset,
        depth: 0,
        max_depth,
    };
    let expr = parser.pipeline()?;
    match parser.peek() {
        None => Ok(expr),
        Some(word) => Err(parser.error(format!("unexpected {}", describe(word)))),
    }
}

struct ExprParser<'w> {
    words: &'w [Word],
    pos: usize,
    offset: usize,
    depth: usize,
    max_depth: usize,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Word> {
        self.words.get(self.pos)
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.offset)
    }

    fn descend(&mut self) -> Result<(), SyntaxError> {
        if self.depth >= self.max_depth {
            return Err(self.error(format!(
                "expression nested too deep (limit {})",
                self.max_depth
            )));
        }
        self.depth += 1;
        Ok(())
    }

    /// `command ('|' command)*`; the value on the left of `|` becomes the
    /// last argument of the call on its right.
    fn pipeline(&mut self) -> Result<Expr, SyntaxError> {
        let depth = self.depth;
        let mut expr = self.command(None)?;
        while self.peek() == Some(&Word::Pipe) {
            self.pos += 1;
            self.descend()?;
            expr = self.command(Some(expr))?;
        }
        self.depth = depth;
        Ok(expr)
    }

    fn command(&mut self, piped: Option<Expr>) -> Result<Expr, SyntaxError> {
        match self.peek() {
            Some(Word::Ident(name)) if !is_constant(name) => {
                let name = name.clone();
                self.pos += 1;
                let mut args = Vec::new();
                while self.at_operand() {
                    args.push(self.operand()?);
                }
                args.extend(piped);
                Ok(Expr::Call {
                    name,
                    args,
                    offset: self.offset,
                })
            }
            Some(_) if self.at_operand() => {
                let operand = self.operand()?;
                if self.at_operand() {
                    return Err(self.error("can't give arguments to a non-function"));
                }
                if piped.is_some() {
                    return Err(self.error("can't pipe into a non-function"));
                }
                Ok(operand)
            }
            Some(word) => Err(self.error(format!("missing command before {}", describe(word)))),
            None => Err(self.error("missing command")),
        }
    }

    fn at_operand(&self) -> bool {
        !matches!(self.peek(), None | Some(Word::Pipe | Word::RParen))
    }

    fn operand(&mut self) -> Result<Expr, SyntaxError> {
        let Some(word) = self.peek().cloned() else {
            return Err(self.error("missing operand"));
        };
        self.pos += 1;
        let expr = match word {
            Word::Dot => self.field(Base::Current, Vec::new()),
            Word::Field(path) => self.field(Base::Current, path),
            Word::Root(path) => self.field(Base::Root, path),
            Word::Str(s) => Expr::Literal(Context::String(s)),
            Word::Number(n) => Expr::Literal(Context::Number(n)),
            Word::Ident(name) => match name.as_str() {
                "true" => Expr::Literal(Context::Bool(true)),
                "false" => Expr::Literal(Context::Bool(false)),
                "nil" => Expr::Literal(Context::Null),
                _ => Expr::Call {
                    name,
                    args: Vec::new(),
                    offset: self.offset,
                },
            },
            Word::LParen => {
                self.descend()?;
                let inner = self.pipeline()?;
                if self.peek() != Some(&Word::RParen) {
                    return Err(self.error("unclosed left paren"));
                }
                self.pos += 1;
                self.depth -= 1;
                inner
            }
            Word::Pipe | Word::RParen => {
                return Err(self.error(format!("unexpected {}", describe(&word))));
            }
        };
        Ok(expr)
    }

    fn field(&self, base: Base, path: Vec<String>) -> Expr {
        Expr::Field {
            base,
            path,
            offset: self.offset,
        }
    }
}

fn is_constant(name: &str) -> bool {
    matches!(name, "true" | "false" | "nil")
}

fn describe(word: &Word) -> String {
    match word {
        Word::Dot => "`.`".to_string(),
        Word::Field(path) => format!("`.{}`", path.join(".")),
        Word::Root(path) if path.is_empty() => "`$`".to_string(),
        Word::Root(path) => format!("`$.{}`", path.join(".")),
        Word::Ident(name) => format!("`{name}`"),
        Word::Str(s) => format!("{s:?}"),
        Word::Number(n) => format!("`{n}`"),
        Word::Pipe => "`|`".to_string(),
        Word::LParen => "`(`".to_string(),
        Word::RParen => "`)`".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::trim;

    fn parse_str(source: &str) -> Result<Tree, SyntaxError> {
        parse(trim::apply(lex(source)?), 16)
    }

    fn field(path: &[&str], offset: usize) -> Expr {
        Expr::Field {
            base: Base::Current,
            path: path.iter().map(|s| s.to_string()).collect(),
            offset,
        }
    }

    #[test]
    fn field_access_splits_path() {
        assert_eq!(
            parse_str("{{.Server.Host}}").unwrap(),
            vec![Node::Action(field(&["Server", "Host"], 0))]
        );
    }

    #[test]
    fn function_call_with_field_argument() {
        assert_eq!(
            parse_str("{{upper .Name}}").unwrap(),
            vec![Node::Action(Expr::Call {
                name: "upper".into(),
                args: vec![field(&["Name"], 0)],
                offset: 0,
            })]
        );
    }

    #[test]
    fn pipeline_appends_value_as_last_argument() {
        assert_eq!(
            parse_str(r#"{{ .Items | join ", " }}"#).unwrap(),
            vec![Node::Action(Expr::Call {
                name: "join".into(),
                args: vec![
                    Expr::Literal(Context::from(", ")),
                    field(&["Items"], 0),
                ],
                offset: 0,
            })]
        );
    }

    #[test]
    fn bare_identifier_argument_is_a_zero_arg_call() {
        assert_eq!(
            parse_str("{{upper (lower .X) now}}").unwrap(),
            vec![Node::Action(Expr::Call {
                name: "upper".into(),
                args: vec![
                    Expr::Call {
                        name: "lower".into(),
                        args: vec![field(&["X"], 0)],
                        offset: 0,
                    },
                    Expr::Call {
                        name: "now".into(),
                        args: vec![],
                        offset: 0,
                    },
                ],
                offset: 0,
            })]
        );
    }

    #[test]
    fn if_else_splits_branches() {
        assert_eq!(
            parse_str("{{if .Debug}}on{{else}}off{{end}}").unwrap(),
            vec![Node::If {
                condition: field(&["Debug"], 0),
                then_branch: vec![Node::Text("on".into())],
                else_branch: Some(vec![Node::Text("off".into())]),
            }]
        );
    }

    #[test]
    fn else_if_chains_under_one_end() {
        let tree = parse_str("{{if .A}}a{{else if .B}}b{{else}}c{{end}}!").unwrap();
        assert_eq!(
            tree,
            vec![
                Node::If {
                    condition: field(&["A"], 0),
                    then_branch: vec![Node::Text("a".into())],
                    else_branch: Some(vec![Node::If {
                        condition: field(&["B"], 10),
                        then_branch: vec![Node::Text("b".into())],
                        else_branch: Some(vec![Node::Text("c".into())]),
                    }]),
                },
                Node::Text("!".into()),
            ]
        );
    }

    #[test]
    fn range_nests_inside_if() {
        let tree = parse_str("{{if .Items}}{{range .Items}}{{.}}{{end}}{{end}}").unwrap();
        assert_eq!(
            tree,
            vec![Node::If {
                condition: field(&["Items"], 0),
                then_branch: vec![Node::Range {
                    source: field(&["Items"], 13),
                    body: vec![Node::Action(field(&[], 29))],
                    offset: 13,
                }],
                else_branch: None,
            }]
        );
    }

    #[test]
    fn comments_produce_no_nodes() {
        assert_eq!(
            parse_str("a {{- /* note */ -}} b").unwrap(),
            vec![Node::Text("a".into()), Node::Text("b".into())]
        );
        assert!(parse_str("{{/* open }}").is_err());
    }

    #[test]
    fn literals_and_root_references() {
        assert_eq!(
            parse_str(r#"{{ print "x" 3 true nil $ $.A }}"#).unwrap(),
            vec![Node::Action(Expr::Call {
                name: "print".into(),
                args: vec![
                    Expr::Literal(Context::from("x")),
                    Expr::Literal(Context::from(3)),
                    Expr::Literal(Context::Bool(true)),
                    Expr::Literal(Context::Null),
                    Expr::Field {
                        base: Base::Root,
                        path: vec![],
                        offset: 0
                    },
                    Expr::Field {
                        base: Base::Root,
                        path: vec!["A".into()],
                        offset: 0
                    },
                ],
                offset: 0,
            })]
        );
    }

    #[test]
    fn block_structure_errors() {
        let cases = [
            ("{{if .A}}x", "unclosed `if` block (missing `end`)"),
            ("{{range .A}}x", "unclosed `range` block (missing `end`)"),
            ("{{else}}", "`else` outside of an `if` block"),
            ("{{range .A}}{{else}}{{end}}", "`else` outside of an `if` block"),
            ("{{if .A}}{{else}}{{else}}{{end}}", "more than one `else` in an `if` block"),
            ("x{{end}}", "unexpected `end`"),
            ("{{with .A}}{{end}}", "unknown block keyword `with`"),
            ("{{ }}", "empty action"),
            ("{{if}}{{end}}", "missing value for `if`"),
            ("{{.A .B}}", "can't give arguments to a non-function"),
            ("{{.A | .B}}", "can't pipe into a non-function"),
            ("{{upper (.A}}", "unclosed left paren"),
            ("{{.A)}}", "unexpected `)`"),
            ("{{end .A}}", "unexpected words after `end`"),
        ];
        for (source, message) in cases {
            let err = parse_str(source).expect_err(source);
            assert_eq!(err.message, message, "source: {source}");
        }
    }

    #[test]
    fn error_offset_points_at_the_open_block() {
        let err = parse_str("abc{{if .A}}").unwrap_err();
        assert_eq!(err.offset, 3);
    }

    #[test]
    fn nesting_limit_is_a_syntax_error() {
        let source = "{{if .A}}".repeat(17) + &"{{end}}".repeat(17);
        let err = parse_str(&source).unwrap_err();
        assert_eq!(err.message, "nesting too deep (limit 16)");
        let source = "{{if .A}}".repeat(16) + &"{{end}}".repeat(16);
        assert!(parse_str(&source).is_ok());
    }

    #[test]
    fn expression_nesting_is_limited() {
        let parens = |n: usize| format!("{{{{{}.{}}}}}", "(".repeat(n), ")".repeat(n));
        let err = parse_str(&parens(17)).unwrap_err();
        assert_eq!(err.message, "expression nested too deep (limit 16)");
        assert!(parse_str(&parens(16)).is_ok());

        let pipes = |n: usize| format!("{{{{.{}}}}}", " | upper".repeat(n));
        let err = parse_str(&pipes(17)).unwrap_err();
        assert_eq!(err.message, "expression nested too deep (limit 16)");
        assert!(parse_str(&pipes(16)).is_ok());

        let unclosed = format!("{{{{{}.}}}}", "(".repeat(200_000));
        let err = parse_str(&unclosed).unwrap_err();
        assert_eq!(err.message, "expression nested too deep (limit 16)");
    }

    #[test]
    fn parsing_is_deterministic() {
        let source = "{{- range .Items -}}{{.}}{{- end}}";
        assert_eq!(parse_str(source).unwrap(), parse_str(source).unwrap());
    }
}
