use crate::error::SyntaxError;
use crate::value::Number;

pub const OPEN: &str = "{{";
pub const CLOSE: &str = "}}";

/// Top-level token: a literal run or the raw content of one action.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Literal {
        text: String,
        offset: usize,
    },
    Action {
        /// Content between the delimiters, trim markers removed.
        content: String,
        trim_left: bool,
        trim_right: bool,
        /// Offset of the opening `{{`.
        offset: usize,
    },
}

/// Split template source into literal runs and actions.
pub fn lex(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut cursor = 0;

    while cursor < source.len() {
        let rest = &source[cursor..];
        let Some(start) = rest.find(OPEN) else {
            tokens.push(Token::Literal {
                text: rest.to_string(),
                offset: cursor,
            });
            break;
        };

        if start > 0 {
            tokens.push(Token::Literal {
                text: rest[..start].to_string(),
                offset: cursor,
            });
        }

        let open = cursor + start;
        let body_start = open + OPEN.len();
        let close = if opens_comment(&source[body_start..]) {
            // Quotes inside a comment are prose, not string literals.
            source[body_start..]
                .find("*/")
                .and_then(|end| find_close(source, body_start + end + 2))
        } else {
            find_close(source, body_start)
        }
        .ok_or_else(|| SyntaxError::new("unterminated action", open))?;

        let (content, trim_left, trim_right) = strip_trim_markers(&source[body_start..close]);
        tokens.push(Token::Action {
            content: content.to_string(),
            trim_left,
            trim_right,
            offset: open,
        });
        cursor = close + CLOSE.len();
    }

    Ok(tokens)
}

/// Byte index of the `}}` closing the action whose body starts at `from`.
/// Quoted strings are skipped so `}}` may appear inside them.
fn find_close(source: &str, from: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                if i >= bytes.len() {
                    return None;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
                if i >= bytes.len() {
                    return None;
                }
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn opens_comment(body: &str) -> bool {
    let body = body
        .strip_prefix('-')
        .filter(|rest| rest.starts_with(is_trim_space))
        .unwrap_or(body);
    body.trim_start_matches(is_trim_space).starts_with("/*")
}

fn strip_trim_markers(body: &str) -> (&str, bool, bool) {
    let mut content = body;
    let mut trim_left = false;
    let mut trim_right = false;

    let mut chars = content.chars();
    if chars.next() == Some('-') && chars.next().is_some_and(is_trim_space) {
        trim_left = true;
        content = &content[1..];
    }

    let mut rev = content.chars().rev();
    if rev.next() == Some('-') && rev.next().is_some_and(is_trim_space) {
        trim_right = true;
        content = &content[..content.len() - 1];
    }

    (content.trim_matches(is_trim_space), trim_left, trim_right)
}

/// Whitespace recognised by trim markers and the trim pass.
pub fn is_trim_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// A word inside an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Word {
    /// `.`
    Dot,
    /// `.A.B`
    Field(Vec<String>),
    /// `$` or `$.A.B`
    Root(Vec<String>),
    Ident(String),
    Str(String),
    Number(Number),
    Pipe,
    LParen,
    RParen,
}

/// Tokenize the content of a single action. Errors are reported at
/// `offset`, the position of the action's opening delimiter.
pub fn lex_action(content: &str, offset: usize) -> Result<Vec<Word>, SyntaxError> {
    let mut words = Vec::new();
    let mut chars = content.char_indices().peekable();

    while let Some(&(idx, c)) = chars.peek() {
        if is_trim_space(c) {
            chars.next();
            continue;
        }

        let word = match c {
            '|' => {
                chars.next();
                Word::Pipe
            }
            '(' => {
                chars.next();
                Word::LParen
            }
            ')' => {
                chars.next();
                Word::RParen
            }
            '.' => {
                let end = scan_while(content, idx, |c| is_ident_char(c) || c == '.');
                let text = &content[idx..end];
                advance_to(&mut chars, end);
                if text == "." {
                    Word::Dot
                } else {
                    Word::Field(field_path(&text[1..], offset)?)
                }
            }
            '$' => {
                let end = scan_while(content, idx + 1, |c| is_ident_char(c) || c == '.');
                let text = &content[idx + 1..end];
                advance_to(&mut chars, end);
                match text {
                    "" => Word::Root(Vec::new()),
                    _ if text.starts_with('.') => Word::Root(field_path(&text[1..], offset)?),
                    _ => {
                        return Err(SyntaxError::new(
                            format!("variables are not supported: ${text}"),
                            offset,
                        ))
                    }
                }
            }
            '"' => {
                let (value, end) = interpreted_string(content, idx, offset)?;
                advance_to(&mut chars, end);
                Word::Str(value)
            }
            '`' => {
                let close = content[idx + 1..]
                    .find('`')
                    .ok_or_else(|| SyntaxError::new("unterminated raw string", offset))?;
                let end = idx + 1 + close + 1;
                let value = content[idx + 1..end - 1].to_string();
                advance_to(&mut chars, end);
                Word::Str(value)
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' => {
                let end = number_end(content, idx);
                let text = &content[idx..end];
                advance_to(&mut chars, end);
                Word::Number(number(text, offset)?)
            }
            c if is_ident_char(c) => {
                let end = scan_while(content, idx, is_ident_char);
                let text = &content[idx..end];
                advance_to(&mut chars, end);
                Word::Ident(text.to_string())
            }
            other => {
                return Err(SyntaxError::new(
                    format!("unexpected character {other:?} in action"),
                    offset,
                ))
            }
        };
        words.push(word);
    }

    Ok(words)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn scan_while(content: &str, from: usize, pred: impl Fn(char) -> bool) -> usize {
    content[from..]
        .char_indices()
        .find(|&(_, c)| !pred(c))
        .map(|(i, _)| from + i)
        .unwrap_or(content.len())
}

/// End of a number starting at `start`. A sign is only part of the number
/// right after an exponent marker (`1e-5`).
fn number_end(content: &str, start: usize) -> usize {
    let mut prev = None;
    for (i, c) in content[start..].char_indices() {
        let exponent_sign = matches!(c, '+' | '-') && matches!(prev, Some('e' | 'E'));
        let accepted =
            i == 0 || c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign;
        if !accepted {
            return start + i;
        }
        prev = Some(c);
    }
    content.len()
}

fn advance_to(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>, end: usize) {
    while chars.peek().is_some_and(|&(i, _)| i < end) {
        chars.next();
    }
}

/// Split `A.B.C` (leading dot already removed) into identifiers.
fn field_path(text: &str, offset: usize) -> Result<Vec<String>, SyntaxError> {
    text.split('.')
        .map(|segment| {
            if segment.is_empty() || segment.starts_with(|c: char| c.is_ascii_digit()) {
                Err(SyntaxError::new(format!("bad field path .{text}"), offset))
            } else {
                Ok(segment.to_string())
            }
        })
        .collect()
}

fn number(text: &str, offset: usize) -> Result<Number, SyntaxError> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Number::Int(i));
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(Number::Float(f)),
        _ => Err(SyntaxError::new(format!("bad number syntax: {text:?}"), offset)),
    }
}

/// Decode a `"..."` string starting at `start`; returns the value and the
/// index just past the closing quote.
fn interpreted_string(
    content: &str,
    start: usize,
    offset: usize,
) -> Result<(String, usize), SyntaxError> {
    let mut value = String::new();
    let mut chars = content[start + 1..].char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((value, start + 1 + i + 1)),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, 'r')) => value.push('\r'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, '\'')) => value.push('\''),
                Some((_, other)) => {
                    return Err(SyntaxError::new(
                        format!("unknown escape sequence \\{other}"),
                        offset,
                    ))
                }
                None => break,
            },
            c => value.push(c),
        }
    }
    Err(SyntaxError::new("unterminated quoted string", offset))
}
