use crate::lexer::{is_trim_space, Token};

/// Strip whitespace next to trim-flagged actions.
///
/// A `trim_left` action removes trailing whitespace from the literal right
/// before it; a `trim_right` action removes leading whitespace from the
/// literal right after it. Literals emptied this way are dropped. Only
/// literal text is touched and a second pass changes nothing.
pub fn apply(mut tokens: Vec<Token>) -> Vec<Token> {
    for i in 0..tokens.len() {
        let (trim_left, trim_right) = match &tokens[i] {
            Token::Action {
                trim_left,
                trim_right,
                ..
            } => (*trim_left, *trim_right),
            Token::Literal { .. } => continue,
        };

        if trim_left && i > 0 {
            if let Token::Literal { text, .. } = &mut tokens[i - 1] {
                let kept = text.trim_end_matches(is_trim_space).len();
                text.truncate(kept);
            }
        }

        if trim_right {
            if let Some(Token::Literal { text, offset }) = tokens.get_mut(i + 1) {
                let stripped = text.len() - text.trim_start_matches(is_trim_space).len();
                text.drain(..stripped);
                *offset += stripped;
            }
        }
    }

    tokens.retain(|token| !matches!(token, Token::Literal { text, .. } if text.is_empty()));
    tokens
}
