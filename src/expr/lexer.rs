//! Tokenizer for condition expressions.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    StrictEq,
    StrictNotEq,
    And,
    Or,
    Eof,
}

impl TokenKind {
    /// Human readable form for error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::Str(s) => format!("string '{}'", s),
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Eof => "end of expression".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::Not => "!",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::StrictEq => "===",
            TokenKind::StrictNotEq => "!==",
            TokenKind::And => "&&",
            TokenKind::Or => "||",
            TokenKind::Number(_) | TokenKind::Str(_) | TokenKind::Ident(_) | TokenKind::Eof => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Character offset of the token start.
    pub pos: usize,
}

/// Split `source` into tokens, ending with `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                i += 1;
                if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text.parse::<f64>().map_err(|_| ExprError::InvalidNumber(text.clone()))?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                pos: start,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident(chars[start..i].iter().collect()),
                pos: start,
            });
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, next) = read_string(&chars, i)?;
            tokens.push(Token {
                kind: TokenKind::Str(text),
                pos: start,
            });
            i = next;
            continue;
        }

        let peek = |offset: usize| chars.get(i + offset).copied();
        let (kind, len) = match c {
            '(' => (TokenKind::LParen, 1),
            ')' => (TokenKind::RParen, 1),
            '[' => (TokenKind::LBracket, 1),
            ']' => (TokenKind::RBracket, 1),
            '.' => (TokenKind::Dot, 1),
            ',' => (TokenKind::Comma, 1),
            '+' => (TokenKind::Plus, 1),
            '-' => (TokenKind::Minus, 1),
            '*' => (TokenKind::Star, 1),
            '/' => (TokenKind::Slash, 1),
            '%' => (TokenKind::Percent, 1),
            '<' if peek(1) == Some('=') => (TokenKind::Le, 2),
            '<' => (TokenKind::Lt, 1),
            '>' if peek(1) == Some('=') => (TokenKind::Ge, 2),
            '>' => (TokenKind::Gt, 1),
            '=' if peek(1) == Some('=') && peek(2) == Some('=') => (TokenKind::StrictEq, 3),
            '=' if peek(1) == Some('=') => (TokenKind::EqEq, 2),
            '!' if peek(1) == Some('=') && peek(2) == Some('=') => (TokenKind::StrictNotEq, 3),
            '!' if peek(1) == Some('=') => (TokenKind::NotEq, 2),
            '!' => (TokenKind::Not, 1),
            '&' if peek(1) == Some('&') => (TokenKind::And, 2),
            '|' if peek(1) == Some('|') => (TokenKind::Or, 2),
            other => return Err(ExprError::UnexpectedChar { ch: other, pos: start }),
        };
        tokens.push(Token { kind, pos: start });
        i += len;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        pos: chars.len(),
    });
    Ok(tokens)
}

/// Read a quoted string starting at `start`; returns the text and the index after the closing quote.
fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ExprError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((text, i + 1)),
            '\\' => {
                let escaped = chars.get(i + 1).ok_or(ExprError::UnterminatedString(start))?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => *other,
                });
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(ExprError::UnterminatedString(start))
}
