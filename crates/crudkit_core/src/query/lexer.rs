//! Statement tokenizer and placeholder analysis.
//!
//! # Invariants
//! - Concatenating every token's text reproduces the input exactly.
//! - Placeholders inside string literals, quoted identifiers and comments
//!   are never reported.

use crate::query::ParameterBindingError;

/// Largest `?NNN` index SQLite accepts by default.
const MAX_PARAMETER_INDEX: u32 = 32766;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident,
    QuotedIdent,
    StringLit,
    Number,
    Placeholder(Placeholder),
    Symbol,
    Whitespace,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Placeholder {
    Anonymous,
    Numbered(u32),
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
}

impl Token<'_> {
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Ident && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }
}

/// Splits statement text into tokens.
///
/// # Errors
/// Returns a message for unterminated literals/comments and for placeholder
/// forms this layer does not bind (`@name`, `$name`, `?0`).
pub(crate) fn tokenize(text: &str) -> Result<Vec<Token<'_>>, String> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let byte = bytes[pos];
        let kind = match byte {
            b' ' | b'\t' | b'\n' | b'\r' => {
                pos = skip_while(bytes, pos, |b| b.is_ascii_whitespace());
                TokenKind::Whitespace
            }
            b'-' if bytes.get(pos + 1) == Some(&b'-') => {
                pos = skip_while(bytes, pos, |b| b != b'\n');
                TokenKind::Comment
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                let end = text[pos + 2..]
                    .find("*/")
                    .ok_or_else(|| format!("unterminated block comment at offset {start}"))?;
                pos += 2 + end + 2;
                TokenKind::Comment
            }
            b'\'' => {
                pos = skip_quoted(bytes, pos, b'\'')
                    .ok_or_else(|| format!("unterminated string literal at offset {start}"))?;
                TokenKind::StringLit
            }
            b'"' | b'`' => {
                pos = skip_quoted(bytes, pos, byte)
                    .ok_or_else(|| format!("unterminated quoted identifier at offset {start}"))?;
                TokenKind::QuotedIdent
            }
            b'[' => {
                let end = text[pos..]
                    .find(']')
                    .ok_or_else(|| format!("unterminated quoted identifier at offset {start}"))?;
                pos += end + 1;
                TokenKind::QuotedIdent
            }
            b'?' => {
                let digits_end = skip_while(bytes, pos + 1, |b| b.is_ascii_digit());
                if digits_end == pos + 1 {
                    pos += 1;
                    TokenKind::Placeholder(Placeholder::Anonymous)
                } else {
                    let index = text[pos + 1..digits_end]
                        .parse::<u32>()
                        .ok()
                        .filter(|index| (1..=MAX_PARAMETER_INDEX).contains(index))
                        .ok_or_else(|| {
                            format!(
                                "parameter index `{}` out of range 1..={MAX_PARAMETER_INDEX}",
                                &text[pos..digits_end]
                            )
                        })?;
                    pos = digits_end;
                    TokenKind::Placeholder(Placeholder::Numbered(index))
                }
            }
            b':' if bytes.get(pos + 1).is_some_and(|b| is_ident_start(*b)) => {
                pos = skip_while(bytes, pos + 1, is_ident_continue);
                TokenKind::Placeholder(Placeholder::Named(text[start + 1..pos].to_string()))
            }
            b'@' | b'$' if bytes.get(pos + 1).is_some_and(|b| is_ident_start(*b)) => {
                return Err(format!(
                    "unsupported placeholder prefix `{}` at offset {start}; use `:name`",
                    byte as char
                ));
            }
            b if b.is_ascii_digit() => {
                pos = skip_while(bytes, pos, |b| b.is_ascii_alphanumeric() || b == b'.');
                TokenKind::Number
            }
            b if is_ident_start(b) => {
                pos = skip_while(bytes, pos, is_ident_continue);
                TokenKind::Ident
            }
            _ => {
                pos += 1;
                TokenKind::Symbol
            }
        };
        tokens.push(Token {
            kind,
            text: &text[start..pos],
        });
    }

    Ok(tokens)
}

/// Placeholder layout of one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlaceholderSet {
    None,
    /// `?` / `?NNN`; `count` is the highest index in use.
    Positional { count: usize },
    /// `:name`, distinct names in first-appearance order.
    Named(Vec<String>),
}

/// Collects placeholders using SQLite's numbering rules: `?NNN` takes index
/// NNN, a bare `?` takes one more than the largest index assigned so far.
pub(crate) fn placeholders(tokens: &[Token<'_>]) -> Result<PlaceholderSet, ParameterBindingError> {
    let mut highest = 0usize;
    let mut positional = false;
    let mut names: Vec<String> = Vec::new();

    for token in tokens {
        let TokenKind::Placeholder(placeholder) = &token.kind else {
            continue;
        };
        match placeholder {
            Placeholder::Anonymous => {
                positional = true;
                highest += 1;
            }
            Placeholder::Numbered(index) => {
                positional = true;
                highest = highest.max(*index as usize);
            }
            Placeholder::Named(name) => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
    }

    match (positional, names.is_empty()) {
        (true, false) => Err(ParameterBindingError::MixedPlaceholders),
        (true, true) => Ok(PlaceholderSet::Positional { count: highest }),
        (false, false) => Ok(PlaceholderSet::Named(names)),
        (false, true) => Ok(PlaceholderSet::None),
    }
}

/// SQLite treats every byte at or above 0x80 as an identifier character, so
/// multi-byte UTF-8 sequences stay inside one identifier.
fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte >= 0x80
}

fn is_ident_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte >= 0x80
}

fn skip_while(bytes: &[u8], mut pos: usize, predicate: impl Fn(u8) -> bool) -> usize {
    while pos < bytes.len() && predicate(bytes[pos]) {
        pos += 1;
    }
    pos
}

/// Returns the offset just past the closing quote; doubled quotes escape.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> Option<usize> {
    let mut pos = start + 1;
    while pos < bytes.len() {
        if bytes[pos] == quote {
            if bytes.get(pos + 1) == Some(&quote) {
                pos += 2;
                continue;
            }
            return Some(pos + 1);
        }
        pos += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{placeholders, tokenize, PlaceholderSet, TokenKind};
    use crate::query::ParameterBindingError;

    fn set(text: &str) -> Result<PlaceholderSet, ParameterBindingError> {
        placeholders(&tokenize(text).unwrap())
    }

    #[test]
    fn tokens_reassemble_input() {
        let text = "SELECT \"a\"\"b\", 'it''s ?' FROM t -- :skip\nWHERE x = ?2 /* ? */";
        let tokens = tokenize(text).unwrap();
        let joined: String = tokens.iter().map(|token| token.text).collect();
        assert_eq!(joined, text);
        assert!(tokens
            .iter()
            .any(|token| token.kind == TokenKind::StringLit && token.text == "'it''s ?'"));
    }

    #[test]
    fn placeholders_inside_literals_and_comments_are_ignored() {
        assert_eq!(
            set("SELECT '?', \":x\" FROM t -- ?\n/* :y */").unwrap(),
            PlaceholderSet::None
        );
    }

    #[test]
    fn positional_numbering_follows_sqlite_rules() {
        assert_eq!(
            set("VALUES (?, ?, ?)").unwrap(),
            PlaceholderSet::Positional { count: 3 }
        );
        assert_eq!(
            set("WHERE a = ?3 AND b = ?1").unwrap(),
            PlaceholderSet::Positional { count: 3 }
        );
        assert_eq!(
            set("WHERE a = ?2 AND b = ?").unwrap(),
            PlaceholderSet::Positional { count: 3 }
        );
    }

    #[test]
    fn named_placeholders_are_deduplicated_in_order() {
        assert_eq!(
            set("WHERE p.price > :min AND p.price < :max OR p.price = :min").unwrap(),
            PlaceholderSet::Named(vec!["min".to_string(), "max".to_string()])
        );
    }

    #[test]
    fn non_ascii_names_stay_whole() {
        assert_eq!(
            set("SELECT :naïve, :prix_€").unwrap(),
            PlaceholderSet::Named(vec!["naïve".to_string(), "prix_€".to_string()])
        );
        let tokens = tokenize("SELECT café FROM t").unwrap();
        assert!(tokens
            .iter()
            .any(|token| token.kind == TokenKind::Ident && token.text == "café"));
    }

    #[test]
    fn mixing_styles_and_bad_forms_fail() {
        assert_eq!(
            set("WHERE a = ? AND b = :b"),
            Err(ParameterBindingError::MixedPlaceholders)
        );
        assert!(tokenize("WHERE a = ?0").is_err());
        assert!(tokenize("WHERE a = @name").is_err());
        assert!(tokenize("WHERE a = 'open").is_err());
        assert!(tokenize("/* open").is_err());
    }
}
