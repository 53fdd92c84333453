//! Tokenizer for cell formula contents.

use regex::Regex;
use std::sync::LazyLock;

/// A single lexical token from a formula string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    LParen,
    RParen,
    Op(char),
    CellRef(String),
    Number(String),
}

impl Token {
    pub fn as_cell_ref(&self) -> Option<&str> {
        match self {
            Token::CellRef(name) => Some(name),
            _ => None,
        }
    }
}

// Mirrors, token class for token class, the original tokenizer's single
// alternation: parens, operators, cell refs, numbers (with optional
// exponent), whitespace. Whitespace matches are dropped after scanning.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<lparen>\()
        |(?P<rparen>\))
        |(?P<op>[+\-*/])
        |(?P<cell>\$?[A-Za-z]+\$?\d+)
        |(?P<num>(?:\d+\.\d*|\d*\.\d+|\d+)(?:[eE][+-]?\d+)?)
        |(?P<ws>\s+)
        ",
    )
    .expect("static token regex is valid")
});

/// Splits `formula` into tokens, discarding whitespace.
///
/// Characters that match none of the known token classes are simply
/// skipped, matching the best-effort behavior of the regex token iterator
/// this is grounded on.
pub fn tokenize(formula: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < formula.len() {
        let Some(m) = TOKEN_RE.find_at(formula, pos) else {
            break;
        };
        if m.start() != pos {
            // Gap of unrecognized characters; skip to the match.
            pos = m.start();
            if m.start() == m.end() {
                break;
            }
        }
        let text = m.as_str();
        if !text.chars().next().is_some_and(char::is_whitespace) {
            tokens.push(classify(text));
        }
        pos = m.end();
        if m.start() == m.end() {
            pos += 1;
        }
    }

    tokens
}

fn classify(text: &str) -> Token {
    match text {
        "(" => Token::LParen,
        ")" => Token::RParen,
        "+" | "-" | "*" | "/" => Token::Op(text.chars().next().unwrap()),
        _ if text.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '.') => {
            Token::Number(text.to_string())
        }
        _ => Token::CellRef(text.to_string()),
    }
}
