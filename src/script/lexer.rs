use crate::error::{Result, ScoutError};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Punct(&'static str),
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

// Longest first so that `//` wins over `/`.
const PUNCTUATION: &[&str] = &[
    "==", "!=", "<=", ">=", "//", "+=", "-=", "*=", "/=", "<", ">", "=", "+", "-", "*", "/",
    "%", "&", "|", "~", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    depth: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            depth: 0,
            tokens: Vec::new(),
        }
    }

    fn error(&self, message: impl Into<String>, line: usize, column: usize) -> ScoutError {
        ScoutError::Syntax {
            message: message.into(),
            line,
            column,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, line: usize, column: usize) {
        self.tokens.push(Token { kind, line, column });
    }

    fn push_newline(&mut self, line: usize, column: usize) {
        let redundant = matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline)
        );
        if !redundant {
            self.push(TokenKind::Newline, line, column);
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        while let Some(c) = self.peek(0) {
            let (line, column) = (self.line, self.column);
            match c {
                '\n' => {
                    self.bump();
                    if self.depth == 0 {
                        self.push_newline(line, column);
                    }
                }
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '#' => {
                    while self.peek(0).is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                }
                '\\' if self.peek(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                }
                '\'' | '"' => {
                    let text = self.string(c, line, column)?;
                    self.push(TokenKind::Str(text), line, column);
                }
                c if c.is_ascii_digit() || (c == '.' && self.peek(1).is_some_and(|n| n.is_ascii_digit())) => {
                    let kind = self.number(line, column)?;
                    self.push(kind, line, column);
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut name = String::new();
                    while let Some(next) = self.peek(0) {
                        if next.is_alphanumeric() || next == '_' {
                            name.push(next);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    self.push(TokenKind::Name(name), line, column);
                }
                _ => {
                    let rest: String = self.chars[self.pos..].iter().take(2).collect();
                    let Some(punct) = PUNCTUATION.iter().find(|p| rest.starts_with(**p)) else {
                        return Err(self.error(format!("unexpected character '{c}'"), line, column));
                    };
                    for _ in 0..punct.chars().count() {
                        self.bump();
                    }
                    match *punct {
                        "(" | "[" | "{" => self.depth += 1,
                        ")" | "]" | "}" => {
                            if self.depth == 0 {
                                return Err(self.error(format!("unmatched '{punct}'"), line, column));
                            }
                            self.depth -= 1;
                        }
                        ";" if self.depth == 0 => {
                            self.push_newline(line, column);
                            continue;
                        }
                        _ => {}
                    }
                    self.push(TokenKind::Punct(punct), line, column);
                }
            }
        }
        if self.depth > 0 {
            return Err(self.error("unexpected end of input: unclosed bracket", self.line, self.column));
        }
        let (line, column) = (self.line, self.column);
        self.push_newline(line, column);
        self.push(TokenKind::Eof, line, column);
        Ok(self.tokens)
    }

    fn string(&mut self, quote: char, line: usize, column: usize) -> Result<String> {
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(self.error("unterminated string literal", line, column));
                }
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some(other) => text.push(other),
                    None => return Err(self.error("unterminated string literal", line, column)),
                },
                Some(c) if c == quote => return Ok(text),
                Some(c) => text.push(c),
            }
        }
    }

    fn number(&mut self, line: usize, column: usize) -> Result<TokenKind> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek(0) {
            match c {
                '0'..='9' | '_' => {
                    self.bump();
                }
                '.' if !is_float && self.peek(1).is_none_or(|n| !n.is_alphabetic() && n != '_') => {
                    is_float = true;
                    self.bump();
                }
                'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(0), Some('+' | '-')) {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let invalid = || self.error(format!("invalid number literal '{text}'"), line, column);
        if is_float {
            text.parse().map(TokenKind::Float).map_err(|_| invalid())
        } else {
            text.parse().map(TokenKind::Int).map_err(|_| invalid())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokens")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let tokens = kinds("x = [1,\n 2]\n\n# note\ny = 'a'");
        let newlines = tokens.iter().filter(|k| **k == TokenKind::Newline).count();
        assert_eq!(newlines, 2);
        assert!(tokens.contains(&TokenKind::Str("a".into())));
    }

    #[test]
    fn semicolons_split_statements() {
        let tokens = kinds("a = 1; b = 2.5");
        assert_eq!(tokens[3], TokenKind::Newline);
        assert!(tokens.contains(&TokenKind::Float(2.5)));
    }

    #[test]
    fn errors_carry_positions() {
        let err = tokenize("x = 1\ny = 'open").expect_err("unterminated");
        match err {
            ScoutError::Syntax { line, column, .. } => assert_eq!((line, column), (2, 5)),
            other => panic!("unexpected error {other:?}"),
        }
        let err = tokenize("x = 1 $ 2").expect_err("bad char");
        assert!(matches!(err, ScoutError::Syntax { column: 7, .. }));
    }

    #[test]
    fn floor_division_is_one_token() {
        let tokens = kinds("a // 2");
        assert_eq!(tokens[1], TokenKind::Punct("//"));
    }
}
