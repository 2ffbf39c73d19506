//! Single forward-pass SQL tokenizer.

use crate::error::DbError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(String),
    Identifier(String),
    Number(String),
    StringLiteral(String),
    Comparison(String),
    Arithmetic(String),
    LeftParen,
    RightParen,
    Comma,
    Semicolon,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

const SINGLE_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "JOIN", "INNER", "NATURAL", "ON", "AS", "AND", "OR", "NOT", "IN",
    "EXISTS", "BETWEEN", "IS", "LIKE", "ASC", "DESC", "UPDATE", "SET", "VALUES", "DELETE",
    "PRIMARY", "KEY", "FOREIGN", "REFERENCES", "CASCADE", "RESTRICT", "COMMIT", "ABORT", "TRUE",
    "FALSE", "NULL", "TABLE", "CREATE", "DROP", "INTO", "LIMIT",
];

const MULTIWORD_KEYWORDS: &[(&str, &str)] = &[
    ("BEGIN TRANSACTION", "BEGIN TRANSACTION"),
    ("ORDER BY", "ORDER BY"),
    ("INSERT INTO", "INSERT INTO"),
    ("CREATE TABLE", "CREATE TABLE"),
    ("DROP TABLE", "DROP TABLE"),
    ("PRIMARY KEY", "PRIMARY KEY"),
    ("FOREIGN KEY", "FOREIGN KEY"),
];

pub struct Tokenizer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src: src.as_bytes(), pos: 0, line: 1, column: 1 }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, DbError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let (line, column) = (self.line, self.column);
            if self.pos >= self.src.len() {
                tokens.push(Token { kind: TokenKind::Eof, line, column });
                break;
            }

            if let Some(kw) = self.try_multiword_keyword() {
                tokens.push(Token { kind: TokenKind::Keyword(kw), line, column });
                continue;
            }

            let c = self.src[self.pos] as char;
            if c == '\'' || c == '"' {
                let s = self.read_quoted(c)?;
                tokens.push(Token { kind: TokenKind::StringLiteral(s), line, column });
                continue;
            }
            if c.is_ascii_digit() {
                let n = self.read_number();
                tokens.push(Token { kind: TokenKind::Number(n), line, column });
                continue;
            }
            if c.is_ascii_alphabetic() || c == '_' {
                let word = self.read_identifier_like();
                let upper = word.to_ascii_uppercase();
                if SINGLE_KEYWORDS.contains(&upper.as_str()) {
                    tokens.push(Token { kind: TokenKind::Keyword(upper), line, column });
                } else {
                    tokens.push(Token { kind: TokenKind::Identifier(word), line, column });
                }
                continue;
            }
            match c {
                '(' => {
                    self.advance();
                    tokens.push(Token { kind: TokenKind::LeftParen, line, column });
                }
                ')' => {
                    self.advance();
                    tokens.push(Token { kind: TokenKind::RightParen, line, column });
                }
                ',' => {
                    self.advance();
                    tokens.push(Token { kind: TokenKind::Comma, line, column });
                }
                ';' => {
                    self.advance();
                    tokens.push(Token { kind: TokenKind::Semicolon, line, column });
                }
                '<' | '>' | '=' => {
                    let op = self.read_comparison();
                    tokens.push(Token { kind: TokenKind::Comparison(op), line, column });
                }
                '+' | '-' | '*' | '/' => {
                    self.advance();
                    tokens.push(Token { kind: TokenKind::Arithmetic(c.to_string()), line, column });
                }
                other => {
                    return Err(DbError::Parse {
                        message: format!("unexpected character '{other}'"),
                        line,
                        column,
                    });
                }
            }
        }
        Ok(tokens)
    }

    fn try_multiword_keyword(&mut self) -> Option<String> {
        let rest = std::str::from_utf8(&self.src[self.pos..]).ok()?;
        for (pattern, canonical) in MULTIWORD_KEYWORDS {
            let words: Vec<&str> = pattern.split(' ').collect();
            let mut cursor = rest;
            let consumed = 0usize;
            let mut matched = true;
            for (i, w) in words.iter().enumerate() {
                cursor = cursor.trim_start();
                let skipped = rest.len() - cursor.len() - consumed.saturating_sub(consumed);
                let _ = skipped;
                if !cursor.to_ascii_uppercase().starts_with(w) {
                    matched = false;
                    break;
                }
                let after = &cursor[w.len()..];
                let boundary_ok = after.is_empty() || !after.chars().next().unwrap().is_ascii_alphanumeric();
                if !boundary_ok {
                    matched = false;
                    break;
                }
                cursor = after;
                if i + 1 < words.len() && !cursor.starts_with(char::is_whitespace) {
                    matched = false;
                    break;
                }
            }
            if matched {
                let total_len = rest.len() - cursor.len();
                for _ in 0..total_len {
                    self.advance();
                }
                return Some((*canonical).to_string());
            }
        }
        None
    }

    fn advance(&mut self) {
        if self.pos < self.src.len() {
            if self.src[self.pos] == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.src.len() && (self.src[self.pos] as char).is_whitespace() {
            self.advance();
        }
    }

    fn read_identifier_like(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.src.len() {
            let c = self.src[self.pos] as char;
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                self.advance();
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn read_number(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.src.len() {
            let c = self.src[self.pos] as char;
            if c.is_ascii_digit() || c == '.' {
                self.advance();
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn read_quoted(&mut self, quote: char) -> Result<String, DbError> {
        let (line, column) = (self.line, self.column);
        self.advance();
        let start = self.pos;
        while self.pos < self.src.len() && self.src[self.pos] as char != quote {
            self.advance();
        }
        if self.pos >= self.src.len() {
            return Err(DbError::Parse { message: "unterminated string literal".into(), line, column });
        }
        let s = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        self.advance();
        Ok(s)
    }

    fn read_comparison(&mut self) -> String {
        let c = self.src[self.pos] as char;
        self.advance();
        if self.pos < self.src.len() {
            let next = self.src[self.pos] as char;
            let two = format!("{c}{next}");
            if matches!(two.as_str(), "<>" | ">=" | "<=") {
                self.advance();
                return two;
            }
        }
        c.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_basic_select() {
        let toks = Tokenizer::new("SELECT name FROM users WHERE age >= 30;").tokenize().unwrap();
        let kinds: Vec<_> = toks.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(kinds[0], TokenKind::Keyword("SELECT".into()));
        assert_eq!(kinds[1], TokenKind::Identifier("name".into()));
        assert!(kinds.contains(&TokenKind::Comparison(">=".into())));
        assert_eq!(*kinds.last().unwrap(), TokenKind::Eof);
    }

    #[test]
    fn recognizes_multiword_keywords_before_components() {
        let toks = Tokenizer::new("BEGIN TRANSACTION; COMMIT;").tokenize().unwrap();
        assert_eq!(toks[0].kind, TokenKind::Keyword("BEGIN TRANSACTION".into()));
    }

    #[test]
    fn fails_on_unmatched_character_with_position() {
        let err = Tokenizer::new("SELECT @ FROM t").tokenize().unwrap_err();
        match err {
            DbError::Parse { line, column, .. } => {
                assert_eq!(line, 1);
                assert_eq!(column, 8);
            }
            _ => panic!("expected parse error"),
        }
    }

    #[test]
    fn strips_quotes_from_string_literals() {
        let toks = Tokenizer::new("'hello'").tokenize().unwrap();
        assert_eq!(toks[0].kind, TokenKind::StringLiteral("hello".into()));
    }
}
