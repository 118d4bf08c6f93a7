//! SQL tokenization
//!
//! A lenient tokenizer for the DDL text stored in the schema table. It
//! follows SQLite's lexical rules for identifiers, quoting, literals and
//! comments, and never fails: bytes it cannot classify become `Other`
//! tokens so that damaged schema text still yields whatever can be read.

// ============================================================================
// Token Types
// ============================================================================

/// Token kind enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    Integer,
    Float,
    String,
    Blob,

    // Identifiers and Keywords
    Identifier,

    // Keywords used by table definitions (alphabetical)
    As,
    Asc,
    Autoincrement,
    Check,
    Collate,
    Conflict,
    Constraint,
    Create,
    Default,
    Desc,
    Exists,
    Foreign,
    Generated,
    If,
    Key,
    Not,
    Null,
    On,
    Primary,
    References,
    Table,
    Temp,
    Temporary,
    Unique,
    Virtual,
    Without,

    // Punctuation
    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,
    Minus,
    Plus,
    Other,

    Eof,
}

impl TokenKind {
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::As
                | TokenKind::Asc
                | TokenKind::Autoincrement
                | TokenKind::Check
                | TokenKind::Collate
                | TokenKind::Conflict
                | TokenKind::Constraint
                | TokenKind::Create
                | TokenKind::Default
                | TokenKind::Desc
                | TokenKind::Exists
                | TokenKind::Foreign
                | TokenKind::Generated
                | TokenKind::If
                | TokenKind::Key
                | TokenKind::Not
                | TokenKind::Null
                | TokenKind::On
                | TokenKind::Primary
                | TokenKind::References
                | TokenKind::Table
                | TokenKind::Temp
                | TokenKind::Temporary
                | TokenKind::Unique
                | TokenKind::Virtual
                | TokenKind::Without
        )
    }

    /// Whether a token of this kind can name a column or table.
    ///
    /// SQLite accepts most keywords as names when unambiguous.
    pub fn is_name(&self) -> bool {
        matches!(self, TokenKind::Identifier | TokenKind::String) || self.is_keyword()
    }
}

// ============================================================================
// Token
// ============================================================================

/// A token from the SQL source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token type
    pub kind: TokenKind,
    /// Start position in source
    pub start: usize,
    /// End position in source (exclusive)
    pub end: usize,
    /// Line number (1-based)
    pub line: u32,
}

impl Token {
    pub fn new(kind: TokenKind, start: usize, end: usize, line: u32) -> Self {
        Token {
            kind,
            start,
            end,
            line,
        }
    }

    /// Get the text of this token from the source
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }

    /// Token text with identifier quoting removed
    pub fn unquoted(&self, source: &str) -> String {
        unquote(self.text(source))
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Strip SQL quoting ("x", `x`, [x], 'x') and collapse doubled quotes
pub fn unquote(text: &str) -> String {
    let bytes = text.as_bytes();
    if bytes.len() < 2 {
        return text.to_string();
    }
    let (open, close) = (bytes[0], bytes[bytes.len() - 1]);
    match (open, close) {
        (b'[', b']') => text[1..text.len() - 1].to_string(),
        (b'"', b'"') | (b'`', b'`') | (b'\'', b'\'') => {
            let quote = open as char;
            let doubled: String = [quote, quote].iter().collect();
            text[1..text.len() - 1].replace(&doubled, &quote.to_string())
        }
        _ => text.to_string(),
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

/// SQL tokenizer
pub struct Tokenizer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Tokenizer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    /// Tokenize the entire source; the last token is always `Eof`
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        if self.is_eof() {
            return Token::new(TokenKind::Eof, self.pos, self.pos, self.line);
        }

        let start = self.pos;
        let start_line = self.line;
        let kind = self.scan_token();
        Token::new(kind, start, self.pos, start_line)
    }

    fn scan_token(&mut self) -> TokenKind {
        let c = self.current();

        if c.is_ascii_digit() || (c == b'.' && self.peek().is_some_and(|n| n.is_ascii_digit())) {
            return self.scan_number();
        }
        // Blob literals
        if (c == b'x' || c == b'X') && self.peek() == Some(b'\'') {
            return self.scan_blob();
        }
        if c.is_ascii_alphabetic() || c == b'_' || c >= 0x80 {
            return self.scan_identifier();
        }
        if c == b'"' || c == b'`' || c == b'[' {
            return self.scan_quoted(TokenKind::Identifier);
        }
        if c == b'\'' {
            return self.scan_quoted(TokenKind::String);
        }

        self.advance();
        match c {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b'.' => TokenKind::Dot,
            b'-' => TokenKind::Minus,
            b'+' => TokenKind::Plus,
            _ => TokenKind::Other,
        }
    }

    fn scan_number(&mut self) -> TokenKind {
        if self.current() == b'0' && matches!(self.peek(), Some(b'x') | Some(b'X')) {
            self.advance();
            self.advance();
            while !self.is_eof() && self.current().is_ascii_hexdigit() {
                self.advance();
            }
            return TokenKind::Integer;
        }

        let mut kind = TokenKind::Integer;
        while !self.is_eof() && self.current().is_ascii_digit() {
            self.advance();
        }
        if !self.is_eof() && self.current() == b'.' {
            kind = TokenKind::Float;
            self.advance();
            while !self.is_eof() && self.current().is_ascii_digit() {
                self.advance();
            }
        }
        if !self.is_eof() && matches!(self.current(), b'e' | b'E') {
            let saved = self.pos;
            self.advance();
            if !self.is_eof() && matches!(self.current(), b'+' | b'-') {
                self.advance();
            }
            if !self.is_eof() && self.current().is_ascii_digit() {
                while !self.is_eof() && self.current().is_ascii_digit() {
                    self.advance();
                }
                return TokenKind::Float;
            }
            self.pos = saved;
        }
        kind
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while !self.is_eof() {
            let c = self.current();
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80 {
                self.advance();
            } else {
                break;
            }
        }
        keyword_or_identifier(&self.source[start..self.pos])
    }

    /// Scan a quoted identifier or string; doubled closing quotes escape
    fn scan_quoted(&mut self, kind: TokenKind) -> TokenKind {
        let quote = self.current();
        let close = if quote == b'[' { b']' } else { quote };
        self.advance();

        while !self.is_eof() {
            if self.current() == close {
                if quote != b'[' && self.peek() == Some(close) {
                    self.advance();
                    self.advance();
                } else {
                    self.advance();
                    break;
                }
            } else {
                self.advance();
            }
        }
        kind
    }

    /// Scan a blob literal (X'...')
    fn scan_blob(&mut self) -> TokenKind {
        self.advance();
        self.scan_quoted(TokenKind::Blob)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while !self.is_eof() && self.current().is_ascii_whitespace() {
                self.advance();
            }
            if self.is_eof() {
                break;
            }

            if self.current() == b'-' && self.peek() == Some(b'-') {
                while !self.is_eof() && self.current() != b'\n' {
                    self.advance();
                }
                continue;
            }

            if self.current() == b'/' && self.peek() == Some(b'*') {
                self.advance();
                self.advance();
                while !self.is_eof() {
                    if self.current() == b'*' && self.peek() == Some(b'/') {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            break;
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn current(&self) -> u8 {
        self.bytes[self.pos]
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    fn advance(&mut self) {
        if self.bytes.get(self.pos) == Some(&b'\n') {
            self.line += 1;
        }
        self.pos += 1;
    }
}

// ============================================================================
// Keyword Recognition
// ============================================================================

fn keyword_or_identifier(text: &str) -> TokenKind {
    match text.to_ascii_uppercase().as_str() {
        "AS" => TokenKind::As,
        "ASC" => TokenKind::Asc,
        "AUTOINCREMENT" => TokenKind::Autoincrement,
        "CHECK" => TokenKind::Check,
        "COLLATE" => TokenKind::Collate,
        "CONFLICT" => TokenKind::Conflict,
        "CONSTRAINT" => TokenKind::Constraint,
        "CREATE" => TokenKind::Create,
        "DEFAULT" => TokenKind::Default,
        "DESC" => TokenKind::Desc,
        "EXISTS" => TokenKind::Exists,
        "FOREIGN" => TokenKind::Foreign,
        "GENERATED" => TokenKind::Generated,
        "IF" => TokenKind::If,
        "KEY" => TokenKind::Key,
        "NOT" => TokenKind::Not,
        "NULL" => TokenKind::Null,
        "ON" => TokenKind::On,
        "PRIMARY" => TokenKind::Primary,
        "REFERENCES" => TokenKind::References,
        "TABLE" => TokenKind::Table,
        "TEMP" => TokenKind::Temp,
        "TEMPORARY" => TokenKind::Temporary,
        "UNIQUE" => TokenKind::Unique,
        "VIRTUAL" => TokenKind::Virtual,
        "WITHOUT" => TokenKind::Without,
        _ => TokenKind::Identifier,
    }
}

/// Tokenize a SQL string
pub fn tokenize(source: &str) -> Vec<Token> {
    Tokenizer::new(source).tokenize()
}
