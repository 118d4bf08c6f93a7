//! Schema table model
//!
//! The schema table lives in the B-tree rooted at page 1 and holds one row
//! per table, index, view and trigger with the fixed columns
//! `type, name, tbl_name, rootpage, sql`. Table definitions are recovered
//! from the stored `CREATE TABLE` text; only what row decoding needs is
//! extracted (column names, declared types, the rowid alias).

use crate::error::{Error, Result};
use crate::parser::tokenizer::{tokenize, Token, TokenKind};
use crate::types::{Pgno, RowId, Value};

// ============================================================================
// Constants
// ============================================================================

/// Root page of the schema table
pub const SCHEMA_ROOT_PAGE: Pgno = 1;

/// Name SQLite gives the schema table
pub const SCHEMA_TABLE_NAME: &str = "sqlite_master";

/// Fixed columns of the schema table
pub const SCHEMA_COLUMNS: [&str; 5] = ["type", "name", "tbl_name", "rootpage", "sql"];

// ============================================================================
// Basic Types
// ============================================================================

/// Text encoding (SQLITE_UTF8, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Encoding {
    #[default]
    Utf8 = 1,
    Utf16le = 2,
    Utf16be = 3,
}

/// Column type affinity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Affinity {
    #[default]
    Blob,
    Text,
    Numeric,
    Integer,
    Real,
}

/// Determine column affinity from a declared type name.
///
/// 1. contains "INT" -> INTEGER
/// 2. contains "CHAR", "CLOB", or "TEXT" -> TEXT
/// 3. contains "BLOB" or is empty -> BLOB
/// 4. contains "REAL", "FLOA", or "DOUB" -> REAL
/// 5. otherwise -> NUMERIC
pub fn type_affinity(type_name: &str) -> Affinity {
    let upper = type_name.to_ascii_uppercase();
    if upper.contains("INT") {
        Affinity::Integer
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        Affinity::Text
    } else if upper.contains("BLOB") || upper.is_empty() {
        Affinity::Blob
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        Affinity::Real
    } else {
        Affinity::Numeric
    }
}

/// Kind of schema object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectType {
    Table,
    Index,
    View,
    Trigger,
    Other(String),
}

impl ObjectType {
    pub fn parse(text: &str) -> Self {
        match text {
            "table" => ObjectType::Table,
            "index" => ObjectType::Index,
            "view" => ObjectType::View,
            "trigger" => ObjectType::Trigger,
            other => ObjectType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ObjectType::Table => "table",
            ObjectType::Index => "index",
            ObjectType::View => "view",
            ObjectType::Trigger => "trigger",
            ObjectType::Other(s) => s,
        }
    }
}

// ============================================================================
// Schema Entries
// ============================================================================

/// One row of the schema table
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaEntry {
    /// Row id within the schema table
    pub row_id: RowId,
    pub object_type: ObjectType,
    pub name: String,
    pub tbl_name: String,
    /// Root page, 0 for views and triggers
    pub root_page: Pgno,
    /// Original `CREATE` text, absent for automatic indexes
    pub sql: Option<String>,
}

impl SchemaEntry {
    /// Build an entry from a decoded schema-table record
    pub fn from_values(row_id: RowId, values: &[Value]) -> Result<Self> {
        if values.len() < SCHEMA_COLUMNS.len() {
            return Err(Error::CorruptRecord {
                row_id,
                message: format!(
                    "schema row has {} columns, expected {}",
                    values.len(),
                    SCHEMA_COLUMNS.len()
                ),
            });
        }
        let text = |v: &Value| v.as_text().map(str::to_string).unwrap_or_default();
        let root_page = match &values[3] {
            Value::Integer(n) if *n >= 0 && *n <= Pgno::MAX as i64 => *n as Pgno,
            Value::Null => 0,
            other => {
                return Err(Error::CorruptRecord {
                    row_id,
                    message: format!("schema rootpage {} is not a page number", other),
                })
            }
        };

        Ok(SchemaEntry {
            row_id,
            object_type: ObjectType::parse(&text(&values[0])),
            name: text(&values[1]),
            tbl_name: text(&values[2]),
            root_page,
            sql: values[4].as_text().map(str::to_string),
        })
    }

    pub fn is_table(&self) -> bool {
        self.object_type == ObjectType::Table
    }
}

/// All entries of the schema table at one checkpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub entries: Vec<SchemaEntry>,
}

impl Schema {
    pub fn new(entries: Vec<SchemaEntry>) -> Self {
        Schema { entries }
    }

    /// Table entries in schema-table order
    pub fn tables(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.entries.iter().filter(|e| e.is_table())
    }

    /// Index entries in schema-table order
    pub fn indexes(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.entries
            .iter()
            .filter(|e| e.object_type == ObjectType::Index)
    }

    /// Find a table by name, ignoring ASCII case
    pub fn find_table(&self, name: &str) -> Option<&SchemaEntry> {
        self.tables().find(|e| e.name.eq_ignore_ascii_case(name))
    }
}

// ============================================================================
// Table Definitions
// ============================================================================

/// Column in a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Declared type, if any
    pub type_name: Option<String>,
    pub affinity: Affinity,
    pub is_primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
            affinity: Affinity::Blob,
            is_primary_key: false,
        }
    }
}

/// Definition recovered from `CREATE TABLE` text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<Column>,
    /// Index of the column that aliases the row id
    pub rowid_alias: Option<usize>,
    pub without_rowid: bool,
    pub is_virtual: bool,
}

impl TableDef {
    /// Fixed definition of the schema table itself
    pub fn schema_table() -> Self {
        TableDef {
            name: SCHEMA_TABLE_NAME.to_string(),
            columns: SCHEMA_COLUMNS.iter().map(|c| Column::new(*c)).collect(),
            ..Default::default()
        }
    }

    /// Position of a column, ignoring ASCII case
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Parse the column list out of `CREATE TABLE` text.
///
/// Returns `None` when the text is not a table definition the decoder can
/// use. Virtual tables and `CREATE TABLE ... AS SELECT` yield a definition
/// with no columns.
pub fn parse_create_table(sql: &str) -> Option<TableDef> {
    let tokens = tokenize(sql);
    DdlParser {
        sql,
        tokens: &tokens,
        pos: 0,
    }
    .create_table()
}

struct DdlParser<'a> {
    sql: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> DdlParser<'a> {
    fn peek(&self) -> TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos)?;
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        Some(token)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn name(&mut self) -> Option<String> {
        if self.peek().is_name() {
            self.bump().map(|t| t.unquoted(self.sql))
        } else {
            None
        }
    }

    /// Skip a balanced parenthesised group; the opening paren is current
    fn skip_group(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.bump() {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                TokenKind::Eof => return,
                _ => {}
            }
        }
    }

    fn create_table(mut self) -> Option<TableDef> {
        if !self.eat(TokenKind::Create) {
            return None;
        }
        let _ = self.eat(TokenKind::Temp) || self.eat(TokenKind::Temporary);
        let is_virtual = self.eat(TokenKind::Virtual);
        if !self.eat(TokenKind::Table) {
            return None;
        }
        if self.eat(TokenKind::If) {
            self.eat(TokenKind::Not);
            self.eat(TokenKind::Exists);
        }

        let mut name = self.name()?;
        if self.eat(TokenKind::Dot) {
            name = self.name()?;
        }
        let mut table = TableDef {
            name,
            is_virtual,
            ..Default::default()
        };
        if is_virtual || self.peek() == TokenKind::As {
            return Some(table);
        }
        if !self.eat(TokenKind::LParen) {
            return None;
        }

        let mut table_pk: Vec<String> = Vec::new();
        let mut column_pk_desc = false;
        loop {
            match self.peek() {
                TokenKind::Constraint
                | TokenKind::Primary
                | TokenKind::Unique
                | TokenKind::Check
                | TokenKind::Foreign => {
                    self.table_constraint(&mut table_pk);
                }
                TokenKind::Eof => break,
                _ => {
                    let (column, desc) = self.column_def()?;
                    if column.is_primary_key {
                        column_pk_desc = desc;
                    }
                    table.columns.push(column);
                }
            }
            match self.peek() {
                TokenKind::Comma => {
                    self.pos += 1;
                }
                TokenKind::RParen => {
                    self.pos += 1;
                    break;
                }
                _ => break,
            }
        }

        // WITHOUT ROWID may be followed by STRICT in either order
        while self.peek() != TokenKind::Eof {
            if self.eat(TokenKind::Without) {
                if let Some(word) = self.name() {
                    if word.eq_ignore_ascii_case("rowid") {
                        table.without_rowid = true;
                    }
                }
            } else {
                self.pos += 1;
            }
        }

        for pk in &table_pk {
            if let Some(idx) = table.find_column(pk) {
                table.columns[idx].is_primary_key = true;
            }
        }
        table.rowid_alias = rowid_alias(&table, &table_pk, column_pk_desc);
        Some(table)
    }

    /// Parse one column definition; returns the column and whether a
    /// column-level PRIMARY KEY was declared DESC
    fn column_def(&mut self) -> Option<(Column, bool)> {
        let mut column = Column::new(self.name()?);

        // Type name: identifiers plus an optional (size) suffix
        let mut type_span: Option<(usize, usize)> = None;
        while self.peek() == TokenKind::Identifier {
            let token = self.bump()?;
            let start = type_span.map(|(s, _)| s).unwrap_or(token.start);
            type_span = Some((start, token.end));
        }
        if type_span.is_some() && self.peek() == TokenKind::LParen {
            let start = type_span.map(|(s, _)| s).unwrap_or(0);
            self.skip_group();
            let end = self
                .tokens
                .get(self.pos.saturating_sub(1))
                .map(|t| t.end)
                .unwrap_or(start);
            type_span = Some((start, end));
        }
        if let Some((start, end)) = type_span {
            let type_name = self.sql.get(start..end).unwrap_or("").to_string();
            column.affinity = type_affinity(&type_name);
            column.type_name = Some(type_name);
        }

        // Column constraints until the next top-level comma or close paren
        let mut desc = false;
        loop {
            match self.peek() {
                TokenKind::Comma | TokenKind::RParen | TokenKind::Eof => break,
                TokenKind::LParen => self.skip_group(),
                TokenKind::Primary => {
                    self.pos += 1;
                    if self.eat(TokenKind::Key) {
                        column.is_primary_key = true;
                        if self.eat(TokenKind::Desc) {
                            desc = true;
                        }
                    }
                }
                _ => {
                    self.pos += 1;
                }
            }
        }
        Some((column, desc))
    }

    fn table_constraint(&mut self, table_pk: &mut Vec<String>) {
        if self.eat(TokenKind::Constraint) {
            self.name();
        }
        if self.eat(TokenKind::Primary) && self.eat(TokenKind::Key) && self.eat(TokenKind::LParen)
        {
            loop {
                match self.peek() {
                    TokenKind::RParen => {
                        self.pos += 1;
                        break;
                    }
                    TokenKind::Eof => break,
                    TokenKind::Comma => self.pos += 1,
                    TokenKind::LParen => self.skip_group(),
                    _ => {
                        if let Some(name) = self.name() {
                            table_pk.push(name);
                        }
                        // COLLATE x / ASC / DESC
                        while !matches!(
                            self.peek(),
                            TokenKind::Comma | TokenKind::RParen | TokenKind::Eof
                        ) {
                            self.pos += 1;
                        }
                    }
                }
            }
        }
        while !matches!(
            self.peek(),
            TokenKind::Comma | TokenKind::RParen | TokenKind::Eof
        ) {
            if self.peek() == TokenKind::LParen {
                self.skip_group();
            } else {
                self.pos += 1;
            }
        }
    }
}

/// Column holding the row id, if the table has one.
///
/// A column-level `INTEGER PRIMARY KEY` aliases the row id unless declared
/// `DESC`; a table-level `PRIMARY KEY (col)` does when `col` is declared
/// exactly `INTEGER`.
fn rowid_alias(table: &TableDef, table_pk: &[String], column_pk_desc: bool) -> Option<usize> {
    if table.without_rowid {
        return None;
    }
    let is_integer = |c: &Column| {
        c.type_name
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("INTEGER"))
    };

    if table_pk.len() == 1 {
        let idx = table.find_column(&table_pk[0])?;
        return is_integer(&table.columns[idx]).then_some(idx);
    }
    if !table_pk.is_empty() {
        return None;
    }
    let pk: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_primary_key)
        .map(|(i, _)| i)
        .collect();
    match pk[..] {
        [idx] if !column_pk_desc && is_integer(&table.columns[idx]) => Some(idx),
        _ => None,
    }
}
