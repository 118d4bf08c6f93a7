//! Tables and rows
//!
//! `Tables` walks the schema table, `Rows` walks one table's B-tree; both
//! are lazy and hold only the traversal stack. Each `Row` owns its decoded
//! values but still checks the session, so a closed database cannot leak
//! data through rows read before the close.

use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, Result};
use crate::schema::{parse_create_table, Column, SchemaEntry, TableDef, SCHEMA_ROOT_PAGE};
use crate::storage::btree::TableCursor;
use crate::types::{Pgno, RowId, Value};

use super::connection::Session;

// ============================================================================
// Tables
// ============================================================================

/// Lazy iterator over the tables in the schema
pub struct Tables {
    session: Arc<Session>,
    cursor: TableCursor,
    done: bool,
}

impl Tables {
    pub(crate) fn new(session: Arc<Session>) -> Result<Self> {
        let cursor = session.cursor(SCHEMA_ROOT_PAGE)?;
        Ok(Tables {
            session,
            cursor,
            done: false,
        })
    }

    fn entry(&self, row_id: RowId, payload: &[u8]) -> Result<SchemaEntry> {
        let values = self.session.decode(row_id, payload)?;
        SchemaEntry::from_values(row_id, &values)
    }
}

impl Iterator for Tables {
    type Item = Result<Table>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(e) = self.session.check_open() {
            self.done = true;
            return Some(Err(e));
        }
        loop {
            let cell = match self.cursor.next()? {
                Ok(cell) => cell,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            match self.entry(cell.row_id, &cell.payload) {
                Ok(entry) if entry.is_table() => {
                    return Some(Ok(Table::new(self.session.clone(), entry)))
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl std::iter::FusedIterator for Tables {}

// ============================================================================
// Table
// ============================================================================

/// One table of the schema
pub struct Table {
    session: Arc<Session>,
    entry: SchemaEntry,
    def: Arc<TableDef>,
}

impl Table {
    fn new(session: Arc<Session>, entry: SchemaEntry) -> Self {
        let def = entry
            .sql
            .as_deref()
            .and_then(parse_create_table)
            .unwrap_or_else(|| {
                warn!(table = %entry.name, "table definition could not be parsed");
                TableDef {
                    name: entry.name.clone(),
                    ..Default::default()
                }
            });
        Table {
            session,
            entry,
            def: Arc::new(def),
        }
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }

    /// Original `CREATE TABLE` text
    pub fn sql(&self) -> Option<&str> {
        self.entry.sql.as_deref()
    }

    pub fn root_page(&self) -> Pgno {
        self.entry.root_page
    }

    /// Column definitions in declaration order
    pub fn columns(&self) -> &[Column] {
        &self.def.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.def.column_names()
    }

    /// Column that aliases the row id, if any
    pub fn rowid_alias(&self) -> Option<&str> {
        self.def.rowid_alias.map(|i| self.def.columns[i].name.as_str())
    }

    pub fn is_without_rowid(&self) -> bool {
        self.def.without_rowid
    }

    /// The schema-table entry this table was built from
    pub fn schema_entry(&self) -> &SchemaEntry {
        &self.entry
    }

    /// Lazily iterate the rows in row id order.
    ///
    /// Each call starts a new traversal.
    pub fn rows(&self) -> Result<Rows> {
        Ok(Rows {
            cursor: self.session.cursor(self.entry.root_page)?,
            session: self.session.clone(),
            table: self.entry.name.clone(),
            def: self.def.clone(),
            done: false,
        })
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.entry.name)
            .field("root_page", &self.entry.root_page)
            .field("columns", &self.def.column_names())
            .finish()
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Lazy iterator over the rows of one table
pub struct Rows {
    session: Arc<Session>,
    cursor: TableCursor,
    table: String,
    def: Arc<TableDef>,
    done: bool,
}

impl Rows {
    fn build_row(&self, row_id: RowId, payload: &[u8]) -> Result<Row> {
        let mut values = self.session.decode(row_id, payload)?;

        if let Some(alias) = self.def.rowid_alias {
            if let Some(value) = values.get_mut(alias) {
                if value.is_null() {
                    *value = Value::Integer(row_id);
                }
            }
        }

        let expected = self.def.columns.len();
        let partial = expected != 0 && values.len() != expected;
        if partial {
            let mismatch = Error::SchemaMismatch {
                table: self.table.clone(),
                row_id,
                expected,
                found: values.len(),
            };
            warn!(error = %mismatch, "decoded row does not match table schema");
        }

        Ok(Row {
            session: self.session.clone(),
            def: self.def.clone(),
            row_id,
            values,
            partial,
        })
    }
}

impl Iterator for Rows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(e) = self.session.check_open() {
            self.done = true;
            return Some(Err(e));
        }
        match self.cursor.next()? {
            Ok(cell) => Some(self.build_row(cell.row_id, &cell.payload)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for Rows {}

// ============================================================================
// Row
// ============================================================================

/// One decoded table row
pub struct Row {
    session: Arc<Session>,
    def: Arc<TableDef>,
    row_id: RowId,
    values: Vec<Value>,
    partial: bool,
}

impl Row {
    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    /// Whether the record's column count differed from the schema
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Number of decoded values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of column `name`; `None` for unknown or absent columns
    pub fn get(&self, name: &str) -> Result<Option<&Value>> {
        self.session.check_open()?;
        Ok(self
            .def
            .find_column(name)
            .and_then(|idx| self.values.get(idx)))
    }

    /// Value at position `index`, including values beyond the schema
    pub fn value(&self, index: usize) -> Result<Option<&Value>> {
        self.session.check_open()?;
        Ok(self.values.get(index))
    }

    /// All decoded values in record order
    pub fn values(&self) -> Result<&[Value]> {
        self.session.check_open()?;
        Ok(&self.values)
    }

    /// Column names of the owning table
    pub fn column_names(&self) -> Vec<String> {
        self.def.column_names()
    }
}

impl std::fmt::Debug for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Row")
            .field("row_id", &self.row_id)
            .field("values", &self.values)
            .field("partial", &self.partial)
            .finish()
    }
}
