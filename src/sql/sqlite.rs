//! SQLite execution facility built on rusqlite (bundled).
//!
//! SQLite has no native geometry type, so points are stored as
//! `POINT(lat lon)` text and the bounding-box predicate is a registered
//! scalar function.

use std::time::Duration;

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value as NativeValue;
use rusqlite::{Connection, ErrorCode, params_from_iter};

use super::{BODY_COLUMN, Dialect, SqlDriver, SqlRows, SqlValue};
use crate::core::{BoundingBox, DbError, GeoPoint, Result};
use crate::schema::{Field, FieldSize, FieldType, ID_LENGTH};
use crate::storage::ConnectionConfig;

/// Scalar function testing whether a stored point lies in a box.
pub const POINT_IN_BOX_FN: &str = "docrel_point_in_box";

lazy_static! {
    static ref MISSING_TABLE: Regex = Regex::new(r"no such table: (?:\w+\.)?([\w$]+)").unwrap();
}

// ============================================================================
// Dialect
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn column_type(&self, field: &Field) -> String {
        match field.field_type() {
            FieldType::Integer | FieldType::Boolean => "INTEGER".to_string(),
            FieldType::Float => "REAL".to_string(),
            FieldType::String => match field.size() {
                Some(FieldSize::Fixed(n)) => format!("CHAR({})", n),
                Some(FieldSize::Range(_, max)) => format!("VARCHAR({})", max),
                None => "TEXT".to_string(),
            },
            FieldType::Point => "TEXT".to_string(),
            FieldType::List | FieldType::Map | FieldType::Object | FieldType::Default => String::new(),
        }
    }

    fn id_column_type(&self) -> String {
        format!("CHAR({})", ID_LENGTH)
    }

    fn document_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({} INTEGER PRIMARY KEY AUTOINCREMENT, {} {} NOT NULL UNIQUE, {} BLOB NOT NULL)",
            self.quote(table),
            self.quote(crate::core::ROWID_FIELD),
            self.quote(crate::core::ID_FIELD),
            self.id_column_type(),
            self.quote(BODY_COLUMN),
        )
    }

    fn list_tables_sql(&self) -> &'static str {
        "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name"
    }

    fn insert_ignore(&self) -> &'static str {
        "INSERT OR IGNORE"
    }

    fn limit_clause(&self, limit: Option<u64>, offset: u64) -> String {
        match (limit, offset) {
            (Some(limit), 0) => format!(" LIMIT {}", limit),
            (Some(limit), offset) => format!(" LIMIT {} OFFSET {}", limit, offset),
            (None, 0) => String::new(),
            (None, offset) => format!(" LIMIT -1 OFFSET {}", offset),
        }
    }

    fn spatial_value(&self, point: GeoPoint) -> SqlValue {
        SqlValue::Text(point.to_wkt())
    }

    fn spatial_predicate(&self, column: &str, bbox: &BoundingBox, params: &mut Vec<SqlValue>) -> String {
        params.extend([
            SqlValue::Real(bbox.min_lat),
            SqlValue::Real(bbox.min_lon),
            SqlValue::Real(bbox.max_lat),
            SqlValue::Real(bbox.max_lon),
        ]);
        format!("{}({}, ?, ?, ?, ?)", POINT_IN_BOX_FN, self.quote(column))
    }
}

// ============================================================================
// Driver
// ============================================================================

pub struct SqliteDriver {
    conn: Connection,
}

impl SqliteDriver {
    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(classify)?;
        Self::prepare(conn)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        conn.create_scalar_function(
            POINT_IN_BOX_FN,
            5,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let Some(stored) = ctx.get::<Option<String>>(0)? else {
                    return Ok(false);
                };
                let Some(point) = GeoPoint::from_wkt(&stored) else {
                    return Ok(false);
                };
                let bbox = BoundingBox {
                    min_lat: ctx.get::<f64>(1)?,
                    min_lon: ctx.get::<f64>(2)?,
                    max_lat: ctx.get::<f64>(3)?,
                    max_lon: ctx.get::<f64>(4)?,
                };
                Ok(bbox.contains(point))
            },
        )
        .map_err(classify)?;

        Ok(Self { conn })
    }

    /// Borrow the raw connection, for tooling and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl SqlDriver for SqliteDriver {
    type Dialect = SqliteDialect;

    fn open(config: &ConnectionConfig) -> Result<Self> {
        let conn = if config.database == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.database)
        }
        .map_err(|e| DbError::Connection(format!("{}: {}", config.database, e)))?;

        let busy_ms = match config.options.get("busy_timeout") {
            Some(raw) => raw
                .parse()
                .map_err(|_| DbError::InvalidArgument(format!("Invalid busy_timeout '{}'", raw)))?,
            None => 5000,
        };
        conn.busy_timeout(Duration::from_millis(busy_ms))
            .map_err(classify)?;

        debug!("Opened SQLite database '{}'", config.database);
        Self::prepare(conn)
    }

    fn dialect(&self) -> SqliteDialect {
        SqliteDialect
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(classify)?;
        stmt.execute(params_from_iter(params.iter().map(to_native)))
            .map_err(classify)
    }

    fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<SqlRows> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(classify)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = stmt
            .query(params_from_iter(params.iter().map(to_native)))
            .map_err(classify)?;
        let mut fetched = Vec::new();
        while let Some(row) = rows.next().map_err(classify)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                let value: NativeValue = row.get(i).map_err(classify)?;
                values.push(from_native(value));
            }
            fetched.push(values);
        }

        Ok(SqlRows { columns, rows: fetched })
    }

    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN").map_err(classify)
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT").map_err(classify)
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK").map_err(classify)
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn last_insert_id(&mut self) -> Result<i64> {
        Ok(self.conn.last_insert_rowid())
    }
}

fn to_native(value: &SqlValue) -> NativeValue {
    match value {
        SqlValue::Null => NativeValue::Null,
        SqlValue::Integer(i) => NativeValue::Integer(*i),
        SqlValue::Real(r) => NativeValue::Real(*r),
        SqlValue::Text(s) => NativeValue::Text(s.clone()),
        SqlValue::Blob(b) => NativeValue::Blob(b.clone()),
    }
}

fn from_native(value: NativeValue) -> SqlValue {
    match value {
        NativeValue::Null => SqlValue::Null,
        NativeValue::Integer(i) => SqlValue::Integer(i),
        NativeValue::Real(r) => SqlValue::Real(r),
        NativeValue::Text(s) => SqlValue::Text(s),
        NativeValue::Blob(b) => SqlValue::Blob(b),
    }
}

/// Map a rusqlite error to a `DbError`.
fn classify(err: rusqlite::Error) -> DbError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        let message = message.clone().unwrap_or_else(|| err.to_string());
        if let Some(caps) = MISSING_TABLE.captures(&message) {
            return DbError::TableNotFound(caps[1].to_string());
        }
        if failure.code == ErrorCode::ConstraintViolation
            && (message.contains("UNIQUE") || message.contains("PRIMARY KEY"))
        {
            return DbError::Duplicate(message);
        }
        return DbError::Backend(message);
    }
    DbError::Backend(err.to_string())
}
