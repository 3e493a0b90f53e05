use std::path::Path;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::store::{is_identifier, Filter, Row, TableStore};

/// Local mirror of the hosted tables, used for offline runs and tests.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS burc_pipeline_detail (
    id INTEGER PRIMARY KEY,
    fiscal_year INTEGER NOT NULL,
    name TEXT NOT NULL,
    client TEXT,
    section TEXT NOT NULL,
    forecast_category TEXT,
    amount REAL NOT NULL,
    probability REAL NOT NULL,
    weighted_amount REAL NOT NULL,
    reference TEXT,
    close_date TEXT,
    source_file TEXT,
    source_sheet TEXT NOT NULL,
    source_row INTEGER,
    synced_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS burc_attrition (
    id INTEGER PRIMARY KEY,
    fiscal_year INTEGER NOT NULL,
    name TEXT NOT NULL,
    client TEXT,
    section TEXT NOT NULL,
    forecast_category TEXT,
    amount REAL NOT NULL,
    probability REAL NOT NULL,
    weighted_amount REAL NOT NULL,
    reference TEXT,
    close_date TEXT,
    source_file TEXT,
    source_sheet TEXT NOT NULL,
    source_row INTEGER,
    synced_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS sales_pipeline_opportunities (
    id TEXT PRIMARY KEY,
    opportunity_name TEXT NOT NULL,
    account_name TEXT,
    total_acv REAL,
    fiscal_year INTEGER
);

CREATE TABLE IF NOT EXISTS burc_pipeline_matches (
    id INTEGER PRIMARY KEY,
    fiscal_year INTEGER NOT NULL,
    name TEXT NOT NULL,
    reference TEXT,
    matched_id TEXT,
    matched_name TEXT,
    confidence TEXT,
    score REAL
);

CREATE TABLE IF NOT EXISTS burc_csi_opex (
    id INTEGER PRIMARY KEY,
    year INTEGER NOT NULL,
    month_num INTEGER NOT NULL,
    month TEXT NOT NULL,
    license_nr REAL,
    ps_nr REAL,
    maintenance_nr REAL,
    total_nr REAL,
    ps_opex REAL,
    maintenance_opex REAL,
    sm_opex REAL,
    rd_opex REAL,
    ga_opex REAL,
    total_opex REAL,
    ebita REAL,
    ebita_percent REAL,
    source_file TEXT
);

CREATE TABLE IF NOT EXISTS burc_csi_ratios (
    id INTEGER PRIMARY KEY,
    year INTEGER NOT NULL,
    month_num INTEGER NOT NULL,
    ps_ratio REAL,
    sales_ratio REAL,
    maintenance_ratio REAL,
    rd_ratio REAL,
    ga_ratio REAL,
    ps_status TEXT,
    sales_status TEXT,
    maintenance_status TEXT,
    rd_status TEXT,
    ga_status TEXT
);

CREATE TABLE IF NOT EXISTS sync_audit_log (
    id INTEGER PRIMARY KEY,
    source TEXT NOT NULL,
    scope TEXT NOT NULL,
    records INTEGER,
    deleted INTEGER,
    inserted INTEGER,
    failed_batches INTEGER,
    dry_run INTEGER DEFAULT 0,
    ran_at TEXT
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = get_connection(db_path)?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn check_identifier(name: &str) -> Result<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(SyncError::Store(format!("invalid identifier: {name:?}")))
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::from(b.to_vec()),
    }
}

fn where_clause(filters: &[Filter]) -> Result<(String, Vec<SqlValue>)> {
    if filters.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let mut parts = Vec::new();
    let mut params = Vec::new();
    for (i, f) in filters.iter().enumerate() {
        check_identifier(&f.column)?;
        parts.push(format!("{} = ?{}", f.column, i + 1));
        params.push(to_sql(&f.value));
    }
    Ok((format!(" WHERE {}", parts.join(" AND ")), params))
}

impl TableStore for SqliteStore {
    fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>> {
        check_identifier(table)?;
        let (clause, params) = where_clause(filters)?;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {table}{clause} ORDER BY rowid"))?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |row| {
                let mut map = Row::new();
                for (i, name) in names.iter().enumerate() {
                    map.insert(name.clone(), from_sql(row.get_ref(i)?));
                }
                Ok(map)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert(&self, table: &str, rows: &[Row]) -> Result<usize> {
        check_identifier(table)?;
        let tx = self.conn.unchecked_transaction()?;
        for row in rows {
            for column in row.keys() {
                check_identifier(column)?;
            }
            let columns: Vec<&str> = row.keys().map(String::as_str).collect();
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            );
            tx.execute(&sql, rusqlite::params_from_iter(row.values().map(to_sql)))?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        check_identifier(table)?;
        if filters.is_empty() {
            return Err(SyncError::Store(format!("refusing unscoped delete on {table}")));
        }
        let (clause, params) = where_clause(filters)?;
        let n = self
            .conn
            .execute(&format!("DELETE FROM {table}{clause}"), rusqlite::params_from_iter(params))?;
        Ok(n)
    }
}
