//! PostgreSQL driver.
//!
//! Implements the driver contract over the blocking `postgres` client.
//! A single statement is prepared so column metadata is available even for
//! empty results. Columns whose types have a binary decoder are fetched in
//! binary and decoded by type name. Any other column type sends the
//! statement through the text protocol, where each value is parsed using its
//! prepared type. Text holding several statements runs through the text
//! protocol as well, and the last statement's result is kept.

use crate::config::ConnectionConfig;
use crate::core::db::driver::{Column, Driver, DriverConnection, ResultSet};
use crate::core::db::value::Value;
use crate::core::{ConnectorError, Result};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use pg_bigdecimal::PgNumeric;
use postgres::row::SimpleQueryRow;
use postgres::types::{FromSql, Type};
use postgres::{Client, NoTls, Row, SimpleQueryMessage};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const APPLICATION_NAME: &str = "sqlconnector";

/// Column types fetched in binary and decoded by `decode_value`.
const BINARY_TYPES: &[&str] = &[
    "bool", "int2", "int4", "int8", "oid", "float4", "float8", "numeric", "char", "text", "varchar",
    "bpchar", "name", "citext", "unknown", "bytea", "json", "jsonb", "uuid", "date", "time",
    "timestamp", "timestamptz", "_bool", "_int2", "_int4", "_int8", "_float4", "_float8",
    "_numeric", "_text", "_varchar", "_bpchar",
];

/// Driver for PostgreSQL servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    /// Translate a connection config into client parameters.
    ///
    /// Absent fields are left unset so libpq-style defaults apply.
    pub fn client_config(config: &ConnectionConfig) -> Result<postgres::Config> {
        let mut pg = postgres::Config::new();
        if let Some(database) = &config.database {
            pg.dbname(database);
        }
        if let Some(user) = &config.user {
            pg.user(user);
        }
        if let Some(password) = &config.password {
            pg.password(password);
        }
        if let Some(host) = &config.host {
            pg.host(host);
        }
        if let Some(port) = &config.port {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| ConnectorError::Connection(format!("Invalid port '{}'", port)))?;
            pg.port(port);
        }
        if let Some(secs) = config.connect_timeout_secs {
            pg.connect_timeout(Duration::from_secs(secs));
        }
        pg.application_name(APPLICATION_NAME);
        Ok(pg)
    }
}

impl Driver for PostgresDriver {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DriverConnection>> {
        let client = Self::client_config(config)?
            .connect(NoTls)
            .map_err(|e| ConnectorError::Connection(format!("Failed to connect to PostgreSQL: {}", e)))?;

        Ok(Box::new(PostgresConnection {
            client,
            in_transaction: false,
        }))
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

/// A live PostgreSQL connection.
pub struct PostgresConnection {
    client: Client,
    in_transaction: bool,
}

impl PostgresConnection {
    fn begin_if_idle(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.client
                .batch_execute("BEGIN")
                .map_err(|e| ConnectorError::Execution(format!("Failed to begin transaction: {}", e)))?;
            self.in_transaction = true;
        }
        Ok(())
    }

    /// Run `sql` through the simple query protocol and keep the result of
    /// its last statement.
    ///
    /// With `columns` from a prepared statement, values are parsed by their
    /// column type. Without them every value stays text.
    fn query_text(&mut self, sql: &str, columns: Option<Vec<Column>>) -> Result<ResultSet> {
        let messages = self
            .client
            .simple_query(sql)
            .map_err(|e| ConnectorError::Execution(e.to_string()))?;

        let mut result = ResultSet::default();
        let mut described: Option<Vec<Column>> = None;
        let mut rows = Vec::new();
        for message in messages {
            match message {
                SimpleQueryMessage::RowDescription(fields) => {
                    described = Some(match &columns {
                        Some(typed) => typed.clone(),
                        None => fields.iter().map(|f| Column::new(f.name())).collect(),
                    });
                }
                SimpleQueryMessage::Row(row) => {
                    rows.push(decode_text_row(&row, described.as_deref().unwrap_or_default())?);
                }
                SimpleQueryMessage::CommandComplete(affected) => {
                    result = match described.take() {
                        Some(columns) => ResultSet::rows(columns, std::mem::take(&mut rows)),
                        None => ResultSet::affected(affected),
                    };
                }
                _ => {}
            }
        }
        Ok(result)
    }
}

impl DriverConnection for PostgresConnection {
    fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        self.begin_if_idle()?;

        if statement_count(sql) > 1 {
            debug!("running multi-statement text through the simple query protocol");
            return self.query_text(sql, None);
        }

        let stmt = self
            .client
            .prepare(sql)
            .map_err(|e| ConnectorError::Execution(e.to_string()))?;

        if stmt.columns().is_empty() {
            let affected = self
                .client
                .execute(&stmt, &[])
                .map_err(|e| ConnectorError::Execution(e.to_string()))?;
            return Ok(ResultSet::affected(affected));
        }

        let columns: Vec<Column> = stmt
            .columns()
            .iter()
            .map(|c| Column::with_type(c.name(), c.type_().name()))
            .collect();

        if !stmt
            .columns()
            .iter()
            .all(|c| BINARY_TYPES.contains(&c.type_().name()))
        {
            return self.query_text(sql, Some(columns));
        }

        let rows = self
            .client
            .query(&stmt, &[])
            .map_err(|e| ConnectorError::Execution(e.to_string()))?;

        let rows = rows
            .iter()
            .map(decode_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ConnectorError::Execution(format!("Result processing failed: {}", e)))?;

        Ok(ResultSet::rows(columns, rows))
    }

    fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        // The server ends the transaction whether or not COMMIT succeeds.
        self.in_transaction = false;
        self.client
            .batch_execute("COMMIT")
            .map_err(|e| ConnectorError::Commit(e.to_string()))
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.client
            .batch_execute("ROLLBACK")
            .map_err(|e| ConnectorError::Transaction(format!("Rollback failed: {}", e)))
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.client
            .close()
            .map_err(|e| ConnectorError::Connection(format!("Failed to close connection: {}", e)))
    }
}

/// Number of non-empty statements in `sql`.
///
/// Text the tokenizer rejects counts as one statement and is left to the
/// server to judge.
pub fn statement_count(sql: &str) -> usize {
    let dialect = PostgreSqlDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).tokenize() {
        Ok(tokens) => tokens,
        Err(_) => return 1,
    };

    let mut count = 0;
    let mut pending = false;
    for token in tokens {
        match token {
            Token::SemiColon => {
                count += usize::from(pending);
                pending = false;
            }
            Token::Whitespace(_) | Token::EOF => {}
            _ => pending = true,
        }
    }
    count + usize::from(pending)
}

fn decode_row(row: &Row) -> std::result::Result<Vec<Value>, postgres::Error> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| decode_value(row, idx, column.type_()))
        .collect()
}

fn decode_value(row: &Row, idx: usize, ty: &Type) -> std::result::Result<Value, postgres::Error> {
    let value = match ty.name() {
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        "int2" => row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Int(v as i64)),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Int(v as i64)),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        "oid" => row.try_get::<_, Option<u32>>(idx)?.map(|v| Value::Int(v as i64)),
        "float4" => row.try_get::<_, Option<f32>>(idx)?.map(|v| Value::Float(v as f64)),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        "numeric" => row.try_get::<_, Option<PgNumeric>>(idx)?.map(numeric_value),
        "char" => row
            .try_get::<_, Option<i8>>(idx)?
            .map(|v| Value::Text(char::from(v as u8).to_string())),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Bytes),
        "json" | "jsonb" => row.try_get::<_, Option<serde_json::Value>>(idx)?.map(Value::Json),
        "uuid" => row.try_get::<_, Option<Uuid>>(idx)?.map(Value::Uuid),
        "date" => row.try_get::<_, Option<NaiveDate>>(idx)?.map(Value::Date),
        "time" => row.try_get::<_, Option<NaiveTime>>(idx)?.map(Value::Time),
        "timestamp" => row.try_get::<_, Option<NaiveDateTime>>(idx)?.map(Value::Timestamp),
        "timestamptz" => row.try_get::<_, Option<DateTime<Utc>>>(idx)?.map(Value::TimestampTz),
        "_bool" => decode_array(row, idx, Value::Bool)?,
        "_int2" => decode_array(row, idx, |v: i16| Value::Int(v.into()))?,
        "_int4" => decode_array(row, idx, |v: i32| Value::Int(v.into()))?,
        "_int8" => decode_array(row, idx, Value::Int)?,
        "_float4" => decode_array(row, idx, |v: f32| Value::Float(v.into()))?,
        "_float8" => decode_array(row, idx, Value::Float)?,
        "_numeric" => decode_array(row, idx, numeric_value)?,
        "_text" | "_varchar" | "_bpchar" => decode_array(row, idx, Value::Text)?,
        // text, varchar, bpchar, name, citext, unknown
        _ => row.try_get::<_, Option<String>>(idx)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Decode a one-dimensional array column.
fn decode_array<'a, T: FromSql<'a>>(
    row: &'a Row,
    idx: usize,
    wrap: impl Fn(T) -> Value,
) -> std::result::Result<Option<Value>, postgres::Error> {
    let items = row.try_get::<_, Option<Vec<Option<T>>>>(idx)?;
    Ok(items.map(|items| {
        Value::Array(
            items
                .into_iter()
                .map(|item| item.map_or(Value::Null, &wrap))
                .collect(),
        )
    }))
}

fn numeric_value(numeric: PgNumeric) -> Value {
    Value::Numeric(numeric.n.map_or_else(|| "NaN".to_string(), |n| n.to_string()))
}

fn decode_text_row(row: &SimpleQueryRow, columns: &[Column]) -> Result<Vec<Value>> {
    (0..row.len())
        .map(|idx| {
            let text = row
                .try_get(idx)
                .map_err(|e| ConnectorError::Execution(format!("Result processing failed: {}", e)))?;
            let type_name = columns
                .get(idx)
                .and_then(|c| c.type_name.as_deref())
                .unwrap_or("text");
            Ok(text.map_or(Value::Null, |text| decode_text(type_name, text)))
        })
        .collect()
}

/// Parse a value from its PostgreSQL text form.
///
/// Types without a parser here, or text a parser rejects, stay as
/// `Value::Text` exactly as the server printed them.
pub fn decode_text(type_name: &str, text: &str) -> Value {
    let parsed = match type_name {
        "bool" => match text {
            "t" => Some(Value::Bool(true)),
            "f" => Some(Value::Bool(false)),
            _ => None,
        },
        "int2" | "int4" | "int8" | "oid" => text.parse().ok().map(Value::Int),
        "float4" | "float8" => text.parse().ok().map(Value::Float),
        "numeric" => Some(Value::Numeric(text.to_string())),
        "json" | "jsonb" => serde_json::from_str(text).ok().map(Value::Json),
        "uuid" => Uuid::parse_str(text).ok().map(Value::Uuid),
        "date" => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(Value::Date),
        "time" => NaiveTime::parse_from_str(text, "%H:%M:%S%.f").ok().map(Value::Time),
        "timestamp" => NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(Value::Timestamp),
        "timestamptz" => DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
            .ok()
            .map(|ts| Value::TimestampTz(ts.with_timezone(&Utc))),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::Text(text.to_string()))
}
