use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use sqlx::{
    error::ErrorKind,
    mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow},
    query::Query,
    types::BigDecimal,
    Column, Connection, Either, Executor, Row as _, TypeInfo, ValueRef,
};

use crate::{
    config::Config,
    db::{Driver, DriverConnection, QueryResult, Row, Value},
    error::DriverError,
};

/// MySQL error number for a statement the server could not parse
const ER_PARSE_ERROR: u16 = 1064;

/// MySQL driver backed by `sqlx`
///
/// Every pooled connection is a dedicated `MySqlConnection`; pooling itself is
/// left to [`crate::QueryExecutor`].
#[derive(Clone)]
pub struct MySqlDriver {
    options: MySqlConnectOptions,
}

impl MySqlDriver {
    pub fn new(options: MySqlConnectOptions) -> Self {
        Self { options }
    }

    /// Builds connect options from host, port, credentials and schema name
    pub fn from_config(config: &Config) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        Self::new(options)
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    async fn connect(&self) -> Result<Box<dyn DriverConnection>, DriverError> {
        let conn = MySqlConnection::connect_with(&self.options).await?;
        Ok(Box::new(MySqlSession { conn }))
    }

    fn name(&self) -> &'static str {
        "mysql"
    }
}

struct MySqlSession {
    conn: MySqlConnection,
}

#[async_trait]
impl DriverConnection for MySqlSession {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, DriverError> {
        let query = params
            .iter()
            .fold(sqlx::query(sql), |query, param| bind_value(query, param));

        let mut result = QueryResult::default();
        let mut stream = self.conn.fetch_many(query);

        // Each statement ends with its OK packet; rows arrive before it
        while let Some(step) = stream.try_next().await? {
            match step {
                Either::Left(done) => {
                    result.rows_affected += done.rows_affected();
                    if done.last_insert_id() > 0 {
                        result.last_insert_id = Some(done.last_insert_id());
                    }
                }
                Either::Right(row) => result.rows.push(decode_row(&row)?),
            }
        }

        Ok(result)
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.conn.close().await.map_err(DriverError::from)
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::UInt(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(v) | Value::Decimal(v) => query.bind(v.clone()),
        Value::Bytes(v) => query.bind(v.clone()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::DateTime(v) => query.bind(*v),
    }
}

fn decode_row(row: &MySqlRow) -> Result<Row, DriverError> {
    let mut out = Row::with_capacity(row.len());
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name())?;
        out.push(column.name(), value);
    }
    Ok(out)
}

/// Decodes by MySQL type name, falling back to text and then raw bytes
fn decode_column(row: &MySqlRow, index: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let typed = match type_name {
        "BOOLEAN" => row.try_get::<bool, _>(index).map(Value::Bool).ok(),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<i64, _>(index).map(Value::Int).ok()
        }
        name if name.ends_with(" UNSIGNED") => {
            row.try_get::<u64, _>(index).map(Value::UInt).ok()
        }
        "FLOAT" => row
            .try_get::<f32, _>(index)
            .map(|v| Value::Float(f64::from(v)))
            .ok(),
        "DOUBLE" => row.try_get::<f64, _>(index).map(Value::Float).ok(),
        "DECIMAL" => row
            .try_get::<BigDecimal, _>(index)
            .map(|v| Value::Decimal(v.to_string()))
            .ok(),
        "DATE" => row.try_get::<NaiveDate, _>(index).map(Value::Date).ok(),
        "TIME" => row.try_get::<NaiveTime, _>(index).map(Value::Time).ok(),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(index)
            .map(Value::DateTime)
            .ok(),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" | "BIT" => {
            row.try_get::<Vec<u8>, _>(index).map(Value::Bytes).ok()
        }
        _ => None,
    };

    if let Some(value) = typed {
        return Ok(value);
    }

    match row.try_get::<String, _>(index) {
        Ok(text) => Ok(Value::Text(text)),
        Err(_) => row.try_get_unchecked::<Vec<u8>, _>(index).map(Value::Bytes),
    }
}

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        let message = err.to_string();
        match &err {
            sqlx::Error::Database(db) => {
                let is_parse_error = db
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .is_some_and(|e| e.number() == ER_PARSE_ERROR);

                if is_parse_error {
                    return DriverError::syntax(message);
                }

                match db.kind() {
                    ErrorKind::UniqueViolation
                    | ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation => DriverError::constraint(message),
                    _ => DriverError::query(message),
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::WorkerCrashed => DriverError::connection(message),
            _ => DriverError::query(message),
        }
    }
}
