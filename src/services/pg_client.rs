// PostgreSQL query client
// Wraps a sqlx pool and returns result rows as JSON objects keyed by column
// name, so collectors can decode into their record shapes with serde and
// tests can substitute a canned source behind the QuerySource trait.

use crate::utils::{StageError, StageResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Row, TypeInfo};

/// Read-only query seam used by every pipeline stage.
#[async_trait]
pub trait QuerySource: Send + Sync {
    /// Execute a query and return one JSON object per row, keyed by column
    /// name.
    async fn query(&self, sql: &str) -> StageResult<Vec<Value>>;
}

#[derive(Clone)]
pub struct PgClient {
    pool: PgPool,
}

impl PgClient {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Execute a query and return results as (column_names, rows)
    pub async fn query_raw(&self, sql: &str) -> StageResult<(Vec<String>, Vec<Vec<Value>>)> {
        let rows: Vec<PgRow> = sqlx::query(sql).fetch_all(&self.pool).await.map_err(|e| {
            tracing::debug!("Query execution failed: {}", e);
            StageError::query(e)
        })?;

        tracing::debug!("Query returned {} rows", rows.len());

        process_query_result(&rows)
    }
}

#[async_trait]
impl QuerySource for PgClient {
    async fn query(&self, sql: &str) -> StageResult<Vec<Value>> {
        let (column_names, rows) = self.query_raw(sql).await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let mut obj = Map::new();
            for (i, col_name) in column_names.iter().enumerate() {
                if let Some(value) = row.get(i) {
                    obj.insert(col_name.clone(), value.clone());
                }
            }
            result.push(Value::Object(obj));
        }

        Ok(result)
    }
}

fn process_query_result(rows: &[PgRow]) -> StageResult<(Vec<String>, Vec<Vec<Value>>)> {
    if rows.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let columns = rows[0].columns();
    let col_count = columns.len();

    let mut column_names = Vec::with_capacity(col_count);
    for col in columns {
        column_names.push(col.name().to_string());
    }

    let mut result_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let mut row_data = Vec::with_capacity(col_count);
        for col_idx in 0..col_count {
            row_data.push(column_to_value(row, col_idx)?);
        }
        result_rows.push(row_data);
    }

    Ok((column_names, result_rows))
}

/// Decode one column into a JSON value based on its PostgreSQL type name.
/// Unknown types fall back to their textual form.
fn column_to_value(row: &PgRow, idx: usize) -> StageResult<Value> {
    let type_name = row.columns()[idx].type_info().name().to_uppercase();

    let value = match type_name.as_str() {
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .map_err(StageError::row_decode)?
            .map(|v| Value::from(v as i64)),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .map_err(StageError::row_decode)?
            .map(|v| Value::from(v as i64)),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .map_err(StageError::row_decode)?
            .map(Value::from),
        "OID" => row
            .try_get::<Option<sqlx::postgres::types::Oid>, _>(idx)
            .map_err(StageError::row_decode)?
            .map(|v| Value::from(v.0 as i64)),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .map_err(StageError::row_decode)?
            .map(|v| Value::from(v as f64)),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .map_err(StageError::row_decode)?
            .map(Value::from),
        "NUMERIC" => row
            .try_get::<Option<sqlx::types::BigDecimal>, _>(idx)
            .map_err(StageError::row_decode)?
            .and_then(|v| v.to_string().parse::<f64>().ok())
            .map(Value::from),
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .map_err(StageError::row_decode)?
            .map(Value::from),
        "JSON" | "JSONB" => row
            .try_get::<Option<Value>, _>(idx)
            .map_err(StageError::row_decode)?,
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)
            .map_err(StageError::row_decode)?
            .map(|v| Value::from(v.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .map_err(StageError::row_decode)?
            .map(|v| Value::from(v.to_string())),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)
            .map_err(StageError::row_decode)?
            .map(|v| Value::from(v.to_string())),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .map_err(StageError::row_decode)?
            .map(Value::from),
    };

    Ok(value.unwrap_or(Value::Null))
}
