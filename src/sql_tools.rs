//! # SQL tool server
//!
//! Exposes a SQLite database to agents as three ordinary tools:
//!
//! - `get_schema`: every table with its columns, `{"schema": {table: [{column, type}]}}`
//! - `health_check`: whether the database answers
//! - `query`: runs the given SQL and returns the rows as a list of objects
//!
//! Statements are passed through as-is. A failing statement comes back as a
//! tool error carrying the database's message, so the agent can see it and
//! try again.
//!
//! ```rust,no_run
//! use agent_relay::gateway::ToolRouter;
//! use agent_relay::sql_tools::SqlToolServer;
//!
//! # async fn demo() -> agent_relay::error::Result<()> {
//! let server = SqlToolServer::connect("sqlite::memory:").await?;
//! let router = ToolRouter::builder().tools(server.tools()).max_concurrency(1).build();
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::error::{AgentsError, Result};
use crate::tool::{FunctionTool, Tool};

#[derive(Debug, Deserialize, JsonSchema)]
struct NoArgs {}

/// Arguments of the `query` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryArgs {
    /// SQL statement to execute
    pub sql: String,
}

/// One column as reported by `get_schema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub column: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

#[derive(Debug, Clone)]
pub struct SqlToolServer {
    pool: SqlitePool,
}

impl SqlToolServer {
    /// Opens a pool for `database_url`. In-memory databases get a single
    /// connection that is never recycled, so every tool call sees the same data.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");
        let mut options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            options = options.idle_timeout(None).max_lifetime(None);
        }
        let pool = options.connect(database_url).await?;
        info!(url = %database_url, "SQL tool server connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Tables and their columns, keyed by table name.
    pub async fn get_schema(&self) -> Result<BTreeMap<String, Vec<ColumnInfo>>> {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut schema = BTreeMap::new();
        for table in tables {
            let rows = sqlx::query("SELECT name, type FROM pragma_table_info(?) ORDER BY cid")
                .bind(&table)
                .fetch_all(&self.pool)
                .await?;
            let columns = rows
                .iter()
                .map(|row| -> std::result::Result<ColumnInfo, sqlx::Error> {
                    Ok(ColumnInfo {
                        column: row.try_get("name")?,
                        data_type: row.try_get("type")?,
                    })
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            schema.insert(table, columns);
        }
        Ok(schema)
    }

    pub async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                false
            }
        }
    }

    /// Runs `sql` and returns its rows as JSON objects.
    pub async fn query(&self, sql: &str) -> Result<Vec<Value>> {
        debug!(sql = %sql, "Running query");
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AgentsError::ToolExecutionError {
                message: e.to_string(),
            })?;
        rows.iter().map(row_to_json).collect()
    }

    /// The three tools, ready for a [`crate::gateway::ToolRouter`].
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        let schema_server = self.clone();
        let health_server = self.clone();
        let query_server = self.clone();
        vec![
            Arc::new(FunctionTool::typed(
                "get_schema",
                "Returns the tables and columns of the database",
                move |_: NoArgs| {
                    let server = schema_server.clone();
                    async move { Ok::<_, AgentsError>(json!({ "schema": server.get_schema().await? })) }
                },
            )),
            Arc::new(FunctionTool::typed(
                "health_check",
                "Whether the database connection works",
                move |_: NoArgs| {
                    let server = health_server.clone();
                    async move { Ok::<_, AgentsError>(server.health_check().await) }
                },
            )),
            Arc::new(FunctionTool::typed(
                "query",
                "Runs a query against the database",
                move |args: QueryArgs| {
                    let server = query_server.clone();
                    async move { server.query(&args.sql).await }
                },
            )),
        ]
    }
}

fn row_to_json(row: &SqliteRow) -> Result<Value> {
    let mut object = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_string(), cell_to_json(row, idx)?);
    }
    Ok(Value::Object(object))
}

/// Decodes by the stored value's type, not the declared column type.
fn cell_to_json(row: &SqliteRow, idx: usize) -> Result<Value> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();
    let value = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => json!(row.try_get::<i64, _>(idx)?),
        "REAL" => json!(row.try_get::<f64, _>(idx)?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(idx)?;
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Value::String(row.try_get::<String, _>(idx)?),
    };
    Ok(value)
}
