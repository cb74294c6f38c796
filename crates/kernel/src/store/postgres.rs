//! PostgreSQL document store.
//!
//! Documents live as JSONB rows in a single `document` table keyed by
//! `(collection, id)`. Leading match stages are pushed down to SQL as a
//! coarse pre-filter; the full pipeline then runs through the in-process
//! evaluator, so pushdown only ever needs to return a superset.

use anyhow::Context;
use async_trait::async_trait;
use sea_query::{Alias, Cond, Expr, ExprTrait, Order, PostgresQueryBuilder, Query, SimpleExpr};
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

use super::pipeline::{self, Collections, Condition, MatchValue, Stage};
use super::{DocumentStore, StoreError, StoreResult};
use crate::record::{Document, ID_FIELD, document_id};

const DOCUMENT_TABLE: &str = "document";

/// Document store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing tables if they do not exist.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document (
                collection TEXT NOT NULL,
                id UUID NOT NULL,
                body JSONB NOT NULL,
                seq BIGSERIAL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create document table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS document_collection_seq ON document (collection, seq)",
        )
        .execute(&self.pool)
        .await
        .context("failed to create document index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_counter (
                key TEXT PRIMARY KEY,
                value BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create document_counter table")?;

        Ok(())
    }

    async fn fetch_collection(&self, sql: &str) -> StoreResult<Vec<Value>> {
        let rows: Vec<Value> = sqlx::query_scalar(sql).fetch_all(&self.pool).await?;
        Ok(rows)
    }
}

/// Build the SELECT that feeds a pipeline.
///
/// Only the leading run of match stages is considered for pushdown.
fn build_select(collection: &str, stages: &[Stage]) -> String {
    let mut query = Query::select();
    query
        .column(Alias::new("body"))
        .from(Alias::new(DOCUMENT_TABLE))
        .and_where(Expr::col(Alias::new("collection")).eq(collection));

    for stage in stages {
        let Stage::Match(condition) = stage else {
            break;
        };
        if let Some(expr) = pushdown(condition) {
            query.and_where(expr);
        }
    }

    query.order_by(Alias::new("seq"), Order::Asc);
    query.to_string(PostgresQueryBuilder)
}

/// Translate a condition into a SQL pre-filter.
///
/// Returns `None` when the condition cannot be expressed without risking
/// dropping documents the evaluator would keep.
fn pushdown(condition: &Condition) -> Option<SimpleExpr> {
    match condition {
        Condition::Eq { field, value } if field == ID_FIELD => match value {
            MatchValue::Id(id) => Some(Expr::col(Alias::new("id")).eq(*id)),
            _ => None,
        },
        Condition::Eq { field, value } if !field.contains('.') => match value {
            MatchValue::Bool(_) | MatchValue::String(_) => {
                let scalar = contains(json!({ field: value.to_json() }));
                let listed = contains(json!({ field: [value.to_json()] }));
                Some(Cond::any().add(scalar).add(listed).into())
            }
            _ => None,
        },
        Condition::In { field, values } if field == ID_FIELD => {
            let ids: Option<Vec<Uuid>> = values
                .iter()
                .map(|v| match v {
                    MatchValue::Id(id) => Some(*id),
                    _ => None,
                })
                .collect();
            ids.map(|ids| Expr::col(Alias::new("id")).is_in(ids))
        }
        Condition::And(conditions) => {
            let parts: Vec<SimpleExpr> = conditions.iter().filter_map(pushdown).collect();
            if parts.is_empty() {
                return None;
            }
            let mut cond = Cond::all();
            for part in parts {
                cond = cond.add(part);
            }
            Some(cond.into())
        }
        Condition::Or(conditions) => {
            let mut cond = Cond::any();
            for child in conditions {
                cond = cond.add(pushdown(child)?);
            }
            Some(cond.into())
        }
        _ => None,
    }
}

fn contains(fragment: Value) -> SimpleExpr {
    Expr::cust_with_values("body @> $1::jsonb", [fragment.to_string()])
}

fn select_collection(name: &str) -> String {
    Query::select()
        .column(Alias::new("body"))
        .from(Alias::new(DOCUMENT_TABLE))
        .and_where(Expr::col(Alias::new("collection")).eq(name))
        .order_by(Alias::new("seq"), Order::Asc)
        .to_string(PostgresQueryBuilder)
}

fn into_document(value: Value) -> StoreResult<Document> {
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert(&self, collection: &str, doc: Document) -> StoreResult<Document> {
        let id = document_id(&doc).ok_or(StoreError::MissingId)?;

        sqlx::query("INSERT INTO document (collection, id, body) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(id)
            .bind(Value::Object(doc.clone()))
            .execute(&self.pool)
            .await?;

        Ok(doc)
    }

    async fn find_by_id(&self, collection: &str, id: Uuid) -> StoreResult<Option<Document>> {
        let body: Option<Value> =
            sqlx::query_scalar("SELECT body FROM document WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        body.map(into_document).transpose()
    }

    async fn replace(&self, collection: &str, id: Uuid, doc: Document) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE document SET body = $3 WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .bind(Value::Object(doc))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, collection: &str, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM document WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn aggregate(&self, collection: &str, stages: &[Stage]) -> StoreResult<Vec<Value>> {
        let input = self.fetch_collection(&build_select(collection, stages)).await?;

        let mut joined = Collections::new();
        for name in pipeline::lookup_targets(stages) {
            let docs = self.fetch_collection(&select_collection(&name)).await?;
            joined.insert(name, docs);
        }

        pipeline::evaluate(input, stages, &joined)
    }

    async fn increment_counter(&self, key: &str) -> StoreResult<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO document_counter (key, value) VALUES ($1, 1)
            ON CONFLICT (key) DO UPDATE SET value = document_counter.value + 1
            RETURNING value
            "#,
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }
}
