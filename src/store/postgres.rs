//! Postgres adapter: every collection shares one `documents` table with a
//! JSONB body. Ordering and range filters work on the text form of a field,
//! compared with the "C" collation so timestamp strings sort chronologically.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::{Collection, Direction, Document, Filter, Query, RecordStore, StoreError, Write};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Text form of a JSON value as produced by Postgres' `->>` operator.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_field_text<'a>(qb: &mut QueryBuilder<'a, Postgres>, field: &str) {
    qb.push("(fields->>");
    qb.push_bind(field.to_string());
    qb.push(r#") COLLATE "C""#);
}

fn push_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, filters: &[Filter]) {
    for filter in filters {
        qb.push(" AND ");
        push_field_text(qb, &filter.field);
        qb.push(" ");
        qb.push(filter.op.as_sql());
        qb.push(" ");
        qb.push_bind(as_text(&filter.value));
    }
}

type DocumentRow = (String, Json<Map<String, Value>>);

/// Keyset-paginated select. Rows continue strictly after the cursor's
/// `(order value, id)` pair and are ordered by that same pair, so pages
/// neither overlap nor skip rows that tie on the order value.
fn select_query(
    collection: Collection,
    query: &Query,
) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    let position = query
        .start_after
        .as_ref()
        .map(|c| c.position())
        .transpose()?;

    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT id, fields FROM documents WHERE collection = ",
    );
    qb.push_bind(collection.as_str());
    qb.push(" AND jsonb_exists(fields, ");
    qb.push_bind(query.order_by.clone());
    qb.push(") AND fields->");
    qb.push_bind(query.order_by.clone());
    qb.push(" <> 'null'::jsonb");
    push_filters(&mut qb, &query.filters);

    let (cmp, dir) = match query.direction {
        Direction::Asc => (">", "ASC"),
        Direction::Desc => ("<", "DESC"),
    };

    if let Some(position) = position {
        qb.push(" AND (");
        push_field_text(&mut qb, &query.order_by);
        qb.push(r#", id COLLATE "C") "#);
        qb.push(cmp);
        qb.push(" (");
        qb.push_bind(as_text(&position.value));
        qb.push(r#" COLLATE "C", "#);
        qb.push_bind(position.id);
        qb.push(r#" COLLATE "C")"#);
    }

    qb.push(" ORDER BY ");
    push_field_text(&mut qb, &query.order_by);
    qb.push(" ");
    qb.push(dir);
    qb.push(r#", id COLLATE "C" "#);
    qb.push(dir);

    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(limit as i64);
    }

    Ok(qb)
}

#[async_trait]
impl RecordStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn create(&self, collection: Collection, write: Write) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let fields = write.resolve(Utc::now());

        sqlx::query("INSERT INTO documents (collection, id, fields) VALUES ($1, $2, $3)")
            .bind(collection.as_str())
            .bind(&id)
            .bind(Json(fields))
            .execute(&self.pool)
            .await?;

        Ok(id)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        write: Write,
    ) -> Result<(), StoreError> {
        let fields = write.resolve(Utc::now());

        let result = sqlx::query(
            "UPDATE documents SET fields = fields || $3 WHERE collection = $1 AND id = $2",
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(Json(fields))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, fields FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, Json(fields))| Document { id, fields }))
    }

    async fn query(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let mut qb = select_query(collection, query)?;
        let rows: Vec<DocumentRow> = qb.build_query_as().fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(id, Json(fields))| Document { id, fields })
            .collect())
    }

    async fn count(&self, collection: Collection, filters: &[Filter]) -> Result<u64, StoreError> {
        let mut qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM documents WHERE collection = ");
        qb.push_bind(collection.as_str());
        push_filters(&mut qb, filters);

        let (count,): (i64,) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn health_check(&self) -> Result<Duration, StoreError> {
        let start = Instant::now();
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Cursor;
    use serde_json::json;

    #[test]
    fn test_as_text_matches_postgres_arrow_operator() {
        assert_eq!(as_text(&json!("2024-01-01")), "2024-01-01");
        assert_eq!(as_text(&json!(true)), "true");
        assert_eq!(as_text(&json!(42)), "42");
    }

    #[test]
    fn test_query_sql_shape() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE true");
        push_filters(
            &mut qb,
            &[Filter::gte("timestamp", "a"), Filter::lt("timestamp", "b")],
        );
        let sql = qb.sql();
        assert!(sql.contains(r#"(fields->>$1) COLLATE "C" >= $2"#));
        assert!(sql.contains(r#"(fields->>$3) COLLATE "C" < $4"#));
    }

    #[test]
    fn test_keyset_continues_after_cursor_with_id_tie_break() {
        let mut fields = Map::new();
        fields.insert("createdAt".to_string(), json!("2024-05-01T09:00:00.000000Z"));
        let last = Document {
            id: "doc-7".to_string(),
            fields,
        };
        let query = Query::ordered("createdAt", Direction::Desc)
            .limit(5)
            .start_after(Some(Cursor::after(&last, "createdAt")));

        let qb = select_query(Collection::Notices, &query).unwrap();
        let sql = qb.sql();
        assert!(sql.contains(
            r#" AND ((fields->>$4) COLLATE "C", id COLLATE "C") < ($5 COLLATE "C", $6 COLLATE "C")"#
        ));
        assert!(sql.contains(r#" ORDER BY (fields->>$7) COLLATE "C" DESC, id COLLATE "C" DESC"#));
        assert!(sql.ends_with(" LIMIT $8"));
    }

    #[test]
    fn test_ascending_first_page_has_no_keyset_clause() {
        let query = Query::ordered("startDate", Direction::Asc);
        let qb = select_query(Collection::Schedules, &query).unwrap();
        let sql = qb.sql();
        assert!(!sql.contains(r#"id COLLATE "C") >"#));
        assert!(sql.ends_with(r#" ORDER BY (fields->>$4) COLLATE "C" ASC, id COLLATE "C" ASC"#));
    }
}
