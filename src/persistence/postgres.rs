//! PostgreSQL implementation of the persistence layer.
//!
//! Review tables differ per kind, so every review query is generated from
//! the kind's [`KindSchema`]. Column names come only from the static schema
//! tables, never from user input.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::models::{ListedRow, ReviewRow, TargetRecord, to_i64, to_u64};
use super::{
    ClaimedTask, ReviewStore, StatsCache, TargetStore, TaskQueue, UserStore, VoteStore,
    WebhookStore,
};
use crate::config::EngineConfig;
use crate::domain::review_kind::target_type_schema;
use crate::domain::{
    AbuseReport, KindSchema, ListedReview, ReviewEvent, ReviewKind, ReviewListQuery, ReviewRecord,
    ReviewSort, ReviewStatus, TargetRef, TargetStats, UserAccount, VoteChange, VoteKey, VoteTally,
    VoteType, WebhookId, WebhookRegistration,
};
use crate::error::ReviewError;

/// Opens a connection pool using the configured limits.
///
/// # Errors
///
/// Returns [`ReviewError::Persistence`] if the database cannot be reached.
pub async fn connect(config: &EngineConfig) -> Result<PgPool, ReviewError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(
            config.database_connect_timeout_secs,
        ))
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}

/// Runs the embedded migrations.
///
/// # Errors
///
/// Returns [`ReviewError::Persistence`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), ReviewError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| ReviewError::Persistence(e.to_string()))
}

/// PostgreSQL-backed persistence layer using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Creates a new persistence layer with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Column list aliasing the kind's columns to [`ReviewRow`] fields.
fn review_columns(schema: &KindSchema) -> String {
    let target_type = schema.target_type_field().unwrap_or("NULL::TEXT");
    let response = schema.response_field.unwrap_or("NULL::TEXT");
    format!(
        "id, {rating} AS rating, {status} AS status, {body} AS body, uid AS author_id, \
         {target} AS target_id, {target_type} AS target_type, tenant_id, \
         {response} AS owner_response, created",
        rating = schema.rating_field,
        status = schema.status_field,
        body = schema.body_field,
        target = schema.target_field,
    )
}

/// `SELECT` of [`ReviewRow`] columns from the kind's table.
fn review_select(schema: &KindSchema) -> String {
    format!("SELECT {} FROM {}", review_columns(schema), schema.table)
}

/// `SELECT` of [`ListedRow`] columns. Kinds without helpfulness columns
/// report zeros.
fn listed_select(schema: &KindSchema) -> String {
    let helpfulness = if schema.tracks_helpfulness {
        "helpful_count, not_helpful_count, wilson_score"
    } else {
        "0::BIGINT AS helpful_count, 0::BIGINT AS not_helpful_count, \
         0::DOUBLE PRECISION AS wilson_score"
    };
    format!(
        "SELECT {}, {helpfulness} FROM {}",
        review_columns(schema),
        schema.table
    )
}

/// Appends the `WHERE` clause of an approved-review listing.
fn push_list_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    schema: &KindSchema,
    query: &ReviewListQuery,
) {
    builder.push(format!(" WHERE {} = 'approved'", schema.status_field));
    if let Some(target) = &query.target {
        if schema
            .fixed_target_type()
            .is_some_and(|fixed| fixed != target.target_type)
        {
            builder.push(" AND FALSE");
        }
        builder
            .push(format!(" AND {} = ", schema.target_field))
            .push_bind(to_i64(target.target_id));
        if let Some(type_field) = schema.target_type_field() {
            builder
                .push(format!(" AND {type_field} = "))
                .push_bind(target.target_type.clone());
        }
    }
    if let Some(stars) = query.stars {
        builder
            .push(format!(" AND {} = ", schema.rating_field))
            .push_bind(i32::from(stars));
    }
}

/// `ORDER BY` clause of a listing; ties fall back to newest first.
fn list_order(schema: &KindSchema, sort: ReviewSort) -> String {
    match sort {
        ReviewSort::Helpful if schema.tracks_helpfulness => {
            "wilson_score DESC, helpful_count DESC, created DESC, id DESC".to_string()
        }
        ReviewSort::Helpful | ReviewSort::Newest => "created DESC, id DESC".to_string(),
        ReviewSort::Highest => format!(
            "{} DESC NULLS LAST, created DESC, id DESC",
            schema.rating_field
        ),
        ReviewSort::Lowest => format!(
            "{} ASC NULLS FIRST, created DESC, id DESC",
            schema.rating_field
        ),
        ReviewSort::Oldest => "created ASC, id ASC".to_string(),
    }
}

#[async_trait]
impl ReviewStore for PostgresPersistence {
    async fn load(&self, kind: ReviewKind, id: u64) -> Result<Option<ReviewRecord>, ReviewError> {
        let sql = format!("{} WHERE id = $1", review_select(kind.schema()));
        let row = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(to_i64(id))
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.into_record(kind)).transpose()
    }

    async fn update_status(
        &self,
        kind: ReviewKind,
        id: u64,
        status: ReviewStatus,
    ) -> Result<(), ReviewError> {
        let schema = kind.schema();
        let sql = format!(
            "UPDATE {} SET {} = $1 WHERE id = $2",
            schema.table, schema.status_field
        );
        let result = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(to_i64(id))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ReviewError::NotFound(format!("review {kind}/{id}")));
        }
        Ok(())
    }

    async fn approved_ratings(
        &self,
        kind: ReviewKind,
        target: &TargetRef,
    ) -> Result<Vec<i64>, ReviewError> {
        let schema = kind.schema();
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {} = 'approved' AND {} = $1",
            schema.rating_field, schema.table, schema.status_field, schema.target_field
        );
        if let Some(type_field) = schema.target_type_field() {
            sql.push_str(&format!(" AND {type_field} = $2"));
        }
        let mut query = sqlx::query_scalar::<_, Option<i32>>(&sql).bind(to_i64(target.target_id));
        if schema.is_polymorphic() {
            query = query.bind(&target.target_type);
        }
        let ratings = query.fetch_all(&self.pool).await?;
        Ok(ratings.into_iter().flatten().map(i64::from).collect())
    }

    async fn list_by_status(
        &self,
        kind: ReviewKind,
        status: ReviewStatus,
        tenant_id: Option<u64>,
        limit: usize,
    ) -> Result<Vec<ReviewRecord>, ReviewError> {
        let schema = kind.schema();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = if let Some(tenant) = tenant_id {
            let sql = format!(
                "{} WHERE {} = $1 AND tenant_id = $2 ORDER BY created ASC, id ASC LIMIT $3",
                review_select(schema),
                schema.status_field
            );
            sqlx::query_as::<_, ReviewRow>(&sql)
                .bind(status.as_str())
                .bind(to_i64(tenant))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        } else {
            let sql = format!(
                "{} WHERE {} = $1 ORDER BY created ASC, id ASC LIMIT $2",
                review_select(schema),
                schema.status_field
            );
            sqlx::query_as::<_, ReviewRow>(&sql)
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        };
        rows.into_iter().map(|r| r.into_record(kind)).collect()
    }

    async fn count_by_status(
        &self,
        kind: ReviewKind,
        status: ReviewStatus,
        tenant_id: Option<u64>,
    ) -> Result<u64, ReviewError> {
        let schema = kind.schema();
        let count = if let Some(tenant) = tenant_id {
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} = $1 AND tenant_id = $2",
                schema.table, schema.status_field
            );
            sqlx::query_scalar::<_, i64>(&sql)
                .bind(status.as_str())
                .bind(to_i64(tenant))
                .fetch_one(&self.pool)
                .await?
        } else {
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} = $1",
                schema.table, schema.status_field
            );
            sqlx::query_scalar::<_, i64>(&sql)
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?
        };
        Ok(to_u64(count))
    }

    async fn has_review_by_author(
        &self,
        kind: ReviewKind,
        author_id: u64,
        target_id: u64,
    ) -> Result<bool, ReviewError> {
        let schema = kind.schema();
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE uid = $1 AND {} = $2)",
            schema.table, schema.target_field
        );
        let exists = sqlx::query_scalar::<_, bool>(&sql)
            .bind(to_i64(author_id))
            .bind(to_i64(target_id))
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn set_owner_response(
        &self,
        kind: ReviewKind,
        id: u64,
        text: &str,
    ) -> Result<(), ReviewError> {
        let schema = kind.schema();
        let Some(field) = schema.response_field else {
            return Err(ReviewError::Validation(format!(
                "{kind} reviews do not accept responses"
            )));
        };
        let sql = format!("UPDATE {} SET {field} = $1 WHERE id = $2", schema.table);
        let result = sqlx::query(&sql)
            .bind(text)
            .bind(to_i64(id))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ReviewError::NotFound(format!("review {kind}/{id}")));
        }
        Ok(())
    }

    async fn write_helpfulness(
        &self,
        kind: ReviewKind,
        id: u64,
        tally: VoteTally,
        wilson_score: f64,
    ) -> Result<(), ReviewError> {
        let sql = format!(
            "UPDATE {} SET helpful_count = $1, not_helpful_count = $2, wilson_score = $3 WHERE id = $4",
            kind.schema().table
        );
        sqlx::query(&sql)
            .bind(to_i64(tally.helpful))
            .bind(to_i64(tally.not_helpful))
            .bind(wilson_score)
            .bind(to_i64(id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_approved(
        &self,
        kind: ReviewKind,
        query: &ReviewListQuery,
    ) -> Result<(Vec<ListedReview>, u64), ReviewError> {
        let schema = kind.schema();

        let mut count =
            QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM {}", schema.table));
        push_list_filters(&mut count, schema, query);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select = QueryBuilder::<Postgres>::new(listed_select(schema));
        push_list_filters(&mut select, schema, query);
        select
            .push(format!(" ORDER BY {}", list_order(schema, query.sort)))
            .push(" LIMIT ")
            .push_bind(to_i64(query.limit))
            .push(" OFFSET ")
            .push_bind(to_i64(query.offset()));
        let rows = select
            .build_query_as::<ListedRow>()
            .fetch_all(&self.pool)
            .await?;

        let page = rows
            .into_iter()
            .map(|row| row.into_listed(kind))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((page, to_u64(total)))
    }

    async fn record_report(&self, report: &AbuseReport) -> Result<bool, ReviewError> {
        let inserted = sqlx::query(
            "INSERT INTO review_abuse_report \
             (review_kind, review_id, reporter_id, reason, details, created) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (review_kind, review_id, reporter_id) DO NOTHING",
        )
        .bind(report.kind.as_str())
        .bind(to_i64(report.review_id))
        .bind(to_i64(report.reporter_id))
        .bind(report.reason.as_str())
        .bind(&report.details)
        .bind(report.created_at)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted > 0)
    }
}

#[async_trait]
impl TargetStore for PostgresPersistence {
    async fn load(&self, target: &TargetRef) -> Result<Option<TargetRecord>, ReviewError> {
        let Some(schema) = target_type_schema(&target.target_type) else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            schema.owner_field, schema.table
        );
        let owner = sqlx::query_scalar::<_, Option<i64>>(&sql)
            .bind(to_i64(target.target_id))
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner.map(|owner_id| TargetRecord {
            target: target.clone(),
            owner_id: owner_id.map(to_u64),
            supports_rating_denormalization: schema.supports_rating_denormalization,
        }))
    }

    async fn write_rating_summary(
        &self,
        target: &TargetRef,
        average: f64,
        total: u64,
    ) -> Result<(), ReviewError> {
        let schema = target_type_schema(&target.target_type)
            .filter(|s| s.supports_rating_denormalization)
            .ok_or_else(|| {
                ReviewError::Validation(format!("{} has no rating columns", target.target_type))
            })?;
        let sql = format!(
            "UPDATE {} SET average_rating = $1, total_reviews = $2 WHERE id = $3",
            schema.table
        );
        sqlx::query(&sql)
            .bind(average)
            .bind(to_i64(total))
            .bind(to_i64(target.target_id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Insert-or-lock rounds before a contended vote gives up.
const VOTE_ATTEMPTS: usize = 3;

#[async_trait]
impl VoteStore for PostgresPersistence {
    async fn apply_vote(&self, key: VoteKey, vote: VoteType) -> Result<VoteChange, ReviewError> {
        let mut tx = self.pool.begin().await?;

        // A concurrent retraction can delete the row between the insert and
        // the locking read; the insert is retried in that case.
        for _ in 0..VOTE_ATTEMPTS {
            let inserted = sqlx::query(
                "INSERT INTO review_helpful_vote (review_kind, review_id, user_id, vote_type) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (review_kind, review_id, user_id) DO NOTHING",
            )
            .bind(key.kind.as_str())
            .bind(to_i64(key.review_id))
            .bind(to_i64(key.user_id))
            .bind(vote.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if inserted > 0 {
                tx.commit().await?;
                return Ok(VoteChange::Inserted);
            }

            let existing = sqlx::query_scalar::<_, String>(
                "SELECT vote_type FROM review_helpful_vote \
                 WHERE review_kind = $1 AND review_id = $2 AND user_id = $3 FOR UPDATE",
            )
            .bind(key.kind.as_str())
            .bind(to_i64(key.review_id))
            .bind(to_i64(key.user_id))
            .fetch_optional(&mut *tx)
            .await?;
            let Some(existing) = existing else {
                continue;
            };

            let stored = if existing == VoteType::Helpful.as_str() {
                VoteType::Helpful
            } else {
                VoteType::NotHelpful
            };
            let change = VoteChange::decide(Some(stored), vote);
            let sql = if change == VoteChange::Removed {
                "DELETE FROM review_helpful_vote \
                 WHERE review_kind = $1 AND review_id = $2 AND user_id = $3"
            } else {
                "UPDATE review_helpful_vote SET vote_type = $4 \
                 WHERE review_kind = $1 AND review_id = $2 AND user_id = $3"
            };
            let mut query = sqlx::query(sql)
                .bind(key.kind.as_str())
                .bind(to_i64(key.review_id))
                .bind(to_i64(key.user_id));
            if change == VoteChange::Changed {
                query = query.bind(vote.as_str());
            }
            query.execute(&mut *tx).await?;

            tx.commit().await?;
            return Ok(change);
        }

        Err(ReviewError::Persistence(format!(
            "vote on {}/{} by user {} kept conflicting",
            key.kind, key.review_id, key.user_id
        )))
    }

    async fn tally(&self, kind: ReviewKind, review_id: u64) -> Result<VoteTally, ReviewError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT vote_type, COUNT(*) FROM review_helpful_vote \
             WHERE review_kind = $1 AND review_id = $2 GROUP BY vote_type",
        )
        .bind(kind.as_str())
        .bind(to_i64(review_id))
        .fetch_all(&self.pool)
        .await?;

        let mut tally = VoteTally::default();
        for (vote_type, count) in rows {
            match vote_type.as_str() {
                "helpful" => tally.helpful = to_u64(count),
                "not_helpful" => tally.not_helpful = to_u64(count),
                other => tracing::warn!(vote_type = other, "ignoring unknown vote type"),
            }
        }
        Ok(tally)
    }
}

#[async_trait]
impl WebhookStore for PostgresPersistence {
    async fn insert(&self, registration: WebhookRegistration) -> Result<(), ReviewError> {
        let events: Vec<String> = registration
            .subscribed_events
            .iter()
            .map(|e| e.as_str().to_string())
            .collect();
        sqlx::query(
            "INSERT INTO review_webhook (id, url, events, secret, tenant_id, active, created) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(*registration.id.as_uuid())
        .bind(&registration.url)
        .bind(events)
        .bind(&registration.secret)
        .bind(registration.tenant_id.map(to_i64))
        .bind(registration.active)
        .bind(registration.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: WebhookId) -> Result<bool, ReviewError> {
        let result = sqlx::query("DELETE FROM review_webhook WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_active(&self) -> Result<Vec<WebhookRegistration>, ReviewError> {
        type Row = (
            uuid::Uuid,
            String,
            Vec<String>,
            String,
            Option<i64>,
            bool,
            chrono::DateTime<chrono::Utc>,
        );
        let rows = sqlx::query_as::<_, Row>(
            "SELECT id, url, events, secret, tenant_id, active, created \
             FROM review_webhook WHERE active ORDER BY created ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, url, events, secret, tenant_id, active, created_at)| WebhookRegistration {
                    id: WebhookId::from_uuid(id),
                    url,
                    subscribed_events: events
                        .iter()
                        .filter_map(|e| e.parse::<ReviewEvent>().ok())
                        .collect(),
                    secret,
                    tenant_id: tenant_id.map(to_u64),
                    active,
                    created_at,
                },
            )
            .collect())
    }
}

#[async_trait]
impl UserStore for PostgresPersistence {
    async fn load_user(&self, id: u64) -> Result<Option<UserAccount>, ReviewError> {
        let row = sqlx::query_as::<_, (i64, bool, String, String, String)>(
            "SELECT id, blocked, email, display_name, preferred_language FROM users WHERE id = $1",
        )
        .bind(to_i64(id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(id, blocked, email, display_name, preferred_language)| UserAccount {
                id: to_u64(id),
                blocked,
                email,
                display_name,
                preferred_language,
            },
        ))
    }
}

#[async_trait]
impl StatsCache for PostgresPersistence {
    async fn get(&self, key: &str) -> Option<TargetStats> {
        let row = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT stats FROM review_stats_cache WHERE cache_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await;
        match row {
            Ok(Some(stats)) => match serde_json::from_value(stats) {
                Ok(stats) => Some(stats),
                Err(e) => {
                    tracing::warn!(key, error = %e, "discarding undecodable cached stats");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "stats cache read failed");
                None
            }
        }
    }

    async fn set(&self, key: &str, stats: TargetStats, tags: &[String]) {
        let stats = match serde_json::to_value(&stats) {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(key, error = %e, "stats not cacheable");
                return;
            }
        };
        let result = sqlx::query(
            "INSERT INTO review_stats_cache (cache_key, tags, stats, updated) \
             VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (cache_key) DO UPDATE \
             SET tags = EXCLUDED.tags, stats = EXCLUDED.stats, updated = EXCLUDED.updated",
        )
        .bind(key)
        .bind(tags)
        .bind(stats)
        .execute(&self.pool)
        .await;
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "stats cache write failed");
        }
    }

    async fn invalidate_tags(&self, tags: &[String]) {
        let result = sqlx::query("DELETE FROM review_stats_cache WHERE tags && $1")
            .bind(tags)
            .execute(&self.pool)
            .await;
        if let Err(e) = result {
            tracing::error!(?tags, error = %e, "stats cache invalidation failed");
        }
    }
}

/// Durable task queue on the `task_queue` table.
///
/// Tasks are stored as JSONB under a queue name. A claim stamps
/// `locked_until` instead of removing the row, and `FOR UPDATE SKIP LOCKED`
/// keeps concurrent workers off the same row. The row is deleted on ack; a
/// worker that dies first leaves it claimable once the lease lapses.
#[derive(Debug)]
pub struct PostgresQueue<T> {
    pool: PgPool,
    name: &'static str,
    lease: Duration,
    _task: PhantomData<fn() -> T>,
}

impl<T> PostgresQueue<T> {
    /// Creates a queue handle for the named queue.
    #[must_use]
    pub fn new(pool: PgPool, name: &'static str, lease: Duration) -> Self {
        Self {
            pool,
            name,
            lease,
            _task: PhantomData,
        }
    }
}

const CLAIM_SQL: &str = "UPDATE task_queue \
     SET locked_until = NOW() + ($2 || ' milliseconds')::INTERVAL \
     WHERE id = ( \
         SELECT id FROM task_queue \
         WHERE queue = $1 AND (locked_until IS NULL OR locked_until < NOW()) \
         ORDER BY id FOR UPDATE SKIP LOCKED LIMIT 1 \
     ) RETURNING id, payload";

#[async_trait]
impl<T> TaskQueue<T> for PostgresQueue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + std::fmt::Debug + 'static,
{
    async fn enqueue(&self, item: T) -> Result<(), ReviewError> {
        let payload = serde_json::to_value(&item)?;
        sqlx::query("INSERT INTO task_queue (queue, payload) VALUES ($1, $2)")
            .bind(self.name)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn claim(&self) -> Result<Option<ClaimedTask<T>>, ReviewError> {
        let row = sqlx::query_as::<_, (i64, serde_json::Value)>(CLAIM_SQL)
            .bind(self.name)
            .bind(self.lease.as_millis().to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some((id, payload)) = row else {
            return Ok(None);
        };

        let receipt = to_u64(id);
        match serde_json::from_value::<T>(payload) {
            Ok(task) => Ok(Some(ClaimedTask { receipt, task })),
            Err(e) => {
                // An undecodable row would come back after every lease.
                tracing::error!(queue = self.name, id, error = %e, "dropping undecodable task");
                self.ack(receipt).await?;
                Err(e.into())
            }
        }
    }

    async fn ack(&self, receipt: u64) -> Result<(), ReviewError> {
        sqlx::query("DELETE FROM task_queue WHERE id = $1")
            .bind(to_i64(receipt))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn select_aliases_fixed_kind_columns() {
        let sql = review_select(ReviewKind::Mentoring.schema());
        assert!(sql.contains("overall_rating AS rating"));
        assert!(sql.contains("review_status AS status"));
        assert!(sql.contains("NULL::TEXT AS target_type"));
        assert!(sql.contains("NULL::TEXT AS owner_response"));
        assert!(sql.ends_with("FROM session_review"));
    }

    #[test]
    fn cached_stats_survive_the_jsonb_column() {
        let target = TargetRef::new("lms_course", 8);
        let stats = TargetStats::from_ratings(ReviewKind::Course, &target, [5, 4, 4]);
        let Ok(stored) = serde_json::to_value(&stats) else {
            panic!("stats must serialize");
        };
        assert_eq!(stored["distribution"]["4"], 2);
        let restored: Result<TargetStats, _> = serde_json::from_value(stored);
        assert_eq!(restored.ok(), Some(stats));
    }

    #[test]
    fn claim_only_takes_unleased_rows() {
        assert!(CLAIM_SQL.contains("locked_until IS NULL OR locked_until < NOW()"));
        assert!(CLAIM_SQL.contains("FOR UPDATE SKIP LOCKED"));
        assert!(CLAIM_SQL.starts_with("UPDATE task_queue"));
    }

    fn list_sql(kind: ReviewKind, query: &ReviewListQuery) -> String {
        let schema = kind.schema();
        let mut builder = QueryBuilder::<Postgres>::new(listed_select(schema));
        push_list_filters(&mut builder, schema, query);
        builder.push(format!(" ORDER BY {}", list_order(schema, query.sort)));
        builder.sql().to_string()
    }

    #[test]
    fn helpful_listing_ranks_by_wilson_score() {
        let Ok(query) = ReviewListQuery::new(
            Some(TargetRef::new("producer_profile", 3)),
            Some(4),
            ReviewSort::Helpful,
            None,
            None,
        ) else {
            panic!("query must build");
        };
        let sql = list_sql(ReviewKind::Agro, &query);
        assert!(sql.contains("WHERE state = 'approved'"));
        assert!(sql.contains("AND target_entity_id = $1 AND target_entity_type = $2"));
        assert!(sql.contains("AND rating = $3"));
        assert!(
            sql.ends_with("ORDER BY wilson_score DESC, helpful_count DESC, created DESC, id DESC")
        );
    }

    #[test]
    fn mentoring_listing_has_no_helpfulness_columns() {
        let Ok(query) = ReviewListQuery::new(None, None, ReviewSort::Helpful, None, None) else {
            panic!("query must build");
        };
        let sql = list_sql(ReviewKind::Mentoring, &query);
        assert!(sql.contains("0::BIGINT AS helpful_count"));
        assert!(sql.ends_with("ORDER BY created DESC, id DESC"));
    }

    #[test]
    fn fixed_kind_with_other_target_type_matches_nothing() {
        let Ok(query) = ReviewListQuery::new(
            Some(TargetRef::new("merchant_profile", 3)),
            None,
            ReviewSort::Highest,
            None,
            None,
        ) else {
            panic!("query must build");
        };
        let sql = list_sql(ReviewKind::Course, &query);
        assert!(sql.contains("AND FALSE"));
        assert!(sql.contains("ORDER BY rating DESC NULLS LAST"));
    }

    #[test]
    fn select_aliases_polymorphic_kind_columns() {
        let sql = review_select(ReviewKind::Agro.schema());
        assert!(sql.contains("state AS status"));
        assert!(sql.contains("target_entity_type AS target_type"));
        assert!(sql.contains("response AS owner_response"));
    }
}
