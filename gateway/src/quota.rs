//! The quota engine: atomic check-and-increment of per-(tenant,project)-day
//! and global-day counters, serialized by non-blocking row locks with
//! bounded exponential-backoff retry.

use chrono::{NaiveDate, Utc};
use common_http_errors::{ApiError, QuotaDimension, QuotaScope};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

pub const FREE_TIER_MESSAGES_LIMIT: i64 = 10_000;
pub const FREE_TIER_BYTES_LIMIT: i64 = 100 * 1024 * 1024;
pub const MAX_MESSAGES_IN: i64 = 200_000;
pub const MAX_BYTES_IN: i64 = 2_000_000_000;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 10;

/// Postgres SQLSTATE for a `NOWAIT` lock that could not be acquired.
const LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy)]
pub struct QuotaRequest {
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub direction: Direction,
    pub messages: i64,
    pub bytes: i64,
}

/// Run one check-and-increment attempt; returns `Ok(true)` on success,
/// `Ok(false)` if the row lock was unavailable (caller should retry), or
/// `Err` for a real quota breach.
async fn try_check_and_increment(pool: &PgPool, req: QuotaRequest) -> Result<bool, ApiError> {
    let today: NaiveDate = Utc::now().date_naive();
    let mut tx: Transaction<'_, Postgres> = match pool.begin().await {
        Ok(tx) => tx,
        Err(e) => return Err(ApiError::internal(e, None)),
    };

    if req.direction == Direction::In {
        match lock_or_create_global(&mut tx, today).await {
            Ok(Some((messages_in, bytes_in))) => {
                if messages_in + req.messages > MAX_MESSAGES_IN {
                    return Err(ApiError::QuotaBreach {
                        scope: QuotaScope::Global,
                        dimension: QuotaDimension::Messages,
                        trace_id: None,
                    });
                }
                if bytes_in + req.bytes > MAX_BYTES_IN {
                    return Err(ApiError::QuotaBreach {
                        scope: QuotaScope::Global,
                        dimension: QuotaDimension::Bytes,
                        trace_id: None,
                    });
                }
                if let Err(e) = sqlx::query(
                    "UPDATE global_usage_counters SET messages_in = messages_in + $1, bytes_in = bytes_in + $2 WHERE day = $3",
                )
                .bind(req.messages)
                .bind(req.bytes)
                .bind(today)
                .execute(&mut *tx)
                .await
                {
                    return Err(ApiError::internal(e, None));
                }
            }
            Ok(None) => return Ok(false),
            Err(e) => return Err(ApiError::internal(e, None)),
        }
    }

    let user_row = match lock_or_create_user(&mut tx, req.tenant_id, req.project_id, today).await {
        Ok(Some(row)) => row,
        Ok(None) => return Ok(false),
        Err(e) => return Err(ApiError::internal(e, None)),
    };

    let (messages_used, bytes_used, messages_col, bytes_col) = match req.direction {
        Direction::In => (user_row.0, user_row.2, "messages_in", "bytes_in"),
        Direction::Out => (user_row.1, user_row.3, "messages_out", "bytes_out"),
    };

    if messages_used + req.messages > FREE_TIER_MESSAGES_LIMIT {
        return Err(ApiError::QuotaBreach { scope: QuotaScope::Tenant, dimension: QuotaDimension::Messages, trace_id: None });
    }
    if bytes_used + req.bytes > FREE_TIER_BYTES_LIMIT {
        return Err(ApiError::QuotaBreach { scope: QuotaScope::Tenant, dimension: QuotaDimension::Bytes, trace_id: None });
    }

    let sql = format!(
        "UPDATE usage_counters SET {messages_col} = {messages_col} + $1, {bytes_col} = {bytes_col} + $2 WHERE tenant_id = $3 AND project_id = $4 AND day = $5"
    );
    if let Err(e) = sqlx::query(&sql)
        .bind(req.messages)
        .bind(req.bytes)
        .bind(req.tenant_id)
        .bind(req.project_id)
        .bind(today)
        .execute(&mut *tx)
        .await
    {
        return Err(ApiError::internal(e, None));
    }

    if let Err(e) = tx.commit().await {
        return Err(ApiError::internal(e, None));
    }
    Ok(true)
}

/// Check and increment both the global (inbound only) and per-(tenant,
/// project) counters in one transaction, retrying on lock contention with
/// exponential backoff before surfacing a transient error.
pub async fn check_and_increment(pool: &PgPool, req: QuotaRequest) -> Result<(), ApiError> {
    let mut backoff_ms = INITIAL_BACKOFF_MS;
    for attempt in 0..=MAX_RETRIES {
        match try_check_and_increment(pool, req).await {
            Ok(true) => return Ok(()),
            Ok(false) => {
                if attempt == MAX_RETRIES {
                    return Err(ApiError::Transient { trace_id: None });
                }
                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
            }
            Err(e) => return Err(e),
        }
    }
    Err(ApiError::Transient { trace_id: None })
}

/// Insert-then-lock the global row for `day`. Returns `None` if the row is
/// currently locked by another transaction (caller retries).
async fn lock_or_create_global(
    tx: &mut Transaction<'_, Postgres>,
    day: NaiveDate,
) -> Result<Option<(i64, i64)>, sqlx::Error> {
    sqlx::query("INSERT INTO global_usage_counters (day, messages_in, bytes_in) VALUES ($1, 0, 0) ON CONFLICT (day) DO NOTHING")
        .bind(day)
        .execute(&mut **tx)
        .await?;

    let row = sqlx::query_as::<_, (i64, i64)>(
        "SELECT messages_in, bytes_in FROM global_usage_counters WHERE day = $1 FOR UPDATE NOWAIT",
    )
    .bind(day)
    .fetch_one(&mut **tx)
    .await;

    match row {
        Ok(row) => Ok(Some(row)),
        Err(e) => map_lock_unavailable(e),
    }
}

/// Insert-then-lock the (tenant, project, day) row. Returns
/// `(messages_in, messages_out, bytes_in, bytes_out)`.
async fn lock_or_create_user(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    project_id: Uuid,
    day: NaiveDate,
) -> Result<Option<(i64, i64, i64, i64)>, sqlx::Error> {
    sqlx::query(
        "INSERT INTO usage_counters (tenant_id, project_id, day, messages_in, messages_out, bytes_in, bytes_out) \
         VALUES ($1, $2, $3, 0, 0, 0, 0) ON CONFLICT (tenant_id, project_id, day) DO NOTHING",
    )
    .bind(tenant_id)
    .bind(project_id)
    .bind(day)
    .execute(&mut **tx)
    .await?;

    let row = sqlx::query_as::<_, (i64, i64, i64, i64)>(
        "SELECT messages_in, messages_out, bytes_in, bytes_out FROM usage_counters \
         WHERE tenant_id = $1 AND project_id = $2 AND day = $3 FOR UPDATE NOWAIT",
    )
    .bind(tenant_id)
    .bind(project_id)
    .bind(day)
    .fetch_one(&mut **tx)
    .await;

    match row {
        Ok(row) => Ok(Some(row)),
        Err(e) => map_lock_unavailable(e),
    }
}

fn map_lock_unavailable<T>(e: sqlx::Error) -> Result<Option<T>, sqlx::Error> {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE) {
            return Ok(None);
        }
    }
    Err(e)
}

/// Usage figures for one direction, derived for the `/usage` endpoints.
/// Pure computation, no I/O.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UsageMetrics {
    pub messages_used: i64,
    pub messages_limit: i64,
    pub messages_remaining: i64,
    pub messages_percentage: f64,
    pub bytes_used: i64,
    pub bytes_limit: i64,
    pub bytes_remaining: i64,
    pub bytes_percentage: f64,
    pub messages_warning: bool,
    pub bytes_warning: bool,
}

const WARNING_THRESHOLD_PERCENT: f64 = 80.0;

pub fn calculate_usage_metrics(messages_used: i64, bytes_used: i64) -> UsageMetrics {
    let messages_percentage = percentage(messages_used, FREE_TIER_MESSAGES_LIMIT);
    let bytes_percentage = percentage(bytes_used, FREE_TIER_BYTES_LIMIT);
    UsageMetrics {
        messages_used,
        messages_limit: FREE_TIER_MESSAGES_LIMIT,
        messages_remaining: (FREE_TIER_MESSAGES_LIMIT - messages_used).max(0),
        messages_percentage,
        bytes_used,
        bytes_limit: FREE_TIER_BYTES_LIMIT,
        bytes_remaining: (FREE_TIER_BYTES_LIMIT - bytes_used).max(0),
        bytes_percentage,
        messages_warning: messages_percentage >= WARNING_THRESHOLD_PERCENT,
        bytes_warning: bytes_percentage >= WARNING_THRESHOLD_PERCENT,
    }
}

fn percentage(used: i64, limit: i64) -> f64 {
    if limit <= 0 {
        return 0.0;
    }
    ((used as f64 / limit as f64) * 100.0).clamp(0.0, 100.0)
}

/// Read-path usage for one (tenant, project) on one day, without locking.
pub async fn get_project_usage(
    pool: &PgPool,
    tenant_id: Uuid,
    project_id: Uuid,
    day: NaiveDate,
) -> Result<(i64, i64, i64, i64), sqlx::Error> {
    let row = sqlx::query_as::<_, (i64, i64, i64, i64)>(
        "SELECT messages_in, messages_out, bytes_in, bytes_out FROM usage_counters \
         WHERE tenant_id = $1 AND project_id = $2 AND day = $3",
    )
    .bind(tenant_id)
    .bind(project_id)
    .bind(day)
    .fetch_optional(pool)
    .await?;
    Ok(row.unwrap_or((0, 0, 0, 0)))
}

/// Read-path aggregate usage across all of a tenant's projects on one day.
pub async fn get_tenant_usage(pool: &PgPool, tenant_id: Uuid, day: NaiveDate) -> Result<(i64, i64, i64, i64), sqlx::Error> {
    let row = sqlx::query_as::<_, (Option<i64>, Option<i64>, Option<i64>, Option<i64>)>(
        "SELECT SUM(messages_in), SUM(messages_out), SUM(bytes_in), SUM(bytes_out) FROM usage_counters \
         WHERE tenant_id = $1 AND day = $2",
    )
    .bind(tenant_id)
    .bind(day)
    .fetch_one(pool)
    .await?;
    Ok((row.0.unwrap_or(0), row.1.unwrap_or(0), row.2.unwrap_or(0), row.3.unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_metrics_below_warning_threshold() {
        let metrics = calculate_usage_metrics(100, 1024);
        assert!(!metrics.messages_warning);
        assert!(!metrics.bytes_warning);
        assert_eq!(metrics.messages_remaining, FREE_TIER_MESSAGES_LIMIT - 100);
    }

    #[test]
    fn usage_metrics_at_warning_threshold() {
        let eighty_percent_messages = (FREE_TIER_MESSAGES_LIMIT as f64 * 0.8) as i64;
        let metrics = calculate_usage_metrics(eighty_percent_messages, 0);
        assert!(metrics.messages_warning);
    }

    #[test]
    fn usage_metrics_percentage_clamped_at_100() {
        let metrics = calculate_usage_metrics(FREE_TIER_MESSAGES_LIMIT * 2, FREE_TIER_BYTES_LIMIT * 2);
        assert_eq!(metrics.messages_percentage, 100.0);
        assert_eq!(metrics.bytes_percentage, 100.0);
        assert_eq!(metrics.messages_remaining, 0);
    }
}
