use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantView {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl From<&Tenant> for TenantView {
    fn from(t: &Tenant) -> Self {
        Self { id: t.id, email: t.email.clone(), created_at: t.created_at, is_active: t.is_active }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Project {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub is_default: bool,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Topic {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub broker_topic_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKeyRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub secret_hash: String,
    pub lookup_digest: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyView {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<&ApiKeyRow> for ApiKeyView {
    fn from(k: &ApiKeyRow) -> Self {
        Self {
            id: k.id,
            tenant_id: k.tenant_id,
            project_id: k.project_id,
            name: k.name.clone(),
            created_at: k.created_at,
            last_used_at: k.last_used_at,
        }
    }
}

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct UsageCounterRow {
    pub id: i64,
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub day: NaiveDate,
    pub messages_in: i64,
    pub messages_out: i64,
    pub bytes_in: i64,
    pub bytes_out: i64,
}

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct GlobalUsageCounterRow {
    pub id: i64,
    pub day: NaiveDate,
    pub messages_in: i64,
    pub bytes_in: i64,
}

/// Who issued a request and under what scope, after authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal {
    pub tenant: Tenant,
    /// Set when the request was authenticated with an API key, which is
    /// scoped to a single project; `None` for bearer-token requests.
    pub project_id: Option<Uuid>,
}
