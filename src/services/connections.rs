use std::time::Duration;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;

use crate::db::Db;
use crate::entities::service_connection::{self, ConnectionKind};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ConnectionInput {
    pub kind: ConnectionKind,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub credentials: Option<serde_json::Value>,
    #[serde(default)]
    pub is_default: bool,
}

async fn owned_connection(
    db: &Db,
    connection_id: i64,
    user: &AuthUser,
) -> Result<service_connection::Model, AppError> {
    service_connection::Entity::find_by_id(connection_id)
        .one(&db.conn)
        .await?
        .filter(|c| c.user_id == user.id)
        .ok_or_else(|| AppError::NotFound(format!("Connection {} not found", connection_id)))
}

fn validate(input: &ConnectionInput) -> Result<(), AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::InvalidInput("Connection name cannot be empty".to_string()));
    }
    let url = input.url.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(AppError::InvalidInput(
            "Connection url must be an http(s) endpoint".to_string(),
        ));
    }
    Ok(())
}

pub async fn create_connection(
    db: &Db,
    user: &AuthUser,
    input: ConnectionInput,
) -> Result<service_connection::Model, AppError> {
    validate(&input)?;

    let txn = db.conn.begin().await?;

    // At most one default per (owner, kind).
    if input.is_default {
        clear_default(&txn, user.id, input.kind).await?;
    }

    let id = db.next_id();
    let record = service_connection::ActiveModel {
        id: Set(id),
        user_id: Set(user.id),
        kind: Set(input.kind),
        name: Set(input.name.trim().to_string()),
        url: Set(input.url.trim().trim_end_matches('/').to_string()),
        credentials: Set(input.credentials),
        is_default: Set(input.is_default),
        last_test_time: Set(None),
        last_test_status: Set("unknown".to_string()),
        created_at: Set(chrono::Utc::now().naive_utc()),
    };
    let record = record.insert(&txn).await?;

    txn.commit().await?;
    Ok(record)
}

pub async fn list_connections(
    db: &Db,
    user: &AuthUser,
    kind: Option<ConnectionKind>,
) -> Result<Vec<service_connection::Model>, AppError> {
    let mut query = service_connection::Entity::find()
        .filter(service_connection::Column::UserId.eq(user.id))
        .order_by_asc(service_connection::Column::CreatedAt);
    if let Some(kind) = kind {
        query = query.filter(service_connection::Column::Kind.eq(kind));
    }
    query.all(&db.conn).await.map_err(AppError::from)
}

pub async fn update_connection(
    db: &Db,
    connection_id: i64,
    user: &AuthUser,
    input: ConnectionInput,
) -> Result<service_connection::Model, AppError> {
    validate(&input)?;
    let record = owned_connection(db, connection_id, user).await?;

    let txn = db.conn.begin().await?;
    if input.is_default {
        clear_default(&txn, user.id, input.kind).await?;
    }

    let mut active: service_connection::ActiveModel = record.into();
    active.kind = Set(input.kind);
    active.name = Set(input.name.trim().to_string());
    active.url = Set(input.url.trim().trim_end_matches('/').to_string());
    active.credentials = Set(input.credentials);
    active.is_default = Set(input.is_default);
    let record = active.update(&txn).await?;

    txn.commit().await?;
    Ok(record)
}

pub async fn delete_connection(
    db: &Db,
    connection_id: i64,
    user: &AuthUser,
) -> Result<(), AppError> {
    let record = owned_connection(db, connection_id, user).await?;
    service_connection::Entity::delete_by_id(record.id)
        .exec(&db.conn)
        .await?;
    Ok(())
}

/// Probes the connection endpoint and stamps the outcome on the row. A dead
/// endpoint is a recorded result, not an error.
pub async fn test_connection(
    db: &Db,
    connection_id: i64,
    user: &AuthUser,
) -> Result<service_connection::Model, AppError> {
    let record = owned_connection(db, connection_id, user).await?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| AppError::InternalServerError(format!("HTTP client build failed: {}", e)))?;

    let probe_url = match record.kind {
        ConnectionKind::Tile => format!("{}/health", record.url),
        ConnectionKind::Ogc => format!("{}/rest/about/version", record.url),
    };

    let mut request = client.get(&probe_url);
    if let Some(credentials) = &record.credentials {
        let user_name = credentials.get("user").and_then(|v| v.as_str());
        let password = credentials.get("password").and_then(|v| v.as_str());
        if let Some(user_name) = user_name {
            request = request.basic_auth(user_name, password);
        }
    }

    let ok = match request.send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    };

    let mut active: service_connection::ActiveModel = record.into();
    active.last_test_time = Set(Some(chrono::Utc::now().naive_utc()));
    active.last_test_status = Set(if ok { "ok" } else { "fail" }.to_string());
    active.update(&db.conn).await.map_err(AppError::from)
}

/// The user's default connection of a kind, if any. Publish flows fall back
/// to the locally configured endpoints when this is `None`.
pub async fn default_connection(
    db: &Db,
    user_id: i64,
    kind: ConnectionKind,
) -> Result<Option<service_connection::Model>, AppError> {
    service_connection::Entity::find()
        .filter(service_connection::Column::UserId.eq(user_id))
        .filter(service_connection::Column::Kind.eq(kind))
        .filter(service_connection::Column::IsDefault.eq(true))
        .one(&db.conn)
        .await
        .map_err(AppError::from)
}

async fn clear_default(
    txn: &sea_orm::DatabaseTransaction,
    user_id: i64,
    kind: ConnectionKind,
) -> Result<(), AppError> {
    service_connection::Entity::update_many()
        .col_expr(
            service_connection::Column::IsDefault,
            sea_orm::sea_query::Expr::value(false),
        )
        .filter(service_connection::Column::UserId.eq(user_id))
        .filter(service_connection::Column::Kind.eq(kind))
        .exec(txn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(url: &str, name: &str) -> ConnectionInput {
        ConnectionInput {
            kind: ConnectionKind::Tile,
            name: name.to_string(),
            url: url.to_string(),
            credentials: None,
            is_default: false,
        }
    }

    #[test]
    fn validate_requires_http_url() {
        assert!(validate(&input("http://tiles.local:3010", "local")).is_ok());
        assert!(validate(&input("https://tiles.example.com", "remote")).is_ok());
        assert!(validate(&input("ftp://tiles.example.com", "ftp")).is_err());
        assert!(validate(&input("tiles.example.com", "bare")).is_err());
    }

    #[test]
    fn validate_rejects_blank_name() {
        assert!(validate(&input("http://tiles.local", "   ")).is_err());
    }
}
