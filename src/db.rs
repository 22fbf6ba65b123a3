use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement,
    TransactionTrait, Value,
};

use crate::config::get_config;
use crate::error::AppError;
use crate::utils::snowflake::SnowflakeGenerator;

/// Typed gateway to the metadata store. Wraps the pooled connection and the
/// id generator so every insert path gets a snowflake primary key bound
/// inside the same transaction as the row itself.
#[cfg_attr(not(feature = "mock"), derive(Clone))]
pub struct Db {
    pub conn: DatabaseConnection,
    ids: Arc<SnowflakeGenerator>,
}

/// `DatabaseConnection` does not implement `Clone` when sea-orm's `mock`
/// feature is enabled, so clone the individual variants by hand.
#[cfg(feature = "mock")]
impl Clone for Db {
    fn clone(&self) -> Self {
        let conn = match &self.conn {
            DatabaseConnection::SqlxPostgresPoolConnection(c) => {
                DatabaseConnection::SqlxPostgresPoolConnection(c.clone())
            }
            DatabaseConnection::MockDatabaseConnection(c) => {
                DatabaseConnection::MockDatabaseConnection(c.clone())
            }
            DatabaseConnection::Disconnected => DatabaseConnection::Disconnected,
        };
        Self {
            conn,
            ids: self.ids.clone(),
        }
    }
}

impl Db {
    pub async fn connect() -> Result<Self, AppError> {
        let config = get_config();
        let conn = Database::connect(&config.database_url)
            .await
            .map_err(AppError::DatabaseError)?;
        let ids = SnowflakeGenerator::new(config.datacenter_id, config.worker_id)
            .map_err(AppError::InternalServerError)?;

        Ok(Self {
            conn,
            ids: Arc::new(ids),
        })
    }

    #[cfg(test)]
    pub fn with_connection(conn: DatabaseConnection) -> Self {
        Self {
            conn,
            ids: Arc::new(SnowflakeGenerator::new(0, 0).unwrap()),
        }
    }

    pub fn next_id(&self) -> i64 {
        self.ids.next_id()
    }

    /// Inserts one row whose active model is built from a freshly generated
    /// id, inside a single transaction. Returns the id on commit.
    pub async fn insert_with_generated_id<A, F>(&self, build: F) -> Result<i64, AppError>
    where
        A: ActiveModelTrait + sea_orm::ActiveModelBehavior + Send,
        <A::Entity as sea_orm::EntityTrait>::Model: sea_orm::IntoActiveModel<A>,
        F: FnOnce(i64) -> A,
    {
        let id = self.next_id();
        let txn = self.conn.begin().await?;
        build(id).insert(&txn).await?;
        txn.commit().await?;
        Ok(id)
    }

    /// Raw parameterised query. Used for the dynamic spatial tables that have
    /// no entity definition.
    pub async fn query_all(
        &self,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<Vec<sea_orm::QueryResult>, AppError> {
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);
        self.conn.query_all(stmt).await.map_err(AppError::from)
    }

    pub async fn query_one(
        &self,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<Option<sea_orm::QueryResult>, AppError> {
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);
        self.conn.query_one(stmt).await.map_err(AppError::from)
    }

    /// Raw parameterised statement, returning the affected row count.
    pub async fn execute(&self, sql: &str, values: Vec<Value>) -> Result<u64, AppError> {
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);
        let res = self.conn.execute(stmt).await?;
        Ok(res.rows_affected())
    }

    /// DDL helper for statements that take no bind parameters (CREATE TABLE,
    /// CREATE INDEX, DROP TABLE).
    pub async fn execute_unprepared(&self, sql: &str) -> Result<(), AppError> {
        self.conn.execute_unprepared(sql).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::scene;
    use sea_orm::{DatabaseBackend, MockDatabase, Set};

    #[tokio::test]
    async fn generated_id_insert_returns_the_snowflake() {
        let now = chrono::Utc::now().naive_utc();
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![scene::Model {
                id: 1,
                user_id: 2,
                name: "Basemap".to_string(),
                description: None,
                created_at: now,
                updated_at: now,
            }]])
            .into_connection();
        let db = Db::with_connection(conn);

        let mut seen = 0;
        let id = db
            .insert_with_generated_id(|id| {
                seen = id;
                scene::ActiveModel {
                    id: Set(id),
                    user_id: Set(2),
                    name: Set("Basemap".to_string()),
                    description: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
            })
            .await
            .unwrap();

        assert_eq!(id, seen);
        assert!(id > 0);
    }
}
