mod config;
mod db;
mod entities;
mod error;
mod middleware;
mod models;
mod pagination;
mod routes;
mod services;
mod utils;

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

use crate::config::get_config;
use crate::db::Db;
use crate::entities::user::{self, Role};
use crate::routes::{create_routes, AppState};
use crate::services::geoserver::GeoServerClient;
use crate::services::jobs::JobRegistry;
use crate::services::martin::MartinController;
use crate::services::publish::Publisher;
use crate::services::store::ObjectStore;

/// First boot seeds a usable admin account; later boots leave users alone.
async fn seed_admin(db: &Db) -> Result<(), error::AppError> {
    let existing = user::Entity::find()
        .filter(user::Column::Username.eq("admin"))
        .one(&db.conn)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(b"admin123", &salt)
        .map_err(|e| error::AppError::InternalServerError(format!("Seed hash failed: {}", e)))?
        .to_string();

    let admin = user::ActiveModel {
        id: Set(db.next_id()),
        username: Set("admin".to_string()),
        email: Set("admin@localhost".to_string()),
        password: Set(password_hash),
        role: Set(Role::Admin),
        created_at: Set(chrono::Utc::now().naive_utc()),
    };
    admin.insert(&db.conn).await?;
    println!("Startup | seeded default admin account");
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let config = get_config();

    let db = match Db::connect().await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Startup | database connection failed: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = Migrator::up(&db.conn, None).await {
        eprintln!("Startup | migration failed: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = seed_admin(&db).await {
        eprintln!("Startup | admin seed failed: {}", e);
        std::process::exit(1);
    }

    let store = ObjectStore::new();
    if let Err(e) = store.ensure_roots().await {
        eprintln!("Startup | storage roots unavailable: {}", e);
        std::process::exit(1);
    }

    let martin = Arc::new(MartinController::new());
    match martin.write_config(&db, &store).await {
        Ok(sources) => {
            println!("Startup | tile config written | sources={}", sources);
            if let Err(e) = martin.start().await {
                // Publishes degrade to pending until the server comes up.
                eprintln!("Startup | tile server did not start: {}", e);
            }
        }
        Err(e) => eprintln!("Startup | tile config write failed: {}", e),
    }

    let geoserver = Arc::new(GeoServerClient::new());
    if let Err(e) = geoserver.ensure_workspace(&config.geoserver_workspace).await {
        // OGC publishing retries workspace creation per request.
        eprintln!("Startup | OGC workspace bootstrap failed: {}", e);
    }

    let jobs = Arc::new(JobRegistry::new());
    tokio::spawn(jobs.clone().run_gc_loop());

    let publisher = Publisher::new(
        db.clone(),
        store.clone(),
        martin.clone(),
        geoserver.clone(),
        jobs.clone(),
    );
    tokio::spawn(publisher.clone().run_reconciler());

    let state = AppState {
        db,
        store,
        martin,
        geoserver,
        jobs,
        publisher,
    };
    let app = create_routes(state);

    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Startup | cannot bind {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };
    println!("Startup | listening on {}", config.listen_addr);

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
