pub use sea_orm_migration::prelude::*;

mod m20250601_000001_create_users_table;
mod m20250601_000002_create_files_table;
mod m20250601_000003_create_vector_services_table;
mod m20250601_000004_create_ogc_services_table;
mod m20250601_000005_create_scenes_table;
mod m20250601_000006_create_scene_layers_table;
mod m20250601_000007_create_service_connections_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_users_table::Migration),
            Box::new(m20250601_000002_create_files_table::Migration),
            Box::new(m20250601_000003_create_vector_services_table::Migration),
            Box::new(m20250601_000004_create_ogc_services_table::Migration),
            Box::new(m20250601_000005_create_scenes_table::Migration),
            Box::new(m20250601_000006_create_scene_layers_table::Migration),
            Box::new(m20250601_000007_create_service_connections_table::Migration),
        ]
    }
}
