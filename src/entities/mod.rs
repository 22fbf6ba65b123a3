pub mod file;
pub mod ogc_service;
pub mod scene;
pub mod scene_layer;
pub mod service_connection;
pub mod user;
pub mod vector_service;
