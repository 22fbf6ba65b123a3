pub mod connections;
pub mod geoserver;
pub mod ingest;
pub mod jobs;
pub mod martin;
pub mod publish;
pub mod raster;
pub mod scene;
pub mod store;
