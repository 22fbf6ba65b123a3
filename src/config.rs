use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiry_secs: u64,
    pub listen_addr: String,

    // Filesystem roots
    pub upload_root: String,
    pub mbtiles_root: String,

    // Upload cap in bytes
    pub max_upload_bytes: usize,

    // Martin tile server
    pub martin_executable: String,
    pub martin_config_path: String,
    pub martin_listen: String,
    pub martin_base_url: String,

    // GeoServer
    pub geoserver_url: String,
    pub geoserver_user: String,
    pub geoserver_password: String,
    pub geoserver_workspace: String,

    // Deadlines
    pub probe_deadline_secs: u64,
    pub publish_deadline_secs: u64,
    pub job_poll_deadline_secs: u64,
    pub job_ttl_secs: u64,

    // Snowflake node identity
    pub datacenter_id: u64,
    pub worker_id: u64,

    // Background conversion workers
    pub raster_workers: usize,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            eprintln!("WARNING: JWT_SECRET not set in .env, using default (insecure!)");
            "secret".to_string()
        });

        let martin_listen = env_or("MARTIN_LISTEN", "0.0.0.0:3010");
        // The server binds 0.0.0.0 but clients must dial a real host.
        let martin_base_url = env::var("MARTIN_BASE_URL").unwrap_or_else(|_| {
            let port = martin_listen.rsplit(':').next().unwrap_or("3010");
            format!("http://localhost:{}", port)
        });

        Self {
            database_url,
            jwt_secret,
            jwt_expiry_secs: env_parse("JWT_EXPIRY_SECS", 86_400),
            listen_addr: env_or("LISTEN_ADDR", "0.0.0.0:3000"),
            upload_root: env_or("UPLOAD_ROOT", "./files_data"),
            mbtiles_root: env_or("MBTILES_ROOT", "./files_data/mbtiles"),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", 500 * 1024 * 1024),
            martin_executable: env_or("MARTIN_EXECUTABLE", "martin"),
            martin_config_path: env_or("MARTIN_CONFIG_PATH", "./martin_config.yaml"),
            martin_listen,
            martin_base_url,
            geoserver_url: env_or("GEOSERVER_URL", "http://localhost:8083/geoserver"),
            geoserver_user: env_or("GEOSERVER_USER", "admin"),
            geoserver_password: env_or("GEOSERVER_PASSWORD", "geoserver"),
            geoserver_workspace: env_or("GEOSERVER_WORKSPACE", "geo_layer_kit"),
            probe_deadline_secs: env_parse("PROBE_DEADLINE_SECS", 5),
            publish_deadline_secs: env_parse("PUBLISH_DEADLINE_SECS", 600),
            job_poll_deadline_secs: env_parse("JOB_POLL_DEADLINE_SECS", 25),
            job_ttl_secs: env_parse("JOB_TTL_SECS", 3_600),
            datacenter_id: env_parse("SNOWFLAKE_DATACENTER_ID", 1),
            worker_id: env_parse("SNOWFLAKE_WORKER_ID", 1),
            raster_workers: env_parse("RASTER_WORKERS", 2),
        }
    }
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}
