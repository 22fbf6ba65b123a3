use reqwest::StatusCode;
use serde_json::json;

use crate::config::get_config;
use crate::error::AppError;

/// Thin client of the external OGC server's REST API. Every operation is
/// idempotent on retry: 409 on create-if-absent and 404 on delete both count
/// as success.
pub struct GeoServerClient {
    http: reqwest::Client,
}

impl GeoServerClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    fn rest(&self, path: &str) -> String {
        format!("{}/rest/{}", get_config().geoserver_url, path)
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let config = get_config();
        req.basic_auth(&config.geoserver_user, Some(&config.geoserver_password))
    }

    pub async fn ensure_workspace(&self, workspace: &str) -> Result<(), AppError> {
        let body = json!({"workspace": {"name": workspace}});
        let resp = self
            .auth(self.http.post(self.rest("workspaces")))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::UpstreamFailure(format!("OGC server unreachable: {}", e)))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Ok(()), // already there
            s => Err(upstream_error("create workspace", s, resp).await),
        }
    }

    /// Registers a PostGIS datastore pointing at the metadata database. One
    /// store per workspace is enough; the layer name selects the table.
    pub async fn ensure_datastore(&self, workspace: &str, datastore: &str) -> Result<(), AppError> {
        let config = get_config();
        let url = url::Url::parse(&config.database_url)
            .map_err(|e| AppError::InternalServerError(format!("Bad DATABASE_URL: {}", e)))?;

        let body = json!({
            "dataStore": {
                "name": datastore,
                "connectionParameters": {
                    "entry": [
                        {"@key": "dbtype", "$": "postgis"},
                        {"@key": "host", "$": url.host_str().unwrap_or("localhost")},
                        {"@key": "port", "$": url.port().unwrap_or(5432).to_string()},
                        {"@key": "database", "$": url.path().trim_start_matches('/')},
                        {"@key": "user", "$": url.username()},
                        {"@key": "passwd", "$": url.password().unwrap_or("")},
                        {"@key": "schema", "$": "public"}
                    ]
                }
            }
        });

        let resp = self
            .auth(
                self.http
                    .post(self.rest(&format!("workspaces/{}/datastores", workspace))),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::UpstreamFailure(format!("OGC server unreachable: {}", e)))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Ok(()),
            s => Err(upstream_error("create datastore", s, resp).await),
        }
    }

    /// Publishes one spatial table as a WMS/WFS layer.
    pub async fn publish_layer(
        &self,
        workspace: &str,
        datastore: &str,
        table_name: &str,
    ) -> Result<(), AppError> {
        let body = json!({
            "featureType": {
                "name": table_name,
                "nativeName": table_name,
                "title": table_name,
                "srs": "EPSG:4326"
            }
        });

        let resp = self
            .auth(self.http.post(self.rest(&format!(
                "workspaces/{}/datastores/{}/featuretypes",
                workspace, datastore
            ))))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::UpstreamFailure(format!("OGC server unreachable: {}", e)))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Ok(()),
            s => Err(upstream_error("publish layer", s, resp).await),
        }
    }

    /// 404 means something else already removed it, which is fine.
    pub async fn delete_layer(
        &self,
        workspace: &str,
        datastore: &str,
        layer_name: &str,
    ) -> Result<(), AppError> {
        let resp = self
            .auth(self.http.delete(self.rest(&format!(
                "workspaces/{}/datastores/{}/featuretypes/{}?recurse=true",
                workspace, datastore, layer_name
            ))))
            .send()
            .await
            .map_err(|e| AppError::UpstreamFailure(format!("OGC server unreachable: {}", e)))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            s => Err(upstream_error("delete layer", s, resp).await),
        }
    }

    pub fn wms_url(workspace: &str) -> String {
        format!("{}/{}/wms", get_config().geoserver_url, workspace)
    }

    pub fn wfs_url(workspace: &str) -> String {
        format!("{}/{}/wfs", get_config().geoserver_url, workspace)
    }
}

async fn upstream_error(action: &str, status: StatusCode, resp: reqwest::Response) -> AppError {
    let body = resp.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(300).collect();
    AppError::UpstreamFailure(format!(
        "OGC server {} failed with {}: {}",
        action, status, excerpt
    ))
}
