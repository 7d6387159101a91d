//! Read-only HTTP introspection API for the web UI
//!
//! Three JSON endpoints: `/sources`, `/sources/{id}`, `/requests`. The
//! source projection never carries passwords, SSH passwords, private
//! keys or passphrases.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use serde_json::json;

use crate::dsn;
use crate::requests::{RequestFilter, RequestStore};
use crate::source::SourceManager;
use crate::tools::ToolRegistry;

pub struct ApiState {
    pub manager: Arc<SourceManager>,
    pub tools: Arc<ToolRegistry>,
    pub requests: Arc<RequestStore>,
}

/// Sanitized projection of one configured source.
#[derive(Debug, Serialize)]
pub struct DataSource {
    pub id: String,
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub is_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readonly: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_tunnel: Option<SshTunnelView>,
    pub tools: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SshTunnelView {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_user: Option<String>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/sources", get(list_sources))
        .route("/sources/{id}", get(get_source))
        .route("/requests", get(list_requests))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: Arc<ApiState>, listen: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("introspection API listening on http://{}", listen);
    axum::serve(listener, router(state)).await
}

fn project_source(state: &ApiState, id: &str) -> Option<DataSource> {
    let config = state.manager.source_config(id)?;
    let source_type = config.resolved_type().ok()?;

    // Prefer structured fields; fall back to the parsed DSN, never the
    // raw DSN itself
    let parsed = config
        .dsn
        .as_deref()
        .and_then(|raw| dsn::parse_dsn(raw).ok());
    let host = config
        .host
        .clone()
        .or_else(|| parsed.as_ref().map(|p| p.host.clone()));
    let port = config.port.or_else(|| parsed.as_ref().and_then(|p| p.port));
    let database = config
        .database
        .clone()
        .or_else(|| parsed.as_ref().map(|p| p.database.clone()))
        .filter(|d| !d.is_empty());
    let user = config
        .user
        .clone()
        .or_else(|| parsed.as_ref().and_then(|p| p.username.clone()));

    let tools = state
        .tools
        .tools()
        .iter()
        .filter(|t| t.source_id == id)
        .map(|t| t.name.clone())
        .collect();

    Some(DataSource {
        id: id.to_string(),
        source_type: source_type.scheme().to_string(),
        host,
        port,
        database,
        user,
        is_default: state.manager.default_source() == Some(id),
        readonly: Some(config.readonly),
        max_rows: config.max_rows,
        ssh_tunnel: config.ssh_tunnel.as_ref().map(|t| SshTunnelView {
            enabled: true,
            ssh_host: Some(t.ssh_host.clone()),
            ssh_port: Some(t.ssh_port),
            ssh_user: t.ssh_user.clone(),
        }),
        tools,
    })
}

async fn list_sources(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let sources: Vec<DataSource> = state
        .manager
        .source_ids()
        .iter()
        .filter_map(|id| project_source(&state, id))
        .collect();
    Json(sources)
}

async fn get_source(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    // The router decodes the segment once; anything that still looks like
    // a path after that is rejected
    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid source id", "source_id": id })),
        );
    }
    match project_source(&state, &id) {
        Some(source) => (
            StatusCode::OK,
            Json(serde_json::to_value(source).unwrap_or_default()),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown source", "source_id": id })),
        ),
    }
}

async fn list_requests(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let records = state.requests.list(&RequestFilter::default());
    Json(json!({ "requests": records }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, SourceConfig, SshTunnelSettings};
    use crate::connectors::default_registry;
    use crate::types::SourceType;
    use serde_json::Value;

    async fn state() -> Arc<ApiState> {
        let registry = default_registry();
        let config = GatewayConfig {
            sources: vec![
                SourceConfig {
                    id: "main".into(),
                    source_type: Some(SourceType::Sqlite),
                    database: Some(":memory:".into()),
                    readonly: true,
                    max_rows: Some(50),
                    ..Default::default()
                },
                SourceConfig {
                    id: "aux".into(),
                    source_type: Some(SourceType::Sqlite),
                    database: Some(":memory:".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let manager = Arc::new(
            SourceManager::initialize(&config, &registry)
                .await
                .unwrap(),
        );
        let requests = Arc::new(RequestStore::default());
        let tools = Arc::new(
            ToolRegistry::build(manager.clone(), requests.clone(), &[]).unwrap(),
        );
        Arc::new(ApiState {
            manager,
            tools,
            requests,
        })
    }

    /// No secret-bearing field name may appear at any depth.
    fn assert_hygienic(value: &Value) {
        const FORBIDDEN: [&str; 4] =
            ["password", "ssh_password", "ssh_key", "ssh_passphrase"];
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    assert!(
                        !FORBIDDEN.contains(&key.as_str()),
                        "forbidden field '{}' in response",
                        key
                    );
                    assert_hygienic(child);
                }
            }
            Value::Array(items) => items.iter().for_each(assert_hygienic),
            _ => {}
        }
    }

    #[tokio::test]
    async fn test_source_projection() {
        let state = state().await;
        let source = project_source(&state, "main").unwrap();
        assert!(source.is_default);
        assert_eq!(source.readonly, Some(true));
        assert_eq!(source.max_rows, Some(50));
        assert!(source.tools.contains(&"execute_sql".to_string()));

        let aux = project_source(&state, "aux").unwrap();
        assert!(!aux.is_default);
        assert!(aux.tools.contains(&"execute_sql_aux".to_string()));
    }

    #[test]
    fn test_projection_type_has_no_secret_fields() {
        // The projection is built from a config carrying every kind of
        // secret; none of them have a slot in the serialized shape
        let tunnel = SshTunnelSettings {
            ssh_host: "bastion.example.com".into(),
            ssh_port: 22,
            ssh_user: Some("deploy".into()),
            ssh_password: Some("sshsecret".into()),
            ssh_key: None,
            ssh_passphrase: Some("phrasesecret".into()),
            proxy_jump: None,
        };
        let data = DataSource {
            id: "s".into(),
            source_type: "postgres".into(),
            host: Some("db.internal".into()),
            port: Some(5432),
            database: Some("app".into()),
            user: Some("svc".into()),
            is_default: true,
            readonly: Some(false),
            max_rows: None,
            ssh_tunnel: Some(SshTunnelView {
                enabled: true,
                ssh_host: Some(tunnel.ssh_host.clone()),
                ssh_port: Some(tunnel.ssh_port),
                ssh_user: tunnel.ssh_user.clone(),
            }),
            tools: vec!["execute_sql".into()],
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_hygienic(&value);
        assert!(!value.to_string().contains("sshsecret"));
        assert!(!value.to_string().contains("phrasesecret"));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let state = state().await;
        let response = get_source(State(state), Path("../etc/passwd".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_source_404() {
        let state = state().await;
        let response = get_source(State(state), Path("ghost".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_sources_hygiene_end_to_end() {
        let state = state().await;
        let response = list_sources(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_hygienic(&value);
        assert_eq!(value.as_array().unwrap().len(), 2);
    }
}
