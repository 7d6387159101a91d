//! Source lifecycle: configuration to live connectors, tunnels and
//! per-source policy
//!
//! The maps are built once during startup and are read-only afterwards,
//! so the dispatch hot path takes no locks. Shutdown drains tunnels and
//! closes every pool, continuing past individual failures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::{GatewayConfig, SourceConfig};
use crate::connectors::{Connector, ConnectorConfig, ConnectorRegistry};
use crate::dsn;
use crate::error::GatewayError;
use crate::ssh::{establish_tunnel, SshTunnel};
use crate::types::ExecuteOptions;

pub struct SourceManager {
    /// Declared order; the first id is the default source
    order: Vec<String>,
    connectors: HashMap<String, Arc<dyn Connector>>,
    options: HashMap<String, ExecuteOptions>,
    configs: HashMap<String, SourceConfig>,
    tunnels: Mutex<HashMap<String, SshTunnel>>,
}

impl std::fmt::Debug for SourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceManager")
            .field("order", &self.order)
            .finish()
    }
}

impl SourceManager {
    /// Connect every configured source, in declared order. Any failure
    /// aborts startup after releasing whatever that source had acquired.
    pub async fn initialize(
        config: &GatewayConfig,
        registry: &ConnectorRegistry,
    ) -> Result<Self, GatewayError> {
        config.validate()?;

        let mut manager = Self {
            order: Vec::with_capacity(config.sources.len()),
            connectors: HashMap::new(),
            options: HashMap::new(),
            configs: HashMap::new(),
            tunnels: Mutex::new(HashMap::new()),
        };

        for source in &config.sources {
            let id = source.normalized_id()?;
            if let Err(e) = manager.connect_source(&id, source, registry).await {
                // Release anything already brought up before re-raising
                manager.shutdown().await;
                return Err(GatewayError::ConnectionFailed(format!("{}: {}", id, e)));
            }
            manager.order.push(id.clone());
            manager.configs.insert(id, source.clone());
        }

        Ok(manager)
    }

    async fn connect_source(
        &mut self,
        id: &str,
        source: &SourceConfig,
        registry: &ConnectorRegistry,
    ) -> Result<(), GatewayError> {
        let raw_dsn = source.effective_dsn()?;
        let mut info = dsn::parse_dsn(&raw_dsn)?;

        // Tunnel first, so the driver dials the local listener
        if let Some(tunnel_settings) = &source.ssh_tunnel {
            tunnel_settings.validate(id)?;
            let target_port = info
                .port
                .or_else(|| info.source_type.default_port())
                .ok_or_else(|| {
                    GatewayError::TunnelFailed("target port is required for a tunnel".into())
                })?;
            let spec = tunnel_settings.tunnel_spec(
                &info.host,
                target_port,
                source.connection_timeout(),
            )?;
            let tunnel = establish_tunnel(spec).await?;
            info.rewrite_for_tunnel(tunnel.local_port())?;
            match self.tunnels.lock() {
                Ok(mut tunnels) => {
                    tunnels.insert(id.to_string(), tunnel);
                }
                Err(_) => {
                    tunnel.close();
                    return Err(GatewayError::TunnelFailed(
                        "tunnel table poisoned during startup".into(),
                    ));
                }
            }
        }

        let effective_dsn = {
            use secrecy::ExposeSecret;
            info.to_connection_string().expose_secret().to_string()
        };

        let connector_config = ConnectorConfig {
            max_connections: source.max_connections,
            connect_timeout: source.connection_timeout(),
            readonly: source.readonly,
            index_pattern: source.index_pattern.clone(),
        };

        let mut connector = registry.clone_for_dsn(&effective_dsn)?;
        if let Err(e) = connector
            .connect(
                &effective_dsn,
                source.init_script.as_deref(),
                &connector_config,
            )
            .await
        {
            self.release_tunnel(id);
            return Err(e);
        }

        self.connectors.insert(id.to_string(), Arc::from(connector));
        self.options.insert(
            id.to_string(),
            ExecuteOptions {
                readonly: source.readonly,
                max_rows: source.max_rows,
                request_timeout_secs: source.request_timeout_secs,
                params: Vec::new(),
            },
        );
        Ok(())
    }

    fn release_tunnel(&self, id: &str) {
        if let Ok(mut tunnels) = self.tunnels.lock() {
            if let Some(tunnel) = tunnels.remove(id) {
                tunnel.close();
            }
        }
    }

    /// Ordered source ids; the first is the default.
    pub fn source_ids(&self) -> &[String] {
        &self.order
    }

    pub fn default_source(&self) -> Option<&str> {
        self.order.first().map(String::as_str)
    }

    fn resolve_id<'a>(&'a self, source: Option<&'a str>) -> Result<&'a str, GatewayError> {
        match source {
            Some(id) => {
                if self.connectors.contains_key(id) {
                    Ok(id)
                } else {
                    Err(GatewayError::SourceNotFound {
                        id: id.to_string(),
                        available: self.order.join(", "),
                    })
                }
            }
            None => self.default_source().ok_or_else(|| {
                GatewayError::SourceNotFound {
                    id: "<default>".to_string(),
                    available: String::new(),
                }
            }),
        }
    }

    /// Connector for the named source, or the default when None.
    pub fn connector(&self, source: Option<&str>) -> Result<Arc<dyn Connector>, GatewayError> {
        let id = self.resolve_id(source)?;
        self.connectors
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::SourceNotFound {
                id: id.to_string(),
                available: self.order.join(", "),
            })
    }

    /// Execution policy for the named source, or the default when None.
    pub fn execute_options(&self, source: Option<&str>) -> Result<ExecuteOptions, GatewayError> {
        let id = self.resolve_id(source)?;
        self.options
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::SourceNotFound {
                id: id.to_string(),
                available: self.order.join(", "),
            })
    }

    pub fn source_config(&self, id: &str) -> Option<&SourceConfig> {
        self.configs.get(id)
    }

    pub fn has_source(&self, id: &str) -> bool {
        self.connectors.contains_key(id)
    }

    /// Disconnect every connector, then close every tunnel. Both phases
    /// run to completion even when individual steps fail.
    pub async fn shutdown(&self) {
        for (id, connector) in &self.connectors {
            if let Err(e) = connector.disconnect().await {
                log::warn!("disconnect failed for source '{}': {}", id, e);
            }
        }
        let drained: Vec<(String, SshTunnel)> = match self.tunnels.lock() {
            Ok(mut tunnels) => tunnels.drain().collect(),
            Err(poisoned) => poisoned.into_inner().drain().collect(),
        };
        for (id, tunnel) in drained {
            log::debug!("closing tunnel for source '{}'", id);
            tunnel.close();
        }
    }
}
