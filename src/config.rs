//! Gateway configuration: ordered sources, per-source policy, SSH tunnel
//! settings and user-defined tools
//!
//! The loader consumes a TOML document; file discovery and CLI plumbing
//! stay in the binary.

use std::path::PathBuf;
use std::time::Duration;

use lazy_regex::{lazy_regex, Lazy, Regex};
use serde::Deserialize;

use crate::dsn;
use crate::error::GatewayError;
use crate::sql::ToolParamSpec;
use crate::ssh::{self, SshAuth, SshHop, TunnelSpec};
use crate::types::SourceType;

/// Whole configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// User-defined SQL tools
    #[serde(default, rename = "tools")]
    pub custom_tools: Vec<CustomToolConfig>,

    /// Introspection HTTP API bind address, e.g. "127.0.0.1:8080"
    #[serde(default)]
    pub http_listen: Option<String>,
}

impl GatewayConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, GatewayError> {
        let config: Self =
            toml::from_str(text).map_err(|e| GatewayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.sources.is_empty() {
            return Err(GatewayError::Config(
                "at least one source must be configured".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            let id = source.normalized_id()?;
            if !seen.insert(id.clone()) {
                return Err(GatewayError::Config(format!(
                    "duplicate source id '{}'",
                    id
                )));
            }
            source.validate()?;
        }
        Ok(())
    }
}

static SOURCE_ID: Lazy<Regex> = lazy_regex!(r"^[A-Za-z0-9_-]+$");

/// One configured database endpoint.
#[derive(Clone, Default, Deserialize)]
pub struct SourceConfig {
    pub id: String,

    #[serde(rename = "type")]
    pub source_type: Option<SourceType>,

    /// Full DSN; when absent, built from the structured fields below
    pub dsn: Option<String>,

    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,

    /// Policy clamps, never relaxed at invocation time
    #[serde(default)]
    pub readonly: bool,
    pub max_rows: Option<usize>,

    pub connection_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,

    /// SQL to run once after connect
    pub init_script: Option<String>,

    /// Driver pool size cap
    pub max_connections: Option<u32>,

    /// Elasticsearch default index pattern
    pub index_pattern: Option<String>,

    pub ssh_tunnel: Option<SshTunnelSettings>,
}

// Keep passwords out of debug logs.
impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("id", &self.id)
            .field("source_type", &self.source_type)
            .field("dsn", &self.dsn.as_deref().map(dsn::redact))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("readonly", &self.readonly)
            .field("max_rows", &self.max_rows)
            .field("ssh_tunnel", &self.ssh_tunnel)
            .finish_non_exhaustive()
    }
}

impl SourceConfig {
    /// Source id restricted to `[A-Za-z0-9_-]`, surrounding whitespace
    /// dropped.
    pub fn normalized_id(&self) -> Result<String, GatewayError> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(GatewayError::Config("source id cannot be empty".into()));
        }
        if !SOURCE_ID.is_match(id) {
            return Err(GatewayError::Config(format!(
                "source id '{}' contains invalid characters (allowed: A-Z a-z 0-9 _ -)",
                id
            )));
        }
        Ok(id.to_string())
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        let id = self.normalized_id()?;
        if self.dsn.is_none() {
            let source_type = self.source_type.ok_or_else(|| {
                GatewayError::Config(format!(
                    "source '{}': either 'dsn' or 'type' must be set",
                    id
                ))
            })?;
            match source_type {
                SourceType::Sqlite => {
                    if self.database.is_none() {
                        return Err(GatewayError::Config(format!(
                            "source '{}': SQLite requires 'database' (file path or :memory:)",
                            id
                        )));
                    }
                }
                _ => {
                    if self.host.is_none() {
                        return Err(GatewayError::Config(format!(
                            "source '{}': 'host' is required without a DSN",
                            id
                        )));
                    }
                }
            }
        }
        if let Some(0) = self.max_rows {
            return Err(GatewayError::Config(format!(
                "source '{}': max_rows must be positive",
                id
            )));
        }
        if let Some(tunnel) = &self.ssh_tunnel {
            tunnel.validate(&id)?;
        }
        Ok(())
    }

    /// Resolved source type, from the explicit field or the DSN scheme.
    pub fn resolved_type(&self) -> Result<SourceType, GatewayError> {
        if let Some(t) = self.source_type {
            return Ok(t);
        }
        let dsn = self.dsn.as_deref().ok_or_else(|| {
            GatewayError::Config(format!(
                "source '{}': either 'dsn' or 'type' must be set",
                self.id
            ))
        })?;
        SourceType::from_dsn(dsn)
    }

    /// The DSN to connect with: the configured one, or one assembled from
    /// structured fields. Unencoded password characters are fine; the
    /// gateway's own parser handles them.
    pub fn effective_dsn(&self) -> Result<String, GatewayError> {
        if let Some(dsn) = &self.dsn {
            return Ok(dsn.clone());
        }
        let source_type = self.resolved_type()?;

        if source_type == SourceType::Sqlite {
            let database = self.database.as_deref().unwrap_or_default();
            if database == ":memory:" {
                return Ok("sqlite:///:memory:".into());
            }
            return Ok(format!("sqlite:///{}", database.trim_start_matches('/')));
        }

        let host = self.host.as_deref().unwrap_or("localhost");
        let port = self
            .port
            .or_else(|| source_type.default_port())
            .unwrap_or(0);
        let mut out = format!("{}://", source_type.scheme());
        if let Some(user) = &self.user {
            out.push_str(user);
            if let Some(password) = &self.password {
                out.push(':');
                out.push_str(password);
            }
            out.push('@');
        }
        out.push_str(&format!("{}:{}", host, port));
        if let Some(database) = &self.database {
            if !database.is_empty() {
                out.push('/');
                out.push_str(database);
            }
        }
        if let Some(pattern) = &self.index_pattern {
            out.push_str(&format!("?index_pattern={}", pattern));
        }
        Ok(out)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs.unwrap_or(30))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// SSH tunnel settings for one source.
#[derive(Clone, Deserialize)]
pub struct SshTunnelSettings {
    pub ssh_host: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    pub ssh_user: Option<String>,
    pub ssh_password: Option<String>,
    pub ssh_key: Option<PathBuf>,
    pub ssh_passphrase: Option<String>,
    /// Comma-separated jump chain, `[user@]host[:port]` per hop
    pub proxy_jump: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

impl std::fmt::Debug for SshTunnelSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTunnelSettings")
            .field("ssh_host", &self.ssh_host)
            .field("ssh_port", &self.ssh_port)
            .field("ssh_user", &self.ssh_user)
            .field("ssh_password", &self.ssh_password.as_ref().map(|_| "[REDACTED]"))
            .field("ssh_key", &self.ssh_key)
            .field("ssh_passphrase", &self.ssh_passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("proxy_jump", &self.proxy_jump)
            .finish()
    }
}

impl SshTunnelSettings {
    pub fn validate(&self, source_id: &str) -> Result<(), GatewayError> {
        if self.ssh_host.trim().is_empty() {
            return Err(GatewayError::Config(format!(
                "source '{}': ssh_host cannot be empty",
                source_id
            )));
        }
        match (&self.ssh_password, &self.ssh_key) {
            (Some(_), Some(_)) => Err(GatewayError::Config(format!(
                "source '{}': set exactly one of ssh_password / ssh_key, not both",
                source_id
            ))),
            (None, None) => {
                // A default identity or ssh_config entry may still apply;
                // checked again when the tunnel is built.
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Expand these settings into the hop chain for [`TunnelSpec`],
    /// resolving ssh_config aliases and default identities.
    pub fn tunnel_spec(
        &self,
        target_host: &str,
        target_port: u16,
        connect_timeout: Duration,
    ) -> Result<TunnelSpec, GatewayError> {
        let mut host = self.ssh_host.clone();
        let mut port = self.ssh_port;
        let mut user = self.ssh_user.clone();
        let mut identity = self.ssh_key.clone();
        let mut proxy_jump = self.proxy_jump.clone();

        if ssh::looks_like_alias(&host) {
            if let Some(resolved) = ssh::resolve_alias(&host) {
                if let Some(h) = resolved.host_name {
                    host = h;
                }
                if let Some(p) = resolved.port {
                    port = p;
                }
                if user.is_none() {
                    user = resolved.user;
                }
                if identity.is_none() && self.ssh_password.is_none() {
                    identity = resolved.identity_file;
                }
                if proxy_jump.is_none() {
                    proxy_jump = resolved.proxy_jump;
                }
            }
        }

        let user = user.ok_or_else(|| {
            GatewayError::Config("ssh_user is required (not found in ssh_config either)".into())
        })?;

        let auth = match (&self.ssh_password, identity) {
            (Some(password), _) => SshAuth::Password(password.clone()),
            (None, Some(path)) => SshAuth::Key {
                path,
                passphrase: self.ssh_passphrase.clone(),
            },
            (None, None) => match ssh::default_identity_file() {
                Some(path) => SshAuth::Key {
                    path,
                    passphrase: self.ssh_passphrase.clone(),
                },
                None => {
                    return Err(GatewayError::Config(
                        "no SSH auth material: set ssh_password or ssh_key, or provide a \
                         default identity under ~/.ssh"
                            .into(),
                    ));
                }
            },
        };

        let mut hops = Vec::new();
        if let Some(chain) = proxy_jump {
            for segment in chain.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                hops.push(parse_jump_hop(segment, &user, &auth)?);
            }
        }
        hops.push(SshHop {
            host,
            port,
            user,
            auth,
        });

        Ok(TunnelSpec {
            hops,
            target_host: target_host.to_string(),
            target_port,
            connect_timeout,
        })
    }
}

/// `[user@]host[:port]` jump segment. Jump hops reuse the main hop's
/// credentials unless the segment names its own user.
fn parse_jump_hop(segment: &str, default_user: &str, auth: &SshAuth) -> Result<SshHop, GatewayError> {
    let (user, hostport) = match segment.split_once('@') {
        Some((u, rest)) => (u.to_string(), rest),
        None => (default_user.to_string(), segment),
    };
    let (host, port) = match hostport.rsplit_once(':') {
        Some((h, p)) => {
            let port: u16 = p.parse().map_err(|_| {
                GatewayError::Config(format!("invalid port in proxy_jump segment '{}'", segment))
            })?;
            (h.to_string(), port)
        }
        None => (hostport.to_string(), 22),
    };
    if host.is_empty() {
        return Err(GatewayError::Config(format!(
            "empty host in proxy_jump segment '{}'",
            segment
        )));
    }
    Ok(SshHop {
        host,
        port,
        user,
        auth: auth.clone(),
    })
}

/// User-defined SQL tool definition.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomToolConfig {
    pub name: String,
    pub description: String,
    /// Bound source id
    pub source: String,
    /// SQL with dialect-style placeholders
    pub statement: String,
    #[serde(default)]
    pub parameters: Vec<ToolParamSpec>,
}
