//! SSH tunneling for database connections behind bastion hosts
//!
//! A tunnel is a chain of stages, one per SSH hop. Each stage owns its
//! session and a local listener whose connections are forwarded through a
//! direct-tcpip channel; the next hop (or the database driver) connects to
//! that listener. All libssh2 traffic for a session stays on the stage's
//! own thread.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ssh2::Session;

use crate::error::GatewayError;

/// SSH authentication method.
#[derive(Clone)]
pub enum SshAuth {
    Password(String),
    Key {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

impl std::fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SshAuth::Password(_) => write!(f, "Password([REDACTED])"),
            SshAuth::Key { path, .. } => {
                write!(f, "Key {{ path: {:?}, passphrase: [REDACTED] }}", path)
            }
        }
    }
}

/// One SSH server in the chain.
#[derive(Debug, Clone)]
pub struct SshHop {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth: SshAuth,
}

/// Everything needed to establish a tunnel: the hop chain (jump hosts
/// first, destination SSH server last) and the database endpoint as seen
/// from the final hop.
#[derive(Debug, Clone)]
pub struct TunnelSpec {
    pub hops: Vec<SshHop>,
    pub target_host: String,
    pub target_port: u16,
    pub connect_timeout: Duration,
}

/// An established tunnel. Dropping it signals every stage to stop.
pub struct SshTunnel {
    local_port: u16,
    shutdown: Arc<AtomicBool>,
    stages: Vec<TunnelStage>,
}

impl SshTunnel {
    /// Local port the database driver should connect to.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn is_active(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst)
            && self.stages.iter().all(|s| !s.thread_finished())
    }

    /// Stop accepting and tear the chain down.
    pub fn close(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for stage in self.stages.drain(..) {
            stage.join();
        }
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Establish the full chain. Runs the blocking libssh2 work on the
/// blocking pool and bounds it with the configured connect timeout.
pub async fn establish_tunnel(spec: TunnelSpec) -> Result<SshTunnel, GatewayError> {
    let timeout = spec.connect_timeout;
    let established =
        tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || build_chain(spec)))
            .await
            .map_err(|_| {
                GatewayError::TunnelFailed(format!(
                    "SSH tunnel establishment timed out after {:?}",
                    timeout
                ))
            })?
            .map_err(|e| GatewayError::TunnelFailed(format!("tunnel task panicked: {}", e)))??;
    Ok(established)
}

fn build_chain(spec: TunnelSpec) -> Result<SshTunnel, GatewayError> {
    if spec.hops.is_empty() {
        return Err(GatewayError::TunnelFailed("no SSH hops configured".into()));
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut stages: Vec<TunnelStage> = Vec::with_capacity(spec.hops.len());
    let mut dial_port: Option<u16> = None;

    for (index, hop) in spec.hops.iter().enumerate() {
        // Dial the first hop directly; later hops go through the previous
        // stage's listener.
        let (dial_host, port) = match dial_port {
            None => (hop.host.as_str(), hop.port),
            Some(p) => ("127.0.0.1", p),
        };

        let session = match establish_session(dial_host, port, hop) {
            Ok(s) => s,
            Err(e) => {
                // Partial chain teardown before surfacing the error
                shutdown.store(true, Ordering::SeqCst);
                for stage in stages.drain(..) {
                    stage.join();
                }
                return Err(e);
            }
        };

        let (next_host, next_port) = if index + 1 < spec.hops.len() {
            (spec.hops[index + 1].host.clone(), spec.hops[index + 1].port)
        } else {
            (spec.target_host.clone(), spec.target_port)
        };

        let stage = TunnelStage::start(session, next_host, next_port, shutdown.clone())?;
        dial_port = Some(stage.local_port);
        stages.push(stage);
    }

    let local_port = dial_port.unwrap_or(0);
    log::info!(
        "SSH tunnel up: {} hop(s), forwarding 127.0.0.1:{} -> {}:{}",
        stages.len(),
        local_port,
        spec.target_host,
        spec.target_port
    );

    Ok(SshTunnel {
        local_port,
        shutdown,
        stages,
    })
}

/// TCP connect, handshake and authenticate one hop.
fn establish_session(dial_host: &str, port: u16, hop: &SshHop) -> Result<Session, GatewayError> {
    let tcp = TcpStream::connect((dial_host, port)).map_err(|e| {
        GatewayError::TunnelFailed(format!(
            "failed to reach SSH host {}:{}: {}",
            hop.host, hop.port, e
        ))
    })?;
    tcp.set_nodelay(true).ok();

    let mut session = Session::new()
        .map_err(|e| GatewayError::TunnelFailed(format!("failed to create SSH session: {}", e)))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(30_000);
    session
        .handshake()
        .map_err(|e| GatewayError::TunnelFailed(format!("SSH handshake with {} failed: {}", hop.host, e)))?;

    match &hop.auth {
        SshAuth::Password(password) => {
            session.userauth_password(&hop.user, password).map_err(|e| {
                GatewayError::AuthFailed(format!(
                    "SSH password authentication for {}@{} failed: {}",
                    hop.user, hop.host, e
                ))
            })?;
        }
        SshAuth::Key { path, passphrase } => {
            let key_path = resolve_identity_path(path);
            session
                .userauth_pubkey_file(&hop.user, None, &key_path, passphrase.as_deref())
                .map_err(|e| {
                    GatewayError::AuthFailed(format!(
                        "SSH key authentication for {}@{} with {} failed: {}",
                        hop.user,
                        hop.host,
                        key_path.display(),
                        e
                    ))
                })?;
        }
    }

    if !session.authenticated() {
        return Err(GatewayError::AuthFailed(format!(
            "SSH authentication for {}@{} was not accepted",
            hop.user, hop.host
        )));
    }

    Ok(session)
}

/// A listener plus the multiplexing loop forwarding its connections
/// through one SSH session.
struct TunnelStage {
    local_port: u16,
    thread: Option<JoinHandle<()>>,
}

impl TunnelStage {
    fn start(
        session: Session,
        remote_host: String,
        remote_port: u16,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind("127.0.0.1:0").map_err(|e| {
            GatewayError::TunnelFailed(format!("failed to bind local tunnel port: {}", e))
        })?;
        let local_port = listener
            .local_addr()
            .map_err(|e| GatewayError::TunnelFailed(format!("failed to read local address: {}", e)))?
            .port();
        listener.set_nonblocking(true).map_err(|e| {
            GatewayError::TunnelFailed(format!("failed to set listener non-blocking: {}", e))
        })?;

        let thread = thread::spawn(move || {
            run_stage_loop(listener, session, remote_host, remote_port, shutdown);
        });

        Ok(Self {
            local_port,
            thread: Some(thread),
        })
    }

    fn thread_finished(&self) -> bool {
        self.thread.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for TunnelStage {
    fn drop(&mut self) {
        // The shared shutdown flag stops the loop; nothing to join here
        // if close() was skipped.
        if let Some(thread) = self.thread.take() {
            if thread.is_finished() {
                let _ = thread.join();
            }
        }
    }
}

/// One forwarded connection: a client stream paired with an SSH channel.
struct ForwardedConn {
    client: TcpStream,
    channel: ssh2::Channel,
    buf: Vec<u8>,
    closed: bool,
}

impl ForwardedConn {
    fn new(client: TcpStream, channel: ssh2::Channel) -> std::io::Result<Self> {
        client.set_nodelay(true)?;
        client.set_nonblocking(true)?;
        Ok(Self {
            client,
            channel,
            buf: vec![0u8; 16 * 1024],
            closed: false,
        })
    }

    /// Move bytes in both directions; returns true on any progress.
    fn poll(&mut self) -> bool {
        if self.closed {
            return false;
        }
        let mut activity = false;

        match self.client.read(&mut self.buf) {
            Ok(0) => {
                self.closed = true;
                return false;
            }
            Ok(n) => {
                if self.channel.write_all(&self.buf[..n]).is_err() {
                    self.closed = true;
                    return false;
                }
                activity = true;
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(_) => {
                self.closed = true;
                return false;
            }
        }

        match self.channel.read(&mut self.buf) {
            Ok(0) => {
                self.closed = true;
                return false;
            }
            Ok(n) => {
                if self.client.write_all(&self.buf[..n]).is_err() {
                    self.closed = true;
                    return false;
                }
                activity = true;
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(_) => {
                self.closed = true;
                return false;
            }
        }

        activity
    }
}

/// Single-threaded loop multiplexing every connection of one stage, so a
/// session is never touched from two threads.
fn run_stage_loop(
    listener: TcpListener,
    session: Session,
    remote_host: String,
    remote_port: u16,
    shutdown: Arc<AtomicBool>,
) {
    session.set_blocking(false);
    let mut connections: Vec<ForwardedConn> = Vec::new();

    while !shutdown.load(Ordering::SeqCst) {
        let mut activity = false;

        match listener.accept() {
            Ok((client, addr)) => {
                log::debug!("tunnel connection from {}", addr);
                session.set_blocking(true);
                match session.channel_direct_tcpip(&remote_host, remote_port, None) {
                    Ok(channel) => {
                        session.set_blocking(false);
                        match ForwardedConn::new(client, channel) {
                            Ok(conn) => {
                                connections.push(conn);
                                activity = true;
                            }
                            Err(e) => log::error!("tunnel connection setup failed: {}", e),
                        }
                    }
                    Err(e) => {
                        session.set_blocking(false);
                        log::error!(
                            "failed to open channel to {}:{}: {}",
                            remote_host,
                            remote_port,
                            e
                        );
                    }
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => {
                log::error!("tunnel listener error: {}", e);
                break;
            }
        }

        for conn in &mut connections {
            if conn.poll() {
                activity = true;
            }
        }
        connections.retain(|c| !c.closed);

        if !activity {
            thread::sleep(Duration::from_micros(500));
        }
    }

    log::debug!("tunnel stage to {}:{} shut down", remote_host, remote_port);
}

// ---------------------------------------------------------------------------
// ~/.ssh/config alias resolution
// ---------------------------------------------------------------------------

/// Values taken from an ssh_config Host block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSshHost {
    pub host_name: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    pub proxy_jump: Option<String>,
}

/// Whether the configured host looks like an ssh_config alias rather than
/// a hostname or address.
pub fn looks_like_alias(host: &str) -> bool {
    !host.is_empty()
        && !host.contains('.')
        && !host.contains(':')
        && !host.chars().all(|c| c.is_ascii_digit())
}

/// Resolve an alias against `~/.ssh/config`. Returns None when the file
/// is absent or has no matching block.
pub fn resolve_alias(host: &str) -> Option<ResolvedSshHost> {
    let path = dirs::home_dir()?.join(".ssh/config");
    let text = std::fs::read_to_string(path).ok()?;
    resolve_alias_in(&text, host)
}

/// Standard ssh_config semantics for the subset the gateway honors:
/// `Host`, `HostName`, `User`, `Port`, `IdentityFile`, `ProxyJump`.
/// `ProxyCommand` is not supported and is ignored with a warning.
pub fn resolve_alias_in(config_text: &str, host: &str) -> Option<ResolvedSshHost> {
    let mut resolved = ResolvedSshHost::default();
    let mut in_match = false;
    let mut matched_any = false;

    for raw_line in config_text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (keyword, value) = match line.split_once(char::is_whitespace) {
            Some((k, v)) => (k, v.trim().trim_matches('"')),
            None => continue,
        };

        if keyword.eq_ignore_ascii_case("Host") {
            in_match = value
                .split_whitespace()
                .any(|pattern| pattern == host || pattern == "*");
            matched_any |= in_match;
            continue;
        }
        if !in_match {
            continue;
        }

        // First obtained value wins, as in OpenSSH
        if keyword.eq_ignore_ascii_case("HostName") {
            resolved.host_name.get_or_insert_with(|| value.to_string());
        } else if keyword.eq_ignore_ascii_case("User") {
            resolved.user.get_or_insert_with(|| value.to_string());
        } else if keyword.eq_ignore_ascii_case("Port") {
            if resolved.port.is_none() {
                resolved.port = value.parse().ok();
            }
        } else if keyword.eq_ignore_ascii_case("IdentityFile") {
            resolved
                .identity_file
                .get_or_insert_with(|| expand_tilde(Path::new(value)));
        } else if keyword.eq_ignore_ascii_case("ProxyJump") {
            resolved.proxy_jump.get_or_insert_with(|| value.to_string());
        } else if keyword.eq_ignore_ascii_case("ProxyCommand") {
            log::warn!("ProxyCommand in ssh_config is not supported; ignoring");
        }
    }

    matched_any.then_some(resolved)
}

/// Default identity files tried when none is configured, in order.
pub fn default_identity_file() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    for name in ["id_rsa", "id_ed25519", "id_ecdsa", "id_dsa"] {
        let candidate = home.join(".ssh").join(name);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

/// Expand `~` and resolve symlinks on an identity path.
fn resolve_identity_path(path: &Path) -> PathBuf {
    let expanded = expand_tilde(path);
    std::fs::canonicalize(&expanded).unwrap_or(expanded)
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    let Some(home) = dirs::home_dir() else {
        return path.to_path_buf();
    };
    if let Some(stripped) = text.strip_prefix("~/") {
        return home.join(stripped);
    }
    if text == "~" {
        return home;
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_detection() {
        assert!(looks_like_alias("bastion"));
        assert!(!looks_like_alias("bastion.example.com"));
        assert!(!looks_like_alias("10"));
        assert!(!looks_like_alias("::1"));
        assert!(!looks_like_alias(""));
    }

    #[test]
    fn test_ssh_config_resolution() {
        let config = r#"
# corp bastion
Host bastion
    HostName bastion.internal.example.com
    User deploy
    Port 2222
    IdentityFile ~/.ssh/bastion_ed25519
    ProxyJump edge.example.com

Host other
    HostName other.example.com
"#;
        let resolved = resolve_alias_in(config, "bastion").unwrap();
        assert_eq!(
            resolved.host_name.as_deref(),
            Some("bastion.internal.example.com")
        );
        assert_eq!(resolved.user.as_deref(), Some("deploy"));
        assert_eq!(resolved.port, Some(2222));
        assert_eq!(resolved.proxy_jump.as_deref(), Some("edge.example.com"));
        assert!(resolved
            .identity_file
            .as_ref()
            .unwrap()
            .ends_with(".ssh/bastion_ed25519"));

        assert!(resolve_alias_in(config, "absent").is_none());
    }

    #[test]
    fn test_first_value_wins() {
        let config = "Host h\n HostName first\n HostName second\n";
        let resolved = resolve_alias_in(config, "h").unwrap();
        assert_eq!(resolved.host_name.as_deref(), Some("first"));
    }

    #[test]
    fn test_wildcard_block_applies() {
        let config = "Host *\n User shared\n";
        let resolved = resolve_alias_in(config, "anything").unwrap();
        assert_eq!(resolved.user.as_deref(), Some("shared"));
    }

    #[test]
    fn test_auth_debug_redacts() {
        let auth = SshAuth::Password("hunter2".into());
        assert!(!format!("{:?}", auth).contains("hunter2"));
        let auth = SshAuth::Key {
            path: "/k".into(),
            passphrase: Some("hunter2".into()),
        };
        assert!(!format!("{:?}", auth).contains("hunter2"));
    }
}
