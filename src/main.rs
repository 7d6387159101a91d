// Multi-database gateway binary.
//
// Sources come from a TOML config file (--config), a single DSN (--dsn or
// DATABASE_DSN), or the built-in demo dataset (--demo). Tools are served
// over MCP stdio; the optional introspection HTTP API runs alongside.

use std::sync::Arc;

use anyhow::{Context, Result};

use dbgateway::config::{GatewayConfig, SourceConfig};
use dbgateway::connectors::default_registry;
use dbgateway::http_api::{self, ApiState};
use dbgateway::requests::RequestStore;
use dbgateway::server;
use dbgateway::source::SourceManager;
use dbgateway::tools::ToolRegistry;

const DEMO_INIT_SCRIPT: &str = "\
CREATE TABLE employees (
    emp_no INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    department TEXT NOT NULL,
    salary REAL NOT NULL
);
INSERT INTO employees (emp_no, name, department, salary) VALUES
    (1, 'Ada Lovelace', 'engineering', 98000),
    (2, 'Grace Hopper', 'engineering', 102000),
    (3, 'Edsger Dijkstra', 'research', 95000),
    (4, 'Barbara Liskov', 'research', 99000),
    (5, 'Margaret Hamilton', 'engineering', 101000);";

struct CliArgs {
    config_path: Option<String>,
    dsn: Option<String>,
    demo: bool,
    readonly: bool,
    http_port: Option<u16>,
}

fn parse_args() -> Result<CliArgs> {
    let mut args = CliArgs {
        config_path: None,
        dsn: None,
        demo: false,
        readonly: false,
        http_port: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                args.config_path = Some(
                    iter.next()
                        .context("--config requires a file path")?,
                );
            }
            "--dsn" => {
                args.dsn = Some(iter.next().context("--dsn requires a connection string")?);
            }
            "--demo" => args.demo = true,
            "--readonly" => args.readonly = true,
            "--port" => {
                args.http_port = Some(
                    iter.next()
                        .context("--port requires a port number")?
                        .parse()
                        .context("--port must be a valid port")?,
                );
            }
            "--help" | "-h" => {
                eprintln!(
                    "usage: dbgateway [--config FILE | --dsn DSN | --demo] \
                     [--readonly] [--port HTTP_PORT]"
                );
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument '{}'", other),
        }
    }
    Ok(args)
}

fn build_config(args: &CliArgs) -> Result<GatewayConfig> {
    if let Some(path) = &args.config_path {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path))?;
        let mut config = GatewayConfig::from_toml(&text)?;
        if args.readonly {
            for source in &mut config.sources {
                source.readonly = true;
            }
        }
        return Ok(config);
    }

    let dsn = args
        .dsn
        .clone()
        .or_else(|| std::env::var("DATABASE_DSN").ok());

    let source = match (&dsn, args.demo) {
        (Some(dsn), _) => SourceConfig {
            id: "main".into(),
            dsn: Some(dsn.clone()),
            readonly: args.readonly,
            ..Default::default()
        },
        (None, demo) => {
            if !demo {
                log::info!("no --config, --dsn or DATABASE_DSN; starting demo dataset");
            }
            SourceConfig {
                id: "demo".into(),
                source_type: Some(dbgateway::types::SourceType::Sqlite),
                database: Some(":memory:".into()),
                readonly: args.readonly,
                init_script: Some(DEMO_INIT_SCRIPT.into()),
                ..Default::default()
            }
        }
    };

    Ok(GatewayConfig {
        sources: vec![source],
        ..Default::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;
    let config = build_config(&args)?;

    let registry = default_registry();
    let manager = Arc::new(
        SourceManager::initialize(&config, &registry)
            .await
            .context("source initialization failed")?,
    );
    log::info!(
        "{} source(s) ready: {}",
        manager.source_ids().len(),
        manager.source_ids().join(", ")
    );

    let requests = Arc::new(RequestStore::default());
    let tools = Arc::new(
        ToolRegistry::build(manager.clone(), requests.clone(), &config.custom_tools)
            .context("tool registration failed")?,
    );
    log::info!("{} tool(s) registered", tools.tools().len());

    // Optional read-only HTTP API for the UI
    let http_listen = args
        .http_port
        .map(|p| format!("127.0.0.1:{}", p))
        .or_else(|| config.http_listen.clone());
    if let Some(listen) = http_listen {
        let state = Arc::new(ApiState {
            manager: manager.clone(),
            tools: tools.clone(),
            requests: requests.clone(),
        });
        tokio::spawn(async move {
            if let Err(e) = http_api::serve(state, &listen).await {
                log::error!("introspection API failed: {}", e);
            }
        });
    }

    let served = server::serve_stdio(tools).await;
    manager.shutdown().await;
    served
}
