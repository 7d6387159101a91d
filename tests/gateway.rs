//! End-to-end scenarios against in-memory SQLite sources

use std::sync::Arc;

use serde_json::json;

use dbgateway::config::{GatewayConfig, SourceConfig};
use dbgateway::connectors::default_registry;
use dbgateway::requests::{RequestFilter, RequestStore, STDIO_CLIENT};
use dbgateway::source::SourceManager;
use dbgateway::tools::ToolRegistry;
use dbgateway::types::SourceType;

fn sqlite_source(id: &str, readonly: bool, init_script: Option<&str>) -> SourceConfig {
    SourceConfig {
        id: id.into(),
        source_type: Some(SourceType::Sqlite),
        database: Some(":memory:".into()),
        readonly,
        init_script: init_script.map(str::to_string),
        ..Default::default()
    }
}

async fn gateway(
    sources: Vec<SourceConfig>,
) -> (Arc<SourceManager>, Arc<ToolRegistry>, Arc<RequestStore>) {
    let registry = default_registry();
    let config = GatewayConfig {
        sources,
        ..Default::default()
    };
    let manager = Arc::new(
        SourceManager::initialize(&config, &registry)
            .await
            .expect("sources should connect"),
    );
    let requests = Arc::new(RequestStore::default());
    let tools = Arc::new(
        ToolRegistry::build(manager.clone(), requests.clone(), &[])
            .expect("tools should register"),
    );
    (manager, tools, requests)
}

const EMPLOYEES: &str = "\
CREATE TABLE employees (emp_no INTEGER PRIMARY KEY, name TEXT NOT NULL, salary REAL);
INSERT INTO employees (emp_no, name, salary) VALUES
    (1, 'Ada', 98000), (2, 'Grace', 102000), (3, 'Edsger', 95000);";

// Readonly violation: the connector must never be reached, and the
// failure must carry the source id and the READONLY_VIOLATION code.
#[tokio::test]
async fn readonly_source_rejects_writes() {
    let (manager, tools, requests) =
        gateway(vec![sqlite_source("prod_db", true, Some(EMPLOYEES))]).await;

    let response = tools
        .dispatch("execute_sql", json!({"sql": "DROP TABLE employees"}), STDIO_CLIENT)
        .await;
    assert_eq!(response.is_error, Some(true));
    let payload = response.payload().unwrap();
    assert_eq!(payload["success"], false);
    assert_eq!(payload["code"], "READONLY_VIOLATION");
    assert!(payload["error"].as_str().unwrap().contains("prod_db"));

    // The table must still exist: the statement never executed
    let check = tools
        .dispatch(
            "execute_sql",
            json!({"sql": "SELECT count(*) AS n FROM employees"}),
            STDIO_CLIENT,
        )
        .await;
    let payload = check.payload().unwrap();
    assert_eq!(payload["data"]["statements"][0]["rows"][0]["n"], 3);

    let failures = requests.list(&RequestFilter {
        only_failures: true,
        ..Default::default()
    });
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].tool_name, "execute_sql");
    manager.shutdown().await;
}

// Multi-source isolation: a table created in source `a` is invisible to
// source `b`, and the same query fails there with EXECUTION_ERROR.
#[tokio::test]
async fn sources_are_isolated() {
    let (manager, tools, _) = gateway(vec![
        sqlite_source("a", false, Some(EMPLOYEES)),
        sqlite_source("b", false, None),
    ])
    .await;

    let ok = tools
        .dispatch(
            "execute_sql",
            json!({"sql": "SELECT name FROM employees ORDER BY emp_no"}),
            STDIO_CLIENT,
        )
        .await;
    let payload = ok.payload().unwrap();
    assert_eq!(payload["success"], true);
    assert_eq!(payload["data"]["source_id"], "a");
    assert_eq!(payload["data"]["statements"][0]["count"], 3);

    let missing = tools
        .dispatch(
            "execute_sql_b",
            json!({"sql": "SELECT name FROM employees"}),
            STDIO_CLIENT,
        )
        .await;
    assert_eq!(missing.is_error, Some(true));
    let payload = missing.payload().unwrap();
    assert_eq!(payload["code"], "EXECUTION_ERROR");
    manager.shutdown().await;
}

// Per-statement results survive multi-statement execution.
#[tokio::test]
async fn multi_statement_counts_are_per_statement() {
    let (manager, tools, _) = gateway(vec![sqlite_source("main", false, None)]).await;

    let response = tools
        .dispatch(
            "execute_sql",
            json!({"sql": "CREATE TABLE t (a INTEGER); \
                   INSERT INTO t VALUES (1); INSERT INTO t VALUES (2); \
                   SELECT a FROM t ORDER BY a"}),
            STDIO_CLIENT,
        )
        .await;
    let payload = response.payload().unwrap();
    assert_eq!(payload["success"], true, "{:?}", payload);
    let statements = payload["data"]["statements"].as_array().unwrap();
    assert_eq!(statements.len(), 4);
    assert_eq!(statements[1]["count"], 1);
    assert_eq!(statements[3]["count"], 2);
    assert_eq!(statements[3]["rows"][1]["a"], 2);
    assert!(statements[3]["sql"].as_str().unwrap().starts_with("SELECT"));
    manager.shutdown().await;
}

// max_rows is a clamp applied before execution.
#[tokio::test]
async fn max_rows_caps_selects() {
    let mut source = sqlite_source("capped", false, Some(EMPLOYEES));
    source.max_rows = Some(2);
    let (manager, tools, _) = gateway(vec![source]).await;

    let response = tools
        .dispatch(
            "execute_sql",
            json!({"sql": "SELECT name FROM employees ORDER BY emp_no"}),
            STDIO_CLIENT,
        )
        .await;
    let payload = response.payload().unwrap();
    assert_eq!(payload["data"]["statements"][0]["count"], 2);

    // An existing smaller limit is kept
    let response = tools
        .dispatch(
            "execute_sql",
            json!({"sql": "SELECT name FROM employees LIMIT 1"}),
            STDIO_CLIENT,
        )
        .await;
    let payload = response.payload().unwrap();
    assert_eq!(payload["data"]["statements"][0]["count"], 1);
    manager.shutdown().await;
}

// search_objects over a live source: tables, columns, indexes.
#[tokio::test]
async fn search_objects_discovers_schema() {
    let init = "CREATE TABLE employees (emp_no INTEGER PRIMARY KEY, name TEXT NOT NULL);\n\
                CREATE TABLE departments (dept_no INTEGER PRIMARY KEY, dept_name TEXT);\n\
                CREATE UNIQUE INDEX idx_emp_name ON employees(name);";
    let (manager, tools, _) = gateway(vec![sqlite_source("main", false, Some(init))]).await;

    let response = tools
        .dispatch(
            "search_objects",
            json!({"object_type": "table", "pattern": "emp%"}),
            STDIO_CLIENT,
        )
        .await;
    let payload = response.payload().unwrap();
    let tables = payload["data"]["results"]["tables"].as_array().unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0], "employees");

    let response = tools
        .dispatch(
            "search_objects",
            json!({"object_type": "column", "pattern": "%name%", "detail_level": "full"}),
            STDIO_CLIENT,
        )
        .await;
    let payload = response.payload().unwrap();
    let columns = payload["data"]["results"]["columns"].as_array().unwrap();
    assert!(columns.iter().any(|c| c["column"] == "name"));
    assert!(columns.iter().any(|c| c["column"] == "dept_name"));

    let response = tools
        .dispatch(
            "search_objects",
            json!({"object_type": "index", "pattern": "idx%"}),
            STDIO_CLIENT,
        )
        .await;
    let payload = response.payload().unwrap();
    let indexes = payload["data"]["results"]["indexes"].as_array().unwrap();
    assert_eq!(indexes[0]["index_name"], "idx_emp_name");
    assert_eq!(indexes[0]["is_unique"], true);
    manager.shutdown().await;
}

// A readonly source still answers reads, including PRAGMA on SQLite.
#[tokio::test]
async fn readonly_source_allows_reads() {
    let (manager, tools, _) =
        gateway(vec![sqlite_source("ro", true, Some(EMPLOYEES))]).await;

    for sql in [
        "SELECT name FROM employees WHERE salary > 96000",
        "EXPLAIN SELECT * FROM employees",
        "PRAGMA table_info(employees)",
        "-- just a comment",
    ] {
        let response = tools
            .dispatch("execute_sql", json!({"sql": sql}), STDIO_CLIENT)
            .await;
        assert!(
            response.is_error.is_none(),
            "expected success for {:?}: {:?}",
            sql,
            response.payload()
        );
    }
    manager.shutdown().await;
}

// Unknown source ids surface as SOURCE_NOT_FOUND via the suffixed tool
// namespace (the tool for a configured source exists; an unconfigured
// suffix is simply an unknown tool).
#[tokio::test]
async fn request_log_attributes_clients() {
    let (manager, tools, requests) =
        gateway(vec![sqlite_source("main", false, Some(EMPLOYEES))]).await;

    tools
        .dispatch(
            "execute_sql",
            json!({"sql": "SELECT 1"}),
            "mcp-inspector/0.4",
        )
        .await;
    tools
        .dispatch("execute_sql", json!({"sql": "SELECT 2"}), STDIO_CLIENT)
        .await;

    let records = requests.list(&RequestFilter::default());
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].client, STDIO_CLIENT);
    assert_eq!(records[1].client, "mcp-inspector/0.4");
    assert!(records.iter().all(|r| r.source_id == "main"));
    manager.shutdown().await;
}
