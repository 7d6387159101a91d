//! Redis connector
//!
//! Commands arrive as one whitespace-tokenized line (`HSET user:2 name
//! Bob`) and are dispatched through the redis client. All client traffic
//! is serialized through a mutex and runs on the blocking pool, keeping
//! the protocol handling on one connection.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Connector, ConnectorConfig};
use crate::error::GatewayError;
use crate::types::{
    ExecuteOptions, SourceType, SqlResult, StoredProcedure, TableColumn, TableIndex,
};

pub struct RedisConnector {
    conn: Option<Arc<Mutex<redis::Connection>>>,
    safe_dsn: Option<String>,
}

impl RedisConnector {
    pub fn prototype() -> Self {
        Self {
            conn: None,
            safe_dsn: None,
        }
    }

    fn shared_conn(&self) -> Result<Arc<Mutex<redis::Connection>>, GatewayError> {
        self.conn.clone().ok_or_else(|| {
            GatewayError::NotConnected(format!(
                "Redis connector has no live connection{}",
                self.safe_dsn
                    .as_deref()
                    .map(|d| format!(" ({})", d))
                    .unwrap_or_default()
            ))
        })
    }

    /// Run one raw command on the blocking pool.
    async fn run_command(&self, tokens: Vec<String>) -> Result<redis::Value, GatewayError> {
        let conn = self.shared_conn()?;
        tokio::task::spawn_blocking(move || -> Result<redis::Value, GatewayError> {
            let mut guard = conn
                .lock()
                .map_err(|_| GatewayError::ExecutionError("redis connection poisoned".into()))?;
            let mut cmd = redis::cmd(&tokens[0]);
            for arg in &tokens[1..] {
                cmd.arg(arg);
            }
            cmd.query::<redis::Value>(&mut *guard)
                .map_err(|e| GatewayError::ExecutionError(e.to_string()))
        })
        .await
        .map_err(|e| GatewayError::ExecutionError(format!("redis task panicked: {}", e)))?
    }
}

#[async_trait]
impl Connector for RedisConnector {
    fn id(&self) -> &'static str {
        "redis"
    }

    fn name(&self) -> &'static str {
        "Redis"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Redis
    }

    fn clone_boxed(&self) -> Box<dyn Connector> {
        Box::new(Self::prototype())
    }

    async fn connect(
        &mut self,
        dsn: &str,
        init_script: Option<&str>,
        config: &ConnectorConfig,
    ) -> Result<(), GatewayError> {
        let info = self.dsn_parser().parse(dsn)?;
        self.safe_dsn = Some(info.to_safe_dsn());

        let scheme = if info.scheme == "rediss" { "rediss" } else { "redis" };
        let host = info.host.clone();
        let port = info.port.unwrap_or(6379);
        let username = info.username.clone();
        let password = info.password.clone();
        let db_index: Option<u32> = info.database.parse().ok();
        let uri = format!("{}://{}:{}/", scheme, host, port);

        let connect = tokio::task::spawn_blocking(
            move || -> Result<redis::Connection, GatewayError> {
                let client = redis::Client::open(uri.as_str())
                    .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?;
                let mut connection = client
                    .get_connection()
                    .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?;

                if let Some(password) = &password {
                    let mut cmd = redis::cmd("AUTH");
                    if let Some(user) = &username {
                        cmd.arg(user);
                    }
                    cmd.arg(password);
                    cmd.query::<()>(&mut connection)
                        .map_err(|e| GatewayError::AuthFailed(e.to_string()))?;
                }
                if let Some(db) = db_index {
                    redis::cmd("SELECT")
                        .arg(db)
                        .query::<()>(&mut connection)
                        .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?;
                }
                redis::cmd("PING")
                    .query::<String>(&mut connection)
                    .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?;
                Ok(connection)
            },
        );

        let connection = tokio::time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| {
                GatewayError::ConnectionFailed(format!(
                    "redis connect timed out after {:?}",
                    config.connect_timeout
                ))
            })?
            .map_err(|e| GatewayError::ConnectionFailed(format!("connect task panicked: {}", e)))??;

        self.conn = Some(Arc::new(Mutex::new(connection)));

        if let Some(script) = init_script {
            for line in script.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let tokens = tokenize_command(line)?;
                self.run_command(tokens).await?;
            }
        }

        log::info!("connected Redis ({})", self.safe_dsn.as_deref().unwrap_or_default());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        // Dropping the connection closes the socket; nothing to flush.
        Ok(())
    }

    async fn get_schemas(&self) -> Result<Vec<String>, GatewayError> {
        // Databases are numeric; report the active one
        Ok(vec!["0".to_string()])
    }

    async fn get_tables(&self, _schema: Option<&str>) -> Result<Vec<String>, GatewayError> {
        let value = self
            .run_command(vec!["KEYS".to_string(), "*".to_string()])
            .await?;
        let mut keys: Vec<String> = match redis_to_json(&value) {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        keys.sort();
        keys.truncate(1000);
        Ok(keys)
    }

    async fn get_table_columns(
        &self,
        _table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<TableColumn>, GatewayError> {
        Err(GatewayError::UnsupportedDatabase(
            "Redis keys have no column metadata".into(),
        ))
    }

    async fn get_table_indexes(
        &self,
        _table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<TableIndex>, GatewayError> {
        Err(GatewayError::UnsupportedDatabase(
            "Redis has no indexes".into(),
        ))
    }

    async fn get_stored_procedures(
        &self,
        _schema: Option<&str>,
    ) -> Result<Vec<String>, GatewayError> {
        Ok(Vec::new())
    }

    async fn get_stored_procedure_detail(
        &self,
        name: &str,
        _schema: Option<&str>,
    ) -> Result<StoredProcedure, GatewayError> {
        Err(GatewayError::UnsupportedDatabase(format!(
            "Redis has no stored procedures ('{}')",
            name
        )))
    }

    /// SQL submitted to a Redis source is treated as a command line.
    async fn execute_sql(
        &self,
        sql: &str,
        options: &ExecuteOptions,
    ) -> Result<Vec<SqlResult>, GatewayError> {
        let value = self.execute_command(sql, options).await?;
        Ok(vec![SqlResult {
            rows: vec![value],
            fields: None,
            row_count: 1,
        }])
    }

    async fn execute_command(
        &self,
        command: &str,
        options: &ExecuteOptions,
    ) -> Result<Value, GatewayError> {
        let tokens = tokenize_command(command)?;
        let cmd_name = tokens[0].to_uppercase();

        if options.readonly && !is_read_command(&cmd_name) {
            return Err(GatewayError::ReadOnlyViolation {
                source_id: String::new(),
                allowed: "read commands (GET, HGETALL, LRANGE, SMEMBERS, ZRANGE, KEYS, ...)"
                    .into(),
            });
        }

        let value = self.run_command(tokens).await?;
        let type_label = value_type_label(&cmd_name, &value);
        let mut json_value = redis_to_json(&value);

        // Alternating field/value arrays from hash commands become objects
        if type_label == "hash" {
            if let Value::Array(items) = &json_value {
                if items.len() % 2 == 0 {
                    let mut map = serde_json::Map::new();
                    for pair in items.chunks(2) {
                        if let Some(key) = pair[0].as_str() {
                            map.insert(key.to_string(), pair[1].clone());
                        }
                    }
                    json_value = Value::Object(map);
                }
            }
        }

        // KEYS honors max_rows by truncation
        if cmd_name == "KEYS" {
            if let (Some(cap), Value::Array(items)) = (options.max_rows, &mut json_value) {
                items.truncate(cap);
            }
        }

        Ok(json!({ "value": json_value, "type": type_label }))
    }
}

/// Split a command line on whitespace, honoring single and double quotes.
fn tokenize_command(input: &str) -> Result<Vec<String>, GatewayError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            },
        }
    }
    if quote.is_some() {
        return Err(GatewayError::InvalidArgument(
            "unterminated quote in command".into(),
        ));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    if tokens.is_empty() {
        return Err(GatewayError::InvalidArgument("empty command".into()));
    }
    Ok(tokens)
}

/// Commands allowed on a readonly source.
fn is_read_command(cmd: &str) -> bool {
    matches!(
        cmd,
        "GET" | "MGET" | "EXISTS" | "TTL" | "PTTL" | "TYPE" | "KEYS" | "SCAN" | "STRLEN"
            | "HGET" | "HGETALL" | "HKEYS" | "HVALS" | "HLEN" | "HEXISTS" | "HSCAN"
            | "LRANGE" | "LLEN" | "LINDEX"
            | "SMEMBERS" | "SCARD" | "SISMEMBER" | "SSCAN" | "SRANDMEMBER"
            | "ZRANGE" | "ZRANGEBYSCORE" | "ZCARD" | "ZSCORE" | "ZRANK" | "ZSCAN"
            | "PING" | "ECHO" | "INFO" | "DBSIZE" | "TIME" | "MEMORY"
    )
}

/// Result type reported to the client, keyed off the command semantics
/// with the reply shape as a fallback.
fn value_type_label(cmd: &str, value: &redis::Value) -> &'static str {
    if matches!(value, redis::Value::Nil) {
        return "nil";
    }
    match cmd {
        "HGET" | "HSET" | "HGETALL" | "HDEL" | "HKEYS" | "HVALS" | "HLEN" | "HEXISTS" => "hash",
        "LPUSH" | "RPUSH" | "LRANGE" | "LLEN" | "LPOP" | "RPOP" | "LINDEX" => "list",
        "SADD" | "SREM" | "SMEMBERS" | "SCARD" | "SISMEMBER" | "SRANDMEMBER" => "set",
        "ZADD" | "ZREM" | "ZRANGE" | "ZRANGEBYSCORE" | "ZCARD" | "ZSCORE" | "ZRANK" => "zset",
        "KEYS" | "SCAN" | "MGET" => "list",
        _ => match value {
            redis::Value::Array(_) | redis::Value::Set(_) => "list",
            redis::Value::Map(_) => "hash",
            _ => "string",
        },
    }
}

/// Convert a redis reply into JSON.
fn redis_to_json(value: &redis::Value) -> Value {
    match value {
        redis::Value::Nil => Value::Null,
        redis::Value::Int(i) => json!(i),
        redis::Value::Double(d) => json!(d),
        redis::Value::Boolean(b) => json!(b),
        redis::Value::BulkString(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
        redis::Value::SimpleString(s) => Value::String(s.clone()),
        redis::Value::Okay => Value::String("OK".to_string()),
        redis::Value::Array(items) | redis::Value::Set(items) => {
            Value::Array(items.iter().map(redis_to_json).collect())
        }
        redis::Value::Map(entries) => {
            let mut map = serde_json::Map::new();
            for (k, v) in entries {
                let key = match redis_to_json(k) {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                map.insert(key, redis_to_json(v));
            }
            Value::Object(map)
        }
        other => Value::String(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_plain() {
        let tokens = tokenize_command("HSET user:2 name Bob").unwrap();
        assert_eq!(tokens, vec!["HSET", "user:2", "name", "Bob"]);
    }

    #[test]
    fn test_tokenize_quoted() {
        let tokens = tokenize_command("SET greeting 'hello world'").unwrap();
        assert_eq!(tokens, vec!["SET", "greeting", "hello world"]);
        let tokens = tokenize_command("SET k \"two words\"").unwrap();
        assert_eq!(tokens[2], "two words");
    }

    #[test]
    fn test_tokenize_rejects_bad_input() {
        assert!(tokenize_command("").is_err());
        assert!(tokenize_command("   ").is_err());
        assert!(tokenize_command("SET k 'unterminated").is_err());
    }

    #[test]
    fn test_type_labels() {
        assert_eq!(
            value_type_label("HGETALL", &redis::Value::Array(vec![])),
            "hash"
        );
        assert_eq!(value_type_label("GET", &redis::Value::Nil), "nil");
        assert_eq!(
            value_type_label("LRANGE", &redis::Value::Array(vec![])),
            "list"
        );
        assert_eq!(
            value_type_label("GET", &redis::Value::BulkString(b"x".to_vec())),
            "string"
        );
        assert_eq!(
            value_type_label("ZRANGE", &redis::Value::Array(vec![])),
            "zset"
        );
    }

    #[test]
    fn test_redis_to_json() {
        let value = redis::Value::Array(vec![
            redis::Value::BulkString(b"name".to_vec()),
            redis::Value::BulkString(b"Bob".to_vec()),
        ]);
        assert_eq!(redis_to_json(&value), json!(["name", "Bob"]));
        assert_eq!(redis_to_json(&redis::Value::Okay), json!("OK"));
        assert_eq!(redis_to_json(&redis::Value::Int(7)), json!(7));
    }

    #[test]
    fn test_read_command_gate() {
        assert!(is_read_command("GET"));
        assert!(is_read_command("KEYS"));
        assert!(!is_read_command("SET"));
        assert!(!is_read_command("FLUSHALL"));
        assert!(!is_read_command("DEL"));
    }
}
