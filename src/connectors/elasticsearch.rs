//! Elasticsearch connector
//!
//! Speaks the HTTP `_search` API. Queries arrive either as a JSON object
//! `{index?, query?, aggs?, size?}` or in a simplified `index:logs
//! status:error` form that compiles to a bool/term query.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Connector, ConnectorConfig};
use crate::error::GatewayError;
use crate::types::{
    ExecuteOptions, SourceType, SqlResult, StoredProcedure, TableColumn, TableIndex,
};

const DEFAULT_SIZE: u64 = 10;

pub struct ElasticsearchConnector {
    client: Option<reqwest::Client>,
    base_url: Option<String>,
    auth: Option<(String, String)>,
    index_pattern: String,
    safe_dsn: Option<String>,
}

impl ElasticsearchConnector {
    pub fn prototype() -> Self {
        Self {
            client: None,
            base_url: None,
            auth: None,
            index_pattern: "*".to_string(),
            safe_dsn: None,
        }
    }

    fn client(&self) -> Result<(&reqwest::Client, &str), GatewayError> {
        match (&self.client, &self.base_url) {
            (Some(client), Some(base)) => Ok((client, base.as_str())),
            _ => Err(GatewayError::NotConnected(format!(
                "Elasticsearch connector has no live client{}",
                self.safe_dsn
                    .as_deref()
                    .map(|d| format!(" ({})", d))
                    .unwrap_or_default()
            ))),
        }
    }

    async fn request(&self, method: reqwest::Method, path: &str, body: Option<&Value>) -> Result<Value, GatewayError> {
        let (client, base) = self.client()?;
        let mut request = client.request(method, format!("{}{}", base, path));
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::ExecutionError(format!("elasticsearch request failed: {}", e)))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::ExecutionError(format!("invalid elasticsearch response: {}", e)))?;
        if !status.is_success() {
            let reason = payload
                .pointer("/error/reason")
                .and_then(Value::as_str)
                .unwrap_or("request rejected");
            return Err(GatewayError::ExecutionError(format!(
                "elasticsearch {}: {}",
                status, reason
            )));
        }
        Ok(payload)
    }

    async fn search(
        &self,
        index: &str,
        body: Value,
    ) -> Result<Value, GatewayError> {
        let raw = self
            .request(
                reqwest::Method::POST,
                &format!("/{}/_search", index),
                Some(&body),
            )
            .await?;
        Ok(shape_search_response(&raw))
    }
}

#[async_trait]
impl Connector for ElasticsearchConnector {
    fn id(&self) -> &'static str {
        "elasticsearch"
    }

    fn name(&self) -> &'static str {
        "Elasticsearch"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Elasticsearch
    }

    fn clone_boxed(&self) -> Box<dyn Connector> {
        Box::new(Self::prototype())
    }

    async fn connect(
        &mut self,
        dsn: &str,
        _init_script: Option<&str>,
        config: &ConnectorConfig,
    ) -> Result<(), GatewayError> {
        let info = self.dsn_parser().parse(dsn)?;
        self.safe_dsn = Some(info.to_safe_dsn());

        let scheme = if matches!(
            info.tls_mode,
            crate::dsn::TlsMode::Require | crate::dsn::TlsMode::VerifyCa | crate::dsn::TlsMode::VerifyFull
        ) {
            "https"
        } else {
            "http"
        };
        let port = info.port.unwrap_or(9200);
        self.base_url = Some(format!("{}://{}:{}", scheme, info.host, port));
        self.auth = match (&info.username, &info.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };
        self.index_pattern = config
            .index_pattern
            .clone()
            .or_else(|| info.query_params.get("index_pattern").cloned())
            .unwrap_or_else(|| "*".to_string());

        self.client = Some(
            reqwest::Client::builder()
                .connect_timeout(config.connect_timeout)
                .build()
                .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?,
        );

        // Cluster liveness probe
        let health = self.request(reqwest::Method::GET, "/", None).await?;
        let cluster = health
            .pointer("/cluster_name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        log::info!(
            "connected Elasticsearch cluster '{}' ({})",
            cluster,
            self.safe_dsn.as_deref().unwrap_or_default()
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn get_schemas(&self) -> Result<Vec<String>, GatewayError> {
        Ok(Vec::new())
    }

    /// Indices stand in for tables.
    async fn get_tables(&self, _schema: Option<&str>) -> Result<Vec<String>, GatewayError> {
        let raw = self
            .request(reqwest::Method::GET, "/_cat/indices?format=json", None)
            .await?;
        let mut names: Vec<String> = raw
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.get("index").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn get_table_columns(
        &self,
        table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<TableColumn>, GatewayError> {
        // Index mappings map onto the column contract well enough for
        // discovery purposes
        let raw = self
            .request(reqwest::Method::GET, &format!("/{}/_mapping", table), None)
            .await?;
        let mut columns = Vec::new();
        if let Some(properties) = raw
            .pointer(&format!("/{}/mappings/properties", table))
            .and_then(Value::as_object)
        {
            for (field, spec) in properties {
                columns.push(TableColumn {
                    column_name: field.clone(),
                    data_type: spec
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("object")
                        .to_string(),
                    is_nullable: "YES".to_string(),
                    column_default: None,
                });
            }
        }
        columns.sort_by(|a, b| a.column_name.cmp(&b.column_name));
        Ok(columns)
    }

    async fn get_table_indexes(
        &self,
        _table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<TableIndex>, GatewayError> {
        Err(GatewayError::UnsupportedDatabase(
            "Elasticsearch exposes no secondary index metadata".into(),
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
            "Elasticsearch has no stored procedures ('{}')",
            name
        )))
    }

    /// Query text submitted via the SQL path is handled like a command.
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
        let parsed = parse_query(command, &self.index_pattern)?;
        let mut size = parsed.size.unwrap_or(DEFAULT_SIZE);
        if let Some(cap) = options.max_rows {
            size = size.min(cap as u64);
        }

        let mut body = json!({
            "query": parsed.query,
            "size": size,
        });
        if let Some(aggs) = parsed.aggs {
            body["aggs"] = aggs;
        }
        self.search(&parsed.index, body).await
    }
}

struct ParsedQuery {
    index: String,
    query: Value,
    aggs: Option<Value>,
    size: Option<u64>,
}

/// Accepts either the JSON form or the simplified `index:logs field:value
/// free text` form.
fn parse_query(input: &str, default_index: &str) -> Result<ParsedQuery, GatewayError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(ParsedQuery {
            index: default_index.to_string(),
            query: json!({"match_all": {}}),
            aggs: None,
            size: None,
        });
    }

    if trimmed.starts_with('{') {
        let value: Value = serde_json::from_str(trimmed).map_err(|e| {
            GatewayError::InvalidArgument(format!("invalid elasticsearch query JSON: {}", e))
        })?;
        let object = value.as_object().ok_or_else(|| {
            GatewayError::InvalidArgument("elasticsearch query must be a JSON object".into())
        })?;
        return Ok(ParsedQuery {
            index: object
                .get("index")
                .and_then(Value::as_str)
                .unwrap_or(default_index)
                .to_string(),
            query: object
                .get("query")
                .cloned()
                .unwrap_or_else(|| json!({"match_all": {}})),
            aggs: object.get("aggs").cloned(),
            size: object.get("size").and_then(Value::as_u64),
        });
    }

    // Simplified syntax: `index:logs status:error level:warn free text`
    let mut index = default_index.to_string();
    let mut terms = Vec::new();
    let mut free_text = Vec::new();
    for token in trimmed.split_whitespace() {
        match token.split_once(':') {
            Some(("index", value)) if !value.is_empty() => index = value.to_string(),
            Some((field, value)) if !field.is_empty() && !value.is_empty() => {
                terms.push(json!({"match": {field: value}}));
            }
            _ => free_text.push(token),
        }
    }
    if !free_text.is_empty() {
        terms.push(json!({"query_string": {"query": free_text.join(" ")}}));
    }
    let query = match terms.len() {
        0 => json!({"match_all": {}}),
        1 => terms.remove(0),
        _ => json!({"bool": {"must": terms}}),
    };
    Ok(ParsedQuery {
        index,
        query,
        aggs: None,
        size: None,
    })
}

/// Flatten the raw `_search` response into the gateway's stable shape:
/// `{hits: {total, documents[]}, aggregations?}` with `_id` and `_score`
/// merged into each document.
fn shape_search_response(raw: &Value) -> Value {
    let total = raw
        .pointer("/hits/total/value")
        .and_then(Value::as_u64)
        .or_else(|| raw.pointer("/hits/total").and_then(Value::as_u64))
        .unwrap_or(0);

    let documents: Vec<Value> = raw
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| {
                    let mut doc = hit
                        .get("_source")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                    if let Some(id) = hit.get("_id") {
                        doc.insert("_id".to_string(), id.clone());
                    }
                    if let Some(score) = hit.get("_score") {
                        doc.insert("_score".to_string(), score.clone());
                    }
                    Value::Object(doc)
                })
                .collect()
        })
        .unwrap_or_default();

    let mut out = json!({
        "hits": {
            "total": total,
            "documents": documents,
        }
    });
    if let Some(aggregations) = raw.get("aggregations") {
        out["aggregations"] = aggregations.clone();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_query() {
        let parsed = parse_query(
            r#"{"index": "logs", "query": {"match": {"status": "error"}}, "size": 5}"#,
            "*",
        )
        .unwrap();
        assert_eq!(parsed.index, "logs");
        assert_eq!(parsed.size, Some(5));
        assert_eq!(parsed.query["match"]["status"], "error");
    }

    #[test]
    fn test_parse_defaults() {
        let parsed = parse_query("{}", "logs-*").unwrap();
        assert_eq!(parsed.index, "logs-*");
        assert!(parsed.query.get("match_all").is_some());
        assert_eq!(parsed.size, None);
    }

    #[test]
    fn test_parse_simplified_syntax() {
        let parsed = parse_query("index:logs status:error", "*").unwrap();
        assert_eq!(parsed.index, "logs");
        assert_eq!(parsed.query["match"]["status"], "error");

        let parsed = parse_query("index:logs status:error level:warn", "*").unwrap();
        assert_eq!(parsed.query["bool"]["must"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_parse_rejects_bad_json() {
        assert!(parse_query("{not json", "*").is_err());
        assert!(parse_query("[1,2]", "*").is_err());
    }

    #[test]
    fn test_shape_response() {
        let raw = json!({
            "hits": {
                "total": {"value": 2},
                "hits": [
                    {"_id": "a", "_score": 1.5, "_source": {"status": "error"}},
                    {"_id": "b", "_score": 0.5, "_source": {"status": "warn"}}
                ]
            },
            "aggregations": {"by_status": {"buckets": []}}
        });
        let shaped = shape_search_response(&raw);
        assert_eq!(shaped["hits"]["total"], 2);
        assert_eq!(shaped["hits"]["documents"][0]["_id"], "a");
        assert_eq!(shaped["hits"]["documents"][0]["status"], "error");
        assert!(shaped["aggregations"].get("by_status").is_some());
    }

    #[test]
    fn test_shape_response_es6_total() {
        let raw = json!({"hits": {"total": 7, "hits": []}});
        let shaped = shape_search_response(&raw);
        assert_eq!(shaped["hits"]["total"], 7);
    }
}
