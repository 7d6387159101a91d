//! Scheme-to-connector prototype table
//!
//! Built once at startup. Lookup never hands out the prototype itself;
//! callers get a clone so driver state stays per-source.

use super::{Connector, ElasticsearchConnector, RedisConnector, SqlConnector};
use crate::error::GatewayError;
use crate::types::SourceType;

pub struct ConnectorRegistry {
    prototypes: Vec<Box<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            prototypes: Vec::new(),
        }
    }

    pub fn register(&mut self, prototype: Box<dyn Connector>) {
        self.prototypes.push(prototype);
    }

    /// Select by DSN scheme prefix.
    pub fn by_dsn(&self, dsn: &str) -> Option<&dyn Connector> {
        self.prototypes
            .iter()
            .find(|p| p.dsn_parser().matches_scheme(dsn))
            .map(|p| p.as_ref())
    }

    /// Select by connector id (`Connector::id`).
    pub fn get_by_type(&self, source_type: SourceType) -> Option<&dyn Connector> {
        self.prototypes
            .iter()
            .find(|p| p.source_type() == source_type)
            .map(|p| p.as_ref())
    }

    /// Clone a fresh instance for the given DSN.
    pub fn clone_for_dsn(&self, dsn: &str) -> Result<Box<dyn Connector>, GatewayError> {
        self.by_dsn(dsn)
            .map(|p| p.clone_boxed())
            .ok_or_else(|| {
                GatewayError::InvalidDsn(format!(
                    "no connector registered for '{}'",
                    crate::dsn::redact(dsn)
                ))
            })
    }

    pub fn schemes(&self) -> Vec<&'static str> {
        self.prototypes.iter().map(|p| p.id()).collect()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        default_registry()
    }
}

/// Registry with every production connector prototype.
pub fn default_registry() -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::new();
    for kind in [
        SourceType::Postgres,
        SourceType::Mysql,
        SourceType::Mariadb,
        SourceType::Sqlserver,
        SourceType::Sqlite,
        SourceType::Oracle,
        SourceType::Dameng,
    ] {
        registry.register(Box::new(SqlConnector::prototype(kind)));
    }
    registry.register(Box::new(RedisConnector::prototype()));
    registry.register(Box::new(ElasticsearchConnector::prototype()));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_scheme() {
        let registry = default_registry();
        assert_eq!(
            registry.by_dsn("postgres://u@h/d").map(|c| c.id()),
            Some("postgres")
        );
        assert_eq!(
            registry.by_dsn("postgresql://u@h/d").map(|c| c.id()),
            Some("postgres")
        );
        assert_eq!(
            registry.by_dsn("rediss://h:6380/0").map(|c| c.id()),
            Some("redis")
        );
        assert_eq!(
            registry.by_dsn("dm://u:p@h:5236").map(|c| c.id()),
            Some("dm")
        );
        assert!(registry.by_dsn("bogus://h").is_none());
    }

    #[test]
    fn test_clone_yields_fresh_instance() {
        let registry = default_registry();
        let a = registry.clone_for_dsn("sqlite:///:memory:").unwrap();
        let b = registry.clone_for_dsn("sqlite:///:memory:").unwrap();
        assert_eq!(a.id(), b.id());
        // Unconnected clones must not share pools; both start empty
        assert_eq!(a.source_type(), SourceType::Sqlite);
        assert_eq!(b.source_type(), SourceType::Sqlite);
    }

    #[test]
    fn test_get_by_type() {
        let registry = default_registry();
        assert!(registry.get_by_type(SourceType::Elasticsearch).is_some());
        assert!(registry.get_by_type(SourceType::Oracle).is_some());
    }
}
