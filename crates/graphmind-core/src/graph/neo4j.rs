//! Bolt-protocol [`GraphClient`] backed by `neo4rs`.

use super::{normalize_integer, GraphClient, GraphError, Params, Row};
use crate::config::GraphConfig;
use neo4rs::{query, Graph};

/// Session-pooled graph client. `neo4rs::Graph` already wraps a
/// connection pool internally; sessions are acquired per call and
/// dropped on every return path (including error paths), matching
/// spec.md §4.1's "acquired per call and released on all paths".
pub struct Neo4jClient {
    graph: Graph,
}

impl Neo4jClient {
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let graph = Graph::new(&config.uri, &config.user, &config.password)
            .await
            .map_err(|e| GraphError::DriverUnavailable(e.to_string()))?;
        Ok(Self { graph })
    }

    fn build_query(cypher: &str, params: Params) -> neo4rs::Query {
        let mut q = query(cypher);
        for (key, value) in params {
            q = q.param(&key, bolt_value_from_json(&value));
        }
        q
    }

    async fn run(&self, cypher: &str, params: Params) -> Result<Vec<Row>, GraphError> {
        let q = Self::build_query(cypher, params);
        let mut stream = self.graph.execute(q).await.map_err(|e| GraphError::Query(e.to_string()))?;

        let mut rows = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?
        {
            rows.push(row_to_map(row));
        }
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl GraphClient for Neo4jClient {
    async fn run_read(&self, query: &str, params: Params) -> Result<Vec<Row>, GraphError> {
        self.run(query, params).await
    }

    async fn run_write(&self, query: &str, params: Params) -> Result<Vec<Row>, GraphError> {
        self.run(query, params).await
    }
}

/// Best-effort JSON -> Bolt value conversion for query parameters.
fn bolt_value_from_json(value: &serde_json::Value) -> neo4rs::BoltType {
    match value {
        serde_json::Value::Null => neo4rs::BoltType::Null(neo4rs::BoltNull),
        serde_json::Value::Bool(b) => neo4rs::BoltType::Boolean((*b).into()),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                neo4rs::BoltType::Integer(i.into())
            } else {
                neo4rs::BoltType::Float(n.as_f64().unwrap_or_default().into())
            }
        }
        serde_json::Value::String(s) => neo4rs::BoltType::String(s.as_str().into()),
        serde_json::Value::Array(arr) => {
            neo4rs::BoltType::List(arr.iter().map(bolt_value_from_json).collect::<Vec<_>>().into())
        }
        serde_json::Value::Object(obj) => {
            let mut map = std::collections::HashMap::new();
            for (k, v) in obj {
                map.insert(k.clone(), bolt_value_from_json(v));
            }
            neo4rs::BoltType::Map(map.into())
        }
    }
}

/// Best-effort Bolt row -> JSON map conversion, normalizing any
/// `{low, high}`-shaped integers along the way.
fn row_to_map(row: neo4rs::Row) -> Row {
    let mut out = Row::new();
    for key in row.keys() {
        if let Ok(value) = row.get::<serde_json::Value>(key) {
            out.insert(key.to_string(), normalize_integer(&value));
        }
    }
    out
}
