//! Pinecone REST client
//!
//! Talks to a serverless index data-plane host: `POST /query` for nearest neighbours
//! and `POST /vectors/upsert` for writes. Vector ids are chunk ids and every vector
//! carries the chunk's doc_id in metadata so queries can filter on it.
//!
//! [`PineconeControl`] covers the control plane: describing an index by name and
//! creating a serverless one when it is missing.

use super::{IndexError, QueryRequest, RetrievalMatch, VectorIndexClient, VectorRecord};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const API_VERSION: &str = "2024-07";

/// Control-plane endpoint for index management
pub const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";

/// Vectors per upsert request, below Pinecone's 2 MB payload limit for 768-D vectors
const UPSERT_BATCH_SIZE: usize = 100;

pub struct PineconeIndex {
    client: Client,
    host: String,
    namespace: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

impl PineconeIndex {
    /// Create a client for the index served at `host`
    ///
    /// # Arguments
    /// * `host` - Index host, with or without scheme (e.g. `cuad-xxxx.svc.pinecone.io`)
    /// * `namespace` - Namespace holding the chunk vectors
    /// * `api_key` - Pinecone API key
    /// * `timeout` - Per-request timeout
    pub fn new(
        host: &str,
        namespace: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, IndexError> {
        if host.trim().is_empty() {
            return Err(IndexError::Rejected("Pinecone host is not configured".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host: normalize_host(host),
            namespace: namespace.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn post(&self, path: &str, body: &Value) -> Result<reqwest::blocking::Response, IndexError> {
        let url = format!("{}{}", self.host, path);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .map_err(|e| IndexError::Unavailable(format!("Failed to connect to Pinecone: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(status_error(status, &detail));
        }

        Ok(response)
    }
}

impl VectorIndexClient for PineconeIndex {
    fn query(&self, request: &QueryRequest) -> Result<Vec<RetrievalMatch>, IndexError> {
        let body = query_body(&self.namespace, request);
        let response: QueryResponse = self
            .post("/query", &body)?
            .json()
            .map_err(|e| IndexError::SearchError(format!("Failed to parse response: {}", e)))?;

        Ok(response
            .matches
            .into_iter()
            .map(|m| RetrievalMatch {
                chunk_id: m.id,
                score: m.score,
            })
            .collect())
    }

    fn upsert(&self, records: &[VectorRecord]) -> Result<usize, IndexError> {
        let mut written = 0;
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let body = upsert_body(&self.namespace, batch);
            let response: UpsertResponse = self
                .post("/vectors/upsert", &body)?
                .json()
                .map_err(|e| IndexError::InsertError(format!("Failed to parse response: {}", e)))?;
            written += response.upserted_count;
        }
        Ok(written)
    }
}

/// Desired shape of a serverless index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: String,
    pub cloud: Option<String>,
    pub region: Option<String>,
}

/// Index as reported by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub host: String,
}

/// Result of [`PineconeControl::ensure_index`]
#[derive(Debug, Clone)]
pub struct EnsuredIndex {
    pub description: IndexDescription,
    pub created: bool,
}

/// Pinecone control-plane client
pub struct PineconeControl {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PineconeControl {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, IndexError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: normalize_host(base_url),
            api_key: api_key.to_string(),
        })
    }

    /// Look an index up by name. `None` when it does not exist.
    pub fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>, IndexError> {
        let response = self
            .client
            .get(format!("{}/indexes/{}", self.base_url, name))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .map_err(|e| IndexError::Unavailable(format!("Failed to connect to Pinecone: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(status_error(status, &detail));
        }

        response
            .json()
            .map(Some)
            .map_err(|e| IndexError::Rejected(format!("Failed to parse index description: {}", e)))
    }

    pub fn create_index(&self, spec: &IndexSpec) -> Result<IndexDescription, IndexError> {
        let body = create_body(spec)?;
        let response = self
            .client
            .post(format!("{}/indexes", self.base_url))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&body)
            .send()
            .map_err(|e| IndexError::Unavailable(format!("Failed to connect to Pinecone: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(status_error(status, &detail));
        }

        response
            .json()
            .map_err(|e| IndexError::Rejected(format!("Failed to parse index description: {}", e)))
    }

    /// Make sure an index matching `spec` exists.
    ///
    /// An existing index is accepted only when its dimension matches. A missing index is
    /// created, which needs `spec.cloud` and `spec.region`.
    pub fn ensure_index(&self, spec: &IndexSpec) -> Result<EnsuredIndex, IndexError> {
        match self.describe_index(&spec.name)? {
            Some(description) => {
                check_existing(spec, &description)?;
                Ok(EnsuredIndex {
                    description,
                    created: false,
                })
            }
            None => Ok(EnsuredIndex {
                description: self.create_index(spec)?,
                created: true,
            }),
        }
    }
}

fn check_existing(spec: &IndexSpec, description: &IndexDescription) -> Result<(), IndexError> {
    if description.dimension != spec.dimension {
        return Err(IndexError::InvalidDimension {
            expected: spec.dimension,
            actual: description.dimension,
        });
    }
    Ok(())
}

fn create_body(spec: &IndexSpec) -> Result<Value, IndexError> {
    let (Some(cloud), Some(region)) = (spec.cloud.as_deref(), spec.region.as_deref()) else {
        return Err(IndexError::Rejected(format!(
            "Index {} does not exist and index.cloud / index.region are not set",
            spec.name
        )));
    };

    Ok(json!({
        "name": spec.name,
        "dimension": spec.dimension,
        "metric": spec.metric,
        "vector_type": "dense",
        "deletion_protection": "disabled",
        "spec": { "serverless": { "cloud": cloud, "region": region } },
    }))
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn status_error(status: StatusCode, detail: &str) -> IndexError {
    let message = format!("Pinecone API error {}: {}", status, detail.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        IndexError::Unavailable(message)
    } else {
        IndexError::Rejected(message)
    }
}

fn query_body(namespace: &str, request: &QueryRequest) -> Value {
    let mut body = json!({
        "namespace": namespace,
        "vector": request.vector,
        "topK": request.top_k,
        "includeMetadata": false,
        "includeValues": false,
    });
    if let Some(filter) = &request.filter {
        body["filter"] = json!({ "doc_id": { "$eq": filter.doc_id } });
    }
    body
}

fn upsert_body(namespace: &str, records: &[VectorRecord]) -> Value {
    let vectors: Vec<Value> = records
        .iter()
        .map(|record| {
            json!({
                "id": record.id,
                "values": record.values,
                "metadata": record.metadata,
            })
        })
        .collect();

    json!({
        "namespace": namespace,
        "vectors": vectors,
    })
}
