use anyhow::Result;
use async_trait::async_trait;
use qdrant_client::{
    config::QdrantConfig,
    qdrant::{
        point_id::PointIdOptions, value::Kind, vectors_config::Config, CollectionExistsRequest,
        CountPoints, CreateCollection, DeleteCollection, Distance, PointId, PointStruct,
        SearchPoints, UpsertPoints, Value, VectorParams, VectorsConfig, WithPayloadSelector,
    },
    Qdrant,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;
use url::Url;

use crate::external::error::ExternalError;
use crate::parser::{Document, DocumentMetadata};
use crate::store::{IndexRecord, ScoredRecord, StoreError, VectorIndex};

const TEXT_KEY: &str = "text";
const SOURCE_KEY: &str = "source";
const PAGE_KEY: &str = "page";
const START_INDEX_KEY: &str = "start_index";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// JSON index under `path`
    Local,
    Qdrant,
}

impl FromStr for VectorBackend {
    type Err = ExternalError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "file" => Ok(Self::Local),
            "qdrant" => Ok(Self::Qdrant),
            other => Err(ExternalError::ConfigError(format!(
                "Unknown VECTOR_BACKEND '{}', expected 'local' or 'qdrant'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDBConfig {
    pub backend: VectorBackend,
    /// Directory holding local index files
    pub path: PathBuf,
    pub collection_name: String,
    pub host: String,
    pub port: u16,
    pub vector_size: usize,
}

impl VectorDBConfig {
    /// Get the full URL for the Qdrant service
    pub fn get_url(&self) -> Result<String> {
        let url = if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        };

        Url::parse(&url).map_err(|e| ExternalError::ConfigError(format!("Invalid URL: {}", e)))?;

        Ok(url)
    }
}

impl Default for VectorDBConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Local,
            path: PathBuf::from("./vector_db"),
            collection_name: "reqmind_collection".to_string(),
            host: "localhost".to_string(),
            port: 6334,
            vector_size: 384,
        }
    }
}

fn backend_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn payload_for(record: &IndexRecord) -> HashMap<String, Value> {
    let mut payload = HashMap::new();
    payload.insert(TEXT_KEY.to_string(), Value::from(record.text.clone()));
    payload.insert(
        SOURCE_KEY.to_string(),
        Value::from(record.metadata.source.clone()),
    );
    if let Some(page) = record.metadata.page {
        payload.insert(PAGE_KEY.to_string(), Value::from(page as i64));
    }
    if let Some(start) = record.metadata.start_index {
        payload.insert(START_INDEX_KEY.to_string(), Value::from(start as i64));
    }
    payload
}

fn string_field(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn integer_field(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(n)) => Some(*n),
        _ => None,
    }
}

fn document_from(payload: &HashMap<String, Value>) -> Document {
    let metadata = DocumentMetadata {
        source: string_field(payload, SOURCE_KEY).unwrap_or_default(),
        page: integer_field(payload, PAGE_KEY).map(|p| p as u32),
        start_index: integer_field(payload, START_INDEX_KEY).map(|s| s as usize),
    };
    Document::new(string_field(payload, TEXT_KEY).unwrap_or_default(), metadata)
}

/// Qdrant collection used as a [`VectorIndex`]. Qdrant persists on its own,
/// so `persist` is a no-op.
pub struct QdrantIndex {
    client: Qdrant,
    config: VectorDBConfig,
}

impl QdrantIndex {
    pub fn new(config: VectorDBConfig) -> Result<Self> {
        let url = config.get_url()?;
        let client = Qdrant::new(QdrantConfig::from_url(&url))
            .map_err(|e| ExternalError::ConnectionError(e.to_string()))?;

        Ok(Self { client, config })
    }

    async fn ensure_collection(&self) -> Result<bool, StoreError> {
        let name = &self.config.collection_name;
        if self
            .client
            .collection_exists(CollectionExistsRequest {
                collection_name: name.clone(),
            })
            .await
            .map_err(backend_error)?
        {
            return Ok(false);
        }

        let vectors_config = VectorsConfig {
            config: Some(Config::Params(VectorParams {
                size: self.config.vector_size as u64,
                distance: Distance::Cosine.into(),
                ..Default::default()
            })),
        };

        self.client
            .create_collection(CreateCollection {
                collection_name: name.clone(),
                vectors_config: Some(vectors_config),
                ..Default::default()
            })
            .await
            .map_err(backend_error)?;

        info!(collection = %name, size = self.config.vector_size, "created qdrant collection");
        Ok(true)
    }

    fn check_dimension(&self, actual: usize) -> Result<(), StoreError> {
        if actual != self.config.vector_size {
            return Err(StoreError::DimensionMismatch {
                expected: self.config.vector_size,
                actual,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn open(&self) -> Result<usize, StoreError> {
        if self.ensure_collection().await? {
            return Ok(0);
        }
        self.count().await
    }

    async fn add(&self, records: Vec<IndexRecord>) -> Result<(), StoreError> {
        for record in &records {
            self.check_dimension(record.vector.len())?;
        }
        self.ensure_collection().await?;

        let points: Vec<PointStruct> = records
            .into_iter()
            .map(|record| PointStruct {
                id: Some(PointId {
                    point_id_options: Some(PointIdOptions::Uuid(record.id.to_string())),
                }),
                payload: payload_for(&record),
                vectors: Some(record.vector.into()),
            })
            .collect();

        self.client
            .upsert_points(UpsertPoints {
                collection_name: self.config.collection_name.clone(),
                wait: Some(true),
                points,
                ..Default::default()
            })
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>, StoreError> {
        self.check_dimension(vector.len())?;

        let response = self
            .client
            .search_points(SearchPoints {
                collection_name: self.config.collection_name.clone(),
                vector: vector.to_vec(),
                limit: limit as u64,
                with_payload: Some(WithPayloadSelector::from(true)),
                ..Default::default()
            })
            .await
            .map_err(backend_error)?;

        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredRecord {
                document: document_from(&point.payload),
                score: point.score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let response = self
            .client
            .count(CountPoints {
                collection_name: self.config.collection_name.clone(),
                exact: Some(true),
                ..Default::default()
            })
            .await
            .map_err(backend_error)?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let name = &self.config.collection_name;
        if self
            .client
            .collection_exists(CollectionExistsRequest {
                collection_name: name.clone(),
            })
            .await
            .map_err(backend_error)?
        {
            self.client
                .delete_collection(DeleteCollection {
                    collection_name: name.clone(),
                    ..Default::default()
                })
                .await
                .map_err(backend_error)?;
            info!(collection = %name, "deleted qdrant collection");
        }
        self.ensure_collection().await?;
        Ok(())
    }

    async fn persist(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn location(&self) -> String {
        let url = self.config.get_url().unwrap_or_else(|_| self.config.host.clone());
        format!("{}/{}", url, self.config.collection_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_url_generation() {
        let config = VectorDBConfig {
            host: "localhost".to_string(),
            port: 6334,
            ..Default::default()
        };
        assert_eq!(config.get_url().unwrap(), "http://localhost:6334");

        let config = VectorDBConfig {
            host: "https://qdrant.example.com/".to_string(),
            port: 6334,
            ..Default::default()
        };
        assert_eq!(config.get_url().unwrap(), "https://qdrant.example.com:6334");
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("local".parse::<VectorBackend>().unwrap(), VectorBackend::Local);
        assert_eq!(" Qdrant ".parse::<VectorBackend>().unwrap(), VectorBackend::Qdrant);
        assert!("chroma".parse::<VectorBackend>().is_err());
    }

    #[test]
    fn test_payload_round_trips_metadata() {
        let record = IndexRecord {
            id: Uuid::new_v4(),
            text: "REQ-010 Passwords shall be hashed.".to_string(),
            metadata: DocumentMetadata {
                source: "data/srs.pdf".to_string(),
                page: Some(2),
                start_index: Some(120),
            },
            vector: vec![0.0; 4],
        };

        let doc = document_from(&payload_for(&record));
        assert_eq!(doc.content, record.text);
        assert_eq!(doc.metadata, record.metadata);
    }

    #[test]
    fn test_payload_without_optional_fields() {
        let record = IndexRecord {
            id: Uuid::new_v4(),
            text: "notes".to_string(),
            metadata: DocumentMetadata::new("notes.txt"),
            vector: vec![],
        };
        let payload = payload_for(&record);
        assert!(!payload.contains_key(PAGE_KEY));
        assert_eq!(document_from(&payload).metadata.page, None);
    }

    #[tokio::test]
    async fn test_rejects_wrong_dimension() {
        let index = QdrantIndex::new(VectorDBConfig {
            vector_size: 3,
            ..Default::default()
        })
        .unwrap();
        let err = index.search(&[1.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    #[ignore = "requires a running Qdrant instance"]
    async fn test_live_collection() {
        let index = QdrantIndex::new(VectorDBConfig {
            collection_name: format!("reqmind_test_{}", Uuid::new_v4().simple()),
            vector_size: 2,
            ..Default::default()
        })
        .unwrap();

        index.reset().await.unwrap();
        index
            .add(vec![IndexRecord {
                id: Uuid::new_v4(),
                text: "REQ-001 login".to_string(),
                metadata: DocumentMetadata::new("srs.txt"),
                vector: vec![1.0, 0.0],
            }])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let hits = index.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].document.content, "REQ-001 login");
    }
}
