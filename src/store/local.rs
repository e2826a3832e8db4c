use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::store::{error::StoreError, IndexRecord, ScoredRecord, VectorIndex};

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    collection: String,
    dimension: Option<usize>,
    records: Vec<IndexRecord>,
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// On-disk index: one JSON file per collection, searched by brute-force cosine.
///
/// Every write goes through to disk, so the file is always the source of truth.
pub struct LocalIndex {
    path: PathBuf,
    state: RwLock<IndexFile>,
}

impl LocalIndex {
    pub fn new(persist_directory: &Path, collection_name: &str) -> Self {
        Self {
            path: persist_directory.join(format!("{}.json", collection_name)),
            state: RwLock::new(IndexFile {
                collection: collection_name.to_string(),
                ..Default::default()
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, state: &IndexFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(state)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), records = state.records.len(), "index written");
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for LocalIndex {
    async fn open(&self) -> Result<usize, StoreError> {
        if !self.path.exists() {
            return Ok(0);
        }
        let bytes = tokio::fs::read(&self.path).await?;
        let loaded: IndexFile = serde_json::from_slice(&bytes)?;
        let count = loaded.records.len();

        let mut state = self.state.write().await;
        *state = loaded;
        info!(path = %self.path.display(), count, "opened local index");
        Ok(count)
    }

    async fn add(&self, records: Vec<IndexRecord>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        let mut dimension = state.dimension;
        for record in &records {
            match dimension {
                Some(expected) if expected != record.vector.len() => {
                    return Err(StoreError::DimensionMismatch {
                        expected,
                        actual: record.vector.len(),
                    });
                }
                None => dimension = Some(record.vector.len()),
                _ => {}
            }
        }

        let previous_len = state.records.len();
        let previous_dimension = state.dimension;
        state.dimension = dimension;
        state.records.extend(records);

        if let Err(e) = self.write(&state).await {
            state.records.truncate(previous_len);
            state.dimension = previous_dimension;
            return Err(e);
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>, StoreError> {
        let state = self.state.read().await;
        if let Some(expected) = state.dimension {
            if expected != vector.len() {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut scored: Vec<ScoredRecord> = state
            .records
            .iter()
            .map(|record| ScoredRecord {
                document: record.to_document(),
                score: cosine_similarity(vector, &record.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.state.read().await.records.len())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.records.clear();
        state.dimension = None;
        if self.path.exists() {
            tokio::fs::remove_file(&self.path).await?;
        }
        info!(path = %self.path.display(), "local index reset");
        Ok(())
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let state = self.state.read().await;
        self.write(&state).await
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::DocumentMetadata;
    use uuid::Uuid;

    fn record(text: &str, vector: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: Uuid::new_v4(),
            text: text.to_string(),
            metadata: DocumentMetadata::new("srs.txt"),
            vector,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalIndex::new(dir.path(), "test");
        index
            .add(vec![
                record("login", vec![1.0, 0.0]),
                record("logout", vec![0.7, 0.7]),
                record("billing", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = index.search(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.content, "login");
        assert_eq!(results[1].document.content, "logout");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_persist_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = LocalIndex::new(dir.path(), "reqs");
            index
                .add(vec![record("REQ-001", vec![0.1, 0.2, 0.3])])
                .await
                .unwrap();
        }

        let reopened = LocalIndex::new(dir.path(), "reqs");
        assert_eq!(reopened.count().await.unwrap(), 0);
        assert_eq!(reopened.open().await.unwrap(), 1);
        let results = reopened.search(&[0.1, 0.2, 0.3], 5).await.unwrap();
        assert_eq!(results[0].document.content, "REQ-001");
        assert_eq!(results[0].document.metadata.source, "srs.txt");
    }

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalIndex::new(&dir.path().join("not-yet"), "reqs");
        assert_eq!(index.open().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalIndex::new(dir.path(), "test");
        index.add(vec![record("a", vec![1.0, 0.0])]).await.unwrap();

        let err = index
            .add(vec![record("b", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));

        let err = index.search(&[1.0], 1).await.unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_index_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let index = LocalIndex::new(&blocker, "reqs");
        let err = index
            .add(vec![record("REQ-001", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(index.count().await.unwrap(), 0);

        let err = index
            .add(vec![record("REQ-002", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)), "dimension was not rolled back");
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalIndex::new(dir.path(), "test");
        index.add(vec![record("a", vec![1.0])]).await.unwrap();
        assert!(index.path().exists());

        index.reset().await.unwrap();
        assert!(!index.path().exists());
        assert_eq!(index.count().await.unwrap(), 0);
        index.add(vec![record("b", vec![1.0, 2.0])]).await.unwrap();
    }
}
