use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::external::{
    EmbeddingConfig, InferenceConfig, LLMBackend, LLMConfig, VectorBackend, VectorDBConfig,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub batch_size: usize,
    pub max_concurrent_requests: usize,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub llm: LLMConfig,
    pub inference: InferenceConfig,
    pub vector_db: VectorDBConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub processing: ProcessingConfig,
    pub data: DataConfig,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Unset or unparsable values fall back to `default`.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl Config {
    /// Load a dotenv file and read the environment. Callers apply their own
    /// overrides and then call [`Config::validate`].
    ///
    /// With an explicit `env_file`, relative `DATA_DIR` and `VECTOR_DB_PATH`
    /// are taken relative to the file's directory. Without one, `.env` in the
    /// working directory is loaded when present.
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        let base_dir = match env_file {
            Some(path) => {
                if !path.is_file() {
                    bail!("Env file not found: {}", path.display());
                }
                dotenv::from_path(path)
                    .with_context(|| format!("Failed to read env file {}", path.display()))?;
                Some(
                    path.parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| PathBuf::from(".")),
                )
            }
            None => {
                dotenv::dotenv().ok();
                None
            }
        };

        let mut config = Self::from_env()?;
        if let Some(base) = base_dir {
            config.data.data_dir = resolve(&base, &config.data.data_dir);
            config.vector_db.path = resolve(&base, &config.vector_db.path);
        }
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let ollama_host = var_or("OLLAMA_HOST", "localhost");
        let ollama_port = parse_or("OLLAMA_PORT", 11434);
        let max_concurrent_requests = parse_or("MAX_CONCURRENT_REQUESTS", 4);

        let embedding = EmbeddingConfig {
            model: var_or("EMBEDDING_MODEL", "all-minilm"),
            host: ollama_host.clone(),
            port: ollama_port,
            normalize: parse_or("NORMALIZE_EMBEDDINGS", true),
            max_concurrent_requests,
        };

        let llm = LLMConfig {
            backend: var_or("LLM_BACKEND", "huggingface").parse::<LLMBackend>()?,
            model: var_or("OLLAMA_LLM_MODEL", "mistral"),
            host: ollama_host,
            port: ollama_port,
            temperature: parse_or("LLM_TEMPERATURE", 0.5),
            top_p: parse_or("LLM_TOP_P", 0.9),
        };

        let inference = InferenceConfig {
            api_key: var_or("HUGGINGFACE_API_KEY", ""),
            model: var_or("MODEL_NAME", "mistralai/Mistral-7B-Instruct-v0.2"),
            api_base: var_or("HF_API_BASE", "https://router.huggingface.co"),
            hub_base: var_or("HF_HUB_BASE", "https://huggingface.co"),
            timeout_secs: parse_or("HF_TIMEOUT_SECS", 30),
        };

        let vector_db = VectorDBConfig {
            backend: var_or("VECTOR_BACKEND", "local").parse::<VectorBackend>()?,
            path: PathBuf::from(var_or("VECTOR_DB_PATH", "./vector_db")),
            collection_name: var_or("COLLECTION_NAME", "reqmind_collection"),
            host: var_or("QDRANT_HOST", "localhost"),
            port: parse_or("QDRANT_PORT", 6334),
            vector_size: parse_or("QDRANT_VECTOR_SIZE", 384),
        };

        let chunking = ChunkingConfig {
            chunk_size: parse_or("CHUNK_SIZE", 1000),
            chunk_overlap: parse_or("CHUNK_OVERLAP", 100),
        };

        let retrieval = RetrievalConfig {
            top_k: parse_or("TOP_K", 3),
        };

        let processing = ProcessingConfig {
            batch_size: parse_or("BATCH_SIZE", 10),
            max_concurrent_requests,
            log_level: var_or("LOG_LEVEL", "info"),
        };

        let data = DataConfig {
            data_dir: PathBuf::from(var_or("DATA_DIR", "./data")),
        };

        Ok(Self {
            embedding,
            llm,
            inference,
            vector_db,
            chunking,
            retrieval,
            processing,
            data,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.llm.backend == LLMBackend::HuggingFace && self.inference.api_key.trim().is_empty() {
            bail!(
                "HUGGINGFACE_API_KEY not found in environment. \
                 Please set it in .env file or environment variables."
            );
        }
        if self.chunking.chunk_size == 0 {
            bail!("CHUNK_SIZE must be greater than 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.retrieval.top_k == 0 {
            bail!("TOP_K must be at least 1");
        }
        Ok(())
    }

    pub fn masked_api_key(&self) -> String {
        let key = &self.inference.api_key;
        if key.is_empty() {
            "None".to_string()
        } else {
            format!("{}...", key.chars().take(8).collect::<String>())
        }
    }

    /// Model that will answer questions, whichever backend is selected
    pub fn generation_model(&self) -> &str {
        match self.llm.backend {
            LLMBackend::HuggingFace => &self.inference.model,
            LLMBackend::Ollama => &self.llm.model,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Config(model={}, embedding={}, chunk_size={}, chunk_overlap={}, top_k={}, \
             data_dir={}, vector_db={}, api_key={})",
            self.generation_model(),
            self.embedding.model,
            self.chunking.chunk_size,
            self.chunking.chunk_overlap,
            self.retrieval.top_k,
            self.data.data_dir.display(),
            self.vector_db.path.display(),
            self.masked_api_key()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopeguard::guard;
    use std::env;

    const VARS: &[&str] = &[
        "HUGGINGFACE_API_KEY",
        "MODEL_NAME",
        "HF_API_BASE",
        "HF_HUB_BASE",
        "HF_TIMEOUT_SECS",
        "LLM_BACKEND",
        "LLM_TEMPERATURE",
        "LLM_TOP_P",
        "OLLAMA_HOST",
        "OLLAMA_PORT",
        "OLLAMA_LLM_MODEL",
        "EMBEDDING_MODEL",
        "NORMALIZE_EMBEDDINGS",
        "CHUNK_SIZE",
        "CHUNK_OVERLAP",
        "TOP_K",
        "DATA_DIR",
        "VECTOR_DB_PATH",
        "VECTOR_BACKEND",
        "COLLECTION_NAME",
        "QDRANT_HOST",
        "QDRANT_PORT",
        "QDRANT_VECTOR_SIZE",
        "BATCH_SIZE",
        "MAX_CONCURRENT_REQUESTS",
        "LOG_LEVEL",
    ];

    fn clean_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_default_config() {
        clean_env();
        let _guard = guard((), |_| clean_env());

        let config = Config::from_env().unwrap();

        assert_eq!(
            config.inference.model, "mistralai/Mistral-7B-Instruct-v0.2",
            "wrong default model"
        );
        assert_eq!(config.embedding.model, "all-minilm", "wrong default embedding model");
        assert!(config.embedding.normalize);
        assert_eq!(config.llm.backend, LLMBackend::HuggingFace);
        assert_eq!(config.vector_db.backend, VectorBackend::Local);
        assert_eq!(config.vector_db.collection_name, "reqmind_collection");
        assert_eq!(config.chunking.chunk_size, 1000, "wrong default chunk size");
        assert_eq!(config.chunking.chunk_overlap, 100, "wrong default overlap");
        assert_eq!(config.retrieval.top_k, 3, "wrong default top_k");
        assert_eq!(config.processing.batch_size, 10, "wrong default batch size");
        assert_eq!(config.data.data_dir, PathBuf::from("./data"));
        assert_eq!(config.vector_db.path, PathBuf::from("./vector_db"));
    }

    #[test]
    #[serial_test::serial]
    fn test_custom_config() {
        clean_env();
        let _guard = guard((), |_| clean_env());

        env::set_var("MODEL_NAME", "custom/model");
        env::set_var("LLM_BACKEND", "ollama");
        env::set_var("OLLAMA_LLM_MODEL", "llama3");
        env::set_var("EMBEDDING_MODEL", "nomic-embed-text");
        env::set_var("CHUNK_SIZE", "500");
        env::set_var("CHUNK_OVERLAP", "50");
        env::set_var("TOP_K", "5");
        env::set_var("VECTOR_BACKEND", "qdrant");
        env::set_var("BATCH_SIZE", "not-a-number");

        let config = Config::from_env().unwrap();

        assert_eq!(config.inference.model, "custom/model", "model mismatch");
        assert_eq!(config.llm.backend, LLMBackend::Ollama);
        assert_eq!(config.generation_model(), "llama3");
        assert_eq!(config.embedding.model, "nomic-embed-text");
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.vector_db.backend, VectorBackend::Qdrant);
        assert_eq!(config.processing.batch_size, 10, "bad number should fall back");
        config.validate().unwrap();
    }

    #[test]
    #[serial_test::serial]
    fn test_unknown_backend_is_error() {
        clean_env();
        let _guard = guard((), |_| clean_env());

        env::set_var("VECTOR_BACKEND", "chroma");
        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_validate() {
        clean_env();
        let _guard = guard((), |_| clean_env());

        let mut config = Config::from_env().unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("HUGGINGFACE_API_KEY not found"));

        config.inference.api_key = "hf_abcdefghijklmnop".to_string();
        config.validate().unwrap();

        config.chunking.chunk_overlap = 1000;
        assert!(config.validate().is_err());
        config.chunking.chunk_overlap = 100;

        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_display_masks_key() {
        clean_env();
        let _guard = guard((), |_| clean_env());

        let mut config = Config::from_env().unwrap();
        assert!(config.to_string().contains("api_key=None"));

        config.inference.api_key = "hf_abcdefghijklmnop".to_string();
        let shown = config.to_string();
        assert!(shown.contains("api_key=hf_abcde..."));
        assert!(!shown.contains("hf_abcdefghijklmnop"));
    }

    #[test]
    #[serial_test::serial]
    fn test_load_resolves_paths_against_env_file() {
        clean_env();
        let _guard = guard((), |_| clean_env());

        let dir = assert_fs::TempDir::new().unwrap();
        let env_file = dir.path().join("reqmind.env");
        std::fs::write(
            &env_file,
            "HUGGINGFACE_API_KEY=hf_test_key\nDATA_DIR=docs\nVECTOR_DB_PATH=/tmp/reqmind_db\n",
        )
        .unwrap();

        let config = Config::load(Some(&env_file)).unwrap();
        assert_eq!(config.inference.api_key, "hf_test_key");
        assert_eq!(config.data.data_dir, dir.path().join("docs"));
        assert_eq!(config.vector_db.path, PathBuf::from("/tmp/reqmind_db"));
    }

    #[test]
    #[serial_test::serial]
    fn test_load_defers_validation_to_caller() {
        clean_env();
        let _guard = guard((), |_| clean_env());

        let dir = assert_fs::TempDir::new().unwrap();
        let env_file = dir.path().join("reqmind.env");
        std::fs::write(&env_file, "HUGGINGFACE_API_KEY=hf_test_key\nTOP_K=0\n").unwrap();

        let mut config = Config::load(Some(&env_file)).unwrap();
        assert_eq!(config.retrieval.top_k, 0);
        assert!(config.validate().is_err());

        config.retrieval.top_k = 3;
        config.validate().unwrap();
    }

    #[test]
    #[serial_test::serial]
    fn test_load_missing_env_file() {
        clean_env();
        let _guard = guard((), |_| clean_env());

        let err = Config::load(Some(Path::new("/nonexistent/reqmind.env"))).unwrap_err();
        assert!(err.to_string().contains("Env file not found"));
    }
}
