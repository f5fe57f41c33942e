pub mod paths;
pub mod service;
pub mod settings;
pub mod validation;

pub use paths::AppPaths;
pub use service::{parse_config, ConfigService};
pub use settings::{
    AgentConfig, AppConfig, ChunkingConfig, EmbeddingConfig, IngestionConfig, LlmConfig,
    ServerConfig, SourceConfig, VectorStoreConfig,
};
