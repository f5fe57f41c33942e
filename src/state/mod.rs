use std::sync::Arc;
use std::time::Duration;

use crate::agent::Agent;
use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::history::HistoryStore;
use crate::llm::LlmService;
use crate::rag::{
    DocumentLoader, IngestionOptions, IngestionPipeline, LopdfExtractor, SqliteVectorStore,
    VectorStore,
};
use crate::tools::RetrievalTool;

pub mod error;

pub use error::InitializationError;

/// Everything the CLI and HTTP surface need, built once at start-up.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: Arc<AppConfig>,
    pub llm: LlmService,
    pub vector_store: Arc<dyn VectorStore>,
    pub history: HistoryStore,
    pub retrieval: Arc<RetrievalTool>,
    pub agent: Arc<Agent>,
}

impl AppState {
    /// Loads configuration and opens every collaborator.
    ///
    /// Any failure here is fatal; the returned error names the component.
    pub async fn initialize(config_service: &ConfigService) -> Result<Arc<Self>, InitializationError> {
        let config = config_service.load().map_err(InitializationError::Config)?;
        let paths = Arc::new(config_service.paths().clone());
        Self::from_parts(paths, config).await
    }

    pub async fn from_parts(
        paths: Arc<AppPaths>,
        config: AppConfig,
    ) -> Result<Arc<Self>, InitializationError> {
        let acquire_timeout = Duration::from_secs(config.vector_store.acquire_timeout_secs);

        let vector_db_path = config
            .vector_store
            .path
            .as_deref()
            .map(|p| paths.resolve(p))
            .unwrap_or_else(|| paths.vector_db_path.clone());
        let vector_store: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::with_path(vector_db_path, acquire_timeout)
                .await
                .map_err(InitializationError::VectorStore)?,
        );

        let history = HistoryStore::new(paths.memory_db_path.clone(), acquire_timeout)
            .await
            .map_err(InitializationError::History)?;

        let llm = LlmService::from_config(&config).map_err(InitializationError::Llm)?;

        let retrieval = Arc::new(
            RetrievalTool::new(
                llm.clone(),
                vector_store.clone(),
                &config.vector_store.index_name,
                config.agent.default_top_k,
                config.agent.max_top_k,
            )
            .map_err(InitializationError::Llm)?,
        );

        let agent = Arc::new(Agent::new(
            llm.clone(),
            retrieval.clone(),
            history.clone(),
            &config.agent,
        ));

        tracing::info!(
            "Initialized with chat model '{}' and embedding model '{}' via {}",
            llm.chat_model(),
            llm.embedding_model(),
            llm.provider_name()
        );

        Ok(Arc::new(AppState {
            paths,
            config: Arc::new(config),
            llm,
            vector_store,
            history,
            retrieval,
            agent,
        }))
    }

    pub fn ingestion_pipeline(&self, options: IngestionOptions) -> IngestionPipeline {
        let loader = DocumentLoader::new(
            Arc::new(LopdfExtractor),
            &self.config.source.extension,
            self.config.ingestion.extract_timeout(),
        );
        IngestionPipeline::new(loader, self.llm.clone(), self.vector_store.clone(), options)
    }
}
