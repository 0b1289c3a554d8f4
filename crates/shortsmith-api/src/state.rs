//! Application state.

use std::sync::Arc;

use shortsmith_pipeline::Pipeline;

use crate::config::ApiConfig;
use crate::runs::RunRegistry;
use crate::templates::TemplateStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub runs: Arc<RunRegistry>,
    pub templates: Arc<TemplateStore>,
}

impl AppState {
    /// Create application state around an already wired pipeline.
    pub async fn new(config: ApiConfig, pipeline: Pipeline) -> Self {
        let templates = TemplateStore::load(&config.templates_path).await;
        Self {
            config,
            runs: Arc::new(RunRegistry::new(Arc::new(pipeline))),
            templates: Arc::new(templates),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        self.runs.pipeline()
    }
}
