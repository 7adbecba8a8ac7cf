use crate::config::ServiceConfig;
use crate::data_loader::{self, ModelRawData};
use crate::engine::{Engine, TractEngine};
use crate::pipeline::Classifier;
use crate::server::{self, AppState};
use anyhow::Context as _;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Owns the service configuration and drives startup.
pub struct InferenceProvider {
    config: ServiceConfig,
}

impl InferenceProvider {
    pub fn new(config: ServiceConfig) -> Self {
        InferenceProvider { config }
    }

    /// Load the model, then serve it.
    ///
    /// Every startup failure surfaces here before a listener exists, so no
    /// request can observe a half-initialized classifier.
    pub async fn run(&self) -> anyhow::Result<()> {
        let classifier = self.register_model().context("failed to load classifier")?;

        let addr: SocketAddr = self
            .config
            .bind_address()
            .parse()
            .with_context(|| format!("invalid bind address '{}'", self.config.bind_address()))?;

        let state = Arc::new(AppState::new(classifier));
        let app = server::create_router(state, self.config.body_limit);

        info!(
            model = %self.config.model_path.display(),
            max_upload_bytes = self.config.body_limit,
            "image classifier ready"
        );

        server::serve(addr, app).await
    }

    /// Read the artifact and labels, build the engine and check they agree.
    pub fn register_model(&self) -> anyhow::Result<Classifier> {
        let labels = data_loader::load_labels(self.config.labels_file.as_deref())?;

        let ModelRawData { model, encoding } =
            data_loader::fetch_model(&self.config.model_path, self.config.graph_encoding)?;

        let engine: Engine = Arc::new(TractEngine::load(&model, encoding, self.config.tensor_layout)?);

        let classifier = Classifier::new(engine, labels, self.config.tensor_layout)?
            .with_softmax(self.config.apply_softmax);

        info!(
            classes = classifier.labels().len(),
            layout = ?self.config.tensor_layout,
            softmax = self.config.apply_softmax,
            "model registered"
        );

        Ok(classifier)
    }
}
