use crate::config::Config;
use crate::error::{CmfsError, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use storage::StorageEngine;

pub struct Node {
    config: Config,
    storage_engine: Arc<Mutex<StorageEngine>>,
    api_server: Arc<api::Server>,
}

impl Node {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        info!("Initializing CMFS node on {:?}", config.disk_path);

        let storage_engine = Arc::new(Mutex::new(StorageEngine::open(config.clone().into())?));
        let api_server = Arc::new(api::Server::new(
            config.clone().into(),
            storage_engine.clone(),
        ));

        Ok(Self {
            config,
            storage_engine,
            api_server,
        })
    }

    pub fn storage_engine(&self) -> Arc<Mutex<StorageEngine>> {
        self.storage_engine.clone()
    }

    pub async fn start(self) -> Result<()> {
        info!("Starting CMFS node services");

        let api_task = {
            let api = self.api_server.clone();
            tokio::spawn(async move { api.start().await })
        };

        let decay_task = {
            let engine = self.storage_engine.clone();
            let interval_ms = self.config.decay_interval_ms;
            tokio::spawn(async move { Self::run_decay(engine, interval_ms).await })
        };

        let outcome = tokio::select! {
            result = api_task => match result {
                Ok(Ok(served)) => {
                    info!("Request loop finished after {} requests", served);
                    Ok(())
                }
                Ok(Err(e)) => Err(CmfsError::Api(e)),
                Err(e) => Err(CmfsError::Task(format!("request loop panicked: {}", e))),
            },
            result = decay_task => {
                error!("Decay ticker stopped: {:?}", result);
                Err(CmfsError::Task("decay ticker stopped".to_string()))
            }
        };

        let stats = self.storage_engine.lock().await.stats();
        info!(
            "Shutting down with {} files, {} cache lines, {} graph edges",
            stats.files, stats.cache_lines, stats.graph_edges
        );
        outcome
    }

    async fn run_decay(engine: Arc<Mutex<StorageEngine>>, interval_ms: u64) {
        if interval_ms == 0 {
            info!("Periodic decay disabled");
            return std::future::pending().await;
        }

        let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(interval_ms));
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            let removed = engine.lock().await.decay();
            info!("Decay round removed {} access edges", removed);
        }
    }
}
