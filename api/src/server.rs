use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use storage::StorageEngine;

use crate::handlers::{handle, AppState};
use crate::{ApiError, ApiResult, Request, Response};

pub struct Server {
    config: crate::Config,
    app_state: Arc<AppState>,
}

impl Server {
    pub fn new(config: crate::Config, storage_engine: Arc<Mutex<StorageEngine>>) -> Self {
        let app_state = Arc::new(AppState { storage_engine });
        Self { config, app_state }
    }

    pub async fn start(&self) -> ApiResult<u64> {
        tracing::info!("Serving requests on stdin");
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> ApiResult<u64>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut served = 0u64;

        while let Some(line) = lines.next_line().await? {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let response = self.respond(line).await;
            writer.write_all(response.to_line().as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            served += 1;

            if self.config.max_requests.is_some_and(|max| served >= max) {
                tracing::info!("Request limit of {} reached", served);
                break;
            }
        }

        tracing::info!("Request stream closed after {} requests", served);
        Ok(served)
    }

    async fn respond(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => {
                tracing::debug!("Handling {:?}", request);
                handle(&self.app_state, request).await
            }
            Err(e) => {
                tracing::warn!("Rejecting malformed request: {}", e);
                ApiError::from(e).into_response()
            }
        }
    }
}
