use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use storage::StorageEngine;

use crate::{ApiError, ApiResult, Payload, Request, Response};

pub struct AppState {
    pub storage_engine: Arc<Mutex<StorageEngine>>,
}

/// Failures come back as error responses, never as `Err`.
pub async fn handle(state: &AppState, request: Request) -> Response {
    let result = match request {
        Request::Write { file, data } => write_file(state, &file, data).await,
        Request::Read { file } => read_file(state, &file).await,
        Request::List { prefix } => list_files(state, &prefix).await,
        Request::Complete { prefix } => complete_name(state, &prefix).await,
        Request::Delete { file } => delete_file(state, &file).await,
        Request::AccessPair { source, target } => access_pair(state, &source, &target).await,
        Request::Tag { file, key } => tag_file(state, &file, &key).await,
        Request::SearchKey { key } => search_key(state, &key).await,
        Request::SuggestKeys { prefix } => suggest_keys(state, &prefix).await,
        Request::SystemKeys => system_keys(state).await,
        Request::Decay => decay(state).await,
        Request::Stats => stats(state).await,
    };

    result.unwrap_or_else(|err| {
        tracing::warn!("Request failed: {}", err);
        err.into_response()
    })
}

/// Runs a disk-touching engine call on the blocking pool under the engine lock.
async fn with_engine<T, F>(state: &AppState, op: F) -> ApiResult<T>
where
    F: FnOnce(&mut StorageEngine) -> storage::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let mut engine = state.storage_engine.clone().lock_owned().await;
    let result = tokio::task::spawn_blocking(move || op(&mut *engine))
        .await
        .map_err(|e| ApiError::InternalError(format!("storage task failed: {}", e)))?;
    Ok(result?)
}

async fn write_file(state: &AppState, file: &str, data: String) -> ApiResult<Response> {
    let name = file.to_string();
    let receipt = with_engine(state, move |engine| engine.write(&name, Bytes::from(data))).await?;

    Ok(Response::success("File written successfully").with(Payload::Written {
        file: receipt.file,
        address: receipt.address,
        size: receipt.size,
    }))
}

async fn read_file(state: &AppState, file: &str) -> ApiResult<Response> {
    let name = file.to_string();
    let outcome = with_engine(state, move |engine| engine.read(&name)).await?;

    Ok(Response::success("Read successful").with(Payload::Content {
        file: outcome.file,
        content: String::from_utf8_lossy(&outcome.content).into_owned(),
        source: outcome.source,
        predictions: outcome.predictions.into_iter().map(|p| p.target).collect(),
    }))
}

async fn list_files(state: &AppState, prefix: &str) -> ApiResult<Response> {
    let files = state.storage_engine.lock().await.list(prefix);
    Ok(Response::success("Directory listed").with(Payload::Listing { files }))
}

async fn complete_name(state: &AppState, prefix: &str) -> ApiResult<Response> {
    let files = state.storage_engine.lock().await.complete(prefix);
    Ok(Response::success("Completions fetched").with(Payload::Names { files }))
}

async fn delete_file(state: &AppState, file: &str) -> ApiResult<Response> {
    let name = file.to_string();
    let receipt = with_engine(state, move |engine| engine.delete(&name)).await?;
    Ok(Response::success(format!("File '{}' deleted", receipt.file))
        .with(Payload::File { file: receipt.file }))
}

async fn access_pair(state: &AppState, source: &str, target: &str) -> ApiResult<Response> {
    state
        .storage_engine
        .lock()
        .await
        .record_access_pair(source, target);
    Ok(Response::success("Relationship learned"))
}

async fn tag_file(state: &AppState, file: &str, key: &str) -> ApiResult<Response> {
    state.storage_engine.lock().await.tag(file, key)?;
    Ok(Response::success(format!("Keyword '{}' associated with {}", key, file))
        .with(Payload::File { file: file.to_string() }))
}

async fn search_key(state: &AppState, key: &str) -> ApiResult<Response> {
    let files = state.storage_engine.lock().await.search_keyword(key);
    let message = if files.is_empty() {
        "No files found for this key"
    } else {
        "Search complete"
    };
    Ok(Response::success(message).with(Payload::Names { files }))
}

async fn suggest_keys(state: &AppState, prefix: &str) -> ApiResult<Response> {
    let suggestions = state.storage_engine.lock().await.suggest_keywords(prefix);
    Ok(Response::success("Suggestions fetched").with(Payload::Suggestions { suggestions }))
}

async fn system_keys(state: &AppState) -> ApiResult<Response> {
    let keywords = state.storage_engine.lock().await.system_keywords();
    Ok(Response::success("System keywords fetched").with(Payload::Keywords { keywords }))
}

async fn decay(state: &AppState) -> ApiResult<Response> {
    let removed = state.storage_engine.lock().await.decay();
    Ok(Response::success("Access weights decayed").with(Payload::Decayed { removed }))
}

async fn stats(state: &AppState) -> ApiResult<Response> {
    let stats = state.storage_engine.lock().await.stats();
    Ok(Response::success("Statistics collected").with(Payload::Stats(stats)))
}
