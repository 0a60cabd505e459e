use std::{io, net::SocketAddr, sync::Arc};

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use futures::StreamExt;
use log::{error, info, warn};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    archive::Format,
    cache::ArchiveCache,
    fetch::{self, FetchError, FetchRequest, Output},
    git::GitBackend,
};

/// How many body chunks may sit between the blocking exporter and the
/// connection before the exporter is backpressured.
const CHANNEL_CAPACITY: usize = 16;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ArchiveCache>,
    pub backend: Arc<dyn GitBackend>,
}

/// Wire form of a fetch request: absent optional fields arrive as empty
/// strings and mean "not specified".
#[derive(Debug, Deserialize)]
pub struct FetchParams {
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub tree: String,
    #[serde(default)]
    pub format: String,
}

impl FetchParams {
    pub fn into_request(self) -> Result<FetchRequest, FetchError> {
        if self.format.is_empty() {
            return Err(FetchError::Validation("format must not be empty".into()));
        }
        let format: Format = self.format.parse().map_err(FetchError::Validation)?;
        Ok(FetchRequest {
            repo: self.repo,
            branch: self.branch,
            commit: (!self.commit.is_empty()).then_some(self.commit),
            tree: self.tree,
            format,
        })
    }
}

/// Map the error taxonomy onto transport status codes: validation errors are
/// the caller's fault, upstream and archive failures are a bad gateway, and
/// everything else is internal.
fn status_for(error: &FetchError) -> StatusCode {
    match error {
        FetchError::Validation(_) => StatusCode::BAD_REQUEST,
        FetchError::UpstreamFetch(_) | FetchError::Archive(_) => StatusCode::BAD_GATEWAY,
        FetchError::Workspace(_) | FetchError::Stream(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/fetch", get(handle_fetch)).with_state(state)
}

pub async fn serve(bind: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Serving on {bind}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!("Failed to install shutdown handler: {error}");
        return;
    }
    info!("Shutting down");
}

/// Bridges the blocking orchestration to the response body. Chunks are sent
/// through a bounded channel; a dropped receiver (client gone) surfaces as a
/// broken pipe and aborts the export.
struct ChannelWriter {
    tx: mpsc::Sender<Result<Bytes, FetchError>>,
}

impl io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

async fn handle_fetch(
    State(state): State<AppState>,
    Query(params): Query<FetchParams>,
) -> Response {
    let request = match params.into_request() {
        Ok(request) => request,
        Err(error) => return (status_for(&error), error.to_string()).into_response(),
    };
    let format = request.format;

    let (tx, mut rx) = mpsc::channel::<Result<Bytes, FetchError>>(CHANNEL_CAPACITY);
    tokio::task::spawn_blocking(move || {
        let mut writer = ChannelWriter { tx: tx.clone() };
        if let Err(error) =
            fetch::fetch_archive(&state.cache, state.backend.as_ref(), &request, Output::Stream(&mut writer))
        {
            warn!("Fetch failed: {error}");
            let _ = tx.blocking_send(Err(error));
        }
    });

    // Peek the first item so failures before any output map to a proper
    // status. Once bytes have been sent the only remaining signal for a late
    // failure is an aborted body; truncation is the documented trade-off of
    // not buffering the archive.
    match rx.recv().await {
        None => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, format.content_type())],
        )
            .into_response(),
        Some(Err(error)) => (status_for(&error), error.to_string()).into_response(),
        Some(Ok(first)) => {
            let rest = futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });
            let stream = futures::stream::iter([Ok(first)]).chain(rest);
            (
                [(header::CONTENT_TYPE, format.content_type())],
                Body::from_stream(stream),
            )
                .into_response()
        }
    }
}
