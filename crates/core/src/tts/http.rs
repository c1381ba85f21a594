//! HTTP plumbing shared by the cloud providers: status mapping and writing
//! response bodies to disk without leaving truncated files behind.

use crate::tts::TtsError;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const LOG_TARGET: &str = "tts::http";
const MAX_ERROR_BODY_CHARS: usize = 300;

pub(crate) fn build_client(timeout: Duration) -> Result<Client, TtsError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TtsError::Network(format!("failed to build http client: {e}")))
}

pub(crate) fn transport_error(e: reqwest::Error) -> TtsError {
    if e.is_timeout() {
        TtsError::Network(format!("request timed out: {e}"))
    } else {
        TtsError::Network(e.to_string())
    }
}

/// Passes successful responses through and turns everything else into a
/// typed error, reading the body for diagnostics.
pub(crate) async fn check_status(response: Response, voice: &str) -> Result<Response, TtsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body, voice))
}

pub(crate) fn classify_status(status: StatusCode, body: &str, voice: &str) -> TtsError {
    let details = format!("HTTP {status}: {}", truncate(body));
    match status.as_u16() {
        401 | 403 if mentions_quota(body) => TtsError::QuotaOrRateLimit(details),
        401 | 403 => TtsError::Auth(details),
        402 | 429 => TtsError::QuotaOrRateLimit(details),
        400 | 404 | 422 => TtsError::UnsupportedVoice {
            voice: voice.to_owned(),
            details,
        },
        _ => TtsError::Network(details),
    }
}

fn mentions_quota(body: &str) -> bool {
    // ElevenLabs reports an exhausted character quota as 401 with this status.
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/detail/status")
                .and_then(|s| s.as_str())
                .map(|s| s == "quota_exceeded")
        })
        .unwrap_or(false)
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_owned(),
    }
}

fn part_path(path: &Path) -> PathBuf {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    path.with_extension(format!("{ext}.part"))
}

/// Writes a streamed body chunk by chunk. The final path only appears once
/// the whole body has arrived.
pub(crate) async fn stream_to_file(response: Response, path: &Path) -> Result<u64, TtsError> {
    let chunks = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(transport_error));
    chunks_to_file(chunks, path).await
}

async fn chunks_to_file<S>(chunks: S, path: &Path) -> Result<u64, TtsError>
where
    S: Stream<Item = Result<Bytes, TtsError>> + Unpin,
{
    let tmp = part_path(path);
    let result = write_chunks(chunks, &tmp).await;
    finish(result, &tmp, path).await
}

/// Writes a fully buffered body in one go.
pub(crate) async fn buffered_to_file(response: Response, path: &Path) -> Result<u64, TtsError> {
    let body: Bytes = response.bytes().await.map_err(transport_error)?;
    if body.is_empty() {
        return Err(TtsError::Network("provider returned an empty audio body".to_owned()));
    }
    let tmp = part_path(path);
    let result = tokio::fs::write(&tmp, &body)
        .await
        .map(|()| body.len() as u64)
        .map_err(TtsError::StreamWrite);
    finish(result, &tmp, path).await
}

async fn write_chunks<S>(mut chunks: S, tmp: &Path) -> Result<u64, TtsError>
where
    S: Stream<Item = Result<Bytes, TtsError>> + Unpin,
{
    let mut file = tokio::fs::File::create(tmp)
        .await
        .map_err(TtsError::StreamWrite)?;

    let mut written: u64 = 0;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        file.write_all(&chunk).await.map_err(TtsError::StreamWrite)?;
    }
    file.flush().await.map_err(TtsError::StreamWrite)?;

    if written == 0 {
        return Err(TtsError::Network("provider returned an empty audio body".to_owned()));
    }
    Ok(written)
}

async fn finish(result: Result<u64, TtsError>, tmp: &Path, path: &Path) -> Result<u64, TtsError> {
    match result {
        Ok(written) => {
            if let Err(e) = tokio::fs::rename(tmp, path).await {
                let _ = tokio::fs::remove_file(tmp).await;
                return Err(TtsError::StreamWrite(e));
            }
            tracing::trace!(target: LOG_TARGET, path = %path.display(), bytes = written, "audio written");
            Ok(written)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(tmp).await;
            Err(e)
        }
    }
}
