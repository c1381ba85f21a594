mod cartesia;
mod deepgram;
mod elevenlabs;
mod http;
mod playht;

use crate::config::{ProviderConfig, ProviderKind};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub use cartesia::CartesiaTtsClient;
pub use deepgram::DeepgramTtsClient;
pub use elevenlabs::ElevenLabsTtsClient;
pub use playht::PlayHtTtsClient;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VoiceId(pub String);

impl VoiceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: VoiceId,
    pub output_path: PathBuf,
}

/// The closed set of per-turn failure categories surfaced in run results.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Auth,
    QuotaOrRateLimit,
    Network,
    UnsupportedVoice,
    StreamWrite,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::QuotaOrRateLimit | ErrorKind::Network)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Auth => "auth",
            ErrorKind::QuotaOrRateLimit => "quota_or_rate_limit",
            ErrorKind::Network => "network",
            ErrorKind::UnsupportedVoice => "unsupported_voice",
            ErrorKind::StreamWrite => "stream_write",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("quota exhausted or rate limited: {0}")]
    QuotaOrRateLimit(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("voice `{voice}` not accepted: {details}")]
    UnsupportedVoice { voice: String, details: String },

    #[error("failed writing audio to disk: {0}")]
    StreamWrite(#[source] std::io::Error),
}

impl TtsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TtsError::Auth(_) => ErrorKind::Auth,
            TtsError::QuotaOrRateLimit(_) => ErrorKind::QuotaOrRateLimit,
            TtsError::Network(_) => ErrorKind::Network,
            TtsError::UnsupportedVoice { .. } => ErrorKind::UnsupportedVoice,
            TtsError::StreamWrite(_) => ErrorKind::StreamWrite,
        }
    }
}

/// A text-to-speech backend.
///
/// On success a complete audio file exists at `request.output_path`. On
/// failure nothing is left at that path. No retries happen in here.
pub trait VoiceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extension of the files this provider writes, without the dot.
    fn audio_extension(&self) -> &'static str {
        "mp3"
    }

    fn synthesize(&self, request: SynthesisRequest) -> BoxFuture<'_, Result<(), TtsError>>;
}

/// Builds the provider selected by `config`. This is the only place that
/// branches on the provider kind.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn VoiceProvider>, TtsError> {
    let key = config.api_key.expose().to_owned();
    let timeout = config.timeout.duration();

    let provider: Arc<dyn VoiceProvider> = match config.kind {
        ProviderKind::ElevenLabs => Arc::new(ElevenLabsTtsClient::new(key, timeout)?),
        ProviderKind::Deepgram => Arc::new(DeepgramTtsClient::new(key, timeout)?),
        ProviderKind::PlayHt => {
            let user_id = config.user_id.clone().ok_or_else(|| {
                TtsError::Auth("playht requires a user id alongside the api key".to_owned())
            })?;
            Arc::new(PlayHtTtsClient::new(key, user_id, timeout)?)
        }
        ProviderKind::Cartesia => Arc::new(CartesiaTtsClient::new(key, timeout)?),
    };

    tracing::debug!(provider = provider.name(), "voice provider ready");
    Ok(provider)
}
