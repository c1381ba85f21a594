use crate::tts::http::{buffered_to_file, build_client, check_status, transport_error};
use crate::tts::{SynthesisRequest, TtsError, VoiceProvider};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.deepgram.com/v1";

/// Deepgram Aura. The voice id is the model name, e.g. `aura-asteria-en`.
#[derive(Clone)]
pub struct DeepgramTtsClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl DeepgramTtsClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, TtsError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

impl VoiceProvider for DeepgramTtsClient {
    fn name(&self) -> &'static str {
        "deepgram"
    }

    fn synthesize(&self, request: SynthesisRequest) -> BoxFuture<'_, Result<(), TtsError>> {
        async move {
            let url = format!(
                "{}/speak?model={}&encoding=mp3",
                self.base_url,
                urlencoding::encode(request.voice.as_str())
            );

            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Token {}", self.api_key))
                .json(&SpeakRequest {
                    text: &request.text,
                })
                .send()
                .await
                .map_err(transport_error)?;

            let response = check_status(response, request.voice.as_str()).await?;
            buffered_to_file(response, &request.output_path).await?;
            Ok(())
        }
        .boxed()
    }
}
