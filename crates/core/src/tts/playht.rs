use crate::tts::http::{build_client, check_status, stream_to_file, transport_error};
use crate::tts::{SynthesisRequest, TtsError, VoiceProvider};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.play.ht/api/v2";
const VOICE_ENGINE: &str = "PlayHT2.0";

#[derive(Clone)]
pub struct PlayHtTtsClient {
    client: Client,
    api_key: String,
    user_id: String,
    base_url: String,
}

impl PlayHtTtsClient {
    pub fn new(api_key: String, user_id: String, timeout: Duration) -> Result<Self, TtsError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            user_id,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[derive(Serialize)]
struct PlayHtRequest<'a> {
    text: &'a str,
    voice: &'a str,
    output_format: &'a str,
    voice_engine: &'a str,
    speed: f32,
}

impl VoiceProvider for PlayHtTtsClient {
    fn name(&self) -> &'static str {
        "playht"
    }

    fn synthesize(&self, request: SynthesisRequest) -> BoxFuture<'_, Result<(), TtsError>> {
        async move {
            let url = format!("{}/tts/stream", self.base_url);
            let body = PlayHtRequest {
                text: &request.text,
                voice: request.voice.as_str(),
                output_format: "mp3",
                voice_engine: VOICE_ENGINE,
                speed: 1.0,
            };

            let response = self
                .client
                .post(&url)
                .header("AUTHORIZATION", &self.api_key)
                .header("X-USER-ID", &self.user_id)
                .header("Accept", "audio/mpeg")
                .json(&body)
                .send()
                .await
                .map_err(transport_error)?;

            let response = check_status(response, request.voice.as_str()).await?;
            stream_to_file(response, &request.output_path).await?;
            Ok(())
        }
        .boxed()
    }
}
