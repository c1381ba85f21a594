use crate::tts::http::{build_client, check_status, stream_to_file, transport_error};
use crate::tts::{SynthesisRequest, TtsError, VoiceProvider};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io/v1";
const MODEL_ID: &str = "eleven_multilingual_v2";
const OUTPUT_FORMAT: &str = "mp3_44100_128";

#[derive(Clone)]
pub struct ElevenLabsTtsClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ElevenLabsTtsClient {
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
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    use_speaker_boost: bool,
    speed: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.5,
            use_speaker_boost: true,
            speed: 1.0,
        }
    }
}

impl VoiceProvider for ElevenLabsTtsClient {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    fn synthesize(&self, request: SynthesisRequest) -> BoxFuture<'_, Result<(), TtsError>> {
        async move {
            let url = format!(
                "{}/text-to-speech/{}/stream?output_format={OUTPUT_FORMAT}",
                self.base_url,
                urlencoding::encode(request.voice.as_str())
            );

            let body = ElevenLabsRequest {
                text: &request.text,
                model_id: MODEL_ID,
                voice_settings: VoiceSettings::default(),
            };

            let response = self
                .client
                .post(&url)
                .header("xi-api-key", &self.api_key)
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
