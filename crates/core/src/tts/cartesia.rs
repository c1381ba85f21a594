use crate::tts::http::{buffered_to_file, build_client, check_status, transport_error};
use crate::tts::{SynthesisRequest, TtsError, VoiceProvider};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.cartesia.ai";
const API_VERSION: &str = "2024-06-10";
const MODEL_ID: &str = "sonic-english";

#[derive(Clone)]
pub struct CartesiaTtsClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl CartesiaTtsClient {
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
struct BytesRequest<'a> {
    model_id: &'a str,
    transcript: &'a str,
    voice: VoiceSpec<'a>,
    output_format: OutputFormat,
}

#[derive(Serialize)]
struct VoiceSpec<'a> {
    mode: &'a str,
    id: &'a str,
}

#[derive(Serialize)]
struct OutputFormat {
    container: &'static str,
    bit_rate: u32,
    sample_rate: u32,
}

impl VoiceProvider for CartesiaTtsClient {
    fn name(&self) -> &'static str {
        "cartesia"
    }

    fn synthesize(&self, request: SynthesisRequest) -> BoxFuture<'_, Result<(), TtsError>> {
        async move {
            let url = format!("{}/tts/bytes", self.base_url);
            let body = BytesRequest {
                model_id: MODEL_ID,
                transcript: &request.text,
                voice: VoiceSpec {
                    mode: "id",
                    id: request.voice.as_str(),
                },
                output_format: OutputFormat {
                    container: "mp3",
                    bit_rate: 128_000,
                    sample_rate: 44_100,
                },
            };

            let response = self
                .client
                .post(&url)
                .header("X-API-Key", &self.api_key)
                .header("Cartesia-Version", API_VERSION)
                .json(&body)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::{ErrorKind, VoiceId};
    use httpmock::Method::POST;
    use httpmock::MockServer;

    fn client(base_url: String) -> CartesiaTtsClient {
        CartesiaTtsClient::new("ca-key".into(), Duration::from_secs(5))
            .unwrap()
            .with_base_url(base_url)
    }

    fn request(out: std::path::PathBuf) -> SynthesisRequest {
        SynthesisRequest {
            text: "Right".into(),
            voice: VoiceId("voice-uuid".into()),
            output_path: out,
        }
    }

    #[tokio::test]
    async fn posts_transcript_with_voice_spec() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/tts/bytes")
                .header("x-api-key", "ca-key")
                .header("cartesia-version", API_VERSION)
                .json_body_partial(
                    r#"{"transcript":"Right","voice":{"mode":"id","id":"voice-uuid"},"output_format":{"container":"mp3"}}"#,
                );
            then.status(200).body(b"cartesia-audio");
        });
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("004_Host2.mp3");

        client(server.base_url())
            .synthesize(request(out.clone()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(std::fs::read(&out).unwrap(), b"cartesia-audio");
    }

    #[tokio::test]
    async fn server_error_is_network_kind() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/tts/bytes");
            then.status(502).body("bad gateway");
        });
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("001_Host1.mp3");

        let err = client(server.base_url())
            .synthesize(request(out.clone()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn empty_body_is_not_treated_as_audio() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/tts/bytes");
            then.status(200);
        });
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("001_Host1.mp3");

        let err = client(server.base_url())
            .synthesize(request(out.clone()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(!out.exists());
    }
}
