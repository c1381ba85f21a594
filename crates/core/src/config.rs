use crate::dialogue::Speaker;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const ENV_PROVIDER: &str = "PODCAST_TTS_PROVIDER";
pub const ENV_PLAYHT_USER_ID: &str = "PLAYHT_USER_ID";

const ELEVENLABS_DEFAULT_HOST1_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";
const ELEVENLABS_DEFAULT_HOST2_VOICE: &str = "29vD33N1CtxCmqQRPOHJ";
const DEEPGRAM_DEFAULT_HOST1_VOICE: &str = "aura-asteria-en";
const DEEPGRAM_DEFAULT_HOST2_VOICE: &str = "aura-orion-en";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    ElevenLabs,
    Deepgram,
    PlayHt,
    Cartesia,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::ElevenLabs,
        ProviderKind::Deepgram,
        ProviderKind::PlayHt,
        ProviderKind::Cartesia,
    ];

    pub fn id(self) -> &'static str {
        match self {
            ProviderKind::ElevenLabs => "elevenlabs",
            ProviderKind::Deepgram => "deepgram",
            ProviderKind::PlayHt => "playht",
            ProviderKind::Cartesia => "cartesia",
        }
    }

    pub fn api_key_env(self) -> String {
        format!("{}_API_KEY", self.env_prefix())
    }

    pub fn voice_env(self, speaker: Speaker) -> String {
        let host = match speaker {
            Speaker::Host1 => "HOST1",
            Speaker::Host2 => "HOST2",
        };
        format!("{}_{host}_VOICE_ID", self.env_prefix())
    }

    fn env_prefix(self) -> &'static str {
        match self {
            ProviderKind::ElevenLabs => "ELEVENLABS",
            ProviderKind::Deepgram => "DEEPGRAM",
            ProviderKind::PlayHt => "PLAYHT",
            ProviderKind::Cartesia => "CARTESIA",
        }
    }

    fn default_voice(self, speaker: Speaker) -> Option<&'static str> {
        match (self, speaker) {
            (ProviderKind::ElevenLabs, Speaker::Host1) => Some(ELEVENLABS_DEFAULT_HOST1_VOICE),
            (ProviderKind::ElevenLabs, Speaker::Host2) => Some(ELEVENLABS_DEFAULT_HOST2_VOICE),
            (ProviderKind::Deepgram, Speaker::Host1) => Some(DEEPGRAM_DEFAULT_HOST1_VOICE),
            (ProviderKind::Deepgram, Speaker::Host2) => Some(DEEPGRAM_DEFAULT_HOST2_VOICE),
            _ => None,
        }
    }

    fn requires_user_id(self) -> bool {
        matches!(self, ProviderKind::PlayHt)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.id() == wanted)
            .ok_or_else(|| ConfigError::UnknownProvider(s.to_owned()))
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestTimeout {
    pub secs: u64,
}

impl RequestTimeout {
    pub fn new(secs: u64) -> Result<Self, ConfigError> {
        if secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(Self { secs })
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.secs)
    }
}

impl Default for RequestTimeout {
    fn default() -> Self {
        Self {
            secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Everything needed to build one voice provider and bind both speakers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: ApiKey,
    pub user_id: Option<String>,
    pub host1_voice: String,
    pub host2_voice: String,
    pub timeout: RequestTimeout,
}

/// Values supplied on the command line; each one overrides its env var.
#[derive(Clone, Debug, Default)]
pub struct ProviderOverrides {
    pub api_key: Option<String>,
    pub user_id: Option<String>,
    pub host1_voice: Option<String>,
    pub host2_voice: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("request timeout must be > 0 s")]
    ZeroTimeout,
    #[error("unknown voice provider `{0}` (expected one of elevenlabs, deepgram, playht, cartesia)")]
    UnknownProvider(String),
    #[error("no api key for {provider}; pass --api-key or set {env}")]
    MissingApiKey { provider: ProviderKind, env: String },
    #[error("{provider} requires a user id; pass --user-id or set {env}")]
    MissingUserId { provider: ProviderKind, env: String },
    #[error("no {speaker} voice for {provider}; set {env}")]
    MissingVoice {
        provider: ProviderKind,
        speaker: Speaker,
        env: String,
    },
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match cli_value {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => match env.var(env_key) {
            Some(v) => Ok(Some(ApiKey::new(v)?)),
            None => Ok(None),
        },
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    let value = match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    };
    value.filter(|v| !v.trim().is_empty())
}

pub fn resolve_provider_kind(
    cli_value: Option<String>,
    env: &impl Env,
    default: ProviderKind,
) -> Result<ProviderKind, ConfigError> {
    match resolve_optional_string(cli_value, ENV_PROVIDER, env) {
        Some(v) => v.parse(),
        None => Ok(default),
    }
}

/// Resolves credentials and voices for `kind`. Every precondition the run
/// needs is checked here, before any network call is made.
pub fn resolve_provider_config(
    kind: ProviderKind,
    overrides: ProviderOverrides,
    timeout: RequestTimeout,
    env: &impl Env,
) -> Result<ProviderConfig, ConfigError> {
    let key_env = kind.api_key_env();
    let api_key = resolve_api_key(overrides.api_key, &key_env, env)?.ok_or(
        ConfigError::MissingApiKey {
            provider: kind,
            env: key_env,
        },
    )?;

    let user_id = resolve_optional_string(overrides.user_id, ENV_PLAYHT_USER_ID, env);
    if kind.requires_user_id() && user_id.is_none() {
        return Err(ConfigError::MissingUserId {
            provider: kind,
            env: ENV_PLAYHT_USER_ID.to_owned(),
        });
    }

    let host1_voice = resolve_voice(kind, Speaker::Host1, overrides.host1_voice, env)?;
    let host2_voice = resolve_voice(kind, Speaker::Host2, overrides.host2_voice, env)?;

    Ok(ProviderConfig {
        kind,
        api_key,
        user_id,
        host1_voice,
        host2_voice,
        timeout,
    })
}

fn resolve_voice(
    kind: ProviderKind,
    speaker: Speaker,
    cli_value: Option<String>,
    env: &impl Env,
) -> Result<String, ConfigError> {
    let env_key = kind.voice_env(speaker);
    resolve_optional_string(cli_value, &env_key, env)
        .or_else(|| kind.default_voice(speaker).map(str::to_owned))
        .ok_or(ConfigError::MissingVoice {
            provider: kind,
            speaker,
            env: env_key,
        })
}
