#![deny(warnings)]

use anyhow::Context;
use clap::Parser;
use podcast_tts_core::concat::FfmpegConcatenator;
use podcast_tts_core::config::{
    resolve_provider_config, resolve_provider_kind, ProviderConfig, ProviderKind,
    ProviderOverrides, RequestTimeout, StdEnv, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use podcast_tts_core::pipeline::{
    CancelFlag, PipelineConfig, PipelineError, RunResult, SynthesisPipeline, VoiceBindings,
};
use podcast_tts_core::progress::TracingProgressSink;
use podcast_tts_core::tts::build_provider;
use podcast_tts_core::util::RetryConfig;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "podcast-tts")]
#[command(about = "Turn a Host1:/Host2: dialogue script into a single podcast audio file")]
struct Args {
    /// Script file to read; stdin when omitted.
    #[arg(long)]
    script: Option<PathBuf>,

    /// elevenlabs, deepgram, playht or cartesia (env: PODCAST_TTS_PROVIDER).
    #[arg(long)]
    provider: Option<String>,

    #[arg(long)]
    api_key: Option<String>,

    /// Account id for providers that need one (env: PLAYHT_USER_ID).
    #[arg(long)]
    user_id: Option<String>,

    #[arg(long)]
    host1_voice: Option<String>,

    #[arg(long)]
    host2_voice: Option<String>,

    /// Where the run directory is created; defaults to the system temp dir.
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Base name of the merged file.
    #[arg(long)]
    name: Option<String>,

    #[arg(long, default_value_t = 1)]
    max_attempts: u32,

    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// ffmpeg binary to use instead of the one found on PATH.
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    auto_download_ffmpeg: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let provider_cfg = build_provider_config(&args, &env)?;
    tracing::info!(
        provider = %provider_cfg.kind,
        host1_voice = %provider_cfg.host1_voice,
        host2_voice = %provider_cfg.host2_voice,
        "config loaded"
    );

    let script = read_script(args.script.as_deref())?;
    let name = args
        .name
        .clone()
        .unwrap_or_else(|| default_podcast_name(args.script.as_deref(), SystemTime::now()));

    let result = run(&args, &provider_cfg, &script, name).await?;
    print_summary(&result);

    if let Some(failure) = &result.terminal {
        anyhow::bail!("{failure}");
    }
    Ok(())
}

async fn run(
    args: &Args,
    provider_cfg: &ProviderConfig,
    script: &str,
    name: String,
) -> anyhow::Result<RunResult> {
    let provider = build_provider(provider_cfg).context("failed to set up voice provider")?;

    let concatenator = match &args.ffmpeg {
        Some(path) => FfmpegConcatenator::new(path.clone()),
        None => FfmpegConcatenator::default(),
    }
    .with_auto_download(args.auto_download_ffmpeg);

    let retry = RetryConfig::new(args.max_attempts, Duration::from_secs(1));
    let pipeline_cfg = PipelineConfig::new(args.work_dir.clone(), name).with_retry(retry);

    let cancel = CancelFlag::new();
    spawn_ctrl_c_handler(cancel.clone());

    let pipeline =
        SynthesisPipeline::new(pipeline_cfg, Arc::new(concatenator)).with_cancel_flag(cancel);
    let bindings = VoiceBindings::from_config(provider_cfg);

    match pipeline
        .run_script(script, &bindings, provider.as_ref(), &TracingProgressSink)
        .await
    {
        Ok(result) => Ok(result),
        Err(PipelineError::NoSynthesizableContent) => anyhow::bail!(
            "the script has no lines starting with `Host1:` or `Host2:`; nothing to synthesize"
        ),
        Err(e) => Err(e).context("synthesis run failed"),
    }
}

fn spawn_ctrl_c_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current turn");
            cancel.cancel();
        }
    });
}

fn print_summary(result: &RunResult) {
    println!(
        "turns: {} total, {} succeeded, {} failed{}",
        result.total_turns,
        result.succeeded_paths.len(),
        result.failures.len(),
        if result.cancelled { " (cancelled)" } else { "" }
    );
    for failure in &result.failures {
        println!(
            "  part {:03} failed [{}]: {}",
            failure.turn_index, failure.kind, failure.message
        );
    }
    match (&result.final_audio_path, &result.terminal) {
        (Some(path), _) => println!("podcast written to {}", path.display()),
        (None, Some(failure)) => {
            println!("no podcast written: {failure}");
            println!("intermediate files kept in {}", result.run_dir.display());
        }
        (None, None) => {}
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_provider_config(
    args: &Args,
    env: &impl podcast_tts_core::config::Env,
) -> anyhow::Result<ProviderConfig> {
    let kind = resolve_provider_kind(args.provider.clone(), env, ProviderKind::ElevenLabs)?;
    let timeout = RequestTimeout::new(args.timeout_secs)?;
    let overrides = ProviderOverrides {
        api_key: args.api_key.clone(),
        user_id: args.user_id.clone(),
        host1_voice: args.host1_voice.clone(),
        host2_voice: args.host2_voice.clone(),
    };
    Ok(resolve_provider_config(kind, overrides, timeout, env)?)
}

fn read_script(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("failed to read script {}", p.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read script from stdin")?;
            Ok(buf)
        }
    }
}

fn default_podcast_name(script: Option<&Path>, now: SystemTime) -> String {
    let stem = script
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .unwrap_or("podcast");
    let secs = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("{stem}_{secs}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use podcast_tts_core::config::{ConfigError, MapEnv};

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["podcast-tts"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn podcast_name_uses_script_stem_and_timestamp() {
        let now = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(
            default_podcast_name(Some(Path::new("/src/main.rs.script")), now),
            "main.rs_1700000000"
        );
        assert_eq!(default_podcast_name(None, now), "podcast_1700000000");
    }

    #[test]
    fn provider_flag_selects_backend() {
        let env = MapEnv::default().with_var("DEEPGRAM_API_KEY", "dg");
        let cfg = build_provider_config(&args(&["--provider", "deepgram"]), &env).unwrap();
        assert_eq!(cfg.kind, ProviderKind::Deepgram);
        assert_eq!(cfg.api_key.expose(), "dg");
    }

    #[test]
    fn missing_credentials_fail_before_any_run() {
        let err = build_provider_config(&args(&["--provider", "cartesia"]), &MapEnv::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingApiKey { .. })
        ));
    }
}
