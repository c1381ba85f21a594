use crate::concat::{AudioConcatenator, ConcatError, MANIFEST_FILE_NAME};
use crate::config::ProviderConfig;
use crate::dialogue::{self, DialogueTurn, Speaker};
use crate::progress::{
    ProgressEvent, ProgressSink, STAGE_CLEANUP, STAGE_CONCAT_COMPLETED, STAGE_CONCAT_FAILED,
    STAGE_CONCAT_STARTED,
};
use crate::synth::{turn_file_name, SynthesisJob, TurnFailure, TurnOutcome, TurnSynthesizer};
use crate::tts::{VoiceId, VoiceProvider};
use crate::util::RetryConfig;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const LOG_TARGET: &str = "pipeline";
const RUN_DIR_PREFIX: &str = "podcast-tts";

/// Errors that stop a run before any audio is requested, plus unexpected
/// local faults.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("no synthesizable content: the script has no Host1:/Host2: lines")]
    NoSynthesizableContent,

    #[error("no voice bound for {0}")]
    MissingVoiceBinding(Speaker),

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a run that got past its preconditions still produced no merged file.
#[derive(thiserror::Error, Debug)]
pub enum RunFailure {
    #[error("no audio produced: every turn failed")]
    NoAudioProduced,

    #[error("run cancelled before any audio was produced")]
    Cancelled,

    #[error("failed to combine audio: {0}")]
    Concatenation(#[from] ConcatError),
}

#[derive(Debug)]
pub struct RunResult {
    pub run_dir: PathBuf,
    pub total_turns: usize,
    pub succeeded_paths: Vec<PathBuf>,
    pub final_audio_path: Option<PathBuf>,
    pub failures: Vec<TurnFailure>,
    pub cancelled: bool,
    pub terminal: Option<RunFailure>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.terminal.is_none() && self.final_audio_path.is_some()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoiceBindings(BTreeMap<Speaker, VoiceId>);

impl VoiceBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, speaker: Speaker, voice: impl Into<String>) -> Self {
        self.0.insert(speaker, VoiceId(voice.into()));
        self
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new()
            .bind(Speaker::Host1, config.host1_voice.clone())
            .bind(Speaker::Host2, config.host2_voice.clone())
    }

    pub fn get(&self, speaker: Speaker) -> Option<&VoiceId> {
        self.0.get(&speaker)
    }

    fn ensure_complete(&self) -> Result<(), PipelineError> {
        match Speaker::ALL.into_iter().find(|s| !self.0.contains_key(s)) {
            Some(missing) => Err(PipelineError::MissingVoiceBinding(missing)),
            None => Ok(()),
        }
    }
}

/// Checked once per turn; set it to stop before the next turn starts.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub work_root: PathBuf,
    pub podcast_name: String,
    pub retry: RetryConfig,
}

impl PipelineConfig {
    pub fn new(work_root: Option<PathBuf>, podcast_name: impl Into<String>) -> Self {
        Self {
            work_root: work_root.unwrap_or_else(std::env::temp_dir),
            podcast_name: podcast_name.into(),
            retry: RetryConfig::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

pub struct SynthesisPipeline {
    config: PipelineConfig,
    synthesizer: TurnSynthesizer,
    concatenator: Arc<dyn AudioConcatenator>,
    cancel: Option<CancelFlag>,
}

impl SynthesisPipeline {
    pub fn new(config: PipelineConfig, concatenator: Arc<dyn AudioConcatenator>) -> Self {
        Self {
            synthesizer: TurnSynthesizer::new(config.retry.clone()),
            config,
            concatenator,
            cancel: None,
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn run_script(
        &self,
        script: &str,
        bindings: &VoiceBindings,
        provider: &dyn VoiceProvider,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, PipelineError> {
        let turns = dialogue::parse(script);
        self.run(&turns, bindings, provider, sink).await
    }

    /// Synthesizes `turns` strictly in order and merges whatever succeeded.
    ///
    /// Per-turn failures are collected in the result; only precondition
    /// errors and local i/o faults come back as `Err`.
    pub async fn run(
        &self,
        turns: &[DialogueTurn],
        bindings: &VoiceBindings,
        provider: &dyn VoiceProvider,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, PipelineError> {
        if turns.is_empty() {
            return Err(PipelineError::NoSynthesizableContent);
        }
        bindings.ensure_complete()?;

        let run_dir = self.create_run_dir().await?;
        let extension = provider.audio_extension();
        tracing::info!(
            target: LOG_TARGET,
            provider = provider.name(),
            turns = turns.len(),
            run_dir = %run_dir.display(),
            "starting synthesis run"
        );

        let mut succeeded_paths = Vec::new();
        let mut failures = Vec::new();
        let mut cancelled = false;

        for turn in turns {
            if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                tracing::warn!(target: LOG_TARGET, next_turn = turn.index, "run cancelled");
                cancelled = true;
                break;
            }

            let voice = bindings
                .get(turn.speaker)
                .cloned()
                .ok_or(PipelineError::MissingVoiceBinding(turn.speaker))?;
            let job = SynthesisJob::new(turn.clone(), voice, &run_dir, extension);

            match self.synthesizer.run(&job, provider, sink).await {
                TurnOutcome::Success(path) => succeeded_paths.push(path),
                TurnOutcome::Failure(failure) => failures.push(failure),
            }
        }

        let mut result = RunResult {
            run_dir,
            total_turns: turns.len(),
            succeeded_paths,
            final_audio_path: None,
            failures,
            cancelled,
            terminal: None,
        };

        if result.succeeded_paths.is_empty() {
            let failure = if cancelled {
                RunFailure::Cancelled
            } else {
                RunFailure::NoAudioProduced
            };
            tracing::error!(target: LOG_TARGET, failed = result.failures.len(), "{failure}");
            result.terminal = Some(failure);
            return Ok(result);
        }

        let output = result
            .run_dir
            .join(merged_file_name(&self.config.podcast_name, turns, extension));
        self.combine_and_clean(&mut result, output, sink).await;
        Ok(result)
    }

    async fn combine_and_clean(
        &self,
        result: &mut RunResult,
        output: PathBuf,
        sink: &dyn ProgressSink,
    ) {
        sink.report(ProgressEvent::new(
            STAGE_CONCAT_STARTED,
            format!("combining {} parts", result.succeeded_paths.len()),
        ));

        match self
            .concatenator
            .combine(result.succeeded_paths.clone(), output.clone())
            .await
        {
            Ok(()) => {
                sink.report(ProgressEvent::new(
                    STAGE_CONCAT_COMPLETED,
                    output.display().to_string(),
                ));
                let removed = remove_parts(&result.succeeded_paths, &output).await;
                sink.report(ProgressEvent::new(
                    STAGE_CLEANUP,
                    format!(
                        "removed {removed} of {} part files",
                        result.succeeded_paths.len()
                    ),
                ));
                result.final_audio_path = Some(output);
            }
            Err(e) => {
                tracing::error!(target: LOG_TARGET, error = %e, "concatenation failed, keeping part files");
                sink.report(ProgressEvent::new(STAGE_CONCAT_FAILED, e.to_string()));
                result.terminal = Some(RunFailure::Concatenation(e));
            }
        }
    }

    async fn create_run_dir(&self) -> Result<PathBuf, PipelineError> {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let suffix: u32 = rand::random();
        let dir = self
            .config
            .work_root
            .join(format!("{RUN_DIR_PREFIX}-{secs}-{suffix:08x}"));

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| PipelineError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(dir)
    }
}

/// Deletes the per-turn files, never touching `keep`. Returns how many
/// were actually removed.
async fn remove_parts(paths: &[PathBuf], keep: &Path) -> usize {
    let mut removed = 0;
    for path in paths.iter().filter(|p| p.as_path() != keep) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, path = %path.display(), error = %e, "failed to remove part file");
            }
        }
    }
    removed
}

/// Name of the merged file inside the run directory. Falls back to a
/// `_merged` suffix when the podcast name would land on a per-turn file or
/// the concat manifest. Compared case-insensitively.
fn merged_file_name(podcast_name: &str, turns: &[DialogueTurn], extension: &str) -> String {
    let mut taken: HashSet<String> = turns
        .iter()
        .flat_map(|t| {
            let part = turn_file_name(t.index, t.speaker, extension);
            [format!("{part}.part"), part]
        })
        .map(|n| n.to_lowercase())
        .collect();
    taken.insert(MANIFEST_FILE_NAME.to_lowercase());

    let base = sanitize_name(podcast_name);
    let mut candidate = format!("{base}.{extension}");
    let mut attempt = 1;
    while taken.contains(&candidate.to_lowercase()) {
        candidate = match attempt {
            1 => format!("{base}_merged.{extension}"),
            n => format!("{base}_merged_{n}.{extension}"),
        };
        attempt += 1;
    }
    candidate
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "podcast".to_owned()
    } else {
        cleaned
    }
}
