//! Drives a single dialogue turn through a voice provider.

use crate::dialogue::{DialogueTurn, Speaker};
use crate::progress::{
    ProgressEvent, ProgressSink, STAGE_TURN_COMPLETED, STAGE_TURN_FAILED, STAGE_TURN_STARTED,
};
use crate::tts::{ErrorKind, SynthesisRequest, TtsError, VoiceId, VoiceProvider};
use crate::util::{retry_with_backoff, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "synth";
const PREVIEW_CHARS: usize = 30;

/// `NNN_<Speaker>.<ext>`, zero-padded so lexical order matches turn order.
pub fn turn_file_name(index: usize, speaker: Speaker, extension: &str) -> String {
    format!("{index:03}_{speaker}.{extension}")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesisJob {
    pub turn: DialogueTurn,
    pub voice: VoiceId,
    pub output_path: PathBuf,
}

impl SynthesisJob {
    pub fn new(turn: DialogueTurn, voice: VoiceId, run_dir: &Path, extension: &str) -> Self {
        let output_path = run_dir.join(turn_file_name(turn.index, turn.speaker, extension));
        Self {
            turn,
            voice,
            output_path,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnFailure {
    pub turn_index: usize,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Success(PathBuf),
    Failure(TurnFailure),
}

#[derive(Clone, Debug)]
pub struct TurnSynthesizer {
    retry: RetryConfig,
}

impl Default for TurnSynthesizer {
    fn default() -> Self {
        Self::new(RetryConfig::none())
    }
}

impl TurnSynthesizer {
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }

    /// Never fails as a whole: provider errors come back as
    /// [`TurnOutcome::Failure`] so the caller decides whether to go on.
    pub async fn run(
        &self,
        job: &SynthesisJob,
        provider: &dyn VoiceProvider,
        sink: &dyn ProgressSink,
    ) -> TurnOutcome {
        let turn = &job.turn;
        sink.report(ProgressEvent::new(
            STAGE_TURN_STARTED,
            format!(
                "{} (part {}): {}",
                turn.speaker,
                turn.index,
                preview(&turn.text)
            ),
        ));

        let request = SynthesisRequest {
            text: turn.text.clone(),
            voice: job.voice.clone(),
            output_path: job.output_path.clone(),
        };

        let result = retry_with_backoff(
            &self.retry,
            || provider.synthesize(request.clone()),
            |e: &TtsError| e.kind().is_retryable(),
        )
        .await;

        match result {
            Ok(()) => {
                tracing::debug!(
                    target: LOG_TARGET,
                    turn = turn.index,
                    speaker = %turn.speaker,
                    path = %job.output_path.display(),
                    "turn synthesized"
                );
                sink.report(ProgressEvent::new(
                    STAGE_TURN_COMPLETED,
                    format!("{} (part {})", turn.speaker, turn.index),
                ));
                TurnOutcome::Success(job.output_path.clone())
            }
            Err(e) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    turn = turn.index,
                    speaker = %turn.speaker,
                    provider = provider.name(),
                    kind = %e.kind(),
                    error = %e,
                    "turn synthesis failed"
                );
                sink.report(ProgressEvent::new(
                    STAGE_TURN_FAILED,
                    format!("{} (part {}): {e}", turn.speaker, turn.index),
                ));
                TurnOutcome::Failure(TurnFailure {
                    turn_index: turn.index,
                    kind: e.kind(),
                    message: e.to_string(),
                })
            }
        }
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}
