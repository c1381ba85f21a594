use ffmpeg_sidecar::{download, paths::ffmpeg_path};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

const LOG_TARGET: &str = "concat";
pub(crate) const MANIFEST_FILE_NAME: &str = "filelist.txt";

#[derive(thiserror::Error, Debug)]
pub enum ConcatError {
    #[error("could not invoke encoder: {0}")]
    EncoderInvocation(String),

    #[error("encoder failed (exit_code={status:?}): {stderr}")]
    EncoderProcess { status: Option<i32>, stderr: String },
}

pub type Result<T> = std::result::Result<T, ConcatError>;

/// Merges audio files into one, in exactly the order given.
pub trait AudioConcatenator: Send + Sync {
    fn combine(&self, inputs: Vec<PathBuf>, output: PathBuf) -> BoxFuture<'_, Result<()>>;
}

#[derive(Clone, Debug, Default)]
pub struct FfmpegConcatenator {
    /// Explicit encoder binary. `None` looks one up at run time, after any
    /// auto-download has had a chance to install it.
    program: Option<PathBuf>,
    auto_download: bool,
}

impl FfmpegConcatenator {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program: Some(program),
            auto_download: false,
        }
    }

    /// Fetch a static ffmpeg build on first use if none is installed.
    pub fn with_auto_download(mut self, auto_download: bool) -> Self {
        self.auto_download = auto_download;
        self
    }

    async fn ensure_ffmpeg_available(&self) -> Result<()> {
        if !self.auto_download {
            return Ok(());
        }
        tokio::task::spawn_blocking(download::auto_download)
            .await
            .map_err(|e| ConcatError::EncoderInvocation(e.to_string()))?
            .map_err(|e| ConcatError::EncoderInvocation(format!("ffmpeg unavailable: {e}")))
    }

    fn resolve_program(&self) -> PathBuf {
        self.program.clone().unwrap_or_else(ffmpeg_path)
    }

    async fn run_ffmpeg(&self, manifest: &Path, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let program = self.resolve_program();
        let mut cmd = tokio::process::Command::new(&program);
        cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(manifest)
            .args(codec_args(inputs, output))
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        tracing::debug!(target: LOG_TARGET, program = %program.display(), inputs = inputs.len(), "running encoder");

        let out = cmd.output().await.map_err(|e| {
            ConcatError::EncoderInvocation(format!(
                "failed to spawn {}: {e}",
                program.display()
            ))
        })?;

        if !out.status.success() {
            return Err(ConcatError::EncoderProcess {
                status: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            });
        }

        if !output.exists() {
            return Err(ConcatError::EncoderProcess {
                status: out.status.code(),
                stderr: format!("encoder exited cleanly but wrote no {}", output.display()),
            });
        }

        Ok(())
    }
}

impl AudioConcatenator for FfmpegConcatenator {
    fn combine(&self, inputs: Vec<PathBuf>, output: PathBuf) -> BoxFuture<'_, Result<()>> {
        async move {
            self.ensure_ffmpeg_available().await?;

            let manifest_path = output.with_file_name(MANIFEST_FILE_NAME);
            tokio::fs::write(&manifest_path, manifest_contents(&inputs))
                .await
                .map_err(|e| {
                    ConcatError::EncoderInvocation(format!(
                        "failed to write manifest {}: {e}",
                        manifest_path.display()
                    ))
                })?;
            let _manifest = ManifestGuard(manifest_path.clone());

            self.run_ffmpeg(&manifest_path, &inputs, &output).await?;
            tracing::info!(target: LOG_TARGET, output = %output.display(), parts = inputs.len(), "audio combined");
            Ok(())
        }
        .boxed()
    }
}

/// Removes the manifest on every exit path.
struct ManifestGuard(PathBuf);

impl Drop for ManifestGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            tracing::warn!(target: LOG_TARGET, path = %self.0.display(), error = %e, "failed to remove manifest");
        }
    }
}

/// One `file '<path>'` line per input, in input order.
fn manifest_contents(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', "'\\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}

/// Stream copy when every input already has the output's container,
/// otherwise re-encode to a codec matching the output extension.
fn codec_args(inputs: &[PathBuf], output: &Path) -> Vec<&'static str> {
    let out_ext = extension_of(output);
    if inputs.iter().all(|p| extension_of(p) == out_ext) {
        return vec!["-c", "copy"];
    }
    let codec = match out_ext.as_str() {
        "mp3" => "libmp3lame",
        "wav" => "pcm_s16le",
        "ogg" => "libvorbis",
        _ => "aac",
    };
    vec!["-c:a", codec]
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_preserves_order_and_escapes_quotes() {
        let inputs = vec![
            PathBuf::from("/tmp/run/002_Host2.mp3"),
            PathBuf::from("/tmp/run/001_Host1.mp3"),
            PathBuf::from("/tmp/it's/003_Host1.mp3"),
        ];
        assert_eq!(
            manifest_contents(&inputs),
            "file '/tmp/run/002_Host2.mp3'\nfile '/tmp/run/001_Host1.mp3'\nfile '/tmp/it'\\''s/003_Host1.mp3'\n"
        );
    }

    #[test]
    fn matching_containers_are_stream_copied() {
        let inputs = vec![PathBuf::from("a.mp3"), PathBuf::from("b.MP3")];
        assert_eq!(codec_args(&inputs, Path::new("out.mp3")), vec!["-c", "copy"]);
    }

    #[test]
    fn mixed_containers_are_reencoded() {
        let inputs = vec![PathBuf::from("a.wav"), PathBuf::from("b.mp3")];
        assert_eq!(
            codec_args(&inputs, Path::new("out.mp3")),
            vec!["-c:a", "libmp3lame"]
        );
        assert_eq!(codec_args(&inputs, Path::new("out.m4a")), vec!["-c:a", "aac"]);
    }

    #[test]
    fn default_encoder_is_looked_up_when_run() {
        let concat = FfmpegConcatenator::default().with_auto_download(true);
        assert_eq!(concat.program, None);
        assert_eq!(concat.resolve_program(), ffmpeg_path());
    }

    #[test]
    fn explicit_encoder_is_kept() {
        let concat = FfmpegConcatenator::new(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"))
            .with_auto_download(true);
        assert_eq!(
            concat.resolve_program(),
            PathBuf::from("/opt/ffmpeg/bin/ffmpeg")
        );
    }

    #[tokio::test]
    async fn missing_manifest_directory_is_invocation_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("gone").join("out.mp3");

        let err = FfmpegConcatenator::new(dir.path().join("no-such-ffmpeg"))
            .combine(vec![dir.path().join("001_Host1.mp3")], output)
            .await
            .unwrap_err();

        match err {
            ConcatError::EncoderInvocation(msg) => assert!(msg.contains("manifest")),
            other => panic!("expected invocation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_encoder_is_invocation_error_and_manifest_removed() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("001_Host1.mp3");
        std::fs::write(&input, b"a").unwrap();

        let concat = FfmpegConcatenator::new(dir.path().join("no-such-ffmpeg"));
        let err = concat
            .combine(vec![input.clone()], dir.path().join("out.mp3"))
            .await
            .unwrap_err();

        assert!(matches!(err, ConcatError::EncoderInvocation(_)));
        assert!(!dir.path().join(MANIFEST_FILE_NAME).exists());
        assert!(input.exists());
    }

    #[cfg(unix)]
    fn fake_encoder(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-ffmpeg.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_concat_demuxer_with_ordered_manifest() {
        let bin_dir = tempfile::tempdir().unwrap();
        let run_dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(
            bin_dir.path(),
            r#"prev=""
for arg; do
  if [ "$prev" = "-i" ]; then cp "$arg" "$(dirname "$arg")/manifest.seen"; fi
  prev="$arg"
done
echo "$@" > "$(dirname "$prev")/args.seen"
printf merged > "$prev""#,
        );
        let inputs: Vec<PathBuf> = ["001_Host1.mp3", "002_Host2.mp3"]
            .iter()
            .map(|n| {
                let p = run_dir.path().join(n);
                std::fs::write(&p, n.as_bytes()).unwrap();
                p
            })
            .collect();
        let output = run_dir.path().join("episode.mp3");

        FfmpegConcatenator::new(encoder)
            .combine(inputs.clone(), output.clone())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"merged");
        assert!(!run_dir.path().join(MANIFEST_FILE_NAME).exists());
        let seen = std::fs::read_to_string(run_dir.path().join("manifest.seen")).unwrap();
        assert_eq!(seen, manifest_contents(&inputs));
        let args = std::fs::read_to_string(run_dir.path().join("args.seen")).unwrap();
        assert!(args.contains("-f concat -safe 0 -i"));
        assert!(args.contains("-c copy"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_surfaces_stderr() {
        let bin_dir = tempfile::tempdir().unwrap();
        let run_dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(bin_dir.path(), "echo 'Invalid data found' >&2\nexit 1");
        let input = run_dir.path().join("001_Host1.mp3");
        std::fs::write(&input, b"a").unwrap();

        let err = FfmpegConcatenator::new(encoder)
            .combine(vec![input.clone()], run_dir.path().join("out.mp3"))
            .await
            .unwrap_err();

        match err {
            ConcatError::EncoderProcess { status, stderr } => {
                assert_eq!(status, Some(1));
                assert_eq!(stderr, "Invalid data found");
            }
            other => panic!("expected process failure, got {other:?}"),
        }
        assert!(!run_dir.path().join(MANIFEST_FILE_NAME).exists());
        assert!(input.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn clean_exit_without_output_is_a_failure() {
        let bin_dir = tempfile::tempdir().unwrap();
        let run_dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(bin_dir.path(), "exit 0");
        let input = run_dir.path().join("001_Host1.mp3");
        std::fs::write(&input, b"a").unwrap();

        let err = FfmpegConcatenator::new(encoder)
            .combine(vec![input], run_dir.path().join("out.mp3"))
            .await
            .unwrap_err();

        assert!(matches!(err, ConcatError::EncoderProcess { .. }));
    }
}
