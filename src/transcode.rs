use crate::error::RelayError;
use crate::types::MediaFile;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Opaque byte transform applied to voice notes before they reach the
/// support platform.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &MediaFile) -> Result<MediaFile, RelayError>;
}

pub struct FfmpegTranscoder {
    program: String,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

pub fn mp3_filename(original: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("audio");
    format!("{stem}.mp3")
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &MediaFile) -> Result<MediaFile, RelayError> {
        let mut child = Command::new(&self.program)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-i", "pipe:0", "-f", "mp3", "-acodec", "libmp3lame", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| RelayError::Upstream(format!("cannot start {}: {err}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RelayError::Upstream("transcoder stdin unavailable".to_string()))?;
        let bytes = input.bytes.clone();
        // Feed stdin concurrently with draining stdout.
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&bytes).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| RelayError::Upstream(format!("transcoder failed: {err}")))?;
        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::debug!("transcoder closed stdin early: {err}"),
            Err(err) => tracing::debug!("transcoder writer task failed: {err}"),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RelayError::Upstream(format!(
                "transcoder exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(RelayError::Upstream("transcoder produced no output".to_string()));
        }

        tracing::debug!(
            input_bytes = input.bytes.len(),
            output_bytes = output.stdout.len(),
            "transcoded audio"
        );
        Ok(MediaFile {
            bytes: output.stdout.into(),
            mimetype: "audio/mpeg".to_string(),
            filename: mp3_filename(&input.filename),
        })
    }
}
