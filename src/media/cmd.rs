//! Subprocess boundary for the ffmpeg/ffprobe encoding toolchain.
//!
//! Every invocation is a command-line subprocess with a hard timeout; a hung
//! encoder surfaces as a `TimedOut` error instead of wedging the service.

use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command as TokioCommand;

use crate::domain::postprocess::VariantSpec;
use crate::media::loudness::LoudnessMeasurement;

/// Fixed audio bitrate for every audio re-encode in the pipeline.
pub const AUDIO_BITRATE: &str = "192k";
/// Fixed visual-quality target for variant encodes (CRF, not bitrate).
pub const VIDEO_CRF: &str = "23";
/// True peak ceiling for loudness normalization, dBTP.
pub const TRUE_PEAK_CEILING: f64 = -1.5;
/// Loudness range target for normalization, LU.
pub const LOUDNESS_RANGE: f64 = 11.0;

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait FfmpegRunner: Send + Sync {
    /// ffprobe the container duration of a media file
    async fn run_ffprobe_for_duration(&self, media_path: &Path) -> io::Result<Output>;

    /// Merge a separate audio track into a video stream (video copied,
    /// audio re-encoded, trimmed to the shorter stream)
    async fn run_audio_merge(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> io::Result<Output>;

    /// Loudness measurement pass; the measurement JSON lands on stderr
    async fn run_loudness_measure(&self, media_path: &Path, target_lufs: f64)
        -> io::Result<Output>;

    /// Loudness application pass using the measured values
    async fn run_loudness_apply(
        &self,
        media_path: &Path,
        output_path: &Path,
        target_lufs: f64,
        measured: &LoudnessMeasurement,
    ) -> io::Result<Output>;

    /// Scale-then-pad variant encode at the fixed quality target
    async fn run_variant_encode(
        &self,
        media_path: &Path,
        output_path: &Path,
        spec: &VariantSpec,
    ) -> io::Result<Output>;

    /// ffmpeg -version, used by the availability probe
    async fn run_version_check(&self) -> io::Result<Output>;
}

#[derive(Clone, Copy)]
pub struct RealFfmpegRunner {
    timeout: Duration,
}

impl RealFfmpegRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run_with_timeout(&self, mut command: TokioCommand) -> io::Result<Output> {
        command.kill_on_drop(true);
        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("encoder invocation exceeded {:?}", self.timeout),
            )),
        }
    }
}

#[async_trait]
impl FfmpegRunner for RealFfmpegRunner {
    async fn run_ffprobe_for_duration(&self, media_path: &Path) -> io::Result<Output> {
        let mut command = TokioCommand::new("ffprobe");
        command
            .arg("-v").arg("error")
            .arg("-show_entries").arg("format=duration")
            .arg("-of").arg("default=noprint_wrappers=1:nokey=1")
            .arg(media_path);
        self.run_with_timeout(command).await
    }

    async fn run_audio_merge(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> io::Result<Output> {
        let mut command = TokioCommand::new("ffmpeg");
        command
            .arg("-y")
            .arg("-i").arg(video_path)
            .arg("-i").arg(audio_path)
            .arg("-map").arg("0:v:0")
            .arg("-map").arg("1:a:0")
            .arg("-c:v").arg("copy")
            .arg("-c:a").arg("aac")
            .arg("-b:a").arg(AUDIO_BITRATE)
            .arg("-shortest")
            .arg(output_path);
        self.run_with_timeout(command).await
    }

    async fn run_loudness_measure(
        &self,
        media_path: &Path,
        target_lufs: f64,
    ) -> io::Result<Output> {
        let filter = format!(
            "loudnorm=I={}:TP={}:LRA={}:print_format=json",
            target_lufs, TRUE_PEAK_CEILING, LOUDNESS_RANGE
        );
        let mut command = TokioCommand::new("ffmpeg");
        command
            .arg("-hide_banner")
            .arg("-i").arg(media_path)
            .arg("-af").arg(filter)
            .arg("-f").arg("null")
            .arg("-");
        self.run_with_timeout(command).await
    }

    async fn run_loudness_apply(
        &self,
        media_path: &Path,
        output_path: &Path,
        target_lufs: f64,
        measured: &LoudnessMeasurement,
    ) -> io::Result<Output> {
        let filter = format!(
            "loudnorm=I={}:TP={}:LRA={}:measured_I={}:measured_TP={}:measured_LRA={}:measured_thresh={}:linear=true",
            target_lufs,
            TRUE_PEAK_CEILING,
            LOUDNESS_RANGE,
            measured.input_i,
            measured.input_tp,
            measured.input_lra,
            measured.input_thresh,
        );
        let mut command = TokioCommand::new("ffmpeg");
        command
            .arg("-y")
            .arg("-i").arg(media_path)
            .arg("-af").arg(filter)
            .arg("-c:v").arg("copy")
            .arg("-c:a").arg("aac")
            .arg("-b:a").arg(AUDIO_BITRATE)
            .arg(output_path);
        self.run_with_timeout(command).await
    }

    async fn run_variant_encode(
        &self,
        media_path: &Path,
        output_path: &Path,
        spec: &VariantSpec,
    ) -> io::Result<Output> {
        // Scale preserving aspect ratio, pad to the exact target frame.
        let filter = format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
            w = spec.width,
            h = spec.height
        );
        let mut command = TokioCommand::new("ffmpeg");
        command
            .arg("-y")
            .arg("-i").arg(media_path)
            .arg("-vf").arg(filter)
            .arg("-c:v").arg(spec.codec.ffmpeg_encoder())
            .arg("-preset").arg("medium")
            .arg("-crf").arg(VIDEO_CRF)
            .arg("-c:a").arg("aac")
            .arg("-b:a").arg(AUDIO_BITRATE)
            .arg("-movflags").arg("+faststart")
            .arg(output_path);
        self.run_with_timeout(command).await
    }

    async fn run_version_check(&self) -> io::Result<Output> {
        let mut command = TokioCommand::new("ffmpeg");
        command.arg("-version");
        self.run_with_timeout(command).await
    }
}

/// Reduce a subprocess error transcript to a single response-safe line:
/// the last non-empty line, with filesystem paths masked and the length
/// capped. The full transcript belongs in the log, never in a response.
pub fn summarize_stderr(transcript: &str) -> String {
    let line = transcript
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim();
    let masked = line
        .split_whitespace()
        .map(|token| if token.contains('/') { "<path>" } else { token })
        .collect::<Vec<_>>()
        .join(" ");
    masked.chars().take(200).collect()
}

/// Parse the duration printed by `run_ffprobe_for_duration`. Best-effort:
/// probe failures yield `None`, never an error.
pub fn parse_probed_duration(output: &io::Result<Output>) -> Option<f64> {
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .trim()
            .parse::<f64>()
            .ok(),
        _ => None,
    }
}
