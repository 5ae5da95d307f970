use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use anyhow::Context as _;
use image::RgbaImage;

use crate::foundation::core::{Fps, FrameSize, Scale};
use crate::pipeline::source::{FrameDecoder, VideoSource};

/// What `ffprobe` reports about the first video stream of a file.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoInfo {
    /// Probed file.
    pub path: PathBuf,
    /// Coded frame size.
    pub size: FrameSize,
    /// Native frame rate, when the container declares one.
    pub fps: Option<Fps>,
    /// Container duration in seconds (`0.0` when unknown).
    pub duration_secs: f64,
}

impl VideoInfo {
    /// Approximate number of frames sampling at `rate` yields.
    pub fn estimated_frames(&self, rate: Fps) -> u64 {
        (self.duration_secs * rate.as_f64()).round().max(0.0) as u64
    }
}

/// `true` when both `ffmpeg` and `ffprobe` can be executed.
pub fn is_ffmpeg_on_path() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    })
}

/// Probe `path` with `ffprobe`.
pub fn probe_video(path: &Path) -> anyhow::Result<VideoInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        #[serde(default)]
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .context("failed to run ffprobe (is it installed and on PATH?)")?;
    if !out.status.success() {
        anyhow::bail!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }

    let parsed: ProbeOut =
        serde_json::from_slice(&out.stdout).context("ffprobe json parse failed")?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .with_context(|| format!("no video stream found in '{}'", path.display()))?;
    let width = video.width.context("missing video width from ffprobe")?;
    let height = video.height.context("missing video height from ffprobe")?;
    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_ff_ratio)
        .and_then(|(num, den)| Fps::new(num, den).ok());
    let duration_secs = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoInfo {
        path: path.to_path_buf(),
        size: FrameSize { width, height },
        fps,
        duration_secs,
    })
}

/// A video file to be decoded by `ffmpeg` once a job starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FfmpegSource {
    path: PathBuf,
}

impl FfmpegSource {
    /// Source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File to decode.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VideoSource for FfmpegSource {
    type Decoder = FfmpegDecoder;

    fn open(self, sample_rate: Fps, scale: Scale) -> anyhow::Result<FfmpegDecoder> {
        FfmpegDecoder::open(&self.path, sample_rate, scale)
    }
}

/// Streams RGBA frames out of a video file through an `ffmpeg` child process.
///
/// Frames are resampled to the requested rate and scaled while decoding, so each read is exactly
/// `width * height * 4` bytes. Dropping the decoder kills the child.
pub struct FfmpegDecoder {
    info: VideoInfo,
    size: FrameSize,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl FfmpegDecoder {
    /// Probe `path` and start decoding it at `sample_rate`, resized per `scale`.
    pub fn open(path: impl AsRef<Path>, sample_rate: Fps, scale: Scale) -> anyhow::Result<Self> {
        let path = path.as_ref();
        sample_rate.validate()?;
        scale.validate()?;
        let info = probe_video(path)?;
        let size = scale.resolve(info.size);
        if size.width == 0 || size.height == 0 {
            anyhow::bail!("'{}' has an empty frame size {}", path.display(), info.size);
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args([
                "-an",
                "-sn",
                "-vf",
                &video_filter(sample_rate, size),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "pipe:1",
            ]);
        tracing::debug!(path = %path.display(), %sample_rate, %size, "spawning ffmpeg decoder");

        let mut child = cmd
            .spawn()
            .context("failed to spawn ffmpeg (is it installed and on PATH?)")?;
        let stdout = child
            .stdout
            .take()
            .context("failed to open ffmpeg stdout (unexpected)")?;
        let mut stderr = child
            .stderr
            .take()
            .context("failed to open ffmpeg stderr (unexpected)")?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        Ok(Self {
            info,
            size,
            child: Some(child),
            stdout: Some(stdout),
            stderr_drain: Some(stderr_drain),
        })
    }

    /// Probe result for the source file.
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Size of every decoded frame.
    pub fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn read_frame(stdout: &mut ChildStdout, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Reap the child and surface its stderr when it failed.
    fn finish(&mut self) -> anyhow::Result<()> {
        drop(self.stdout.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait().context("failed to wait for ffmpeg to finish")?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow::anyhow!("ffmpeg stderr drain thread panicked"))?
                .context("ffmpeg stderr read failed")?,
            None => Vec::new(),
        };
        if !status.success() {
            anyhow::bail!(
                "ffmpeg exited with status {}: {}",
                status,
                String::from_utf8_lossy(&stderr_bytes).trim()
            );
        }
        Ok(())
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn next_image(&mut self) -> anyhow::Result<Option<RgbaImage>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        let mut buf = vec![0u8; self.size.rgba_len()];
        let read = Self::read_frame(stdout, &mut buf).context("failed to read from ffmpeg")?;

        if read == 0 {
            self.finish()?;
            return Ok(None);
        }
        if read < buf.len() {
            let exit = self.finish().err();
            let detail = exit.map(|e| format!(" ({e:#})")).unwrap_or_default();
            anyhow::bail!(
                "truncated frame: got {read} of {} bytes{detail}",
                buf.len()
            );
        }

        let image = RgbaImage::from_raw(self.size.width, self.size.height, buf)
            .context("decoded frame does not match its dimensions")?;
        Ok(Some(image))
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        drop(self.stdout.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
    }
}

fn video_filter(rate: Fps, size: FrameSize) -> String {
    format!(
        "fps={}/{},scale={}:{}",
        rate.num, rate.den, size.width, size.height
    )
}

fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split('/');
    let a = parts.next()?.parse::<u32>().ok()?;
    let b = parts.next()?.parse::<u32>().ok()?;
    if b == 0 {
        return None;
    }
    Some((a, b))
}

#[cfg(test)]
#[path = "../../tests/unit/media/ffmpeg.rs"]
mod tests;
