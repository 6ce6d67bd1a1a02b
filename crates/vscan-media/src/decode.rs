//! Source decoding into raw RGB frames.
//!
//! A [`SourceDecoder`] opens a local file and yields a [`DecodedSource`]: stream
//! metadata plus a forward-only [`FrameSource`]. The FFmpeg implementation pipes
//! `rgb24` rawvideo out of a child process; dropping the frame source kills the
//! child, so the decode handle is released however iteration ends.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// One decoded frame in packed RGB24.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Stream metadata known before the first frame is read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    /// Frames per second as reported by the container
    pub fps: f64,
    /// Total frames in the source, if the container reports or implies it
    pub total_frames: Option<u64>,
    pub width: u32,
    pub height: u32,
}

/// Forward-only iterator over decoded frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Read the next frame, or `None` once the source is exhausted.
    async fn next_frame(&mut self) -> MediaResult<Option<RawFrame>>;

    /// Advance past `count` frames without returning them.
    ///
    /// Returns how many frames were actually skipped; fewer than `count`
    /// means the source ran out.
    async fn skip_frames(&mut self, count: u64) -> MediaResult<u64> {
        let mut skipped = 0;
        while skipped < count {
            if self.next_frame().await?.is_none() {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }
}

/// An opened source ready for sampling.
pub struct DecodedSource {
    pub info: StreamInfo,
    pub frames: Box<dyn FrameSource>,
}

impl std::fmt::Debug for DecodedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedSource")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Opens local video files for frame-by-frame decoding.
#[async_trait]
pub trait SourceDecoder: Send + Sync {
    async fn open(&self, path: &Path) -> MediaResult<DecodedSource>;
}

/// FFmpeg-backed decoder.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    frame_width: u32,
    frame_height: u32,
}

impl FfmpegDecoder {
    /// Default decode size, matching the model input.
    pub const DEFAULT_FRAME_SIZE: (u32, u32) = (224, 224);

    pub fn new() -> Self {
        let (w, h) = Self::DEFAULT_FRAME_SIZE;
        Self::with_frame_size(w, h)
    }

    /// Scale decoded frames to `width` x `height`.
    pub fn with_frame_size(width: u32, height: u32) -> Self {
        Self {
            frame_width: width.max(1),
            frame_height: height.max(1),
        }
    }

    fn frame_bytes(&self) -> usize {
        (self.frame_width * self.frame_height * 3) as usize
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceDecoder for FfmpegDecoder {
    async fn open(&self, path: &Path) -> MediaResult<DecodedSource> {
        let probe = probe_video(path).await?;

        if probe.fps <= 0.0 {
            return Err(MediaError::InvalidFrameRate(probe.fps));
        }

        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(path)
            .args([
                "-vf",
                &format!("scale={}:{}", self.frame_width, self.frame_height),
                // one output frame per input frame, so indices line up
                "-vsync",
                "passthrough",
                "-pix_fmt",
                "rgb24",
                "-f",
                "rawvideo",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None))?;

        debug!(
            path = %path.display(),
            fps = probe.fps,
            total_frames = ?probe.estimated_frames(),
            "Opened source for decoding"
        );

        Ok(DecodedSource {
            info: StreamInfo {
                fps: probe.fps,
                total_frames: probe.estimated_frames(),
                width: self.frame_width,
                height: self.frame_height,
            },
            frames: Box::new(FfmpegFrames {
                child,
                stdout,
                width: self.frame_width,
                height: self.frame_height,
                frame_bytes: self.frame_bytes(),
                scratch: vec![0u8; self.frame_bytes()],
                frames_read: 0,
                finished: false,
            }),
        })
    }
}

/// Frames piped from a running FFmpeg child.
struct FfmpegFrames {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    frame_bytes: usize,
    scratch: Vec<u8>,
    frames_read: u64,
    finished: bool,
}

impl FfmpegFrames {
    /// Fill `buf` with one frame. Returns false at end of stream.
    async fn read_into(stdout: &mut ChildStdout, buf: &mut [u8]) -> MediaResult<bool> {
        match stdout.read_exact(buf).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(MediaError::Io(e)),
        }
    }

    /// Reap the child once stdout is drained.
    async fn finish(&mut self) -> MediaResult<()> {
        self.finished = true;
        let status = self.child.wait().await?;

        if exit_truncates(status.success(), status.code(), self.frames_read)? {
            warn!(
                exit_code = ?status.code(),
                frames_read = self.frames_read,
                "FFmpeg exited with an error after partial decode"
            );
        }
        Ok(())
    }
}

/// Whether a decode that exited with `success` ended early.
///
/// A failing exit with no frames read is an unreadable source. After at least
/// one frame it only truncates the stream, and the frames already read stand.
fn exit_truncates(success: bool, code: Option<i32>, frames_read: u64) -> MediaResult<bool> {
    match (success, frames_read) {
        (true, _) => Ok(false),
        (false, 0) => Err(MediaError::ffmpeg_failed(
            "FFmpeg could not decode the source",
            code,
        )),
        (false, _) => Ok(true),
    }
}

#[async_trait]
impl FrameSource for FfmpegFrames {
    async fn next_frame(&mut self) -> MediaResult<Option<RawFrame>> {
        if self.finished {
            return Ok(None);
        }

        let mut data = vec![0u8; self.frame_bytes];
        if !Self::read_into(&mut self.stdout, &mut data).await? {
            self.finish().await?;
            return Ok(None);
        }
        self.frames_read += 1;

        Ok(Some(RawFrame {
            width: self.width,
            height: self.height,
            data,
        }))
    }

    async fn skip_frames(&mut self, count: u64) -> MediaResult<u64> {
        let mut skipped = 0;
        while skipped < count && !self.finished {
            if !Self::read_into(&mut self.stdout, &mut self.scratch).await? {
                self.finish().await?;
                break;
            }
            self.frames_read += 1;
            skipped += 1;
        }
        Ok(skipped)
    }
}
