//! Video frame sampling using FFmpeg
//!
//! `ffprobe` reports the stream dimensions, `ffmpeg` decodes the first video
//! stream to raw RGB24 on stdout and frames are consumed one at a time. Every
//! `interval`-th frame is kept and resized to the backbone's input size until
//! the requested number of frames is reached.
use image::{Rgb, RgbImage};
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, info, warn};

use crate::errors::{PipelineError, PipelineResult};

/// How much of ffmpeg's stderr is kept for error messages
const STDERR_TAIL_BYTES: usize = 8 * 1024;

/// Anything that can turn a video file into an ordered list of RGB frames
pub trait FrameSource: Send + Sync {
    /// Sample every `interval`-th frame, stopping after `max_frames`
    fn sample_frames(
        &self,
        video: &Path,
        interval: usize,
        max_frames: usize,
    ) -> PipelineResult<Vec<RgbImage>>;
}

/// FFmpeg backed frame sampler
#[derive(Debug, Clone)]
pub struct VideoFrameSampler {
    ffmpeg_path: String,
    ffprobe_path: String,
    frame_size: u32,
}

impl VideoFrameSampler {
    /// Create a sampler using `ffmpeg`/`ffprobe` from `PATH`
    pub fn new(frame_size: u32) -> Self {
        Self::with_paths("ffmpeg".to_string(), "ffprobe".to_string(), frame_size)
    }

    /// Create sampler with custom FFmpeg paths
    pub fn with_paths(ffmpeg_path: String, ffprobe_path: String, frame_size: u32) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            frame_size,
        }
    }

    /// Read width, height and frame rate of the first video stream
    pub fn probe(&self, video: &Path) -> PipelineResult<VideoInfo> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,codec_name,r_frame_rate",
                "-of",
                "json",
            ])
            .arg(video)
            .output()
            .map_err(|e| decode_error(video, format!("failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(decode_error(video, format!("ffprobe failed: {}", stderr.trim())));
        }

        parse_probe_output(&output.stdout).map_err(|message| decode_error(video, message))
    }
}

impl FrameSource for VideoFrameSampler {
    fn sample_frames(
        &self,
        video: &Path,
        interval: usize,
        max_frames: usize,
    ) -> PipelineResult<Vec<RgbImage>> {
        validate_sampling(interval, max_frames)?;
        if !video.is_file() {
            return Err(PipelineError::VideoNotFound(video.to_path_buf()));
        }

        let info = self.probe(video)?;
        info!(
            "Sampling {:?}: {} at {:.2}fps, every {} frame(s), up to {}",
            video,
            info.resolution_string(),
            info.fps,
            interval,
            max_frames
        );

        // -noautorotate keeps decoded frames at the probed width x height
        let mut child = Command::new(&self.ffmpeg_path)
            .args(["-v", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(video)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| decode_error(video, format!("failed to execute ffmpeg: {}", e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| decode_error(video, "ffmpeg stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| decode_error(video, "ffmpeg stderr unavailable".to_string()))?;

        // ffmpeg blocks once the stderr pipe fills, so it is drained alongside stdout
        let stderr_reader = thread::spawn(move || drain_stderr(stderr));

        let sampled = sample_raw_frames(
            &mut stdout,
            info.width,
            info.height,
            interval,
            max_frames,
            self.frame_size,
        );
        drop(stdout);

        let reached_target = matches!(&sampled, Ok(frames) if frames.len() >= max_frames);
        if reached_target || sampled.is_err() {
            // ffmpeg would otherwise keep decoding into a closed pipe
            let _ = child.kill();
        }
        let status = child.wait()?;
        let stderr = stderr_reader.join().unwrap_or_default();
        let frames = sampled.map_err(|e| decode_error(video, format!("reading frames: {}", e)))?;

        if !reached_target && !status.success() {
            if frames.is_empty() {
                return Err(decode_error(video, format!("ffmpeg failed: {}", stderr.trim())));
            }
            warn!(
                "ffmpeg stopped early on {:?} after {} sampled frames: {}",
                video,
                frames.len(),
                stderr.trim()
            );
        }

        info!("Sampled {} frames from {:?}", frames.len(), video);
        Ok(frames)
    }
}

fn validate_sampling(interval: usize, max_frames: usize) -> PipelineResult<()> {
    if interval == 0 {
        return Err(PipelineError::InvalidArgument(
            "frame interval must be at least 1".to_string(),
        ));
    }
    if max_frames == 0 {
        return Err(PipelineError::InvalidArgument(
            "frame count must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Read ffmpeg's stderr to the end, keeping only the tail for error messages
fn drain_stderr<R: Read>(mut stderr: R) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stderr.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > STDERR_TAIL_BYTES {
                    tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

fn decode_error(video: &Path, message: String) -> PipelineError {
    PipelineError::VideoDecode {
        path: video.to_path_buf(),
        message,
    }
}

/// Consume packed RGB24 frames of `width`x`height` from `reader`
///
/// Keeps frames whose index is a multiple of `interval` and resizes them to
/// `target_size` squares. A trailing partial frame is treated as end of stream.
pub fn sample_raw_frames<R: Read>(
    reader: &mut R,
    width: u32,
    height: u32,
    interval: usize,
    max_frames: usize,
    target_size: u32,
) -> std::io::Result<Vec<RgbImage>> {
    if interval == 0 || width == 0 || height == 0 {
        return Err(std::io::Error::new(
            ErrorKind::InvalidInput,
            "frame dimensions and interval must be non-zero",
        ));
    }

    let frame_len = width as usize * height as usize * 3;
    let mut buffer = vec![0u8; frame_len];
    let mut frames = Vec::with_capacity(max_frames);
    let mut index = 0usize;

    while frames.len() < max_frames {
        if !read_frame(reader, &mut buffer)? {
            break;
        }

        if index % interval == 0 {
            let frame = RgbImage::from_raw(width, height, buffer.clone()).ok_or_else(|| {
                std::io::Error::new(ErrorKind::InvalidData, "frame buffer size mismatch")
            })?;
            frames.push(resize_frame(frame, target_size));
        }
        index += 1;
    }

    debug!("Read {} raw frames, kept {}", index, frames.len());
    Ok(frames)
}

/// Bilinear resize to a `size`x`size` frame
///
/// Two-tap interpolation with half-pixel centres and edge clamping, matching
/// OpenCV's `INTER_LINEAR`. The kernel does not widen when downscaling.
pub fn resize_frame(frame: RgbImage, size: u32) -> RgbImage {
    if frame.width() == size && frame.height() == size {
        return frame;
    }

    let xs = linear_taps(frame.width(), size);
    let ys = linear_taps(frame.height(), size);

    RgbImage::from_fn(size, size, |x, y| {
        let (x0, x1, fx) = xs[x as usize];
        let (y0, y1, fy) = ys[y as usize];
        let mut out = [0u8; 3];
        for (c, value) in out.iter_mut().enumerate() {
            let top = lerp(frame.get_pixel(x0, y0)[c], frame.get_pixel(x1, y0)[c], fx);
            let bottom = lerp(frame.get_pixel(x0, y1)[c], frame.get_pixel(x1, y1)[c], fx);
            *value = (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}

/// Source indices and weight for every destination coordinate on one axis
fn linear_taps(source: u32, target: u32) -> Vec<(u32, u32, f32)> {
    let scale = source as f32 / target as f32;
    let last = source.saturating_sub(1);

    (0..target)
        .map(|d| {
            let position = (d as f32 + 0.5) * scale - 0.5;
            let mut lower = position.floor();
            let mut weight = position - lower;
            if lower < 0.0 {
                lower = 0.0;
                weight = 0.0;
            }
            let lower = lower as u32;
            if lower >= last {
                (last, last, 0.0)
            } else {
                (lower, lower + 1, weight)
            }
        })
        .collect()
}

fn lerp(a: u8, b: u8, t: f32) -> f32 {
    a as f32 + (b as f32 - a as f32) * t
}

/// Fill `buffer` with one frame, returning false at end of stream
fn read_frame<R: Read>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => {
                if filled > 0 {
                    debug!("Dropping partial frame of {} bytes", filled);
                }
                return Ok(false);
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Video stream information reported by ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub video_codec: Option<String>,
    pub fps: f64,
}

impl VideoInfo {
    pub fn resolution_string(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

fn parse_probe_output(stdout: &[u8]) -> Result<VideoInfo, String> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| format!("failed to parse ffprobe output: {}", e))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream found".to_string())?;

    match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok(VideoInfo {
            width,
            height,
            video_codec: stream.codec_name,
            fps: stream
                .r_frame_rate
                .as_deref()
                .map(parse_frame_rate)
                .unwrap_or(0.0),
        }),
        _ => Err("video stream has no dimensions".to_string()),
    }
}

/// Parse frame rate string (e.g., "30/1" -> 30.0)
fn parse_frame_rate(rate_str: &str) -> f64 {
    if let Some((num, den)) = rate_str.split_once('/') {
        if let (Ok(n), Ok(d)) = (num.parse::<f64>(), den.parse::<f64>()) {
            if d != 0.0 {
                return n / d;
            }
        }
    }
    0.0
}

// FFprobe JSON output structures
#[derive(Debug, serde::Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, serde::Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    codec_name: Option<String>,
    r_frame_rate: Option<String>,
}
