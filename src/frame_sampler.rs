//! Frame Sampling Module
//!
//! Handles the decoding of video files and extraction of every Nth frame
//! using the ffmpeg-next crate. Frames are streamed to a caller-supplied
//! closure one at a time, so memory usage stays low and constant regardless
//! of clip length.

use ffmpeg_next as ffmpeg;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{Context as ScalingContext, flag::Flags};
use ffmpeg::util::frame::video::Video;
use image::{ImageBuffer, Rgb};
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::path::Path;

/// Frame rate assumed when the container does not report a usable one.
const FALLBACK_FRAME_RATE: f64 = 30.0;

/// One sampled frame, decoded to RGB and tagged with its position in the
/// original stream.
pub struct Frame {
    /// Zero-based index of this frame in the source stream.
    pub index: u64,
    /// `index / source frame rate`.
    pub timestamp_secs: f64,
    pub image: ImageBuffer<Rgb<u8>, Vec<u8>>,
}

/// Totals reported once the stream has been drained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleStats {
    /// Every frame decoded from the stream, sampled or not.
    pub total_frames: u64,
    pub frame_rate: f64,
}

/// Attempts to get the total number of frames from video metadata.
///
/// Much faster than decoding the whole video, but the result can be an
/// estimate for variable frame rate (VFR) videos. Used for progress
/// reporting only; the authoritative count comes from [`SampleStats`].
pub fn estimate_frame_count(path: &Path) -> Result<u64> {
    ffmpeg::init().context("Failed to initialize FFmpeg")?;
    let ictx = input(path).context("Failed to open input file for frame count")?;
    let stream = ictx
        .streams()
        .best(Type::Video)
        .ok_or_else(|| anyhow!("Could not find video stream in file"))?;

    // First, try the most direct method if available in the container
    let frame_count = stream.frames();
    if frame_count > 0 {
        return Ok(frame_count as u64);
    }

    // Fallback: Calculate from duration and average frame rate
    let duration = ictx.duration();
    let frame_rate = stream.avg_frame_rate();

    if duration > 0 && frame_rate.0 > 0 && frame_rate.1 > 0 {
        // Duration is in AV_TIME_BASE units (microseconds), so convert to seconds
        let duration_secs = duration as f64 / 1_000_000.0;
        let fps = frame_rate.0 as f64 / frame_rate.1 as f64;
        let estimated_frames = (duration_secs * fps).round() as u64;
        return Ok(estimated_frames);
    }

    Err(anyhow!("Could not determine frame count from video metadata"))
}

/// Tracks the decode position and decides which frames are sampled.
///
/// A frame is due when its zero-based index is a multiple of the interval;
/// the gate only advances once a frame has been fully handled, so a stream
/// truncated mid-frame does not count the unreadable frame.
#[derive(Debug)]
struct SampleGate {
    interval: u64,
    count: u64,
}

impl SampleGate {
    fn new(sample_interval: u32) -> Self {
        Self {
            interval: sample_interval.max(1) as u64,
            count: 0,
        }
    }

    /// Index of the current frame if it is due for sampling.
    fn due(&self) -> Option<u64> {
        if self.count % self.interval == 0 {
            Some(self.count)
        } else {
            None
        }
    }

    fn advance(&mut self) {
        self.count += 1;
    }

    /// Every frame advanced past so far.
    fn total_frames(&self) -> u64 {
        self.count
    }
}

/// Streaming decoder that yields every Nth frame of a video file.
///
/// Opening acquires the decode handle; it is released when the sampler is
/// dropped, whether iteration completes, errors, or is abandoned early.
/// The sequence is single-pass and cannot be restarted.
pub struct FrameSampler {
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ScalingContext,
    stream_index: usize,
    frame_rate: f64,
    interval: u32,
}

impl FrameSampler {
    /// Opens the video source and prepares a decoder for its best video
    /// stream. Any failure here means the source is unusable and no frames
    /// have been processed.
    pub fn open(path: &Path, sample_interval: u32) -> Result<Self> {
        ffmpeg::init().context("Failed to initialize FFmpeg")?;

        let ictx = input(path).context("Failed to open input file")?;
        let (stream_index, parameters, avg_frame_rate) = {
            let stream = ictx
                .streams()
                .best(Type::Video)
                .ok_or_else(|| anyhow!("Could not find video stream in file"))?;
            (stream.index(), stream.parameters(), stream.avg_frame_rate())
        };

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
            .context("Failed to create decoder context")?;
        let decoder = context_decoder.decoder().video()
            .context("Failed to create video decoder")?;

        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            Flags::BILINEAR,
        ).context("Failed to create scaler")?;

        let frame_rate = if avg_frame_rate.0 > 0 && avg_frame_rate.1 > 0 {
            avg_frame_rate.0 as f64 / avg_frame_rate.1 as f64
        } else {
            warn!(
                "Container reports no usable frame rate; assuming {} fps for timestamps",
                FALLBACK_FRAME_RATE
            );
            FALLBACK_FRAME_RATE
        };

        Ok(FrameSampler {
            ictx,
            decoder,
            scaler,
            stream_index,
            frame_rate,
            interval: sample_interval.max(1),
        })
    }

    /// Native frame rate of the source, used to derive timestamps.
    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Drains the stream, calling `on_frame` for every frame whose index is
    /// a multiple of the sample interval, in increasing index order.
    ///
    /// A decode or scale error mid-stream ends the sequence there (graceful
    /// truncation); only errors returned by `on_frame` itself propagate.
    pub fn run<F>(self, mut on_frame: F) -> Result<SampleStats>
    where
        F: FnMut(Frame) -> Result<()>,
    {
        let FrameSampler {
            mut ictx,
            mut decoder,
            mut scaler,
            stream_index,
            frame_rate,
            interval,
        } = self;

        let mut gate = SampleGate::new(interval);
        let mut truncated = false;

        let mut drain =
            |decoder: &mut ffmpeg::decoder::Video, truncated: &mut bool| -> Result<()> {
                let mut decoded = Video::empty();
                while decoder.receive_frame(&mut decoded).is_ok() {
                    if let Some(index) = gate.due() {
                        let mut rgb_frame = Video::empty();
                        if let Err(e) = scaler.run(&decoded, &mut rgb_frame) {
                            warn!("Scaler failed at frame {}; stopping stream: {}", index, e);
                            *truncated = true;
                            return Ok(());
                        }
                        let image = match frame_to_image(&rgb_frame) {
                            Ok(image) => image,
                            Err(e) => {
                                warn!(
                                    "Unreadable frame data at frame {}; stopping stream: {}",
                                    index, e
                                );
                                *truncated = true;
                                return Ok(());
                            }
                        };
                        on_frame(Frame {
                            index,
                            timestamp_secs: index as f64 / frame_rate,
                            image,
                        })?;
                    }
                    gate.advance();
                }
                Ok(())
            };

        for (stream, packet) in ictx.packets() {
            if stream.index() != stream_index {
                continue;
            }
            if decoder.send_packet(&packet).is_err() {
                warn!("Decoder rejected packet; stopping stream");
                truncated = true;
            } else {
                drain(&mut decoder, &mut truncated)?;
            }
            if truncated {
                break;
            }
        }
        if !truncated {
            let _ = decoder.send_eof();
            drain(&mut decoder, &mut truncated)?;
        }

        debug!(
            "Decoded {} frames at {:.3} fps (sample interval {})",
            gate.total_frames(),
            frame_rate,
            interval
        );
        Ok(SampleStats {
            total_frames: gate.total_frames(),
            frame_rate,
        })
    }
}

/// Copies one RGB24 ffmpeg frame into an owned image buffer, honoring the
/// row stride padding ffmpeg may add.
fn frame_to_image(rgb_frame: &Video) -> Result<ImageBuffer<Rgb<u8>, Vec<u8>>> {
    let frame_data = rgb_frame.data(0);
    let width = rgb_frame.width() as usize;
    let height = rgb_frame.height() as usize;
    let stride = rgb_frame.stride(0) as usize;

    if stride == 0 {
        return Err(anyhow!("Invalid frame stride"));
    }

    let mut new_vec = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let start_index = y * stride;
        let end_index = start_index + (width * 3);
        if end_index > frame_data.len() {
            return Err(anyhow!("Frame data is smaller than expected"));
        }
        new_vec.extend_from_slice(&frame_data[start_index..end_index]);
    }

    ImageBuffer::from_vec(width as u32, height as u32, new_vec)
        .context("Failed to create image buffer from frame data")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Runs the gate over a fully decodable stream of `total` frames and
    /// collects the sampled indices, the way the drain loop consults it.
    fn sampled(total: u64, interval: u32) -> Vec<u64> {
        let mut gate = SampleGate::new(interval);
        let mut indices = Vec::new();
        for _ in 0..total {
            if let Some(index) = gate.due() {
                indices.push(index);
            }
            gate.advance();
        }
        assert_eq!(gate.total_frames(), total);
        indices
    }

    #[test]
    fn sampled_indices_are_the_interval_multiples() {
        assert_eq!(sampled(100, 15), vec![0, 15, 30, 45, 60, 75, 90]);
        assert_eq!(sampled(5, 1), vec![0, 1, 2, 3, 4]);
        assert_eq!(sampled(91, 15).last(), Some(&90));
        for interval in [1u32, 2, 7, 15, 30] {
            let expected: Vec<u64> = (0..100).step_by(interval as usize).collect();
            assert_eq!(sampled(100, interval), expected);
        }
    }

    #[test]
    fn first_frame_is_sampled_before_any_advance() {
        let gate = SampleGate::new(15);
        assert_eq!(gate.due(), Some(0));
        assert_eq!(gate.total_frames(), 0);
    }

    #[test]
    fn interval_longer_than_clip_samples_only_frame_zero() {
        assert_eq!(sampled(5, 100), vec![0]);
        assert!(sampled(0, 100).is_empty());
    }

    #[test]
    fn truncated_stream_counts_only_handled_frames() {
        // The drain loop advances after a frame is handled, so stopping on
        // an unreadable frame leaves it out of the total.
        let mut gate = SampleGate::new(15);
        for _ in 0..7 {
            gate.advance();
        }
        assert_eq!(gate.total_frames(), 7);
        assert_eq!(gate.due(), None);
    }

    #[test]
    fn zero_interval_is_clamped_to_one() {
        assert_eq!(sampled(3, 0), vec![0, 1, 2]);
    }

    #[test]
    fn open_fails_for_missing_file() {
        let path = PathBuf::from("/nonexistent/clip-that-does-not-exist.mp4");
        assert!(FrameSampler::open(&path, 15).is_err());
    }

    #[test]
    fn frame_count_estimate_fails_for_missing_file() {
        let path = PathBuf::from("/nonexistent/clip-that-does-not-exist.mp4");
        assert!(estimate_frame_count(&path).is_err());
    }
}
