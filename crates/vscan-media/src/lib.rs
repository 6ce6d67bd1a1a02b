//! Video ingestion and decoding for the violence scanner.
//!
//! This crate provides:
//! - Fetching sources by URL or upload into owned temp files
//! - FFprobe metadata and FFmpeg rawvideo decoding
//! - Interval-based lazy frame sampling
//! - Sweeping of orphaned temp files

pub mod decode;
pub mod error;
pub mod fetch;
pub mod probe;
pub mod sampler;
pub mod sweep;

pub use decode::{DecodedSource, FfmpegDecoder, FrameSource, RawFrame, SourceDecoder, StreamInfo};
pub use error::{MediaError, MediaResult};
pub use fetch::{
    validate_upload, validate_url, HttpFetcher, SourceFetcher, SourceHandle, VideoSource,
    TEMP_FILE_PREFIX,
};
pub use probe::{probe_video, VideoInfo};
pub use sampler::{expected_samples, sample_step, Frame, FrameSampler};
pub use sweep::sweep_stale_temp_files;
