//! persona-media — turns an uploaded clip into an ordered set of stills.

pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod probe;
pub mod sampler;

pub use error::SamplerError;
pub use ffmpeg::FfmpegDecoder;
pub use frame::{select_evenly_spaced, Snapshot};
pub use probe::VideoInfo;
pub use sampler::{FrameSampler, MediaDecoder};
