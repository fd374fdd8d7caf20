pub mod srt;
pub mod transcript;

pub use srt::{format_timestamp, parse_srt_segments, reconstruct_srt, SrtSegment};
pub use transcript::{with_extension, Transcript, TranscriptSegment, OUTPUT_EXTENSIONS};
