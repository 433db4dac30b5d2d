pub mod channel;
pub mod source;
pub mod wav;

pub use channel::{ChannelSource, SourceFeed};
pub use source::{CaptureCapabilities, CaptureChunk, CaptureSource, SourceFactory};
pub use wav::{WavFileSource, WavSourceFactory};
