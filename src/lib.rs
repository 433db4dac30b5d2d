pub mod capture;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod http;
pub mod nats;
pub mod network;
pub mod recorder;
pub mod segment;
pub mod store;
pub mod upload;

pub use capture::{CaptureChunk, CaptureSource, ChannelSource, SourceFeed, WavFileSource};
pub use config::Config;
pub use crypto::SegmentCipher;
pub use error::{CryptoError, DeliveryError, RecorderError, StoreError};
pub use events::{ChannelSink, EventSink, RecorderEvent, TracingSink};
pub use http::{create_router, AppState};
pub use network::{ConnectivitySignal, NetworkMonitor, NetworkQuality};
pub use recorder::{RecorderConfig, RecordingState, SegmentRecorder};
pub use segment::{CaptureMode, Segment, SegmentDescriptor, SegmentId};
pub use store::{EncryptedDiskStore, MemoryStore, SegmentStore};
pub use upload::{HttpUploader, QueuePolicy, UploadQueue, Uploader};
