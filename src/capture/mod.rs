//! Trainee capture: devices, encoders and the recording session.

pub mod device;
pub mod encoder;
pub mod session;

pub use device::{
    AudioTrack, ChannelVideoSource, DeviceProbe, MediaDevices, MockDevices, MockVideoSource,
    VideoConstraints, VideoFrame, VideoSource, VideoTrack,
};
pub use encoder::{
    ARCHIVAL_MIME, ArchivalBlob, ArchivalEncoder, ArchivalRecord, ArchivalStats, AudioBlob,
    TranscriptionEncoder, parse_archival,
};
pub use session::{ArchivalOutcome, CaptureOptions, CaptureSession, RecordingBundle};
