//! Audio payload classification and normalization.

pub mod normalize;
pub mod types;

pub use normalize::{
    AllocationLedger, LocalAudio, PayloadNormalizer, PlayableResource, UrlOrigin, UrlResource,
    decode_base64,
};
pub use types::AudioPayload;
