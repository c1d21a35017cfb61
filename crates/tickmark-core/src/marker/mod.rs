pub mod codec;
pub mod id;
pub mod legacy;

pub use codec::{DecodedMarker, MarkerCodec, MarkerDecoder};
pub use id::{base62_decode, base62_encode, IdGenerator, MarkerId};
pub use legacy::LegacyAttrDecoder;
