//! The tagged, length-prefixed binary wire protocol (C1, C2).
//!
//! [`value`] and [`codec`]'s serializer/deserializer implement the
//! tag+type-id value encoding; [`codec`]'s `EnvelopeCodec` additionally
//! implements the 4-byte length-prefixed framing on top of it via
//! `tokio_util::codec`; [`envelope`] and [`messages`] define the application
//! level envelope and message set carried inside each frame.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod messages;
pub mod value;

pub use codec::{EnvelopeCodec, MAX_FRAME_SIZE};
pub use envelope::Envelope;
pub use error::WireError;
pub use messages::Message;
pub use value::WireValue;
