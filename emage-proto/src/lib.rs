//! Agent/controller wire protocol
//!
//! This crate defines the messages exchanged between an eNB agent and its
//! SDN controller, their binary encoding and the length-prefixed framing
//! used on the stream.
//!
//! # Modules
//!
//! - [`protocol`]: message types and payload structures
//! - [`codec`]: message encoding and decoding
//! - [`framing`]: length-prefix frame codec for `tokio_util::codec::Framed`
//! - [`status`]: status codes carried in acknowledgements
//!
//! # Example
//!
//! ```rust
//! use emage_proto::{codec, EmageMessage, MessageBody};
//!
//! let msg = EmageMessage::new(7, 1, MessageBody::EnbSetupRequest { module_id: 0 });
//! let encoded = codec::encode(&msg);
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(msg, decoded);
//! ```

pub mod codec;
pub mod framing;
pub mod protocol;
pub mod status;

pub use codec::{decode, encode, DecodeError};
pub use framing::{FrameCodec, FrameError, DEFAULT_MAX_FRAME_SIZE};
pub use protocol::{
    CellMeasure, EmageMessage, EventAck, EventKind, HandoverUe, MessageBody, MessageType,
    RanL2Config, RanSetupReply, RanSliceConfig, Report, SliceAck, SliceOp, SliceReply, UeMeasure,
    HEADER_LEN, MAX_REPORT_PAYLOAD, MAX_SETUP_SLICES, MAX_SLICE_USERS, PROTOCOL_VERSION,
};
