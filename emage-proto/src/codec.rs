//! Message encoding/decoding
//!
//! Integers are big-endian. A frame decodes only if it is consumed exactly;
//! unused user slots of a slice configuration must be zero.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::protocol::{
    CellMeasure, EmageMessage, EventAck, EventKind, HandoverUe, MessageBody, MessageType,
    RanL2Config, RanSetupReply, RanSliceConfig, Report, SliceAck, SliceOp, SliceReply, UeMeasure,
    HEADER_LEN, MAX_REPORT_PAYLOAD, MAX_SETUP_SLICES, MAX_SLICE_USERS, PROTOCOL_VERSION,
};

/// Errors that can occur while decoding a message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Buffer too short
    #[error("buffer too short: need {needed} bytes, have {available}")]
    Truncated {
        /// Number of bytes needed
        needed: usize,
        /// Number of bytes available
        available: usize,
    },

    /// Unknown message type
    #[error("unknown message type: 0x{0:02X}")]
    UnknownKind(u8),

    /// Field value outside its allowed range
    #[error("field {field} out of range: {value}")]
    FieldOutOfRange {
        /// Field name
        field: &'static str,
        /// Offending value
        value: i64,
    },

    /// Protocol version mismatch
    #[error("protocol version mismatch: expected {expected}, got {0}", expected = PROTOCOL_VERSION)]
    VersionMismatch(u8),

    /// Bytes left over after the body
    #[error("{0} trailing bytes after message body")]
    TrailingBytes(usize),
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Encodes a message into a byte buffer
pub fn encode(msg: &EmageMessage) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + 96);
    encode_into(msg, &mut buf);
    buf.freeze()
}

/// Encodes a message into an existing buffer
pub fn encode_into(msg: &EmageMessage, buf: &mut BytesMut) {
    buf.put_u8(PROTOCOL_VERSION);
    buf.put_u8(msg.message_type().into());
    buf.put_u64(msg.enb_id);
    buf.put_u32(msg.seq);

    match &msg.body {
        MessageBody::Hello => {}
        MessageBody::EventAck(ack) => {
            buf.put_u8(ack.kind.into());
            buf.put_i32(ack.status);
        }
        MessageBody::Report(report) => {
            buf.put_i32(report.trigger_id);
            buf.put_u32(report.payload.len() as u32);
            buf.extend_from_slice(&report.payload);
        }
        MessageBody::EnbSetupRequest { module_id } | MessageBody::RanSetupRequest { module_id } => {
            buf.put_u32(*module_id);
        }
        MessageBody::CellSetupRequest { cell_id } => {
            buf.put_u16(*cell_id);
        }
        MessageBody::UeReport {
            module_id,
            trigger_id,
        } => {
            buf.put_u32(*module_id);
            buf.put_i32(*trigger_id);
        }
        MessageBody::UeMeasure(m) => {
            buf.put_u32(m.module_id);
            buf.put_i32(m.trigger_id);
            buf.put_u8(m.measure_id);
            buf.put_u16(m.rnti);
            buf.put_u16(m.earfcn);
            buf.put_u16(m.interval);
            buf.put_i16(m.max_cells);
            buf.put_i16(m.max_measures);
        }
        MessageBody::HandoverUe(h) => {
            buf.put_u32(h.module_id);
            buf.put_u16(h.source_cell);
            buf.put_u16(h.rnti);
            buf.put_u64(h.target_enb);
            buf.put_u16(h.target_cell);
            buf.put_u8(h.cause);
        }
        MessageBody::CellMeasure(c) => {
            buf.put_u16(c.cell_id);
            buf.put_u32(c.module_id);
            buf.put_i32(c.interval);
            buf.put_i32(c.trigger_id);
        }
        MessageBody::RanSetupReply(reply) => {
            let count = reply.slice_ids.len().min(MAX_SETUP_SLICES);
            buf.put_u32(reply.module_id);
            buf.put_i32(reply.status);
            buf.put_u16(count as u16);
            for slice_id in &reply.slice_ids[..count] {
                buf.put_u64(*slice_id);
            }
        }
        MessageBody::SliceRequest {
            module_id,
            slice_id,
        }
        | MessageBody::SliceRemove {
            module_id,
            slice_id,
        } => {
            buf.put_u32(*module_id);
            buf.put_u64(*slice_id);
        }
        MessageBody::SliceReply(reply) => {
            buf.put_u32(reply.module_id);
            buf.put_u64(reply.slice_id);
            buf.put_i32(reply.status);
            match &reply.config {
                Some(config) => {
                    buf.put_u8(1);
                    encode_slice_config(config, buf);
                }
                None => buf.put_u8(0),
            }
        }
        MessageBody::SliceAdd {
            module_id,
            slice_id,
            config,
        }
        | MessageBody::SliceConf {
            module_id,
            slice_id,
            config,
        } => {
            buf.put_u32(*module_id);
            buf.put_u64(*slice_id);
            encode_slice_config(config, buf);
        }
        MessageBody::SliceAck(ack) => {
            buf.put_u8(ack.op.into());
            buf.put_u32(ack.module_id);
            buf.put_u64(ack.slice_id);
            buf.put_i32(ack.status);
        }
    }
}

/// Users beyond the 32 wire slots are not representable and are dropped.
fn encode_slice_config(config: &RanSliceConfig, buf: &mut BytesMut) {
    buf.put_i32(config.nof_users);
    for slot in 0..MAX_SLICE_USERS {
        buf.put_u16(config.users.get(slot).copied().unwrap_or(0));
    }
    buf.put_i32(config.l2.user_sched);
    buf.put_i32(config.l2.rbg);
}

/// Bounds-checked reader over a received frame
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.len() < needed {
            return Err(DecodeError::Truncated {
                needed,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    fn i16(&mut self) -> Result<i16> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    fn u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    fn i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    fn u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64())
    }

    fn bytes(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        let out = Bytes::copy_from_slice(&self.buf[..len]);
        self.buf.advance(len);
        Ok(out)
    }

    fn finish(self) -> Result<()> {
        if !self.buf.is_empty() {
            return Err(DecodeError::TrailingBytes(self.buf.len()));
        }
        Ok(())
    }
}

/// Decodes a message from a frame payload
pub fn decode(data: &[u8]) -> Result<EmageMessage> {
    let mut r = Reader::new(data);
    r.ensure(HEADER_LEN)?;

    let version = r.u8()?;
    if version != PROTOCOL_VERSION {
        return Err(DecodeError::VersionMismatch(version));
    }

    let type_byte = r.u8()?;
    let msg_type =
        MessageType::try_from(type_byte).map_err(|_| DecodeError::UnknownKind(type_byte))?;
    let enb_id = r.u64()?;
    let seq = r.u32()?;

    let body = match msg_type {
        MessageType::Hello => MessageBody::Hello,
        MessageType::EventAck => {
            let kind_byte = r.u8()?;
            let kind = EventKind::try_from(kind_byte).map_err(|_| DecodeError::FieldOutOfRange {
                field: "event_kind",
                value: kind_byte as i64,
            })?;
            MessageBody::EventAck(EventAck {
                kind,
                status: r.i32()?,
            })
        }
        MessageType::Report => {
            let trigger_id = r.i32()?;
            let len = r.u32()? as usize;
            if len > MAX_REPORT_PAYLOAD {
                return Err(DecodeError::FieldOutOfRange {
                    field: "report_length",
                    value: len as i64,
                });
            }
            MessageBody::Report(Report {
                trigger_id,
                payload: r.bytes(len)?,
            })
        }
        MessageType::EnbSetupRequest => MessageBody::EnbSetupRequest { module_id: r.u32()? },
        MessageType::CellSetupRequest => MessageBody::CellSetupRequest { cell_id: r.u16()? },
        MessageType::UeReport => MessageBody::UeReport {
            module_id: r.u32()?,
            trigger_id: r.i32()?,
        },
        MessageType::UeMeasure => MessageBody::UeMeasure(UeMeasure {
            module_id: r.u32()?,
            trigger_id: r.i32()?,
            measure_id: r.u8()?,
            rnti: r.u16()?,
            earfcn: r.u16()?,
            interval: r.u16()?,
            max_cells: r.i16()?,
            max_measures: r.i16()?,
        }),
        MessageType::HandoverUe => MessageBody::HandoverUe(HandoverUe {
            module_id: r.u32()?,
            source_cell: r.u16()?,
            rnti: r.u16()?,
            target_enb: r.u64()?,
            target_cell: r.u16()?,
            cause: r.u8()?,
        }),
        MessageType::CellMeasure => MessageBody::CellMeasure(CellMeasure {
            cell_id: r.u16()?,
            module_id: r.u32()?,
            interval: r.i32()?,
            trigger_id: r.i32()?,
        }),
        MessageType::RanSetupRequest => MessageBody::RanSetupRequest { module_id: r.u32()? },
        MessageType::RanSetupReply => {
            let module_id = r.u32()?;
            let status = r.i32()?;
            let count = r.u16()? as usize;
            if count > MAX_SETUP_SLICES {
                return Err(DecodeError::FieldOutOfRange {
                    field: "slice_count",
                    value: count as i64,
                });
            }
            r.ensure(count * 8)?;
            let mut slice_ids = Vec::with_capacity(count);
            for _ in 0..count {
                slice_ids.push(r.u64()?);
            }
            MessageBody::RanSetupReply(RanSetupReply {
                module_id,
                status,
                slice_ids,
            })
        }
        MessageType::SliceRequest => MessageBody::SliceRequest {
            module_id: r.u32()?,
            slice_id: r.u64()?,
        },
        MessageType::SliceReply => {
            let module_id = r.u32()?;
            let slice_id = r.u64()?;
            let status = r.i32()?;
            let config = match r.u8()? {
                0 => None,
                1 => Some(decode_slice_config(&mut r)?),
                other => {
                    return Err(DecodeError::FieldOutOfRange {
                        field: "config_present",
                        value: other as i64,
                    })
                }
            };
            MessageBody::SliceReply(SliceReply {
                module_id,
                slice_id,
                status,
                config,
            })
        }
        MessageType::SliceAdd => MessageBody::SliceAdd {
            module_id: r.u32()?,
            slice_id: r.u64()?,
            config: decode_slice_config(&mut r)?,
        },
        MessageType::SliceConf => MessageBody::SliceConf {
            module_id: r.u32()?,
            slice_id: r.u64()?,
            config: decode_slice_config(&mut r)?,
        },
        MessageType::SliceRemove => MessageBody::SliceRemove {
            module_id: r.u32()?,
            slice_id: r.u64()?,
        },
        MessageType::SliceAck => {
            let op_byte = r.u8()?;
            let op = SliceOp::try_from(op_byte).map_err(|_| DecodeError::FieldOutOfRange {
                field: "slice_op",
                value: op_byte as i64,
            })?;
            MessageBody::SliceAck(SliceAck {
                op,
                module_id: r.u32()?,
                slice_id: r.u64()?,
                status: r.i32()?,
            })
        }
    };

    r.finish()?;

    Ok(EmageMessage { enb_id, seq, body })
}

fn decode_slice_config(r: &mut Reader<'_>) -> Result<RanSliceConfig> {
    let nof_users = r.i32()?;
    if !(0..=MAX_SLICE_USERS as i32).contains(&nof_users) {
        return Err(DecodeError::FieldOutOfRange {
            field: "nof_users",
            value: nof_users as i64,
        });
    }

    let mut users = Vec::with_capacity(nof_users as usize);
    for slot in 0..MAX_SLICE_USERS {
        let user = r.u16()?;
        if slot < nof_users as usize {
            users.push(user);
        } else if user != 0 {
            return Err(DecodeError::FieldOutOfRange {
                field: "users",
                value: user as i64,
            });
        }
    }

    Ok(RanSliceConfig {
        nof_users,
        users,
        l2: RanL2Config {
            user_sched: r.i32()?,
            rbg: r.i32()?,
        },
    })
}
