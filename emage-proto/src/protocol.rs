//! Agent/controller message types
//!
//! Every message carries a small header (protocol version, message type,
//! eNB id and a sequence number) followed by a type-specific body. Replies
//! echo the sequence number of the request they answer.

use std::fmt;

use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use emage_common::{CellId, EnbId, ModuleId, Rnti, SliceId, TriggerId};

/// Protocol version carried in every header
pub const PROTOCOL_VERSION: u8 = 1;

/// Header length: version(1) + type(1) + enb_id(8) + seq(4)
pub const HEADER_LEN: usize = 14;

/// Number of user slots in a slice configuration
pub const MAX_SLICE_USERS: usize = 32;

/// Largest report payload accepted from handlers
pub const MAX_REPORT_PAYLOAD: usize = 16384;

/// Largest number of slice ids in a RAN setup reply
pub const MAX_SETUP_SLICES: usize = 1024;

/// Message type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    /// Agent announces itself after a successful INIT
    Hello = 0x01,
    /// Agent acknowledges a dispatched controller request
    EventAck = 0x02,
    /// Agent-originated report (trigger output)
    Report = 0x03,
    /// Controller asks for the base station setup
    EnbSetupRequest = 0x10,
    /// Controller asks for the setup of one cell
    CellSetupRequest = 0x11,
    /// Controller installs a UE report trigger
    UeReport = 0x12,
    /// Controller installs an RRC measurement trigger
    UeMeasure = 0x13,
    /// Controller orders a UE handover
    HandoverUe = 0x14,
    /// Controller installs a cell statistics trigger
    CellMeasure = 0x15,
    /// Controller asks for the RAN slicing setup of a module
    RanSetupRequest = 0x20,
    /// Reply to `RanSetupRequest`
    RanSetupReply = 0x21,
    /// Controller asks for one slice configuration
    SliceRequest = 0x22,
    /// Reply to `SliceRequest`
    SliceReply = 0x23,
    /// Controller adds a slice
    SliceAdd = 0x24,
    /// Controller reconfigures a slice
    SliceConf = 0x25,
    /// Controller removes a slice
    SliceRemove = 0x26,
    /// Agent acknowledges a slice add/conf/remove
    SliceAck = 0x27,
}

/// Kinds of events handlers can register to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum EventKind {
    Init = 1,
    Release = 2,
    Disconnected = 3,
    CellSetupRequest = 4,
    EnbSetupRequest = 5,
    UeReport = 6,
    UeMeasure = 7,
    HandoverUe = 8,
    CellMeasure = 9,
}

impl EventKind {
    /// Number of event kinds
    pub const COUNT: usize = 9;

    /// All event kinds in numeric order
    pub const ALL: [EventKind; Self::COUNT] = [
        EventKind::Init,
        EventKind::Release,
        EventKind::Disconnected,
        EventKind::CellSetupRequest,
        EventKind::EnbSetupRequest,
        EventKind::UeReport,
        EventKind::UeMeasure,
        EventKind::HandoverUe,
        EventKind::CellMeasure,
    ];

    /// Zero-based index, suitable for fixed-size tables.
    pub fn index(self) -> usize {
        u8::from(self) as usize - 1
    }

    /// Upper-case name of the kind
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Init => "INIT",
            EventKind::Release => "RELEASE",
            EventKind::Disconnected => "DISCONNECTED",
            EventKind::CellSetupRequest => "CELL_SETUP_REQUEST",
            EventKind::EnbSetupRequest => "ENB_SETUP_REQUEST",
            EventKind::UeReport => "UE_REPORT",
            EventKind::UeMeasure => "UE_MEASURE",
            EventKind::HandoverUe => "HANDOVER_UE",
            EventKind::CellMeasure => "CELL_MEASURE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Slice operation acknowledged by `SliceAck`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SliceOp {
    Add = 1,
    Conf = 2,
    Remove = 3,
}

/// Layer 2 part of a slice configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RanL2Config {
    /// User scheduler policy selector, interpreted by the MAC backend
    pub user_sched: i32,
    /// Resource block groups assigned to the slice
    pub rbg: i32,
}

/// RAN slicing configuration for a single slice
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RanSliceConfig {
    /// Declared number of users, must match `users.len()`
    pub nof_users: i32,
    /// Users (RNTIs) attached to the slice
    pub users: Vec<Rnti>,
    /// Layer 2 parameters
    pub l2: RanL2Config,
}

impl RanSliceConfig {
    /// Creates a consistent configuration from a user list.
    pub fn new(users: Vec<Rnti>, l2: RanL2Config) -> Self {
        Self {
            nof_users: users.len() as i32,
            users,
            l2,
        }
    }
}

/// RRC measurement request parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeMeasure {
    pub module_id: ModuleId,
    pub trigger_id: TriggerId,
    pub measure_id: u8,
    pub rnti: Rnti,
    pub earfcn: u16,
    pub interval: u16,
    pub max_cells: i16,
    pub max_measures: i16,
}

/// Handover order parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoverUe {
    pub module_id: ModuleId,
    pub source_cell: CellId,
    pub rnti: Rnti,
    pub target_enb: EnbId,
    pub target_cell: CellId,
    pub cause: u8,
}

/// Cell statistics request parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellMeasure {
    pub cell_id: CellId,
    pub module_id: ModuleId,
    pub interval: i32,
    pub trigger_id: TriggerId,
}

/// Acknowledgement of a dispatched request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventAck {
    pub kind: EventKind,
    pub status: i32,
}

/// Report emitted by the agent on behalf of a trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub trigger_id: TriggerId,
    pub payload: Bytes,
}

/// Reply to a RAN setup request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RanSetupReply {
    pub module_id: ModuleId,
    pub status: i32,
    pub slice_ids: Vec<SliceId>,
}

/// Reply to a slice request; `config` is present only on success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceReply {
    pub module_id: ModuleId,
    pub slice_id: SliceId,
    pub status: i32,
    pub config: Option<RanSliceConfig>,
}

/// Acknowledgement of a slice add/conf/remove
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceAck {
    pub op: SliceOp,
    pub module_id: ModuleId,
    pub slice_id: SliceId,
    pub status: i32,
}

/// Message body, one variant per message type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Hello,
    EventAck(EventAck),
    Report(Report),
    EnbSetupRequest {
        module_id: ModuleId,
    },
    CellSetupRequest {
        cell_id: CellId,
    },
    UeReport {
        module_id: ModuleId,
        trigger_id: TriggerId,
    },
    UeMeasure(UeMeasure),
    HandoverUe(HandoverUe),
    CellMeasure(CellMeasure),
    RanSetupRequest {
        module_id: ModuleId,
    },
    RanSetupReply(RanSetupReply),
    SliceRequest {
        module_id: ModuleId,
        slice_id: SliceId,
    },
    SliceReply(SliceReply),
    SliceAdd {
        module_id: ModuleId,
        slice_id: SliceId,
        config: RanSliceConfig,
    },
    SliceConf {
        module_id: ModuleId,
        slice_id: SliceId,
        config: RanSliceConfig,
    },
    SliceRemove {
        module_id: ModuleId,
        slice_id: SliceId,
    },
    SliceAck(SliceAck),
}

impl MessageBody {
    /// Returns the message type of this body
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Hello => MessageType::Hello,
            MessageBody::EventAck(_) => MessageType::EventAck,
            MessageBody::Report(_) => MessageType::Report,
            MessageBody::EnbSetupRequest { .. } => MessageType::EnbSetupRequest,
            MessageBody::CellSetupRequest { .. } => MessageType::CellSetupRequest,
            MessageBody::UeReport { .. } => MessageType::UeReport,
            MessageBody::UeMeasure(_) => MessageType::UeMeasure,
            MessageBody::HandoverUe(_) => MessageType::HandoverUe,
            MessageBody::CellMeasure(_) => MessageType::CellMeasure,
            MessageBody::RanSetupRequest { .. } => MessageType::RanSetupRequest,
            MessageBody::RanSetupReply(_) => MessageType::RanSetupReply,
            MessageBody::SliceRequest { .. } => MessageType::SliceRequest,
            MessageBody::SliceReply(_) => MessageType::SliceReply,
            MessageBody::SliceAdd { .. } => MessageType::SliceAdd,
            MessageBody::SliceConf { .. } => MessageType::SliceConf,
            MessageBody::SliceRemove { .. } => MessageType::SliceRemove,
            MessageBody::SliceAck(_) => MessageType::SliceAck,
        }
    }
}

/// A complete protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmageMessage {
    /// eNB the message is from or addressed to
    pub enb_id: EnbId,
    /// Transaction sequence number
    pub seq: u32,
    /// Message body
    pub body: MessageBody,
}

impl EmageMessage {
    /// Creates a new message
    pub fn new(enb_id: EnbId, seq: u32, body: MessageBody) -> Self {
        Self { enb_id, seq, body }
    }

    /// Returns the message type
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
