//! Trigger table
//!
//! Triggers are installed when the controller asks for periodic or
//! event-driven reports and handlers accept the request. They live for the
//! duration of a session.

use std::collections::HashMap;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use emage_common::{EnbId, ModuleId, TriggerId};
use emage_proto::{status, EventKind};

/// Kind of report a trigger produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TriggerKind {
    UeReport = 1,
    RrcMeasure = 2,
    CellMeasure = 4,
}

impl TriggerKind {
    /// Trigger kind installed by requests of the given event kind
    pub fn for_event(kind: EventKind) -> Option<TriggerKind> {
        match kind {
            EventKind::UeReport => Some(TriggerKind::UeReport),
            EventKind::UeMeasure => Some(TriggerKind::RrcMeasure),
            EventKind::CellMeasure => Some(TriggerKind::CellMeasure),
            _ => None,
        }
    }
}

/// An installed trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub id: TriggerId,
    /// Agent the trigger belongs to
    pub owner: EnbId,
    pub kind: TriggerKind,
    pub module_id: ModuleId,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Trigger {0} already exists")]
    AlreadyExists(TriggerId),
}

impl TriggerError {
    pub fn status(&self) -> i32 {
        match self {
            TriggerError::AlreadyExists(_) => status::ALREADY_EXISTS,
        }
    }
}

/// Active triggers of one agent, keyed by id
#[derive(Debug, Default)]
pub struct TriggerTable {
    owner: EnbId,
    triggers: HashMap<TriggerId, Trigger>,
}

impl TriggerTable {
    pub fn new(owner: EnbId) -> Self {
        Self {
            owner,
            triggers: HashMap::new(),
        }
    }

    /// Installs a trigger.
    ///
    /// Negative ids denote one-shot requests; nothing is installed and
    /// `Ok(false)` is returned.
    pub fn install(
        &mut self,
        id: TriggerId,
        kind: TriggerKind,
        module_id: ModuleId,
    ) -> Result<bool, TriggerError> {
        if id < 0 {
            return Ok(false);
        }
        if self.triggers.contains_key(&id) {
            return Err(TriggerError::AlreadyExists(id));
        }
        self.triggers.insert(
            id,
            Trigger {
                id,
                owner: self.owner,
                kind,
                module_id,
            },
        );
        Ok(true)
    }

    pub fn contains(&self, id: TriggerId) -> bool {
        self.triggers.contains_key(&id)
    }

    /// Returns true if `id` is active and of the given kind
    pub fn contains_kind(&self, id: TriggerId, kind: TriggerKind) -> bool {
        self.triggers.get(&id).is_some_and(|t| t.kind == kind)
    }

    pub fn get(&self, id: TriggerId) -> Option<&Trigger> {
        self.triggers.get(&id)
    }

    /// Removes a trigger, returning it if it was active
    pub fn remove(&mut self, id: TriggerId) -> Option<Trigger> {
        self.triggers.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn clear(&mut self) {
        self.triggers.clear();
    }

    /// Drops every trigger and assigns a new owner
    pub fn reset(&mut self, owner: EnbId) {
        self.owner = owner;
        self.triggers.clear();
    }
}
