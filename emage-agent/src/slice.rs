//! RAN slice controller
//!
//! Keeps the slicing configuration of every module and applies controller
//! add/conf/remove commands. Accepted configurations are pushed to a
//! [`RanBackend`], the seam towards the MAC scheduler.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use emage_common::{ModuleId, SliceId};
use emage_proto::{
    status, MessageBody, RanSetupReply, RanSliceConfig, SliceAck, SliceOp, SliceReply,
    MAX_SETUP_SLICES, MAX_SLICE_USERS,
};

/// Slice command errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SliceError {
    #[error("Slice {slice_id} already exists on module {module_id}")]
    AlreadyExists { module_id: ModuleId, slice_id: SliceId },

    #[error("Slice {slice_id} not found on module {module_id}")]
    NotFound { module_id: ModuleId, slice_id: SliceId },

    #[error("Invalid slice configuration: {0}")]
    InvalidConfig(String),

    #[error("Backend rejected slice {slice_id}: {reason}")]
    Rejected { slice_id: SliceId, reason: String },
}

impl SliceError {
    /// Status code carried in the acknowledgement
    pub fn status(&self) -> i32 {
        match self {
            SliceError::AlreadyExists { .. } => status::ALREADY_EXISTS,
            SliceError::NotFound { .. } => status::NOT_FOUND,
            SliceError::InvalidConfig(_) => status::INVALID,
            SliceError::Rejected { .. } => status::GENERIC,
        }
    }
}

/// Scheduler backend receiving applied slice configurations.
pub trait RanBackend: Send {
    /// Applies a new or updated configuration.
    fn apply_slice(
        &mut self,
        module_id: ModuleId,
        slice_id: SliceId,
        config: &RanSliceConfig,
    ) -> Result<(), String>;

    /// Tears a slice down.
    fn remove_slice(&mut self, module_id: ModuleId, slice_id: SliceId) -> Result<(), String>;
}

/// Backend accepting every configuration
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRanBackend;

impl RanBackend for NullRanBackend {
    fn apply_slice(&mut self, _: ModuleId, _: SliceId, _: &RanSliceConfig) -> Result<(), String> {
        Ok(())
    }

    fn remove_slice(&mut self, _: ModuleId, _: SliceId) -> Result<(), String> {
        Ok(())
    }
}

fn validate(config: &RanSliceConfig) -> Result<(), SliceError> {
    if config.nof_users < 0 || config.nof_users as usize != config.users.len() {
        return Err(SliceError::InvalidConfig(format!(
            "user count {} does not match {} listed users",
            config.nof_users,
            config.users.len()
        )));
    }
    if config.users.len() > MAX_SLICE_USERS {
        return Err(SliceError::InvalidConfig(format!(
            "{} users exceed the limit of {}",
            config.users.len(),
            MAX_SLICE_USERS
        )));
    }
    let mut seen = HashSet::with_capacity(config.users.len());
    if let Some(dup) = config.users.iter().find(|rnti| !seen.insert(**rnti)) {
        return Err(SliceError::InvalidConfig(format!("user {dup} listed twice")));
    }
    Ok(())
}

/// Per-module slice configurations
pub struct RanSliceController {
    slices: BTreeMap<(ModuleId, SliceId), RanSliceConfig>,
    backend: Box<dyn RanBackend>,
}

impl Default for RanSliceController {
    fn default() -> Self {
        Self::new()
    }
}

impl RanSliceController {
    /// Creates a controller backed by [`NullRanBackend`]
    pub fn new() -> Self {
        Self::with_backend(Box::new(NullRanBackend))
    }

    pub fn with_backend(backend: Box<dyn RanBackend>) -> Self {
        Self {
            slices: BTreeMap::new(),
            backend,
        }
    }

    /// Replaces the backend. Existing configurations are kept.
    pub fn set_backend(&mut self, backend: Box<dyn RanBackend>) {
        self.backend = backend;
    }

    /// Slice ids configured on `module_id`, ascending
    pub fn setup_request(&self, module_id: ModuleId) -> Vec<SliceId> {
        self.slices
            .range((module_id, SliceId::MIN)..=(module_id, SliceId::MAX))
            .map(|((_, slice_id), _)| *slice_id)
            .collect()
    }

    pub fn slice_request(
        &self,
        module_id: ModuleId,
        slice_id: SliceId,
    ) -> Result<&RanSliceConfig, SliceError> {
        self.slices
            .get(&(module_id, slice_id))
            .ok_or(SliceError::NotFound { module_id, slice_id })
    }

    /// Adds a slice. An existing slice is left untouched.
    pub fn slice_add(
        &mut self,
        module_id: ModuleId,
        slice_id: SliceId,
        config: RanSliceConfig,
    ) -> Result<(), SliceError> {
        if self.slices.contains_key(&(module_id, slice_id)) {
            return Err(SliceError::AlreadyExists { module_id, slice_id });
        }
        validate(&config)?;
        self.backend
            .apply_slice(module_id, slice_id, &config)
            .map_err(|reason| SliceError::Rejected { slice_id, reason })?;

        info!(
            "Slice {} added on module {} ({} users)",
            slice_id,
            module_id,
            config.users.len()
        );
        self.slices.insert((module_id, slice_id), config);
        Ok(())
    }

    /// Replaces the configuration of an existing slice.
    pub fn slice_conf(
        &mut self,
        module_id: ModuleId,
        slice_id: SliceId,
        config: RanSliceConfig,
    ) -> Result<(), SliceError> {
        if !self.slices.contains_key(&(module_id, slice_id)) {
            return Err(SliceError::NotFound { module_id, slice_id });
        }
        validate(&config)?;
        self.backend
            .apply_slice(module_id, slice_id, &config)
            .map_err(|reason| SliceError::Rejected { slice_id, reason })?;

        info!("Slice {} reconfigured on module {}", slice_id, module_id);
        self.slices.insert((module_id, slice_id), config);
        Ok(())
    }

    pub fn slice_remove(&mut self, module_id: ModuleId, slice_id: SliceId) -> Result<(), SliceError> {
        if !self.slices.contains_key(&(module_id, slice_id)) {
            return Err(SliceError::NotFound { module_id, slice_id });
        }
        self.backend
            .remove_slice(module_id, slice_id)
            .map_err(|reason| SliceError::Rejected { slice_id, reason })?;

        info!("Slice {} removed from module {}", slice_id, module_id);
        self.slices.remove(&(module_id, slice_id));
        Ok(())
    }

    /// Total number of configured slices
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Handles a slicing request from the controller and builds the reply.
    /// Returns `None` for messages that are not slicing requests.
    pub fn handle_request(&mut self, body: &MessageBody) -> Option<MessageBody> {
        let reply = match body {
            MessageBody::RanSetupRequest { module_id } => {
                let mut slice_ids = self.setup_request(*module_id);
                if slice_ids.len() > MAX_SETUP_SLICES {
                    warn!(
                        "Module {} has {} slices, reporting the first {}",
                        module_id,
                        slice_ids.len(),
                        MAX_SETUP_SLICES
                    );
                    slice_ids.truncate(MAX_SETUP_SLICES);
                }
                MessageBody::RanSetupReply(RanSetupReply {
                    module_id: *module_id,
                    status: status::OK,
                    slice_ids,
                })
            }
            MessageBody::SliceRequest {
                module_id,
                slice_id,
            } => {
                let (status, config) = match self.slice_request(*module_id, *slice_id) {
                    Ok(config) => (status::OK, Some(config.clone())),
                    Err(e) => {
                        debug!("{}", e);
                        (e.status(), None)
                    }
                };
                MessageBody::SliceReply(SliceReply {
                    module_id: *module_id,
                    slice_id: *slice_id,
                    status,
                    config,
                })
            }
            MessageBody::SliceAdd {
                module_id,
                slice_id,
                config,
            } => {
                let result = self.slice_add(*module_id, *slice_id, config.clone());
                ack(SliceOp::Add, *module_id, *slice_id, result)
            }
            MessageBody::SliceConf {
                module_id,
                slice_id,
                config,
            } => {
                let result = self.slice_conf(*module_id, *slice_id, config.clone());
                ack(SliceOp::Conf, *module_id, *slice_id, result)
            }
            MessageBody::SliceRemove {
                module_id,
                slice_id,
            } => {
                let result = self.slice_remove(*module_id, *slice_id);
                ack(SliceOp::Remove, *module_id, *slice_id, result)
            }
            _ => return None,
        };
        Some(reply)
    }
}

fn ack(op: SliceOp, module_id: ModuleId, slice_id: SliceId, result: Result<(), SliceError>) -> MessageBody {
    let status = match result {
        Ok(()) => status::OK,
        Err(e) => {
            warn!("Slice {:?} failed: {}", op, e);
            e.status()
        }
    };
    MessageBody::SliceAck(SliceAck {
        op,
        module_id,
        slice_id,
        status,
    })
}

impl fmt::Debug for RanSliceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RanSliceController")
            .field("slices", &self.slices)
            .finish_non_exhaustive()
    }
}
