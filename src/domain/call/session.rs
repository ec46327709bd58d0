//! Call session

use crate::domain::call::signal::SignalMessage;
use crate::domain::call::value_object::CallRole;
use crate::domain::shared::value_objects::{CallId, HistoryRecordId, ParticipantId};
use serde::{Deserialize, Serialize};

/// One participant's side of a call
///
/// Owned by exactly one session task for the lifetime of the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    call_id: CallId,
    local_participant_id: ParticipantId,
    remote_participant_id: ParticipantId,
    role: CallRole,
    /// Set once the history record has been created
    history_record_id: Option<HistoryRecordId>,
}

impl CallSession {
    pub fn new(
        call_id: CallId,
        local_participant_id: ParticipantId,
        remote_participant_id: ParticipantId,
        role: CallRole,
    ) -> Self {
        Self {
            call_id,
            local_participant_id,
            remote_participant_id,
            role,
            history_record_id: None,
        }
    }

    /// Participant who initiated the call
    pub fn caller_id(&self) -> &ParticipantId {
        match self.role {
            CallRole::Caller => &self.local_participant_id,
            CallRole::Callee => &self.remote_participant_id,
        }
    }

    /// Participant who received the call
    pub fn receiver_id(&self) -> &ParticipantId {
        match self.role {
            CallRole::Caller => &self.remote_participant_id,
            CallRole::Callee => &self.local_participant_id,
        }
    }

    /// Whether a relayed message belongs to this session
    ///
    /// The relay does no access control, so anything not sent by the remote
    /// participant to us on this call is dropped (our own echoes included).
    pub fn accepts(&self, message: &SignalMessage) -> bool {
        message.call_id == self.call_id
            && message.receiver_id == self.local_participant_id
            && message.sender_id == self.remote_participant_id
    }

    pub fn set_history_record_id(&mut self, id: HistoryRecordId) {
        self.history_record_id = Some(id);
    }

    // Getters
    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn local_participant_id(&self) -> &ParticipantId {
        &self.local_participant_id
    }

    pub fn remote_participant_id(&self) -> &ParticipantId {
        &self.remote_participant_id
    }

    pub fn role(&self) -> CallRole {
        self.role
    }

    pub fn history_record_id(&self) -> Option<HistoryRecordId> {
        self.history_record_id
    }
}
