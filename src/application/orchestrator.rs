//! Call orchestrator - the caller-facing API
//!
//! `start_call` spawns one session task per call and hands back a
//! [`CallHandle`]. The handle observes the session through a watch channel
//! and can toggle local tracks or hang up; everything else happens inside the
//! task.

use crate::application::session::{SessionContext, SessionTask};
use crate::config::Config;
use crate::domain::call::{
    CallError, CallRole, CallSession, ConnectionState, NegotiationState,
};
use crate::domain::connection::{ConnectionFactory, IceConfig};
use crate::domain::history::{CallHistoryRecorder, CallHistoryRepository, CallStatus};
use crate::domain::media::{MediaConstraints, MediaGate, MediaStreamHandle, TrackKind};
use crate::domain::relay::SignalRelay;
use crate::domain::shared::value_objects::{CallId, HistoryRecordId, ParticipantId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;

/// Invoked once when a call ends
pub type CallEndedCallback = Box<dyn FnOnce(&CallOutcome) + Send + 'static>;

/// How a call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub status: CallStatus,
    pub error: Option<CallError>,
}

/// Snapshot of a call as seen by the UI layer
#[derive(Debug, Clone)]
pub struct CallView {
    pub call_id: CallId,
    pub role: CallRole,
    pub local_stream: Option<MediaStreamHandle>,
    pub remote_stream: MediaStreamHandle,
    pub is_connected: bool,
    pub connection_state: ConnectionState,
    pub negotiation_state: NegotiationState,
    pub history_record_id: Option<HistoryRecordId>,
    pub error: Option<CallError>,
    /// Set once teardown has finished
    pub outcome: Option<CallOutcome>,
}

impl CallView {
    pub(crate) fn initial(session: &CallSession) -> Self {
        Self {
            call_id: session.call_id().clone(),
            role: session.role(),
            local_stream: None,
            remote_stream: MediaStreamHandle::empty(),
            is_connected: false,
            connection_state: ConnectionState::New,
            negotiation_state: NegotiationState::Idle,
            history_record_id: None,
            error: None,
            outcome: None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Per-call settings shared by every session
#[derive(Debug, Clone)]
pub struct CallSettings {
    pub ice: IceConfig,
    pub constraints: MediaConstraints,
    /// `None` waits for the connection forever
    pub negotiation_timeout: Option<Duration>,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            ice: IceConfig::default(),
            constraints: MediaConstraints::default(),
            negotiation_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl From<&Config> for CallSettings {
    fn from(config: &Config) -> Self {
        Self {
            ice: config.ice.to_ice_config(),
            constraints: MediaConstraints {
                audio: config.call.audio,
                video: config.call.video,
            },
            negotiation_timeout: match config.call.negotiation_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

/// Request to start one participant's side of a call
pub struct StartCall {
    pub call_id: CallId,
    pub local_participant_id: ParticipantId,
    pub remote_participant_id: ParticipantId,
    pub role: CallRole,
    pub on_ended: Option<CallEndedCallback>,
}

impl StartCall {
    pub fn new(
        call_id: impl Into<CallId>,
        local_participant_id: impl Into<ParticipantId>,
        remote_participant_id: impl Into<ParticipantId>,
        role: CallRole,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            local_participant_id: local_participant_id.into(),
            remote_participant_id: remote_participant_id.into(),
            role,
            on_ended: None,
        }
    }

    pub fn on_ended(mut self, callback: impl FnOnce(&CallOutcome) + Send + 'static) -> Self {
        self.on_ended = Some(Box::new(callback));
        self
    }
}

/// Starts call sessions
pub struct CallOrchestrator {
    context: SessionContext,
}

impl CallOrchestrator {
    pub fn new(
        media: Arc<dyn MediaGate>,
        connections: Arc<dyn ConnectionFactory>,
        relay: Arc<dyn SignalRelay>,
        history: Arc<dyn CallHistoryRepository>,
        settings: CallSettings,
    ) -> Self {
        Self {
            context: SessionContext {
                media,
                connections,
                relay,
                history: CallHistoryRecorder::new(history),
                settings,
            },
        }
    }

    /// Start a call session; must be called inside a tokio runtime
    pub fn start_call(&self, request: StartCall) -> CallHandle {
        let session = CallSession::new(
            request.call_id,
            request.local_participant_id,
            request.remote_participant_id,
            request.role,
        );
        info!(
            "Starting call {} between {} and {}",
            session.call_id(),
            session.local_participant_id(),
            session.remote_participant_id()
        );

        let call_id = session.call_id().clone();
        let (view_tx, view_rx) = watch::channel(CallView::initial(&session));
        let (hangup_tx, hangup_rx) = watch::channel(false);
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();

        let task = SessionTask::new(
            session,
            self.context.clone(),
            peer_tx,
            view_tx,
            request.on_ended,
        );
        tokio::spawn(task.run(hangup_rx, peer_rx));

        CallHandle {
            call_id,
            view: view_rx,
            hangup: Arc::new(hangup_tx),
        }
    }
}

/// Caller-facing handle to a live call
///
/// Dropping every clone of the handle ends the call like `end_call` does.
#[derive(Clone)]
pub struct CallHandle {
    call_id: CallId,
    view: watch::Receiver<CallView>,
    hangup: Arc<watch::Sender<bool>>,
}

impl CallHandle {
    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// Current snapshot
    pub fn view(&self) -> CallView {
        self.view.borrow().clone()
    }

    pub fn local_stream(&self) -> Option<MediaStreamHandle> {
        self.view.borrow().local_stream.clone()
    }

    pub fn remote_stream(&self) -> MediaStreamHandle {
        self.view.borrow().remote_stream.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.view.borrow().is_connected
    }

    pub fn error(&self) -> Option<CallError> {
        self.view.borrow().error.clone()
    }

    /// Toggle local video; returns whether video is now enabled
    pub fn toggle_video(&self) -> bool {
        self.toggle(TrackKind::Video)
    }

    /// Toggle local audio; returns whether audio is now enabled
    pub fn toggle_audio(&self) -> bool {
        self.toggle(TrackKind::Audio)
    }

    fn toggle(&self, kind: TrackKind) -> bool {
        match self.view.borrow().local_stream.as_ref() {
            Some(stream) => stream.toggle(kind),
            None => false,
        }
    }

    /// Hang up and wait for teardown to finish
    pub async fn end_call(&self) -> CallOutcome {
        info!("Hang-up requested for call {}", self.call_id);
        self.hangup.send_replace(true);
        self.ended().await
    }

    /// Wait until the call has ended, however it ended
    pub async fn ended(&self) -> CallOutcome {
        let view = self.wait_until(|view| view.is_ended()).await;
        view.outcome.unwrap_or(CallOutcome {
            status: CallStatus::Failed,
            error: None,
        })
    }

    /// Wait until the snapshot satisfies `predicate`
    ///
    /// Returns the last snapshot if the session task is gone first.
    pub async fn wait_until<F>(&self, mut predicate: F) -> CallView
    where
        F: FnMut(&CallView) -> bool,
    {
        let mut view = self.view.clone();
        let result = view.wait_for(&mut predicate).await.map(|v| (*v).clone());
        match result {
            Ok(snapshot) => snapshot,
            Err(_) => view.borrow().clone(),
        }
    }
}
