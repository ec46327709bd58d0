//! Session task - the single writer for one call
//!
//! Owns the connection, the relay subscription and the candidate queue.
//! Remote signals, connection events and the negotiation deadline are folded
//! into one [`SessionEvent`] stream and applied one at a time by
//! `handle_event`. A hang-up interrupts whatever step is in flight, then
//! teardown runs every release step regardless of earlier failures.

use crate::application::metrics;
use crate::application::orchestrator::{CallEndedCallback, CallOutcome, CallSettings, CallView};
use crate::domain::call::{
    CallError, CallRole, CallSession, ConnectionError, ConnectionState, EndReason, IceCandidate,
    NegotiationError, NegotiationState, SignalKind, SignalMessage, TransportError,
};
use crate::domain::connection::{ConnectionFactory, PeerConnection, PeerEvent, PeerEventSender};
use crate::domain::history::{CallHistoryRecorder, CallStatus};
use crate::domain::media::{MediaGate, MediaStreamHandle};
use crate::domain::relay::{SignalRelay, Subscription};
use crate::domain::shared::error::DomainError;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Upper bound on the best-effort hangup notice sent during teardown
const HANGUP_NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);

/// Collaborators shared by every session of an orchestrator
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) media: Arc<dyn MediaGate>,
    pub(crate) connections: Arc<dyn ConnectionFactory>,
    pub(crate) relay: Arc<dyn SignalRelay>,
    pub(crate) history: CallHistoryRecorder,
    pub(crate) settings: CallSettings,
}

/// Everything that can happen to a live session
#[derive(Debug)]
pub(crate) enum SessionEvent {
    Remote(SignalMessage),
    Peer(PeerEvent),
    RelayClosed,
    NegotiationTimeout,
}

/// How the session left its event loop
#[derive(Debug)]
enum Exit {
    Ended(EndReason),
    Error(CallError),
}

fn require_connection(
    connection: &Option<Box<dyn PeerConnection>>,
) -> Result<&dyn PeerConnection, NegotiationError> {
    connection
        .as_deref()
        .ok_or_else(|| NegotiationError::OutOfOrder("no peer connection".to_string()))
}

async fn wait_for_hangup(hangup: &mut watch::Receiver<bool>) -> EndReason {
    match hangup.wait_for(|requested| *requested).await.map(|_| ()) {
        Ok(()) => EndReason::LocalHangup,
        Err(_) => EndReason::Unmounted,
    }
}

async fn next_signal(subscription: Option<&mut Subscription>) -> Option<SignalMessage> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

pub(crate) struct SessionTask {
    session: CallSession,
    media: Arc<dyn MediaGate>,
    connections: Arc<dyn ConnectionFactory>,
    relay: Arc<dyn SignalRelay>,
    history: CallHistoryRecorder,
    settings: CallSettings,
    /// Handed to the connection factory once
    peer_events_tx: Option<PeerEventSender>,
    local_stream: Option<MediaStreamHandle>,
    remote_stream: MediaStreamHandle,
    connection: Option<Box<dyn PeerConnection>>,
    subscription: Option<Subscription>,
    negotiation: NegotiationState,
    connection_state: ConnectionState,
    remote_description_set: bool,
    /// Remote candidates that arrived before any remote description
    pending_candidates: VecDeque<IceCandidate>,
    ever_connected: bool,
    heard_from_remote: bool,
    error: Option<CallError>,
    outcome: Option<CallOutcome>,
    view: watch::Sender<CallView>,
    on_ended: Option<CallEndedCallback>,
}

impl SessionTask {
    pub(crate) fn new(
        session: CallSession,
        context: SessionContext,
        peer_events_tx: PeerEventSender,
        view: watch::Sender<CallView>,
        on_ended: Option<CallEndedCallback>,
    ) -> Self {
        Self {
            session,
            media: context.media,
            connections: context.connections,
            relay: context.relay,
            history: context.history,
            settings: context.settings,
            peer_events_tx: Some(peer_events_tx),
            local_stream: None,
            remote_stream: MediaStreamHandle::empty(),
            connection: None,
            subscription: None,
            negotiation: NegotiationState::Idle,
            connection_state: ConnectionState::New,
            remote_description_set: false,
            pending_candidates: VecDeque::new(),
            ever_connected: false,
            heard_from_remote: false,
            error: None,
            outcome: None,
            view,
            on_ended,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut hangup: watch::Receiver<bool>,
        mut peer_events: mpsc::UnboundedReceiver<PeerEvent>,
    ) {
        metrics::record_call_started();

        // Not raced against hang-up: a committed row must get its id back
        self.start_history().await;

        let established = tokio::select! {
            biased;
            reason = wait_for_hangup(&mut hangup) => Err(Exit::Ended(reason)),
            result = self.establish() => result.map_err(Exit::Error),
        };

        let exit = match established {
            Ok(()) => self.drive(&mut hangup, &mut peer_events).await,
            Err(exit) => exit,
        };

        self.teardown(exit).await;
    }

    async fn start_history(&mut self) {
        let caller_id = self.session.caller_id().clone();
        let receiver_id = self.session.receiver_id().clone();
        match self.history.start(&caller_id, &receiver_id).await {
            Ok(id) => {
                self.session.set_history_record_id(id);
                self.publish_view();
            }
            Err(e) => {
                warn!(
                    "Call {} continues without a history record: {}",
                    self.session.call_id(),
                    e
                );
            }
        }
    }

    /// Media, connection, subscription, and the caller's offer
    async fn establish(&mut self) -> Result<(), CallError> {
        let stream = self.media.acquire(&self.settings.constraints).await?;
        info!(
            "Acquired local media for call {} ({} tracks)",
            self.session.call_id(),
            stream.tracks().len()
        );
        self.local_stream = Some(stream.clone());
        self.publish_view();

        let events = self.peer_events_tx.take().ok_or_else(|| {
            ConnectionError::Setup("peer event channel already handed out".to_string())
        })?;
        let connection = self
            .connections
            .create(&self.settings.ice, &stream, events)
            .await?;
        self.connection = Some(connection);
        debug!("Peer connection created for call {}", self.session.call_id());

        let subscription = self.relay.subscribe(self.session.call_id()).await?;
        self.subscription = Some(subscription);
        info!("Subscribed to relay channel {}", self.session.call_id().channel());

        if self.session.role() == CallRole::Caller {
            self.send_offer().await?;
        }

        Ok(())
    }

    async fn drive(
        &mut self,
        hangup: &mut watch::Receiver<bool>,
        peer_events: &mut mpsc::UnboundedReceiver<PeerEvent>,
    ) -> Exit {
        let deadline = self
            .settings
            .negotiation_timeout
            .map(|timeout| Instant::now() + timeout);

        loop {
            let event = tokio::select! {
                biased;
                reason = wait_for_hangup(hangup) => return Exit::Ended(reason),
                event = self.next_event(peer_events, deadline) => event,
            };

            let step = tokio::select! {
                biased;
                reason = wait_for_hangup(hangup) => return Exit::Ended(reason),
                step = self.handle_event(event) => step,
            };

            match step {
                Ok(None) => {}
                Ok(Some(reason)) => return Exit::Ended(reason),
                Err(e) => return Exit::Error(e),
            }
        }
    }

    async fn next_event(
        &mut self,
        peer_events: &mut mpsc::UnboundedReceiver<PeerEvent>,
        deadline: Option<Instant>,
    ) -> SessionEvent {
        // The deadline only guards calls that never connected
        let deadline = if self.ever_connected { None } else { deadline };
        let timeout = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            Some(event) = peer_events.recv() => SessionEvent::Peer(event),
            message = next_signal(self.subscription.as_mut()) => match message {
                Some(message) => SessionEvent::Remote(message),
                None => SessionEvent::RelayClosed,
            },
            () = timeout => SessionEvent::NegotiationTimeout,
        }
    }

    /// Apply one event; `Ok(Some(_))` ends the call
    pub(crate) async fn handle_event(
        &mut self,
        event: SessionEvent,
    ) -> Result<Option<EndReason>, CallError> {
        match event {
            SessionEvent::Remote(message) => self.on_remote_signal(message).await,
            SessionEvent::Peer(PeerEvent::LocalCandidate(candidate)) => {
                let message = SignalMessage::ice_candidate(
                    self.session.call_id().clone(),
                    self.session.local_participant_id().clone(),
                    self.session.remote_participant_id().clone(),
                    &candidate,
                )?;
                self.publish(message).await?;
                Ok(None)
            }
            SessionEvent::Peer(PeerEvent::StateChanged(state)) => {
                Ok(self.on_connection_state(state))
            }
            SessionEvent::Peer(PeerEvent::RemoteTrack(track)) => {
                info!(
                    "Remote {:?} track {} added to call {}",
                    track.kind(),
                    track.id(),
                    self.session.call_id()
                );
                self.remote_stream.add_track(track);
                self.publish_view();
                Ok(None)
            }
            SessionEvent::RelayClosed => Err(TransportError::Closed.into()),
            SessionEvent::NegotiationTimeout => {
                warn!(
                    "Call {} not connected before the negotiation deadline (state {})",
                    self.session.call_id(),
                    self.connection_state
                );
                Ok(Some(EndReason::NegotiationTimeout))
            }
        }
    }

    async fn on_remote_signal(
        &mut self,
        message: SignalMessage,
    ) -> Result<Option<EndReason>, CallError> {
        if !self.session.accepts(&message) {
            debug!(
                "Ignoring {} signal from {} to {} on call {}",
                message.kind.as_str(),
                message.sender_id,
                message.receiver_id,
                message.call_id
            );
            metrics::record_signal_ignored();
            return Ok(None);
        }

        self.heard_from_remote = true;
        debug!(
            "Received {} signal on call {}",
            message.kind.as_str(),
            self.session.call_id()
        );

        match message.kind {
            SignalKind::Offer => self.on_remote_offer(&message).await?,
            SignalKind::Answer => self.on_remote_answer(&message).await?,
            SignalKind::IceCandidate => self.on_remote_candidate(&message).await?,
            SignalKind::Hangup => {
                info!("Remote participant hung up call {}", self.session.call_id());
                return Ok(Some(EndReason::RemoteHangup));
            }
        }

        Ok(None)
    }

    async fn send_offer(&mut self) -> Result<(), CallError> {
        self.advance(NegotiationState::Offering)?;

        let connection = require_connection(&self.connection)?;
        let offer = connection.create_offer().await?;
        connection.set_local_description(offer.clone()).await?;

        let message = SignalMessage::description(
            self.session.call_id().clone(),
            self.session.local_participant_id().clone(),
            self.session.remote_participant_id().clone(),
            &offer,
        )?;
        self.publish(message).await?;
        self.advance(NegotiationState::AwaitingAnswer)?;

        info!(
            "Published offer for call {} to {}",
            self.session.call_id(),
            self.session.remote_participant_id()
        );
        Ok(())
    }

    async fn on_remote_offer(&mut self, message: &SignalMessage) -> Result<(), CallError> {
        let next = match self.negotiation {
            NegotiationState::Idle => NegotiationState::Answering,
            NegotiationState::Negotiated => NegotiationState::Renegotiating,
            NegotiationState::Offering | NegotiationState::AwaitingAnswer => {
                return Err(NegotiationError::Glare.into());
            }
            state => {
                return Err(NegotiationError::OutOfOrder(format!(
                    "offer received while {}",
                    state
                ))
                .into());
            }
        };
        let offer = message.session_description()?;
        self.advance(next)?;

        require_connection(&self.connection)?
            .set_remote_description(offer)
            .await?;
        self.remote_description_set = true;
        self.flush_pending_candidates().await?;

        let connection = require_connection(&self.connection)?;
        let answer = connection.create_answer().await?;
        connection.set_local_description(answer.clone()).await?;

        let reply = SignalMessage::description(
            self.session.call_id().clone(),
            self.session.local_participant_id().clone(),
            self.session.remote_participant_id().clone(),
            &answer,
        )?;
        self.publish(reply).await?;
        self.advance(NegotiationState::Negotiated)?;

        info!("Answered offer on call {}", self.session.call_id());
        Ok(())
    }

    async fn on_remote_answer(&mut self, message: &SignalMessage) -> Result<(), CallError> {
        if self.negotiation != NegotiationState::AwaitingAnswer {
            return Err(NegotiationError::OutOfOrder(format!(
                "answer received while {}",
                self.negotiation
            ))
            .into());
        }
        let answer = message.session_description()?;

        require_connection(&self.connection)?
            .set_remote_description(answer)
            .await?;
        self.remote_description_set = true;
        self.flush_pending_candidates().await?;
        self.advance(NegotiationState::Negotiated)?;

        info!("Applied answer on call {}", self.session.call_id());
        Ok(())
    }

    async fn on_remote_candidate(&mut self, message: &SignalMessage) -> Result<(), CallError> {
        let candidate = message.candidate()?;

        if self.remote_description_set {
            require_connection(&self.connection)?
                .add_ice_candidate(candidate)
                .await?;
        } else {
            self.pending_candidates.push_back(candidate);
            debug!(
                "Queued early ICE candidate on call {} ({} pending)",
                self.session.call_id(),
                self.pending_candidates.len()
            );
        }
        Ok(())
    }

    /// Apply queued candidates in arrival order
    async fn flush_pending_candidates(&mut self) -> Result<(), NegotiationError> {
        if self.pending_candidates.is_empty() {
            return Ok(());
        }
        debug!(
            "Flushing {} queued ICE candidates on call {}",
            self.pending_candidates.len(),
            self.session.call_id()
        );

        while let Some(candidate) = self.pending_candidates.pop_front() {
            require_connection(&self.connection)?
                .add_ice_candidate(candidate)
                .await?;
        }
        Ok(())
    }

    fn on_connection_state(&mut self, state: ConnectionState) -> Option<EndReason> {
        if state == self.connection_state {
            return None;
        }
        if !self.connection_state.can_transition_to(&state) {
            warn!(
                "Ignoring connection state change {} -> {} on call {}",
                self.connection_state,
                state,
                self.session.call_id()
            );
            return None;
        }

        info!(
            "Call {} connection state: {} -> {}",
            self.session.call_id(),
            self.connection_state,
            state
        );
        self.connection_state = state;
        if state == ConnectionState::Connected {
            self.ever_connected = true;
        }
        self.publish_view();

        if state.ends_call() {
            Some(EndReason::ConnectionLost(state))
        } else {
            None
        }
    }

    fn advance(&mut self, next: NegotiationState) -> Result<(), NegotiationError> {
        if !self.negotiation.can_transition_to(&next) {
            return Err(DomainError::InvalidStateTransition(format!(
                "Cannot transition from {} to {}",
                self.negotiation, next
            ))
            .into());
        }

        debug!(
            "Call {} negotiation: {} -> {}",
            self.session.call_id(),
            self.negotiation,
            next
        );
        self.negotiation = next;
        self.publish_view();
        Ok(())
    }

    async fn publish(&mut self, message: SignalMessage) -> Result<(), TransportError> {
        self.relay.publish(self.session.call_id(), &message).await?;
        metrics::record_signal_published(message.kind);
        debug!(
            "Published {} signal on call {}",
            message.kind.as_str(),
            self.session.call_id()
        );
        Ok(())
    }

    fn classify(&self, exit: &Exit) -> CallStatus {
        match exit {
            Exit::Error(_) => CallStatus::Failed,
            Exit::Ended(EndReason::ConnectionLost(_)) => CallStatus::Failed,
            Exit::Ended(EndReason::NegotiationTimeout) => {
                if self.heard_from_remote {
                    CallStatus::Failed
                } else {
                    CallStatus::Missed
                }
            }
            Exit::Ended(
                EndReason::LocalHangup | EndReason::Unmounted | EndReason::RemoteHangup,
            ) => {
                if self.ever_connected {
                    CallStatus::Completed
                } else {
                    CallStatus::Missed
                }
            }
        }
    }

    /// Release everything; each step runs even if an earlier one failed
    async fn teardown(mut self, exit: Exit) {
        let status = self.classify(&exit);
        match &exit {
            Exit::Error(e) => {
                error!("Call {} failed: {}", self.session.call_id(), e);
                self.error = Some(e.clone());
            }
            Exit::Ended(reason) => {
                info!("Call {} ending: {:?}", self.session.call_id(), reason);
            }
        }

        if matches!(
            exit,
            Exit::Ended(EndReason::LocalHangup | EndReason::Unmounted)
        ) {
            self.notify_remote_hangup().await;
        }

        if let Some(stream) = self.local_stream.as_ref() {
            match self.media.release(stream) {
                Ok(()) => debug!("Local media released for call {}", self.session.call_id()),
                Err(e) => warn!(
                    "Failed to release local media for call {}: {}",
                    self.session.call_id(),
                    e
                ),
            }
        }

        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                warn!(
                    "Failed to close peer connection for call {}: {}",
                    self.session.call_id(),
                    e
                );
            }
            self.connection_state = ConnectionState::Closed;
        }
        self.pending_candidates.clear();

        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = subscription.unsubscribe() {
                warn!(
                    "Failed to unsubscribe from relay for call {}: {}",
                    self.session.call_id(),
                    e
                );
            }
        }

        if let Some(id) = self.session.history_record_id() {
            match self.history.finish(id, status).await {
                Ok(true) => {}
                Ok(false) => debug!("History for call {} was already final", self.session.call_id()),
                Err(e) => error!(
                    "Failed to finalize history record {} for call {}: {}",
                    id,
                    self.session.call_id(),
                    e
                ),
            }
        }

        metrics::record_call_finalized(status);
        info!("Call {} ended as {}", self.session.call_id(), status.as_str());

        let outcome = CallOutcome {
            status,
            error: self.error.clone(),
        };
        self.outcome = Some(outcome.clone());
        self.publish_view();

        if let Some(callback) = self.on_ended.take() {
            callback(&outcome);
        }
    }

    /// Best-effort hangup notice so the peer can finalize promptly
    async fn notify_remote_hangup(&mut self) {
        if self.subscription.is_none() {
            return;
        }

        let message = SignalMessage::hangup(
            self.session.call_id().clone(),
            self.session.local_participant_id().clone(),
            self.session.remote_participant_id().clone(),
        );
        match tokio::time::timeout(HANGUP_NOTIFY_TIMEOUT, self.publish(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                "Failed to notify remote hangup on call {}: {}",
                self.session.call_id(),
                e
            ),
            Err(_) => warn!(
                "Timed out notifying remote hangup on call {}",
                self.session.call_id()
            ),
        }
    }

    fn publish_view(&self) {
        self.view.send_replace(CallView {
            call_id: self.session.call_id().clone(),
            role: self.session.role(),
            local_stream: self.local_stream.clone(),
            remote_stream: self.remote_stream.clone(),
            is_connected: self.connection_state == ConnectionState::Connected,
            connection_state: self.connection_state,
            negotiation_state: self.negotiation,
            history_record_id: self.session.history_record_id(),
            error: self.error.clone(),
            outcome: self.outcome.clone(),
        });
    }
}
