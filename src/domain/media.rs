//! Local and remote media streams, and the gate that acquires local capture

use crate::domain::call::error::MediaError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// A single audio or video track
///
/// Enabled and stopped flags are atomics so toggles from the caller-facing
/// handle never have to go through the session task.
#[derive(Debug)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Flip the enabled flag, returning the new value
    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::SeqCst)
    }

    /// Stop the track; returns false if it was already stopped
    pub fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// A set of tracks: the local capture or what the remote peer sends us
#[derive(Debug, Clone)]
pub struct MediaStreamHandle {
    id: String,
    tracks: Vec<Arc<MediaTrack>>,
}

impl MediaStreamHandle {
    pub fn new(tracks: Vec<Arc<MediaTrack>>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tracks,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.tracks
    }

    pub fn add_track(&mut self, track: Arc<MediaTrack>) {
        self.tracks.push(track);
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &Arc<MediaTrack>> {
        self.tracks.iter().filter(move |track| track.kind() == kind)
    }

    /// Toggle every track of one kind; returns whether they are now enabled
    ///
    /// Returns false when the stream has no track of that kind.
    pub fn toggle(&self, kind: TrackKind) -> bool {
        let mut tracks = self.tracks_of(kind);
        let Some(first) = tracks.next() else {
            return false;
        };
        let enabled = first.toggle();
        for track in tracks {
            track.set_enabled(enabled);
        }
        enabled
    }

    /// Stop every track, returning how many were still live
    pub fn stop_all(&self) -> usize {
        self.tracks.iter().filter(|track| track.stop()).count()
    }

    pub fn all_stopped(&self) -> bool {
        self.tracks.iter().all(|track| track.is_stopped())
    }
}

/// What to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Media gate: acquires and releases local capture
#[async_trait]
pub trait MediaGate: Send + Sync {
    /// Request camera and microphone access
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<MediaStreamHandle, MediaError>;

    /// Stop every track of a stream; safe to call any number of times
    fn release(&self, stream: &MediaStreamHandle) -> Result<(), MediaError> {
        stream.stop_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_stream() -> MediaStreamHandle {
        MediaStreamHandle::new(vec![
            Arc::new(MediaTrack::new("mic", TrackKind::Audio)),
            Arc::new(MediaTrack::new("cam", TrackKind::Video)),
        ])
    }

    #[test]
    fn test_toggle_twice_restores_state() {
        let stream = local_stream();

        assert!(!stream.toggle(TrackKind::Video));
        assert!(stream.toggle(TrackKind::Video));
        assert!(stream.tracks_of(TrackKind::Video).all(|t| t.is_enabled()));
    }

    #[test]
    fn test_audio_and_video_toggle_independently() {
        let stream = local_stream();

        stream.toggle(TrackKind::Audio);
        assert!(stream.tracks_of(TrackKind::Audio).all(|t| !t.is_enabled()));
        assert!(stream.tracks_of(TrackKind::Video).all(|t| t.is_enabled()));
    }

    #[test]
    fn test_toggle_missing_kind() {
        let stream = MediaStreamHandle::new(vec![Arc::new(MediaTrack::new("mic", TrackKind::Audio))]);
        assert!(!stream.toggle(TrackKind::Video));
    }

    #[test]
    fn test_stop_all_is_idempotent() {
        let stream = local_stream();

        assert_eq!(stream.stop_all(), 2);
        assert_eq!(stream.stop_all(), 0);
        assert!(stream.all_stopped());
    }
}
