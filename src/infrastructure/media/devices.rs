//! Simulated capture devices
//!
//! A [`MediaGate`] for headless hosts: hands out fresh audio/video tracks
//! without touching hardware. Permission and missing-device failures can be
//! switched on to exercise the error paths.

use crate::domain::call::error::MediaError;
use crate::domain::media::{MediaConstraints, MediaGate, MediaStreamHandle, MediaTrack, TrackKind};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Simulated camera and microphone
#[derive(Debug)]
pub struct SimulatedCaptureDevices {
    permission_granted: bool,
    has_microphone: bool,
    has_camera: bool,
    acquired: AtomicUsize,
}

impl SimulatedCaptureDevices {
    /// Both devices present, permission granted
    pub fn new() -> Self {
        Self {
            permission_granted: true,
            has_microphone: true,
            has_camera: true,
            acquired: AtomicUsize::new(0),
        }
    }

    pub fn deny_permission(mut self) -> Self {
        self.permission_granted = false;
        self
    }

    pub fn without_camera(mut self) -> Self {
        self.has_camera = false;
        self
    }

    pub fn without_microphone(mut self) -> Self {
        self.has_microphone = false;
        self
    }

    /// Number of streams handed out so far
    pub fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    fn track(kind: TrackKind) -> Arc<MediaTrack> {
        let prefix = match kind {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        };
        Arc::new(MediaTrack::new(format!("{}-{}", prefix, Uuid::new_v4()), kind))
    }
}

impl Default for SimulatedCaptureDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaGate for SimulatedCaptureDevices {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<MediaStreamHandle, MediaError> {
        if !self.permission_granted {
            warn!("Capture permission denied");
            return Err(MediaError::PermissionDenied);
        }
        if !constraints.audio && !constraints.video {
            return Err(MediaError::DeviceUnavailable(
                "no audio or video requested".to_string(),
            ));
        }
        if constraints.audio && !self.has_microphone {
            return Err(MediaError::DeviceUnavailable("microphone".to_string()));
        }
        if constraints.video && !self.has_camera {
            return Err(MediaError::DeviceUnavailable("camera".to_string()));
        }

        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(Self::track(TrackKind::Audio));
        }
        if constraints.video {
            tracks.push(Self::track(TrackKind::Video));
        }

        let stream = MediaStreamHandle::new(tracks);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        info!("Simulated capture started: stream {}", stream.id());
        Ok(stream)
    }

    fn release(&self, stream: &MediaStreamHandle) -> Result<(), MediaError> {
        let stopped = stream.stop_all();
        debug!("Stopped {} tracks of stream {}", stopped, stream.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_audio_and_video() {
        let devices = SimulatedCaptureDevices::new();
        let stream = devices.acquire(&MediaConstraints::default()).await.unwrap();

        assert_eq!(stream.tracks().len(), 2);
        assert_eq!(stream.tracks_of(TrackKind::Audio).count(), 1);
        assert_eq!(stream.tracks_of(TrackKind::Video).count(), 1);
        assert_eq!(devices.acquired_count(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let devices = SimulatedCaptureDevices::new().deny_permission();
        let result = devices.acquire(&MediaConstraints::default()).await;

        assert_eq!(result.unwrap_err(), MediaError::PermissionDenied);
        assert_eq!(devices.acquired_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_camera_only_matters_for_video() {
        let devices = SimulatedCaptureDevices::new().without_camera();

        let err = devices.acquire(&MediaConstraints::default()).await.unwrap_err();
        assert!(matches!(err, MediaError::DeviceUnavailable(_)));

        let audio_only = MediaConstraints { audio: true, video: false };
        let stream = devices.acquire(&audio_only).await.unwrap();
        assert_eq!(stream.tracks().len(), 1);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let devices = SimulatedCaptureDevices::new();
        let stream = devices.acquire(&MediaConstraints::default()).await.unwrap();

        devices.release(&stream).unwrap();
        assert!(stream.all_stopped());
        devices.release(&stream).unwrap();
        assert!(stream.all_stopped());
    }
}
