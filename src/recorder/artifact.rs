//! Finished recordings and their handoff to an editing surface

use crate::recorder::channel::{RecordingError, RecordingResult};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tokio::sync::oneshot;

/// A finalized output container. Immutable once produced; clones share the
/// same bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct RecordingArtifact {
    bytes: Arc<[u8]>,
    media_type: String,
}

impl RecordingArtifact {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True when both handles refer to the very same bytes
    pub fn same_bytes(&self, other: &RecordingArtifact) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl std::fmt::Debug for RecordingArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingArtifact")
            .field("len", &self.bytes.len())
            .field("media_type", &self.media_type)
            .finish()
    }
}

/// `<label>-<ISO 8601 timestamp with ':' and '.' replaced by '-'>.<ext>`
pub fn export_file_name(label: &str, at: DateTime<Utc>, ext: &str) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{}-{}.{}", label, stamp, ext)
}

/// Create a ready/acknowledge handoff.
///
/// The receiving side must announce it is ready before the payload is sent,
/// so a slow-starting editor never misses the artifact.
pub fn handoff() -> (ArtifactSender, ArtifactReceiver) {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (payload_tx, payload_rx) = oneshot::channel();

    (
        ArtifactSender {
            ready_rx,
            payload_tx,
        },
        ArtifactReceiver {
            ready_tx,
            payload_rx,
        },
    )
}

pub struct ArtifactSender {
    ready_rx: oneshot::Receiver<()>,
    payload_tx: oneshot::Sender<RecordingArtifact>,
}

impl ArtifactSender {
    /// Wait for the receiver's ready signal, then transmit
    pub async fn deliver(self, artifact: RecordingArtifact) -> RecordingResult<()> {
        self.ready_rx.await.map_err(|_| {
            RecordingError::ExportFailure("Editor closed before signalling ready".to_string())
        })?;

        tracing::info!(
            "Editor ready, handing off {} bytes ({})",
            artifact.len(),
            artifact.media_type()
        );

        self.payload_tx.send(artifact).map_err(|_| {
            RecordingError::ExportFailure("Editor closed before receiving the recording".to_string())
        })
    }
}

pub struct ArtifactReceiver {
    ready_tx: oneshot::Sender<()>,
    payload_rx: oneshot::Receiver<RecordingArtifact>,
}

impl ArtifactReceiver {
    /// Signal readiness and wait for the payload
    pub async fn receive(self) -> RecordingResult<RecordingArtifact> {
        self.ready_tx.send(()).map_err(|_| {
            RecordingError::ExportFailure("Recorder went away before handoff".to_string())
        })?;

        self.payload_rx.await.map_err(|_| {
            RecordingError::ExportFailure("Recorder went away before handoff".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_export_file_name() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(
            export_file_name("screen-recording", at, "webm"),
            "screen-recording-2024-03-09T14-05-07-042Z.webm"
        );
    }

    #[test]
    fn test_clone_shares_bytes() {
        let artifact = RecordingArtifact::new(vec![1, 2, 3], "video/webm");
        let copy = artifact.clone();
        assert!(artifact.same_bytes(&copy));

        let other = RecordingArtifact::new(vec![1, 2, 3], "video/webm");
        assert_eq!(artifact, other);
        assert!(!artifact.same_bytes(&other));
    }

    #[tokio::test]
    async fn test_payload_waits_for_ready() {
        let (sender, receiver) = handoff();
        let artifact = RecordingArtifact::new(vec![9; 16], "video/webm");

        let deliver = tokio::spawn(sender.deliver(artifact.clone()));
        tokio::task::yield_now().await;
        assert!(!deliver.is_finished());

        let received = receiver.receive().await.unwrap();
        assert_eq!(received, artifact);
        deliver.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_receiver_dropped_fails_delivery() {
        let (sender, receiver) = handoff();
        drop(receiver);

        let result = sender
            .deliver(RecordingArtifact::new(vec![1], "video/webm"))
            .await;
        assert!(matches!(result, Err(RecordingError::ExportFailure(_))));
    }
}
