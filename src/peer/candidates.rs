//! Buffer for network-path candidates that arrived early

use super::capability::{CandidateInit, MediaConnection};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// FIFO queue of candidates received before they could be applied
///
/// A candidate can only be applied once a remote description has been
/// committed; anything that arrives before that waits here. `drain` is
/// idempotent — applied candidates are removed, so redundant calls (after a
/// description commit, on a connected transition, or defensively) apply
/// nothing twice.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: VecDeque<CandidateInit>,
}

impl CandidateBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a candidate for later application
    pub fn push(&mut self, candidate: CandidateInit) {
        self.pending.push_back(candidate);
        debug!("Buffered candidate (total buffered: {})", self.pending.len());
    }

    /// Number of buffered candidates
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Discard all buffered candidates
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Apply every buffered candidate in arrival order
    ///
    /// Candidates that fail to apply are dropped with a logged reason and do
    /// not block the rest. Returns the number applied successfully.
    pub async fn drain(&mut self, connection: &dyn MediaConnection) -> usize {
        if self.pending.is_empty() {
            return 0;
        }

        debug!("Draining {} buffered candidates", self.pending.len());

        let mut applied = 0;
        while let Some(candidate) = self.pending.pop_front() {
            if candidate.is_empty() {
                debug!("Skipping empty buffered candidate");
                continue;
            }

            match connection.add_candidate(candidate).await {
                Ok(()) => applied += 1,
                Err(e) => warn!("Dropping buffered candidate: {}", e),
            }
        }

        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::capability::SessionDescription;
    use crate::Result;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::Mutex;
    use webrtc::track::track_local::TrackLocal;

    /// Records applied candidates; rejects ones marked malformed
    #[derive(Default)]
    struct RecordingConnection {
        applied: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaConnection for RecordingConnection {
        async fn create_offer(&self, _ice_restart: bool) -> Result<SessionDescription> {
            Ok(SessionDescription::offer("v=0\r\n"))
        }

        async fn create_answer(&self) -> Result<SessionDescription> {
            Ok(SessionDescription::answer("v=0\r\n"))
        }

        async fn set_local_description(&self, _description: SessionDescription) -> Result<()> {
            Ok(())
        }

        async fn set_remote_description(&self, _description: SessionDescription) -> Result<()> {
            Ok(())
        }

        async fn add_candidate(&self, candidate: CandidateInit) -> Result<()> {
            if candidate.candidate.contains("malformed") {
                return Err(crate::Error::IceCandidate("malformed candidate".to_string()));
            }
            self.applied.lock().unwrap().push(candidate.candidate);
            Ok(())
        }

        async fn add_track(&self, _track: Arc<dyn TrackLocal + Send + Sync>) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        fn connection_id(&self) -> &str {
            "recording"
        }
    }

    fn candidate(value: &str) -> CandidateInit {
        CandidateInit {
            candidate: value.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_drain_preserves_order() {
        tokio_test::block_on(async {
            let conn = RecordingConnection::default();
            let mut buffer = CandidateBuffer::new();

            buffer.push(candidate("c1"));
            buffer.push(candidate("c2"));
            buffer.push(candidate("c3"));

            let applied = buffer.drain(&conn).await;
            assert_eq!(applied, 3);
            assert!(buffer.is_empty());
            assert_eq!(*conn.applied.lock().unwrap(), vec!["c1", "c2", "c3"]);
        });
    }

    #[test]
    fn test_malformed_candidate_does_not_block() {
        tokio_test::block_on(async {
            let conn = RecordingConnection::default();
            let mut buffer = CandidateBuffer::new();

            buffer.push(candidate("c1"));
            buffer.push(candidate("malformed"));
            buffer.push(candidate("c3"));

            let applied = buffer.drain(&conn).await;
            assert_eq!(applied, 2);
            assert!(buffer.is_empty());
            assert_eq!(*conn.applied.lock().unwrap(), vec!["c1", "c3"]);
        });
    }

    #[test]
    fn test_drain_is_idempotent() {
        tokio_test::block_on(async {
            let conn = RecordingConnection::default();
            let mut buffer = CandidateBuffer::new();

            buffer.push(candidate("c1"));

            assert_eq!(buffer.drain(&conn).await, 1);
            assert_eq!(buffer.drain(&conn).await, 0);
            assert_eq!(buffer.drain(&conn).await, 0);
            assert_eq!(conn.applied.lock().unwrap().len(), 1);
        });
    }

    #[test]
    fn test_empty_candidates_skipped() {
        tokio_test::block_on(async {
            let conn = RecordingConnection::default();
            let mut buffer = CandidateBuffer::new();

            buffer.push(CandidateInit::default());
            buffer.push(candidate("c1"));

            assert_eq!(buffer.drain(&conn).await, 1);
            assert_eq!(*conn.applied.lock().unwrap(), vec!["c1"]);
        });
    }
}
