//! Track collection: assembles inbound tracks into one playable stream.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::transport::{MediaKind, RemoteTrack};

/// Container of tracks handed to the playback sink.
///
/// Holds at most one track per media kind. Tracks are only ever appended;
/// once the session stops, the stream is sealed and rejects further tracks.
#[derive(Debug, Clone, Default)]
pub struct OutputStream {
    inner: Arc<Mutex<StreamInner>>,
}

#[derive(Debug, Default)]
struct StreamInner {
    tracks: Vec<Arc<dyn RemoteTrack>>,
    sealed: bool,
}

/// What happened to a track offered to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackDisposition {
    Added,
    /// A track of the same kind is already in the stream.
    Duplicate,
    UnknownKind,
    /// The session has stopped collecting.
    Stopped,
}

impl OutputStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StreamInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tracks(&self) -> Vec<Arc<dyn RemoteTrack>> {
        self.lock().tracks.clone()
    }

    pub fn track(&self, kind: &MediaKind) -> Option<Arc<dyn RemoteTrack>> {
        self.lock()
            .tracks
            .iter()
            .find(|track| &track.kind() == kind)
            .cloned()
    }

    pub fn video_track(&self) -> Option<Arc<dyn RemoteTrack>> {
        self.track(&MediaKind::Video)
    }

    pub fn audio_track(&self) -> Option<Arc<dyn RemoteTrack>> {
        self.track(&MediaKind::Audio)
    }

    pub fn len(&self) -> usize {
        self.lock().tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tracks.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    fn add_unique(&self, kind: &MediaKind, track: Arc<dyn RemoteTrack>) -> TrackDisposition {
        let mut inner = self.lock();
        if inner.sealed {
            return TrackDisposition::Stopped;
        }
        if inner.tracks.iter().any(|existing| &existing.kind() == kind) {
            return TrackDisposition::Duplicate;
        }
        inner.tracks.push(track);
        TrackDisposition::Added
    }

    fn seal(&self) {
        self.lock().sealed = true;
    }
}

/// Receives inbound tracks from the transport and keeps the first of each kind.
#[derive(Debug, Clone, Default)]
pub struct TrackCollector {
    stream: OutputStream,
}

impl TrackCollector {
    pub fn new(stream: OutputStream) -> Self {
        Self { stream }
    }

    pub fn stream(&self) -> &OutputStream {
        &self.stream
    }

    pub fn on_track(&self, track: Arc<dyn RemoteTrack>) -> TrackDisposition {
        let kind = track.kind();
        let disposition = match kind {
            MediaKind::Video | MediaKind::Audio => self.stream.add_unique(&kind, Arc::clone(&track)),
            MediaKind::Other(_) => TrackDisposition::UnknownKind,
        };

        match disposition {
            TrackDisposition::Added => info!("added {} track {} to output stream", kind, track.id()),
            TrackDisposition::Duplicate => {
                debug!("ignoring duplicate {} track {}", kind, track.id())
            }
            TrackDisposition::UnknownKind => warn!("got unknown track kind={} id={}", kind, track.id()),
            TrackDisposition::Stopped => {
                debug!("collector stopped; dropping {} track {}", kind, track.id())
            }
        }
        disposition
    }

    /// Stops accepting tracks. Tracks already collected stay in the stream.
    pub fn stop(&self) {
        self.stream.seal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FakeTrack {
        id: &'static str,
        kind: &'static str,
    }

    fn track(id: &'static str, kind: &'static str) -> Arc<dyn RemoteTrack> {
        Arc::new(FakeTrack { id, kind })
    }

    impl RemoteTrack for FakeTrack {
        fn id(&self) -> String {
            self.id.to_string()
        }

        fn kind(&self) -> MediaKind {
            MediaKind::parse(self.kind)
        }
    }

    #[test]
    fn test_keeps_first_track_of_each_kind() {
        let collector = TrackCollector::default();
        assert_eq!(collector.on_track(track("v1", "video")), TrackDisposition::Added);
        assert_eq!(collector.on_track(track("v2", "video")), TrackDisposition::Duplicate);

        let stream = collector.stream();
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.video_track().unwrap().id(), "v1");
        assert!(stream.audio_track().is_none());
    }

    #[test]
    fn test_dedup_is_order_independent() {
        let arrivals = [
            vec![("a1", "audio"), ("v1", "video"), ("a2", "audio"), ("v2", "video")],
            vec![("v1", "video"), ("v2", "video"), ("a1", "audio"), ("a2", "audio")],
            vec![("a1", "audio"), ("a1", "audio"), ("v1", "video"), ("v1", "video")],
        ];

        for order in arrivals {
            let collector = TrackCollector::default();
            for (id, kind) in order {
                collector.on_track(track(id, kind));
            }
            let stream = collector.stream();
            assert_eq!(stream.len(), 2);
            assert_eq!(stream.video_track().unwrap().id(), "v1");
            assert_eq!(stream.audio_track().unwrap().id(), "a1");
        }
    }

    #[test]
    fn test_unknown_kind_is_ignored() {
        let collector = TrackCollector::default();
        assert_eq!(
            collector.on_track(track("d1", "application")),
            TrackDisposition::UnknownKind
        );
        assert!(collector.stream().is_empty());
    }

    #[test]
    fn test_stopped_collector_keeps_existing_tracks() {
        let stream = OutputStream::new();
        let collector = TrackCollector::new(stream.clone());
        collector.on_track(track("v1", "video"));
        collector.stop();

        assert_eq!(collector.on_track(track("a1", "audio")), TrackDisposition::Stopped);
        assert!(stream.is_sealed());
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.tracks()[0].id(), "v1");
    }
}
