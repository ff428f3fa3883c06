//! One detection session: frames in, de-duplicated sightings out.

use crate::alert::{AlertSink, Sighting};
use crate::dedup::{ResetTimer, SightingDeduplicator};
use crate::extractor::EmbeddingExtractor;
use crate::gallery::FaceGalleryMatcher;
use crate::imaging::Frame;
use crate::types::FaceMatch;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Anything that yields video frames, e.g. a camera.
pub trait FrameSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn next_frame(&mut self) -> Result<Frame, Self::Error>;
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("frame source failed: {0}")]
    Source(Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to start cooldown timer: {0}")]
    Timer(#[from] std::io::Error),
}

/// Counters reported by [`DetectionSession::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    /// Frames dropped because matching failed.
    pub skipped: u64,
    pub faces: u64,
    pub alerts: u64,
}

/// Owns the frame source, a fresh sighting set and its cooldown timer.
pub struct DetectionSession<S, A> {
    source: S,
    sink: A,
    dedup: Arc<SightingDeduplicator>,
    timer: ResetTimer,
    stats: SessionStats,
}

impl<S: FrameSource, A: AlertSink> DetectionSession<S, A> {
    pub fn start(source: S, sink: A, cooldown: Duration) -> Result<Self, SessionError> {
        let dedup = Arc::new(SightingDeduplicator::new());
        let timer = ResetTimer::spawn(Arc::clone(&dedup), cooldown)?;
        tracing::info!(cooldown_secs = cooldown.as_secs(), "detection session started");
        Ok(Self {
            source,
            sink,
            dedup,
            timer,
            stats: SessionStats::default(),
        })
    }

    /// Process one frame. A frame-source error ends the session for the caller;
    /// a frame that fails matching is logged and skipped.
    pub fn step<E: EmbeddingExtractor>(
        &mut self,
        matcher: &mut FaceGalleryMatcher<E>,
    ) -> Result<Vec<FaceMatch>, SessionError> {
        let frame = self
            .source
            .next_frame()
            .map_err(|e| SessionError::Source(Box::new(e)))?;

        let matches = match matcher.match_frame(&frame) {
            Ok(matches) => matches,
            Err(e) => {
                self.stats.skipped += 1;
                tracing::warn!(error = %e, skipped = self.stats.skipped, "frame skipped");
                return Ok(Vec::new());
            }
        };
        self.stats.frames += 1;
        self.stats.faces += matches.len() as u64;

        for m in &matches {
            let Some(name) = m.identity.as_deref() else {
                continue;
            };
            if self.dedup.check_and_insert(name) {
                tracing::info!(name, distance = ?m.distance, rect = ?m.rect, "known face sighted");
                if self.sink.dispatch(Sighting::now(name)) {
                    self.stats.alerts += 1;
                } else {
                    // Not queued: let the next sighting try again.
                    self.dedup.forget(name);
                }
            } else {
                tracing::trace!(name, "sighting suppressed within cooldown");
            }
        }

        Ok(matches)
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Identities alerted in the current cooldown window.
    pub fn window_size(&self) -> usize {
        self.dedup.len()
    }

    /// End the session and stop its cooldown timer.
    pub fn stop(self) -> SessionStats {
        self.timer.stop();
        tracing::info!(frames = self.stats.frames, alerts = self.stats.alerts, "detection session stopped");
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::mock::{face_at, ScriptedExtractor};
    use crate::gallery::DEFAULT_FRAME_SCALE;
    use crate::types::Embedding;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    #[derive(Debug, Error)]
    #[error("camera unplugged")]
    struct Unplugged;

    struct ScriptedSource {
        remaining: usize,
    }

    impl FrameSource for ScriptedSource {
        type Error = Unplugged;

        fn next_frame(&mut self) -> Result<Frame, Unplugged> {
            if self.remaining == 0 {
                return Err(Unplugged);
            }
            self.remaining -= 1;
            Ok(Frame::bgr(vec![0; 32 * 32 * 3], 32, 32))
        }
    }

    /// Records accepted sightings; refuses the first `refuse` dispatches.
    #[derive(Default)]
    struct RecordingSink {
        sightings: RefCell<Vec<String>>,
        refuse: Cell<usize>,
    }

    impl AlertSink for &RecordingSink {
        fn dispatch(&self, sighting: Sighting) -> bool {
            if self.refuse.get() > 0 {
                self.refuse.set(self.refuse.get() - 1);
                return false;
            }
            self.sightings.borrow_mut().push(sighting.name);
            true
        }
    }

    fn matcher(frames: Vec<Vec<(&str, [f32; 2])>>) -> FaceGalleryMatcher<ScriptedExtractor> {
        let mut ex = ScriptedExtractor::default();
        ex.frames = frames
            .into_iter()
            .map(|faces| {
                faces
                    .into_iter()
                    .enumerate()
                    .map(|(i, (_, v))| face_at(i as f32 * 2.0, 0.0, 2.0, v.to_vec()))
                    .collect()
            })
            .collect::<VecDeque<_>>();
        let mut m = FaceGalleryMatcher::new(ex, DEFAULT_FRAME_SCALE);
        m.gallery_mut().insert("A", Embedding::new(vec![1.0, 0.0]));
        m.gallery_mut().insert("B", Embedding::new(vec![0.0, 1.0]));
        m
    }

    #[test]
    fn test_repeat_identity_alerts_once_per_window() {
        let a = ("A", [1.0, 0.0]);
        let b = ("B", [0.0, 1.0]);
        let stranger = ("?", [-1.0, -1.0]);
        let mut m = matcher(vec![vec![a], vec![a, b], vec![stranger], vec![a]]);
        let sink = RecordingSink::default();

        let mut session =
            DetectionSession::start(ScriptedSource { remaining: 4 }, &sink, Duration::from_secs(3600)).unwrap();
        for _ in 0..4 {
            session.step(&mut m).unwrap();
        }

        assert_eq!(*sink.sightings.borrow(), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(session.window_size(), 2);
        let stats = session.stop();
        assert_eq!(stats, SessionStats { frames: 4, skipped: 0, faces: 5, alerts: 2 });
    }

    #[test]
    fn test_source_failure_is_fatal() {
        let mut m = matcher(vec![]);
        let sink = RecordingSink::default();
        let mut session =
            DetectionSession::start(ScriptedSource { remaining: 0 }, &sink, Duration::from_secs(3600)).unwrap();
        let err = session.step(&mut m).unwrap_err();
        assert!(matches!(err, SessionError::Source(_)));
        assert_eq!(err.to_string(), "frame source failed: camera unplugged");
        assert_eq!(session.stop().frames, 0);
    }

    #[test]
    fn test_refused_sighting_is_retried() {
        let a = ("A", [1.0, 0.0]);
        let mut m = matcher(vec![vec![a], vec![a], vec![a]]);
        let sink = RecordingSink { refuse: Cell::new(1), ..Default::default() };
        let mut session =
            DetectionSession::start(ScriptedSource { remaining: 3 }, &sink, Duration::from_secs(3600)).unwrap();

        session.step(&mut m).unwrap();
        assert_eq!(session.window_size(), 0);
        session.step(&mut m).unwrap();
        session.step(&mut m).unwrap();

        assert_eq!(*sink.sightings.borrow(), vec!["A".to_string()]);
        assert_eq!(session.stop().alerts, 1);
    }

    #[test]
    fn test_failed_extraction_skips_frame() {
        let a = ("A", [1.0, 0.0]);
        let mut m = matcher(vec![vec![a]]);
        m.extractor_mut().failures = 1;
        let sink = RecordingSink::default();
        let mut session =
            DetectionSession::start(ScriptedSource { remaining: 2 }, &sink, Duration::from_secs(3600)).unwrap();

        assert!(session.step(&mut m).unwrap().is_empty());
        assert_eq!(session.step(&mut m).unwrap().len(), 1);

        assert_eq!(*sink.sightings.borrow(), vec!["A".to_string()]);
        let stats = session.stop();
        assert_eq!((stats.frames, stats.skipped, stats.alerts), (1, 1, 1));
    }

    #[test]
    fn test_zero_cooldown_rejected() {
        let sink = RecordingSink::default();
        let result = DetectionSession::start(ScriptedSource { remaining: 1 }, &sink, Duration::ZERO);
        assert!(matches!(result, Err(SessionError::Timer(_))));
    }

    #[test]
    fn test_cooldown_reset_allows_realert() {
        let a = ("A", [1.0, 0.0]);
        let mut m = matcher(vec![vec![a], vec![a]]);
        let sink = RecordingSink::default();
        let mut session =
            DetectionSession::start(ScriptedSource { remaining: 2 }, &sink, Duration::from_millis(10)).unwrap();

        session.step(&mut m).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while session.window_size() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        session.step(&mut m).unwrap();
        session.stop();

        assert_eq!(sink.sightings.borrow().len(), 2);
    }
}
