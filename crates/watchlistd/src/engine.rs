use crate::config::Config;
use crate::source::{CameraOpener, SourceOpener};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use watchlist_core::{
    enroll_profile, AlertSink, Contact, DetectionSession, EmbeddingExtractor, EnrollError,
    ExtractError, FaceGalleryMatcher, GalleryError, OnnxExtractor, Profile, ProfileFields,
    ProfileStore, SessionError, SessionStats,
};
use watchlist_hw::CameraError;
use watchlist_store::{SqliteStore, StoreError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("gallery error: {0}")]
    Gallery(#[from] GalleryError),
    #[error("model load failed: {0}")]
    Models(#[from] ExtractError),
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("detection is already running")]
    AlreadyDetecting,
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Snapshot returned by the `Status` D-Bus method.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub version: &'static str,
    pub gallery_size: usize,
    pub detecting: bool,
    pub camera: String,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub faces_seen: u64,
    pub alerts_raised: u64,
    pub sightings_in_window: usize,
    pub last_error: Option<String>,
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    AddProfile {
        fields: ProfileFields,
        photo: Vec<u8>,
        filename: String,
        reply: Reply<Profile>,
    },
    RemoveProfile {
        name: String,
        reply: Reply<bool>,
    },
    ListProfiles {
        reply: Reply<Vec<Profile>>,
    },
    AddContact {
        phone: String,
        lat: f64,
        lon: f64,
        reply: Reply<Contact>,
    },
    ListContacts {
        reply: Reply<Vec<Contact>>,
    },
    StartDetection {
        reply: Reply<()>,
    },
    StopDetection {
        reply: Reply<bool>,
    },
    Status {
        reply: Reply<EngineStatus>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Enroll a profile; rejected without writing anything if the photo has no face.
    pub async fn add_profile(
        &self,
        fields: ProfileFields,
        photo: Vec<u8>,
        filename: String,
    ) -> Result<Profile, EngineError> {
        self.request(|reply| EngineRequest::AddProfile {
            fields,
            photo,
            filename,
            reply,
        })
        .await
    }

    pub async fn remove_profile(&self, name: String) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::RemoveProfile { name, reply })
            .await
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>, EngineError> {
        self.request(|reply| EngineRequest::ListProfiles { reply }).await
    }

    pub async fn add_contact(&self, phone: String, lat: f64, lon: f64) -> Result<Contact, EngineError> {
        self.request(|reply| EngineRequest::AddContact {
            phone,
            lat,
            lon,
            reply,
        })
        .await
    }

    pub async fn list_contacts(&self) -> Result<Vec<Contact>, EngineError> {
        self.request(|reply| EngineRequest::ListContacts { reply }).await
    }

    pub async fn start_detection(&self) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::StartDetection { reply })
            .await
    }

    /// Returns whether a session was running.
    pub async fn stop_detection(&self) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::StopDetection { reply })
            .await
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }

    /// Stop any running session and end the engine thread.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::Shutdown { reply }).await
    }
}

/// Spawn the production engine: SQLite store, ONNX models and the V4L2 camera.
///
/// Models are loaded and the gallery is built before this returns, so a
/// missing model file fails daemon startup. The camera is only opened
/// when detection starts.
pub fn spawn_engine<A>(config: &Config, store: SqliteStore, sink: A) -> Result<EngineHandle, EngineError>
where
    A: AlertSink + Clone + Send + 'static,
{
    let scrfd_path = config.scrfd_model_path();
    let arcface_path = config.arcface_model_path();
    let extractor = OnnxExtractor::load(&scrfd_path, &arcface_path, config.match_tolerance)?;
    tracing::info!(
        scrfd = %scrfd_path,
        arcface = %arcface_path,
        tolerance = config.match_tolerance,
        "face models loaded"
    );

    let matcher = FaceGalleryMatcher::new(extractor, config.frame_scale);
    let opener = CameraOpener::new(config.camera_device.clone());
    spawn(store, matcher, opener, sink, config.cooldown())
}

/// Build the gallery from `store`, then run the engine loop on a dedicated OS thread.
pub fn spawn<E, O, A>(
    store: SqliteStore,
    mut matcher: FaceGalleryMatcher<E>,
    opener: O,
    sink: A,
    cooldown: Duration,
) -> Result<EngineHandle, EngineError>
where
    E: EmbeddingExtractor + Send + 'static,
    O: SourceOpener + Send + 'static,
    A: AlertSink + Clone + Send + 'static,
{
    let loaded = matcher.load_gallery(&store)?;
    tracing::info!(entries = loaded, "gallery built");

    let (tx, rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("watchlist-engine".into())
        .spawn(move || {
            let engine = Engine {
                store,
                matcher,
                opener,
                sink,
                cooldown,
                session: None,
                last_stats: SessionStats::default(),
                last_error: None,
            };
            engine.run(rx);
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}

struct Engine<E, O: SourceOpener, A> {
    store: SqliteStore,
    matcher: FaceGalleryMatcher<E>,
    opener: O,
    sink: A,
    cooldown: Duration,
    session: Option<DetectionSession<O::Source, A>>,
    /// Counters of the most recent session, kept after it ends.
    last_stats: SessionStats,
    last_error: Option<String>,
}

impl<E, O, A> Engine<E, O, A>
where
    E: EmbeddingExtractor,
    O: SourceOpener,
    A: AlertSink + Clone,
{
    /// Serve requests until every handle is dropped or `Shutdown` arrives.
    ///
    /// Idle: block on the channel. Detecting: drain pending requests, then
    /// process one frame.
    fn run(mut self, mut rx: mpsc::Receiver<EngineRequest>) {
        tracing::info!("engine thread started");
        loop {
            let request = if self.session.is_some() {
                match rx.try_recv() {
                    Ok(request) => request,
                    Err(TryRecvError::Empty) => {
                        self.step();
                        continue;
                    }
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match rx.blocking_recv() {
                    Some(request) => request,
                    None => break,
                }
            };

            if !self.handle(request) {
                break;
            }
        }
        self.stop_session();
        tracing::info!("engine thread exiting");
    }

    /// Serve one request. Returns `false` once the engine should exit.
    fn handle(&mut self, request: EngineRequest) -> bool {
        match request {
            EngineRequest::AddProfile {
                fields,
                photo,
                filename,
                reply,
            } => {
                let _ = reply.send(self.add_profile(&fields, &photo, &filename));
            }
            EngineRequest::RemoveProfile { name, reply } => {
                let _ = reply.send(self.remove_profile(&name));
            }
            EngineRequest::ListProfiles { reply } => {
                let _ = reply.send(self.store.list_profiles().map_err(EngineError::from));
            }
            EngineRequest::AddContact {
                phone,
                lat,
                lon,
                reply,
            } => {
                let _ = reply.send(self.store.add_contact(&phone, lat, lon).map_err(EngineError::from));
            }
            EngineRequest::ListContacts { reply } => {
                let _ = reply.send(self.store.list_contacts().map_err(EngineError::from));
            }
            EngineRequest::StartDetection { reply } => {
                let _ = reply.send(self.start_session());
            }
            EngineRequest::StopDetection { reply } => {
                let _ = reply.send(Ok(self.stop_session()));
            }
            EngineRequest::Status { reply } => {
                let _ = reply.send(Ok(self.status()));
            }
            EngineRequest::Shutdown { reply } => {
                self.stop_session();
                let _ = reply.send(Ok(()));
                return false;
            }
        }
        true
    }

    fn add_profile(&mut self, fields: &ProfileFields, photo: &[u8], filename: &str) -> Result<Profile, EngineError> {
        let enrolled = enroll_profile(
            &mut self.store,
            self.matcher.extractor_mut(),
            fields,
            photo,
            filename,
        )?;
        self.matcher
            .gallery_mut()
            .insert(enrolled.profile.name(), enrolled.embedding);
        tracing::info!(
            name = %enrolled.profile.name(),
            gallery_size = self.matcher.gallery().len(),
            "gallery updated"
        );
        Ok(enrolled.profile)
    }

    fn remove_profile(&mut self, name: &str) -> Result<bool, EngineError> {
        if !self.store.delete_profile(name)? {
            tracing::info!(name, "remove requested for unknown profile");
            return Ok(false);
        }
        sync_gallery_after_remove(&mut self.matcher, &self.store, name);
        tracing::info!(name, gallery_size = self.matcher.gallery().len(), "profile removed");
        Ok(true)
    }

    fn start_session(&mut self) -> Result<(), EngineError> {
        if self.session.is_some() {
            return Err(EngineError::AlreadyDetecting);
        }
        let source = self.opener.open().map_err(|e| {
            tracing::error!(device = %self.opener.describe(), error = %e, "camera open failed");
            self.last_error = Some(e.to_string());
            e
        })?;
        let session = DetectionSession::start(source, self.sink.clone(), self.cooldown)?;
        if self.matcher.gallery().is_empty() {
            tracing::warn!("detection started with an empty gallery, every face will be unknown");
        }
        self.session = Some(session);
        self.last_stats = SessionStats::default();
        self.last_error = None;
        Ok(())
    }

    /// Returns whether a session was running.
    fn stop_session(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                self.last_stats = session.stop();
                true
            }
            None => false,
        }
    }

    fn step(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Err(e) = session.step(&mut self.matcher) {
            tracing::error!(error = %e, "detection session failed, stopping");
            self.last_error = Some(e.to_string());
            self.stop_session();
        }
    }

    fn status(&self) -> EngineStatus {
        let (stats, window) = match &self.session {
            Some(session) => (session.stats(), session.window_size()),
            None => (self.last_stats, 0),
        };
        EngineStatus {
            version: env!("CARGO_PKG_VERSION"),
            gallery_size: self.matcher.gallery().len(),
            detecting: self.session.is_some(),
            camera: self.opener.describe(),
            frames_processed: stats.frames,
            frames_skipped: stats.skipped,
            faces_seen: stats.faces,
            alerts_raised: stats.alerts,
            sightings_in_window: window,
            last_error: self.last_error.clone(),
        }
    }
}

/// Bring the gallery in line with `store` after the oldest profile named
/// `name` was deleted.
///
/// The delete is already committed, so failures here are logged rather than
/// returned, and the name is dropped from the gallery entirely.
fn sync_gallery_after_remove<E, S>(matcher: &mut FaceGalleryMatcher<E>, store: &S, name: &str)
where
    E: EmbeddingExtractor,
    S: ProfileStore,
{
    let remaining = match store.list_profiles() {
        Ok(profiles) => profiles.iter().filter(|p| p.name() == name).count(),
        Err(e) => {
            tracing::warn!(name, error = %e, "gallery rebuild failed after remove");
            matcher.gallery_mut().remove_by_name(name);
            return;
        }
    };
    if remaining == 0 {
        matcher.gallery_mut().remove_by_name(name);
        return;
    }
    // Surviving duplicates keep their embeddings.
    if let Err(e) = matcher.load_gallery(store) {
        tracing::warn!(name, error = %e, "gallery rebuild failed after remove");
        matcher.gallery_mut().remove_by_name(name);
    }
}
