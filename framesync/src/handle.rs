//! Lock-guarded session handle
//!
//! [`SharedSession`] lets several threads or tasks feed one session. Calls
//! are serialized by a per-session lock. Closing takes the session out of
//! the handle; every later call fails with `MediaError::InvalidState`.

use framesync_media::{
    AudioOutcome, DropStats, MediaError, MediaResult, MediaSink, MediaStreamSession,
    StreamTimeline, SyncReport, TimelinePhase, VideoOutcome,
};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Lifecycle state seen through a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session open, timeline in the given phase
    Open(TimelinePhase),
    /// Session closed
    Closed,
}

/// Cloneable, thread-safe handle to one session
pub struct SharedSession<S: MediaSink> {
    id: Uuid,
    inner: Arc<Mutex<Option<MediaStreamSession<S>>>>,
}

impl<S: MediaSink> Clone for SharedSession<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: MediaSink> std::fmt::Debug for SharedSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl<S: MediaSink> SharedSession<S> {
    /// Wrap an open session
    pub fn new(session: MediaStreamSession<S>) -> Self {
        Self {
            id: session.session_id(),
            inner: Arc::new(Mutex::new(Some(session))),
        }
    }

    /// Session identifier
    pub fn session_id(&self) -> Uuid {
        self.id
    }

    /// Run `f` against the open session
    pub fn with_session<T>(
        &self,
        f: impl FnOnce(&mut MediaStreamSession<S>) -> MediaResult<T>,
    ) -> MediaResult<T> {
        let mut guard = self.inner.lock();
        match guard.as_mut() {
            Some(session) => f(session),
            None => Err(closed_error(self.id)),
        }
    }

    /// See [`MediaStreamSession::write_video`]
    pub fn write_video(&self, data: &[u8], fragmented: bool) -> MediaResult<VideoOutcome> {
        self.with_session(|session| session.write_video(data, fragmented))
    }

    /// See [`MediaStreamSession::submit_fragment`]
    pub fn submit_fragment(&self, data: &[u8]) -> MediaResult<VideoOutcome> {
        self.with_session(|session| session.submit_fragment(data))
    }

    /// See [`MediaStreamSession::submit_unit`]
    pub fn submit_unit(&self, data: &[u8]) -> MediaResult<VideoOutcome> {
        self.with_session(|session| session.submit_unit(data))
    }

    /// See [`MediaStreamSession::write_audio`]
    pub fn write_audio(&self, data: &[u8]) -> MediaResult<AudioOutcome> {
        self.with_session(|session| session.write_audio(data))
    }

    /// Snapshot of the drop counters
    pub fn stats(&self) -> MediaResult<DropStats> {
        self.with_session(|session| Ok(session.stats().clone()))
    }

    /// Snapshot of the timeline
    pub fn timeline(&self) -> MediaResult<StreamTimeline> {
        self.with_session(|session| Ok(session.timeline().clone()))
    }

    /// Report of the session so far
    pub fn report(&self) -> MediaResult<SyncReport> {
        self.with_session(|session| Ok(session.report()))
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        match self.inner.lock().as_ref() {
            Some(session) => SessionState::Open(session.timeline().phase()),
            None => SessionState::Closed,
        }
    }

    /// Whether the session was closed
    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Close the session
    ///
    /// Only the first call closes; later calls return `InvalidState`.
    pub fn close(&self) -> MediaResult<SyncReport> {
        let session = self.inner.lock().take();
        match session {
            Some(session) => session.close(),
            None => Err(closed_error(self.id)),
        }
    }
}

impl<S: MediaSink + 'static> SharedSession<S> {
    /// Run `write_video` on the blocking pool
    pub async fn write_video_async(
        &self,
        data: impl Into<bytes::Bytes>,
        fragmented: bool,
    ) -> MediaResult<VideoOutcome> {
        let handle = self.clone();
        let data = data.into();
        run_blocking(move || handle.write_video(&data, fragmented)).await
    }

    /// Run `write_audio` on the blocking pool
    pub async fn write_audio_async(&self, data: impl Into<bytes::Bytes>) -> MediaResult<AudioOutcome> {
        let handle = self.clone();
        let data = data.into();
        run_blocking(move || handle.write_audio(&data)).await
    }

    /// Run `close` on the blocking pool
    pub async fn close_async(&self) -> MediaResult<SyncReport> {
        let handle = self.clone();
        run_blocking(move || handle.close()).await
    }
}

async fn run_blocking<T, F>(f: F) -> MediaResult<T>
where
    F: FnOnce() -> MediaResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MediaError::InvalidState {
            message: format!("blocking task failed: {}", e),
        })?
}

fn closed_error(id: Uuid) -> MediaError {
    MediaError::InvalidState {
        message: format!("session {} is closed", id),
    }
}
