use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use image::DynamicImage;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio::time::{self, Instant, MissedTickBehavior};
use crate::{
    camera::{CameraProvider, CameraStream},
    common::{FaceAuthError, Result},
    core::{
        distance::{confidence_score, decide, euclidean_distance, Descriptor},
        events::{AuthResult, AuthStatus, SessionEvents},
        extractor::FeatureExtractor,
        thumbnail::encode_thumbnail,
        timing::{SessionSettings, SessionTiming},
    },
    storage::{Attempt, DescriptorStore, KeyValueBackend},
};

/// Read-only view for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub status: AuthStatus,
    pub camera_active: bool,
    pub models_loaded: bool,
    /// Progress indicator while detecting, then the last attempt's score.
    pub confidence: f32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: AuthStatus::Idle,
            camera_active: false,
            models_loaded: false,
            confidence: 0.0,
        }
    }
}

#[derive(Default)]
struct MismatchGuard {
    consecutive: u32,
    locked_until: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    state: SessionState,
    guard: MismatchGuard,
    /// Bumped on every status change.
    transitions: u64,
}

/// Enrollment/verification state machine.
///
/// One user action (start, reset, verify, enroll) runs at a time; a second
/// one fails with [`FaceAuthError::Busy`] instead of waiting. The passive
/// probe gives way to user actions: it skips its tick while one runs, and an
/// action arriving during a probe tick waits for that tick to finish.
pub struct AuthSession<C, X, B, E>
where
    C: CameraProvider,
    X: FeatureExtractor,
    B: KeyValueBackend,
    E: SessionEvents,
{
    camera: C,
    extractor: X,
    store: DescriptorStore<B>,
    events: E,
    settings: SessionSettings,
    timing: SessionTiming,
    camera_slot: AsyncMutex<Option<C::Stream>>,
    inner: Mutex<Inner>,
    pipeline_active: AtomicBool,
    closed: AtomicBool,
}

/// Clears the pipeline flag when the action ends or is cancelled.
struct ActiveFlag<'a>(&'a AtomicBool);

impl Drop for ActiveFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Exclusive access to the camera for the duration of one user action.
struct Pipeline<'a, S> {
    slot: AsyncMutexGuard<'a, Option<S>>,
    _active: ActiveFlag<'a>,
}

impl<S> Deref for Pipeline<'_, S> {
    type Target = Option<S>;

    fn deref(&self) -> &Option<S> {
        &self.slot
    }
}

impl<S> DerefMut for Pipeline<'_, S> {
    fn deref_mut(&mut self) -> &mut Option<S> {
        &mut self.slot
    }
}

impl<C, X, B, E> AuthSession<C, X, B, E>
where
    C: CameraProvider,
    X: FeatureExtractor,
    B: KeyValueBackend,
    E: SessionEvents,
{
    pub fn new(camera: C, extractor: X, store: DescriptorStore<B>, events: E) -> Self {
        Self {
            camera,
            extractor,
            store,
            events,
            settings: SessionSettings::default(),
            timing: SessionTiming::default(),
            camera_slot: AsyncMutex::new(None),
            inner: Mutex::new(Inner::default()),
            pipeline_active: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn state(&self) -> SessionState {
        self.with_inner(|inner| inner.state.clone())
    }

    pub fn store(&self) -> &DescriptorStore<B> {
        &self.store
    }

    pub fn timing(&self) -> &SessionTiming {
        &self.timing
    }

    /// Idle → Loading → Ready, acquiring the camera and loading models
    /// concurrently. On failure the session moves to `Error` and a result
    /// event carries the reason.
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.begin().await?;
        self.bring_up(&mut slot, false).await
    }

    /// Releases and re-acquires the camera, reloading models if they never
    /// loaded. This is the retry path after camera or model failures.
    pub async fn reset_camera(&self) -> Result<()> {
        let mut slot = self.begin().await?;
        tracing::info!("Resetting camera");
        self.bring_up(&mut slot, true).await
    }

    /// Captures a frame and compares it against the enrolled profile.
    pub async fn verify(&self) -> AuthResult {
        let mut slot = match self.begin().await {
            Ok(slot) => slot,
            Err(e) => return AuthResult::failure(&e),
        };

        if let Err(e) = self.check_lockout() {
            tracing::warn!("Verification rejected: {}", e);
            let result = self.fail(e);
            self.recover(slot).await;
            return result;
        }

        if let Err(e) = self.prepare(&mut slot, false).await {
            return self.fail(e);
        }

        self.set_status(AuthStatus::Detecting);
        self.ramp_progress().await;

        let (descriptor, frame) = match self.capture_descriptor(&mut slot).await {
            Ok(Some(capture)) => capture,
            Ok(None) => return self.no_face(),
            Err(e) => return self.fail(e),
        };

        let profile = match self.store.load_enrollment() {
            Ok(Some(profile)) => profile,
            Ok(None) => return self.fail(FaceAuthError::NotEnrolled),
            Err(e @ FaceAuthError::StoreCorrupt { .. }) => {
                tracing::warn!("{}; treating as not enrolled", e);
                return self.fail(FaceAuthError::NotEnrolled);
            }
            Err(e) => return self.fail(e),
        };

        let distance = match euclidean_distance(&profile.descriptor, &descriptor) {
            Ok(distance) => distance,
            Err(e) => {
                tracing::error!("Extractor/profile skew: {}", e);
                return self.fail(e);
            }
        };
        let decision = decide(distance, self.settings.distance_threshold);
        let confidence = confidence_score(distance, self.settings.confidence_scale);
        self.with_inner(|inner| inner.state.confidence = confidence);

        tracing::info!(
            "Verification: distance {:.3} (threshold {}) confidence {:.0}% {}",
            distance,
            self.settings.distance_threshold,
            confidence,
            if decision.is_match() { "✓" } else { "✗" }
        );

        let attempt = Attempt::new(decision.is_match(), distance, confidence, self.thumbnail(&frame));
        if let Err(e) = self.store.append_attempt(attempt) {
            tracing::error!("Failed to record attempt: {}", e);
        }

        if decision.is_match() {
            self.record_match();
            self.set_status(AuthStatus::Verified);
            let result = AuthResult::verified(distance);
            self.events.on_result(&result);
            return result;
        }

        self.record_mismatch();
        let result = self.fail(FaceAuthError::IdentityMismatch { distance });
        self.recover(slot).await;
        result
    }

    /// Captures a frame and makes it the enrolled identity, replacing any
    /// previous one.
    pub async fn enroll(&self) -> AuthResult {
        let mut slot = match self.begin().await {
            Ok(slot) => slot,
            Err(e) => return AuthResult::failure(&e),
        };

        if let Err(e) = self.prepare(&mut slot, false).await {
            return self.fail(e);
        }

        self.set_status(AuthStatus::Detecting);

        let (descriptor, frame) = match self.capture_descriptor(&mut slot).await {
            Ok(Some(capture)) => capture,
            Ok(None) => return self.no_face(),
            Err(e) => return self.fail(e),
        };

        let thumbnail = self.thumbnail(&frame);
        if let Err(e) = self.store.save_enrollment(&descriptor, thumbnail.as_deref()) {
            return self.fail(e);
        }
        if let Err(e) = self.store.append_attempt(Attempt::enrollment(thumbnail)) {
            tracing::error!("Failed to record enrollment attempt: {}", e);
        }

        self.with_inner(|inner| inner.state.confidence = 100.0);
        self.set_status(AuthStatus::Ready);
        let result = AuthResult::enrolled();
        self.events.on_result(&result);
        result
    }

    /// One detection-only pass toggling `Ready` and `Detected`. Returns the
    /// new status, or `None` when the probe did not run.
    pub async fn probe(&self) -> Option<AuthStatus> {
        if self.closed.load(Ordering::SeqCst) || self.pipeline_active.load(Ordering::SeqCst) {
            return None;
        }

        let mut slot = self.camera_slot.try_lock().ok()?;
        if !self.state().status.is_scanning() {
            return None;
        }
        let stream = slot.as_mut()?;

        let frame = match stream.capture_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Probe capture failed: {}", e);
                return None;
            }
        };

        let next = match self.extractor.detect(&frame).await {
            Ok(Some(_)) => AuthStatus::Detected,
            Ok(None) => AuthStatus::Ready,
            Err(e) => {
                tracing::debug!("Probe detection failed: {}", e);
                return None;
            }
        };

        // A user action queued behind this tick owns the status now
        if self.pipeline_active.load(Ordering::SeqCst) {
            return None;
        }

        self.set_status(next);
        Some(next)
    }

    /// Runs [`probe`](Self::probe) every `probe_interval` until shutdown.
    pub async fn run_probe(&self) {
        let mut interval = time::interval(self.timing.probe_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.closed.load(Ordering::SeqCst) {
            interval.tick().await;
            self.probe().await;
        }
        tracing::debug!("Probe loop stopped");
    }

    /// Stops the camera whatever the current state. Status is left as is.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut slot = self.camera_slot.lock().await;
        if let Some(stream) = slot.take() {
            self.camera.release(stream);
            tracing::info!("Camera released");
        }
        self.with_inner(|inner| inner.state.camera_active = false);
    }

    async fn begin(&self) -> Result<Pipeline<'_, C::Stream>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FaceAuthError::CameraUnavailable("session closed".into()));
        }
        if self
            .pipeline_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FaceAuthError::Busy);
        }
        let active = ActiveFlag(&self.pipeline_active);

        // At most one probe tick holds the camera here
        let slot = self.camera_slot.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(FaceAuthError::CameraUnavailable("session closed".into()));
        }

        Ok(Pipeline { slot, _active: active })
    }

    /// Releases the pipeline, waits out the recovery delay, then leaves
    /// `Error` for `Ready` unless another action moved the session on.
    async fn recover(&self, pipeline: Pipeline<'_, C::Stream>) {
        let seen = self.with_inner(|inner| inner.transitions);
        drop(pipeline);

        if !self.timing.mismatch_recovery.is_zero() {
            time::sleep(self.timing.mismatch_recovery).await;
        }

        let reverted = self.with_inner(|inner| {
            if inner.transitions != seen || inner.state.status != AuthStatus::Error {
                return false;
            }
            inner.state.status = AuthStatus::Ready;
            inner.transitions += 1;
            true
        });
        if reverted {
            tracing::debug!("Status -> {:?}", AuthStatus::Ready);
            self.events.on_status_change(AuthStatus::Ready);
        }
    }

    async fn bring_up(&self, slot: &mut Option<C::Stream>, reacquire: bool) -> Result<()> {
        match self.prepare(slot, reacquire).await {
            Ok(()) => {
                self.set_status(AuthStatus::Ready);
                Ok(())
            }
            Err(e) => {
                self.fail_with(&e);
                Err(e)
            }
        }
    }

    /// Makes sure models are loaded and the camera is streaming.
    async fn prepare(&self, slot: &mut Option<C::Stream>, reacquire: bool) -> Result<()> {
        if reacquire {
            if let Some(stream) = slot.take() {
                self.camera.release(stream);
                self.with_inner(|inner| inner.state.camera_active = false);
            }
        }

        let need_models = !self.state().models_loaded;
        let need_camera = slot.is_none();
        if !need_models && !need_camera {
            return Ok(());
        }

        self.set_status(AuthStatus::Loading);

        let (models, camera) = tokio::join!(
            async {
                if need_models {
                    self.load_models().await.map(|_| true)
                } else {
                    Ok(false)
                }
            },
            async {
                if need_camera {
                    self.acquire_camera().await.map(Some)
                } else {
                    Ok(None)
                }
            },
        );

        let camera_err = match camera {
            Ok(Some(stream)) => {
                *slot = Some(stream);
                self.with_inner(|inner| inner.state.camera_active = true);
                None
            }
            Ok(None) => None,
            Err(e) => Some(e),
        };
        let models_err = match models {
            Ok(loaded) => {
                if loaded {
                    self.with_inner(|inner| inner.state.models_loaded = true);
                }
                None
            }
            Err(e) => Some(e),
        };

        match camera_err.or(models_err) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn load_models(&self) -> Result<()> {
        match time::timeout(self.settings.load_timeout, self.extractor.load_models()).await {
            Ok(Ok(())) => {
                tracing::info!("Models loaded");
                Ok(())
            }
            Ok(Err(e @ FaceAuthError::ModelsUnavailable(_))) => Err(e),
            Ok(Err(e)) => Err(FaceAuthError::ModelsUnavailable(e.to_string())),
            Err(_) => Err(FaceAuthError::ModelsUnavailable(format!(
                "timed out after {:?}",
                self.settings.load_timeout
            ))),
        }
    }

    async fn acquire_camera(&self) -> Result<C::Stream> {
        let stream = match time::timeout(self.settings.acquire_timeout, self.camera.acquire()).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e @ FaceAuthError::CameraUnavailable(_))) => return Err(e),
            Ok(Err(e)) => return Err(FaceAuthError::CameraUnavailable(e.to_string())),
            Err(_) => {
                return Err(FaceAuthError::CameraUnavailable(format!(
                    "timed out after {:?}",
                    self.settings.acquire_timeout
                )))
            }
        };

        if !self.timing.warmup.is_zero() {
            tracing::debug!("Warming up camera for {:?}", self.timing.warmup);
            time::sleep(self.timing.warmup).await;
        }
        tracing::info!("Camera ready");
        Ok(stream)
    }

    async fn capture_descriptor(
        &self,
        slot: &mut Option<C::Stream>,
    ) -> Result<Option<(Descriptor, DynamicImage)>> {
        let stream = slot
            .as_mut()
            .ok_or_else(|| FaceAuthError::CameraUnavailable("camera not active".into()))?;

        let frame = stream.capture_frame().await?;
        let detection = self.extractor.detect_with_descriptor(&frame).await?;

        Ok(detection.map(|(face, descriptor)| {
            tracing::debug!(
                "Face {:.0}x{:.0} (confidence {:.3}), descriptor of {} values",
                face.width(),
                face.height(),
                face.confidence,
                descriptor.len()
            );
            (descriptor, frame)
        }))
    }

    // Cosmetic: the indicator carries no meaning for the decision
    async fn ramp_progress(&self) {
        let steps = self.timing.progress_steps.max(1);
        let tick = self.timing.progress_tick();
        self.with_inner(|inner| inner.state.confidence = 0.0);

        for step in 1..=steps {
            if !tick.is_zero() {
                time::sleep(tick).await;
            }
            let value = 100.0 * step as f32 / steps as f32;
            self.with_inner(|inner| inner.state.confidence = value);
        }
    }

    fn thumbnail(&self, frame: &DynamicImage) -> Option<Vec<u8>> {
        match encode_thumbnail(frame, self.settings.thumbnail_size) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("Could not encode thumbnail: {}", e);
                None
            }
        }
    }

    fn no_face(&self) -> AuthResult {
        tracing::info!("No face in frame");
        self.set_status(AuthStatus::Ready);
        let result = AuthResult::failure(&FaceAuthError::NoFaceDetected);
        self.events.on_result(&result);
        result
    }

    fn fail(&self, err: FaceAuthError) -> AuthResult {
        self.fail_with(&err)
    }

    fn fail_with(&self, err: &FaceAuthError) -> AuthResult {
        tracing::warn!("Attempt failed: {}", err);
        self.set_status(AuthStatus::Error);
        let result = AuthResult::failure(err);
        self.events.on_result(&result);
        result
    }

    fn check_lockout(&self) -> Result<()> {
        if self.settings.lockout_after == 0 {
            return Ok(());
        }

        self.with_inner(|inner| {
            let guard = &mut inner.guard;
            match guard.locked_until {
                Some(until) if Instant::now() < until => {
                    let remaining = until - Instant::now();
                    Err(FaceAuthError::LockedOut {
                        remaining_secs: remaining.as_secs().max(1),
                    })
                }
                Some(_) => {
                    guard.locked_until = None;
                    guard.consecutive = 0;
                    Ok(())
                }
                None => Ok(()),
            }
        })
    }

    fn record_match(&self) {
        self.with_inner(|inner| inner.guard.consecutive = 0);
    }

    fn record_mismatch(&self) {
        let limit = self.settings.lockout_after;
        let lockout = self.settings.lockout;
        self.with_inner(|inner| {
            let guard = &mut inner.guard;
            guard.consecutive += 1;
            if limit > 0 && guard.consecutive >= limit {
                tracing::warn!(
                    "{} consecutive mismatches, locking verification for {:?}",
                    guard.consecutive,
                    lockout
                );
                guard.locked_until = Some(Instant::now() + lockout);
            }
        });
    }

    fn set_status(&self, status: AuthStatus) {
        let changed = self.with_inner(|inner| {
            let changed = inner.state.status != status;
            inner.state.status = status;
            if changed {
                inner.transitions += 1;
            }
            changed
        });

        if changed {
            tracing::debug!("Status -> {:?}", status);
            self.events.on_status_change(status);
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        // A panic elsewhere must not wedge the session
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut inner)
    }
}

impl<C, X, B, E> Drop for AuthSession<C, X, B, E>
where
    C: CameraProvider,
    X: FeatureExtractor,
    B: KeyValueBackend,
    E: SessionEvents,
{
    fn drop(&mut self) {
        if let Some(stream) = self.camera_slot.get_mut().take() {
            self.camera.release(stream);
            tracing::debug!("Camera released on drop");
        }
    }
}
