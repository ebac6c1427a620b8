#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use facegate::camera::{CameraProvider, CameraStream};
use facegate::core::{
    AuthResult, AuthSession, AuthStatus, Descriptor, FaceBox, FeatureExtractor, SessionEvents,
    SessionTiming,
};
use facegate::storage::{DescriptorStore, MemoryBackend};
use facegate::{FaceAuthError, Result};
use image::DynamicImage;
use tokio::sync::Notify;

pub type TestSession = AuthSession<StubCamera, ScriptedExtractor, MemoryBackend, Arc<Recorder>>;

pub fn session(camera: &StubCamera, extractor: &ScriptedExtractor, events: &Arc<Recorder>) -> TestSession {
    AuthSession::new(
        camera.clone(),
        extractor.clone(),
        DescriptorStore::new(MemoryBackend::new()),
        events.clone(),
    )
    .with_timing(SessionTiming::immediate())
}

#[derive(Default)]
pub struct CameraState {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub fail: AtomicBool,
    pub hang: AtomicBool,
}

#[derive(Clone, Default)]
pub struct StubCamera(pub Arc<CameraState>);

impl StubCamera {
    pub fn failing() -> Self {
        let camera = Self::default();
        camera.set_fail(true);
        camera
    }

    pub fn set_fail(&self, fail: bool) {
        self.0.fail.store(fail, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> usize {
        self.0.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.0.released.load(Ordering::SeqCst)
    }
}

pub struct StubStream;

#[async_trait]
impl CameraProvider for StubCamera {
    type Stream = StubStream;

    async fn acquire(&self) -> Result<StubStream> {
        if self.0.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.0.fail.load(Ordering::SeqCst) {
            return Err(FaceAuthError::CameraUnavailable("permission denied".into()));
        }
        self.0.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(StubStream)
    }

    fn release(&self, _stream: StubStream) {
        self.0.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CameraStream for StubStream {
    async fn capture_frame(&mut self) -> Result<DynamicImage> {
        Ok(DynamicImage::new_luma8(64, 48))
    }
}

pub enum Scripted {
    Face(Vec<f32>),
    NoFace,
    Fail,
}

#[derive(Default)]
pub struct ExtractorState {
    pub script: Mutex<VecDeque<Scripted>>,
    pub probe_script: Mutex<VecDeque<bool>>,
    pub fail_load: AtomicBool,
    pub loads: AtomicUsize,
    pub extractions: AtomicUsize,
    pub probes: AtomicUsize,
    pub gate: Mutex<Option<Arc<Notify>>>,
    pub detect_gate: Mutex<Option<Arc<Notify>>>,
}

/// Answers `detect_with_descriptor` from a queue; an empty queue means no face.
#[derive(Clone, Default)]
pub struct ScriptedExtractor(pub Arc<ExtractorState>);

impl ScriptedExtractor {
    pub fn push(&self, step: Scripted) -> &Self {
        self.0.script.lock().unwrap().push_back(step);
        self
    }

    pub fn face(&self, descriptor: &[f32]) -> &Self {
        self.push(Scripted::Face(descriptor.to_vec()))
    }

    pub fn probe_sees(&self, face: bool) -> &Self {
        self.0.probe_script.lock().unwrap().push_back(face);
        self
    }

    pub fn set_fail_load(&self, fail: bool) {
        self.0.fail_load.store(fail, Ordering::SeqCst);
    }

    /// Makes the next extraction wait until the returned handle is notified.
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.0.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    /// Same as [`gate`](Self::gate) for the next detection-only pass.
    pub fn gate_detect(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.0.detect_gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn remaining(&self) -> usize {
        self.0.script.lock().unwrap().len()
    }

    pub fn extractions(&self) -> usize {
        self.0.extractions.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.0.probes.load(Ordering::SeqCst)
    }
}

fn face_box() -> FaceBox {
    FaceBox { x1: 8.0, y1: 6.0, x2: 40.0, y2: 42.0, confidence: 0.97 }
}

#[async_trait]
impl FeatureExtractor for ScriptedExtractor {
    async fn load_models(&self) -> Result<()> {
        self.0.loads.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_load.load(Ordering::SeqCst) {
            return Err(FaceAuthError::ModelsUnavailable("weights missing".into()));
        }
        Ok(())
    }

    async fn detect(&self, _frame: &DynamicImage) -> Result<Option<FaceBox>> {
        let gate = self.0.detect_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.0.probes.fetch_add(1, Ordering::SeqCst);
        let seen = self.0.probe_script.lock().unwrap().pop_front().unwrap_or(false);
        Ok(seen.then(face_box))
    }

    async fn detect_with_descriptor(
        &self,
        _frame: &DynamicImage,
    ) -> Result<Option<(FaceBox, Descriptor)>> {
        let gate = self.0.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.0.extractions.fetch_add(1, Ordering::SeqCst);
        let step = self.0.script.lock().unwrap().pop_front();
        match step {
            Some(Scripted::Face(descriptor)) => Ok(Some((face_box(), descriptor))),
            Some(Scripted::NoFace) | None => Ok(None),
            Some(Scripted::Fail) => Err(FaceAuthError::Other(anyhow::anyhow!("inference failed"))),
        }
    }
}

#[derive(Default)]
pub struct Recorder {
    statuses: Mutex<Vec<AuthStatus>>,
    results: Mutex<Vec<AuthResult>>,
}

impl Recorder {
    pub fn statuses(&self) -> Vec<AuthStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn results(&self) -> Vec<AuthResult> {
        self.results.lock().unwrap().clone()
    }

    pub fn last_result(&self) -> Option<AuthResult> {
        self.results.lock().unwrap().last().cloned()
    }
}

impl SessionEvents for Recorder {
    fn on_status_change(&self, status: AuthStatus) {
        self.statuses.lock().unwrap().push(status);
    }

    fn on_result(&self, result: &AuthResult) {
        self.results.lock().unwrap().push(result.clone());
    }
}
