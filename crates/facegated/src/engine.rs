use facegate_core::{
    CalibrationResult, Calibrator, CaptureOutcome, DescriptorExtractor, EngineParams,
    EnrollmentError, EnrollmentStore, FaceSample, RecognitionVerdict, Recognizer,
};
use facegate_vision::{FaceSource, Frame, ImageDirSource, SourceError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("enrollment: {0}")]
    Enrollment(#[from] EnrollmentError),
    #[error("source: {0}")]
    Source(#[from] SourceError),
    #[error("enrollment is closed once calibration has run")]
    EnrollmentClosed,
    #[error("recognition requested before calibration")]
    NotCalibrated,
    #[error("no descriptor could be extracted from the probe")]
    NoDescriptor,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of an enrollment operation.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollResult {
    pub label: String,
    pub identity_id: String,
    pub samples: usize,
    pub attempts: u32,
}

/// Snapshot of engine state for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub identities: Vec<String>,
    pub calibration: Option<CalibrationResult>,
    pub verifications: u64,
}

/// Enrollment store, calibration and decision engine, driven one request
/// at a time.
pub struct Engine {
    extractor: DescriptorExtractor,
    store: EnrollmentStore,
    calibrator: Calibrator,
    recognizer: Recognizer,
    calibration: Option<CalibrationResult>,
    preprocess: bool,
    verifications: u64,
}

impl Engine {
    pub fn new(params: &EngineParams, preprocess: bool) -> Self {
        Self {
            extractor: DescriptorExtractor::from_params(params),
            store: EnrollmentStore::new(params),
            calibrator: Calibrator::from_params(params),
            recognizer: Recognizer::from_params(params),
            calibration: None,
            preprocess,
            verifications: 0,
        }
    }

    fn sample(&self, frame: &Frame) -> FaceSample {
        if self.preprocess {
            frame.preprocess().to_sample()
        } else {
            frame.to_sample()
        }
    }

    /// Enroll `label` from `source`, one capture attempt per frame, until
    /// the quota is met. Running out of frames or attempts abandons the
    /// identity and reports it incomplete.
    pub fn enroll(&mut self, label: &str, source: &mut impl FaceSource) -> Result<EnrollResult, EngineError> {
        if self.calibration.is_some() {
            return Err(EngineError::EnrollmentClosed);
        }
        self.store.begin(label)?;
        let mut attempts = 0u32;

        loop {
            let vector = match source.next_face() {
                Ok(Some(frame)) if frame.is_dark => {
                    tracing::debug!(label, sequence = frame.sequence, "enroll: dark frame rejected");
                    None
                }
                Ok(Some(frame)) => self.extractor.extract(&self.sample(&frame)),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(label, error = %e, "enroll: unreadable capture");
                    None
                }
            };

            match self.store.submit(vector) {
                Ok(CaptureOutcome::Completed(identity)) => {
                    attempts += 1;
                    return Ok(EnrollResult {
                        label: identity.label().to_string(),
                        identity_id: identity.id().to_string(),
                        samples: identity.samples().len(),
                        attempts,
                    });
                }
                Ok(CaptureOutcome::Accepted { .. }) | Ok(CaptureOutcome::Rejected(_)) => attempts += 1,
                Err(e) => {
                    self.store.abandon();
                    return Err(e.into());
                }
            }
        }

        let (accepted, _) = self.store.pending_progress().unwrap_or((0, attempts));
        self.store.abandon();
        Err(EnrollmentError::Incomplete {
            label: label.to_string(),
            accepted,
            target: self.store.faces_per_user(),
            attempts,
        }
        .into())
    }

    /// Enroll from a directory of face crops.
    pub fn enroll_dir(&mut self, label: &str, dir: &Path) -> Result<EnrollResult, EngineError> {
        let mut source = ImageDirSource::open(dir)?;
        self.enroll(label, &mut source)
    }

    /// Fix thresholds. Runs once; later calls return the first result.
    pub fn calibrate(&mut self) -> CalibrationResult {
        if let Some(existing) = self.calibration {
            tracing::warn!("calibration already done; keeping existing thresholds");
            return existing;
        }
        let result = self.calibrator.calibrate(self.store.identities(), self.recognizer.scorer());
        self.calibration = Some(result);
        result
    }

    /// Match one probe frame against every enrolled identity.
    pub fn verify(&mut self, frame: &Frame) -> Result<RecognitionVerdict, EngineError> {
        let calibration = self.calibration.ok_or(EngineError::NotCalibrated)?;
        let probe = self
            .extractor
            .extract(&self.sample(frame))
            .ok_or(EngineError::NoDescriptor)?;
        self.verifications += 1;
        Ok(self.recognizer.decide(&probe, self.store.identities(), &calibration))
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            identities: self.store.identities().iter().map(|i| i.label().to_string()).collect(),
            calibration: self.calibration,
            verifications: self.verifications,
        }
    }
}

/// Messages sent to the engine thread.
enum EngineRequest {
    Enroll {
        label: String,
        dir: PathBuf,
        reply: oneshot::Sender<Result<EnrollResult, EngineError>>,
    },
    Calibrate {
        reply: oneshot::Sender<CalibrationResult>,
    },
    Verify {
        frame: Frame,
        reply: oneshot::Sender<Result<RecognitionVerdict, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Enroll a user from a directory of face crops.
    pub async fn enroll(&self, label: &str, dir: &Path) -> Result<EnrollResult, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Enroll {
            label: label.to_string(),
            dir: dir.to_path_buf(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn calibrate(&self) -> Result<CalibrationResult, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Calibrate { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn verify(&self, frame: Frame) -> Result<RecognitionVerdict, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Verify { frame, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Status { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    async fn send(&self, request: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(request).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread. Requests are served strictly
/// one at a time.
pub fn spawn_engine(params: EngineParams, preprocess: bool) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let mut engine = Engine::new(&params, preprocess);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll { label, dir, reply } => {
                        let _ = reply.send(engine.enroll_dir(&label, &dir));
                    }
                    EngineRequest::Calibrate { reply } => {
                        let _ = reply.send(engine.calibrate());
                    }
                    EngineRequest::Verify { frame, reply } => {
                        let _ = reply.send(engine.verify(&frame));
                    }
                    EngineRequest::Status { reply } => {
                        let _ = reply.send(engine.status());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
