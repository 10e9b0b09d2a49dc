use crate::engine::EngineHandle;
use crate::indicator::LedStatus;
use facegate_core::RecognitionVerdict;
use std::path::Path;
use std::sync::{Arc, Mutex};
use zbus::interface;

pub const BUS_NAME: &str = "org.facegate.Gate1";
pub const OBJECT_PATH: &str = "/org/facegate/Gate1";

/// State the recognition loop publishes for bus clients.
#[derive(Debug)]
pub struct SharedState {
    pub last_verdict: Option<RecognitionVerdict>,
    pub led: LedStatus,
    pub display_active: bool,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            last_verdict: None,
            led: LedStatus::Off,
            display_active: true,
        }
    }
}

/// D-Bus interface for the face gate daemon.
///
/// Bus name: org.facegate.Gate1
/// Object path: /org/facegate/Gate1
pub struct GateService {
    engine: EngineHandle,
    shared: Arc<Mutex<SharedState>>,
}

impl GateService {
    pub fn new(engine: EngineHandle, shared: Arc<Mutex<SharedState>>) -> Self {
        Self { engine, shared }
    }
}

fn failed(e: impl std::fmt::Display) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

#[interface(name = "org.facegate.Gate1")]
impl GateService {
    /// Daemon status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let engine = self.engine.status().await.map_err(failed)?;
        let (led, display_active) = {
            let shared = self.shared.lock().map_err(failed)?;
            (shared.led, shared.display_active)
        };
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "identities": engine.identities,
            "calibration": engine.calibration,
            "verifications": engine.verifications,
            "led": led,
            "display_active": display_active,
        })
        .to_string())
    }

    /// Most recent verdict from the probe loop, or `null`.
    async fn last_verdict(&self) -> zbus::fdo::Result<String> {
        let shared = self.shared.lock().map_err(failed)?;
        serde_json::to_string(&shared.last_verdict).map_err(failed)
    }

    /// Match a face crop on disk. Does not drive the LED or the lock.
    async fn verify(&self, path: &str) -> zbus::fdo::Result<String> {
        tracing::info!(path, "verify requested");
        let frame = facegate_vision::load_frame(Path::new(path), 0)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?;
        let verdict = self.engine.verify(frame).await.map_err(failed)?;
        serde_json::to_string(&verdict).map_err(failed)
    }
}

/// Register the service and keep the connection alive for as long as the
/// returned handle lives.
pub async fn serve(service: GateService, session_bus: bool) -> zbus::Result<zbus::Connection> {
    let builder = if session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;
    tracing::info!(name = BUS_NAME, path = OBJECT_PATH, session_bus, "d-bus interface registered");
    Ok(connection)
}
