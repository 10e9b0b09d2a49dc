use anyhow::{Context, Result};
use facegate_core::descriptor::MIN_SAMPLE_DIM;
use facegate_vision::{enrollment_dirs, FaceSource, Frame, ProbeWatcher};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

mod actuator;
mod config;
mod dbus_interface;
mod engine;
mod indicator;

use actuator::UnlockSink;
use dbus_interface::{GateService, SharedState};
use engine::{EngineError, EngineHandle};
use indicator::{Cooldown, Indicator, IndicatorEvent};

/// What happened to one probe frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeOutcome {
    Dark,
    CoolingDown,
    TooSmall,
    NoDescriptor,
    Decided(facegate_core::Decision),
    Failed,
}

/// Recognition loop state around the engine: LED, display, cooldown and
/// the unlock actuator.
struct Gate {
    engine: EngineHandle,
    indicator: Indicator,
    cooldown: Cooldown,
    unlock: UnlockSink,
    shared: Arc<Mutex<SharedState>>,
}

impl Gate {
    fn publish(&self, events: &[IndicatorEvent]) {
        if events.is_empty() {
            return;
        }
        if let Ok(mut shared) = self.shared.lock() {
            shared.led = self.indicator.led();
            shared.display_active = self.indicator.display_active();
        }
    }

    fn tick(&mut self, now: Instant) {
        let events = self.indicator.tick(now);
        self.publish(&events);
    }

    async fn handle_probe(&mut self, frame: Frame, now: Instant) -> ProbeOutcome {
        if frame.is_dark {
            tracing::debug!(sequence = frame.sequence, "dark probe ignored");
            return ProbeOutcome::Dark;
        }
        if let Some(event) = self.indicator.on_face(now) {
            self.publish(&[event]);
        }
        if !self.cooldown.ready(now) {
            tracing::debug!(sequence = frame.sequence, "probe dropped during cooldown");
            return ProbeOutcome::CoolingDown;
        }
        if frame.width < MIN_SAMPLE_DIM || frame.height < MIN_SAMPLE_DIM {
            tracing::warn!(width = frame.width, height = frame.height, "face too small");
            return ProbeOutcome::TooSmall;
        }

        let verdict = match self.engine.verify(frame).await {
            Ok(v) => v,
            Err(EngineError::NoDescriptor) => {
                tracing::warn!("feature extraction failed");
                return ProbeOutcome::NoDescriptor;
            }
            Err(e) => {
                tracing::error!(error = %e, "verification failed");
                return ProbeOutcome::Failed;
            }
        };

        let event = self.indicator.on_verdict(verdict.decision, now);
        self.cooldown.mark(now);
        if verdict.decision.grants_access() {
            if let Some(label) = &verdict.label {
                self.unlock.unlock(label);
            }
        }
        let decision = verdict.decision;
        if let Ok(mut shared) = self.shared.lock() {
            shared.last_verdict = Some(verdict);
        }
        self.publish(&[event]);
        ProbeOutcome::Decided(decision)
    }

    /// Handle every queued probe. Stops at the first directory-level
    /// failure so the next tick can retry.
    async fn drain(&mut self, source: &mut impl FaceSource) -> usize {
        let mut handled = 0;
        loop {
            match source.next_face() {
                Ok(Some(frame)) => {
                    self.handle_probe(frame, Instant::now()).await;
                    handled += 1;
                }
                Ok(None) => break,
                Err(e) if e.is_scan() => {
                    tracing::warn!(error = %e, "probe directory unavailable");
                    break;
                }
                Err(e) => tracing::warn!(error = %e, "unreadable probe skipped"),
            }
        }
        handled
    }
}

async fn enroll_all(engine: &EngineHandle, root: &std::path::Path, indicator: &mut Indicator) -> usize {
    let dirs = match enrollment_dirs(root) {
        Ok(dirs) => dirs,
        Err(e) => {
            tracing::error!(error = %e, "cannot list enrollment directory");
            return 0;
        }
    };
    let mut enrolled = 0;
    for (label, dir) in dirs {
        match engine.enroll(&label, &dir).await {
            Ok(result) => {
                tracing::info!(
                    label = %result.label,
                    id = %result.identity_id,
                    samples = result.samples,
                    attempts = result.attempts,
                    "user enrolled"
                );
                indicator.on_enrolled(Instant::now());
                enrolled += 1;
            }
            Err(e) => tracing::warn!(label = %label, error = %e, "enrollment failed; user skipped"),
        }
    }
    enrolled
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = config::Config::from_env();
    let params = config.engine_params().context("loading engine parameters")?;
    tracing::info!(
        enroll_dir = %config.enroll_dir.display(),
        probe_dir = %config.probe_dir.display(),
        faces_per_user = params.faces_per_user,
        preprocess = config.preprocess,
        "configuration loaded"
    );

    std::fs::create_dir_all(&config.enroll_dir)
        .with_context(|| format!("creating {}", config.enroll_dir.display()))?;
    std::fs::create_dir_all(&config.probe_dir)
        .with_context(|| format!("creating {}", config.probe_dir.display()))?;

    let engine = engine::spawn_engine(params, config.preprocess)?;
    let mut indicator = Indicator::new(config.led_timeout(), config.display_timeout(), Instant::now());

    let enrolled = enroll_all(&engine, &config.enroll_dir, &mut indicator).await;
    if enrolled == 0 {
        tracing::warn!("no users enrolled; every probe will be denied");
    }
    engine.calibrate().await?;

    let shared = Arc::new(Mutex::new(SharedState::default()));

    // Held for the lifetime of the daemon.
    let _connection = if config.dbus_enabled {
        let service = GateService::new(engine.clone(), shared.clone());
        match dbus_interface::serve(service, config.session_bus).await {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::warn!(error = %e, "d-bus unavailable; continuing without it");
                None
            }
        }
    } else {
        None
    };

    let mut watcher = ProbeWatcher::new(&config.probe_dir);
    let skipped = watcher.skip_existing()?;
    let mut gate = Gate {
        engine,
        indicator,
        cooldown: Cooldown::new(config.recognition_cooldown()),
        unlock: UnlockSink::new(config.unlock_path.clone()),
        shared,
    };

    tracing::info!(skipped, "facegated ready");

    let mut interval = tokio::time::interval(config.poll_interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            _ = interval.tick() => {
                gate.tick(Instant::now());
                gate.drain(&mut watcher).await;
            }
        }
    }

    tracing::info!("facegated shutting down");
    Ok(())
}
