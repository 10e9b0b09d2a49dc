use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::{
    CaptureOutcome, Calibrator, DescriptorExtractor, EngineParams, EnrollmentStore, FeatureVector,
    RecognitionVerdict, Recognizer,
};
use facegate_vision::{load_frame, FaceSource, Frame, ImageDirSource};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facegate", about = "facegate face gate CLI")]
struct Cli {
    /// Use crops as-is, without equalization and smoothing
    #[arg(long, global = true)]
    raw: bool,

    /// TOML file with engine parameters
    #[arg(long, global = true)]
    params: Option<PathBuf>,

    /// Reach the daemon on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the descriptor of a face crop
    Extract {
        image: PathBuf,
    },
    /// Score two face crops against each other
    Compare {
        a: PathBuf,
        b: PathBuf,
    },
    /// Enroll users, calibrate and decide each probe, all in-process
    Run {
        /// User to enroll, as LABEL=DIR (repeatable)
        #[arg(long = "enroll", value_parser = parse_enrollment, required = true)]
        enroll: Vec<(String, PathBuf)>,
        /// Probe face crops
        probes: Vec<PathBuf>,
    },
    /// Show daemon status
    Status,
    /// Ask the daemon to match a face crop
    Verify {
        image: PathBuf,
    },
}

#[zbus::proxy(
    interface = "org.facegate.Gate1",
    default_service = "org.facegate.Gate1",
    default_path = "/org/facegate/Gate1"
)]
trait Gate {
    fn status(&self) -> zbus::Result<String>;
    fn last_verdict(&self) -> zbus::Result<String>;
    fn verify(&self, path: &str) -> zbus::Result<String>;
}

async fn connect(session: bool) -> zbus::Result<zbus::Connection> {
    if session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
}

fn parse_enrollment(arg: &str) -> Result<(String, PathBuf), String> {
    let (label, dir) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected LABEL=DIR, got {arg:?}"))?;
    if label.is_empty() || dir.is_empty() {
        return Err(format!("expected LABEL=DIR, got {arg:?}"));
    }
    Ok((label.to_string(), PathBuf::from(dir)))
}

fn descriptor(frame: &Frame, extractor: &DescriptorExtractor, raw: bool) -> Result<FeatureVector> {
    let sample = if raw {
        frame.to_sample()
    } else {
        frame.preprocess().to_sample()
    };
    extractor
        .try_extract(&sample)
        .map_err(|e| anyhow!("no descriptor: {e}"))
}

fn load_descriptor(path: &Path, extractor: &DescriptorExtractor, raw: bool) -> Result<FeatureVector> {
    let frame = load_frame(path, 0)?;
    descriptor(&frame, extractor, raw).with_context(|| path.display().to_string())
}

/// Enroll every `(label, dir)` pair, calibrate, then decide each probe.
fn run(
    params: &EngineParams,
    enroll: &[(String, PathBuf)],
    probes: &[PathBuf],
    raw: bool,
) -> Result<Vec<(PathBuf, RecognitionVerdict)>> {
    let extractor = DescriptorExtractor::from_params(params);
    let mut store = EnrollmentStore::new(params);

    for (label, dir) in enroll {
        let mut source = ImageDirSource::open(dir)?;
        store.begin(label)?;
        let mut completed = false;
        loop {
            let vector = match source.next_face() {
                Ok(Some(frame)) if frame.is_dark => {
                    tracing::debug!(label = %label, sequence = frame.sequence, "dark capture rejected");
                    None
                }
                Ok(Some(frame)) => match descriptor(&frame, &extractor, raw) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        tracing::debug!(label = %label, sequence = frame.sequence, error = %e, "capture rejected");
                        None
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(label = %label, error = %e, "unreadable capture");
                    None
                }
            };
            if let CaptureOutcome::Completed(identity) = store.submit(vector)? {
                tracing::info!(label = identity.label(), id = identity.id(), "identity enrolled");
                println!("enrolled {} ({} samples)", identity.label(), identity.samples().len());
                completed = true;
                break;
            }
        }
        if !completed {
            let (accepted, attempts) = store.pending_progress().unwrap_or_default();
            store.abandon();
            bail!(
                "{label}: only {accepted}/{} usable samples in {} after {attempts} attempts",
                store.faces_per_user(),
                dir.display()
            );
        }
    }

    let recognizer = Recognizer::from_params(params);
    let calibration = Calibrator::from_params(params).calibrate(store.identities(), recognizer.scorer());

    let mut verdicts = Vec::with_capacity(probes.len());
    for path in probes {
        let probe = load_descriptor(path, &extractor, raw)?;
        let verdict = recognizer.decide(&probe, store.identities(), &calibration);
        for candidate in &verdict.candidates {
            tracing::debug!(
                probe = %path.display(),
                label = %candidate.label,
                average = candidate.average,
                max = candidate.max,
                "candidate score"
            );
        }
        verdicts.push((path.clone(), verdict));
    }
    Ok(verdicts)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let params = match &cli.params {
        Some(path) => EngineParams::load(path)?,
        None => EngineParams::default(),
    };
    let extractor = DescriptorExtractor::from_params(&params);

    match cli.command {
        Commands::Extract { image } => {
            let vector = load_descriptor(&image, &extractor, cli.raw)?;
            println!("{}", serde_json::to_string(&vector.values)?);
        }
        Commands::Compare { a, b } => {
            let a = load_descriptor(&a, &extractor, cli.raw)?;
            let b = load_descriptor(&b, &extractor, cli.raw)?;
            println!("{:.4}", facegate_core::score(&a, &b));
        }
        Commands::Run { enroll, probes } => {
            for (path, verdict) in run(&params, &enroll, &probes, cli.raw)? {
                println!(
                    "{}: {:?} {} score={:.4} consistency={:.2}",
                    path.display(),
                    verdict.decision,
                    verdict.label.as_deref().unwrap_or("-"),
                    verdict.score,
                    verdict.consistency
                );
            }
        }
        Commands::Status => {
            let connection = connect(cli.session).await?;
            let proxy = GateProxy::new(&connection).await?;
            println!("{}", proxy.status().await?);
            println!("last verdict: {}", proxy.last_verdict().await?);
        }
        Commands::Verify { image } => {
            let path = std::fs::canonicalize(&image)
                .with_context(|| format!("resolving {}", image.display()))?;
            let connection = connect(cli.session).await?;
            let proxy = GateProxy::new(&connection).await?;
            println!("{}", proxy.verify(&path.to_string_lossy()).await?);
        }
    }

    Ok(())
}
