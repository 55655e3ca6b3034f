//! Generation pipeline: parse → resolve → place → assemble → write.
//!
//! A run owns its airport and procedure snapshot and shares only the frozen
//! configuration. Outputs are written to temporary files and renamed into
//! place, so a failed or cancelled run never leaves a partial scenario.

use crate::airport::{normalize_runway, Airport};
use crate::artcc::{self, ArtccBoundary, BOUNDARIES_FILE, DEFAULT_ARTCC};
use crate::assembler::{self, ScenarioMetadata};
use crate::cifp;
use crate::config::GeneratorConfig;
use crate::error::{GenerationError, Result, Warning};
use crate::geojson;
use crate::models::{GeneratedAircraft, Scenario};
use crate::spatial::GeoPoint;
use crate::procedures::ProcedureSet;
use crate::scenario::{ScenarioBuilder, ScenarioRequest};
use crate::sources::{self, ElevationSource, FlightPlanSource, LocalElevationSource};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loading,
    Placing,
    Assembling,
    Writing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loading => "loading",
            Stage::Placing => "placing",
            Stage::Assembling => "assembling",
            Stage::Writing => "writing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// One-way progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub stage: Stage,
    pub percent: u8,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Json,
    Air,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Air => "air",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "air" => Ok(OutputFormat::Air),
            other => Err(GenerationError::InvalidRequest(format!("unknown output format '{other}'"))),
        }
    }
}

/// Cancellation flag shared with the front end. Honoured up to the write step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub airport: String,
    /// Directory holding `{ICAO}.geojson`, `{ICAO}_CIFP` and optionally
    /// `artcc_boundaries.geojson`.
    pub data_dir: PathBuf,
    pub request: ScenarioRequest,
    /// Detected from the boundary file when absent.
    pub artcc_id: Option<String>,
    pub scenario_name: Option<String>,
    pub output_dir: PathBuf,
    /// File stem; `{short}_{DDHHMM}` when absent.
    pub output_name: Option<String>,
    pub formats: Vec<OutputFormat>,
}

impl GenerationJob {
    pub fn new(airport: impl Into<String>, data_dir: impl Into<PathBuf>, request: ScenarioRequest) -> Self {
        Self {
            airport: airport.into().trim().to_ascii_uppercase(),
            data_dir: data_dir.into(),
            request,
            artcc_id: None,
            scenario_name: None,
            output_dir: PathBuf::from("."),
            output_name: None,
            formats: vec![OutputFormat::Json],
        }
    }
}

#[derive(Debug)]
pub struct GenerationReport {
    pub scenario: Scenario,
    pub aircraft: Vec<GeneratedAircraft>,
    pub warnings: Vec<Warning>,
    pub written: Vec<PathBuf>,
    pub artcc_id: String,
    pub field_elevation_ft: i32,
    pub fallbacks: usize,
}

pub struct Pipeline {
    config: Arc<GeneratorConfig>,
    flight_plans: Option<Arc<dyn FlightPlanSource>>,
    elevation: Option<Arc<dyn ElevationSource>>,
    progress: Option<UnboundedSender<Progress>>,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(config: Arc<GeneratorConfig>) -> Self {
        Self {
            config,
            flight_plans: None,
            elevation: None,
            progress: None,
            cancel: CancelToken::default(),
        }
    }

    pub fn with_flight_plans(mut self, source: Option<Arc<dyn FlightPlanSource>>) -> Self {
        self.flight_plans = source;
        self
    }

    pub fn with_elevation(mut self, source: Option<Arc<dyn ElevationSource>>) -> Self {
        self.elevation = source;
        self
    }

    pub fn with_progress(mut self, tx: UnboundedSender<Progress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn report(&self, stage: Stage, percent: u8, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("[{stage} {percent}%] {message}");
        if let Some(tx) = &self.progress {
            // receiver gone means nobody is watching, keep going
            let _ = tx.send(Progress { stage, percent, message });
        }
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            tracing::info!("generation cancelled before writing");
            return Err(GenerationError::Cancelled);
        }
        Ok(())
    }

    pub fn run(&self, job: &GenerationJob) -> Result<GenerationReport> {
        let mut warnings = Vec::new();
        let icao = job.airport.as_str();

        self.report(Stage::Loading, 5, format!("reading {icao} airport data"));
        let airport = self.load_airport(job, &mut warnings)?;
        let procedures = self.load_procedures(job, &mut warnings)?;

        let local = LocalElevationSource::new(self.config.field_elevations.clone())
            .with(icao, procedures.field_elevation_ft);
        let reference = airport.reference_point().or(procedures.reference_point);
        let field_elevation_ft = sources::field_elevation(self.elevation.as_deref(), &local, icao, reference);
        tracing::info!("{icao} field elevation {field_elevation_ft} ft");
        let (artcc_id, boundary) = resolve_artcc(job, reference, &mut warnings);
        tracing::info!("{icao} is in {artcc_id}");
        self.checkpoint()?;

        self.report(Stage::Placing, 30, format!("placing {} aircraft", job.request.kind));
        let built = ScenarioBuilder::new(&airport, &procedures, &self.config, f64::from(field_elevation_ft))
            .with_flight_plans(self.flight_plans.clone())
            .with_artcc_boundary(boundary)
            .build(&job.request)?;
        warnings.extend(built.warnings);
        if built.fallbacks > 0 && self.flight_plans.is_some() {
            warnings.push(Warning::new(
                "flight plans",
                format!("{} flight plans synthesized locally", built.fallbacks),
            ));
        }
        self.checkpoint()?;

        self.report(Stage::Assembling, 70, "assembling scenario");
        let metadata = ScenarioMetadata::new(artcc_id.clone(), icao).with_name(job.scenario_name.clone());
        let scenario = assembler::assemble(&metadata, &built.aircraft)?;
        let mut outputs = Vec::new();
        for format in &job.formats {
            let body = match format {
                OutputFormat::Json => scenario.to_json()?,
                OutputFormat::Air => assembler::render_air(&metadata, &built.aircraft)?,
            };
            outputs.push((*format, body));
        }
        self.checkpoint()?;

        self.report(Stage::Writing, 90, "writing output");
        let stem = job
            .output_name
            .clone()
            .unwrap_or_else(|| assembler::output_stem(icao, &chrono::Local::now()));
        let written = write_outputs(&job.output_dir, &stem, &outputs)?;

        for warning in &warnings {
            tracing::warn!("{warning}");
        }
        self.report(Stage::Done, 100, format!("{} aircraft written", built.aircraft.len()));
        Ok(GenerationReport {
            scenario,
            aircraft: built.aircraft,
            warnings,
            written,
            artcc_id,
            field_elevation_ft,
            fallbacks: built.fallbacks,
        })
    }

    fn load_airport(&self, job: &GenerationJob, warnings: &mut Vec<Warning>) -> Result<Airport> {
        let path = geojson_path(&job.data_dir, &job.airport);
        let parsed = geojson::load_airport(&path, &job.airport)?;
        warnings.extend(parsed.warnings);
        tracing::info!(
            "{}: {} parking spots, {} runways",
            job.airport,
            parsed.value.parking.len(),
            parsed.value.runways.len()
        );
        Ok(parsed.value)
    }

    fn load_procedures(&self, job: &GenerationJob, warnings: &mut Vec<Warning>) -> Result<ProcedureSet> {
        let Some(path) = cifp_path(&job.data_dir, &job.airport) else {
            warnings.push(Warning::new(
                job.data_dir.display().to_string(),
                format!("no procedure file for {}, continuing without fixes or procedures", job.airport),
            ));
            return Ok(ProcedureSet::empty(job.airport.clone()));
        };
        let runways: Vec<String> = job.request.active_runways.iter().map(|r| normalize_runway(r)).collect();
        let parsed = cifp::load_procedures(&path, &job.airport, &runways)?;
        warnings.extend(parsed.warnings);
        Ok(parsed.value)
    }
}

/// Center id and boundary for the job. An explicit id wins; otherwise the
/// boundary containing the airport reference point, then `ZAB` with a warning.
fn resolve_artcc(
    job: &GenerationJob,
    reference: Option<GeoPoint>,
    warnings: &mut Vec<Warning>,
) -> (String, Option<ArtccBoundary>) {
    let boundaries = load_boundaries(&job.data_dir, warnings);
    if let Some(id) = job.artcc_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        let id = id.to_ascii_uppercase();
        let boundary = boundaries.into_iter().find(|b| b.id == id);
        return (id, boundary);
    }
    let found = reference.and_then(|point| artcc::locate(&boundaries, point)).cloned();
    match found {
        Some(boundary) => (boundary.id.clone(), Some(boundary)),
        None => {
            warnings.push(Warning::new(
                &job.airport,
                format!("could not determine the ARTCC, using {DEFAULT_ARTCC}"),
            ));
            (DEFAULT_ARTCC.to_string(), None)
        }
    }
}

/// Boundaries from the data directory. A missing file is not an error.
fn load_boundaries(data_dir: &Path, warnings: &mut Vec<Warning>) -> Vec<ArtccBoundary> {
    let path = data_dir.join(BOUNDARIES_FILE);
    if !path.is_file() {
        return Vec::new();
    }
    match artcc::load_boundaries(&path) {
        Ok(parsed) => {
            warnings.extend(parsed.warnings);
            parsed.value
        }
        Err(err) => {
            warnings.push(Warning::new(path.display().to_string(), format!("boundaries not loaded: {err}")));
            Vec::new()
        }
    }
}

pub fn geojson_path(data_dir: &Path, icao: &str) -> PathBuf {
    data_dir.join(format!("{icao}.geojson"))
}

/// `{ICAO}_CIFP`, then `{ICAO}_CIFP.txt`.
pub fn cifp_path(data_dir: &Path, icao: &str) -> Option<PathBuf> {
    [format!("{icao}_CIFP"), format!("{icao}_CIFP.txt")]
        .into_iter()
        .map(|name| data_dir.join(name))
        .find(|path| path.is_file())
}

/// Write every body to a temporary sibling, then rename all of them into place.
fn write_outputs(dir: &Path, stem: &str, outputs: &[(OutputFormat, String)]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|err| GenerationError::io(dir, err))?;
    let tag = uuid::Uuid::new_v4().simple().to_string();

    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();
    for (format, body) in outputs {
        let target = dir.join(format!("{stem}.{}", format.extension()));
        let temp = dir.join(format!(".{stem}.{}.{tag}.tmp", format.extension()));
        if let Err(err) = std::fs::write(&temp, body) {
            discard(&staged);
            let _ = std::fs::remove_file(&temp);
            return Err(GenerationError::io(&temp, err));
        }
        staged.push((temp, target));
    }

    let mut written = Vec::new();
    for (i, (temp, target)) in staged.iter().enumerate() {
        if let Err(err) = std::fs::rename(temp, target) {
            discard(&staged[i..]);
            return Err(GenerationError::io(target, err));
        }
        tracing::info!("wrote {}", target.display());
        written.push(target.clone());
    }
    Ok(written)
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (temp, _) in staged {
        if let Err(err) = std::fs::remove_file(temp) {
            tracing::debug!("could not remove {}: {}", temp.display(), err);
        }
    }
}
