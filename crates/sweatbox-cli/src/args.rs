//! Argument parsing and conversion into a [`GenerationJob`].

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use sweatbox_core::{
    ArrivalFix, DifficultyMix, GenerationJob, OutputFormat, ParkingFilter, PresetCommandRule, ScenarioKind,
    ScenarioRequest, SpawnDelayMode,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ParkingArg {
    #[default]
    Any,
    Airline,
    Ga,
}

impl From<ParkingArg> for ParkingFilter {
    fn from(arg: ParkingArg) -> Self {
        match arg {
            ParkingArg::Any => ParkingFilter::Any,
            ParkingArg::Airline => ParkingFilter::AirlineOnly,
            ParkingArg::Ga => ParkingFilter::GeneralAviationOnly,
        }
    }
}

/// Generate an ATC sweatbox training scenario
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Primary airport ICAO (e.g. KPHX)
    #[arg(long)]
    pub airport: String,

    /// Directory holding `{ICAO}.geojson` and CIFP files
    #[arg(long, default_value = "airport_data")]
    pub data_dir: PathBuf,

    /// Generator configuration JSON
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// ground-departures, ground-mixed, tower-mixed, tracon-departures, tracon-arrivals, tracon-mixed,
    /// artcc-enroute
    #[arg(long = "scenario-type", default_value = "ground-departures")]
    pub scenario_type: String,

    #[arg(long, default_value_t = 0)]
    pub departures: usize,

    #[arg(long, default_value_t = 0)]
    pub arrivals: usize,

    /// Comma separated active runways, e.g. 25L,26
    #[arg(long, default_value = "")]
    pub runways: String,

    /// Comma separated arrival fixes: FIX, FIX.STAR or FIX090010
    #[arg(long, default_value = "")]
    pub fixes: String,

    /// Final approach separation range in NM, e.g. 3-6
    #[arg(long, default_value = "3-6")]
    pub separation: String,

    /// Distance of the first aircraft on final in NM
    #[arg(long, default_value_t = 6.0)]
    pub first_final_distance: f64,

    /// Fix arrival altitude band in feet, e.g. 7000-18000
    #[arg(long, default_value = "7000-18000")]
    pub altitude_band: String,

    /// Delay between fix arrivals in minutes, e.g. 4-7, or "none"
    #[arg(long, default_value = "4-7")]
    pub fix_delay: String,

    /// Spawn delays: none, incremental:MIN-MAX or total:MINUTES
    #[arg(long, default_value = "none")]
    pub spawn_delay: String,

    /// Difficulty counts as easy,medium,hard
    #[arg(long)]
    pub difficulty: Option<String>,

    /// JSON file with preset command rules
    #[arg(long)]
    pub presets: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ParkingArg::Any)]
    pub parking: ParkingArg,

    /// Number of GA arrivals among the fix arrivals
    #[arg(long, default_value_t = 0)]
    pub ga_arrivals: usize,

    /// Number of departures lined up on the runway
    #[arg(long, default_value_t = 0)]
    pub on_runway: usize,

    /// Overflights between airports of --airport-group (artcc-enroute)
    #[arg(long, default_value_t = 0)]
    pub enroute: usize,

    /// Use SID routes for departures where available
    #[arg(long, default_value_t = false)]
    pub sid_routes: bool,

    /// Enroute airport group for origins and destinations
    #[arg(long)]
    pub airport_group: Option<String>,

    #[arg(long)]
    pub callsign_suffix: Option<String>,

    /// ARTCC id; detected from `artcc_boundaries.geojson` in the data directory when omitted
    #[arg(long)]
    pub artcc: Option<String>,

    /// Scenario name
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Output file stem, defaults to `{ICAO}_{DDHHMM}`
    #[arg(long)]
    pub output_name: Option<String>,

    /// Comma separated output formats: json, air
    #[arg(long, default_value = "json")]
    pub formats: String,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Skip remote flight plan and elevation lookups
    #[arg(long, default_value_t = false)]
    pub offline: bool,
}

impl Args {
    pub fn request(&self) -> Result<ScenarioRequest> {
        let fixes = split_list(&self.fixes);
        for fix in &fixes {
            fix.parse::<ArrivalFix>()?;
        }
        let (sep_min, sep_max) = parse_range::<f64>(&self.separation).context("invalid --separation")?;
        let presets = match &self.presets {
            Some(path) => load_presets(path)?,
            None => Vec::new(),
        };
        Ok(ScenarioRequest {
            kind: self.scenario_type.parse::<ScenarioKind>()?,
            departures: self.departures,
            arrivals: self.arrivals,
            parking_filter: self.parking.into(),
            active_runways: split_list(&self.runways),
            separation_nm: (sep_min, sep_max),
            first_final_distance_nm: self.first_final_distance,
            arrival_fixes: fixes,
            altitude_band_ft: parse_range(&self.altitude_band).context("invalid --altitude-band")?,
            fix_delay_minutes: match self.fix_delay.trim() {
                "" | "none" => None,
                other => Some(parse_range(other).context("invalid --fix-delay")?),
            },
            ga_arrivals: self.ga_arrivals,
            on_runway_departures: self.on_runway,
            enroute: self.enroute,
            sid_routes: self.sid_routes,
            spawn_delay: parse_spawn_delay(&self.spawn_delay)?,
            difficulty: self.difficulty.as_deref().map(parse_difficulty).transpose()?,
            presets,
            airport_group: self.airport_group.clone(),
            callsign_suffix: self.callsign_suffix.clone(),
            seed: self.seed,
        })
    }

    pub fn job(&self) -> Result<GenerationJob> {
        let formats = split_list(&self.formats)
            .iter()
            .map(|f| f.parse::<OutputFormat>())
            .collect::<Result<Vec<_>, _>>()?;
        if formats.is_empty() {
            bail!("at least one output format is required");
        }
        let mut job = GenerationJob::new(self.airport.as_str(), &self.data_dir, self.request()?);
        job.artcc_id = self.artcc.as_deref().map(str::to_ascii_uppercase);
        job.scenario_name = self.name.clone();
        job.output_dir = self.output_dir.clone();
        job.output_name = self.output_name.clone();
        job.formats = formats;
        Ok(job)
    }
}

pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|item| item.trim().to_ascii_uppercase())
        .filter(|item| !item.is_empty())
        .collect()
}

/// `"3-6"` or a single value `"5"` meaning `5-5`.
pub fn parse_range<T>(s: &str) -> Result<(T, T)>
where
    T: std::str::FromStr + PartialOrd + Copy,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let (lo, hi) = match s.split_once('-') {
        Some((lo, hi)) => (lo.trim().parse::<T>()?, hi.trim().parse::<T>()?),
        None => {
            let v = s.trim().parse::<T>()?;
            (v, v)
        }
    };
    if lo > hi {
        bail!("range '{s}' is reversed");
    }
    Ok((lo, hi))
}

pub fn parse_spawn_delay(s: &str) -> Result<SpawnDelayMode> {
    let s = s.trim().to_ascii_lowercase();
    match s.split_once(':') {
        None if s.is_empty() || s == "none" => Ok(SpawnDelayMode::None),
        Some(("incremental", range)) => {
            let (min_minutes, max_minutes) = parse_range(range).context("invalid incremental spawn delay")?;
            Ok(SpawnDelayMode::Incremental { min_minutes, max_minutes })
        }
        Some(("total", minutes)) => Ok(SpawnDelayMode::Total {
            session_minutes: minutes.trim().parse().context("invalid total spawn delay")?,
        }),
        _ => bail!("unknown spawn delay '{s}', expected none, incremental:MIN-MAX or total:MINUTES"),
    }
}

pub fn parse_difficulty(s: &str) -> Result<DifficultyMix> {
    let counts = s
        .split(',')
        .map(|c| c.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .context("difficulty counts must be whole numbers")?;
    match counts.as_slice() {
        [easy, medium, hard] => Ok(DifficultyMix {
            easy: *easy,
            medium: *medium,
            hard: *hard,
        }),
        _ => bail!("expected three difficulty counts as easy,medium,hard"),
    }
}

pub fn load_presets(path: &Path) -> Result<Vec<PresetCommandRule>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid preset rules in {}", path.display()))
}
