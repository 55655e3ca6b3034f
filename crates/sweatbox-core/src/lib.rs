pub mod airline;
pub mod airport;
pub mod artcc;
pub mod assembler;
pub mod cifp;
pub mod config;
pub mod error;
pub mod flight_plan;
pub mod geojson;
pub mod models;
pub mod pipeline;
pub mod placement;
pub mod preset;
pub mod procedures;
pub mod scenario;
pub mod sources;
pub mod spatial;

pub use airline::{MatchSource, ParkingAirlineRules, Resolution};
pub use airport::{Airport, ParkingSpot, Runway, RunwayEnd};
pub use artcc::{ArtccBoundary, DEFAULT_ARTCC};
pub use assembler::{assemble, output_stem, parse_air, render_air, LegacyRecord, ScenarioMetadata};
pub use config::{GeneratorConfig, GroupAirport};
pub use error::{ExternalSourceError, GenerationError, Parsed, Result, Warning};
pub use flight_plan::{
    AircraftCategory, EngineType, FlightPlan, FlightPlanSynthesizer, FlightRules, PlanRequest, SynthesizedAircraft,
};
pub use models::{
    Aircraft, AutoDeleteMode, Difficulty, GeneratedAircraft, Kinematics, PresetCommand, Scenario, Squawk,
    StartingConditions, StartingConditionsKind, TransponderMode,
};
pub use pipeline::{CancelToken, GenerationJob, GenerationReport, OutputFormat, Pipeline, Progress, Stage};
pub use placement::{ArrivalFix, EnroutePlan, FinalApproachPlan, FixArrivalPlan, ParkingFilter, PlacementEngine};
pub use preset::{apply_preset_commands, PresetCommandRule, PresetGroup};
pub use procedures::{AltitudeRestriction, Procedure, ProcedureSet};
pub use scenario::{BuiltScenario, DifficultyMix, ScenarioBuilder, ScenarioKind, ScenarioRequest, SpawnDelayMode};
pub use sources::{
    ElevationSource, FlightPlanQuery, FlightPlanSource, LocalElevationSource, LocalFlightPlanSource, SourcedPlan,
};
pub use spatial::{bearing, destination_point, distance_nm, glideslope_altitude, Frd, GeoPoint};
