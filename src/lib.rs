pub mod artifact;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod model_cache;
pub mod model_config;
pub mod normalize;
pub mod prediction_log;
pub mod rebucket;
pub mod registry;
pub mod settings;
pub mod telemetry;

pub use engine::{PredictionEngine, PredictionResponse};
pub use ensemble::{EnsembleRequest, EnsembleResult, EnsembleVoter, EnsembleWeights, Outcome};
pub use error::{EngineError, ErrorKind, Result, Severity};
