mod config;
mod engine;
mod error;
mod types;

pub use config::{PatchConfig, SchemaChoice, validate_output_name};
pub use engine::{Engine, Session};
pub use error::{CoreError, CoreErrorCode};
pub use types::{
    ConfirmerCount, PassCounts, PassOptions, PassOutcome, PatchOptions, StageCount,
};
