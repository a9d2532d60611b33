pub mod config;
pub mod error;
pub mod message;
pub mod paths;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use message::{ChatMessage, LLMResponse};
pub use paths::Paths;
pub use types::{
    validate_tab_name, ExecutionPlan, PlanMethod, Tab, TabPatch, Verb, VerbCache, VerbType,
};
