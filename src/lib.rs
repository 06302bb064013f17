pub mod codegen;
pub mod config;
pub mod error;
pub mod logging;

pub use codegen::{CodeGenPipeline, GenerationOutcome, GenerationReport, RunMode, generate};
pub use config::{CliArgs, GeneratorConfig};
pub use error::{CodegenError, ErrorCategory};
pub use logging::{LoggingConfig, init_logging};
