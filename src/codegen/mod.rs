//! Codec registry generation.
//!
//! ## Architecture
//!
//! A run flows through these stages in order:
//!
//! ```text
//! Discovery → Scan → Contract check → Aggregation → Render → Validate → Safe write
//! ```
//!
//! ## Modules
//!
//! - **discovery**: selects candidate source files from include/exclude sets
//!   and skips previously generated artifacts
//! - **scanner**: parses one file and reports marker-tagged declarations
//! - **contract**: decides whether a tagged declaration can be registered
//! - **aggregate**: merges per-file findings, resolving serializer and
//!   deserializer overrides last-scanned-wins
//! - **emitter**: renders the registry source and checks that it parses
//! - **writer**: atomic, skip-if-identical artifact writes
//! - **pipeline**: wires the stages together for one run
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use codec_registry_gen::codegen::{RunMode, generate};
//! use codec_registry_gen::config::GeneratorConfig;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = GeneratorConfig::for_base_dir(".");
//! config.validate()?;
//!
//! let report = generate(config, RunMode::Write)?;
//! println!("{} declarations registered", report.declarations.len());
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod contract;
pub mod discovery;
pub mod emitter;
pub mod pipeline;
pub mod scanner;
pub mod writer;

pub use aggregate::{
    AggregationResult, Aggregator, FileFailure, OverrideBinding, OverrideKind, RejectionRecord,
    ScanStats,
};
pub use contract::{
    CandidateDeclaration, ContractConfig, ContractValidator, ContractViolation, DeclarationId,
    Rejection, Verdict,
};
pub use discovery::{Discovery, MatchedFile, SourceSelector, SourceSet};
pub use emitter::{EmitterConfig, KeyCollision, RegistryEmitter, RenderedRegistry};
pub use pipeline::{CodeGenPipeline, GenerationOutcome, GenerationReport, RunMode, generate};
pub use scanner::{DeclarationScanner, MarkerNames, ScanOutcome};
pub use writer::{Freshness, SafeCodeWriter, WriteOutcome, compute_string_hash};
