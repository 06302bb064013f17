//! One generation run: discover, aggregate, render, write.
//!
//! Stages are strictly sequential. The emitter only starts once every file
//! has been folded into the aggregation, and nothing survives the run except
//! the artifact itself.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::aggregate::{AggregationResult, Aggregator, OverrideBinding, ScanStats};
use super::contract::ContractValidator;
use super::discovery::SourceSelector;
use super::emitter::{KeyCollision, RegistryEmitter, RenderedRegistry, generated_at};
use super::scanner::DeclarationScanner;
use super::writer::{Freshness, SafeCodeWriter, WriteOutcome};
use crate::config::GeneratorConfig;
use crate::error::Result;

/// What the run should do with the rendered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Write,
    /// Compare with the artifact on disk, never write.
    Check,
    /// Render only; the caller prints the source.
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationOutcome {
    /// No encodable declarations were found; nothing was written.
    SkippedEmpty,
    Written { path: PathBuf },
    Unchanged { path: PathBuf },
    UpToDate { path: PathBuf },
    Stale { path: PathBuf },
    Rendered,
}

impl GenerationOutcome {
    /// True when a check run found the artifact out of date.
    pub fn is_stale(&self) -> bool {
        matches!(self, GenerationOutcome::Stale { .. })
    }
}

/// Summary of one run, serializable for `--report-json`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub mode: RunMode,
    pub outcome: GenerationOutcome,
    pub files_matched: usize,
    pub files_excluded: usize,
    pub prior_outputs_skipped: usize,
    pub declarations: Vec<String>,
    pub serializer: Option<OverrideBinding>,
    pub deserializer: Option<OverrideBinding>,
    pub key_collisions: Vec<KeyCollision>,
    /// Artifact from an earlier run left in place by an empty run.
    pub leftover_artifact: Option<PathBuf>,
    pub scan: ScanStats,
    pub duration_ms: u64,
    #[serde(skip)]
    pub rendered: Option<String>,
}

pub struct CodeGenPipeline {
    config: GeneratorConfig,
    selector: SourceSelector,
    aggregator: Aggregator,
    emitter: RegistryEmitter,
    writer: SafeCodeWriter,
}

impl CodeGenPipeline {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let output_path = config.output_path();
        let output_dir = config.output_dir_path();
        let selector = SourceSelector::new(
            &config.source_sets,
            output_dir.strip_prefix(&config.base_dir).ok(),
            output_path.strip_prefix(&config.base_dir).ok(),
        )?;
        let aggregator = Aggregator::new(
            DeclarationScanner::new(config.markers.clone()),
            ContractValidator::new(config.contract.clone()),
            config.source_root_path(),
            config.crate_prefix.clone(),
        );
        let emitter = RegistryEmitter::new(config.emitter_config())?;

        Ok(Self {
            config,
            selector,
            aggregator,
            emitter,
            writer: SafeCodeWriter::new(),
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn run(&self, mode: RunMode) -> Result<GenerationReport> {
        let started = Instant::now();
        let span = tracing::info_span!(
            "generate",
            mode = ?mode,
            base_dir = %self.config.base_dir.display()
        );
        let _entered = span.enter();

        let discovery = self.selector.discover(&self.config.base_dir)?;
        tracing::debug!(
            matched = discovery.files.len(),
            excluded = discovery.excluded,
            prior_outputs = discovery.prior_outputs,
            "discovery complete"
        );

        let result = self.aggregator.run(&discovery.files);

        let mut report = GenerationReport {
            mode,
            outcome: GenerationOutcome::SkippedEmpty,
            files_matched: discovery.files.len(),
            files_excluded: discovery.excluded,
            prior_outputs_skipped: discovery.prior_outputs + result.stats.prior_outputs_skipped,
            declarations: result
                .candidates
                .iter()
                .map(|c| format!("{}::{}", c.module(), c.name()))
                .collect(),
            serializer: result.serializer.clone(),
            deserializer: result.deserializer.clone(),
            key_collisions: Vec::new(),
            leftover_artifact: None,
            scan: result.stats.clone(),
            duration_ms: 0,
            rendered: None,
        };

        let path = self.config.output_path();

        if result.is_empty() {
            tracing::info!("no encodable declarations found, skipping generation");
            if path.is_file() {
                tracing::warn!(
                    path = %path.display(),
                    "existing registry left in place; it may name removed declarations"
                );
                report.leftover_artifact = Some(path);
            }
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        let rendered = self.render_stable(&result, &path)?;
        for collision in &rendered.collisions {
            tracing::warn!(
                key = %collision.key,
                kept = %collision.kept,
                shadowed = %collision.shadowed,
                "registry key collision, last entry wins"
            );
        }
        report.key_collisions = rendered.collisions;

        report.outcome = match mode {
            RunMode::Write => match self.writer.write(&path, &rendered.source) {
                Ok(WriteOutcome::Written) => {
                    tracing::info!(
                        path = %path.display(),
                        declarations = result.candidates.len(),
                        "registry written"
                    );
                    GenerationOutcome::Written { path }
                }
                Ok(WriteOutcome::Unchanged) => {
                    tracing::info!(path = %path.display(), "registry unchanged");
                    GenerationOutcome::Unchanged { path }
                }
                Err(err) => {
                    tracing::error!(
                        path = %path.display(),
                        category = %err.category(),
                        error = %err,
                        "failed to write registry"
                    );
                    return Err(err);
                }
            },
            RunMode::Check => match self.writer.freshness(&path, &rendered.source)? {
                Freshness::UpToDate => GenerationOutcome::UpToDate { path },
                Freshness::Stale | Freshness::Missing => {
                    tracing::warn!(path = %path.display(), "registry is out of date");
                    GenerationOutcome::Stale { path }
                }
            },
            RunMode::DryRun => {
                report.rendered = Some(rendered.source);
                GenerationOutcome::Rendered
            }
        };

        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Render with a header stamp that only moves when the body does.
    ///
    /// `SOURCE_DATE_EPOCH` wins. Otherwise the stamp of the registry at `path`
    /// is reused when rendering with it reproduces that file exactly, so file
    /// metadata never changes the output. A new body is stamped with the
    /// current time.
    fn render_stable(&self, result: &AggregationResult, path: &Path) -> Result<RenderedRegistry> {
        if let Some(epoch) = source_date_epoch() {
            return self.emitter.render(result, epoch);
        }

        if let Ok(existing) = fs::read_to_string(path)
            && let Some(previous) = generated_at(&existing)
        {
            let rendered = self.emitter.render(result, previous)?;
            if rendered.source == existing {
                return Ok(rendered);
            }
            tracing::debug!(path = %path.display(), "registry body changed, restamping");
        }

        let now = Utc::now();
        let now = DateTime::<Utc>::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        self.emitter.render(result, now)
    }
}

fn source_date_epoch() -> Option<DateTime<Utc>> {
    let raw = env::var("SOURCE_DATE_EPOCH").ok()?;
    match raw.trim().parse::<i64>() {
        Ok(secs) => DateTime::<Utc>::from_timestamp(secs, 0),
        Err(_) => {
            tracing::warn!(value = %raw, "ignoring invalid SOURCE_DATE_EPOCH");
            None
        }
    }
}

/// Convenience wrapper: build a pipeline from `config` and run it once.
pub fn generate(config: GeneratorConfig, mode: RunMode) -> Result<GenerationReport> {
    CodeGenPipeline::new(config)?.run(mode)
}
