//! Cross-file aggregation.
//!
//! Runs the scanner and the contract validator over every discovered file and
//! folds the findings into one [`Aggregation`] value. Nothing is global: the
//! accumulator is threaded through each per-file step and handed to the
//! emitter once the walk is complete.
//!
//! Failures are isolated per file. An unreadable file, a file that is not a
//! compilation unit, or a declaration that breaks the contract is logged and
//! contributes nothing; the run carries on.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

use super::contract::{CandidateDeclaration, ContractValidator, DeclarationId, Verdict};
use super::discovery::{MatchedFile, has_generated_header};
use super::scanner::{DeclarationScanner, ScanOutcome, module_path_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideKind {
    Serializer,
    Deserializer,
}

/// User supplied converter replacing the pass-through fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverrideBinding {
    pub kind: OverrideKind,
    pub name: String,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectionRecord {
    pub file: PathBuf,
    pub declaration: String,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub file: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub files_not_applicable: usize,
    pub prior_outputs_skipped: usize,
    pub failures: Vec<FileFailure>,
    pub rejections: Vec<RejectionRecord>,
}

/// What one file contributed.
#[derive(Debug, Clone)]
pub struct FileFindings {
    pub file: PathBuf,
    pub module: String,
    pub verdicts: Vec<Verdict>,
    pub serializers: Vec<String>,
    pub deserializers: Vec<String>,
}

/// Running accumulator for one generation run.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    candidates: IndexMap<DeclarationId, CandidateDeclaration>,
    serializer: Option<OverrideBinding>,
    deserializer: Option<OverrideBinding>,
    stats: ScanStats,
}

impl Aggregation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one file's findings in. Re-absorbing the same declaration keeps a
    /// single entry; a later override replaces an earlier one.
    pub fn absorb(mut self, findings: FileFindings) -> Self {
        for verdict in findings.verdicts {
            match verdict {
                Verdict::Qualifies(candidate) => {
                    tracing::info!(
                        declaration = candidate.name(),
                        module = candidate.module(),
                        key = candidate.registry_key(),
                        "found encodable declaration"
                    );
                    self.candidates.insert(candidate.id(), candidate);
                }
                Verdict::Rejected(rejection) => {
                    let halves = rejection
                        .halves()
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    tracing::warn!(
                        file = %findings.file.display(),
                        declaration = %rejection.declaration,
                        missing = %halves,
                        "excluding declaration: {rejection}"
                    );
                    self.stats.rejections.push(RejectionRecord {
                        file: findings.file.clone(),
                        declaration: rejection.declaration.clone(),
                        reasons: rejection.violations.iter().map(ToString::to_string).collect(),
                    });
                }
                Verdict::NotApplicable => {}
            }
        }

        for name in findings.serializers {
            self.serializer = Some(self.bind(OverrideKind::Serializer, name, &findings.module));
        }
        for name in findings.deserializers {
            self.deserializer = Some(self.bind(OverrideKind::Deserializer, name, &findings.module));
        }

        self.stats.files_scanned += 1;
        self
    }

    fn bind(&self, kind: OverrideKind, name: String, module: &str) -> OverrideBinding {
        let previous = match kind {
            OverrideKind::Serializer => self.serializer.as_ref(),
            OverrideKind::Deserializer => self.deserializer.as_ref(),
        };
        if let Some(previous) = previous {
            tracing::warn!(
                kind = ?kind,
                replaced = %previous.name,
                with = %name,
                "multiple overrides found, keeping the last one scanned"
            );
        } else {
            tracing::info!(kind = ?kind, declaration = %name, module, "found override");
        }
        OverrideBinding {
            kind,
            name,
            module: module.to_string(),
        }
    }

    pub fn record_not_applicable(mut self, file: &Path, reason: &str) -> Self {
        tracing::debug!(file = %file.display(), reason, "file not applicable");
        self.stats.files_not_applicable += 1;
        self
    }

    pub fn record_prior_output(mut self, file: &Path) -> Self {
        tracing::debug!(file = %file.display(), "skipping file with generated header");
        self.stats.prior_outputs_skipped += 1;
        self
    }

    pub fn record_failure(mut self, file: &Path, error: String) -> Self {
        tracing::warn!(file = %file.display(), %error, "failed to process file");
        self.stats.failures.push(FileFailure {
            file: file.to_path_buf(),
            error,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn finish(self) -> AggregationResult {
        AggregationResult {
            candidates: self.candidates.into_values().collect(),
            serializer: self.serializer,
            deserializer: self.deserializer,
            stats: self.stats,
        }
    }
}

/// Final, validated result of a run, consumed once by the emitter.
#[derive(Debug, Clone, Default)]
pub struct AggregationResult {
    /// Accepted declarations in first-seen order.
    pub candidates: Vec<CandidateDeclaration>,
    pub serializer: Option<OverrideBinding>,
    pub deserializer: Option<OverrideBinding>,
    pub stats: ScanStats,
}

impl AggregationResult {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Drives scanner and validator across a file list.
#[derive(Debug, Clone)]
pub struct Aggregator {
    scanner: DeclarationScanner,
    validator: ContractValidator,
    source_root: PathBuf,
    crate_prefix: String,
}

impl Aggregator {
    pub fn new(
        scanner: DeclarationScanner,
        validator: ContractValidator,
        source_root: impl Into<PathBuf>,
        crate_prefix: impl Into<String>,
    ) -> Self {
        Self {
            scanner,
            validator,
            source_root: source_root.into(),
            crate_prefix: crate_prefix.into(),
        }
    }

    pub fn run<'a>(&self, files: impl IntoIterator<Item = &'a MatchedFile>) -> AggregationResult {
        let aggregation = files
            .into_iter()
            .fold(Aggregation::new(), |acc, file| self.scan_file(acc, file));

        let result = aggregation.finish();
        tracing::info!(
            declarations = result.candidates.len(),
            files_scanned = result.stats.files_scanned,
            not_applicable = result.stats.files_not_applicable,
            rejected = result.stats.rejections.len(),
            failures = result.stats.failures.len(),
            serializer = result.serializer.as_ref().map(|b| b.name.as_str()),
            deserializer = result.deserializer.as_ref().map(|b| b.name.as_str()),
            "aggregation complete"
        );
        result
    }

    /// One per-file step: read, scan, validate, fold.
    pub fn scan_file(&self, acc: Aggregation, file: &MatchedFile) -> Aggregation {
        let Some(module) = module_path_for(&self.source_root, &file.path, &self.crate_prefix)
        else {
            return acc.record_not_applicable(&file.relative, "no module path for file");
        };

        let source = match fs::read_to_string(&file.path) {
            Ok(source) => source,
            Err(err) => return acc.record_failure(&file.relative, err.to_string()),
        };
        if has_generated_header(&source) {
            return acc.record_prior_output(&file.relative);
        }

        let declarations = match self.scanner.scan_source(&source) {
            ScanOutcome::Scanned(declarations) => declarations,
            ScanOutcome::NotApplicable(reason) => {
                return acc.record_not_applicable(&file.relative, &reason);
            }
        };

        let findings = FileFindings {
            file: file.relative.clone(),
            verdicts: declarations
                .encodables()
                .map(|decl| self.validator.validate(decl, &module))
                .collect(),
            serializers: declarations.serializers().map(|d| d.name.clone()).collect(),
            deserializers: declarations.deserializers().map(|d| d.name.clone()).collect(),
            module,
        };

        acc.absorb(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ALPHA: &str = r#"
        #[encodable]
        pub struct Alpha;
        impl Alpha {
            pub fn to_map(&self) -> HashMap<String, Value> { todo!() }
            pub fn from_map(map: HashMap<String, Value>) -> Self { todo!() }
        }
    "#;

    fn findings_for(source: &str, module: &str) -> FileFindings {
        let ScanOutcome::Scanned(found) = DeclarationScanner::default().scan_source(source) else {
            panic!("scan failed");
        };
        let validator = ContractValidator::default();
        FileFindings {
            file: PathBuf::from(format!("{module}.rs")),
            module: module.to_string(),
            verdicts: found.encodables().map(|d| validator.validate(d, module)).collect(),
            serializers: found.serializers().map(|d| d.name.clone()).collect(),
            deserializers: found.deserializers().map(|d| d.name.clone()).collect(),
        }
    }

    fn write(dir: &TempDir, rel: &str, content: &str) -> MatchedFile {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        MatchedFile {
            path,
            relative: PathBuf::from(rel),
        }
    }

    fn aggregator(dir: &TempDir) -> Aggregator {
        Aggregator::new(
            DeclarationScanner::default(),
            ContractValidator::default(),
            dir.path().join("src"),
            "crate",
        )
    }

    #[test]
    fn test_absorbing_same_file_twice_does_not_duplicate() {
        let result = Aggregation::new()
            .absorb(findings_for(ALPHA, "crate::alpha"))
            .absorb(findings_for(ALPHA, "crate::alpha"))
            .finish();
        assert_eq!(result.candidates.len(), 1);
    }

    #[test]
    fn test_same_name_in_different_modules_is_distinct() {
        let result = Aggregation::new()
            .absorb(findings_for(ALPHA, "crate::a"))
            .absorb(findings_for(ALPHA, "crate::b"))
            .finish();
        assert_eq!(result.candidates.len(), 2);
    }

    #[test]
    fn test_last_override_wins() {
        let result = Aggregation::new()
            .absorb(findings_for("#[codec_serializer] struct First;", "crate::one"))
            .absorb(findings_for("#[codec_serializer] struct Second;", "crate::two"))
            .finish();
        let serializer = result.serializer.unwrap();
        assert_eq!(serializer.name, "Second");
        assert_eq!(serializer.module, "crate::two");
        assert!(result.deserializer.is_none());
    }

    #[test]
    fn test_rejections_are_recorded_not_included() {
        let result = Aggregation::new()
            .absorb(findings_for("#[encodable] struct Broken;", "crate::broken"))
            .finish();
        assert!(result.is_empty());
        assert_eq!(result.stats.rejections.len(), 1);
        assert_eq!(result.stats.rejections[0].declaration, "Broken");
        assert_eq!(result.stats.rejections[0].reasons.len(), 2);
    }

    #[test]
    fn test_scan_file_isolates_unparseable_files() {
        let dir = TempDir::new().unwrap();
        let broken = write(&dir, "src/broken.rs", "this is not rust {");
        let alpha = write(&dir, "src/alpha.rs", ALPHA);

        let result = aggregator(&dir).run([&broken, &alpha]);

        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].module(), "crate::alpha");
        assert_eq!(result.stats.files_not_applicable, 1);
        assert_eq!(result.stats.files_scanned, 1);
    }

    #[test]
    fn test_scan_file_records_read_failures() {
        let dir = TempDir::new().unwrap();
        let missing = MatchedFile {
            path: dir.path().join("src/missing.rs"),
            relative: PathBuf::from("src/missing.rs"),
        };

        let result = aggregator(&dir).run([&missing]);

        assert!(result.is_empty());
        assert_eq!(result.stats.failures.len(), 1);
        assert_eq!(result.stats.failures[0].file, PathBuf::from("src/missing.rs"));
    }

    #[test]
    fn test_scan_file_skips_generated_header() {
        let dir = TempDir::new().unwrap();
        let generated = write(
            &dir,
            "src/registry.rs",
            &format!("// @generated by codec-registry-gen. Do not edit by hand.\n{ALPHA}"),
        );

        let result = aggregator(&dir).run([&generated]);

        assert!(result.is_empty());
        assert_eq!(result.stats.prior_outputs_skipped, 1);
    }

    #[test]
    fn test_files_outside_source_root_are_not_applicable() {
        let dir = TempDir::new().unwrap();
        let outside = write(&dir, "build/alpha.rs", ALPHA);

        let result = aggregator(&dir).run([&outside]);

        assert!(result.is_empty());
        assert_eq!(result.stats.files_not_applicable, 1);
    }
}
