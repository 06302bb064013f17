//! Source file discovery.
//!
//! Walks the base directory and yields the files selected by the configured
//! include/exclude pattern sets. Prior generator output is always dropped so
//! a run never feeds on its own artifact.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

use crate::error::{CodegenError, Result};

pub const DEFAULT_INCLUDE: &str = "src/**/*.rs";
/// File name suffix reserved for generated sources.
pub const GENERATED_SUFFIX: &str = ".g.rs";
/// Token that marks a file as machine generated when found on its first line.
pub const GENERATED_MARKER: &str = "@generated";

/// One include/exclude pattern pair. Patterns are globs relative to the base
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSet {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for SourceSet {
    fn default() -> Self {
        Self {
            include: vec![DEFAULT_INCLUDE.to_string()],
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct CompiledSet {
    include: GlobSet,
    exclude: GlobSet,
}

/// Why a path was or was not selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Selected,
    NotIncluded,
    Excluded,
    PriorOutput,
}

#[derive(Debug, Clone)]
pub struct MatchedFile {
    pub path: PathBuf,
    /// Path relative to the base directory.
    pub relative: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub files: Vec<MatchedFile>,
    pub excluded: usize,
    pub prior_outputs: usize,
}

#[derive(Debug)]
pub struct SourceSelector {
    sets: Vec<CompiledSet>,
    output_dir: Option<PathBuf>,
    output_file: Option<PathBuf>,
}

impl SourceSelector {
    /// `output_dir` and `output_file` are relative to the base directory;
    /// pass `None` when the output lives outside it.
    pub fn new(
        sets: &[SourceSet],
        output_dir: Option<&Path>,
        output_file: Option<&Path>,
    ) -> Result<Self> {
        let sets = sets
            .iter()
            .map(|set| {
                Ok(CompiledSet {
                    include: compile_globs(&set.include)?,
                    exclude: compile_globs(&set.exclude)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let output_dir = output_dir
            .filter(|dir| !dir.as_os_str().is_empty() && *dir != Path::new("."))
            .map(Path::to_path_buf);

        Ok(Self {
            sets,
            output_dir,
            output_file: output_file.map(Path::to_path_buf),
        })
    }

    pub fn is_prior_output(&self, relative: &Path) -> bool {
        self.has_generated_name(relative) || self.is_under_output_dir(relative)
    }

    /// The configured output file, or a file carrying the generated suffix.
    fn has_generated_name(&self, relative: &Path) -> bool {
        if self.output_file.as_deref() == Some(relative) {
            return true;
        }
        relative
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(GENERATED_SUFFIX))
    }

    fn is_under_output_dir(&self, relative: &Path) -> bool {
        self.output_dir
            .as_deref()
            .is_some_and(|dir| relative.starts_with(dir))
    }

    pub fn select(&self, relative: &Path) -> Selection {
        if self.is_prior_output(relative) {
            return Selection::PriorOutput;
        }

        let mut excluded = false;
        for set in &self.sets {
            if !set.include.is_match(relative) {
                continue;
            }
            if set.exclude.is_match(relative) {
                excluded = true;
                continue;
            }
            return Selection::Selected;
        }

        if excluded {
            Selection::Excluded
        } else {
            Selection::NotIncluded
        }
    }

    /// Walk `base_dir` in file-name order and collect the selected files.
    pub fn discover(&self, base_dir: &Path) -> Result<Discovery> {
        let mut discovery = Discovery::default();

        let walker = WalkDir::new(base_dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_skipped_dir(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(CodegenError::Walk {
                        root: base_dir.to_path_buf(),
                        source: err,
                    });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(base_dir) else {
                continue;
            };

            match self.select(relative) {
                Selection::Selected => {
                    discovery.files.push(MatchedFile {
                        path: entry.path().to_path_buf(),
                        relative: relative.to_path_buf(),
                    });
                }
                Selection::Excluded => discovery.excluded += 1,
                Selection::PriorOutput => {
                    if self.has_generated_name(relative) {
                        tracing::debug!(path = %relative.display(), "ignoring prior generated output");
                    } else {
                        tracing::warn!(
                            path = %relative.display(),
                            "skipping file under the output directory"
                        );
                    }
                    discovery.prior_outputs += 1;
                }
                Selection::NotIncluded => {}
            }
        }

        Ok(discovery)
    }
}

/// True when the first line of `source` carries the generated marker.
pub fn has_generated_header(source: &str) -> bool {
    source
        .lines()
        .next()
        .is_some_and(|line| line.contains(GENERATED_MARKER))
}

fn compile_globs(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| CodegenError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| CodegenError::Pattern {
        pattern: patterns.join(","),
        source,
    })
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.') || name == "target")
}
