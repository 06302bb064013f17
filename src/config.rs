use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::codegen::contract::ContractConfig;
use crate::codegen::discovery::{SourceSelector, SourceSet};
use crate::codegen::emitter::{DEFAULT_CODEC_NAME, DEFAULT_MAP_TYPE, EmitterConfig};
use crate::codegen::pipeline::RunMode;
use crate::codegen::scanner::MarkerNames;

const DEFAULT_SOURCE_ROOT: &str = "src";
const DEFAULT_OUTPUT_DIR: &str = "src/generated";
const DEFAULT_OUTPUT_FILE: &str = "codec.g.rs";
const DEFAULT_CRATE_PREFIX: &str = "crate";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub base_dir: PathBuf,
    /// Crate source root, relative to `base_dir`. Module paths derive from it.
    pub source_root: PathBuf,
    pub source_sets: Vec<SourceSet>,
    /// Output directory, relative to `base_dir` unless absolute.
    pub output_dir: PathBuf,
    pub output_file: String,
    pub codec_name: String,
    pub map_type: String,
    pub crate_prefix: String,
    pub markers: MarkerNames,
    pub contract: ContractConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            source_root: PathBuf::from(DEFAULT_SOURCE_ROOT),
            source_sets: vec![SourceSet::default()],
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
            codec_name: DEFAULT_CODEC_NAME.to_string(),
            map_type: DEFAULT_MAP_TYPE.to_string(),
            crate_prefix: DEFAULT_CRATE_PREFIX.to_string(),
            markers: MarkerNames::default(),
            contract: ContractConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Defaults rooted at `base_dir`.
    pub fn for_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let file_config = if let Some(path) = args.config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };
        Ok(Self::merge(args.clone(), file_config))
    }

    /// CLI values win over file values, which win over defaults.
    fn merge(args: CliArgs, file: PartialConfig) -> Self {
        let defaults = Self::default();

        let PartialConfig {
            base_dir: file_base_dir,
            source_root: file_source_root,
            include: file_include,
            exclude: file_exclude,
            source_sets: file_source_sets,
            output_dir: file_output_dir,
            output_file: file_output_file,
            codec_name: file_codec_name,
            map_type: file_map_type,
            crate_prefix: file_crate_prefix,
            serialize_method,
            deserialize_constructor,
            map_type_name,
            markers: file_markers,
        } = file;

        let cli_set = (args.include.is_some() || args.exclude.is_some()).then(|| SourceSet {
            include: args
                .include
                .clone()
                .unwrap_or_else(|| SourceSet::default().include),
            exclude: args.exclude.clone().unwrap_or_default(),
        });
        let file_set = (file_include.is_some() || file_exclude.is_some()).then(|| SourceSet {
            include: file_include.unwrap_or_else(|| SourceSet::default().include),
            exclude: file_exclude.unwrap_or_default(),
        });
        let source_sets = cli_set
            .map(|set| vec![set])
            .or(file_source_sets)
            .or(file_set.map(|set| vec![set]))
            .unwrap_or(defaults.source_sets);

        let file_markers = file_markers.unwrap_or_default();
        let markers = MarkerNames {
            encodable: file_markers.encodable.unwrap_or(defaults.markers.encodable),
            serializer: file_markers.serializer.unwrap_or(defaults.markers.serializer),
            deserializer: file_markers
                .deserializer
                .unwrap_or(defaults.markers.deserializer),
        };

        let contract = ContractConfig {
            serialize_method: serialize_method.unwrap_or(defaults.contract.serialize_method),
            deserialize_constructor: deserialize_constructor
                .unwrap_or(defaults.contract.deserialize_constructor),
            map_type_name: map_type_name.unwrap_or(defaults.contract.map_type_name),
        };

        Self {
            base_dir: args.base_dir.or(file_base_dir).unwrap_or(defaults.base_dir),
            source_root: args
                .source_root
                .or(file_source_root)
                .unwrap_or(defaults.source_root),
            source_sets,
            output_dir: args
                .output_dir
                .or(file_output_dir)
                .unwrap_or(defaults.output_dir),
            output_file: args
                .output_file
                .or(file_output_file)
                .unwrap_or(defaults.output_file),
            codec_name: args
                .codec_name
                .or(file_codec_name)
                .unwrap_or(defaults.codec_name),
            map_type: args.map_type.or(file_map_type).unwrap_or(defaults.map_type),
            crate_prefix: args
                .crate_prefix
                .or(file_crate_prefix)
                .unwrap_or(defaults.crate_prefix),
            markers,
            contract,
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.base_dir.exists(),
            "base directory {:?} does not exist",
            self.base_dir
        );
        anyhow::ensure!(
            self.base_dir.is_dir(),
            "base directory {:?} is not a directory",
            self.base_dir
        );

        anyhow::ensure!(
            !self.source_sets.is_empty(),
            "at least one source set must be configured"
        );
        for (idx, set) in self.source_sets.iter().enumerate() {
            anyhow::ensure!(
                !set.include.is_empty(),
                "source set #{idx} has no include patterns"
            );
        }
        SourceSelector::new(&self.source_sets, None, None)
            .context("invalid include/exclude pattern")?;

        // Everything under the output directory is skipped as prior output.
        let output_dir = self.output_dir.as_os_str();
        if !output_dir.is_empty() && output_dir != "." {
            anyhow::ensure!(
                !self.source_root_path().starts_with(self.output_dir_path()),
                "output directory {:?} contains the source root {:?}; no source file would be scanned",
                self.output_dir,
                self.source_root
            );
        }

        anyhow::ensure!(
            self.output_file.ends_with(".rs"),
            "output file {:?} must end with .rs",
            self.output_file
        );
        anyhow::ensure!(
            Path::new(&self.output_file).components().count() == 1,
            "output file {:?} must be a bare file name",
            self.output_file
        );

        ensure_ident("codec name", &self.codec_name)?;
        ensure_ident("encodable marker", &self.markers.encodable)?;
        ensure_ident("serializer marker", &self.markers.serializer)?;
        ensure_ident("deserializer marker", &self.markers.deserializer)?;
        ensure_ident("serialize method", &self.contract.serialize_method)?;
        ensure_ident("deserialize constructor", &self.contract.deserialize_constructor)?;
        ensure_ident("map type name", &self.contract.map_type_name)?;

        syn::parse_str::<syn::Path>(&self.crate_prefix)
            .map_err(|err| anyhow::anyhow!("crate prefix {:?} is not a path: {err}", self.crate_prefix))?;
        syn::parse_str::<syn::Type>(&self.map_type)
            .map_err(|err| anyhow::anyhow!("map type {:?} is not a type: {err}", self.map_type))?;

        Ok(())
    }

    pub fn source_root_path(&self) -> PathBuf {
        self.resolve_path(&self.source_root)
    }

    pub fn output_dir_path(&self) -> PathBuf {
        self.resolve_path(&self.output_dir)
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir_path().join(&self.output_file)
    }

    pub fn resolve_path<P: AsRef<Path>>(&self, relative: P) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.base_dir.join(relative)
        }
    }

    pub fn emitter_config(&self) -> EmitterConfig {
        EmitterConfig {
            codec_name: self.codec_name.clone(),
            map_type: self.map_type.clone(),
            deserialize_constructor: self.contract.deserialize_constructor.clone(),
        }
    }
}

fn ensure_ident(what: &str, value: &str) -> Result<()> {
    syn::parse_str::<syn::Ident>(value)
        .map(|_| ())
        .map_err(|_| anyhow::anyhow!("{what} {value:?} is not a valid Rust identifier"))
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "codec-registry-gen",
    about = "Generate a codec registry from #[encodable] declarations",
    version
)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML, JSON or TOML)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "CODEC_REGISTRY_BASE_DIR",
        value_name = "DIR",
        help = "Project directory that include/exclude patterns are relative to"
    )]
    pub base_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "CODEC_REGISTRY_SOURCE_ROOT",
        value_name = "DIR",
        help = "Crate source root used to derive module paths"
    )]
    pub source_root: Option<PathBuf>,

    #[arg(
        long,
        env = "CODEC_REGISTRY_INCLUDE",
        value_name = "GLOB",
        value_delimiter = ',',
        help = "Comma-separated include globs"
    )]
    pub include: Option<Vec<String>>,

    #[arg(
        long,
        env = "CODEC_REGISTRY_EXCLUDE",
        value_name = "GLOB",
        value_delimiter = ',',
        help = "Comma-separated exclude globs"
    )]
    pub exclude: Option<Vec<String>>,

    #[arg(
        long,
        env = "CODEC_REGISTRY_OUTPUT_DIR",
        value_name = "DIR",
        help = "Directory receiving the generated registry"
    )]
    pub output_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "CODEC_REGISTRY_OUTPUT_FILE",
        value_name = "NAME",
        help = "File name of the generated registry"
    )]
    pub output_file: Option<String>,

    #[arg(
        long,
        env = "CODEC_REGISTRY_CODEC_NAME",
        value_name = "NAME",
        help = "Name of the generated codec type"
    )]
    pub codec_name: Option<String>,

    #[arg(
        long,
        env = "CODEC_REGISTRY_MAP_TYPE",
        value_name = "TYPE",
        help = "Full map type used by the generated factories"
    )]
    pub map_type: Option<String>,

    #[arg(
        long,
        env = "CODEC_REGISTRY_CRATE_PREFIX",
        value_name = "PATH",
        help = "Path prefix for generated imports"
    )]
    pub crate_prefix: Option<String>,

    #[arg(
        long,
        conflicts_with = "dry_run",
        help = "Fail when the registry on disk is out of date instead of writing it"
    )]
    pub check: bool,

    #[arg(long, help = "Print the registry to stdout instead of writing it")]
    pub dry_run: bool,

    #[arg(long, help = "Print the run report as JSON")]
    pub report_json: bool,
}

impl CliArgs {
    pub fn mode(&self) -> RunMode {
        if self.check {
            RunMode::Check
        } else if self.dry_run {
            RunMode::DryRun
        } else {
            RunMode::Write
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialMarkers {
    encodable: Option<String>,
    serializer: Option<String>,
    deserializer: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialConfig {
    base_dir: Option<PathBuf>,
    source_root: Option<PathBuf>,
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    source_sets: Option<Vec<SourceSet>>,
    output_dir: Option<PathBuf>,
    output_file: Option<String>,
    codec_name: Option<String>,
    map_type: Option<String>,
    crate_prefix: Option<String>,
    serialize_method: Option<String>,
    deserialize_constructor: Option<String>,
    map_type_name: Option<String>,
    markers: Option<PartialMarkers>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let mut parsed: PartialConfig = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        "toml" => toml::from_str(&contents)
            .with_context(|| format!("failed to parse TOML config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };

    // A relative base directory in a config file is relative to that file.
    if let Some(base_dir) = parsed.base_dir.take() {
        let anchored = match path.parent() {
            Some(parent) if base_dir.is_relative() => parent.join(base_dir),
            _ => base_dir,
        };
        parsed.base_dir = Some(anchored);
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = GeneratorConfig::merge(CliArgs::default(), PartialConfig::default());
        assert_eq!(config, GeneratorConfig::default());
        assert_eq!(config.output_path(), PathBuf::from("./src/generated/codec.g.rs"));
        assert_eq!(config.source_sets, vec![SourceSet::default()]);
    }

    #[test]
    fn test_cli_overrides_file() {
        let args = CliArgs {
            codec_name: Some("RouteCodec".to_string()),
            include: Some(vec!["lib/**/*.rs".to_string()]),
            ..CliArgs::default()
        };
        let file = PartialConfig {
            codec_name: Some("FileCodec".to_string()),
            output_file: Some("routes.g.rs".to_string()),
            exclude: Some(vec!["src/legacy/**".to_string()]),
            ..PartialConfig::default()
        };

        let config = GeneratorConfig::merge(args, file);

        assert_eq!(config.codec_name, "RouteCodec");
        assert_eq!(config.output_file, "routes.g.rs");
        assert_eq!(
            config.source_sets,
            vec![SourceSet {
                include: vec!["lib/**/*.rs".to_string()],
                exclude: Vec::new(),
            }]
        );
    }

    #[test]
    fn test_yaml_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("codegen.yaml");
        fs::write(
            &path,
            r#"
base_dir: project
codec_name: RouteCodec
serialize_method: encode
markers:
  encodable: route_data
source_sets:
  - include: ["src/**/*.rs"]
    exclude: ["src/tests/**"]
  - include: ["shared/**/*.rs"]
"#,
        )
        .unwrap();

        let args = CliArgs {
            config: Some(path),
            ..CliArgs::default()
        };
        let config = GeneratorConfig::from_args(&args).unwrap();

        assert_eq!(config.base_dir, dir.path().join("project"));
        assert_eq!(config.codec_name, "RouteCodec");
        assert_eq!(config.contract.serialize_method, "encode");
        assert_eq!(config.contract.deserialize_constructor, "from_map");
        assert_eq!(config.markers.encodable, "route_data");
        assert_eq!(config.markers.serializer, "codec_serializer");
        assert_eq!(config.source_sets.len(), 2);
        assert!(config.source_sets[1].exclude.is_empty());
    }

    #[test]
    fn test_toml_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("codegen.toml");
        fs::write(
            &path,
            "output_file = \"registry.g.rs\"\ninclude = [\"src/models/**\"]\n",
        )
        .unwrap();

        let args = CliArgs {
            config: Some(path),
            ..CliArgs::default()
        };
        let config = GeneratorConfig::from_args(&args).unwrap();

        assert_eq!(config.output_file, "registry.g.rs");
        assert_eq!(config.source_sets[0].include, vec!["src/models/**".to_string()]);
    }

    #[test]
    fn test_unsupported_config_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("codegen.ini");
        fs::write(&path, "x=1").unwrap();
        let args = CliArgs {
            config: Some(path),
            ..CliArgs::default()
        };
        let err = GeneratorConfig::from_args(&args).unwrap_err();
        assert!(err.to_string().contains("unsupported config extension"));
    }

    #[test]
    fn test_validate_accepts_defaults_on_existing_dir() {
        let dir = TempDir::new().unwrap();
        GeneratorConfig::for_base_dir(dir.path()).validate().unwrap();
    }

    #[test]
    fn test_validate_accepts_output_dir_beside_or_inside_source_root() {
        let dir = TempDir::new().unwrap();
        for output_dir in ["src/codec", "generated", "."] {
            let config = GeneratorConfig {
                output_dir: PathBuf::from(output_dir),
                ..GeneratorConfig::for_base_dir(dir.path())
            };
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        let base = GeneratorConfig::for_base_dir(dir.path());

        let cases: Vec<(GeneratorConfig, &str)> = vec![
            (
                GeneratorConfig {
                    codec_name: "App Codec".to_string(),
                    ..base.clone()
                },
                "codec name",
            ),
            (
                GeneratorConfig {
                    output_file: "codec.txt".to_string(),
                    ..base.clone()
                },
                "must end with .rs",
            ),
            (
                GeneratorConfig {
                    output_file: "nested/codec.rs".to_string(),
                    ..base.clone()
                },
                "bare file name",
            ),
            (
                GeneratorConfig {
                    map_type: "HashMap<".to_string(),
                    ..base.clone()
                },
                "map type",
            ),
            (
                GeneratorConfig {
                    source_sets: vec![SourceSet {
                        include: Vec::new(),
                        exclude: Vec::new(),
                    }],
                    ..base.clone()
                },
                "no include patterns",
            ),
            (
                GeneratorConfig {
                    output_dir: PathBuf::from("src"),
                    output_file: "codec_registry.rs".to_string(),
                    ..base.clone()
                },
                "contains the source root",
            ),
            (
                GeneratorConfig {
                    base_dir: dir.path().join("missing"),
                    ..base.clone()
                },
                "does not exist",
            ),
        ];

        for (config, expected) in cases {
            let err = config.validate().unwrap_err();
            assert!(
                format!("{err:#}").contains(expected),
                "expected {expected:?} in {err:#}"
            );
        }
    }

    #[test]
    fn test_mode_from_flags() {
        assert_eq!(CliArgs::default().mode(), RunMode::Write);
        let check = CliArgs {
            check: true,
            ..CliArgs::default()
        };
        assert_eq!(check.mode(), RunMode::Check);
        let dry = CliArgs {
            dry_run: true,
            ..CliArgs::default()
        };
        assert_eq!(dry.mode(), RunMode::DryRun);
    }

    #[test]
    fn test_cli_parses_comma_separated_globs() {
        let args = CliArgs::try_parse_from([
            "codec-registry-gen",
            "--include",
            "src/a/**,src/b/**",
            "--check",
        ])
        .unwrap();
        assert_eq!(
            args.include,
            Some(vec!["src/a/**".to_string(), "src/b/**".to_string()])
        );
        assert!(args.check);
    }
}
