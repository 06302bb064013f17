//! Registry emitter.
//!
//! Turns an [`AggregationResult`] into the source text of the generated
//! registry. Output is a pure function of the result, the emitter settings and
//! the supplied timestamp: declarations are sorted by name (then module)
//! before keys are derived, and imports are grouped per module in
//! lexicographic order, so identical input always renders identical bytes.

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error as _;

use chrono::{DateTime, SecondsFormat, Utc};
use heck::ToShoutySnakeCase;
use serde::Serialize;
use tera::{Context, Tera};

use super::aggregate::{AggregationResult, OverrideBinding};
use super::contract::{CandidateDeclaration, DEFAULT_DESERIALIZE_CONSTRUCTOR};
use crate::error::{CodegenError, Result};

pub const DEFAULT_CODEC_NAME: &str = "AppCodec";
pub const DEFAULT_MAP_TYPE: &str = "HashMap<String, serde_json::Value>";
pub const GENERATOR_NAME: &str = "codec-registry-gen";

const TEMPLATE_NAME: &str = "registry.rs";
const TEMPLATE: &str = include_str!("templates/registry.rs.tera");

/// Header line carrying the render timestamp.
const GENERATED_AT_PREFIX: &str = "// Generated at: ";

const FALLBACK_ENCODER: &str = "PassThroughEncoder";
const FALLBACK_DECODER: &str = "PassThroughDecoder";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitterConfig {
    pub codec_name: String,
    /// Full map type behind the `EncodableMap` alias.
    pub map_type: String,
    pub deserialize_constructor: String,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            codec_name: DEFAULT_CODEC_NAME.to_string(),
            map_type: DEFAULT_MAP_TYPE.to_string(),
            deserialize_constructor: DEFAULT_DESERIALIZE_CONSTRUCTOR.to_string(),
        }
    }
}

/// Two declarations that resolved to the same registry key. The later one in
/// sorted order wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCollision {
    pub key: String,
    pub kept: String,
    pub shadowed: String,
}

#[derive(Debug, Clone)]
pub struct RenderedRegistry {
    pub source: String,
    pub collisions: Vec<KeyCollision>,
}

#[derive(Serialize)]
struct RegistryContext<'a> {
    generator: &'a str,
    generated_at: String,
    declaration_count: usize,
    module_count: usize,
    imports: Vec<String>,
    map_type: &'a str,
    codec_name: &'a str,
    instance_name: String,
    deserialize_constructor: &'a str,
    entries: Vec<EntryContext>,
    encoder: ConverterContext,
    decoder: ConverterContext,
}

#[derive(Serialize)]
struct EntryContext {
    /// Rust string literal of the registry key.
    key: String,
    type_name: String,
}

#[derive(Serialize)]
struct ConverterContext {
    type_name: String,
    expr: String,
    fallback: bool,
}

impl ConverterContext {
    fn resolve(binding: Option<&OverrideBinding>, fallback: &str) -> Self {
        match binding {
            Some(binding) => Self {
                type_name: binding.name.clone(),
                expr: format!("{}::default()", binding.name),
                fallback: false,
            },
            None => Self {
                type_name: fallback.to_string(),
                expr: fallback.to_string(),
                fallback: true,
            },
        }
    }
}

pub struct RegistryEmitter {
    config: EmitterConfig,
    tera: Tera,
}

impl RegistryEmitter {
    pub fn new(config: EmitterConfig) -> Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());
        tera.add_raw_template(TEMPLATE_NAME, TEMPLATE)
            .map_err(|err| CodegenError::Template(err.to_string()))?;
        Ok(Self { config, tera })
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    /// Render the registry source. Refuses an empty result.
    pub fn render(
        &self,
        result: &AggregationResult,
        generated_at: DateTime<Utc>,
    ) -> Result<RenderedRegistry> {
        if result.is_empty() {
            return Err(CodegenError::EmptyRegistry);
        }

        let candidates = sorted_candidates(&result.candidates);
        let collisions = find_collisions(&candidates);

        let imports = import_lines(
            &candidates,
            [result.serializer.as_ref(), result.deserializer.as_ref()],
        );
        let module_count = candidates
            .iter()
            .map(|c| c.module())
            .collect::<BTreeSet<_>>()
            .len();

        let context = RegistryContext {
            generator: GENERATOR_NAME,
            generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            declaration_count: candidates.len(),
            module_count,
            imports,
            map_type: &self.config.map_type,
            codec_name: &self.config.codec_name,
            instance_name: self.config.codec_name.to_shouty_snake_case(),
            deserialize_constructor: &self.config.deserialize_constructor,
            entries: candidates
                .iter()
                .map(|c| EntryContext {
                    key: format!("{:?}", c.registry_key()),
                    type_name: c.name().to_string(),
                })
                .collect(),
            encoder: ConverterContext::resolve(result.serializer.as_ref(), FALLBACK_ENCODER),
            decoder: ConverterContext::resolve(result.deserializer.as_ref(), FALLBACK_DECODER),
        };

        let context = Context::from_serialize(&context)
            .map_err(|err| CodegenError::Template(err.to_string()))?;
        let source = self
            .tera
            .render(TEMPLATE_NAME, &context)
            .map_err(|err| CodegenError::Template(render_error_chain(&err)))?;

        syn::parse_file(&source).map_err(|err| CodegenError::RenderedInvalid(err.to_string()))?;

        Ok(RenderedRegistry { source, collisions })
    }
}

/// Timestamp recorded in the header of a previously rendered registry.
pub fn generated_at(source: &str) -> Option<DateTime<Utc>> {
    source
        .lines()
        .take(3)
        .find_map(|line| line.strip_prefix(GENERATED_AT_PREFIX))
        .and_then(|stamp| DateTime::parse_from_rfc3339(stamp.trim()).ok())
        .map(|stamp| stamp.with_timezone(&Utc))
}

fn sorted_candidates(candidates: &[CandidateDeclaration]) -> Vec<&CandidateDeclaration> {
    let mut sorted: Vec<_> = candidates.iter().collect();
    sorted.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.module().cmp(b.module())));
    sorted
}

fn find_collisions(sorted: &[&CandidateDeclaration]) -> Vec<KeyCollision> {
    let mut owners: BTreeMap<&str, &CandidateDeclaration> = BTreeMap::new();
    let mut collisions = Vec::new();
    for &candidate in sorted {
        if let Some(previous) = owners.insert(candidate.registry_key(), candidate) {
            collisions.push(KeyCollision {
                key: candidate.registry_key().to_string(),
                kept: qualified(candidate.module(), candidate.name()),
                shadowed: qualified(previous.module(), previous.name()),
            });
        }
    }
    collisions
}

/// One `use module::{A, B};` line per module, modules and names sorted.
fn import_lines<'a>(
    candidates: &[&'a CandidateDeclaration],
    overrides: [Option<&'a OverrideBinding>; 2],
) -> Vec<String> {
    let mut modules: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for candidate in candidates {
        modules
            .entry(candidate.module())
            .or_default()
            .insert(candidate.name());
    }
    for binding in overrides.into_iter().flatten() {
        modules
            .entry(binding.module.as_str())
            .or_default()
            .insert(binding.name.as_str());
    }

    modules
        .into_iter()
        .map(|(module, names)| {
            let names = names.into_iter().collect::<Vec<_>>();
            if let [single] = names.as_slice() {
                format!("use {module}::{single};")
            } else {
                format!("use {module}::{{{}}};", names.join(", "))
            }
        })
        .collect()
}

fn qualified(module: &str, name: &str) -> String {
    format!("{module}::{name}")
}

fn render_error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
