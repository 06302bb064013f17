//! Structural contract for encodable declarations.
//!
//! An encodable declaration must expose
//!
//! 1. an instance method (takes `self`) with no other inputs, named after the
//!    serialize method, whose return type prints as a map type, and
//! 2. an associated constructor without receiver, named after the deserialize
//!    constructor, taking exactly one input whose type prints as a map type.
//!
//! "Prints as a map type" is a deliberate string-prefix check on the printed
//! type (see [`is_map_like`]). No type resolution happens here: an aliased map
//! or a fully qualified `std::collections::HashMap` does not qualify.

use std::fmt;

use quote::ToTokens;
use serde::{Deserialize, Serialize};
use syn::{Expr, ExprLit, Lit, LitStr, Meta, MetaNameValue};
use thiserror::Error;

use super::scanner::{FnShape, ScannedDeclaration};

pub const DEFAULT_SERIALIZE_METHOD: &str = "to_map";
pub const DEFAULT_DESERIALIZE_CONSTRUCTOR: &str = "from_map";
pub const DEFAULT_MAP_TYPE_NAME: &str = "HashMap";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    pub serialize_method: String,
    pub deserialize_constructor: String,
    pub map_type_name: String,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            serialize_method: DEFAULT_SERIALIZE_METHOD.to_string(),
            deserialize_constructor: DEFAULT_DESERIALIZE_CONSTRUCTOR.to_string(),
            map_type_name: DEFAULT_MAP_TYPE_NAME.to_string(),
        }
    }
}

/// Loose map check: the printed type starts with the map type name.
pub fn is_map_like(printed: &str, map_type_name: &str) -> bool {
    printed.starts_with(map_type_name)
}

/// Key under which a declaration is registered.
pub fn registry_key<'a>(declared_name: &'a str, custom_key: &'a str) -> &'a str {
    if custom_key.is_empty() {
        declared_name
    } else {
        custom_key
    }
}

/// Identity of a declaration across the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeclarationId {
    pub name: String,
    pub module: String,
}

/// An encodable declaration that satisfied the contract.
///
/// Only [`ContractValidator::validate`] constructs these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateDeclaration {
    name: String,
    module: String,
    custom_key: String,
}

impl CandidateDeclaration {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module path of the owning file, also used as the import target.
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn custom_key(&self) -> &str {
        &self.custom_key
    }

    pub fn registry_key(&self) -> &str {
        registry_key(&self.name, &self.custom_key)
    }

    pub fn id(&self) -> DeclarationId {
        DeclarationId {
            name: self.name.clone(),
            module: self.module.clone(),
        }
    }
}

/// Which half of the contract a violation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractHalf {
    Serialize,
    Deserialize,
    Marker,
    Declaration,
}

impl fmt::Display for ContractHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractHalf::Serialize => f.write_str("serialize method"),
            ContractHalf::Deserialize => f.write_str("deserialize constructor"),
            ContractHalf::Marker => f.write_str("marker argument"),
            ContractHalf::Declaration => f.write_str("declaration shape"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("missing serialize method `{method}(&self)`")]
    MissingSerializeMethod { method: String },

    #[error("serialize method `{method}` {problem}")]
    SerializeShape { method: String, problem: String },

    #[error("missing deserialize constructor `{constructor}(map)`")]
    MissingDeserializeConstructor { constructor: String },

    #[error("deserialize constructor `{constructor}` {problem}")]
    DeserializeShape { constructor: String, problem: String },

    #[error("marker argument must be a string literal or `name = \"..\"`, found `{0}`")]
    InvalidMarkerArgument(String),

    /// The generated factory names the bare type, which cannot infer parameters.
    #[error("generic declarations cannot be registered, found parameters `{0}`")]
    GenericDeclaration(String),
}

impl ContractViolation {
    pub fn half(&self) -> ContractHalf {
        match self {
            ContractViolation::MissingSerializeMethod { .. }
            | ContractViolation::SerializeShape { .. } => ContractHalf::Serialize,
            ContractViolation::MissingDeserializeConstructor { .. }
            | ContractViolation::DeserializeShape { .. } => ContractHalf::Deserialize,
            ContractViolation::InvalidMarkerArgument(_) => ContractHalf::Marker,
            ContractViolation::GenericDeclaration(_) => ContractHalf::Declaration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub declaration: String,
    pub violations: Vec<ContractViolation>,
}

impl Rejection {
    pub fn halves(&self) -> Vec<ContractHalf> {
        let mut halves: Vec<_> = self.violations.iter().map(|v| v.half()).collect();
        halves.dedup();
        halves
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.declaration)?;
        for (idx, violation) in self.violations.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// Verdict for one scanned declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Qualifies(CandidateDeclaration),
    Rejected(Rejection),
    /// The declaration does not carry the encodable marker.
    NotApplicable,
}

#[derive(Debug, Clone, Default)]
pub struct ContractValidator {
    config: ContractConfig,
}

impl ContractValidator {
    pub fn new(config: ContractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    /// Judge one declaration found in the module `module`.
    pub fn validate(&self, declaration: &ScannedDeclaration, module: &str) -> Verdict {
        let Some(marker) = declaration.encodable.as_ref() else {
            return Verdict::NotApplicable;
        };

        let serialize = declaration.function(&self.config.serialize_method);
        let deserialize = declaration.function(&self.config.deserialize_constructor);

        let mut violations = Vec::new();
        if let Some(params) = &declaration.generics {
            violations.push(ContractViolation::GenericDeclaration(params.clone()));
        }
        if let Err(violation) = self.check_serialize(serialize) {
            violations.push(violation);
        }
        if let Err(violation) = self.check_deserialize(deserialize) {
            violations.push(violation);
        }

        let custom_key = match custom_key(&marker.meta) {
            Ok(key) => key,
            Err(violation) => {
                violations.push(violation);
                String::new()
            }
        };

        if !violations.is_empty() {
            return Verdict::Rejected(Rejection {
                declaration: declaration.name.clone(),
                violations,
            });
        }

        Verdict::Qualifies(CandidateDeclaration {
            name: declaration.name.clone(),
            module: module.to_string(),
            custom_key,
        })
    }

    fn check_serialize(&self, shape: Option<&FnShape>) -> Result<(), ContractViolation> {
        let method = &self.config.serialize_method;
        let Some(shape) = shape else {
            return Err(ContractViolation::MissingSerializeMethod {
                method: method.clone(),
            });
        };
        let shape_error = |problem: String| ContractViolation::SerializeShape {
            method: method.clone(),
            problem,
        };

        if !shape.has_receiver {
            return Err(shape_error("is static, expected an instance method".to_string()));
        }
        if !shape.inputs.is_empty() {
            return Err(shape_error(format!(
                "takes {} argument(s), expected none",
                shape.inputs.len()
            )));
        }
        match shape.output.as_deref() {
            Some(output) if is_map_like(output, &self.config.map_type_name) => Ok(()),
            Some(output) => Err(shape_error(format!(
                "returns `{output}`, expected a {} value",
                self.config.map_type_name
            ))),
            None => Err(shape_error(format!(
                "returns nothing, expected a {} value",
                self.config.map_type_name
            ))),
        }
    }

    fn check_deserialize(&self, shape: Option<&FnShape>) -> Result<(), ContractViolation> {
        let constructor = &self.config.deserialize_constructor;
        let Some(shape) = shape else {
            return Err(ContractViolation::MissingDeserializeConstructor {
                constructor: constructor.clone(),
            });
        };
        let shape_error = |problem: String| ContractViolation::DeserializeShape {
            constructor: constructor.clone(),
            problem,
        };

        if shape.has_receiver {
            return Err(shape_error("takes `self`, expected an associated constructor".to_string()));
        }
        match shape.inputs.as_slice() {
            [input] if is_map_like(input, &self.config.map_type_name) => Ok(()),
            [input] => Err(shape_error(format!(
                "takes `{input}`, expected a {} parameter",
                self.config.map_type_name
            ))),
            inputs => Err(shape_error(format!(
                "takes {} parameter(s), expected exactly one",
                inputs.len()
            ))),
        }
    }
}

/// Custom registry key from the marker: `#[m]`, `#[m()]`, `#[m("key")]`,
/// `#[m(name = "key")]` or `#[m = "key"]`. Absent means empty.
fn custom_key(meta: &Meta) -> Result<String, ContractViolation> {
    let invalid = || ContractViolation::InvalidMarkerArgument(meta.to_token_stream().to_string());
    match meta {
        Meta::Path(_) => Ok(String::new()),
        Meta::List(list) if list.tokens.is_empty() => Ok(String::new()),
        Meta::List(list) => {
            if let Ok(lit) = list.parse_args::<LitStr>() {
                return Ok(lit.value());
            }
            let pair = list.parse_args::<MetaNameValue>().map_err(|_| invalid())?;
            if !pair.path.is_ident("name") {
                return Err(invalid());
            }
            string_value(&pair.value).ok_or_else(invalid)
        }
        Meta::NameValue(pair) => string_value(&pair.value).ok_or_else(invalid),
    }
}

fn string_value(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(lit), ..
        }) => Some(lit.value()),
        _ => None,
    }
}
