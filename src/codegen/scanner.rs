//! Declaration scanner.
//!
//! Parses one Rust source file with `syn` and reports which top-level
//! `struct`/`enum` items carry the encodable, serializer and deserializer
//! markers, together with the function shapes exposed by their inherent impl
//! blocks in the same file. The scanner never judges a declaration; that is
//! the contract validator's job.

use std::collections::HashMap;
use std::path::{Component, Path};

use quote::ToTokens;
use serde::{Deserialize, Serialize};
use syn::{Attribute, FnArg, ImplItem, Item, ReturnType, Type};

pub const DEFAULT_ENCODABLE_MARKER: &str = "encodable";
pub const DEFAULT_SERIALIZER_MARKER: &str = "codec_serializer";
pub const DEFAULT_DESERIALIZER_MARKER: &str = "codec_deserializer";

/// Attribute names recognised as markers. Matching uses the last path
/// segment, so `#[encodable]` and `#[codec::encodable]` are equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerNames {
    pub encodable: String,
    pub serializer: String,
    pub deserializer: String,
}

impl Default for MarkerNames {
    fn default() -> Self {
        Self {
            encodable: DEFAULT_ENCODABLE_MARKER.to_string(),
            serializer: DEFAULT_SERIALIZER_MARKER.to_string(),
            deserializer: DEFAULT_DESERIALIZER_MARKER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Struct,
    Enum,
}

/// Printed shape of one function found in an inherent impl block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnShape {
    pub name: String,
    /// True when the function takes `self` in any form.
    pub has_receiver: bool,
    /// Printed types of the non-receiver inputs.
    pub inputs: Vec<String>,
    /// Printed return type, `None` for `()`.
    pub output: Option<String>,
}

/// A marker-tagged top-level declaration, not yet validated.
#[derive(Debug, Clone)]
pub struct ScannedDeclaration {
    pub name: String,
    pub kind: DeclarationKind,
    /// The encodable marker attribute, if the declaration carries one.
    pub encodable: Option<Attribute>,
    pub serializer: bool,
    pub deserializer: bool,
    /// Printed generic parameter list, e.g. `<T>`, when the declaration has one.
    pub generics: Option<String>,
    pub functions: Vec<FnShape>,
}

impl ScannedDeclaration {
    pub fn function(&self, name: &str) -> Option<&FnShape> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Everything the scanner found in one compilation unit.
#[derive(Debug, Clone, Default)]
pub struct FileDeclarations {
    pub declarations: Vec<ScannedDeclaration>,
}

impl FileDeclarations {
    pub fn encodables(&self) -> impl Iterator<Item = &ScannedDeclaration> {
        self.declarations.iter().filter(|d| d.encodable.is_some())
    }

    pub fn serializers(&self) -> impl Iterator<Item = &ScannedDeclaration> {
        self.declarations.iter().filter(|d| d.serializer)
    }

    pub fn deserializers(&self) -> impl Iterator<Item = &ScannedDeclaration> {
        self.declarations.iter().filter(|d| d.deserializer)
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Scanned(FileDeclarations),
    /// The input is not a compilation unit the scanner understands.
    NotApplicable(String),
}

#[derive(Debug, Clone, Default)]
pub struct DeclarationScanner {
    markers: MarkerNames,
}

impl DeclarationScanner {
    pub fn new(markers: MarkerNames) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &MarkerNames {
        &self.markers
    }

    pub fn scan_source(&self, source: &str) -> ScanOutcome {
        let file = match syn::parse_file(source) {
            Ok(file) => file,
            Err(err) => return ScanOutcome::NotApplicable(format!("not valid Rust: {err}")),
        };

        let mut impls: HashMap<String, Vec<FnShape>> = HashMap::new();
        for item in &file.items {
            if let Item::Impl(block) = item
                && block.trait_.is_none()
                && let Some(owner) = self_type_name(&block.self_ty)
            {
                let shapes = impls.entry(owner).or_default();
                shapes.extend(block.items.iter().filter_map(|item| match item {
                    ImplItem::Fn(f) => Some(fn_shape(&f.sig)),
                    _ => None,
                }));
            }
        }

        let mut declarations = Vec::new();
        for item in &file.items {
            let (ident, attrs, generics, kind) = match item {
                Item::Struct(s) => (&s.ident, &s.attrs, &s.generics, DeclarationKind::Struct),
                Item::Enum(e) => (&e.ident, &e.attrs, &e.generics, DeclarationKind::Enum),
                _ => continue,
            };

            let encodable = attrs
                .iter()
                .find(|attr| is_marker(attr, &self.markers.encodable))
                .cloned();
            let serializer = attrs.iter().any(|a| is_marker(a, &self.markers.serializer));
            let deserializer = attrs.iter().any(|a| is_marker(a, &self.markers.deserializer));
            if encodable.is_none() && !serializer && !deserializer {
                continue;
            }

            let name = ident.to_string();
            let functions = impls.get(&name).cloned().unwrap_or_default();
            declarations.push(ScannedDeclaration {
                name,
                kind,
                encodable,
                serializer,
                deserializer,
                generics: (!generics.params.is_empty())
                    .then(|| generics.to_token_stream().to_string().replace(' ', "")),
                functions,
            });
        }

        ScanOutcome::Scanned(FileDeclarations { declarations })
    }
}

fn is_marker(attr: &Attribute, marker: &str) -> bool {
    attr.path()
        .segments
        .last()
        .is_some_and(|segment| segment.ident == marker)
}

/// Name of the impl target when it is a bare local name. `impl other::Alpha`
/// belongs to a different type and is skipped.
fn self_type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path)
            if path.qself.is_none()
                && path.path.leading_colon.is_none()
                && path.path.segments.len() == 1 =>
        {
            path.path.segments.first().map(|s| s.ident.to_string())
        }
        _ => None,
    }
}

fn fn_shape(sig: &syn::Signature) -> FnShape {
    let mut has_receiver = false;
    let mut inputs = Vec::new();
    for input in &sig.inputs {
        match input {
            FnArg::Receiver(_) => has_receiver = true,
            FnArg::Typed(pat) => inputs.push(printed_type(&pat.ty)),
        }
    }
    let output = match &sig.output {
        ReturnType::Default => None,
        ReturnType::Type(_, ty) => Some(printed_type(ty)),
    };
    FnShape {
        name: sig.ident.to_string(),
        has_receiver,
        inputs,
        output,
    }
}

/// Token form of a type with all whitespace removed, e.g.
/// `HashMap<String,Value>`.
pub fn printed_type(ty: &Type) -> String {
    ty.to_token_stream()
        .to_string()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Module path of a source file relative to the crate source root.
///
/// `lib.rs` and `main.rs` map to the crate root, `a/mod.rs` to `a`, and
/// `a/b.rs` to `a::b`. Returns `None` when the file lies outside the root or
/// a component is not a Rust identifier.
pub fn module_path_for(source_root: &Path, file: &Path, crate_prefix: &str) -> Option<String> {
    let relative = file.strip_prefix(source_root).ok()?;
    if relative.extension().is_none_or(|ext| ext != "rs") {
        return None;
    }

    let mut segments = Vec::new();
    for component in relative.with_extension("").components() {
        match component {
            Component::Normal(part) => segments.push(part.to_str()?.to_string()),
            _ => return None,
        }
    }

    let is_root_file = segments.len() == 1 && matches!(segments[0].as_str(), "lib" | "main");
    if is_root_file || segments.last().is_some_and(|last| last == "mod") {
        segments.pop();
    }

    if segments
        .iter()
        .any(|s| syn::parse_str::<syn::Ident>(s).is_err())
    {
        return None;
    }

    let mut path = crate_prefix.to_string();
    for segment in segments {
        path.push_str("::");
        path.push_str(&segment);
    }
    Some(path)
}
