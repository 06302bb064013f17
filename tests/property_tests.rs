//! Property tests for key resolution, the map-type predicate and module paths.

use std::path::Path;

use codec_registry_gen::codegen::contract::{is_map_like, registry_key};
use codec_registry_gen::codegen::scanner::module_path_for;
use proptest::prelude::*;

fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}".prop_filter("keywords are not module names", |s| {
        syn::parse_str::<syn::Ident>(s).is_ok()
    })
}

proptest! {
    #[test]
    fn test_empty_custom_key_falls_back_to_declared_name(name in "[A-Z][A-Za-z0-9]{0,12}") {
        prop_assert_eq!(registry_key(&name, ""), name.as_str());
    }

    #[test]
    fn test_non_empty_custom_key_wins(name in "[A-Z][A-Za-z0-9]{0,12}", key in ".{1,16}") {
        prop_assert_eq!(registry_key(&name, &key), key.as_str());
    }

    #[test]
    fn test_map_prefix_is_accepted(suffix in "[<>A-Za-z0-9_:, ]{0,24}") {
        let printed = format!("HashMap{suffix}");
        prop_assert!(is_map_like(&printed, "HashMap"));
    }

    #[test]
    fn test_other_prefixes_are_rejected(prefix in "[A-GI-Z][A-Za-z]{0,8}", suffix in "[<>A-Za-z]{0,8}") {
        let printed = format!("{prefix}{suffix}");
        prop_assert!(!is_map_like(&printed, "HashMap"));
    }

    #[test]
    fn test_module_path_mirrors_directory_layout(segments in prop::collection::vec(ident(), 1..4)) {
        let root = Path::new("/project/src");
        let mut file = root.to_path_buf();
        for segment in &segments {
            file.push(segment);
        }
        file.set_extension("rs");

        let module = module_path_for(root, &file, "crate");

        // `lib`, `main` and `mod` collapse into their parent.
        let mut expected: Vec<&str> = segments.iter().map(String::as_str).collect();
        let collapses = match expected.as_slice() {
            [only] => matches!(*only, "lib" | "main" | "mod"),
            [.., last] => *last == "mod",
            [] => false,
        };
        if collapses {
            expected.pop();
        }
        let expected = std::iter::once("crate")
            .chain(expected)
            .collect::<Vec<_>>()
            .join("::");
        prop_assert_eq!(module, Some(expected));
    }
}
