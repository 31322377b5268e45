// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Property-based tests for the section model and path resolution.
//!
//! These tests verify that:
//! 1. Rendering a document in any style and parsing it back keeps every
//!    section, key, value and trailing comment
//! 2. Key and section lookups ignore case
//! 3. Spelling a resolved reference relative to its anchor resolves
//!    back to the same path

use std::path::PathBuf;

use proptest::prelude::*;

use crate::common::canonicalize;
use crate::format::{FormatStyle, render};
use crate::reference::{Anchor, relative_path, resolve};
use crate::section::{Document, Property, Section};
use crate::token::TokenizerOptions;

fn name_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_]{0,10}".prop_map(|s| s.to_string())
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_.]{0,12}".prop_map(|s| s.to_string())
}

fn comment_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[a-z][a-z ]{0,10}[a-z]".prop_map(|s| s.to_string()))
}

fn property_strategy() -> impl Strategy<Value = Property> {
    (name_strategy(), value_strategy(), comment_strategy())
        .prop_map(|(key, value, comment)| Property::new(&key, &value).with_comment(comment.as_deref()))
}

fn section_strategy() -> impl Strategy<Value = Section> {
    (name_strategy(), prop::collection::vec(property_strategy(), 0..6)).prop_map(|(name, props)| {
        let mut section = Section::new(&name);
        for p in props {
            section.add_property(p);
        }
        section
    })
}

fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::vec(section_strategy(), 1..5).prop_map(|sections| Document {
        preamble: vec![],
        sections,
    })
}

fn style_strategy() -> BoxedStrategy<FormatStyle> {
    prop_oneof![
        Just(FormatStyle::Compact),
        Just(FormatStyle::Mdu),
        (0usize..24).prop_map(|w| FormatStyle::Aligned { min_key_width: w }),
    ]
    .boxed()
}

type Flat = Vec<(String, Vec<(String, String, Option<String>)>)>;

fn flatten(doc: &Document) -> Flat {
    doc.sections
        .iter()
        .map(|s| {
            let props = s
                .properties()
                .map(|p| {
                    (
                        p.key().to_owned(),
                        p.value().to_owned(),
                        p.comment().map(str::to_owned),
                    )
                })
                .collect();
            (s.name().to_owned(), props)
        })
        .collect()
}

fn raw_path_strategy() -> impl Strategy<Value = String> {
    (
        prop::bool::ANY,
        prop::collection::vec("[a-z][a-z0-9_]{0,6}", 1..4),
        prop::bool::ANY,
    )
        .prop_map(|(up, segments, backslash)| {
            let sep = if backslash { "\\" } else { "/" };
            let joined = segments.join(sep);
            if up { format!("..{sep}{joined}") } else { joined }
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn render_parse_roundtrip(doc in document_strategy(), style in style_strategy()) {
        let text = render(&doc, style);
        let parsed = Document::parse(&text, &TokenizerOptions::INI).unwrap();
        prop_assert_eq!(flatten(&doc), flatten(&parsed));
    }

    #[test]
    fn lookup_ignores_case(section in section_strategy()) {
        for p in section.properties() {
            let first = section.get_property(p.key()).unwrap();
            prop_assert_eq!(
                Some(first.value()),
                section.get(&p.key().to_uppercase())
            );
            prop_assert_eq!(
                Some(first.value()),
                section.get(&p.key().to_lowercase())
            );
        }
        prop_assert!(section.is(&section.name().to_uppercase()));
    }

    #[test]
    fn set_keeps_position(section in section_strategy(), value in value_strategy()) {
        let mut updated = section.clone();
        let keys = section.keys();
        if let Some(first) = keys.first() {
            updated.set(&first.to_uppercase(), &value);
            prop_assert_eq!(keys.clone(), updated.keys());
            prop_assert_eq!(Some(value.as_str()), updated.get(first));
        } else {
            updated.set("NewKey", &value);
            prop_assert_eq!(vec![canonicalize("NewKey")], updated.keys());
        }
    }

    #[test]
    fn resolve_relative_spelling_round_trips(raw in raw_path_strategy()) {
        let anchor = Anchor::SelfAnchored(PathBuf::from("/work/project/model/model.mdu"));
        let once = resolve(&raw, &anchor);
        let twice = resolve(&relative_path(&once, &anchor), &anchor);
        prop_assert_eq!(once, twice);
    }
}
