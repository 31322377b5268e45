// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Ordered, case-insensitive section model.
//!
//! A [`Document`] is an ordered list of [`Section`]s, each holding an
//! ordered list of entries (properties and standalone comments) plus
//! any tabular data rows that followed its properties.  Repeated keys
//! are kept in order: `quantity`/`unit` pairs in a forcing block and
//! repeated `forcingFile` lines in a boundary block depend on it.

use std::fs;
use std::path::Path;

use crate::common::{Result, canonicalize, eq_ignore_case};
use crate::format_err;
use crate::token::{LineKind, TokenizerOptions, tokenize};

/// One `key = value # comment` line.  Properties are never edited in
/// place; updates build a new one with [`Property::with_value`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Property {
    key: String,
    value: String,
    comment: Option<String>,
    line: usize,
}

impl Property {
    pub fn new(key: &str, value: &str) -> Self {
        Property {
            key: key.to_owned(),
            value: value.to_owned(),
            comment: None,
            line: 0,
        }
    }

    pub fn with_comment(self, comment: Option<&str>) -> Self {
        Property {
            comment: comment.map(|c| c.to_owned()),
            ..self
        }
    }

    pub fn with_value(&self, value: &str) -> Self {
        Property {
            value: value.to_owned(),
            ..self.clone()
        }
    }

    pub fn with_key(&self, key: &str) -> Self {
        Property {
            key: key.to_owned(),
            ..self.clone()
        }
    }

    pub fn at_line(self, line: usize) -> Self {
        Property { line, ..self }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// 1-based line the property was read from; 0 when it was built
    /// in memory.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn is(&self, key: &str) -> bool {
        eq_ignore_case(&self.key, key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    Property(Property),
    Comment(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataRow {
    pub line: usize,
    pub text: String,
}

impl DataRow {
    pub fn new(text: &str) -> Self {
        DataRow {
            line: 0,
            text: text.to_owned(),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.text.split([' ', '\t']).filter(|s| !s.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    name: String,
    line: usize,
    entries: Vec<Entry>,
    rows: Vec<DataRow>,
}

impl Section {
    pub fn new(name: &str) -> Self {
        Section {
            name: name.to_owned(),
            line: 0,
            entries: vec![],
            rows: vec![],
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_owned();
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn is(&self, name: &str) -> bool {
        eq_ignore_case(&self.name, name)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Property(p) => Some(p),
            Entry::Comment(_) => None,
        })
    }

    pub fn get_property(&self, key: &str) -> Option<&Property> {
        self.properties().find(|p| p.is(key))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_property(key).map(|p| p.value())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.properties()
            .filter(|p| p.is(key))
            .map(|p| p.value())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get_property(key).is_some()
    }

    /// Update the first property named `key`, keeping its position and
    /// comment, or append a new one if there is none.
    pub fn set(&mut self, key: &str, value: &str) {
        for entry in self.entries.iter_mut() {
            if let Entry::Property(p) = entry {
                if p.is(key) {
                    *entry = Entry::Property(p.with_value(value));
                    return;
                }
            }
        }
        self.add(key, value);
    }

    pub fn add(&mut self, key: &str, value: &str) {
        self.entries.push(Entry::Property(Property::new(key, value)));
    }

    pub fn add_with_comment(&mut self, key: &str, value: &str, comment: Option<&str>) {
        self.entries
            .push(Entry::Property(Property::new(key, value).with_comment(comment)));
    }

    pub fn add_property(&mut self, property: Property) {
        self.entries.push(Entry::Property(property));
    }

    pub fn add_comment(&mut self, text: &str) {
        self.entries.push(Entry::Comment(text.to_owned()));
    }

    /// Remove every property named `key`, returning how many were removed.
    pub fn remove_all(&mut self, key: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| match e {
            Entry::Property(p) => !p.is(key),
            Entry::Comment(_) => true,
        });
        before - self.entries.len()
    }

    /// Rebuild the property list: `f` returns the replacement for each
    /// property, or `None` to drop it.  Comments are kept in place.
    pub fn rebuild<F>(&mut self, mut f: F)
    where
        F: FnMut(&Property) -> Option<Property>,
    {
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries
            .into_iter()
            .filter_map(|e| match e {
                Entry::Property(p) => f(&p).map(Entry::Property),
                comment => Some(comment),
            })
            .collect();
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn push_row(&mut self, row: DataRow) {
        self.rows.push(row);
    }

    pub fn keys(&self) -> Vec<String> {
        self.properties().map(|p| canonicalize(p.key())).collect()
    }
}

/// A whole file: comments before the first header, then sections in
/// file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Document {
    pub preamble: Vec<String>,
    pub sections: Vec<Section>,
}

impl Document {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn parse(text: &str, opts: &TokenizerOptions) -> Result<Document> {
        let lines = tokenize(text, opts)?;
        let mut doc = Document::new();

        for line in lines {
            match line.kind {
                LineKind::SectionHeader(name) => {
                    doc.sections.push(Section::new(&name).at_line(line.number));
                }
                LineKind::Property {
                    key,
                    value,
                    comment,
                } => {
                    let property = Property::new(&key, &value)
                        .with_comment(comment.as_deref())
                        .at_line(line.number);
                    match doc.sections.last_mut() {
                        Some(section) => section.add_property(property),
                        None => {
                            // properties before any header go into an
                            // unnamed leading section
                            let mut section = Section::new("").at_line(line.number);
                            section.add_property(property);
                            doc.sections.push(section);
                        }
                    }
                }
                LineKind::Continuation(text) => {
                    let Some(section) = doc.sections.last_mut() else {
                        return format_err!(
                            InvalidFormattedText,
                            line.number,
                            "continuation line without a property".to_owned()
                        );
                    };
                    let joined = match section.entries.last() {
                        Some(Entry::Property(p)) => {
                            let value = if p.value().is_empty() {
                                text
                            } else {
                                format!("{} {}", p.value(), text)
                            };
                            p.with_value(&value)
                        }
                        _ => {
                            return format_err!(
                                InvalidFormattedText,
                                line.number,
                                "continuation line without a property".to_owned()
                            );
                        }
                    };
                    section.entries.pop();
                    section.add_property(joined);
                }
                LineKind::Comment(text) => match doc.sections.last_mut() {
                    Some(section) => section.add_comment(&text),
                    None => doc.preamble.push(text),
                },
                LineKind::Blank => {}
                LineKind::DataRow(text) => {
                    let Some(section) = doc.sections.last_mut() else {
                        return format_err!(
                            InvalidFormattedText,
                            line.number,
                            format!("data row outside of a section: {text}")
                        );
                    };
                    section.push_row(DataRow {
                        line: line.number,
                        text,
                    });
                }
            }
        }

        Ok(doc)
    }

    pub fn read(path: &Path, opts: &TokenizerOptions) -> Result<Document> {
        let text = fs::read_to_string(path).map_err(|err| {
            crate::common::Error::from(err).at(path, 0)
        })?;
        Document::parse(&text, opts).map_err(|err| err.in_file(path))
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.is(name))
    }

    pub fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.is(name))
    }

    pub fn sections_named<'a, 'b>(
        &'a self,
        name: &'b str,
    ) -> impl Iterator<Item = &'a Section> + use<'a, 'b> {
        self.sections.iter().filter(move |s| s.is(name))
    }

    /// The first section named `name`, appended if it does not exist.
    pub fn section_or_insert(&mut self, name: &str) -> &mut Section {
        let idx = match self.sections.iter().position(|s| s.is(name)) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[idx]
    }

    pub fn add_section(&mut self, section: Section) -> &mut Section {
        self.sections.push(section);
        let last = self.sections.len() - 1;
        &mut self.sections[last]
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    pub fn get_all(&self, section: &str, key: &str) -> Vec<&str> {
        self.sections_named(section)
            .flat_map(|s| s.get_all(key))
            .collect()
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.section_or_insert(section).set(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;

    const BC_TEXT: &str = "[General]
fileVersion = 1.01
fileType    = boundConds

[forcing]
name     = left_0001
function = timeseries
quantity = time
unit     = seconds since 2001-01-01 00:00:00
quantity = waterlevelbnd
unit     = m
0 1.0
60 2.0
";

    fn parse(text: &str) -> Document {
        Document::parse(text, &TokenizerOptions::INI).unwrap()
    }

    #[test]
    fn test_sections_in_order() {
        let doc = parse(BC_TEXT);
        let names: Vec<&str> = doc.sections.iter().map(|s| s.name()).collect();
        assert_eq!(vec!["General", "forcing"], names);
        assert_eq!(5, doc.sections[1].line());
    }

    #[test]
    fn test_get_case_insensitive() {
        let doc = parse(BC_TEXT);
        assert_eq!(Some("1.01"), doc.get("general", "FILEVERSION"));
        assert_eq!(Some("1.01"), doc.get("GENERAL", "fileversion"));
        assert_eq!(None, doc.get("general", "missing"));
    }

    #[test]
    fn test_get_all_keeps_duplicates() {
        let doc = parse(BC_TEXT);
        assert_eq!(vec!["time", "waterlevelbnd"], doc.get_all("forcing", "Quantity"));
        assert_eq!(
            vec!["seconds since 2001-01-01 00:00:00", "m"],
            doc.get_all("forcing", "unit")
        );
    }

    #[test]
    fn test_lookup_name_may_be_temporary() {
        let doc = parse("[Boundary]\nquantity = a\n[Lateral]\nid = l\n[boundary]\nquantity = b\n");
        let values = {
            let name = String::from("BOUNDARY");
            doc.get_all(&name, "quantity")
        };
        assert_eq!(vec!["a", "b"], values);

        let sections: Vec<&Section> = {
            let name = "boundary".to_owned();
            doc.sections_named(&name).collect()
        };
        assert_eq!(2, sections.len());
        assert_eq!(Some(5), sections.last().map(|s| s.line()));
    }

    #[test]
    fn test_rows_attached_to_section() {
        let doc = parse(BC_TEXT);
        let forcing = doc.section("forcing").unwrap();
        assert_eq!(2, forcing.rows().len());
        assert_eq!(12, forcing.rows()[0].line);
        let cols: Vec<&str> = forcing.rows()[1].columns().collect();
        assert_eq!(vec!["60", "2.0"], cols);
    }

    #[test]
    fn test_set_preserves_position_and_comment() {
        let mut doc = parse("[time]\nA = 1 # first\nB = 2 # second\n");
        doc.set("TIME", "a", "10");
        let section = doc.section("time").unwrap();
        let props: Vec<&Property> = section.properties().collect();
        assert_eq!("A", props[0].key());
        assert_eq!("10", props[0].value());
        assert_eq!(Some("first"), props[0].comment());
        assert_eq!("B", props[1].key());
    }

    #[test]
    fn test_set_appends_missing() {
        let mut doc = parse("[time]\nA = 1\n");
        doc.set("time", "C", "3");
        doc.set("output", "D", "4");
        assert_eq!(Some("3"), doc.get("time", "c"));
        assert_eq!(Some("4"), doc.get("output", "d"));
        assert_eq!(2, doc.sections.len());
    }

    #[test]
    fn test_add_keeps_duplicates() {
        let mut section = Section::new("Boundary");
        section.add("forcingFile", "a.bc");
        section.add("forcingFile", "a_corr.bc");
        assert_eq!(vec!["a.bc", "a_corr.bc"], section.get_all("FORCINGFILE"));
    }

    #[test]
    fn test_remove_all() {
        let mut section = Section::new("x");
        section.add("k", "1");
        section.add_comment("note");
        section.add("K", "2");
        section.add("j", "3");
        assert_eq!(2, section.remove_all("k"));
        assert_eq!(2, section.entries().len());
    }

    #[test]
    fn test_rebuild_keeps_comments() {
        let mut section = Section::new("x");
        section.add("a", "1");
        section.add_comment("note");
        section.add("b", "2");
        section.rebuild(|p| if p.is("a") { None } else { Some(p.with_key("B2")) });
        assert_eq!(
            &Entry::Comment("note".to_owned()),
            &section.entries()[0]
        );
        assert_eq!(Some("2"), section.get("b2"));
    }

    #[test]
    fn test_continuation_joined() {
        let doc = Document::parse(
            "[output]\nObsFile = a.xyn \\\n  b.xyn\n",
            &TokenizerOptions::MDU,
        )
        .unwrap();
        assert_eq!(Some("a.xyn b.xyn"), doc.get("output", "obsfile"));
    }

    #[test]
    fn test_preamble_comments() {
        let doc = parse("# generated\n# by hand\n[General]\n");
        assert_eq!(vec![" generated", " by hand"], doc.preamble);
    }

    #[test]
    fn test_properties_before_header() {
        let doc = parse("a = 1\n[General]\n");
        assert_eq!("", doc.sections[0].name());
        assert_eq!(Some("1"), doc.sections[0].get("a"));
    }

    #[test]
    fn test_row_outside_section() {
        let err = Document::parse("1 2 3\n", &TokenizerOptions::INI).unwrap_err();
        assert_eq!(ErrorCode::InvalidFormattedText, err.code);
    }
}
