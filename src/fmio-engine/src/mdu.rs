// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Model definition files (`.mdu`).

use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use crate::common::{Error, Result};
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::format::{FormatStyle, render, write_file};
use crate::format_err;
use crate::migration::{DATE_FORMAT, MigrationTable};
use crate::schema::MduSchema;
use crate::section::{Document, Property, Section};
use crate::token::TokenizerOptions;

/// Keys whose values name other files, relative to the mdu.
pub const FILE_KEYS: &[&str] = &[
    "NetFile",
    "BathymetryFile",
    "GridEnclosureFile",
    "DryPointsFile",
    "LandBoundaryFile",
    "ThinDamFile",
    "FixedWeirFile",
    "StructureFile",
    "ObsFile",
    "CrsFile",
    "RestartFile",
    "ExtForceFile",
    "ExtForceFileNew",
    "MorFile",
    "SedFile",
];

/// File keys whose value lists several files, separated by spaces or
/// tabs.  Every other file key holds one path, spaces included.
pub const MULTIPLE_FILE_KEYS: &[&str] = &[
    "GridEnclosureFile",
    "DryPointsFile",
    "LandBoundaryFile",
    "ThinDamFile",
    "FixedWeirFile",
    "StructureFile",
    "ObsFile",
    "CrsFile",
];

const GENERATED_HEADERS: &[&str] = &["Generated on", "Deltares,"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MduWriteOptions {
    /// Comment lines written before the first section, without the
    /// leading `#`.
    pub header_lines: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelDefinition {
    doc: Document,
}

fn is_generated_header(comment: &str) -> bool {
    let comment = comment.trim_start();
    GENERATED_HEADERS.iter().any(|h| comment.starts_with(h))
}

impl ModelDefinition {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn from_document(doc: Document) -> Self {
        ModelDefinition { doc }
    }

    pub fn parse(text: &str, file: &Path, sink: &mut dyn DiagnosticsSink) -> Result<ModelDefinition> {
        let mut doc = Document::parse(text, &TokenizerOptions::MDU).map_err(|e| e.in_file(file))?;
        doc.preamble.retain(|c| !is_generated_header(c));
        MigrationTable::shared().apply(&mut doc, file, sink);

        let schema = MduSchema;
        for section in doc.sections.iter() {
            for p in section.properties() {
                if schema.lookup(p.key()).is_none() {
                    sink.report(
                        Diagnostic::info(format!(
                            "An unrecognized keyword '{}' has been detected in [{}]",
                            p.key(),
                            section.name()
                        ))
                        .in_file(file)
                        .on_line(p.line()),
                    );
                }
            }
        }
        Ok(ModelDefinition { doc })
    }

    pub fn read(path: &Path, sink: &mut dyn DiagnosticsSink) -> Result<ModelDefinition> {
        let text = fs::read_to_string(path).map_err(|err| Error::from(err).at(path, 0))?;
        let model = ModelDefinition::parse(&text, path, sink)?;
        log::debug!("read model definition {}", path.display());
        Ok(model)
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// The value of `key`, from whichever section holds it.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.doc.sections.iter().find_map(|s| s.get(key))
    }

    /// Set `key` in the section that holds it, or in its schema
    /// section, or in `[General]`.
    pub fn set(&mut self, key: &str, value: &str) {
        if let Some(section) = self.doc.sections.iter_mut().find(|s| s.contains(key)) {
            section.set(key, value);
            return;
        }
        let section = MduSchema.lookup(key).map(|def| def.section).unwrap_or("General");
        self.doc.set(section, key, value);
    }

    fn file_value(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn ext_force_file(&self) -> Option<&str> {
        self.file_value("ExtForceFile")
    }

    pub fn ext_force_file_new(&self) -> Option<&str> {
        self.file_value("ExtForceFileNew")
    }

    pub fn net_file(&self) -> Option<&str> {
        self.file_value("NetFile")
    }

    pub fn grid_enclosure_file(&self) -> Option<&str> {
        self.file_value("GridEnclosureFile")
    }

    pub fn mor_file(&self) -> Option<&str> {
        self.file_value("MorFile")
    }

    pub fn sed_file(&self) -> Option<&str> {
        self.file_value("SedFile")
    }

    pub fn ref_date(&self) -> Result<Option<NaiveDate>> {
        let Some(p) = self.doc.sections.iter().find_map(|s| s.get_property("RefDate")) else {
            return Ok(None);
        };
        match NaiveDate::parse_from_str(p.value().trim(), DATE_FORMAT) {
            Ok(date) => Ok(Some(date)),
            Err(_) => format_err!(BadDate, p.line(), format!("cannot parse RefDate '{}'", p.value())),
        }
    }

    /// Every file named under one of [`FILE_KEYS`], as `(key, raw)`.
    /// Keys in [`MULTIPLE_FILE_KEYS`] yield one pair per listed file.
    pub fn file_references(&self) -> Vec<(String, String)> {
        let mut refs = vec![];
        for section in self.doc.sections.iter() {
            for p in section.properties() {
                if !FILE_KEYS.iter().any(|k| p.is(k)) {
                    continue;
                }
                let key = p.key().to_owned();
                if MULTIPLE_FILE_KEYS.iter().any(|k| p.is(k)) {
                    refs.extend(
                        p.value()
                            .split([' ', '\t'])
                            .filter(|raw| !raw.is_empty())
                            .map(|raw| (key.clone(), raw.to_owned())),
                    );
                } else if !p.value().trim().is_empty() {
                    refs.push((key, p.value().trim().to_owned()));
                }
            }
        }
        refs
    }

    /// The document as written: properties that do not apply given the
    /// other values fall back to their default, and every known
    /// property without a comment of its own gets the description.
    fn to_output_document(&self, options: &MduWriteOptions) -> Document {
        let schema = MduSchema;
        let mut doc = self.doc.clone();
        doc.preamble = options.header_lines.clone();
        for section in doc.sections.iter_mut() {
            section.rebuild(|p| {
                let Some(def) = schema.lookup(p.key()) else {
                    return Some(p.clone());
                };
                let value = if def.is_enabled(&self.doc) {
                    p.value()
                } else {
                    def.default
                };
                let comment = p.comment().unwrap_or(def.description);
                let comment = (!comment.is_empty()).then_some(comment);
                Some(
                    Property::new(p.key(), value)
                        .with_comment(comment)
                        .at_line(p.line()),
                )
            });
        }
        doc
    }

    pub fn render(&self, options: &MduWriteOptions) -> String {
        render(&self.to_output_document(options), FormatStyle::Mdu)
    }

    pub fn write(&self, path: &Path, options: &MduWriteOptions) -> Result<()> {
        write_file(path, &self.render(options))
    }

    /// Append an empty section, for building definitions in code.
    pub fn add_section(&mut self, name: &str) -> &mut Section {
        self.doc.add_section(Section::new(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::diagnostics::{Diagnostics, Severity};

    const MDU: &str = "# Generated on 2024-05-01 10:00:00
# Deltares, D-Flow FM Version 1.2.100
[model]
Program = D-Flow FM
AutoStart = 0
hdam = 1

[geometry]
NetFile = model_net.nc
EnclosureFile = enclosure.pol
Kmx = 0
Numtopsig = 4   # Number of sigma layers
MyCustomKey = 1

[time]
RefDate = 20240101
Tunit = H
TStart = 0
TStop = 24

[external forcing]
ExtForceFile = old.ext
ExtForceFileNew = input/model_bnd.ext

[output]
ObsFile = obs1.xyn obs2.xyn
";

    fn parse(text: &str) -> (ModelDefinition, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mdu = ModelDefinition::parse(text, Path::new("model.mdu"), &mut diags).unwrap();
        (mdu, diags)
    }

    #[test]
    fn test_read_migrates() {
        let (mdu, diags) = parse(MDU);
        assert!(mdu.document().preamble.is_empty());
        assert!(mdu.document().section("General").is_some());
        assert_eq!(Some("enclosure.pol"), mdu.grid_enclosure_file());
        assert_eq!(None, mdu.get("hdam"));
        assert_eq!(Some("20240102000000"), mdu.get("StopDateTime"));
        assert_eq!(
            1,
            diags.count_matching(Severity::Warning, "Key hdam in model.mdu is deprecated")
        );
        assert_eq!(
            1,
            diags.count_matching(
                Severity::Info,
                "An unrecognized keyword 'MyCustomKey' has been detected in [geometry]"
            )
        );
    }

    #[test]
    fn test_getters() {
        let (mdu, _) = parse(MDU);
        assert_eq!(Some("old.ext"), mdu.ext_force_file());
        assert_eq!(Some("input/model_bnd.ext"), mdu.ext_force_file_new());
        assert_eq!(Some("model_net.nc"), mdu.net_file());
        assert_eq!(None, mdu.mor_file());
        assert_eq!(None, mdu.sed_file());
        assert_eq!(
            Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            mdu.ref_date().unwrap()
        );
    }

    #[test]
    fn test_bad_ref_date() {
        let (mdu, _) = parse("[time]\nRefDate = 2024-01-01\n");
        let err = mdu.ref_date().unwrap_err();
        assert_eq!(ErrorCode::BadDate, err.code);
        assert_eq!(Some(2), err.line());
    }

    #[test]
    fn test_file_references() {
        let (mdu, _) = parse(MDU);
        let refs = mdu.file_references();
        let raws: Vec<&str> = refs.iter().map(|(_, raw)| raw.as_str()).collect();
        assert_eq!(
            vec![
                "model_net.nc",
                "enclosure.pol",
                "old.ext",
                "input/model_bnd.ext",
                "obs1.xyn",
                "obs2.xyn"
            ],
            raws
        );
    }

    #[test]
    fn test_single_file_keys_keep_spaces() {
        let text = "[geometry]\nNetFile = my grid_net.nc\nDryPointsFile = dry1.xyz\tdry2.xyz\n\n\
                    [external forcing]\nExtForceFile =\nExtForceFileNew = run 1/model_bnd.ext\n";
        let (mdu, _) = parse(text);
        assert_eq!(
            vec![
                ("NetFile".to_owned(), "my grid_net.nc".to_owned()),
                ("DryPointsFile".to_owned(), "dry1.xyz".to_owned()),
                ("DryPointsFile".to_owned(), "dry2.xyz".to_owned()),
                ("ExtForceFileNew".to_owned(), "run 1/model_bnd.ext".to_owned()),
            ],
            mdu.file_references()
        );
    }

    #[test]
    fn test_set() {
        let (mut mdu, _) = parse(MDU);
        mdu.set("netfile", "other_net.nc");
        assert_eq!(Some("other_net.nc"), mdu.net_file());
        mdu.set("MorFile", "model.mor");
        assert_eq!(Some("model.mor"), mdu.document().get("sediment", "MorFile"));
    }

    #[test]
    fn test_write_defaults_disabled_properties() {
        let (mdu, _) = parse("[geometry]\nKmx = 0\nNumtopsig = 4   # my own comment\n");
        let text = mdu.render(&MduWriteOptions::default());
        let expected = "[geometry]
Kmx       = 0 # Maximum number of vertical layers
Numtopsig = 0 # my own comment
";
        assert_eq!(expected, text);
    }

    #[test]
    fn test_write_header_and_unknown() {
        let (mdu, _) = parse("[geometry]\nKmx = 5\nLayertype = 2\nNumtopsig = 4\nFoo = bar\n");
        let options = MduWriteOptions {
            header_lines: vec![" Generated on 2025-01-01 00:00:00".to_owned()],
        };
        let text = mdu.render(&options);
        assert!(text.starts_with("# Generated on 2025-01-01 00:00:00\n\n[geometry]\n"));
        assert!(text.contains("Numtopsig = 4   # Number of sigma layers in top of z-layer model\n"));
        assert!(text.contains("Foo       = bar\n"));

        let (back, _) = parse(&text);
        assert_eq!(Some("4"), back.get("Numtopsig"));
    }
}
