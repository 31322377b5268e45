// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Morphology settings files (`.mor`).

use std::fs;
use std::path::{Path, PathBuf};

use crate::common::{Error, Location, Result};
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::format::{FormatStyle, render, write_file};
use crate::migration::MigrationTable;
use crate::reference::{Anchor, PathProbe, RelocationPlan, rebase, resolve_existing};
use crate::section::{Document, Section};
use crate::token::TokenizerOptions;

const BOUNDARY_KEYS: &[&str] = &["Name", "IBedCond", "BcFil"];

/// One `[Boundary]` section: which boundary, what kind of bed
/// condition, and where its data lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MorphologyBoundary {
    pub name: String,
    pub bed_condition: Option<String>,
    pub bc_file: Option<String>,
    /// Resolved `bc_file`, when it exists.
    pub bc_path: Option<PathBuf>,
    pub line: usize,
}

#[derive(Clone, Debug, Default)]
pub struct MorphologyFile {
    /// Every section except `[Boundary]`, as read.
    pub settings: Document,
    pub boundaries: Vec<MorphologyBoundary>,
    pub anchor: Option<Anchor>,
}

impl MorphologyFile {
    pub fn parse(text: &str, file: &Path, sink: &mut dyn DiagnosticsSink) -> Result<MorphologyFile> {
        let mut doc = Document::parse(text, &TokenizerOptions::INI).map_err(|e| e.in_file(file))?;
        MigrationTable::shared().apply(&mut doc, file, sink);

        let mut result = MorphologyFile::default();
        result.settings.preamble = std::mem::take(&mut doc.preamble);
        for section in doc.sections {
            if !section.is("boundary") {
                result.settings.sections.push(section);
                continue;
            }
            for p in section.properties() {
                if !BOUNDARY_KEYS.iter().any(|k| p.is(k)) {
                    sink.report(
                        Diagnostic::warning(format!(
                            "Unsupported keyword {} at line {} of file {}",
                            p.key(),
                            p.line(),
                            file.display()
                        ))
                        .in_file(file)
                        .on_line(p.line()),
                    );
                }
            }
            result.boundaries.push(MorphologyBoundary {
                name: section.get("Name").unwrap_or_default().to_owned(),
                bed_condition: section.get("IBedCond").map(str::to_owned),
                bc_file: section
                    .get("BcFil")
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_owned),
                bc_path: None,
                line: section.line(),
            });
        }
        Ok(result)
    }

    /// Read `path`.  `BcFil` references resolve against `reference` (the
    /// model definition) when given; a boundary whose file does not exist
    /// is reported and dropped.
    pub fn read(
        path: &Path,
        reference: Option<&Path>,
        probe: &dyn PathProbe,
        sink: &mut dyn DiagnosticsSink,
    ) -> Result<MorphologyFile> {
        let text = fs::read_to_string(path).map_err(|err| Error::from(err).at(path, 0))?;
        let mut file = MorphologyFile::parse(&text, path, sink)?;
        let anchor = Anchor::choose(path, reference);
        let mut boundaries = vec![];
        for mut boundary in std::mem::take(&mut file.boundaries) {
            if let Some(ref raw) = boundary.bc_file {
                let location = Location::new(path, boundary.line);
                match resolve_existing(raw, &anchor, probe, Some(&location)) {
                    Ok(r) => boundary.bc_path = Some(r.path),
                    Err(err) => {
                        sink.report(Diagnostic::from(&err));
                        log::debug!("dropping morphology boundary {}", boundary.name);
                        continue;
                    }
                }
            }
            boundaries.push(boundary);
        }
        file.boundaries = boundaries;
        file.anchor = Some(anchor);
        Ok(file)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.settings.get(section, key)
    }

    fn to_document(&self, new_anchor: Option<&Anchor>, plan: &mut RelocationPlan) -> Document {
        let mut doc = self.settings.clone();
        for boundary in self.boundaries.iter() {
            let mut section = Section::new("Boundary");
            section.add("Name", &boundary.name);
            if let Some(ref v) = boundary.bed_condition {
                section.add("IBedCond", v);
            }
            if let Some(ref raw) = boundary.bc_file {
                let raw = match (&boundary.bc_path, self.anchor.as_ref(), new_anchor) {
                    (Some(abs), Some(old), Some(new)) => {
                        let relocation = rebase(abs, old, new);
                        let raw = relocation.raw.clone();
                        plan.add(relocation);
                        raw
                    }
                    _ => raw.clone(),
                };
                section.add("BcFil", &raw);
            }
            doc.add_section(section);
        }
        doc
    }

    pub fn render(&self) -> String {
        let mut plan = RelocationPlan::new();
        render(
            &self.to_document(None, &mut plan),
            FormatStyle::Aligned { min_key_width: 0 },
        )
    }

    pub fn render_relocated(&self, new_anchor: &Anchor, plan: &mut RelocationPlan) -> String {
        render(
            &self.to_document(Some(new_anchor), plan),
            FormatStyle::Aligned { min_key_width: 0 },
        )
    }

    pub fn write(&self, path: &Path, new_anchor: &Anchor, plan: &mut RelocationPlan) -> Result<()> {
        write_file(path, &self.render_relocated(new_anchor, plan))
    }
}
