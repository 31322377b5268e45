// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Boundary external-forcing files (`*_bnd.ext`): `[Boundary]` and
//! `[Lateral]` sections that point at polyline and bc files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bc::{BcFile, BcmFile};
use crate::common::{Error, ErrorKind, Location, Result, eq_ignore_case};
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::forcing::ForcingBlock;
use crate::format::{FormatStyle, format_decimal, render, write_file};
use crate::format_err;
use crate::migration::MigrationTable;
use crate::model_err;
use crate::reference::{Anchor, PathProbe, RelocationPlan, rebase, resolve_existing};
use crate::section::{Document, Section};
use crate::token::TokenizerOptions;

pub const FILE_VERSION: &str = "2.01";
pub const FILE_TYPE: &str = "extForce";

const BOUNDARY_KEYS: &[&str] = &[
    "quantity",
    "locationFile",
    "forcingFile",
    "returnTime",
    "OpenBoundaryTolerance",
];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundaryEntry {
    pub quantity: String,
    pub location_file: Option<String>,
    pub forcing_files: Vec<String>,
    pub return_time: Option<String>,
    pub open_boundary_tolerance: Option<String>,
    /// Keys this reader does not interpret, in file order.
    pub extra: Vec<(String, String)>,
    /// Resolved `location_file`, when it exists.
    pub location_path: Option<PathBuf>,
    /// Resolved `forcing_files`, index for index; `None` where the
    /// file does not exist.
    pub forcing_paths: Vec<Option<PathBuf>>,
    pub line: usize,
}

impl BoundaryEntry {
    pub fn new(quantity: &str) -> Self {
        BoundaryEntry {
            quantity: quantity.to_owned(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LateralDischarge {
    Constant(f64),
    RealTime,
    /// Time series in a bc file.
    File { raw: String, path: Option<PathBuf> },
}

impl LateralDischarge {
    fn parse(value: &str) -> LateralDischarge {
        let value = value.trim();
        if eq_ignore_case(value, "realtime") {
            return LateralDischarge::RealTime;
        }
        match value.parse::<f64>() {
            Ok(v) => LateralDischarge::Constant(v),
            Err(_) => LateralDischarge::File {
                raw: value.to_owned(),
                path: None,
            },
        }
    }

    fn raw(&self) -> String {
        match self {
            LateralDischarge::Constant(v) => format_decimal(*v),
            LateralDischarge::RealTime => "realtime".to_owned(),
            LateralDischarge::File { raw, .. } => raw.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LateralEntry {
    pub id: String,
    pub name: String,
    pub location_type: Option<String>,
    pub x_coordinates: Vec<f64>,
    pub y_coordinates: Vec<f64>,
    pub discharge: LateralDischarge,
    pub line: usize,
}

impl LateralEntry {
    pub fn new(id: &str, discharge: LateralDischarge) -> Self {
        LateralEntry {
            id: id.to_owned(),
            name: id.to_owned(),
            location_type: None,
            x_coordinates: vec![],
            y_coordinates: vec![],
            discharge,
            line: 0,
        }
    }
}

/// Forcing data reached through a boundary file's `forcingFile` keys.
#[derive(Clone, Debug, Default)]
pub struct ForcingData {
    pub flow: Vec<ForcingBlock>,
    pub morphology: Vec<ForcingBlock>,
    pub laterals: Vec<ForcingBlock>,
}

#[derive(Clone, Debug, Default)]
pub struct BndExtForceFile {
    pub boundaries: Vec<BoundaryEntry>,
    pub laterals: Vec<LateralEntry>,
    pub anchor: Option<Anchor>,
}

fn parse_coordinates(section: &Section, key: &str) -> Result<Vec<f64>> {
    let Some(property) = section.get_property(key) else {
        return Ok(vec![]);
    };
    property
        .value()
        .split_whitespace()
        .map(|v| {
            v.parse::<f64>().or_else(|_| {
                format_err!(
                    CannotConvertValue,
                    property.line(),
                    format!("Cannot convert value {v} of {key}")
                )
            })
        })
        .collect()
}

fn parse_lateral(section: &Section) -> Result<LateralEntry> {
    let Some(id) = section.get("id").filter(|v| !v.is_empty()) else {
        return model_err!(
            IncompleteBlock,
            format!("[Lateral] on line {} has no id", section.line())
        );
    };
    let Some(discharge) = section.get("discharge") else {
        return model_err!(IncompleteBlock, format!("lateral {id} has no discharge"));
    };

    let x_coordinates = parse_coordinates(section, "xCoordinates")?;
    let y_coordinates = parse_coordinates(section, "yCoordinates")?;
    if x_coordinates.len() != y_coordinates.len() {
        return model_err!(
            MismatchedSeries,
            format!(
                "lateral {id} has {} x and {} y coordinates",
                x_coordinates.len(),
                y_coordinates.len()
            )
        );
    }
    if let Some(n) = section.get("numCoordinates") {
        if n.trim().parse::<usize>().ok() != Some(x_coordinates.len()) {
            return model_err!(
                MismatchedSeries,
                format!("lateral {id} declares {n} coordinates but lists {}", x_coordinates.len())
            );
        }
    }

    Ok(LateralEntry {
        id: id.to_owned(),
        name: section.get("name").unwrap_or(id).to_owned(),
        location_type: section.get("locationType").map(str::to_owned),
        x_coordinates,
        y_coordinates,
        discharge: LateralDischarge::parse(discharge),
        line: section.line(),
    })
}

fn parse_boundary(section: &Section) -> Result<BoundaryEntry> {
    let Some(quantity) = section.get("quantity").filter(|v| !v.is_empty()) else {
        return model_err!(
            IncompleteBlock,
            format!("[Boundary] on line {} has no quantity", section.line())
        );
    };
    let mut entry = BoundaryEntry::new(quantity);
    entry.location_file = section.get("locationFile").map(str::to_owned);
    entry.forcing_files = section
        .get_all("forcingFile")
        .into_iter()
        .map(str::to_owned)
        .collect();
    entry.return_time = section.get("returnTime").map(str::to_owned);
    entry.open_boundary_tolerance = section.get("OpenBoundaryTolerance").map(str::to_owned);
    entry.extra = section
        .properties()
        .filter(|p| !BOUNDARY_KEYS.iter().any(|k| p.is(k)))
        .map(|p| (p.key().to_owned(), p.value().to_owned()))
        .collect();
    entry.line = section.line();
    Ok(entry)
}

/// Report a model or reference error and carry on; anything else stops
/// the read.
fn report_or_fail(err: Error, file: &Path, sink: &mut dyn DiagnosticsSink) -> Result<()> {
    match err.kind {
        ErrorKind::Model | ErrorKind::Reference => {
            sink.report(Diagnostic::from(&err.in_file(file)));
            Ok(())
        }
        _ => Err(err.in_file(file)),
    }
}

impl BndExtForceFile {
    /// Parse the sections of a boundary file without touching the file
    /// system.
    pub fn parse(text: &str, file: &Path, sink: &mut dyn DiagnosticsSink) -> Result<BndExtForceFile> {
        let mut doc = Document::parse(text, &TokenizerOptions::INI).map_err(|e| e.in_file(file))?;
        MigrationTable::shared().apply(&mut doc, file, sink);

        let mut result = BndExtForceFile::default();
        for section in doc.sections.iter() {
            if section.is("general") || section.name().is_empty() {
                continue;
            }
            if section.is("boundary") {
                match parse_boundary(section) {
                    Ok(entry) => result.boundaries.push(entry),
                    Err(err) => report_or_fail(err, file, sink)?,
                }
            } else if section.is("lateral") {
                match parse_lateral(section) {
                    Ok(entry) => result.laterals.push(entry),
                    Err(err) => report_or_fail(err, file, sink)?,
                }
            } else {
                sink.report(
                    Diagnostic::warning(format!(
                        "Section [{}] not supported on line {}. File: {}",
                        section.name(),
                        section.line(),
                        file.display()
                    ))
                    .in_file(file)
                    .on_line(section.line()),
                );
            }
        }
        Ok(result)
    }

    /// Read `path` and resolve its sub-file references against
    /// `reference` (the model definition) if given, else against `path`.
    /// An entry with a reference that does not exist is reported and
    /// dropped.
    pub fn read(
        path: &Path,
        reference: Option<&Path>,
        probe: &dyn PathProbe,
        sink: &mut dyn DiagnosticsSink,
    ) -> Result<BndExtForceFile> {
        let text = fs::read_to_string(path).map_err(|err| Error::from(err).at(path, 0))?;
        let mut file = BndExtForceFile::parse(&text, path, sink)?;
        let anchor = Anchor::choose(path, reference);

        let mut boundaries = vec![];
        for mut entry in std::mem::take(&mut file.boundaries) {
            let location = Location::new(path, entry.line);
            let mut complete = true;
            if let Some(ref raw) = entry.location_file {
                match resolve_existing(raw, &anchor, probe, Some(&location)) {
                    Ok(r) => entry.location_path = Some(r.path),
                    Err(err) => {
                        report_or_fail(err, path, sink)?;
                        complete = false;
                    }
                }
            }
            for raw in entry.forcing_files.iter() {
                match resolve_existing(raw, &anchor, probe, Some(&location)) {
                    Ok(r) => entry.forcing_paths.push(Some(r.path)),
                    Err(err) => {
                        report_or_fail(err, path, sink)?;
                        complete = false;
                    }
                }
            }
            if complete {
                boundaries.push(entry);
            } else {
                log::debug!("dropping boundary {} on line {}", entry.quantity, entry.line);
            }
        }
        file.boundaries = boundaries;

        let mut laterals = vec![];
        for mut lateral in std::mem::take(&mut file.laterals) {
            if let LateralDischarge::File { ref raw, path: ref mut resolved } = lateral.discharge {
                let location = Location::new(path, lateral.line);
                match resolve_existing(raw, &anchor, probe, Some(&location)) {
                    Ok(r) => *resolved = Some(r.path),
                    Err(err) => {
                        report_or_fail(err, path, sink)?;
                        log::debug!("dropping lateral {} on line {}", lateral.id, lateral.line);
                        continue;
                    }
                }
            }
            laterals.push(lateral);
        }
        file.laterals = laterals;

        file.anchor = Some(anchor);
        log::debug!(
            "read {} boundaries and {} laterals from {}",
            file.boundaries.len(),
            file.laterals.len(),
            path.display()
        );
        Ok(file)
    }

    /// Every distinct resolved bc file, in first-reference order.
    pub fn forcing_paths(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = vec![];
        let boundary = self.boundaries.iter().flat_map(|b| b.forcing_paths.iter().flatten());
        let lateral = self.laterals.iter().filter_map(|l| match l.discharge {
            LateralDischarge::File { path: Some(ref p), .. } => Some(p),
            _ => None,
        });
        for p in boundary.chain(lateral) {
            if !paths.contains(&p.as_path()) {
                paths.push(p);
            }
        }
        paths
    }

    pub fn location_paths(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = vec![];
        for p in self.boundaries.iter().filter_map(|b| b.location_path.as_deref()) {
            if !paths.contains(&p) {
                paths.push(p);
            }
        }
        paths
    }

    /// Read every referenced bc file once.  `.bcm` files hold morphology
    /// data; files referenced from laterals hold lateral discharges.
    pub fn read_forcing(&self, sink: &mut dyn DiagnosticsSink) -> Result<ForcingData> {
        let lateral_paths: Vec<&Path> = self
            .laterals
            .iter()
            .filter_map(|l| match l.discharge {
                LateralDischarge::File { path: Some(ref p), .. } => Some(p.as_path()),
                _ => None,
            })
            .collect();

        let mut data = ForcingData::default();
        for path in self.forcing_paths() {
            let is_bcm = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("bcm"))
                .unwrap_or(false);
            if is_bcm {
                data.morphology.extend(BcmFile::read(path, sink)?);
            } else if lateral_paths.contains(&path) {
                data.laterals.extend(BcFile::read(path, sink)?);
            } else {
                data.flow.extend(BcFile::read(path, sink)?);
            }
        }
        Ok(data)
    }

    fn to_document(&self, new_anchor: &Anchor, plan: &mut RelocationPlan) -> Document {
        let relocate = |abs: &Option<PathBuf>, raw: &str, plan: &mut RelocationPlan| -> String {
            match (abs, self.anchor.as_ref()) {
                (Some(abs), Some(old)) => {
                    let relocation = rebase(abs, old, new_anchor);
                    let raw = relocation.raw.clone();
                    plan.add(relocation);
                    raw
                }
                _ => raw.to_owned(),
            }
        };

        let mut doc = Document::new();
        let general = doc.add_section(Section::new("General"));
        general.add("fileVersion", FILE_VERSION);
        general.add("fileType", FILE_TYPE);

        for entry in self.boundaries.iter() {
            let mut section = Section::new("Boundary");
            section.add("quantity", &entry.quantity);
            if let Some(ref raw) = entry.location_file {
                let raw = relocate(&entry.location_path, raw, plan);
                section.add("locationFile", &raw);
            }
            if let Some(ref v) = entry.open_boundary_tolerance {
                section.add("OpenBoundaryTolerance", v);
            }
            for (i, raw) in entry.forcing_files.iter().enumerate() {
                // unresolved files keep their spelling
                let abs = entry.forcing_paths.get(i).cloned().flatten();
                let raw = relocate(&abs, raw, plan);
                section.add("forcingFile", &raw);
            }
            if let Some(ref v) = entry.return_time {
                section.add("returnTime", v);
            }
            for (key, value) in entry.extra.iter() {
                section.add(key, value);
            }
            doc.add_section(section);
        }

        for lateral in self.laterals.iter() {
            let mut section = Section::new("Lateral");
            section.add("id", &lateral.id);
            section.add("name", &lateral.name);
            if let Some(ref v) = lateral.location_type {
                section.add("locationType", v);
            }
            if !lateral.x_coordinates.is_empty() {
                let join = |values: &[f64]| values.iter().map(|v| format_decimal(*v)).collect::<Vec<_>>().join(" ");
                section.add("numCoordinates", &lateral.x_coordinates.len().to_string());
                section.add("xCoordinates", &join(&lateral.x_coordinates));
                section.add("yCoordinates", &join(&lateral.y_coordinates));
            }
            let discharge = match lateral.discharge {
                LateralDischarge::File { ref raw, ref path } => relocate(path, raw, plan),
                ref other => other.raw(),
            };
            section.add("discharge", &discharge);
            doc.add_section(section);
        }
        doc
    }

    pub fn render(&self) -> String {
        let mut plan = RelocationPlan::new();
        let anchor = self.anchor.clone().unwrap_or_else(|| Anchor::SelfAnchored(PathBuf::new()));
        render(&self.to_document(&anchor, &mut plan), FormatStyle::Compact)
    }

    /// Render with sub-file references spelled relative to
    /// `new_anchor`; files that must move are added to `plan`.
    pub fn render_relocated(&self, new_anchor: &Anchor, plan: &mut RelocationPlan) -> String {
        render(&self.to_document(new_anchor, plan), FormatStyle::Compact)
    }

    pub fn write(&self, path: &Path, new_anchor: &Anchor, plan: &mut RelocationPlan) -> Result<()> {
        write_file(path, &self.render_relocated(new_anchor, plan))
    }
}
