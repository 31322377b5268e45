// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Read-time upgrade of older file dialects.
//!
//! Renames are pure table lookups and keep every property's comment.
//! Obsolete keys are dropped with a warning.  Values whose encoding
//! changed (not just their name) go through a [`ValueTransform`], which
//! can be run on its own.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;

use crate::common::{Result, canonicalize, eq_ignore_case};
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::forcing::offset_time;
use crate::format_err;
use crate::section::{Document, Property, Section};

/// A key rename, optionally restricted to one (canonical) section.
#[derive(Clone, Debug, PartialEq, Eq)]
struct KeyRename {
    section: Option<&'static str>,
    from: &'static str,
    to: &'static str,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueTransform {
    /// `[time] TStart`/`TStop` offsets become absolute
    /// `StartDateTime`/`StopDateTime` timestamps.
    TimeWindow,
    /// Legacy spellings of `vertPositionType` become the current ones.
    VerticalPositionType,
}

#[derive(Clone, Debug)]
pub struct MigrationTable {
    categories: HashMap<String, &'static str>,
    keys: Vec<KeyRename>,
    obsolete: HashSet<String>,
    transforms: Vec<(&'static str, &'static str, ValueTransform)>,
}

const fn rename(section: Option<&'static str>, from: &'static str, to: &'static str) -> KeyRename {
    KeyRename { section, from, to }
}

static CATEGORY_RENAMES: &[(&str, &str)] = &[("model", "General")];

static KEY_RENAMES: &[KeyRename] = &[
    // model definition
    rename(None, "enclosurefile", "GridEnclosureFile"),
    rename(None, "trtdt", "DtTrt"),
    rename(None, "botlevuni", "BedLevUni"),
    rename(None, "botlevtype", "BedLevType"),
    // boundary condition blocks
    rename(Some("forcing"), "time-interpolation", "timeInterpolation"),
    rename(Some("forcing"), "vertical position type", "vertPositionType"),
    rename(Some("forcing"), "vertical position specification", "vertPositions"),
    rename(Some("forcing"), "vertical interpolation", "vertInterpolation"),
    rename(Some("forcing"), "vertical position", "vertPositionIndex"),
    // morphology boundaries
    rename(Some("boundary"), "bcfil", "BcFil"),
    rename(Some("boundary"), "ibedcond", "IBedCond"),
    // boundary external forcing
    rename(Some("boundary"), "return_time", "returnTime"),
];

static OBSOLETE_KEYS: &[&str] = &[
    "hdam",
    "writebalancefile",
    "transportmethod",
    "transporttimestepping",
];

static VERTICAL_POSITION_ALIASES: &[(&str, &str)] = &[
    ("percbed", "percBed"),
    ("percentage from bed", "percBed"),
    ("zdatum", "zDatum"),
    ("z from datum", "zDatum"),
    ("zbed", "zBed"),
    ("z from bed", "zBed"),
    ("zsurf", "zSurf"),
    ("z from surface", "zSurf"),
    ("single", "single"),
    ("uniform", "single"),
];

lazy_static! {
    static ref LEGACY: MigrationTable = MigrationTable::build();
}

impl Default for MigrationTable {
    fn default() -> Self {
        LEGACY.clone()
    }
}

impl MigrationTable {
    fn build() -> Self {
        MigrationTable {
            categories: CATEGORY_RENAMES
                .iter()
                .map(|(from, to)| (canonicalize(from), *to))
                .collect(),
            keys: KEY_RENAMES.to_vec(),
            obsolete: OBSOLETE_KEYS.iter().map(|k| canonicalize(k)).collect(),
            transforms: vec![
                ("time", "tstart", ValueTransform::TimeWindow),
                ("time", "tstop", ValueTransform::TimeWindow),
                ("forcing", "vertpositiontype", ValueTransform::VerticalPositionType),
            ],
        }
    }

    /// The shared, process-wide table.
    pub fn shared() -> &'static MigrationTable {
        &LEGACY
    }

    pub fn migrate_category(&self, section: &str) -> String {
        match self.categories.get(&canonicalize(section)) {
            Some(to) => (*to).to_owned(),
            None => section.to_owned(),
        }
    }

    /// Canonical `(section, key)` for a possibly legacy pair.  Names
    /// that are not in the table come back unchanged.
    pub fn migrate(&self, section: &str, key: &str) -> (String, String) {
        let section = self.migrate_category(section);
        let canonical_key = canonicalize(key);
        let renamed = self.keys.iter().find(|r| {
            r.from == canonical_key
                && r.section
                    .map(|s| eq_ignore_case(s, &section))
                    .unwrap_or(true)
        });
        let key = match renamed {
            Some(r) => r.to.to_owned(),
            None => key.to_owned(),
        };
        (section, key)
    }

    pub fn is_obsolete(&self, key: &str) -> bool {
        self.obsolete.contains(&canonicalize(key))
    }

    /// Transforms that apply to properties present in `section`, each
    /// listed once.
    pub fn transforms_for(&self, section: &Section) -> Vec<ValueTransform> {
        let mut found = vec![];
        for (scope, key, transform) in self.transforms.iter() {
            if section.is(scope) && section.contains(key) && !found.contains(transform) {
                found.push(*transform);
            }
        }
        found
    }

    /// Rewrite `doc` in place: rename categories and keys, drop
    /// obsolete keys, then run value transforms.  `file` is only used
    /// for diagnostics.
    pub fn apply(&self, doc: &mut Document, file: &Path, sink: &mut dyn DiagnosticsSink) {
        for section in doc.sections.iter_mut() {
            let category = self.migrate_category(section.name());
            if category != section.name() {
                log::debug!("renaming section [{}] to [{category}]", section.name());
                section.set_name(&category);
            }

            section.rebuild(|p| {
                if self.is_obsolete(p.key()) {
                    let mut diag = Diagnostic::warning(format!(
                        "Key {} in {} is deprecated and automatically removed",
                        p.key(),
                        file.display()
                    ))
                    .in_file(file);
                    if p.line() > 0 {
                        diag = diag.on_line(p.line());
                    }
                    sink.report(diag);
                    return None;
                }
                let (_, key) = self.migrate(&category, p.key());
                Some(p.with_key(&key))
            });

            for transform in self.transforms_for(section) {
                if let Err(err) = transform.run(section) {
                    let message = err
                        .get_details()
                        .unwrap_or_else(|| err.code.to_string());
                    let mut diag = Diagnostic::warning(message).in_file(file);
                    if let Some(line) = err.line().filter(|l| *l > 0) {
                        diag = diag.on_line(line);
                    }
                    sink.report(diag);
                }
            }
        }
    }
}

impl ValueTransform {
    pub fn run(&self, section: &mut Section) -> Result<()> {
        match self {
            ValueTransform::TimeWindow => migrate_time_window(section),
            ValueTransform::VerticalPositionType => {
                migrate_vertical_position_type(section);
                Ok(())
            }
        }
    }
}

pub const DATE_FORMAT: &str = "%Y%m%d";
pub const DATE_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Convert `TStart`/`TStop` (offsets in `Tunit` from `RefDate`) into
/// `StartDateTime`/`StopDateTime`.  An explicit timestamp already in
/// the section wins, and the legacy offset is dropped.
pub fn migrate_time_window(section: &mut Section) -> Result<()> {
    let Some(ref_date) = section.get_property("RefDate").cloned() else {
        return format_err!(
            BadDate,
            section.line(),
            "cannot convert TStart/TStop without a RefDate".to_owned()
        );
    };
    let ref_date = parse_ref_date(&ref_date)?;
    let unit_seconds = match section.get_property("Tunit") {
        Some(p) => time_unit_seconds(p)?,
        None => 1.0,
    };

    let mut converted: Vec<(Property, &'static str)> = vec![];
    for (legacy, current) in [("TStart", "StartDateTime"), ("TStop", "StopDateTime")] {
        let Some(p) = section.get_property(legacy) else {
            continue;
        };
        let existing = section.get(current).map(|v| !v.trim().is_empty());
        if existing == Some(true) {
            converted.push((p.clone(), ""));
            continue;
        }
        let offset = p.value().trim().parse::<f64>().or_else(|_| {
            format_err!(
                BadNumber,
                p.line(),
                format!("cannot convert value {} of {}", p.value(), p.key())
            )
        })?;
        let Some(when) = offset_time(ref_date, offset * unit_seconds) else {
            return format_err!(
                BadNumber,
                p.line(),
                format!("value {} of {} is out of range", p.value(), p.key())
            );
        };
        converted.push((
            p.with_key(current)
                .with_value(&when.format(DATE_TIME_FORMAT).to_string()),
            current,
        ));
    }

    for (property, current) in converted {
        if current.is_empty() {
            section.remove_all(property.key());
            continue;
        }
        // replace the legacy key in place when there is no empty
        // placeholder for the new one already in the file
        section.remove_all(current);
        let legacy_key = if current == "StartDateTime" {
            "TStart"
        } else {
            "TStop"
        };
        section.rebuild(|p| {
            if p.is(legacy_key) {
                Some(property.clone())
            } else {
                Some(p.clone())
            }
        });
    }

    Ok(())
}

fn parse_ref_date(p: &Property) -> Result<NaiveDateTime> {
    match NaiveDate::parse_from_str(p.value().trim(), DATE_FORMAT) {
        Ok(date) => Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default()),
        Err(_) => format_err!(
            BadDate,
            p.line(),
            format!("cannot convert value {} of {}", p.value(), p.key())
        ),
    }
}

fn time_unit_seconds(p: &Property) -> Result<f64> {
    match canonicalize(p.value()).as_str() {
        "s" => Ok(1.0),
        "m" => Ok(60.0),
        "h" => Ok(3600.0),
        "d" => Ok(86400.0),
        _ => format_err!(
            BadTimeUnit,
            p.line(),
            format!("unknown time unit {}", p.value())
        ),
    }
}

/// Current spelling of a vertical position type, if `value` is a known
/// spelling (legacy or current).
pub fn vertical_position_type(value: &str) -> Option<&'static str> {
    let value = canonicalize(value);
    VERTICAL_POSITION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == value)
        .map(|(_, current)| *current)
}

fn migrate_vertical_position_type(section: &mut Section) {
    section.rebuild(|p| {
        if !p.is("vertPositionType") {
            return Some(p.clone());
        }
        match vertical_position_type(p.value()) {
            Some(current) => Some(p.with_value(current)),
            None => Some(p.clone()),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Diagnostics, Severity};
    use crate::token::TokenizerOptions;

    fn mdu(text: &str) -> Document {
        Document::parse(text, &TokenizerOptions::MDU).unwrap()
    }

    #[test]
    fn test_migrate_category() {
        let table = MigrationTable::default();
        assert_eq!("General", table.migrate_category("MODEL"));
        assert_eq!("geometry", table.migrate_category("geometry"));
    }

    #[test]
    fn test_migrate_key() {
        let table = MigrationTable::default();
        assert_eq!(
            ("geometry".to_owned(), "GridEnclosureFile".to_owned()),
            table.migrate("geometry", "EnclosureFile")
        );
        assert_eq!(
            ("trachytopes".to_owned(), "DtTrt".to_owned()),
            table.migrate("trachytopes", "TRTDT")
        );
        assert_eq!(
            ("physics".to_owned(), "Vicouv".to_owned()),
            table.migrate("physics", "Vicouv")
        );
    }

    #[test]
    fn test_scoped_rename() {
        let table = MigrationTable::default();
        assert_eq!("vertPositionIndex", table.migrate("Forcing", "Vertical Position").1);
        // only forcing blocks know this alias
        assert_eq!("vertical position", table.migrate("General", "vertical position").1);
        assert_eq!("BcFil", table.migrate("Boundary", "bcfil").1);
    }

    #[test]
    fn test_apply_keeps_comment() {
        let mut doc = mdu("[model]\nProgram = D-Flow FM\n[geometry]\nEnclosureFile = enc.pol # my enclosure\n");
        let mut diags = Diagnostics::new();
        MigrationTable::default().apply(&mut doc, Path::new("a.mdu"), &mut diags);

        assert_eq!("General", doc.sections[0].name());
        let p = doc.sections[1].get_property("gridenclosurefile").unwrap();
        assert_eq!("GridEnclosureFile", p.key());
        assert_eq!("enc.pol", p.value());
        assert_eq!(Some("my enclosure"), p.comment());
        assert!(diags.is_empty());
    }

    #[test]
    fn test_obsolete_keys_removed() {
        let mut doc = mdu("[numerics]\nHdam = 1\nCFLMax = 0.7\n[output]\nWriteBalanceFile = 0\n");
        let mut diags = Diagnostics::new();
        MigrationTable::default().apply(&mut doc, Path::new("a.mdu"), &mut diags);

        assert!(!doc.sections[0].contains("hdam"));
        assert!(doc.sections[0].contains("cflmax"));
        assert!(!doc.sections[1].contains("writebalancefile"));
        assert_eq!(2, diags.warnings().count());
        assert_eq!(
            "Key Hdam in a.mdu is deprecated and automatically removed",
            diags.all()[0].message
        );
        assert_eq!(Some(2), diags.all()[0].line);
        assert_eq!(
            1,
            diags.count_matching(Severity::Warning, "Key WriteBalanceFile in a.mdu")
        );
    }

    #[test]
    fn test_time_window_seconds() {
        let mut doc = mdu("[time]\nRefDate = 20230731\nTunit = S\nTStart = 60 # start\nTStop = 86400\n");
        let section = doc.section_mut("time").unwrap();
        ValueTransform::TimeWindow.run(section).unwrap();

        let start = section.get_property("startdatetime").unwrap();
        assert_eq!("20230731000100", start.value());
        assert_eq!(Some("start"), start.comment());
        assert_eq!(Some("20230801000000"), section.get("StopDateTime"));
        assert!(!section.contains("tstart"));
        assert!(!section.contains("tstop"));
    }

    #[test]
    fn test_time_window_hours_fraction() {
        let mut doc = mdu("[time]\nRefDate = 20010101\nTunit = H\nTStart = 1.5\n");
        let section = doc.section_mut("time").unwrap();
        migrate_time_window(section).unwrap();
        assert_eq!(Some("20010101013000"), section.get("StartDateTime"));
    }

    #[test]
    fn test_time_window_explicit_timestamp_wins() {
        let mut doc = mdu("[time]\nRefDate = 20010101\nTStart = 60\nStartDateTime = 20010102000000\n");
        let section = doc.section_mut("time").unwrap();
        migrate_time_window(section).unwrap();
        assert_eq!(Some("20010102000000"), section.get("StartDateTime"));
        assert!(!section.contains("TStart"));
    }

    #[test]
    fn test_time_window_bad_values() {
        let mut doc = mdu("[time]\nRefDate = 2001-01-01\nTStart = 60\n");
        let err = migrate_time_window(doc.section_mut("time").unwrap()).unwrap_err();
        assert_eq!(crate::common::ErrorCode::BadDate, err.code);

        let mut doc = mdu("[time]\nRefDate = 20010101\nTunit = W\nTStart = 60\n");
        let err = migrate_time_window(doc.section_mut("time").unwrap()).unwrap_err();
        assert_eq!(crate::common::ErrorCode::BadTimeUnit, err.code);

        let mut doc = mdu("[time]\nRefDate = 20010101\nTStart = soon\n");
        let err = migrate_time_window(doc.section_mut("time").unwrap()).unwrap_err();
        assert_eq!(crate::common::ErrorCode::BadNumber, err.code);
        assert_eq!(Some(3), err.line());
    }

    #[test]
    fn test_time_window_out_of_range() {
        let mut doc = mdu("[time]\nRefDate = 20010101\nTunit = S\nTStart = 1e15\n");
        let err = migrate_time_window(doc.section_mut("time").unwrap()).unwrap_err();
        assert_eq!(crate::common::ErrorCode::BadNumber, err.code);
        assert_eq!(Some(4), err.line());

        let mut doc = mdu("[time]\nRefDate = 20010101\nTunit = S\nTStart = 1e15\n");
        let mut diags = Diagnostics::new();
        MigrationTable::default().apply(&mut doc, Path::new("m.mdu"), &mut diags);
        assert_eq!(1, diags.count_matching(Severity::Warning, "out of range"));
        assert_eq!(Some("1e15"), doc.get("time", "TStart"));
    }

    #[test]
    fn test_apply_reports_transform_failure() {
        let mut doc = mdu("[time]\nRefDate = 20010101\nTStart = soon\n");
        let mut diags = Diagnostics::new();
        MigrationTable::default().apply(&mut doc, Path::new("m.mdu"), &mut diags);
        assert_eq!(1, diags.count_matching(Severity::Warning, "TStart"));
        // left untouched
        assert_eq!(Some("soon"), doc.get("time", "tstart"));
    }

    #[test]
    fn test_vertical_position_aliases() {
        assert_eq!(Some("zBed"), vertical_position_type("Z from bed"));
        assert_eq!(Some("percBed"), vertical_position_type("percentage from bed"));
        assert_eq!(Some("single"), vertical_position_type("uniform"));
        assert_eq!(Some("zSurf"), vertical_position_type("ZSURF"));
        assert_eq!(None, vertical_position_type("sideways"));
    }

    #[test]
    fn test_apply_renames_then_transforms() {
        let mut doc = Document::parse(
            "[forcing]\nName = p1\nVertical Position Type = percentage from bed\n",
            &TokenizerOptions::INI,
        )
        .unwrap();
        let mut diags = Diagnostics::new();
        MigrationTable::default().apply(&mut doc, Path::new("a.bc"), &mut diags);
        let p = doc.sections[0].get_property("vertpositiontype").unwrap();
        assert_eq!("vertPositionType", p.key());
        assert_eq!("percBed", p.value());
    }
}
