// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Boundary-condition data files (`.bc`, `_corr.bc`, `.bcm`).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::common::{Error, ErrorKind, Result};
use crate::diagnostics::{Diagnostic, DiagnosticsSink, Severity};
use crate::forcing::{ForcingBlock, FunctionType, QuantityRecord, TimeInterpolation, seconds_since};
use crate::format::{BC_KEY_WIDTH, FormatStyle, format_decimal, render, write_file};
use crate::grouping::{
    BoundaryCondition, GeometryProvider, Grouped, WriteMode, group, group_morphology, is_writable,
    tagged_path,
};
use crate::migration::MigrationTable;
use crate::model_err;
use crate::section::{Document, Section};
use crate::token::TokenizerOptions;

pub const FILE_VERSION: &str = "1.01";
pub const FILE_TYPE: &str = "boundConds";
pub const CORRECTION_TAG: &str = "corr";
pub const LATERAL_FILE_NAME: &str = "lateral_discharge.bc";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BcWriteOptions {
    pub mode: WriteMode,
    /// Time arguments are written as seconds since this moment.  When
    /// absent, they are written with their own unit.
    pub reference_date: Option<NaiveDateTime>,
}

pub struct BcFile;

impl BcFile {
    /// Parse bc text.  `[General]` is skipped, every `[forcing]` becomes
    /// a block, and any other section is reported once per occurrence.
    pub fn parse(text: &str, file: &Path, sink: &mut dyn DiagnosticsSink) -> Result<Vec<ForcingBlock>> {
        let mut doc = Document::parse(text, &TokenizerOptions::INI).map_err(|e| e.in_file(file))?;
        MigrationTable::shared().apply(&mut doc, file, sink);

        let mut blocks = vec![];
        for section in doc.sections.iter() {
            if section.is("general") {
                continue;
            }
            if !section.is("forcing") {
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
                continue;
            }
            match ForcingBlock::extract(section, file) {
                Ok(block) => blocks.push(block),
                // an incomplete block is skipped with a warning
                Err(err) if err.kind == ErrorKind::Model => {
                    let mut diag = Diagnostic::from(&err);
                    diag.severity = Severity::Warning;
                    sink.report(diag);
                }
                Err(err) => return Err(err),
            }
        }
        log::debug!("read {} forcing blocks from {}", blocks.len(), file.display());
        Ok(blocks)
    }

    pub fn read(path: &Path, sink: &mut dyn DiagnosticsSink) -> Result<Vec<ForcingBlock>> {
        let text = fs::read_to_string(path).map_err(|err| Error::from(err).at(path, 0))?;
        BcFile::parse(&text, path, sink)
    }

    pub fn render(blocks: &[ForcingBlock]) -> Result<String> {
        let mut doc = Document::new();
        let general = doc.add_section(Section::new("General"));
        general.add("fileVersion", FILE_VERSION);
        general.add("fileType", FILE_TYPE);
        for block in blocks {
            doc.add_section(block.to_section()?);
        }
        Ok(render(
            &doc,
            FormatStyle::Aligned {
                min_key_width: BC_KEY_WIDTH,
            },
        ))
    }

    pub fn write_blocks(path: &Path, blocks: &[ForcingBlock]) -> Result<()> {
        write_file(path, &BcFile::render(blocks)?)
    }

    /// Write the flow boundary conditions, split over sub-files by
    /// `options.mode`.  Morphology conditions and conditions without
    /// data are left out.  Returns every file written, correction files
    /// included.
    pub fn write(
        conditions: &[BoundaryCondition],
        path: &Path,
        geometry: &dyn GeometryProvider,
        options: &BcWriteOptions,
        sink: &mut dyn DiagnosticsSink,
    ) -> Result<Vec<PathBuf>> {
        let skipped = conditions.iter().filter(|c| !is_writable(c)).count();
        if skipped > 0 {
            log::debug!("{skipped} boundary conditions not written to {}", path.display());
        }

        let mut tags: Vec<(String, Vec<BoundaryCondition>)> = vec![];
        for condition in conditions.iter().filter(|c| is_writable(c)) {
            let tag = options.mode.discriminator(condition);
            match tags.iter_mut().find(|(t, _)| *t == tag) {
                Some((_, members)) => members.push(condition.clone()),
                None => tags.push((tag, vec![condition.clone()])),
            }
        }

        let mut written = vec![];
        for (tag, members) in tags {
            let target = tagged_path(path, &tag);
            let grouped = match group(&members, geometry, options.reference_date) {
                Ok(grouped) => grouped,
                Err(err) => return Err(located(err, &target, sink)),
            };
            written.extend(write_grouped(&target, &grouped)?);
        }
        Ok(written)
    }
}

fn located(err: Error, file: &Path, sink: &mut dyn DiagnosticsSink) -> Error {
    let err = err.in_file(file);
    sink.report(Diagnostic::from(&err));
    err
}

fn write_grouped(target: &Path, grouped: &Grouped) -> Result<Vec<PathBuf>> {
    let mut written = vec![];
    if grouped.blocks.is_empty() {
        return Ok(written);
    }
    BcFile::write_blocks(target, &grouped.blocks)?;
    written.push(target.to_path_buf());
    if !grouped.corrections.is_empty() {
        let corr = correction_path(target);
        BcFile::write_blocks(&corr, &grouped.corrections)?;
        written.push(corr);
    }
    Ok(written)
}

/// `<stem>_corr.bc` next to `path`.
pub fn correction_path(path: &Path) -> PathBuf {
    tagged_path(path, CORRECTION_TAG)
}

/// Morphology boundary data, always a single file.
pub struct BcmFile;

impl BcmFile {
    pub fn read(path: &Path, sink: &mut dyn DiagnosticsSink) -> Result<Vec<ForcingBlock>> {
        BcFile::read(path, sink)
    }

    /// Write the morphology conditions, if any.
    pub fn write(
        conditions: &[BoundaryCondition],
        path: &Path,
        geometry: &dyn GeometryProvider,
        reference_date: Option<NaiveDateTime>,
    ) -> Result<Option<PathBuf>> {
        let grouped = group_morphology(conditions, geometry, reference_date)?;
        if grouped.blocks.is_empty() {
            return Ok(None);
        }
        BcFile::write_blocks(path, &grouped.blocks)?;
        Ok(Some(path.to_path_buf()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lateral {
    pub id: String,
    pub time_interpolation: TimeInterpolation,
    pub times: Vec<NaiveDateTime>,
    pub discharges: Vec<f64>,
    pub unit: String,
}

impl Lateral {
    pub fn new(id: &str) -> Self {
        Lateral {
            id: id.to_owned(),
            time_interpolation: TimeInterpolation::Linear,
            times: vec![],
            discharges: vec![],
            unit: "m3/s".to_owned(),
        }
    }
}

pub const LATERAL_QUANTITY: &str = "lateral_discharge";

/// The time-series block for one lateral: `time` in seconds since
/// `reference_date`, then the discharge.
pub fn lateral_block(lateral: &Lateral, reference_date: NaiveDateTime) -> Result<ForcingBlock> {
    if lateral.times.len() != lateral.discharges.len() {
        return model_err!(
            MismatchedSeries,
            format!(
                "lateral {} has {} times and {} discharges",
                lateral.id,
                lateral.times.len(),
                lateral.discharges.len()
            )
        );
    }
    let seconds = lateral
        .times
        .iter()
        .map(|t| format_decimal((*t - reference_date).num_milliseconds() as f64 / 1000.0))
        .collect();
    let discharges = lateral.discharges.iter().map(|q| format_decimal(*q)).collect();

    let mut block = ForcingBlock::new(&lateral.id, FunctionType::TimeSeries);
    block.time_interpolation = Some(lateral.time_interpolation.as_str().to_owned());
    block
        .quantities
        .push(QuantityRecord::new("time", &seconds_since(reference_date)).with_values(seconds));
    block
        .quantities
        .push(QuantityRecord::new(LATERAL_QUANTITY, &lateral.unit).with_values(discharges));
    Ok(block)
}

/// Inverse of [`lateral_block`].
pub fn lateral_from_block(block: &ForcingBlock) -> Result<Lateral> {
    let (Some(time), Some(discharge)) = (block.quantity("time"), block.quantities.get(1)) else {
        return model_err!(
            MismatchedSeries,
            format!("lateral block {} needs time and discharge", block.support_point)
        );
    };
    let mut lateral = Lateral::new(&block.support_point);
    if let Some(ti) = block.time_interpolation.as_deref().and_then(TimeInterpolation::parse) {
        lateral.time_interpolation = ti;
    }
    lateral.times = time.as_times()?;
    lateral.discharges = discharge.as_f64s()?;
    lateral.unit = discharge.unit.clone();
    Ok(lateral)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::diagnostics::Diagnostics;
    use crate::grouping::{BoundaryQuantity, DataType, PointSeries, Series};
    use chrono::NaiveDate;
    use std::collections::HashMap;

    const ASTRO: &str = "[General]
fileVersion = 1.01
fileType    = boundConds

[forcing]
Name     = p1
Function = astronomic
Quantity = astronomic component
Unit     = -
Quantity = waterlevelbnd amplitude
Unit     = m
Quantity = waterlevelbnd phase
Unit     = deg
M2 1.0 0.0
S2 0.5 90.0

[Forcing]
Name     = p2
Function = astronomic
Quantity = astronomic component
Unit     = -
Quantity = waterlevelbnd amplitude
Unit     = m
Quantity = waterlevelbnd phase
Unit     = deg
M2 1.1 10.0
S2 0.6 95.0
";

    fn no_geometry() -> HashMap<String, usize> {
        HashMap::new()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_astronomic_blocks() {
        let mut diags = Diagnostics::new();
        let blocks = BcFile::parse(ASTRO, Path::new("a.bc"), &mut diags).unwrap();
        assert_eq!(2, blocks.len());
        assert_eq!("p1", blocks[0].support_point);
        assert_eq!("p2", blocks[1].support_point);
        for block in blocks.iter() {
            assert_eq!(3, block.quantities.len());
            assert!(block.quantities.iter().all(|q| q.values.len() == 2));
        }
        assert!(diags.is_empty());
    }

    #[test]
    fn test_unsupported_section_per_occurrence() {
        let text = "[General]\n[foo]\na = 1\n[forcing]\nname = p\nfunction = timeseries\nquantity = time\nunit = s\n[foo]\n";
        let mut diags = Diagnostics::new();
        let blocks = BcFile::parse(text, Path::new("x.bc"), &mut diags).unwrap();
        assert_eq!(1, blocks.len());
        assert_eq!(2, diags.count_matching(Severity::Warning, "Section [foo] not supported"));
        assert_eq!(
            "Section [foo] not supported on line 2. File: x.bc",
            diags.all()[0].message
        );
    }

    #[test]
    fn test_incomplete_block_is_warning() {
        let text = "[forcing]\nfunction = timeseries\n[forcing]\nname = p\nfunction = timeseries\nquantity = time\nunit = s\n0\n";
        let mut diags = Diagnostics::new();
        let blocks = BcFile::parse(text, Path::new("x.bc"), &mut diags).unwrap();
        assert_eq!(1, blocks.len());
        assert_eq!(0, diags.errors().count());
        assert_eq!(1, diags.warnings().count());
        let warning = diags.warnings().next().unwrap();
        assert_eq!(Some(1), warning.line);
        assert_eq!(Some(Path::new("x.bc").to_path_buf()), warning.file);
    }

    #[test]
    fn test_row_mismatch_aborts() {
        let text = "[forcing]\nname = p\nfunction = timeseries\nquantity = time\nunit = s\nquantity = waterlevelbnd\nunit = m\n0\n";
        let err = BcFile::parse(text, Path::new("x.bc"), &mut Diagnostics::new()).unwrap_err();
        assert_eq!(ErrorCode::RowColumnMismatch, err.code);
        assert_eq!(Some(8), err.line());
    }

    #[test]
    fn test_render_round_trip() {
        let mut diags = Diagnostics::new();
        let blocks = BcFile::parse(ASTRO, Path::new("a.bc"), &mut diags).unwrap();
        let text = BcFile::render(&blocks).unwrap();
        assert!(text.starts_with("[General]\nfileVersion       = 1.01\nfileType          = boundConds\n\n[forcing]\nname              = p1\n"));
        let again = BcFile::parse(&text, Path::new("a.bc"), &mut diags).unwrap();
        let strip = |b: &[ForcingBlock]| -> Vec<(String, Vec<QuantityRecord>)> {
            b.iter().map(|b| (b.support_point.clone(), b.quantities.clone())).collect()
        };
        assert_eq!(strip(&blocks), strip(&again));
    }

    #[test]
    fn test_lateral_block() {
        let reference = date(2023, 7, 31);
        let mut lateral = Lateral::new("lat1");
        lateral.times = (1..=3).map(|i| reference + chrono::Duration::seconds(60 * i)).collect();
        lateral.discharges = vec![1.0, 2.5, 3.0];

        let block = lateral_block(&lateral, reference).unwrap();
        assert_eq!(2, block.quantities.len());
        assert_eq!("time", block.quantities[0].name);
        assert_eq!("seconds since 2023-07-31 00:00:00", block.quantities[0].unit);
        assert_eq!(vec!["60", "120", "180"], block.quantities[0].values);
        assert_eq!("lateral_discharge", block.quantities[1].name);
        assert_eq!(vec!["1", "2.5", "3"], block.quantities[1].values);

        let back = lateral_from_block(&block).unwrap();
        assert_eq!(lateral, back);
    }

    #[test]
    fn test_lateral_mismatch() {
        let mut lateral = Lateral::new("lat1");
        lateral.discharges = vec![1.0];
        let err = lateral_block(&lateral, date(2023, 7, 31)).unwrap_err();
        assert_eq!(ErrorCode::MismatchedSeries, err.code);
    }

    fn astro_correction() -> BoundaryCondition {
        let s = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        BoundaryCondition::new("left", BoundaryQuantity::WaterLevel, DataType::AstroCorrection).with_point(
            PointSeries {
                index: 0,
                argument: Series::new("-", s(&["M2"])),
                components: vec![
                    Series::new("m", s(&["1"])),
                    Series::new("deg", s(&["0"])),
                    Series::new("-", s(&["0.9"])),
                    Series::new("deg", s(&["2"])),
                ],
                vertical: None,
            },
        )
    }

    #[test]
    fn test_write_splits_correction_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bnd.bc");
        let mut diags = Diagnostics::new();
        let written = BcFile::write(
            &[astro_correction()],
            &path,
            &no_geometry(),
            &BcWriteOptions::default(),
            &mut diags,
        )
        .unwrap();
        assert_eq!(vec![path.clone(), tmp.path().join("bnd_corr.bc")], written);

        let main = BcFile::read(&path, &mut diags).unwrap();
        assert_eq!("astronomic", main[0].function_type);
        let corr = BcFile::read(&written[1], &mut diags).unwrap();
        assert_eq!("astronomic-correction", corr[0].function_type);
        assert_eq!(vec!["0.9"], corr[0].quantities[1].values);
    }

    #[test]
    fn test_write_per_quantity() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bnd.bc");
        let mut salinity = astro_correction();
        salinity.quantity = BoundaryQuantity::Salinity;
        salinity.data_type = DataType::AstroComponents;
        salinity.points[0].components.truncate(2);

        let options = BcWriteOptions {
            mode: WriteMode::FilePerQuantity,
            reference_date: None,
        };
        let written = BcFile::write(
            &[astro_correction(), salinity],
            &path,
            &no_geometry(),
            &options,
            &mut Diagnostics::new(),
        )
        .unwrap();
        assert_eq!(
            vec![
                tmp.path().join("bnd_waterlevelbnd.bc"),
                tmp.path().join("bnd_waterlevelbnd_corr.bc"),
                tmp.path().join("bnd_salinitybnd.bc"),
            ],
            written
        );
    }

    #[test]
    fn test_bcm_only_morphology() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("morph.bcm");
        let s = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let morph = BoundaryCondition::new(
            "left",
            BoundaryQuantity::MorphologyBedLevelPrescribed,
            DataType::TimeSeries,
        )
        .with_point(PointSeries {
            index: 0,
            argument: Series::new("seconds since 2001-01-01 00:00:00", s(&["0"])),
            components: vec![Series::new("m", s(&["-5"]))],
            vertical: None,
        });

        let written = BcmFile::write(&[astro_correction(), morph.clone()], &path, &no_geometry(), None).unwrap();
        assert_eq!(Some(path.clone()), written);
        let blocks = BcmFile::read(&path, &mut Diagnostics::new()).unwrap();
        assert_eq!(1, blocks.len());
        assert_eq!("bedlevelbnd", blocks[0].quantities[1].name);

        let none = BcmFile::write(&[astro_correction()], &tmp.path().join("x.bcm"), &no_geometry(), None).unwrap();
        assert_eq!(None, none);

        // and the flow writer leaves it out
        let written = BcFile::write(
            &[morph],
            &tmp.path().join("flow.bc"),
            &no_geometry(),
            &BcWriteOptions::default(),
            &mut Diagnostics::new(),
        )
        .unwrap();
        assert!(written.is_empty());
    }
}
