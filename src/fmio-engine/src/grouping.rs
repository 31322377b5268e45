// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Boundary conditions and their mapping to forcing blocks.
//!
//! A [`BoundaryCondition`] holds data for some of the support points of
//! one feature (a boundary polyline).  Writing turns every (condition,
//! point) pair into one block, ordered by feature, then point, then
//! definition order.  Two conditions on the same point are never merged,
//! even when one is a time series and the other a harmonic correction.
//! Reading goes the other way and merges a correction block with the
//! signal block at the same point.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::common::{Result, canonicalize, eq_ignore_case};
use crate::forcing::{
    ForcingBlock, FunctionType, QuantityRecord, TimeInterpolation, VerticalInterpolation,
    parse_time_unit, seconds_since,
};
use crate::format::format_decimal;
use crate::model_err;
use crate::schema::{KnownQuantities, QuantitySchema};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Empty,
    TimeSeries,
    AstroComponents,
    AstroCorrection,
    Harmonics,
    HarmonicCorrection,
    Qh,
}

impl DataType {
    /// Series per variable: amplitude and phase for spectra, plus the
    /// two correction columns for correction types.
    pub fn components_per_variable(&self) -> usize {
        match self {
            DataType::Empty => 0,
            DataType::TimeSeries | DataType::Qh => 1,
            DataType::AstroComponents | DataType::Harmonics => 2,
            DataType::AstroCorrection | DataType::HarmonicCorrection => 4,
        }
    }

    pub fn is_correction(&self) -> bool {
        matches!(self, DataType::AstroCorrection | DataType::HarmonicCorrection)
    }

    /// Astronomic and astronomic-correction count as the same family,
    /// likewise harmonic and harmonic-correction.
    pub fn is_similar(&self, other: DataType) -> bool {
        self.family() == other.family()
    }

    fn family(&self) -> DataType {
        match self {
            DataType::AstroCorrection => DataType::AstroComponents,
            DataType::HarmonicCorrection => DataType::Harmonics,
            other => *other,
        }
    }

    fn signal_function(&self, vertical: bool) -> Option<FunctionType> {
        match self {
            DataType::Empty => None,
            DataType::TimeSeries if vertical => Some(FunctionType::T3D),
            DataType::TimeSeries => Some(FunctionType::TimeSeries),
            DataType::AstroComponents | DataType::AstroCorrection => Some(FunctionType::Astronomic),
            DataType::Harmonics | DataType::HarmonicCorrection => Some(FunctionType::Harmonic),
            DataType::Qh => Some(FunctionType::QhTable),
        }
    }

    fn correction_function(&self) -> Option<FunctionType> {
        match self {
            DataType::AstroCorrection => Some(FunctionType::AstronomicCorrection),
            DataType::HarmonicCorrection => Some(FunctionType::HarmonicCorrection),
            _ => None,
        }
    }

    fn from_function(function: FunctionType) -> DataType {
        match function {
            FunctionType::TimeSeries | FunctionType::T3D => DataType::TimeSeries,
            FunctionType::Astronomic => DataType::AstroComponents,
            FunctionType::AstronomicCorrection => DataType::AstroCorrection,
            FunctionType::Harmonic => DataType::Harmonics,
            FunctionType::HarmonicCorrection => DataType::HarmonicCorrection,
            FunctionType::QhTable => DataType::Qh,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryQuantity {
    WaterLevel,
    Discharge,
    Qh,
    Velocity,
    Neumann,
    Riemann,
    RiemannVelocity,
    NormalVelocity,
    TangentialVelocity,
    VelocityVector,
    Salinity,
    Temperature,
    Tracer(String),
    SedimentConcentration(String),
    MorphologyBedLevelPrescribed,
    MorphologyBedLevelChangePrescribed,
    MorphologyBedLoadTransport,
    MorphologyBedLevelFixed,
}

impl BoundaryQuantity {
    /// The quantity name used in boundary and bc files.
    pub fn name(&self) -> String {
        use BoundaryQuantity::*;
        match self {
            WaterLevel => "waterlevelbnd".to_owned(),
            Discharge => "dischargebnd".to_owned(),
            Qh => "qhbnd".to_owned(),
            Velocity => "velocitybnd".to_owned(),
            Neumann => "neumannbnd".to_owned(),
            Riemann => "riemannbnd".to_owned(),
            RiemannVelocity => "riemann_velocitybnd".to_owned(),
            NormalVelocity => "normalvelocitybnd".to_owned(),
            TangentialVelocity => "tangentialvelocitybnd".to_owned(),
            VelocityVector => "uxuyadvectionvelocitybnd".to_owned(),
            Salinity => "salinitybnd".to_owned(),
            Temperature => "temperaturebnd".to_owned(),
            Tracer(name) => format!("tracerbnd{name}"),
            SedimentConcentration(fraction) => format!("sedfracbnd{fraction}"),
            MorphologyBedLevelPrescribed => "bedlevelbnd".to_owned(),
            MorphologyBedLevelChangePrescribed => "bedlevelchangebnd".to_owned(),
            MorphologyBedLoadTransport => "bedloadbnd".to_owned(),
            MorphologyBedLevelFixed => "bedlevelfixed".to_owned(),
        }
    }

    /// Per-column variable names; only the advection velocity has two.
    pub fn variables(&self) -> Vec<String> {
        match self {
            BoundaryQuantity::VelocityVector => vec![
                "uxuyadvectionvelocitybndx".to_owned(),
                "uxuyadvectionvelocitybndy".to_owned(),
            ],
            other => vec![other.name()],
        }
    }

    pub fn from_name(name: &str) -> Option<BoundaryQuantity> {
        use BoundaryQuantity::*;
        let name = canonicalize(name);
        let quantity = match name.as_str() {
            "waterlevelbnd" => WaterLevel,
            "dischargebnd" => Discharge,
            "qhbnd" => Qh,
            "velocitybnd" => Velocity,
            "neumannbnd" => Neumann,
            "riemannbnd" => Riemann,
            "riemann_velocitybnd" => RiemannVelocity,
            "normalvelocitybnd" => NormalVelocity,
            "tangentialvelocitybnd" => TangentialVelocity,
            "uxuyadvectionvelocitybnd" | "uxuyadvectionvelocitybndx" | "uxuyadvectionvelocitybndy" => {
                VelocityVector
            }
            "salinitybnd" => Salinity,
            "temperaturebnd" => Temperature,
            "bedlevelbnd" => MorphologyBedLevelPrescribed,
            "bedlevelchangebnd" => MorphologyBedLevelChangePrescribed,
            "bedloadbnd" => MorphologyBedLoadTransport,
            "bedlevelfixed" => MorphologyBedLevelFixed,
            _ => {
                let found = KnownQuantities.lookup(&name)?;
                let suffix = found.suffix?;
                return match found.info.name {
                    "tracerbnd" => Some(Tracer(suffix)),
                    "sedfracbnd" => Some(SedimentConcentration(suffix)),
                    _ => None,
                };
            }
        };
        Some(quantity)
    }

    /// The semantic tag that keeps a quantity out of the flow bc file.
    pub fn is_morphology(&self) -> bool {
        matches!(
            self,
            BoundaryQuantity::MorphologyBedLevelPrescribed
                | BoundaryQuantity::MorphologyBedLevelChangePrescribed
                | BoundaryQuantity::MorphologyBedLoadTransport
                | BoundaryQuantity::MorphologyBedLevelFixed
        )
    }

    /// Process name used by [`WriteMode::FilePerProcess`].
    pub fn process(&self) -> &'static str {
        KnownQuantities
            .lookup(&self.variables()[0])
            .map(|m| m.info.process)
            .unwrap_or("flow")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub unit: String,
    pub values: Vec<String>,
}

impl Series {
    pub fn new(unit: &str, values: Vec<String>) -> Self {
        Series {
            unit: unit.to_owned(),
            values,
        }
    }

    pub fn from_f64s(unit: &str, values: &[f64]) -> Self {
        Series::new(unit, values.iter().map(|v| format_decimal(*v)).collect())
    }

    fn constant(&self, rows: usize, value: &str) -> Series {
        Series::new(&self.unit, vec![value.to_owned(); rows])
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerticalProfile {
    pub position_type: String,
    pub positions: Vec<String>,
}

impl VerticalProfile {
    pub fn layers(&self) -> usize {
        self.positions.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointSeries {
    /// 0-based support point index on the feature.
    pub index: usize,
    pub argument: Series,
    pub components: Vec<Series>,
    pub vertical: Option<VerticalProfile>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCondition {
    pub feature: String,
    pub quantity: BoundaryQuantity,
    pub data_type: DataType,
    pub time_interpolation: TimeInterpolation,
    pub vertical_interpolation: VerticalInterpolation,
    pub offset: f64,
    pub factor: f64,
    pub points: Vec<PointSeries>,
}

impl BoundaryCondition {
    pub fn new(feature: &str, quantity: BoundaryQuantity, data_type: DataType) -> Self {
        BoundaryCondition {
            feature: feature.to_owned(),
            quantity,
            data_type,
            time_interpolation: TimeInterpolation::Linear,
            vertical_interpolation: VerticalInterpolation::Linear,
            offset: 0.0,
            factor: 1.0,
            points: vec![],
        }
    }

    pub fn with_point(mut self, point: PointSeries) -> Self {
        self.points.push(point);
        self
    }

    fn point(&self, index: usize) -> Option<&PointSeries> {
        self.points.iter().find(|p| p.index == index)
    }
}

/// Collaborator interface: how many support points a feature has.
pub trait GeometryProvider {
    fn support_point_count(&self, feature: &str) -> Option<usize>;
}

impl GeometryProvider for HashMap<String, usize> {
    fn support_point_count(&self, feature: &str) -> Option<usize> {
        self.get(feature).copied().or_else(|| {
            self.iter()
                .find(|(name, _)| eq_ignore_case(name, feature))
                .map(|(_, n)| *n)
        })
    }
}

/// How boundary conditions are split over bc files.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteMode {
    #[default]
    SingleFile,
    FilePerFeature,
    FilePerProcess,
    FilePerQuantity,
}

impl WriteMode {
    /// The sub-file tag a condition is written under; empty for the
    /// base file.
    pub fn discriminator(&self, condition: &BoundaryCondition) -> String {
        match self {
            WriteMode::SingleFile => String::new(),
            WriteMode::FilePerFeature => condition.feature.clone(),
            WriteMode::FilePerProcess => condition.quantity.process().to_owned(),
            WriteMode::FilePerQuantity => condition.quantity.name(),
        }
    }
}

/// `base` with `_tag` inserted before the extension.
pub fn tagged_path(base: &Path, tag: &str) -> PathBuf {
    if tag.is_empty() {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{stem}_{tag}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{tag}"),
    };
    base.with_file_name(name)
}

pub fn support_point_name(feature: &str, index: usize) -> String {
    format!("{feature}_{:04}", index + 1)
}

/// Split `feature_NNNN` into the feature name and 0-based index.
pub fn split_support_point(name: &str) -> Result<(String, usize)> {
    let parsed = name.rsplit_once('_').and_then(|(feature, number)| {
        if feature.is_empty() || number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let n = number.parse::<usize>().ok()?;
        (n > 0).then(|| (feature.to_owned(), n - 1))
    });
    match parsed {
        Some(parsed) => Ok(parsed),
        None => model_err!(
            UnknownSupportPoint,
            format!("support point name '{name}' is not of the form feature_NNNN")
        ),
    }
}

fn check_point(geometry: &dyn GeometryProvider, feature: &str, index: usize) -> Result<()> {
    match geometry.support_point_count(feature) {
        Some(count) if index >= count => model_err!(
            UnknownSupportPoint,
            format!(
                "support point {} does not exist; feature {feature} has {count} points",
                support_point_name(feature, index)
            )
        ),
        _ => Ok(()),
    }
}

/// Blocks ready to write: signal blocks for the main file and the
/// correction halves for the `_corr` file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Grouped {
    pub blocks: Vec<ForcingBlock>,
    pub corrections: Vec<ForcingBlock>,
}

/// Whether `group` writes this condition at all.
pub fn is_writable(condition: &BoundaryCondition) -> bool {
    condition.data_type != DataType::Empty && !condition.quantity.is_morphology()
}

/// Turn boundary conditions into blocks.  Morphology quantities and
/// conditions without data are skipped.  Time arguments are rewritten
/// as seconds since `reference` when one is given.
pub fn group(
    conditions: &[BoundaryCondition],
    geometry: &dyn GeometryProvider,
    reference: Option<NaiveDateTime>,
) -> Result<Grouped> {
    let writable: Vec<&BoundaryCondition> = conditions.iter().filter(|c| is_writable(c)).collect();
    blocks_for(&writable, geometry, reference)
}

/// Like [`group`], for morphology conditions only.
pub fn group_morphology(
    conditions: &[BoundaryCondition],
    geometry: &dyn GeometryProvider,
    reference: Option<NaiveDateTime>,
) -> Result<Grouped> {
    let writable: Vec<&BoundaryCondition> = conditions
        .iter()
        .filter(|c| c.data_type != DataType::Empty && c.quantity.is_morphology())
        .collect();
    blocks_for(&writable, geometry, reference)
}

fn blocks_for(
    conditions: &[&BoundaryCondition],
    geometry: &dyn GeometryProvider,
    reference: Option<NaiveDateTime>,
) -> Result<Grouped> {
    let series_indices: Vec<usize> = conditions
        .iter()
        .enumerate()
        .map(|(i, c)| {
            1 + conditions[..i]
                .iter()
                .filter(|prev| {
                    eq_ignore_case(&prev.feature, &c.feature)
                        && prev.quantity == c.quantity
                        && prev.data_type.is_similar(c.data_type)
                })
                .count()
        })
        .collect();

    let mut features: Vec<&str> = vec![];
    for c in conditions.iter() {
        if !features.iter().any(|f| eq_ignore_case(f, &c.feature)) {
            features.push(&c.feature);
        }
    }

    let mut grouped = Grouped::default();
    for feature in features {
        let on_feature: Vec<(usize, &BoundaryCondition)> = conditions
            .iter()
            .enumerate()
            .filter(|(_, c)| eq_ignore_case(&c.feature, feature))
            .map(|(i, c)| (i, *c))
            .collect();

        let mut indices: Vec<usize> = on_feature
            .iter()
            .flat_map(|(_, c)| c.points.iter().map(|p| p.index))
            .collect();
        indices.sort_unstable();
        indices.dedup();

        for index in indices {
            check_point(geometry, feature, index)?;
            for (i, condition) in on_feature.iter() {
                let Some(point) = condition.point(index) else {
                    continue;
                };
                let (block, correction) =
                    point_blocks(condition, point, series_indices[*i], reference)?;
                grouped.blocks.push(block);
                grouped.corrections.extend(correction);
            }
        }
    }
    Ok(grouped)
}

fn time_argument(argument: &Series, reference: Option<NaiveDateTime>) -> Result<QuantityRecord> {
    let record = QuantityRecord::new("time", &argument.unit).with_values(argument.values.clone());
    let Some(reference) = reference else {
        return Ok(record);
    };
    let (_, own_reference) = parse_time_unit(&argument.unit)?;
    if own_reference == reference && argument.unit.trim_start().starts_with("seconds") {
        return Ok(record);
    }
    let values = record
        .as_times()?
        .into_iter()
        .map(|t| format_decimal((t - reference).num_milliseconds() as f64 / 1000.0))
        .collect();
    Ok(QuantityRecord::new("time", &seconds_since(reference)).with_values(values))
}

fn point_blocks(
    condition: &BoundaryCondition,
    point: &PointSeries,
    series_index: usize,
    reference: Option<NaiveDateTime>,
) -> Result<(ForcingBlock, Option<ForcingBlock>)> {
    let data_type = condition.data_type;
    let name = support_point_name(&condition.feature, point.index);
    let vertical = point
        .vertical
        .as_ref()
        .filter(|_| data_type == DataType::TimeSeries);
    let layers = vertical.map(|v| v.layers()).unwrap_or(1);
    let variables = condition.quantity.variables();
    let per_variable = data_type.components_per_variable();

    let expected = variables.len() * per_variable * layers;
    if point.components.len() != expected {
        return model_err!(
            MismatchedSeries,
            format!(
                "{} {:?} at {name} has {} series, expected {expected}",
                condition.quantity.name(),
                data_type,
                point.components.len()
            )
        );
    }

    let Some(function) = data_type.signal_function(vertical.is_some()) else {
        return model_err!(UnsupportedDataType, format!("no data for {name}"));
    };

    let mut block = ForcingBlock::new(&name, function);
    block.series_index = Some(series_index);
    block.offset = condition.offset;
    block.factor = condition.factor;
    if data_type == DataType::TimeSeries {
        block.time_interpolation = Some(condition.time_interpolation.as_str().to_owned());
    }
    if let Some(v) = vertical {
        block.vertical_position_type = Some(v.position_type.clone());
        block.vertical_positions = Some(v.positions.join(" "));
        block.vertical_interpolation = Some(condition.vertical_interpolation.as_str().to_owned());
    }

    let argument = if function.argument_quantity() == "time" {
        time_argument(&point.argument, reference)?
    } else {
        QuantityRecord::new(function.argument_quantity(), &point.argument.unit)
            .with_values(point.argument.values.clone())
    };
    block.quantities.push(argument.clone());

    let mut correction = data_type.correction_function().map(|f| {
        let mut c = block.clone();
        c.function_type = f.as_str().to_owned();
        c.quantities = vec![argument.clone()];
        c
    });

    let record = |name: String, series: &Series| {
        QuantityRecord::new(&name, &series.unit).with_values(series.values.clone())
    };

    for (v, variable) in variables.iter().enumerate() {
        let comps = &point.components[v * per_variable * layers..(v + 1) * per_variable * layers];
        match data_type {
            DataType::TimeSeries => {
                for (layer, series) in comps.iter().enumerate() {
                    let mut q = record(variable.clone(), series);
                    if vertical.is_some() {
                        q.vertical_position = Some((layer + 1).to_string());
                    }
                    block.quantities.push(q);
                }
            }
            DataType::Qh => {
                block.quantities.push(record(format!("{variable} waterlevel"), &comps[0]));
            }
            _ => {
                block.quantities.push(record(format!("{variable} amplitude"), &comps[0]));
                block.quantities.push(record(format!("{variable} phase"), &comps[1]));
                if let Some(ref mut c) = correction {
                    c.quantities.push(record(format!("{variable} amplitude"), &comps[2]));
                    c.quantities.push(record(format!("{variable} phase"), &comps[3]));
                }
            }
        }
    }

    Ok((block, correction))
}

fn strip_component_suffix(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    for suffix in [" amplitude", " phase", " waterlevel"] {
        if lower.ends_with(suffix) {
            return &name[..name.len() - suffix.len()];
        }
    }
    name
}

fn block_quantity(block: &ForcingBlock) -> Result<BoundaryQuantity> {
    let Some(first) = block.signal().first() else {
        return model_err!(
            MismatchedSeries,
            format!("block {} has no signal quantities", block.support_point)
        );
    };
    let name = strip_component_suffix(&first.name);
    match BoundaryQuantity::from_name(name) {
        Some(q) => Ok(q),
        None => model_err!(
            UnsupportedDataType,
            format!("unknown boundary quantity '{name}' in block {}", block.support_point)
        ),
    }
}

fn series(record: &QuantityRecord) -> Series {
    Series::new(&record.unit, record.values.clone())
}

/// Rebuild boundary conditions from blocks read from a bc file.
pub fn populate(blocks: &[ForcingBlock], geometry: &dyn GeometryProvider) -> Result<Vec<BoundaryCondition>> {
    let mut conditions: Vec<(usize, BoundaryCondition)> = vec![];
    let mut corrections: Vec<&ForcingBlock> = vec![];

    let located = |block: &ForcingBlock, err: crate::common::Error| match block.file {
        Some(ref file) => err.at(file, block.line),
        None => err,
    };

    for block in blocks {
        let function = block.function().map_err(|e| located(block, e))?;
        if function.is_correction() {
            corrections.push(block);
            continue;
        }
        let (feature, index) = split_support_point(&block.support_point).map_err(|e| located(block, e))?;
        check_point(geometry, &feature, index).map_err(|e| located(block, e))?;
        let quantity = block_quantity(block).map_err(|e| located(block, e))?;
        let data_type = DataType::from_function(function);
        let series_index = block.series_index.unwrap_or(1);

        let vertical = match (function, &block.vertical_positions) {
            (FunctionType::T3D, Some(positions)) => Some(VerticalProfile {
                position_type: block.vertical_position_type.clone().unwrap_or_default(),
                positions: positions.split_whitespace().map(|s| s.to_owned()).collect(),
            }),
            _ => None,
        };

        let point = PointSeries {
            index,
            argument: series(&block.quantities[0]),
            components: block.signal().iter().map(series).collect(),
            vertical,
        };

        let existing = conditions.iter_mut().find(|(si, c)| {
            *si == series_index
                && eq_ignore_case(&c.feature, &feature)
                && c.quantity == quantity
                && c.data_type.is_similar(data_type)
        });
        match existing {
            Some((_, condition)) => condition.points.push(point),
            None => {
                let mut condition = BoundaryCondition::new(&feature, quantity, data_type);
                if let Some(ti) = block.time_interpolation.as_deref().and_then(TimeInterpolation::parse) {
                    condition.time_interpolation = ti;
                }
                if let Some(vi) = block
                    .vertical_interpolation
                    .as_deref()
                    .and_then(VerticalInterpolation::parse)
                {
                    condition.vertical_interpolation = vi;
                }
                condition.offset = block.offset;
                condition.factor = block.factor;
                conditions.push((series_index, condition.with_point(point)));
            }
        }
    }

    for block in corrections {
        merge_correction(&mut conditions, block).map_err(|e| located(block, e))?;
    }

    let mut conditions: Vec<BoundaryCondition> = conditions.into_iter().map(|(_, c)| c).collect();
    for condition in conditions.iter_mut().filter(|c| c.data_type.is_correction()) {
        let variables = condition.quantity.variables().len();
        for point in condition.points.iter_mut() {
            if point.components.len() == variables * 2 {
                let rows = point.argument.values.len();
                let mut merged = vec![];
                for pair in point.components.chunks(2) {
                    merged.extend_from_slice(pair);
                    merged.push(pair[0].constant(rows, "1"));
                    merged.push(pair[1].constant(rows, "0"));
                }
                point.components = merged;
            }
        }
    }
    Ok(conditions)
}

/// Fold a `*-correction` block into the signal condition at the same
/// support point.  Rows are matched by component name; correction rows
/// for components the signal lacks are added with a zero signal.
fn merge_correction(conditions: &mut [(usize, BoundaryCondition)], block: &ForcingBlock) -> Result<()> {
    let function = block.function()?;
    let data_type = DataType::from_function(function);
    let (feature, index) = split_support_point(&block.support_point)?;
    let quantity = block_quantity(block)?;
    let series_index = block.series_index.unwrap_or(1);

    let target = conditions.iter_mut().find(|(si, c)| {
        *si == series_index
            && eq_ignore_case(&c.feature, &feature)
            && c.quantity == quantity
            && c.data_type.is_similar(data_type)
            && c.point(index).is_some()
    });
    let Some((_, condition)) = target else {
        return model_err!(
            UnsupportedDataType,
            format!("correction block {} has no matching signal block", block.support_point)
        );
    };
    condition.data_type = data_type;

    let Some(point) = condition.points.iter_mut().find(|p| p.index == index) else {
        return Ok(());
    };
    let corr_argument = &block.quantities[0].values;
    let corr_signal = block.signal();

    let mut argument = point.argument.values.clone();
    for name in corr_argument.iter() {
        if !argument.iter().any(|a| eq_ignore_case(a, name)) {
            argument.push(name.clone());
        }
    }
    let rows = argument.len();

    let mut merged = vec![];
    for (v, pair) in point.components.chunks(2).enumerate() {
        for signal in pair {
            let mut values = signal.values.clone();
            values.resize(rows, "0".to_owned());
            merged.push(Series::new(&signal.unit, values));
        }
        for (c, default) in [(0, "1"), (1, "0")] {
            let Some(corr) = corr_signal.get(v * 2 + c) else {
                merged.push(Series::new("-", vec![default.to_owned(); rows]));
                continue;
            };
            let values = argument
                .iter()
                .map(|name| {
                    corr_argument
                        .iter()
                        .position(|a| eq_ignore_case(a, name))
                        .and_then(|row| corr.values.get(row).cloned())
                        .unwrap_or_else(|| default.to_owned())
                })
                .collect();
            merged.push(Series::new(&corr.unit, values));
        }
    }
    point.argument.values = argument;
    point.components = merged;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn timeseries(feature: &str, quantity: BoundaryQuantity, index: usize) -> BoundaryCondition {
        BoundaryCondition::new(feature, quantity, DataType::TimeSeries).with_point(PointSeries {
            index,
            argument: Series::new("seconds since 2001-01-01 00:00:00", strings(&["0", "60"])),
            components: vec![Series::new("m", strings(&["1", "2"]))],
            vertical: None,
        })
    }

    fn astro(feature: &str, index: usize, correction: bool) -> BoundaryCondition {
        let mut components = vec![
            Series::new("m", strings(&["1.0", "0.5"])),
            Series::new("deg", strings(&["10", "20"])),
        ];
        let data_type = if correction {
            components.push(Series::new("-", strings(&["0.9", "1.1"])));
            components.push(Series::new("deg", strings(&["2", "3"])));
            DataType::AstroCorrection
        } else {
            DataType::AstroComponents
        };
        BoundaryCondition::new(feature, BoundaryQuantity::WaterLevel, data_type).with_point(PointSeries {
            index,
            argument: Series::new("-", strings(&["M2", "S2"])),
            components,
            vertical: None,
        })
    }

    fn no_geometry() -> HashMap<String, usize> {
        HashMap::new()
    }

    #[test]
    fn test_support_point_names() {
        assert_eq!("left_0001", support_point_name("left", 0));
        assert_eq!("left_0012", support_point_name("left", 11));
        assert_eq!(("left".to_owned(), 11), split_support_point("left_0012").unwrap());
        assert_eq!(
            ("my_bnd".to_owned(), 0),
            split_support_point("my_bnd_0001").unwrap()
        );
        assert!(split_support_point("left").is_err());
        assert!(split_support_point("left_0000").is_err());
    }

    #[test]
    fn test_group_order_feature_then_point() {
        let conditions = vec![
            timeseries("left", BoundaryQuantity::WaterLevel, 1),
            timeseries("right", BoundaryQuantity::WaterLevel, 0),
            timeseries("left", BoundaryQuantity::Salinity, 0),
        ];
        let grouped = group(&conditions, &no_geometry(), None).unwrap();
        let names: Vec<(&str, &str)> = grouped
            .blocks
            .iter()
            .map(|b| (b.support_point.as_str(), b.quantities[1].name.as_str()))
            .collect();
        assert_eq!(
            vec![
                ("left_0001", "salinitybnd"),
                ("left_0002", "waterlevelbnd"),
                ("right_0001", "waterlevelbnd")
            ],
            names
        );
        assert!(grouped.corrections.is_empty());
    }

    #[test]
    fn test_group_keeps_distinct_data_types() {
        let conditions = vec![
            timeseries("left", BoundaryQuantity::WaterLevel, 0),
            astro("left", 0, true),
            astro("left", 0, false),
        ];
        let grouped = group(&conditions, &no_geometry(), None).unwrap();
        assert_eq!(3, grouped.blocks.len());
        let functions: Vec<&str> = grouped.blocks.iter().map(|b| b.function_type.as_str()).collect();
        assert_eq!(vec!["timeseries", "astronomic", "astronomic"], functions);
        // astro and astro-correction are similar, so the second is index 2
        assert_eq!(Some(1), grouped.blocks[1].series_index);
        assert_eq!(Some(2), grouped.blocks[2].series_index);
        assert_eq!(Some(1), grouped.blocks[0].series_index);
        assert_eq!(1, grouped.corrections.len());
        assert_eq!("astronomic-correction", grouped.corrections[0].function_type);
    }

    #[test]
    fn test_group_excludes_morphology() {
        let conditions = vec![
            timeseries("left", BoundaryQuantity::MorphologyBedLevelPrescribed, 0),
            timeseries("left", BoundaryQuantity::WaterLevel, 0),
            BoundaryCondition::new("left", BoundaryQuantity::Discharge, DataType::Empty),
        ];
        let grouped = group(&conditions, &no_geometry(), None).unwrap();
        assert_eq!(1, grouped.blocks.len());
        assert_eq!("waterlevelbnd", grouped.blocks[0].quantities[1].name);

        let morph = group_morphology(&conditions, &no_geometry(), None).unwrap();
        assert_eq!(1, morph.blocks.len());
        assert_eq!("bedlevelbnd", morph.blocks[0].quantities[1].name);
    }

    #[test]
    fn test_group_checks_geometry() {
        let geometry: HashMap<String, usize> = [("left".to_owned(), 1)].into_iter().collect();
        let conditions = vec![timeseries("left", BoundaryQuantity::WaterLevel, 3)];
        let err = group(&conditions, &geometry, None).unwrap_err();
        assert_eq!(ErrorCode::UnknownSupportPoint, err.code);
    }

    #[test]
    fn test_group_rebases_time() {
        let reference = chrono::NaiveDate::from_ymd_opt(2001, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut condition = timeseries("left", BoundaryQuantity::WaterLevel, 0);
        condition.points[0].argument = Series::new("minutes since 2001-01-01 00:00:00", strings(&["1", "2"]));
        let grouped = group(&[condition], &no_geometry(), Some(reference)).unwrap();
        let time = &grouped.blocks[0].quantities[0];
        assert_eq!("seconds since 2001-01-01 00:00:00", time.unit);
        assert_eq!(strings(&["60", "120"]), time.values);
    }

    #[test]
    fn test_component_count_checked() {
        let mut condition = astro("left", 0, false);
        condition.data_type = DataType::AstroCorrection;
        let err = group(&[condition], &no_geometry(), None).unwrap_err();
        assert_eq!(ErrorCode::MismatchedSeries, err.code);
    }

    #[test]
    fn test_qh_block() {
        let condition = BoundaryCondition::new("q", BoundaryQuantity::Qh, DataType::Qh).with_point(PointSeries {
            index: 0,
            argument: Series::new("m3/s", strings(&["0", "100"])),
            components: vec![Series::new("m", strings(&["1", "2"]))],
            vertical: None,
        });
        let grouped = group(&[condition.clone()], &no_geometry(), None).unwrap();
        let block = &grouped.blocks[0];
        assert_eq!("qhtable", block.function_type);
        assert_eq!("qhbnd discharge", block.quantities[0].name);
        assert_eq!("qhbnd waterlevel", block.quantities[1].name);
        assert_eq!(None, block.time_interpolation);

        let back = populate(&grouped.blocks, &no_geometry()).unwrap();
        assert_eq!(vec![condition], back);
    }

    #[test]
    fn test_t3d_block() {
        let condition = BoundaryCondition::new("sea", BoundaryQuantity::Salinity, DataType::TimeSeries)
            .with_point(PointSeries {
                index: 0,
                argument: Series::new("seconds since 2001-01-01 00:00:00", strings(&["0"])),
                components: vec![
                    Series::new("ppt", strings(&["30"])),
                    Series::new("ppt", strings(&["31"])),
                ],
                vertical: Some(VerticalProfile {
                    position_type: "percBed".to_owned(),
                    positions: strings(&["0", "100"]),
                }),
            });
        let grouped = group(&[condition.clone()], &no_geometry(), None).unwrap();
        let block = &grouped.blocks[0];
        assert_eq!("t3d", block.function_type);
        assert_eq!(Some("0 100".to_owned()), block.vertical_positions);
        assert_eq!(Some("2".to_owned()), block.quantities[2].vertical_position);

        let back = populate(&grouped.blocks, &no_geometry()).unwrap();
        assert_eq!(vec![condition], back);
    }

    #[test]
    fn test_populate_merges_correction() {
        let condition = astro("left", 0, true);
        let grouped = group(&[condition.clone()], &no_geometry(), None).unwrap();
        let mut blocks = grouped.blocks.clone();
        blocks.extend(grouped.corrections.clone());

        let back = populate(&blocks, &no_geometry()).unwrap();
        assert_eq!(vec![condition], back);
    }

    #[test]
    fn test_populate_correction_subset_of_components() {
        let signal = astro("left", 0, false);
        let grouped = group(&[signal], &no_geometry(), None).unwrap();
        let mut correction = grouped.blocks[0].clone();
        correction.function_type = "astronomic-correction".to_owned();
        correction.quantities = vec![
            QuantityRecord::new("astronomic component", "-").with_values(strings(&["S2"])),
            QuantityRecord::new("waterlevelbnd amplitude", "-").with_values(strings(&["1.2"])),
            QuantityRecord::new("waterlevelbnd phase", "deg").with_values(strings(&["5"])),
        ];
        let mut blocks = grouped.blocks.clone();
        blocks.push(correction);

        let back = populate(&blocks, &no_geometry()).unwrap();
        assert_eq!(1, back.len());
        assert_eq!(DataType::AstroCorrection, back[0].data_type);
        let point = &back[0].points[0];
        assert_eq!(4, point.components.len());
        assert_eq!(strings(&["1", "1.2"]), point.components[2].values);
        assert_eq!(strings(&["0", "5"]), point.components[3].values);
    }

    #[test]
    fn test_populate_unmatched_correction() {
        let mut block = ForcingBlock::new("left_0001", FunctionType::AstronomicCorrection);
        block.quantities = vec![
            QuantityRecord::new("astronomic component", "-").with_values(strings(&["M2"])),
            QuantityRecord::new("waterlevelbnd amplitude", "-").with_values(strings(&["1"])),
            QuantityRecord::new("waterlevelbnd phase", "deg").with_values(strings(&["0"])),
        ];
        let err = populate(&[block], &no_geometry()).unwrap_err();
        assert_eq!(ErrorCode::UnsupportedDataType, err.code);
    }

    #[test]
    fn test_populate_groups_points() {
        let mut a = timeseries("left", BoundaryQuantity::WaterLevel, 0);
        let b = timeseries("left", BoundaryQuantity::WaterLevel, 1);
        a.points.extend(b.points);
        let grouped = group(&[a.clone()], &no_geometry(), None).unwrap();
        assert_eq!(2, grouped.blocks.len());
        let back = populate(&grouped.blocks, &no_geometry()).unwrap();
        assert_eq!(vec![a], back);
    }

    #[test]
    fn test_write_mode_discriminator() {
        let c = timeseries("left", BoundaryQuantity::Salinity, 0);
        assert_eq!("", WriteMode::SingleFile.discriminator(&c));
        assert_eq!("left", WriteMode::FilePerFeature.discriminator(&c));
        assert_eq!("salinity", WriteMode::FilePerProcess.discriminator(&c));
        assert_eq!("salinitybnd", WriteMode::FilePerQuantity.discriminator(&c));
    }

    #[test]
    fn test_tagged_path() {
        assert_eq!(
            PathBuf::from("/m/bnd_waterlevelbnd.bc"),
            tagged_path(Path::new("/m/bnd.bc"), "waterlevelbnd")
        );
        assert_eq!(PathBuf::from("/m/bnd.bc"), tagged_path(Path::new("/m/bnd.bc"), ""));
    }

    #[test]
    fn test_quantity_names() {
        assert_eq!("tracerbndsalt", BoundaryQuantity::Tracer("salt".to_owned()).name());
        assert_eq!(
            Some(BoundaryQuantity::Tracer("salt".to_owned())),
            BoundaryQuantity::from_name("tracerbndsalt")
        );
        assert_eq!(
            Some(BoundaryQuantity::VelocityVector),
            BoundaryQuantity::from_name("uxuyadvectionvelocitybndy")
        );
        assert!(BoundaryQuantity::MorphologyBedLoadTransport.is_morphology());
        assert!(!BoundaryQuantity::WaterLevel.is_morphology());
        assert_eq!(None, BoundaryQuantity::from_name("generalstructure"));
    }
}
