// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Typed view of one `[forcing]` section.
//!
//! Each `quantity`/`unit` pair opens a new column, and the Nth column
//! of every data row that follows belongs to the Nth quantity.  Values
//! stay as strings until a caller asks for them as numbers or times.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use float_cmp::approx_eq;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::common::{Error, Result, canonicalize};
use crate::format::format_coefficient;
use crate::migration::MigrationTable;
use crate::section::{DataRow, Section};
use crate::{format_err, model_err};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionType {
    TimeSeries,
    T3D,
    Astronomic,
    AstronomicCorrection,
    Harmonic,
    HarmonicCorrection,
    QhTable,
}

impl FunctionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionType::TimeSeries => "timeseries",
            FunctionType::T3D => "t3d",
            FunctionType::Astronomic => "astronomic",
            FunctionType::AstronomicCorrection => "astronomic-correction",
            FunctionType::Harmonic => "harmonic",
            FunctionType::HarmonicCorrection => "harmonic-correction",
            FunctionType::QhTable => "qhtable",
        }
    }

    /// Name of the first (argument) quantity of a block of this type.
    pub fn argument_quantity(&self) -> &'static str {
        match self {
            FunctionType::TimeSeries | FunctionType::T3D => "time",
            FunctionType::Astronomic | FunctionType::AstronomicCorrection => "astronomic component",
            FunctionType::Harmonic | FunctionType::HarmonicCorrection => "harmonic component",
            FunctionType::QhTable => "qhbnd discharge",
        }
    }

    pub fn is_correction(&self) -> bool {
        matches!(
            self,
            FunctionType::AstronomicCorrection | FunctionType::HarmonicCorrection
        )
    }
}

impl FromStr for FunctionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let function = match canonicalize(s).as_str() {
            "timeseries" => FunctionType::TimeSeries,
            "t3d" => FunctionType::T3D,
            "astronomic" => FunctionType::Astronomic,
            "astronomic-correction" => FunctionType::AstronomicCorrection,
            "harmonic" => FunctionType::Harmonic,
            "harmonic-correction" => FunctionType::HarmonicCorrection,
            "qhtable" => FunctionType::QhTable,
            _ => {
                return format_err!(BadFunctionType, 0, format!("unknown function type {s}"));
            }
        };
        Ok(function)
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInterpolation {
    #[default]
    Linear,
    Block,
}

impl TimeInterpolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInterpolation::Linear => "linear",
            TimeInterpolation::Block => "block",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match canonicalize(s).as_str() {
            "linear" => Some(TimeInterpolation::Linear),
            "block" => Some(TimeInterpolation::Block),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerticalInterpolation {
    #[default]
    Linear,
    Log,
    Block,
}

impl VerticalInterpolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerticalInterpolation::Linear => "linear",
            VerticalInterpolation::Log => "log",
            VerticalInterpolation::Block => "block",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match canonicalize(s).as_str() {
            "linear" => Some(VerticalInterpolation::Linear),
            "log" => Some(VerticalInterpolation::Log),
            "block" => Some(VerticalInterpolation::Block),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityRecord {
    pub name: String,
    pub unit: String,
    pub vertical_position: Option<String>,
    pub values: Vec<String>,
}

lazy_static! {
    static ref TIME_UNIT_RE: Regex = Regex::new(
        r"(?i)^(seconds|minutes|hours|days)\s+since\s+(\d{4}-\d{1,2}-\d{1,2})(?:[ T](\d{1,2}:\d{2}(?::\d{2})?))?(?:\s*[+-]\d{1,2}(?::?\d{2})?)?$"
    )
    .unwrap();
}

/// Parse a `<unit> since <date>[ <time>][ <tz>]` time unit into the
/// length of one step in seconds and the reference moment.  The time
/// zone offset is accepted but not applied.
pub fn parse_time_unit(unit: &str) -> Result<(f64, NaiveDateTime)> {
    let Some(caps) = TIME_UNIT_RE.captures(unit.trim()) else {
        return format_err!(BadTimeUnit, 0, format!("unsupported time unit '{unit}'"));
    };
    let step = match canonicalize(&caps[1]).as_str() {
        "seconds" => 1.0,
        "minutes" => 60.0,
        "hours" => 3600.0,
        _ => 86400.0,
    };
    let Ok(date) = NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d") else {
        return format_err!(BadDate, 0, format!("invalid reference date in '{unit}'"));
    };
    let time = match caps.get(3) {
        Some(t) => {
            let t = t.as_str();
            let parsed = NaiveTime::parse_from_str(t, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"));
            match parsed {
                Ok(time) => time,
                Err(_) => {
                    return format_err!(BadDate, 0, format!("invalid reference time in '{unit}'"));
                }
            }
        }
        None => NaiveTime::MIN,
    };
    Ok((step, date.and_time(time)))
}

/// `reference` moved by `seconds`, or `None` when the result does not
/// fit in a date.
pub fn offset_time(reference: NaiveDateTime, seconds: f64) -> Option<NaiveDateTime> {
    let millis = (seconds * 1000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_milliseconds(millis as i64).and_then(|d| reference.checked_add_signed(d))
}

/// The unit string written for time arguments.
pub fn seconds_since(reference: NaiveDateTime) -> String {
    format!("seconds since {}", reference.format("%Y-%m-%d %H:%M:%S"))
}

impl QuantityRecord {
    pub fn new(name: &str, unit: &str) -> Self {
        QuantityRecord {
            name: name.to_owned(),
            unit: unit.to_owned(),
            vertical_position: None,
            values: vec![],
        }
    }

    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = values;
        self
    }

    pub fn as_f64s(&self) -> Result<Vec<f64>> {
        self.values
            .iter()
            .map(|v| {
                v.parse::<f64>().or_else(|_| {
                    format_err!(
                        BadNumber,
                        0,
                        format!("cannot convert value {v} of quantity {}", self.name)
                    )
                })
            })
            .collect()
    }

    /// Values as absolute times, using the `<unit> since <date>` unit.
    pub fn as_times(&self) -> Result<Vec<NaiveDateTime>> {
        let (step, reference) = parse_time_unit(&self.unit)?;
        self.as_f64s()?
            .into_iter()
            .map(|v| match offset_time(reference, v * step) {
                Some(t) => Ok(t),
                None => format_err!(
                    BadNumber,
                    0,
                    format!("time {v} of quantity {} is out of range", self.name)
                ),
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForcingBlock {
    pub support_point: String,
    pub function_type: String,
    pub time_interpolation: Option<String>,
    pub vertical_interpolation: Option<String>,
    pub vertical_position_type: Option<String>,
    pub vertical_positions: Option<String>,
    /// 1-based position among same-quantity conditions on a feature;
    /// only present when greater than one.
    pub series_index: Option<usize>,
    pub offset: f64,
    pub factor: f64,
    pub quantities: Vec<QuantityRecord>,
    pub file: Option<PathBuf>,
    pub line: usize,
}

impl ForcingBlock {
    pub fn new(support_point: &str, function: FunctionType) -> Self {
        ForcingBlock {
            support_point: support_point.to_owned(),
            function_type: function.as_str().to_owned(),
            time_interpolation: None,
            vertical_interpolation: None,
            vertical_position_type: None,
            vertical_positions: None,
            series_index: None,
            offset: 0.0,
            factor: 1.0,
            quantities: vec![],
            file: None,
            line: 0,
        }
    }

    pub fn function(&self) -> Result<FunctionType> {
        self.function_type.parse()
    }

    pub fn row_count(&self) -> usize {
        self.quantities.first().map(|q| q.values.len()).unwrap_or(0)
    }

    pub fn quantity(&self, name: &str) -> Option<&QuantityRecord> {
        self.quantities
            .iter()
            .find(|q| canonicalize(&q.name) == canonicalize(name))
    }

    /// Quantities after the argument column.
    pub fn signal(&self) -> &[QuantityRecord] {
        self.quantities.get(1..).unwrap_or(&[])
    }

    /// Build a block from one section.  A data row whose column count
    /// differs from the number of quantities is a format error.  A block
    /// without name, function or quantities is a model error, which
    /// readers turn into a warning.
    pub fn extract(section: &Section, file: &Path) -> Result<ForcingBlock> {
        let table = MigrationTable::shared();
        let mut block = ForcingBlock::new("", FunctionType::TimeSeries);
        block.function_type.clear();
        block.file = Some(file.to_path_buf());
        block.line = section.line();

        for p in section.properties() {
            let (_, key) = table.migrate("forcing", p.key());
            let value = p.value().trim();
            match canonicalize(&key).as_str() {
                "name" => block.support_point = value.to_owned(),
                "function" => block.function_type = value.to_owned(),
                "timeinterpolation" => block.time_interpolation = Some(value.to_owned()),
                "vertinterpolation" => block.vertical_interpolation = Some(value.to_owned()),
                "vertpositiontype" => block.vertical_position_type = Some(value.to_owned()),
                "vertpositions" => block.vertical_positions = Some(value.to_owned()),
                "functionindex" => {
                    block.series_index = Some(parse_value(value, p.key(), file, p.line())?);
                }
                "offset" => block.offset = parse_value(value, p.key(), file, p.line())?,
                "factor" => block.factor = parse_value(value, p.key(), file, p.line())?,
                "quantity" => block.quantities.push(QuantityRecord::new(value, "")),
                "unit" => match block.quantities.last_mut() {
                    Some(q) => q.unit = value.to_owned(),
                    None => {
                        return format_err!(
                            InvalidFormattedText,
                            file,
                            p.line(),
                            "unit given before any quantity".to_owned()
                        );
                    }
                },
                "vertpositionindex" => match block.quantities.last_mut() {
                    Some(q) => q.vertical_position = Some(value.to_owned()),
                    None => {
                        return format_err!(
                            InvalidFormattedText,
                            file,
                            p.line(),
                            "vertical position given before any quantity".to_owned()
                        );
                    }
                },
                other => log::debug!("ignoring key {other} in forcing block {}", block.support_point),
            }
        }

        let missing = if block.support_point.is_empty() {
            Some("name")
        } else if block.function_type.is_empty() {
            Some("function")
        } else if block.quantities.is_empty() {
            Some("quantity")
        } else {
            None
        };
        if let Some(missing) = missing {
            let err: Result<ForcingBlock> = model_err!(
                IncompleteBlock,
                format!("forcing block without {missing}")
            );
            return err.map_err(|e| e.at(file, section.line()));
        }

        for row in section.rows() {
            let columns: Vec<&str> = row.columns().collect();
            if columns.len() != block.quantities.len() {
                return format_err!(
                    RowColumnMismatch,
                    file,
                    row.line,
                    format!(
                        "expected {} columns for block {}, found {}",
                        block.quantities.len(),
                        block.support_point,
                        columns.len()
                    )
                );
            }
            for (q, column) in block.quantities.iter_mut().zip(columns) {
                q.values.push(column.to_owned());
            }
        }

        Ok(block)
    }

    /// Build the `[forcing]` section for this block.
    pub fn to_section(&self) -> Result<Section> {
        let rows = self.row_count();
        if let Some(q) = self.quantities.iter().find(|q| q.values.len() != rows) {
            return model_err!(
                MismatchedSeries,
                format!(
                    "quantity {} of {} has {} values, expected {rows}",
                    q.name,
                    self.support_point,
                    q.values.len()
                )
            );
        }

        let mut section = Section::new("forcing");
        section.add("name", &self.support_point);
        section.add("function", &self.function_type);
        if let Some(index) = self.series_index.filter(|i| *i > 1) {
            section.add("functionIndex", &index.to_string());
        }
        if let Some(ref v) = self.time_interpolation {
            section.add("timeInterpolation", v);
        }
        if let Some(ref v) = self.vertical_position_type {
            section.add("vertPositionType", v);
        }
        if let Some(ref v) = self.vertical_positions {
            section.add("vertPositions", v);
        }
        if let Some(ref v) = self.vertical_interpolation {
            section.add("vertInterpolation", v);
        }
        if !approx_eq!(f64, self.offset, 0.0) || !approx_eq!(f64, self.factor, 1.0) {
            section.add("offset", &format_coefficient(self.offset));
            section.add("factor", &format_coefficient(self.factor));
        }
        for q in self.quantities.iter() {
            section.add("quantity", &q.name);
            section.add("unit", &q.unit);
            if let Some(ref v) = q.vertical_position {
                section.add("vertPositionIndex", v);
            }
        }
        for i in 0..rows {
            let cells: Vec<&str> = self.quantities.iter().map(|q| q.values[i].as_str()).collect();
            section.push_row(DataRow::new(&cells.join(" ")));
        }
        Ok(section)
    }
}

fn parse_value<T: FromStr>(value: &str, key: &str, file: &Path, line: usize) -> Result<T> {
    value.parse::<T>().or_else(|_| {
        format_err!(
            CannotConvertValue,
            file,
            line,
            format!("Cannot convert value {value} of {key}")
        )
    })
}
