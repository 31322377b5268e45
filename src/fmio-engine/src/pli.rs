// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Polyline files (`.pli`, `.pliz`).
//!
//! Each feature is a name line, a `rows cols` line, and `rows` lines of
//! coordinates.  `.pliz` files carry a third (z) column.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result, eq_ignore_case};
use crate::format::{format_scientific, write_file};
use crate::format_err;
use crate::grouping::GeometryProvider;
use crate::token::split_lines;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    /// Columns after x and y, e.g. z for `.pliz`.
    pub extra: Vec<f64>,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y, extra: vec![] }
    }

    fn columns(&self) -> usize {
        2 + self.extra.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub points: Vec<Point>,
}

impl Feature {
    pub fn new(name: &str, points: Vec<Point>) -> Self {
        Feature {
            name: name.to_owned(),
            points,
        }
    }
}

impl GeometryProvider for Feature {
    fn support_point_count(&self, feature: &str) -> Option<usize> {
        eq_ignore_case(&self.name, feature).then_some(self.points.len())
    }
}

impl GeometryProvider for [Feature] {
    fn support_point_count(&self, feature: &str) -> Option<usize> {
        self.iter().find_map(|f| f.support_point_count(feature))
    }
}

impl GeometryProvider for Vec<Feature> {
    fn support_point_count(&self, feature: &str) -> Option<usize> {
        self.as_slice().support_point_count(feature)
    }
}

fn parse_number(cell: &str, line: usize) -> Result<f64> {
    cell.parse::<f64>().or_else(|_| {
        format_err!(
            BadNumber,
            line,
            format!("cannot parse '{cell}' as a coordinate")
        )
    })
}

pub fn parse(text: &str) -> Result<Vec<Feature>> {
    let mut lines = split_lines(text)
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('*'));

    let mut features = vec![];
    while let Some((name_line, name)) = lines.next() {
        // the name may be followed by a description
        let name = name.split_whitespace().next().unwrap_or_default();

        let Some((dims_line, dims)) = lines.next() else {
            return format_err!(BadPolyline, name_line, format!("polyline {name} has no dimensions"));
        };
        let dims: Vec<usize> = dims
            .split_whitespace()
            .take(2)
            .map(|c| c.parse::<usize>())
            .collect::<std::result::Result<_, _>>()
            .or_else(|_| {
                format_err!(BadPolyline, dims_line, format!("bad dimensions '{dims}' for polyline {name}"))
            })?;
        let [rows, cols] = dims[..] else {
            return format_err!(BadPolyline, dims_line, format!("bad dimensions for polyline {name}"));
        };
        if cols < 2 {
            return format_err!(
                BadPolyline,
                dims_line,
                format!("polyline {name} needs at least 2 columns, found {cols}")
            );
        }

        // rows is untrusted; grow as points are read
        let mut points = vec![];
        for _ in 0..rows {
            let Some((row_line, row)) = lines.next() else {
                return format_err!(
                    BadPolyline,
                    dims_line,
                    format!("polyline {name} declares {rows} points but the file ends after {}", points.len())
                );
            };
            let cells: Vec<&str> = row.split_whitespace().collect();
            if cells.len() < cols {
                return format_err!(
                    RowColumnMismatch,
                    row_line,
                    format!("expected {cols} columns, found {}", cells.len())
                );
            }
            let values = cells[..cols]
                .iter()
                .map(|c| parse_number(c, row_line))
                .collect::<Result<Vec<f64>>>()?;
            points.push(Point {
                x: values[0],
                y: values[1],
                extra: values[2..].to_vec(),
            });
        }
        features.push(Feature::new(name, points));
    }
    Ok(features)
}

pub fn read(path: &Path) -> Result<Vec<Feature>> {
    let text = fs::read_to_string(path).map_err(|err| Error::from(err).at(path, 0))?;
    parse(&text).map_err(|e| e.in_file(path))
}

pub fn render(features: &[Feature]) -> String {
    let mut out = String::new();
    for feature in features {
        let cols = feature.points.iter().map(Point::columns).max().unwrap_or(2);
        out.push_str(&feature.name);
        out.push('\n');
        out.push_str(&format!("    {}    {cols}\n", feature.points.len()));
        for point in feature.points.iter() {
            let mut cells = vec![format_scientific(point.x), format_scientific(point.y)];
            cells.extend(point.extra.iter().map(|v| format_scientific(*v)));
            cells.resize(cols, format_scientific(0.0));
            out.push_str(&cells.join("  "));
            out.push('\n');
        }
    }
    out
}

pub fn write(path: &Path, features: &[Feature]) -> Result<()> {
    write_file(path, &render(features))
}
