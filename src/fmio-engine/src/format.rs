// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Rendering of a [`Document`] back to text, plus the fixed number
//! formats used by the writers.

use std::fs;
use std::path::Path;

use crate::common::{Error, Result};
use crate::section::{DataRow, Document, Entry, Property, Section};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FormatStyle {
    /// `key = value # comment`, with `=` and `#` each aligned to one
    /// column across the whole file.
    Aligned { min_key_width: usize },
    /// `key=value`.
    Compact,
    /// Model definition layout: key and value both padded to the widest
    /// in the file plus one.
    Mdu,
}

/// Key width used by boundary-condition files: the longest key a
/// forcing block writes.
pub const BC_KEY_WIDTH: usize = "vertPositionIndex".len();

impl Default for FormatStyle {
    fn default() -> Self {
        FormatStyle::Aligned { min_key_width: 0 }
    }
}

struct Widths {
    key: usize,
    value: usize,
}

fn measure(doc: &Document, min_key_width: usize) -> Widths {
    let mut widths = Widths {
        key: min_key_width,
        value: 0,
    };
    for p in doc.sections.iter().flat_map(|s| s.properties()) {
        widths.key = widths.key.max(escape_key(p.key()).chars().count());
        widths.value = widths.value.max(escape_value(p.value()).chars().count());
    }
    widths
}

pub fn render(doc: &Document, style: FormatStyle) -> String {
    let widths = match style {
        FormatStyle::Aligned { min_key_width } => measure(doc, min_key_width),
        FormatStyle::Mdu => measure(doc, 0),
        FormatStyle::Compact => Widths { key: 0, value: 0 },
    };

    let mut lines: Vec<String> = doc.preamble.iter().map(|c| format!("#{c}")).collect();

    for section in doc.sections.iter() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        render_section(&mut lines, section, style, &widths);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn render_section(lines: &mut Vec<String>, section: &Section, style: FormatStyle, widths: &Widths) {
    if !section.name().is_empty() {
        lines.push(format!("[{}]", section.name()));
    }
    for entry in section.entries() {
        match entry {
            Entry::Property(p) => lines.push(render_property(p, style, widths)),
            Entry::Comment(text) => lines.push(format!("#{text}")),
        }
    }
    lines.extend(render_rows(section.rows()));
}

fn render_property(p: &Property, style: FormatStyle, widths: &Widths) -> String {
    let key = escape_key(p.key());
    let value = escape_value(p.value());
    let line = match style {
        FormatStyle::Compact => match p.comment() {
            Some(comment) => format!("{key}={value} # {comment}"),
            None => format!("{key}={value}"),
        },
        FormatStyle::Aligned { .. } => match p.comment() {
            Some(comment) => format!(
                "{key:<kw$} = {value:<vw$} # {comment}",
                kw = widths.key,
                vw = widths.value
            ),
            None => format!("{key:<kw$} = {value}", kw = widths.key),
        },
        FormatStyle::Mdu => match p.comment() {
            Some(comment) => format!(
                "{key:<kw$}= {value:<vw$}# {comment}",
                kw = widths.key + 1,
                vw = widths.value + 1
            ),
            None => format!("{key:<kw$}= {value}", kw = widths.key + 1),
        },
    };
    line.trim_end().to_owned()
}

/// Pad every column to its widest cell plus one.  Rows are joined with
/// a single space and right-trimmed.
pub fn render_rows(rows: &[DataRow]) -> Vec<String> {
    let cells: Vec<Vec<&str>> = rows.iter().map(|r| r.columns().collect()).collect();
    let ncols = cells.iter().map(|r| r.len()).max().unwrap_or(0);
    let mut col_widths = vec![0usize; ncols];
    for row in cells.iter() {
        for (i, cell) in row.iter().enumerate() {
            col_widths[i] = col_widths[i].max(cell.chars().count());
        }
    }

    cells
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, cell)| format!("{cell:<w$}", w = col_widths[i] + 1))
                .collect::<Vec<_>>()
                .join(" ")
                .trim_end()
                .to_owned()
        })
        .collect()
}

fn escape_key(key: &str) -> String {
    key.replace('=', "\\=").replace('#', "\\#")
}

fn escape_value(value: &str) -> String {
    if value.contains('"') {
        return value.to_owned();
    }
    value.replace('#', "\\#")
}

/// Write `text` to `path`, creating missing parent directories.
pub fn write_file(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| Error::from(err).at(path, 0))?;
    }
    fs::write(path, text).map_err(|err| Error::from(err).at(path, 0))?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

/// `d.ddd…E±ddd` with a fixed number of decimals and exponent digits.
pub fn format_exponent(x: f64, decimals: usize, exponent_digits: usize, marker: char) -> String {
    let s = format!("{x:.decimals$e}");
    let Some((mantissa, exponent)) = s.split_once('e') else {
        // inf and NaN have no exponent
        return s;
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    format!("{mantissa}{marker}{sign}{digits:0>exponent_digits$}")
}

/// Coordinate format: 15 decimals and a 3-digit exponent, e.g.
/// `1.230000000000000E+000`.
pub fn format_scientific(x: f64) -> String {
    format_exponent(x, 15, 3, 'E')
}

/// Offset and factor format, e.g. `1.5000000e+00`.
pub fn format_coefficient(x: f64) -> String {
    format_exponent(x, 7, 2, 'e')
}

/// Free-form decimal used for time-series samples.
pub fn format_decimal(x: f64) -> String {
    format!("{x}")
}
