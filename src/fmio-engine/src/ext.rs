// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Old-style external forcing files (`.ext`): flat `KEY=VALUE` blocks,
//! each starting at a `QUANTITY` key.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Location, Result, canonicalize};
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::format::{format_decimal, write_file};
use crate::format_err;
use crate::reference::{Anchor, PathProbe, RelocationPlan, rebase, resolve_existing};
use crate::schema::{KnownQuantities, QuantitySchema};
use crate::token::{LineKind, TokenizerOptions, split_lines, tokenize};
use crate::unknown::{UnknownItemStore, UnsupportedItem};

pub const FILE_TYPE_TRIANGULATION: i32 = 7;
pub const METHOD_INSIDE_POLYGON: i32 = 4;
pub const METHOD_TRIANGULATION: i32 = 5;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Override,
    Add,
    Multiply,
    ApplyIfMissing,
    Maximum,
    Minimum,
}

impl Operand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operand::Override => "O",
            Operand::Add => "+",
            Operand::Multiply => "*",
            Operand::ApplyIfMissing => "A",
            Operand::Maximum => "X",
            Operand::Minimum => "N",
        }
    }
}

impl FromStr for Operand {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s.trim() {
            "O" | "o" => Ok(Operand::Override),
            "+" => Ok(Operand::Add),
            "*" => Ok(Operand::Multiply),
            "A" | "a" => Ok(Operand::ApplyIfMissing),
            "X" | "x" => Ok(Operand::Maximum),
            "N" | "n" => Ok(Operand::Minimum),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One forcing block as written in the file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtForcing {
    /// The key the quantity was given under: `QUANTITY`, or something
    /// like `DISABLED_QUANTITY` for a forcing that is switched off.
    pub quantity_key: String,
    pub quantity: String,
    pub file_name: Option<String>,
    pub var_name: Option<String>,
    pub file_type: Option<i32>,
    pub method: Option<i32>,
    pub operand: Option<Operand>,
    pub value: Option<f64>,
    pub factor: Option<f64>,
    pub offset: Option<f64>,
    /// VALUE, FACTOR and OFFSET as they were spelled in the file.
    pub number_text: Vec<(String, String)>,
    /// Any further keys (AREA, IFRCTYP, ...) in file order.
    pub model_data: Vec<(String, String)>,
    pub comments: Vec<String>,
    /// Absolute path of FILENAME, once resolved.
    pub path: Option<PathBuf>,
    pub line: usize,
}

impl ExtForcing {
    pub fn new(quantity: &str) -> Self {
        ExtForcing {
            quantity_key: "QUANTITY".to_owned(),
            quantity: quantity.to_owned(),
            file_name: None,
            var_name: None,
            file_type: None,
            method: None,
            operand: None,
            value: None,
            factor: None,
            offset: None,
            number_text: vec![],
            model_data: vec![],
            comments: vec![],
            path: None,
            line: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        canonicalize(&self.quantity_key) == "quantity"
    }

    pub fn get_model_data(&self, key: &str) -> Option<&str> {
        let key = canonicalize(key);
        self.model_data
            .iter()
            .find(|(k, _)| canonicalize(k) == key)
            .map(|(_, v)| v.as_str())
    }

    fn missing_mandatory(&self) -> Option<&'static str> {
        if self.file_name.is_none() {
            Some("FILENAME")
        } else if self.file_type.is_none() {
            Some("FILETYPE")
        } else if self.method.is_none() {
            Some("METHOD")
        } else if self.operand.is_none() {
            Some("OPERAND")
        } else {
            None
        }
    }

    /// VALUE, FACTOR and OFFSET that are set, spelled as read unless the
    /// number has changed since.
    fn numbers(&self) -> Vec<(&'static str, String)> {
        [("VALUE", self.value), ("FACTOR", self.factor), ("OFFSET", self.offset)]
            .into_iter()
            .filter_map(|(key, value)| {
                let value = value?;
                let text = self
                    .number_text
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, text)| text.trim())
                    .filter(|text| text.parse::<f64>().ok() == Some(value))
                    .map(str::to_owned)
                    .unwrap_or_else(|| format_decimal(value));
                Some((key, text))
            })
            .collect()
    }

    fn to_unsupported(&self) -> UnsupportedItem {
        let mut extra = vec![];
        if let Some(ref v) = self.var_name {
            extra.push(("VARNAME".to_owned(), v.clone()));
        }
        for (key, text) in self.numbers() {
            extra.push((key.to_owned(), text));
        }
        extra.extend(self.model_data.iter().cloned());
        UnsupportedItem {
            quantity: self.quantity.clone(),
            file_name: self.file_name.clone().unwrap_or_default(),
            file_type: self.file_type.map(|v| v.to_string()).unwrap_or_default(),
            method: self.method.map(|v| v.to_string()).unwrap_or_default(),
            operand: self.operand.map(|o| o.as_str().to_owned()).unwrap_or_default(),
            extra,
            comments: self.comments.clone(),
            path: self.path.clone(),
            line: self.line,
        }
    }
}

/// Position of a key in the mandatory sequence.
fn mandatory_slot(key: &str) -> Option<usize> {
    match key {
        "quantity" => Some(0),
        "filename" => Some(1),
        "varname" => Some(2),
        "filetype" => Some(3),
        "method" => Some(4),
        "operand" => Some(5),
        _ => None,
    }
}

fn is_quantity_key(key: &str) -> bool {
    key.ends_with("uantity")
}

fn convert<T: FromStr>(value: &str, key: &str, line: usize) -> Result<T> {
    value.trim().parse::<T>().or_else(|_| {
        format_err!(
            CannotConvertValue,
            line,
            format!("Cannot convert value {value} of {key}")
        )
    })
}

/// Parse ext-force text into forcing blocks, without looking at the
/// quantities or the file system.
pub fn parse(text: &str) -> Result<Vec<ExtForcing>> {
    let raw: Vec<&str> = split_lines(text).collect();
    let lines = tokenize(text, &TokenizerOptions::EXT_FORCE)?;

    let mut forcings: Vec<ExtForcing> = vec![];
    let mut pending_comments: Vec<String> = vec![];
    // highest mandatory slot seen in the current block; 6 once past OPERAND
    let mut slot = 0usize;

    for line in lines {
        let number = line.number;
        match line.kind {
            LineKind::Blank => {}
            LineKind::Comment(text) => pending_comments.push(text),
            LineKind::SectionHeader(_) | LineKind::DataRow(_) | LineKind::Continuation(_) => {
                return format_err!(InvalidFormattedText, number, "invalid formatted text".to_owned());
            }
            LineKind::Property { key, value, .. } => {
                let canonical = canonicalize(&key);

                // continuation of a known malformed comment block
                if canonical.starts_with(':') && !pending_comments.is_empty() {
                    let text = raw.get(number - 1).copied().unwrap_or_default();
                    pending_comments.push(text.get(1..).unwrap_or_default().trim_end().to_owned());
                    continue;
                }

                if is_quantity_key(&canonical) {
                    let mut forcing = ExtForcing::new(&value);
                    forcing.quantity_key = key.to_uppercase();
                    forcing.line = number;
                    forcing.comments = std::mem::take(&mut pending_comments);
                    forcings.push(forcing);
                    slot = 0;
                    continue;
                }

                let Some(forcing) = forcings.last_mut() else {
                    return format_err!(UnexpectedProperty, number, format!("Unexpected property {key}"));
                };

                let in_order = match mandatory_slot(&canonical) {
                    // VARNAME may only sit between FILENAME and FILETYPE
                    Some(3) => slot == 1 || slot == 2,
                    Some(next) => slot + 1 == next,
                    None => slot == 6,
                };
                if !in_order {
                    return format_err!(UnexpectedProperty, number, format!("Unexpected property {key}"));
                }
                if let Some(next) = mandatory_slot(&canonical) {
                    slot = if next == 5 { 6 } else { next };
                }

                let mandatory = matches!(
                    canonical.as_str(),
                    "filename" | "filetype" | "method" | "operand"
                );
                if mandatory && value.trim().is_empty() {
                    return format_err!(
                        EmptyPropertyValue,
                        number,
                        format!("property value cannot be empty: {key}")
                    );
                }

                match canonical.as_str() {
                    "filename" => forcing.file_name = Some(value),
                    "varname" => forcing.var_name = Some(value),
                    "filetype" => forcing.file_type = Some(convert(&value, &key, number)?),
                    "method" => forcing.method = Some(convert(&value, &key, number)?),
                    "operand" => forcing.operand = Some(convert(&value, &key, number)?),
                    "value" | "factor" | "offset" => {
                        let parsed = Some(convert(&value, &key, number)?);
                        match canonical.as_str() {
                            "value" => forcing.value = parsed,
                            "factor" => forcing.factor = parsed,
                            _ => forcing.offset = parsed,
                        }
                        forcing.number_text.push((canonical.clone(), value));
                    }
                    _ => forcing.model_data.push((key.to_uppercase(), value)),
                }

                if forcing.file_type == Some(FILE_TYPE_TRIANGULATION)
                    && forcing.method == Some(METHOD_INSIDE_POLYGON)
                {
                    forcing.method = Some(METHOD_TRIANGULATION);
                }
            }
        }
    }

    // an empty quantity is a mandatory value too
    if let Some(f) = forcings.iter().find(|f| f.quantity.trim().is_empty()) {
        return format_err!(
            EmptyPropertyValue,
            f.line,
            format!("property value cannot be empty: {}", f.quantity_key)
        );
    }

    Ok(forcings)
}

fn render_forcing(out: &mut String, forcing: &ExtForcing) {
    for comment in forcing.comments.iter() {
        out.push_str(&format!("*{comment}\n"));
    }
    out.push_str(&format!("{}={}\n", forcing.quantity_key, forcing.quantity));
    if let Some(ref v) = forcing.file_name {
        out.push_str(&format!("FILENAME={v}\n"));
    }
    if let Some(ref v) = forcing.var_name {
        out.push_str(&format!("VARNAME={v}\n"));
    }
    if let Some(v) = forcing.file_type {
        out.push_str(&format!("FILETYPE={v}\n"));
    }
    if let Some(v) = forcing.method {
        out.push_str(&format!("METHOD={v}\n"));
    }
    if let Some(v) = forcing.operand {
        out.push_str(&format!("OPERAND={v}\n"));
    }
    for (key, text) in forcing.numbers() {
        out.push_str(&format!("{key}={text}\n"));
    }
    for (key, value) in forcing.model_data.iter() {
        out.push_str(&format!("{key}={value}\n"));
    }
    out.push('\n');
}

fn render_unknown(out: &mut String, item: &UnsupportedItem) {
    for comment in item.comments.iter() {
        out.push_str(&format!("*{comment}\n"));
    }
    out.push_str(&format!("QUANTITY={}\n", item.quantity));
    out.push_str(&format!("FILENAME={}\n", item.file_name));
    let (varname, rest): (Vec<_>, Vec<_>) = item.extra.iter().partition(|(k, _)| canonicalize(k) == "varname");
    for (key, value) in varname {
        out.push_str(&format!("{}={value}\n", key.to_uppercase()));
    }
    out.push_str(&format!("FILETYPE={}\n", item.file_type));
    out.push_str(&format!("METHOD={}\n", item.method));
    out.push_str(&format!("OPERAND={}\n", item.operand));
    for (key, value) in rest {
        out.push_str(&format!("{}={value}\n", key.to_uppercase()));
    }
    out.push('\n');
}

/// Items built in memory (line 0) go after everything read from a file.
fn file_order(line: usize) -> usize {
    if line == 0 { usize::MAX } else { line }
}

/// Render forcings back to text.  Keys are upper-case, in canonical
/// order, and blocks are separated by a blank line.  Known and
/// pass-through items are merged back into the order they were read in.
pub fn render(forcings: &[ExtForcing], unknown: &[UnsupportedItem]) -> String {
    let mut out = String::new();
    let mut forcings = forcings.iter().peekable();
    let mut unknown = unknown.iter().peekable();
    loop {
        let unknown_first = match (forcings.peek(), unknown.peek()) {
            (None, None) => break,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (Some(f), Some(u)) => file_order(u.line) < file_order(f.line),
        };
        if unknown_first {
            if let Some(item) = unknown.next() {
                render_unknown(&mut out, item);
            }
        } else if let Some(forcing) = forcings.next() {
            render_forcing(&mut out, forcing);
        }
    }
    out
}

/// A read external forcing file: the forcings the model understands
/// (and disabled ones, kept for writing) plus pass-through items.
#[derive(Clone, Debug, Default)]
pub struct ExtForceFile {
    pub forcings: Vec<ExtForcing>,
    pub unknown: Vec<UnsupportedItem>,
    /// Anchor the forcing paths were resolved against.
    pub anchor: Option<Anchor>,
}

impl ExtForceFile {
    /// Read `path`.  File names resolve against `reference` (usually the
    /// model definition) when given, else against `path` itself.
    /// Forcings with a missing file or missing mandatory keys are
    /// reported and dropped.
    pub fn read(
        path: &Path,
        reference: Option<&Path>,
        probe: &dyn PathProbe,
        sink: &mut dyn DiagnosticsSink,
    ) -> Result<ExtForceFile> {
        let text = fs::read_to_string(path).map_err(|err| Error::from(err).at(path, 0))?;
        let forcings = parse(&text).map_err(|e| e.in_file(path))?;
        let anchor = Anchor::choose(path, reference);

        let mut file = ExtForceFile {
            anchor: Some(anchor.clone()),
            ..Default::default()
        };
        let mut store = UnknownItemStore::new();

        for mut forcing in forcings {
            if !forcing.is_enabled() {
                file.forcings.push(forcing);
                continue;
            }
            if let Some(missing) = forcing.missing_mandatory() {
                sink.report(
                    Diagnostic::error(format!(
                        "Forcing {} is missing {missing} and is removed",
                        forcing.quantity
                    ))
                    .in_file(path)
                    .on_line(forcing.line),
                );
                continue;
            }

            let raw = forcing.file_name.clone().unwrap_or_default();
            let location = Location::new(path, forcing.line);
            match resolve_existing(&raw, &anchor, probe, Some(&location)) {
                Ok(reference) => forcing.path = Some(reference.path),
                Err(err) => {
                    sink.report(Diagnostic::from(&err));
                    continue;
                }
            }

            if KnownQuantities.is_known(&forcing.quantity) {
                file.forcings.push(forcing);
            } else {
                store.add(forcing.to_unsupported(), sink);
            }
        }

        file.unknown = store.into_items();
        log::debug!(
            "read {} forcings and {} unsupported items from {}",
            file.forcings.len(),
            file.unknown.len(),
            path.display()
        );
        Ok(file)
    }

    /// Render with file names spelled relative to `new_anchor`.
    /// Referenced files that need to move are added to `plan`.
    pub fn render_relocated(&self, new_anchor: &Anchor, plan: &mut RelocationPlan) -> String {
        let mut forcings = self.forcings.clone();
        let mut unknown = self.unknown.clone();

        if let Some(ref old_anchor) = self.anchor {
            for forcing in forcings.iter_mut() {
                if let Some(ref abs) = forcing.path {
                    let relocation = rebase(abs, old_anchor, new_anchor);
                    forcing.file_name = Some(relocation.raw.clone());
                    plan.add(relocation);
                }
            }
            for item in unknown.iter_mut() {
                if let Some(ref abs) = item.path {
                    let relocation = rebase(abs, old_anchor, new_anchor);
                    item.file_name = relocation.raw.clone();
                    plan.add(relocation);
                }
            }
        }

        render(&forcings, &unknown)
    }

    pub fn write(&self, path: &Path, new_anchor: &Anchor, plan: &mut RelocationPlan) -> Result<()> {
        write_file(path, &self.render_relocated(new_anchor, plan))
    }

    /// Every referenced file, for callers that need to follow them.
    pub fn referenced_paths(&self) -> Vec<&Path> {
        self.forcings
            .iter()
            .filter_map(|f| f.path.as_deref())
            .chain(self.unknown.iter().filter_map(|i| i.path.as_deref()))
            .collect()
    }
}
