// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Non-fatal conditions found while reading or writing files.
//!
//! Format errors abort a single file read and surface as `Err`.
//! Everything else (unsupported sections, unknown quantities,
//! obsolete keys, missing references) is reported through a
//! [`DiagnosticsSink`] and the read or write continues.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: Option<PathBuf>,
    pub line: Option<usize>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: String) -> Self {
        Diagnostic {
            severity,
            message,
            file: None,
            line: None,
        }
    }

    pub fn info(message: String) -> Self {
        Diagnostic::new(Severity::Info, message)
    }

    pub fn warning(message: String) -> Self {
        Diagnostic::new(Severity::Warning, message)
    }

    pub fn error(message: String) -> Self {
        Diagnostic::new(Severity::Error, message)
    }

    pub fn in_file(mut self, file: &Path) -> Self {
        self.file = Some(file.to_path_buf());
        self
    }

    pub fn on_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl From<&Error> for Diagnostic {
    fn from(err: &Error) -> Self {
        let message = match err.details {
            Some(ref details) => details.clone(),
            None => err.code.to_string(),
        };
        let mut diag = Diagnostic::error(message);
        if let Some(ref loc) = err.location {
            if !loc.file.as_os_str().is_empty() {
                diag.file = Some(loc.file.clone());
            }
            if loc.line > 0 {
                diag.line = Some(loc.line);
            }
        }
        diag
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let severity = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match (&self.file, self.line) {
            (Some(file), Some(line)) => {
                write!(f, "{severity}: {}:{line}: {}", file.display(), self.message)
            }
            (Some(file), None) => write!(f, "{severity}: {}: {}", file.display(), self.message),
            _ => write!(f, "{severity}: {}", self.message),
        }
    }
}

/// Receives diagnostics as they are produced.
pub trait DiagnosticsSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Collects diagnostics in order, for callers (and tests) that want to
/// inspect them after the fact.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn all(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn count_matching(&self, severity: Severity, needle: &str) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == severity && d.message.contains(needle))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

impl DiagnosticsSink for Diagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }
}

/// Forwards diagnostics to the `log` facade.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Info => log::info!("{diagnostic}"),
            Severity::Warning => log::warn!("{diagnostic}"),
            Severity::Error => log::error!("{diagnostic}"),
        }
    }
}
