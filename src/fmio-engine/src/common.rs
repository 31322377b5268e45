// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::{error, io, result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    Generic,
    // format errors
    InvalidFormattedText,
    EmptyPropertyKey,
    EmptyPropertyValue,
    UnexpectedProperty,
    CannotConvertValue,
    RowColumnMismatch,
    BadHeader,
    BadNumber,
    BadDate,
    BadTimeUnit,
    BadFunctionType,
    BadPolyline,
    // reference errors
    MissingReference,
    EmptyReference,
    // model errors
    IncompleteBlock,
    UnknownFileType,
    UnknownSupportPoint,
    UnsupportedDataType,
    MismatchedSeries,
    // io
    Io,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            Generic => "generic",
            InvalidFormattedText => "invalid_formatted_text",
            EmptyPropertyKey => "empty_property_key",
            EmptyPropertyValue => "empty_property_value",
            UnexpectedProperty => "unexpected_property",
            CannotConvertValue => "cannot_convert_value",
            RowColumnMismatch => "row_column_mismatch",
            BadHeader => "bad_header",
            BadNumber => "bad_number",
            BadDate => "bad_date",
            BadTimeUnit => "bad_time_unit",
            BadFunctionType => "bad_function_type",
            BadPolyline => "bad_polyline",
            MissingReference => "missing_reference",
            EmptyReference => "empty_reference",
            IncompleteBlock => "incomplete_block",
            UnknownFileType => "unknown_file_type",
            UnknownSupportPoint => "unknown_support_point",
            UnsupportedDataType => "unsupported_data_type",
            MismatchedSeries => "mismatched_series",
            Io => "io",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Reference,
    Io,
    Model,
}

/// Where in which file an error was detected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub file: PathBuf,
    pub line: usize,
}

impl Location {
    pub fn new(file: &Path, line: usize) -> Self {
        Location {
            file: file.to_path_buf(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
    pub location: Option<Location>,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            code: ErrorCode::Io,
            details: Some(err.to_string()),
            location: None,
        }
    }
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
            location: None,
        }
    }

    pub fn at(mut self, file: &Path, line: usize) -> Self {
        self.location = Some(Location::new(file, line));
        self
    }

    /// Attach a file to an error that was produced without one (for
    /// example by a parser working on an in-memory string).  Errors
    /// that already know their file keep it, but inherit the line.
    pub fn in_file(mut self, file: &Path) -> Self {
        match self.location {
            Some(ref mut loc) if loc.file.as_os_str().is_empty() => {
                loc.file = file.to_path_buf();
            }
            Some(_) => {}
            None => self.location = Some(Location::new(file, 0)),
        }
        self
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }

    pub fn line(&self) -> Option<usize> {
        self.location.as_ref().map(|loc| loc.line)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Format => "FormatError",
            ErrorKind::Reference => "ReferenceError",
            ErrorKind::Io => "IoError",
            ErrorKind::Model => "ModelError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details)?,
            None => write!(f, "{}{{{}}}", kind, self.code)?,
        }
        if let Some(ref loc) = self.location {
            write!(f, " ({loc})")?;
        }
        Ok(())
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! format_err {
    ($code:tt, $line:expr, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Format, ErrorCode::$code, Some($str)).at(
            ::std::path::Path::new(""),
            $line,
        ))
    }};
    ($code:tt, $file:expr, $line:expr, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Format, ErrorCode::$code, Some($str)).at($file, $line))
    }};
}

#[macro_export]
macro_rules! ref_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Reference, ErrorCode::$code, Some($str)))
    }};
}

#[macro_export]
macro_rules! model_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Model, ErrorCode::$code, Some($str)))
    }};
}

/// Normalize a key or section name for case-insensitive lookup.
pub fn canonicalize(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    canonicalize(a) == canonicalize(b)
}

#[test]
fn test_canonicalize() {
    assert_eq!("quantity", canonicalize("  QUANTITY "));
    assert_eq!("vertical position type", canonicalize("Vertical Position Type"));
    assert_eq!("timeinterpolation", canonicalize("timeInterpolation"));
}

#[test]
fn test_eq_ignore_case() {
    assert!(eq_ignore_case("General", "general"));
    assert!(eq_ignore_case(" forcing", "FORCING "));
    assert!(!eq_ignore_case("forcing", "forcings"));
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Format,
        ErrorCode::RowColumnMismatch,
        Some("expected 3 columns".to_owned()),
    )
    .at(Path::new("a/b.bc"), 12);
    assert_eq!(
        "FormatError{row_column_mismatch: expected 3 columns} (a/b.bc:12)",
        err.to_string()
    );

    let err = Error::new(ErrorKind::Reference, ErrorCode::MissingReference, None);
    assert_eq!("ReferenceError{missing_reference}", err.to_string());
}

#[test]
fn test_error_in_file() {
    let err: Result<()> = format_err!(BadHeader, 4, "[General".to_owned());
    let err = err.unwrap_err().in_file(Path::new("x.mdu"));
    assert_eq!(Some(4), err.line());
    assert_eq!(Path::new("x.mdu"), err.location.unwrap().file);
}
