// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod common;
pub mod diagnostics;
pub mod token;
pub mod section;
pub mod schema;
pub mod migration;
pub mod reference;
pub mod forcing;
pub mod grouping;
pub mod unknown;
pub mod format;
pub mod bc;
pub mod ext;
pub mod bnd_ext;
pub mod mdu;
pub mod morphology;
pub mod pli;
pub mod model;

#[cfg(test)]
mod section_proptest;

pub use self::common::{Error, ErrorCode, ErrorKind, Location, Result, canonicalize};
pub use self::diagnostics::{Diagnostic, Diagnostics, DiagnosticsSink, LogSink, Severity};
pub use self::forcing::{ForcingBlock, FunctionType, QuantityRecord};
pub use self::format::FormatStyle;
pub use self::model::{ModelFiles, WriteSummary};
pub use self::reference::{Anchor, FileSystemProbe, KnownPaths, PathProbe, RelocationPlan};
pub use self::section::{Document, Property, Section};
pub use self::token::TokenizerOptions;
