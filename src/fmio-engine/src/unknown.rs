// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Pass-through storage for forcings whose quantity the schema does not
//! know.  They are not interpreted, only carried to the next write.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::common::canonicalize;
use crate::diagnostics::{Diagnostic, DiagnosticsSink};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedItem {
    pub quantity: String,
    pub file_name: String,
    pub file_type: String,
    pub method: String,
    pub operand: String,
    /// Every other key in file order, with its raw value.
    pub extra: Vec<(String, String)>,
    pub comments: Vec<String>,
    /// Absolute path of the referenced data file.
    pub path: Option<PathBuf>,
    pub line: usize,
}

impl UnsupportedItem {
    pub fn get_extra(&self, key: &str) -> Option<&str> {
        let key = canonicalize(key);
        self.extra
            .iter()
            .find(|(k, _)| canonicalize(k) == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Unknown items collected during one read.  The first item of each
/// distinct quantity produces a warning; later ones are silent.
#[derive(Clone, Debug, Default)]
pub struct UnknownItemStore {
    items: Vec<UnsupportedItem>,
    reported: HashSet<String>,
}

impl UnknownItemStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(&mut self, item: UnsupportedItem, sink: &mut dyn DiagnosticsSink) {
        if self.reported.insert(canonicalize(&item.quantity)) {
            sink.report(Diagnostic::warning(format!(
                "Quantity '{}' detected in the external force file and will be passed to the computational core. This may affect your simulation.",
                item.quantity
            )));
        }
        self.items.push(item);
    }

    pub fn items(&self) -> &[UnsupportedItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<UnsupportedItem> {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Distinct quantity names, in first-seen order.
    pub fn quantities(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .filter(|i| seen.insert(canonicalize(&i.quantity)))
            .map(|i| i.quantity.as_str())
            .collect()
    }
}
