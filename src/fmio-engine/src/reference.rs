// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Resolution and relocation of sub-file references.
//!
//! A property value that names a file is a raw relative path.  It is
//! resolved against an [`Anchor`]: either the file containing the
//! property or an externally supplied reference file (typically the
//! model definition).  Resolution is purely lexical; whether the file
//! exists is asked of a [`PathProbe`], so everything here can be tested
//! without touching the disk.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::common::{Error, Location, Result};
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::ref_err;

pub trait PathProbe: Sync {
    fn exists(&self, path: &Path) -> bool;
}

/// Asks the real file system.
#[derive(Copy, Clone, Debug, Default)]
pub struct FileSystemProbe;

impl PathProbe for FileSystemProbe {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// A fixed set of paths that "exist".
#[derive(Clone, Debug, Default)]
pub struct KnownPaths(HashSet<PathBuf>);

impl KnownPaths {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, path: impl AsRef<Path>) {
        self.0.insert(normalize(path.as_ref()));
    }
}

impl<P: AsRef<Path>> FromIterator<P> for KnownPaths {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let mut known = KnownPaths::new();
        for p in iter {
            known.insert(p);
        }
        known
    }
}

impl PathProbe for KnownPaths {
    fn exists(&self, path: &Path) -> bool {
        self.0.contains(&normalize(path))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Anchor {
    /// Relative to the directory of the file containing the reference.
    SelfAnchored(PathBuf),
    /// Relative to the directory of a separate reference file.
    External(PathBuf),
}

impl Anchor {
    /// Anchor to `reference` if one is given, otherwise to `containing`.
    pub fn choose(containing: &Path, reference: Option<&Path>) -> Anchor {
        match reference {
            Some(reference) => Anchor::External(reference.to_path_buf()),
            None => Anchor::SelfAnchored(containing.to_path_buf()),
        }
    }

    pub fn file(&self) -> &Path {
        match self {
            Anchor::SelfAnchored(p) | Anchor::External(p) => p,
        }
    }

    /// Absolute, normalized directory that raw paths are relative to.
    pub fn dir(&self) -> PathBuf {
        let parent = self.file().parent().unwrap_or_else(|| Path::new(""));
        let absolute = std::path::absolute(parent).unwrap_or_else(|_| parent.to_path_buf());
        normalize(&absolute)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    pub raw: String,
    pub anchor: Anchor,
    pub path: PathBuf,
}

impl Reference {
    pub fn new(raw: &str, anchor: Anchor) -> Self {
        let path = resolve(raw, &anchor);
        Reference {
            raw: raw.to_owned(),
            anchor,
            path,
        }
    }

    /// Where this reference's file goes, and how to spell it, when the
    /// referencing file moves under `new_anchor`.
    pub fn rebase(&self, new_anchor: &Anchor) -> Relocation {
        rebase(&self.path, &self.anchor, new_anchor)
    }
}

/// Lexically remove `.` and `..` components.  Leading `..` on a
/// relative path are kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = vec![];
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            c => out.push(c),
        }
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// Resolve `raw` against `anchor`.
///
/// Backslashes are treated as separators.  A leading separator is
/// stripped rather than taken as an escape to the root, so every
/// reference lands under the anchor directory unless it climbs out
/// with `..`.
pub fn resolve(raw: &str, anchor: &Anchor) -> PathBuf {
    let raw = raw.trim().replace('\\', "/");
    let relative = raw.trim_start_matches('/');
    normalize(&anchor.dir().join(relative))
}

/// Resolve `raw` and check that the file exists.  A missing file is a
/// reference error carrying `location`, if given.
pub fn resolve_existing(
    raw: &str,
    anchor: &Anchor,
    probe: &dyn PathProbe,
    location: Option<&Location>,
) -> Result<Reference> {
    let with_location = |err: Error| match location {
        Some(loc) => err.at(&loc.file, loc.line),
        None => err,
    };

    if raw.trim().is_empty() {
        let err: Result<Reference> = ref_err!(EmptyReference, "empty file reference".to_owned());
        return err.map_err(with_location);
    }

    let reference = Reference::new(raw, anchor.clone());
    if !probe.exists(&reference.path) {
        let err: Result<Reference> = ref_err!(
            MissingReference,
            format!("file '{}' does not exist", reference.path.display())
        );
        return err.map_err(with_location);
    }
    Ok(reference)
}

/// Spell the absolute `target` relative to `anchor`'s directory, with
/// `/` separators.  Falls back to the absolute path when the two share
/// no root (different drives).
pub fn relative_path(target: &Path, anchor: &Anchor) -> String {
    let target = normalize(target);
    let dir = anchor.dir();

    let target_parts: Vec<Component> = target.components().collect();
    let dir_parts: Vec<Component> = dir.components().collect();

    let common = target_parts
        .iter()
        .zip(dir_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 {
        return to_raw(&target);
    }

    let mut parts: Vec<String> = vec![];
    for _ in common..dir_parts.len() {
        parts.push("..".to_owned());
    }
    for c in &target_parts[common..] {
        parts.push(c.as_os_str().to_string_lossy().into_owned());
    }
    parts.join("/")
}

/// Render a path the way it is written into files.
pub fn to_raw(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// One file that needs to exist at `destination` for `raw` to resolve
/// from the new anchor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relocation {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub raw: String,
}

impl Relocation {
    pub fn is_move(&self) -> bool {
        self.source != self.destination
    }
}

pub fn rebase(absolute: &Path, old_anchor: &Anchor, new_anchor: &Anchor) -> Relocation {
    let raw = relative_path(absolute, old_anchor);
    let destination = if old_anchor.dir() == new_anchor.dir() {
        normalize(absolute)
    } else {
        resolve(&raw, new_anchor)
    };
    Relocation {
        source: normalize(absolute),
        destination,
        raw,
    }
}

/// The set of copies a write needs, planned before any file is written.
#[derive(Clone, Debug, Default)]
pub struct RelocationPlan {
    relocations: Vec<Relocation>,
    destinations: HashSet<PathBuf>,
}

impl RelocationPlan {
    pub fn new() -> Self {
        Default::default()
    }

    /// Queue `relocation`.  Relocations that do not move the file, or
    /// whose destination is already planned, are ignored.
    pub fn add(&mut self, relocation: Relocation) {
        if !relocation.is_move() || self.destinations.contains(&relocation.destination) {
            return;
        }
        self.destinations.insert(relocation.destination.clone());
        self.relocations.push(relocation);
    }

    /// Mark `destination` as produced by the writer itself, so no copy
    /// is made to it.
    pub fn reserve(&mut self, destination: &Path) {
        let destination = normalize(destination);
        self.relocations.retain(|r| r.destination != destination);
        self.destinations.insert(destination);
    }

    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    pub fn is_empty(&self) -> bool {
        self.relocations.is_empty()
    }

    /// Copy every planned file, creating destination directories as
    /// needed.  Sources that do not exist are reported and skipped.
    /// Returns the number of files copied.
    pub fn execute(&self, sink: &mut dyn DiagnosticsSink) -> Result<usize> {
        let results = copy_all(&self.relocations);

        let mut copied = 0;
        for (relocation, result) in self.relocations.iter().zip(results) {
            match result {
                Ok(()) => copied += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    sink.report(Diagnostic::error(format!(
                        "cannot relocate missing file '{}'",
                        relocation.source.display()
                    )));
                }
                Err(err) => {
                    return Err(Error::from(err).at(&relocation.destination, 0));
                }
            }
        }
        log::debug!("relocated {copied} of {} files", self.relocations.len());
        Ok(copied)
    }
}

fn copy_one(relocation: &Relocation) -> io::Result<()> {
    if !relocation.source.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            relocation.source.display().to_string(),
        ));
    }
    if let Some(parent) = relocation.destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(&relocation.source, &relocation.destination)?;
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
fn copy_all(relocations: &[Relocation]) -> Vec<io::Result<()>> {
    use rayon::prelude::*;

    relocations.par_iter().map(copy_one).collect()
}

#[cfg(target_arch = "wasm32")]
fn copy_all(relocations: &[Relocation]) -> Vec<io::Result<()>> {
    relocations.iter().map(copy_one).collect()
}
