// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! A model definition together with every file it pulls in.

use std::path::{Path, PathBuf};

use crate::bnd_ext::{BndExtForceFile, ForcingData};
use crate::common::{Location, Result};
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::ext::ExtForceFile;
use crate::format::write_file;
use crate::mdu::{MduWriteOptions, ModelDefinition};
use crate::morphology::MorphologyFile;
use crate::pli::{self, Feature};
use crate::reference::{
    Anchor, FileSystemProbe, PathProbe, RelocationPlan, normalize, rebase, resolve,
    resolve_existing,
};

#[derive(Clone, Debug)]
pub struct ModelFiles {
    pub path: PathBuf,
    pub mdu: ModelDefinition,
    pub ext: Option<(PathBuf, ExtForceFile)>,
    pub bnd_ext: Option<(PathBuf, BndExtForceFile)>,
    pub morphology: Option<(PathBuf, MorphologyFile)>,
    /// Boundary data reached through the bnd ext file.
    pub forcing: ForcingData,
    /// Boundary polylines reached through the bnd ext file.
    pub features: Vec<Feature>,
}

/// What a write produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Files rendered by this crate, the mdu last.
    pub written: Vec<PathBuf>,
    /// Number of referenced files copied unchanged.
    pub copied: usize,
}

/// Resolve an mdu reference, reporting it if the file is missing.
fn locate(raw: &str, mdu: &Path, probe: &dyn PathProbe, sink: &mut dyn DiagnosticsSink) -> Option<PathBuf> {
    let anchor = Anchor::SelfAnchored(mdu.to_path_buf());
    let location = Location::new(mdu, 0);
    match resolve_existing(raw, &anchor, probe, Some(&location)) {
        Ok(r) => Some(r.path),
        Err(err) => {
            sink.report(Diagnostic::from(&err));
            None
        }
    }
}

fn relative_to_parent(mdu: &ModelDefinition) -> bool {
    mdu.get("PathsRelativeToParent")
        .map(|v| v.trim() == "1")
        .unwrap_or(false)
}

impl ModelFiles {
    pub fn read(path: &Path, sink: &mut dyn DiagnosticsSink) -> Result<ModelFiles> {
        ModelFiles::read_with(path, &FileSystemProbe, sink)
    }

    /// Read the mdu at `path` and, transitively, the files it names.
    /// Sub-files that do not exist are reported and skipped.
    pub fn read_with(path: &Path, probe: &dyn PathProbe, sink: &mut dyn DiagnosticsSink) -> Result<ModelFiles> {
        let path = normalize(&std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()));
        let mdu = ModelDefinition::read(&path, sink)?;
        // sub-file references are relative to the mdu unless told otherwise
        let reference = (!relative_to_parent(&mdu)).then_some(path.as_path());

        let mut files = ModelFiles {
            path: path.clone(),
            mdu: mdu.clone(),
            ext: None,
            bnd_ext: None,
            morphology: None,
            forcing: ForcingData::default(),
            features: vec![],
        };

        if let Some(sub) = mdu.ext_force_file().and_then(|raw| locate(raw, &path, probe, sink)) {
            let ext = ExtForceFile::read(&sub, reference, probe, sink)?;
            files.ext = Some((sub, ext));
        }

        if let Some(sub) = mdu.ext_force_file_new().and_then(|raw| locate(raw, &path, probe, sink)) {
            let bnd = BndExtForceFile::read(&sub, reference, probe, sink)?;
            files.forcing = bnd.read_forcing(sink)?;
            for pli_path in bnd.location_paths() {
                files.features.extend(pli::read(pli_path)?);
            }
            files.bnd_ext = Some((sub, bnd));
        }

        if let Some(sub) = mdu.mor_file().and_then(|raw| locate(raw, &path, probe, sink)) {
            let mor = MorphologyFile::read(&sub, reference, probe, sink)?;
            files.morphology = Some((sub, mor));
        }

        log::info!(
            "read model {} ({} flow blocks, {} polylines)",
            path.display(),
            files.forcing.flow.len(),
            files.features.len()
        );
        Ok(files)
    }

    /// Write the whole model under `new_path`.  Every referenced file is
    /// planned first (two hops: mdu to forcing files, forcing files to
    /// bc and polyline files), unmodified files are copied, the parsed
    /// sub-files are written, and the mdu comes last.
    pub fn write(&self, new_path: &Path, sink: &mut dyn DiagnosticsSink) -> Result<WriteSummary> {
        let new_path = normalize(&std::path::absolute(new_path).unwrap_or_else(|_| new_path.to_path_buf()));
        let old_anchor = Anchor::SelfAnchored(self.path.clone());
        let new_anchor = Anchor::SelfAnchored(new_path.clone());
        let parent_relative = relative_to_parent(&self.mdu);
        let sub_anchor = |sub: &Path| -> Anchor {
            if parent_relative {
                Anchor::SelfAnchored(sub.to_path_buf())
            } else {
                Anchor::External(new_path.clone())
            }
        };

        let mut plan = RelocationPlan::new();
        let mut mdu = self.mdu.clone();
        let mut rendered: Vec<(PathBuf, String)> = vec![];

        // files this crate parsed are rendered again rather than copied
        let parsed: Vec<&Path> = [
            self.ext.as_ref().map(|(p, _)| p.as_path()),
            self.bnd_ext.as_ref().map(|(p, _)| p.as_path()),
            self.morphology.as_ref().map(|(p, _)| p.as_path()),
        ]
        .into_iter()
        .flatten()
        .collect();

        // first hop: the mdu's own references
        let mut keys: Vec<(String, Vec<String>)> = vec![];
        for (key, raw) in self.mdu.file_references() {
            let relocation = rebase(&resolve(&raw, &old_anchor), &old_anchor, &new_anchor);
            let new_raw = relocation.raw.clone();
            if parsed.contains(&relocation.source.as_path()) {
                plan.reserve(&relocation.destination);
            } else {
                plan.add(relocation);
            }
            match keys.iter_mut().find(|(k, _)| *k == key) {
                Some((_, raws)) => raws.push(new_raw),
                None => keys.push((key, vec![new_raw])),
            }
        }
        for (key, raws) in keys.iter() {
            mdu.set(key, &raws.join(" "));
        }

        // second hop: what the parsed sub-files reference
        let destination = |sub: &Path| rebase(sub, &old_anchor, &new_anchor).destination;
        if let Some((ref sub, ref ext)) = self.ext {
            let dest = destination(sub);
            rendered.push((dest.clone(), ext.render_relocated(&sub_anchor(&dest), &mut plan)));
        }
        if let Some((ref sub, ref bnd)) = self.bnd_ext {
            let dest = destination(sub);
            rendered.push((dest.clone(), bnd.render_relocated(&sub_anchor(&dest), &mut plan)));
        }
        if let Some((ref sub, ref mor)) = self.morphology {
            let dest = destination(sub);
            rendered.push((dest.clone(), mor.render_relocated(&sub_anchor(&dest), &mut plan)));
        }
        for (dest, _) in rendered.iter() {
            plan.reserve(dest);
        }

        let copied = plan.execute(sink)?;

        let mut summary = WriteSummary {
            written: vec![],
            copied,
        };
        for (dest, text) in rendered {
            write_file(&dest, &text)?;
            summary.written.push(dest);
        }
        mdu.write(&new_path, &MduWriteOptions::default())?;
        summary.written.push(new_path.clone());

        log::info!(
            "wrote model {} ({} files written, {} copied)",
            new_path.display(),
            summary.written.len(),
            summary.copied
        );
        Ok(summary)
    }
}
