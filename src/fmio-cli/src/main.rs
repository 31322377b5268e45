// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};

use fmio_engine::bc::BcFile;
use fmio_engine::bnd_ext::BndExtForceFile;
use fmio_engine::diagnostics::Diagnostics;
use fmio_engine::ext;
use fmio_engine::mdu::{MduWriteOptions, ModelDefinition};
use fmio_engine::morphology::MorphologyFile;
use fmio_engine::pli;
use fmio_engine::ModelFiles;

#[derive(Parser)]
#[command(name = "fmio")]
#[command(about = "Check, reformat and relocate D-Flow FM input files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More logging; repeat for debug output
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a file and print its diagnostics
    Check {
        file: PathBuf,
    },

    /// Re-render a file in its canonical layout
    Format {
        file: PathBuf,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Dump the forcing blocks of a bc file as JSON
    Blocks {
        file: PathBuf,
    },

    /// Write a model and every file it references under a new directory
    Relocate {
        mdu: PathBuf,
        dest_dir: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FileKind {
    Bc,
    Ext,
    BndExt,
    Mdu,
    Morphology,
    Polyline,
}

impl FileKind {
    /// Decide by extension.  `.ext` is both the old and the new external
    /// forcing format; only the new one has sections.
    fn detect(path: &Path, text: &str) -> Option<FileKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let kind = match ext.as_str() {
            "bc" | "bcm" => FileKind::Bc,
            "ext" => {
                if text.lines().any(|l| l.trim_start().starts_with('[')) {
                    FileKind::BndExt
                } else {
                    FileKind::Ext
                }
            }
            "mdu" => FileKind::Mdu,
            "mor" => FileKind::Morphology,
            "pli" | "pliz" | "pol" => FileKind::Polyline,
            _ => return None,
        };
        Some(kind)
    }
}

fn read_text(path: &Path) -> Result<(String, FileKind)> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let Some(kind) = FileKind::detect(path, &text) else {
        bail!("don't know how to read {}", path.display());
    };
    Ok((text, kind))
}

fn print_diagnostics(diags: &Diagnostics) {
    for diag in diags.all() {
        eprintln!("{diag}");
    }
}

fn check(path: &Path) -> Result<ExitCode> {
    let (text, kind) = read_text(path)?;
    let mut diags = Diagnostics::new();
    let parsed: fmio_engine::Result<()> = match kind {
        FileKind::Bc => BcFile::parse(&text, path, &mut diags).map(|blocks| {
            log::info!("{} forcing blocks", blocks.len());
        }),
        FileKind::Ext => ext::parse(&text).map_err(|e| e.in_file(path)).map(|forcings| {
            log::info!("{} forcings", forcings.len());
        }),
        FileKind::BndExt => BndExtForceFile::parse(&text, path, &mut diags).map(|file| {
            log::info!("{} boundaries, {} laterals", file.boundaries.len(), file.laterals.len());
        }),
        // a model is checked together with everything it references
        FileKind::Mdu => ModelFiles::read(path, &mut diags).map(|files| {
            log::info!("{} flow forcing blocks", files.forcing.flow.len());
        }),
        FileKind::Morphology => MorphologyFile::parse(&text, path, &mut diags).map(|mor| {
            log::info!("{} morphology boundaries", mor.boundaries.len());
        }),
        FileKind::Polyline => pli::parse(&text).map_err(|e| e.in_file(path)).map(|features| {
            log::info!("{} polylines", features.len());
        }),
    };

    print_diagnostics(&diags);
    match parsed {
        Err(err) => {
            eprintln!("error: {err}");
            Ok(ExitCode::FAILURE)
        }
        Ok(()) if diags.has_errors() => Ok(ExitCode::FAILURE),
        Ok(()) => Ok(ExitCode::SUCCESS),
    }
}

fn format(path: &Path, output: Option<&Path>) -> Result<ExitCode> {
    let (text, kind) = read_text(path)?;
    let mut diags = Diagnostics::new();
    let context = || format!("Failed to parse {}", path.display());
    let rendered = match kind {
        FileKind::Bc => {
            let blocks = BcFile::parse(&text, path, &mut diags).with_context(context)?;
            BcFile::render(&blocks).with_context(context)?
        }
        FileKind::Ext => {
            let forcings = ext::parse(&text).with_context(context)?;
            ext::render(&forcings, &[])
        }
        FileKind::BndExt => BndExtForceFile::parse(&text, path, &mut diags)
            .with_context(context)?
            .render(),
        FileKind::Mdu => ModelDefinition::parse(&text, path, &mut diags)
            .with_context(context)?
            .render(&MduWriteOptions::default()),
        FileKind::Morphology => MorphologyFile::parse(&text, path, &mut diags)
            .with_context(context)?
            .render(),
        FileKind::Polyline => pli::render(&pli::parse(&text).with_context(context)?),
    };
    print_diagnostics(&diags);

    match output {
        Some(out) => fs::write(out, rendered).with_context(|| format!("Failed to write {}", out.display()))?,
        None => print!("{rendered}"),
    }
    Ok(ExitCode::SUCCESS)
}

fn blocks(path: &Path) -> Result<ExitCode> {
    let mut diags = Diagnostics::new();
    let blocks = BcFile::read(path, &mut diags).with_context(|| format!("Failed to read {}", path.display()))?;
    print_diagnostics(&diags);
    println!("{}", serde_json::to_string_pretty(&blocks)?);
    Ok(ExitCode::SUCCESS)
}

fn relocate(mdu: &Path, dest_dir: &Path) -> Result<ExitCode> {
    let Some(name) = mdu.file_name() else {
        bail!("{} is not a file", mdu.display());
    };
    let mut diags = Diagnostics::new();
    let files = ModelFiles::read(mdu, &mut diags).with_context(|| format!("Failed to read model {}", mdu.display()))?;
    let target = dest_dir.join(name);
    let summary = files
        .write(&target, &mut diags)
        .with_context(|| format!("Failed to write model to {}", dest_dir.display()))?;
    print_diagnostics(&diags);

    for path in summary.written.iter() {
        println!("wrote {}", path.display());
    }
    println!("copied {} referenced files", summary.copied);
    if diags.has_errors() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).init();

    match cli.command {
        Commands::Check { file } => check(&file),
        Commands::Format { file, output } => format(&file, output.as_deref()),
        Commands::Blocks { file } => blocks(&file),
        Commands::Relocate { mdu, dest_dir } => relocate(&mdu, &dest_dir),
    }
}
