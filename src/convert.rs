//! End-to-end conversion: read a dump, render the requested artifacts and
//! write them next to their targets atomically.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::Result;
use crate::vcd::{Document, ParserOptions, VcdParser};
use crate::verilator::{self, HarnessOptions, ReplaceInvalid};
use crate::verilog::{self, VerilogOptions, VerilogStyle};

#[derive(Debug, Clone)]
pub struct Options {
    pub input: PathBuf,
    /// Testbench output.
    pub verilog: Option<PathBuf>,
    /// Verilator C++ harness output.
    pub verilator: Option<PathBuf>,
    /// Companion ports module for the harness.
    pub verilator_verilog: Option<PathBuf>,
    pub clock_freq: Option<f64>,
    pub ignore_invalid: bool,
    pub replace_invalid: ReplaceInvalid,
    pub module_name: String,
    pub parser: ParserOptions,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            input: PathBuf::new(),
            verilog: None,
            verilator: None,
            verilator_verilog: None,
            clock_freq: None,
            ignore_invalid: false,
            replace_invalid: ReplaceInvalid::Disabled,
            module_name: "vcdsim".to_string(),
            parser: ParserOptions::default(),
        }
    }
}

impl Options {
    fn verilog_options(&self, style: VerilogStyle) -> VerilogOptions {
        VerilogOptions {
            module_name: self.module_name.clone(),
            ignore_invalid: self.ignore_invalid,
            style,
        }
    }

    fn harness_options(&self) -> HarnessOptions {
        HarnessOptions {
            module_name: self.module_name.clone(),
            clock_freq: self.clock_freq,
            ignore_invalid: self.ignore_invalid,
            replace_invalid: self.replace_invalid,
        }
    }
}

/// Checks the options that do not depend on the input.
pub fn validate(options: &Options) -> Result<()> {
    if options.verilator.is_some() {
        verilator::validate(&options.harness_options())?;
    }
    Ok(())
}

/// Parses the input, rendering nothing.
pub fn load(options: &Options) -> Result<Document> {
    VcdParser::new(options.parser.clone()).parse_file(&options.input)
}

/// Runs the conversion and returns the written paths, in the order
/// testbench, harness, companion module.
///
/// Options are checked before the input is read, and every artifact is
/// rendered before the first one is written.
pub fn run(options: &Options) -> Result<Vec<PathBuf>> {
    validate(options)?;
    let document = load(options)?;
    run_with(&document, options)
}

/// Like [`run`], for a document that is already loaded. `options.input` is
/// not read.
pub fn run_with(document: &Document, options: &Options) -> Result<Vec<PathBuf>> {
    validate(options)?;
    let hierarchy = document.hierarchy()?;

    let mut artifacts: Vec<(&Path, String)> = Vec::new();
    if let Some(path) = &options.verilog {
        let text = verilog::emit(
            document,
            &hierarchy,
            &options.verilog_options(VerilogStyle::Testbench),
        )?;
        artifacts.push((path.as_path(), text));
    }
    if let Some(path) = &options.verilator {
        let text = verilator::emit(document, &hierarchy, &options.harness_options())?;
        artifacts.push((path.as_path(), text));
        if let Some(path) = &options.verilator_verilog {
            let text = verilog::emit(
                document,
                &hierarchy,
                &options.verilog_options(VerilogStyle::Ports),
            )?;
            artifacts.push((path.as_path(), text));
        }
    } else if options.verilator_verilog.is_some() {
        log::warn!("--verilator-verilog has no effect without --verilator");
    }

    let mut written = Vec::with_capacity(artifacts.len());
    for (path, text) in artifacts {
        write_atomic(path, text.as_bytes())?;
        log::info!("generated {}", path.display());
        written.push(path.to_path_buf());
    }
    Ok(written)
}

/// Writes `data` to a temporary file beside `path`, then renames it over
/// `path`.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
