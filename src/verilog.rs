//! Verilog emitter: replays a document as a self-contained testbench, or
//! declares its signals as the ports of a companion module.

use std::io::Write;

use crate::error::{Result, VcdError};
use crate::hierarchy::{Hierarchy, Signal};
use crate::types::Value;
use crate::vcd::{Document, Event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerilogStyle {
    /// `reg` per signal and an `initial` block replaying the changes.
    Testbench,
    /// `input wire` per signal, no behaviour. Top module for Verilator.
    Ports,
}

#[derive(Debug, Clone)]
pub struct VerilogOptions {
    pub module_name: String,
    pub ignore_invalid: bool,
    pub style: VerilogStyle,
}

impl Default for VerilogOptions {
    fn default() -> Self {
        VerilogOptions {
            module_name: "vcdsim".to_string(),
            ignore_invalid: false,
            style: VerilogStyle::Testbench,
        }
    }
}

fn range(width: u32) -> String {
    if width > 1 {
        format!(" [{}:0]", width - 1)
    } else {
        String::new()
    }
}

/// `<width>'b<bits>`, resized to the signal width.
fn literal(signal: &Signal, value: &Value) -> String {
    let width = signal.width.max(1);
    let bits: String = value
        .resize(width as usize)
        .iter()
        .map(|l| l.as_char())
        .collect();
    format!("{}'b{}", width, bits)
}

pub fn write<W: Write>(
    out: &mut W,
    document: &Document,
    hierarchy: &Hierarchy,
    options: &VerilogOptions,
) -> Result<()> {
    let timescale = document.timescale()?;
    writeln!(out, "`timescale {}/{}", timescale, timescale)?;
    writeln!(out)?;
    match options.style {
        VerilogStyle::Testbench => write_testbench(out, document, hierarchy, options),
        VerilogStyle::Ports => write_ports(out, hierarchy, options),
    }
}

fn write_testbench<W: Write>(
    out: &mut W,
    document: &Document,
    hierarchy: &Hierarchy,
    options: &VerilogOptions,
) -> Result<()> {
    writeln!(out, "module {};", options.module_name)?;
    for signal in hierarchy.signals() {
        writeln!(out, "    reg{} {};", range(signal.width), signal.ident)?;
    }
    writeln!(out)?;
    writeln!(out, "    initial begin")?;
    let mut now = 0;
    for event in document.events(options.ignore_invalid) {
        match event? {
            Event::Time(t) => {
                if t > now {
                    writeln!(out, "        #{};", t - now)?;
                    now = t;
                }
            }
            Event::Change { symbol, value } => {
                let id = hierarchy
                    .lookup(symbol)
                    .ok_or_else(|| VcdError::UnresolvedSymbol(symbol.to_string()))?;
                let signal = &hierarchy[id];
                writeln!(out, "        {} = {};", signal.ident, literal(signal, &value))?;
            }
        }
    }
    writeln!(out, "        $finish;")?;
    writeln!(out, "    end")?;
    writeln!(out, "endmodule")?;
    Ok(())
}

fn write_ports<W: Write>(out: &mut W, hierarchy: &Hierarchy, options: &VerilogOptions) -> Result<()> {
    let signals = hierarchy.signals();
    let count = signals.len();
    if count == 0 {
        writeln!(out, "module {};", options.module_name)?;
    } else {
        writeln!(out, "module {} (", options.module_name)?;
        for (i, signal) in signals.enumerate() {
            let sep = if i + 1 < count { "," } else { "" };
            writeln!(out, "    input wire{} {}{}", range(signal.width), signal.ident, sep)?;
        }
        writeln!(out, ");")?;
    }
    writeln!(out, "endmodule")?;
    Ok(())
}

/// Renders the module into a string.
pub fn emit(document: &Document, hierarchy: &Hierarchy, options: &VerilogOptions) -> Result<String> {
    let mut buffer = Vec::new();
    write(&mut buffer, document, hierarchy, options)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
