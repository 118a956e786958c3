//! Verilator harness emitter: a C++ `main` that drives the companion ports
//! module with the recorded changes, stepping the model at a fixed clock.

use std::io::Write;
use std::num::NonZeroU64;

use crate::error::{Result, VcdError};
use crate::hierarchy::{Hierarchy, Signal, SignalId};
use crate::stream::{replay, ChangeStream, StimulusDriver};
use crate::types::{Logic, Timescale, Value};
use crate::vcd::Document;

/// What to do with `x`/`z` bits, which a two-state model cannot hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceInvalid {
    Disabled,
    Zero,
    One,
}

impl ReplaceInvalid {
    fn logic(self) -> Option<Logic> {
        match self {
            ReplaceInvalid::Disabled => None,
            ReplaceInvalid::Zero => Some(Logic::Zero),
            ReplaceInvalid::One => Some(Logic::One),
        }
    }
}

impl Default for ReplaceInvalid {
    fn default() -> Self {
        ReplaceInvalid::Disabled
    }
}

#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub module_name: String,
    /// Clock frequency in Hz. Required.
    pub clock_freq: Option<f64>,
    pub ignore_invalid: bool,
    pub replace_invalid: ReplaceInvalid,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        HarnessOptions {
            module_name: "vcdsim".to_string(),
            clock_freq: None,
            ignore_invalid: false,
            replace_invalid: ReplaceInvalid::Disabled,
        }
    }
}

pub(crate) const CLOCK_FREQ_FLAG: &str = "--verilator-clock-freq";

/// Checks the options that must be set before anything is read or written.
pub fn validate(options: &HarnessOptions) -> Result<f64> {
    match options.clock_freq {
        Some(freq) if freq.is_finite() && freq > 0.0 => Ok(freq),
        _ => Err(VcdError::MissingParameter(CLOCK_FREQ_FLAG)),
    }
}

/// Number of timescale ticks in one clock period, at least 1.
pub fn step_ticks(clock_freq: f64, timescale: &Timescale) -> NonZeroU64 {
    let exact = 1.0 / (clock_freq * timescale.seconds());
    let ticks = exact.round().max(1.0).min(u64::MAX as f64) as u64;
    if (ticks as f64 - exact).abs() > f64::EPSILON * exact.max(1.0) {
        log::warn!(
            "a {} Hz clock is {} ticks of {}, rounded to {}",
            clock_freq,
            exact,
            timescale,
            ticks
        );
    }
    NonZeroU64::new(ticks).unwrap_or(NonZeroU64::MIN)
}

fn describe(value: &Value) -> String {
    let bits: String = value.bits().iter().map(|l| l.as_char()).collect();
    match value {
        Value::Scalar(_) => bits,
        Value::Vector(_) => format!("b{}", bits),
    }
}

/// Writes the replay as C++ statements, merging consecutive steps into a
/// single `step` call.
struct HarnessWriter<'a, W: Write> {
    out: &'a mut W,
    hierarchy: &'a Hierarchy,
    options: &'a HarnessOptions,
    pending_steps: u64,
}

impl<'a, W: Write> HarnessWriter<'a, W> {
    fn flush_steps(&mut self) -> Result<()> {
        if self.pending_steps > 0 {
            writeln!(
                self.out,
                "    step(contextp.get(), top.get(), {});",
                self.pending_steps
            )?;
            self.pending_steps = 0;
        }
        Ok(())
    }

    fn assign(&mut self, signal: &Signal, value: &Value) -> Result<()> {
        let width = signal.width.max(1) as usize;
        let bits = value.resize(width);
        if bits.len() < value.bits().len() {
            log::warn!(
                "`{}` truncated to {} bits",
                signal.path.join("."),
                signal.width
            );
        }
        let word = |chunk: &[Logic]| {
            chunk
                .iter()
                .fold(0u64, |acc, l| (acc << 1) | (*l == Logic::One) as u64)
        };
        if width <= 64 {
            let suffix = if width > 32 { "ULL" } else { "" };
            writeln!(
                self.out,
                "    top->{} = 0x{:x}{};",
                signal.ident,
                word(&bits),
                suffix
            )?;
        } else {
            // VlWide words are little-endian, 32 bits each
            for (i, chunk) in bits.rchunks(32).enumerate() {
                writeln!(
                    self.out,
                    "    top->{}[{}] = 0x{:x}U;",
                    signal.ident,
                    i,
                    word(chunk)
                )?;
            }
        }
        Ok(())
    }
}

impl<'a, W: Write> StimulusDriver for HarnessWriter<'a, W> {
    type Target = SignalId;

    fn drive(&mut self, target: &SignalId, value: &Value) -> Result<()> {
        let hierarchy = self.hierarchy;
        let signal = &hierarchy[*target];
        let value = if value.is_known() {
            value.clone()
        } else {
            match self.options.replace_invalid.logic() {
                Some(with) => value.replace_unknown(with),
                None if self.options.ignore_invalid => {
                    log::trace!("skipping `{}` for {}", describe(value), signal.ident);
                    return Ok(());
                }
                None => return Err(VcdError::UnsupportedValue(describe(value))),
            }
        };
        self.flush_steps()?;
        self.assign(signal, &value)
    }

    fn step(&mut self, _time: u64) -> Result<()> {
        self.pending_steps += 1;
        Ok(())
    }
}

pub fn write<W: Write>(
    out: &mut W,
    document: &Document,
    hierarchy: &Hierarchy,
    options: &HarnessOptions,
) -> Result<()> {
    let clock_freq = validate(options)?;
    let step = step_ticks(clock_freq, &document.timescale()?);
    let top = &options.module_name;

    write!(
        out,
        r#"#include <cstdint>
#include <memory>

#include "verilated.h"
#include "V{top}.h"

static const uint64_t STEP_TICKS = {step};

static void step(VerilatedContext* contextp, V{top}* top, uint64_t n) {{
    for (uint64_t i = 0; i < n; ++i) {{
        top->eval();
        contextp->timeInc(STEP_TICKS);
    }}
}}

int main(int argc, char** argv) {{
    const std::unique_ptr<VerilatedContext> contextp{{new VerilatedContext}};
    contextp->commandArgs(argc, argv);
    const std::unique_ptr<V{top}> top{{new V{top}{{contextp.get()}}}};

"#,
        top = top,
        step = step
    )?;

    let stream = ChangeStream::new(document, hierarchy, step, options.ignore_invalid);
    let mut writer = HarnessWriter {
        out: &mut *out,
        hierarchy,
        options,
        pending_steps: 0,
    };
    let steps = replay(stream, &mut writer)?;
    writer.flush_steps()?;
    log::debug!("harness replays {} steps of {} ticks", steps, step);

    writeln!(out)?;
    writeln!(out, "    top->eval();")?;
    writeln!(out, "    top->final();")?;
    writeln!(out, "    return 0;")?;
    writeln!(out, "}}")?;
    Ok(())
}

/// Renders the harness into a string.
pub fn emit(document: &Document, hierarchy: &Hierarchy, options: &HarnessOptions) -> Result<String> {
    let mut buffer = Vec::new();
    write(&mut buffer, document, hierarchy, options)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
