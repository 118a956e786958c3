//! Readers for logic-analyzer exports.
//!
//! Both formats are flat: every channel becomes a root-level 1-bit signal,
//! and the samples are turned into the same records a VCD body holds.

use std::collections::BTreeMap;

use nom::{
    bytes::complete::tag,
    error::ErrorKind,
    number::complete::{le_f64, le_i32, le_u32, le_u64},
    sequence::{preceded, tuple},
    IResult,
};

use crate::error::{Result, VcdError};
use crate::types::{Timescale, VariableKind};
use crate::vcd::{Document, FileFormat, Symbol, SymbolTable};

const BIN_MAGIC: &[u8] = b"<SALEAE>";
const BIN_DIGITAL: i32 = 0;

/// Short VCD-style id for the `n`th channel: `!`, `"`, ..., `~`, `!!`, ...
fn symbol_id(mut n: usize) -> String {
    const FIRST: u8 = b'!';
    const COUNT: usize = (b'~' - b'!' + 1) as usize;
    let mut id = String::new();
    loop {
        id.push((FIRST + (n % COUNT) as u8) as char);
        n /= COUNT;
        if n == 0 {
            return id;
        }
        n -= 1;
    }
}

fn channel(n: usize, name: &str) -> Symbol {
    Symbol {
        id: symbol_id(n),
        kind: VariableKind::Wire,
        width: 1,
        path: vec![name.to_string()],
    }
}

fn timescale_of(keywords: &BTreeMap<String, String>) -> Result<Timescale> {
    keywords
        .get("timescale")
        .map(String::as_str)
        .unwrap_or("")
        .parse()
}

/// Converts a time in seconds, relative to `origin`, to timescale ticks.
fn to_ticks(seconds: f64, origin: f64, timescale: &Timescale) -> Result<u64> {
    let ticks = ((seconds - origin) / timescale.seconds()).round();
    if !ticks.is_finite() || ticks < 0.0 || ticks > u64::MAX as f64 {
        return Err(VcdError::MalformedExport(format!(
            "time {}s cannot be expressed in {} ticks",
            seconds, timescale
        )));
    }
    Ok(ticks as u64)
}

/// Appends a time marker unless the previous marker already holds `tick`.
fn push_time(records: &mut Vec<String>, last_tick: &mut Option<u64>, tick: u64) {
    if *last_tick != Some(tick) {
        records.push(format!("#{}", tick));
        *last_tick = Some(tick);
    }
}

/// Reads a CSV export: a `Time [s], <channel>...` header followed by one row
/// of samples per line.
pub(crate) fn parse_csv(text: &str, keywords: BTreeMap<String, String>) -> Result<Document> {
    let timescale = timescale_of(&keywords)?;
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let header = lines
        .next()
        .ok_or_else(|| VcdError::MalformedExport("empty CSV export".to_string()))?;
    let names: Vec<&str> = header.split(',').skip(1).map(str::trim).collect();
    if names.is_empty() {
        return Err(VcdError::MalformedExport(format!(
            "no channels in header `{}`",
            header
        )));
    }

    let mut symbols = SymbolTable::default();
    for (i, name) in names.iter().enumerate() {
        symbols.insert(channel(i, name));
    }
    let ids: Vec<String> = (0..names.len()).map(symbol_id).collect();

    let mut records = Vec::new();
    let mut levels: Vec<Option<&str>> = vec![None; names.len()];
    let mut origin = None;
    let mut last_tick = None;
    for line in lines {
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        if cells.len() != names.len() + 1 {
            return Err(VcdError::MalformedExport(format!(
                "expected {} cells in `{}`",
                names.len() + 1,
                line
            )));
        }
        let seconds: f64 = cells[0].parse().map_err(|_| {
            VcdError::MalformedExport(format!("invalid time `{}`", cells[0]))
        })?;
        let origin = *origin.get_or_insert(seconds);
        push_time(&mut records, &mut last_tick, to_ticks(seconds, origin, &timescale)?);
        for (i, cell) in cells[1..].iter().enumerate() {
            if *cell != "0" && *cell != "1" {
                return Err(VcdError::MalformedExport(format!(
                    "channel `{}` has non-binary sample `{}`",
                    names[i], cell
                )));
            }
            if levels[i] != Some(*cell) {
                records.push(format!("{}{}", cell, ids[i]));
                levels[i] = Some(*cell);
            }
        }
    }
    log::debug!(
        "read CSV export: {} channels, {} records",
        names.len(),
        records.len()
    );
    Document::from_parts(FileFormat::LogicCsv, keywords, symbols, records)
}

struct BinaryHeader {
    kind: i32,
    initial_state: u32,
    begin_time: f64,
    end_time: f64,
    transitions: u64,
}

fn binary_header<'a>(
    input: &'a [u8],
) -> IResult<&'a [u8], BinaryHeader, (&'a [u8], ErrorKind)> {
    let (input, (_version, kind, initial_state, begin_time, end_time, transitions)) = preceded(
        tag(BIN_MAGIC),
        tuple((le_i32, le_i32, le_u32, le_f64, le_f64, le_u64)),
    )(input)?;
    Ok((
        input,
        BinaryHeader {
            kind,
            initial_state,
            begin_time,
            end_time,
            transitions,
        },
    ))
}

/// Reads a single-channel digital binary export. The channel is named
/// `name`; every recorded transition toggles its level.
pub(crate) fn parse_bin(
    data: &[u8],
    name: &str,
    keywords: BTreeMap<String, String>,
) -> Result<Document> {
    let timescale = timescale_of(&keywords)?;
    let (mut input, header) = binary_header(data)?;
    if header.kind != BIN_DIGITAL {
        return Err(VcdError::MalformedExport(format!(
            "unsupported export type {}, only digital channels can be read",
            header.kind
        )));
    }
    if (input.len() as u64) / 8 < header.transitions {
        return Err(VcdError::MalformedExport(format!(
            "header announces {} transitions but the file is too short",
            header.transitions
        )));
    }

    let mut symbols = SymbolTable::default();
    symbols.insert(channel(0, name));
    let id = symbol_id(0);

    let mut level = header.initial_state != 0;
    let mut records = vec!["#0".to_string(), format!("{}{}", level as u8, id)];
    let mut last_tick = Some(0);
    for _ in 0..header.transitions {
        let (rest, t) = le_f64::<(&[u8], ErrorKind)>(input)?;
        input = rest;
        push_time(&mut records, &mut last_tick, to_ticks(t, header.begin_time, &timescale)?);
        level = !level;
        records.push(format!("{}{}", level as u8, id));
    }
    let end = to_ticks(header.end_time, header.begin_time, &timescale)?;
    if last_tick.map_or(true, |t| end > t) {
        push_time(&mut records, &mut last_tick, end);
    }
    log::debug!(
        "read binary export `{}`: {} transitions",
        name,
        header.transitions
    );
    Document::from_parts(FileFormat::LogicBin, keywords, symbols, records)
}
