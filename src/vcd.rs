use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

#[cfg(test)]
use nom::error::ErrorKind;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_till1, take_until, take_while1},
    character::complete::{alphanumeric1, char, digit1, multispace1, one_of},
    combinator::{all_consuming, map, map_res},
    error::ParseError,
    sequence::{preceded, terminated, tuple},
    IResult,
};
use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Result, VcdError};
use crate::hierarchy::Hierarchy;
use crate::logica;
use crate::stream::Events;
use crate::types::{Logic, Timescale, Value, VariableKind};

/// Keyword that separates the header from the value changes.
pub const BODY_MARKER: &str = "$dumpvars";
const END_TAG: &str = "$end";
/// Widest `$var` accepted, the largest vector Verilator supports.
pub const MAX_WIDTH: u32 = 1 << 16;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum FileFormat {
    Vcd,
    LogicCsv,
    LogicBin,
}

/// A `$var` declaration: the short id used in the body, bound to the scope
/// path it was declared in.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Symbol {
    pub id: String,
    pub kind: VariableKind,
    pub width: u32,
    /// Scope names, terminated by the signal name.
    pub path: Vec<String>,
}

impl Symbol {
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }
}

/// Symbols in declaration order, keyed by id.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct SymbolTable {
    symbols: IndexMap<String, Symbol>,
}

impl SymbolTable {
    /// Adds a symbol. Redeclaring an id replaces the previous declaration but
    /// keeps its position in the table.
    pub fn insert(&mut self, symbol: Symbol) {
        let path = symbol.path.join(".");
        if let Some(old) = self.symbols.insert(symbol.id.clone(), symbol) {
            log::debug!("symbol `{}` redeclared as {}", old.id, path);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Symbol> {
        self.symbols.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.symbols.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// One parsed body record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event<'a> {
    Change { symbol: &'a str, value: Value },
    Time(u64),
}

/// A parsed dump: header keywords, symbol table and the raw body records.
///
/// Immutable once built; hierarchies and streams are derived from it on
/// demand.
#[derive(Clone, Debug, Serialize)]
pub struct Document {
    format: FileFormat,
    keywords: BTreeMap<String, String>,
    symbols: SymbolTable,
    #[serde(skip)]
    records: Vec<String>,
}

impl Document {
    /// Builds a document from already split parts, checking that every
    /// change names a declared symbol and that time never goes backwards.
    pub(crate) fn from_parts(
        format: FileFormat,
        keywords: BTreeMap<String, String>,
        symbols: SymbolTable,
        records: Vec<String>,
    ) -> Result<Self> {
        let mut last_time = None;
        for record in &records {
            match parse_record(record) {
                Some(Event::Change { symbol, .. }) if !symbols.contains(symbol) => {
                    return Err(VcdError::UndeclaredSymbol(
                        record.clone(),
                        symbol.to_string(),
                    ));
                }
                Some(Event::Time(t)) => {
                    if let Some(last) = last_time {
                        if t < last {
                            return Err(VcdError::TimeWentBackwards(t, last));
                        }
                    }
                    last_time = Some(t);
                }
                _ => {}
            }
        }
        Ok(Document {
            format,
            keywords,
            symbols,
            records,
        })
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn keywords(&self) -> &BTreeMap<String, String> {
        &self.keywords
    }

    pub fn keyword(&self, name: &str) -> Option<&str> {
        self.keywords.get(name).map(String::as_str)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn records(&self) -> &[String] {
        &self.records
    }

    pub fn timescale(&self) -> Result<Timescale> {
        self.keyword("timescale").unwrap_or("").parse()
    }

    /// A fresh signal tree.
    pub fn hierarchy(&self) -> Result<Hierarchy> {
        Hierarchy::build(self)
    }

    /// A fresh pass over the body records.
    pub fn events(&self, ignore_invalid: bool) -> Events<'_> {
        Events::new(&self.records, ignore_invalid)
    }

    /// Keywords and symbols as pretty-printed JSON.
    pub fn header_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Configuration handed to the parser.
#[derive(Clone, Debug)]
pub struct ParserOptions {
    /// Keywords assumed when the file does not declare them.
    pub default_keywords: BTreeMap<String, String>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        let mut default_keywords = BTreeMap::new();
        default_keywords.insert("timescale".to_string(), "1ns".to_string());
        ParserOptions { default_keywords }
    }
}

pub struct VcdParser {
    options: ParserOptions,
}

impl VcdParser {
    pub fn new(options: ParserOptions) -> Self {
        VcdParser { options }
    }

    /// Reads a dump, picking the reader from the file extension.
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<Document> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        log::debug!("reading {} as `{}`", path.display(), extension);
        match extension.as_str() {
            "vcd" => self.parse_str(&read_text(path)?),
            "csv" => logica::parse_csv(&read_text(path)?, self.options.default_keywords.clone()),
            "bin" => {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("channel");
                logica::parse_bin(&read_bytes(path)?, name, self.options.default_keywords.clone())
            }
            _ => Err(VcdError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Parses canonical VCD text.
    pub fn parse_str(&self, text: &str) -> Result<Document> {
        let (header, records) = split_body(text)?;
        let mut header_parser = VcdHeaderParser::new(self.options.default_keywords.clone());
        header_parser.run(&header)?;
        log::debug!(
            "parsed header: {} keywords, {} symbols, {} records",
            header_parser.keywords.len(),
            header_parser.symbols.len(),
            records.len()
        );
        Document::from_parts(
            FileFormat::Vcd,
            header_parser.keywords,
            header_parser.symbols,
            records,
        )
    }
}

impl Default for VcdParser {
    fn default() -> Self {
        VcdParser::new(ParserOptions::default())
    }
}

/// The file is only open for the duration of this call.
fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut f = File::open(path)?;
    let mut data = Vec::new();
    f.read_to_end(&mut data)?;
    Ok(data)
}

fn read_text(path: &Path) -> Result<String> {
    String::from_utf8(read_bytes(path)?)
        .map_err(|e| VcdError::InvalidEncoding(path.display().to_string(), e))
}

/// Splits the text at the first `$dumpvars` line.
///
/// Returns the header (trimmed lines joined by `\n`) and the body records:
/// every later non-empty line that does not contain `$end`.
fn split_body(text: &str) -> Result<(String, Vec<String>)> {
    let mut lines = text.lines();
    let mut header = Vec::new();
    loop {
        match lines.next() {
            None => return Err(VcdError::MissingBodyMarker),
            Some(line) if line.contains(BODY_MARKER) => break,
            Some(line) => header.push(line.trim()),
        }
    }
    let records = lines
        .filter(|l| !l.contains(END_TAG))
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    Ok((header.join("\n"), records))
}

struct VcdHeaderParser {
    keywords: BTreeMap<String, String>,
    symbols: SymbolTable,
    scope: Vec<String>,
}

impl VcdHeaderParser {
    fn new(keywords: BTreeMap<String, String>) -> Self {
        VcdHeaderParser {
            keywords,
            symbols: SymbolTable::default(),
            scope: Vec::with_capacity(16),
        }
    }

    fn next_header_command(&mut self, cmd: &str, content: &str) -> Result<()> {
        match cmd {
            "scope" => {
                let name = content
                    .split_whitespace()
                    .nth(1)
                    .ok_or_else(|| VcdError::MalformedHeader(format!("$scope {}", content)))?;
                self.scope.push(name.to_string());
            }
            "upscope" => {
                self.scope.pop().ok_or(VcdError::UnbalancedUpscope)?;
            }
            "var" => {
                let fields: Vec<&str> = content.split_whitespace().collect();
                if fields.len() != 4 {
                    return Err(VcdError::MalformedVar(content.to_string()));
                }
                let (kind, width, id, name) = (fields[0], fields[1], fields[2], fields[3]);
                let width = u32::from_str(width)
                    .ok()
                    .filter(|w| (1..=MAX_WIDTH).contains(w))
                    .ok_or_else(|| VcdError::InvalidWidth(width.to_string(), name.to_string()))?;
                let mut path = self.scope.clone();
                path.push(name.to_string());
                self.symbols.insert(Symbol {
                    id: id.to_string(),
                    kind: VariableKind::from(kind),
                    width,
                    path,
                });
            }
            x => {
                self.keywords.insert(x.to_string(), content.to_string());
            }
        }
        Ok(())
    }

    fn run(&mut self, header: &str) -> Result<()> {
        type E<'a> = (&'a str, nom::error::ErrorKind);
        let mut w = header;
        while w.contains('$') {
            let (remaining, cmd) = vcd_directive::<E>(w).map_err(|_| malformed_near(w))?;
            if cmd == "end" {
                w = remaining;
                continue;
            }
            let (remaining, content) =
                directive_body::<E>(remaining).map_err(|_| malformed_near(w))?;
            self.next_header_command(cmd, content.trim())?;
            w = remaining;
        }
        Ok(())
    }
}

fn malformed_near(input: &str) -> VcdError {
    let start = input.find('$').unwrap_or(0);
    let snippet: String = input[start..].chars().take(32).collect();
    VcdError::MalformedHeader(snippet)
}

/// Skips to the next `$` and returns the keyword that follows it.
fn vcd_directive<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    preceded(take_till(|c: char| c == '$'), preceded(char('$'), alphanumeric1))(input)
}

/// Everything up to the closing `$end`, which is consumed.
fn directive_body<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    terminated(take_until(END_TAG), tag(END_TAG))(input)
}

fn is_vcd_bit(c: char) -> bool {
    Logic::from_char(c).is_some()
}

/// Symbol ids are any run of non-whitespace characters.
fn vcd_varid<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    take_till1(|c: char| c.is_whitespace())(input)
}

fn vcd_bit_change<'a, E: ParseError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, (char, &'a str), E> {
    tuple((one_of("01xXzZ"), vcd_varid))(input)
}

fn vcd_vec_change<'a, E: ParseError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, (&'a str, &'a str), E> {
    preceded(
        one_of("bB"),
        tuple((terminated(take_while1(is_vcd_bit), multispace1), vcd_varid)),
    )(input)
}

fn vcd_time<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, u64, E> {
    map_res(preceded(char('#'), digit1), u64::from_str)(input)
}

fn vcd_record<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, Event<'a>, E> {
    all_consuming(alt((
        map(vcd_bit_change, |(c, symbol)| Event::Change {
            symbol,
            value: Value::Scalar(Logic::from_char(c).unwrap_or(Logic::X)),
        }),
        map(vcd_vec_change, |(bits, symbol)| Event::Change {
            symbol,
            value: Value::parse_bits(bits).unwrap_or(Value::Vector(vec![])),
        }),
        map(vcd_time, Event::Time),
    )))(input)
}

/// Classifies one body record. `None` means the record is not a supported
/// value change or time marker.
pub fn parse_record(record: &str) -> Option<Event<'_>> {
    vcd_record::<(&str, nom::error::ErrorKind)>(record)
        .ok()
        .map(|(_, event)| event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vcd_directive() {
        type E<'a> = (&'a str, ErrorKind);
        assert_eq!(
            vcd_directive::<E>("\n$timescale 1ns $end"),
            Ok((" 1ns $end", "timescale"))
        );
        assert_eq!(
            vcd_directive::<E>("#0\n$enddefinitions $end"),
            Ok((" $end", "enddefinitions"))
        );
        assert!(vcd_directive::<E>("no directive here").is_err());
        assert!(vcd_directive::<E>("$ scope").is_err());
    }

    #[test]
    fn test_directive_body() {
        type E<'a> = (&'a str, ErrorKind);
        assert_eq!(
            directive_body::<E>(" module top $end\n$var"),
            Ok(("\n$var", " module top "))
        );
        assert_eq!(
            directive_body::<E>("\n  Mon Jan 1\n  2021\n$end"),
            Ok(("", "\n  Mon Jan 1\n  2021\n"))
        );
        assert!(directive_body::<E>(" module top").is_err());
    }

    #[test]
    fn test_vcd_change() {
        type E<'a> = (&'a str, ErrorKind);
        assert_eq!(vcd_bit_change::<E>("x!!"), Ok(("", ('x', "!!"))));
        assert_eq!(vcd_bit_change::<E>("Z#%"), Ok(("", ('Z', "#%"))));
        assert!(vcd_bit_change::<E>("1 !").is_err());
        assert_eq!(
            vcd_vec_change::<E>("b1001101 lala"),
            Ok(("", ("1001101", "lala")))
        );
        assert_eq!(vcd_vec_change::<E>("BzX01 v"), Ok(("", ("zX01", "v"))));
        assert!(vcd_vec_change::<E>("b1001101").is_err());
        assert_eq!(vcd_time::<E>("#1244"), Ok(("", 1244)));
        assert!(vcd_time::<E>("# 12").is_err());
    }

    #[test]
    fn test_parse_record() {
        assert_eq!(
            parse_record("1!"),
            Some(Event::Change {
                symbol: "!",
                value: Value::Scalar(Logic::One)
            })
        );
        assert_eq!(
            parse_record("b01z #"),
            Some(Event::Change {
                symbol: "#",
                value: Value::Vector(vec![Logic::Zero, Logic::One, Logic::Z]),
            })
        );
        assert_eq!(parse_record("#25"), Some(Event::Time(25)));
        // the symbol follows the value without a gap
        assert_eq!(parse_record("1 !"), None);
        assert_eq!(parse_record("y42"), None);
        assert_eq!(parse_record("#12a"), None);
        assert_eq!(parse_record("r3.14 !"), None);
        assert_eq!(parse_record("$dumpoff"), None);
        // does not fit in an u64
        assert_eq!(parse_record("#184467440737095516160000"), None);
    }

    #[test]
    fn test_split_body() {
        let text = "$scope module top $end\n$enddefinitions $end\n$dumpvars\n0!\n\n  $end\n#10\n 1!  \n";
        let (header, records) = split_body(text).unwrap();
        assert_eq!(header, "$scope module top $end\n$enddefinitions $end");
        assert_eq!(records, vec!["0!", "#10", "1!"]);
        assert!(matches!(
            split_body("$scope module top $end\n#0\n1!"),
            Err(VcdError::MissingBodyMarker)
        ));
    }

    #[test]
    fn test_header_keywords() {
        let mut p = VcdHeaderParser::new(BTreeMap::new());
        p.run("$date\n  today\n$end\n$version v1 $end\n$version v2 $end\n$comment a\nb $end")
            .unwrap();
        assert_eq!(p.keywords.get("date").map(String::as_str), Some("today"));
        assert_eq!(p.keywords.get("version").map(String::as_str), Some("v2"));
        assert_eq!(p.keywords.get("comment").map(String::as_str), Some("a\nb"));
    }

    #[test]
    fn test_header_scopes() {
        let mut p = VcdHeaderParser::new(BTreeMap::new());
        p.run(
            "$scope module top $end\n$scope module cpu $end\n$var reg 8 # pc $end\n\
             $upscope $end\n$var wire 1 ! clk $end\n$upscope $end",
        )
        .unwrap();
        assert!(p.scope.is_empty());
        let pc = p.symbols.get("#").unwrap();
        assert_eq!(pc.path, vec!["top", "cpu", "pc"]);
        assert_eq!(pc.width, 8);
        assert_eq!(pc.kind, VariableKind::Reg);
        assert_eq!(p.symbols.get("!").unwrap().path, vec!["top", "clk"]);
        assert!(!p.keywords.contains_key("scope"));
    }

    #[test]
    fn test_header_errors() {
        let mut p = VcdHeaderParser::new(BTreeMap::new());
        assert!(matches!(
            p.run("$scope module top $end $upscope $end $upscope $end"),
            Err(VcdError::UnbalancedUpscope)
        ));
        let mut p = VcdHeaderParser::new(BTreeMap::new());
        assert!(matches!(
            p.run("$var wire 8 # data [7:0] $end"),
            Err(VcdError::MalformedVar(_))
        ));
        let mut p = VcdHeaderParser::new(BTreeMap::new());
        assert!(matches!(
            p.run("$var wire eight # data $end"),
            Err(VcdError::InvalidWidth(..))
        ));
        for width in &["0", "65537", "4000000000"] {
            let mut p = VcdHeaderParser::new(BTreeMap::new());
            let decl = format!("$var wire {} ! a $end", width);
            assert!(matches!(p.run(&decl), Err(VcdError::InvalidWidth(ref w, _)) if w == *width));
        }
        let mut p = VcdHeaderParser::new(BTreeMap::new());
        p.run("$var wire 65536 ! a $end").unwrap();
        let mut p = VcdHeaderParser::new(BTreeMap::new());
        assert!(matches!(
            p.run("$timescale 1ns"),
            Err(VcdError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_redeclared_symbol_keeps_position() {
        let mut table = SymbolTable::default();
        let sym = |id: &str, name: &str| Symbol {
            id: id.to_string(),
            kind: VariableKind::Wire,
            width: 1,
            path: vec![name.to_string()],
        };
        table.insert(sym("!", "a"));
        table.insert(sym("#", "b"));
        table.insert(sym("!", "c"));
        let names: Vec<&str> = table.iter().map(Symbol::name).collect();
        assert_eq!(names, vec!["c", "b"]);
        assert_eq!(table.len(), 2);
    }
}
