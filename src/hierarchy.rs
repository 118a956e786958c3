//! Signal tree rebuilt from the `$scope`/`$upscope` nesting of a dump.

use std::collections::HashMap;
use std::ops::Index;

use indexmap::map::{Entry, Values};
use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Result, VcdError};
use crate::types::VariableKind;
use crate::vcd::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SignalId(pub usize);

/// A leaf of the tree: the slot that value changes for `symbol` target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub name: String,
    pub path: Vec<String>,
    pub symbol: String,
    pub width: u32,
    pub kind: VariableKind,
    /// Identifier used for this signal in generated sources.
    pub ident: String,
}

#[derive(Debug, Clone)]
pub enum Node {
    Scope(ScopeNode),
    Signal(SignalId),
}

#[derive(Debug, Clone, Default)]
pub struct ScopeNode {
    name: String,
    children: IndexMap<String, Node>,
}

impl ScopeNode {
    fn new(name: &str) -> Self {
        ScopeNode {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Children in insertion order.
    pub fn children(&self) -> Values<'_, String, Node> {
        self.children.values()
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    /// Returns the child scope `name`, creating it if needed.
    fn scope_mut(&mut self, name: &str, path: &[String]) -> Result<&mut ScopeNode> {
        let node = self
            .children
            .entry(name.to_string())
            .or_insert_with(|| Node::Scope(ScopeNode::new(name)));
        match node {
            Node::Scope(scope) => Ok(scope),
            Node::Signal(_) => Err(VcdError::ScopeSignalCollision(path.join("."))),
        }
    }

    fn insert_signal(&mut self, name: &str, id: SignalId, path: &[String]) -> Result<()> {
        match self.children.entry(name.to_string()) {
            Entry::Occupied(e) => match e.get() {
                Node::Scope(_) => Err(VcdError::ScopeSignalCollision(path.join("."))),
                Node::Signal(_) => Err(VcdError::DuplicateSignal(path.join("."))),
            },
            Entry::Vacant(e) => {
                e.insert(Node::Signal(id));
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Hierarchy {
    root: ScopeNode,
    /// Keyed by symbol id. A `SignalId` is the position in this map.
    signals: IndexMap<String, Signal>,
}

impl Hierarchy {
    /// Builds a fresh tree from the symbol table, in table order.
    pub fn build(document: &Document) -> Result<Self> {
        let mut root = ScopeNode::default();
        let mut signals: IndexMap<String, Signal> =
            IndexMap::with_capacity(document.symbols().len());
        let mut by_ident: HashMap<String, SignalId> = HashMap::new();

        for symbol in document.symbols().iter() {
            let path = &symbol.path;
            let id = SignalId(signals.len());
            let mut node = &mut root;
            for (depth, scope) in path[..path.len() - 1].iter().enumerate() {
                node = node.scope_mut(scope, &path[..=depth])?;
            }
            node.insert_signal(symbol.name(), id, path)?;

            let ident = flat_identifier(path);
            if let Some(other) = by_ident.insert(ident.clone(), id) {
                return Err(VcdError::IdentifierCollision(
                    signals[other.0].path.join("."),
                    path.join("."),
                    ident,
                ));
            }
            signals.insert(
                symbol.id.clone(),
                Signal {
                    name: symbol.name().to_string(),
                    path: path.clone(),
                    symbol: symbol.id.clone(),
                    width: symbol.width,
                    kind: symbol.kind,
                    ident,
                },
            );
        }
        log::debug!("built hierarchy with {} signals", signals.len());
        Ok(Hierarchy { root, signals })
    }

    pub fn root(&self) -> &ScopeNode {
        &self.root
    }

    /// Leaves in symbol table order.
    pub fn signals(&self) -> Values<'_, String, Signal> {
        self.signals.values()
    }

    pub fn lookup(&self, symbol: &str) -> Option<SignalId> {
        self.signals.get_index_of(symbol).map(SignalId)
    }

    /// Symbol to signal mapping, for consumers outside this crate.
    pub fn signal_map(&self) -> HashMap<String, Signal> {
        self.signals
            .iter()
            .map(|(symbol, s)| (symbol.clone(), s.clone()))
            .collect()
    }

    /// Indented outline of the tree, one node per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_scope(&self.root, 0, &mut out);
        out
    }

    fn render_scope(&self, scope: &ScopeNode, level: usize, out: &mut String) {
        let indent = "    ".repeat(level);
        for child in scope.children() {
            match child {
                Node::Scope(s) => {
                    out.push_str(&format!("{}.{}\n", indent, s.name));
                    self.render_scope(s, level + 1, out);
                }
                Node::Signal(id) => {
                    let signal = &self[*id];
                    out.push_str(&format!(
                        "{}.{} = Signal({})\n",
                        indent, signal.name, signal.width
                    ));
                }
            }
        }
    }
}

impl Index<SignalId> for Hierarchy {
    type Output = Signal;

    fn index(&self, id: SignalId) -> &Signal {
        &self.signals[id.0]
    }
}

/// Joins the sanitized path segments with `_`.
fn flat_identifier(path: &[String]) -> String {
    let ident = path
        .iter()
        .map(|segment| {
            segment
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("_");
    match ident.chars().next() {
        Some(c) if (c.is_ascii_alphabetic() || c == '_') && !is_reserved(&ident) => ident,
        _ => format!("s_{}", ident),
    }
}

/// Verilog, SystemVerilog and C++ keywords.
const RESERVED: &[&str] = &[
    // Verilog
    "always", "and", "assign", "automatic", "begin", "buf", "bufif0", "bufif1", "case", "casex",
    "casez", "cell", "cmos", "config", "deassign", "default", "defparam", "design", "disable",
    "edge", "else", "end", "endcase", "endconfig", "endfunction", "endgenerate", "endmodule",
    "endprimitive", "endspecify", "endtable", "endtask", "event", "for", "force", "forever",
    "fork", "function", "generate", "genvar", "highz0", "highz1", "if", "ifnone", "incdir",
    "include", "initial", "inout", "input", "instance", "integer", "join", "large", "liblist",
    "library", "localparam", "macromodule", "medium", "module", "nand", "negedge", "nmos", "nor",
    "noshowcancelled", "not", "notif0", "notif1", "or", "output", "parameter", "pmos", "posedge",
    "primitive", "pull0", "pull1", "pulldown", "pullup", "pulsestyle_ondetect",
    "pulsestyle_onevent", "rcmos", "real", "realtime", "reg", "release", "repeat", "rnmos",
    "rpmos", "rtran", "rtranif0", "rtranif1", "scalared", "showcancelled", "signed", "small",
    "specify", "specparam", "strong0", "strong1", "supply0", "supply1", "table", "task", "time",
    "tran", "tranif0", "tranif1", "tri", "tri0", "tri1", "triand", "trior", "trireg", "unsigned",
    "use", "uwire", "vectored", "wait", "wand", "weak0", "weak1", "while", "wire", "wor", "xnor",
    "xor",
    // SystemVerilog
    "bit", "byte", "interface", "logic", "longint", "package", "shortint", "string",
    // C++
    "alignas", "alignof", "and_eq", "asm", "auto", "bitand", "bitor", "bool", "break", "catch",
    "char", "char16_t", "char32_t", "char8_t", "class", "co_await", "co_return", "co_yield",
    "compl", "concept", "const", "const_cast", "consteval", "constexpr", "constinit", "continue",
    "decltype", "delete", "do", "double", "dynamic_cast", "enum", "explicit", "export", "extern",
    "false", "float", "friend", "goto", "inline", "int", "long", "mutable", "namespace", "new",
    "noexcept", "not_eq", "nullptr", "operator", "or_eq", "private", "protected", "public",
    "register", "reinterpret_cast", "requires", "return", "short", "sizeof", "static",
    "static_assert", "static_cast", "struct", "switch", "template", "this", "thread_local",
    "throw", "true", "try", "typedef", "typeid", "typename", "union", "virtual", "void",
    "volatile", "wchar_t", "xor_eq",
];

fn is_reserved(ident: &str) -> bool {
    RESERVED.contains(&ident)
}
