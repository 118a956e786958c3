pub mod convert;
pub mod error;
pub mod hierarchy;
mod logica;
pub mod stream;
pub mod types;
pub mod vcd;
pub mod verilator;
pub mod verilog;

pub use error::{ErrorKind, Result, VcdError};
pub use hierarchy::{Hierarchy, Signal, SignalId};
pub use stream::{replay, Change, ChangeStream, SignalLookup, StimulusDriver};
pub use vcd::{Document, FileFormat, ParserOptions, VcdParser};
