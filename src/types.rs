use nom::{
    character::complete::{alpha1, digit1, multispace0},
    combinator::{all_consuming, map_res},
    error::ErrorKind,
    sequence::{delimited, tuple},
    IResult,
};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::VcdError;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub enum VariableKind {
    Event,
    Integer,
    Parameter,
    Real,
    Reg,
    Supply0,
    Supply1,
    Time,
    Tri,
    Triand,
    Trior,
    Trireg,
    Tri0,
    Tri1,
    Wand,
    Wire,
    Wor,
    Logic,
    Other,
}

impl From<&str> for VariableKind {
    fn from(name: &str) -> Self {
        match name {
            "event" => VariableKind::Event,
            "integer" => VariableKind::Integer,
            "parameter" => VariableKind::Parameter,
            "real" => VariableKind::Real,
            "reg" => VariableKind::Reg,
            "supply0" => VariableKind::Supply0,
            "supply1" => VariableKind::Supply1,
            "time" => VariableKind::Time,
            "tri" => VariableKind::Tri,
            "triand" => VariableKind::Triand,
            "trior" => VariableKind::Trior,
            "trireg" => VariableKind::Trireg,
            "tri0" => VariableKind::Tri0,
            "tri1" => VariableKind::Tri1,
            "wand" => VariableKind::Wand,
            "wire" => VariableKind::Wire,
            "wor" => VariableKind::Wor,
            "logic" => VariableKind::Logic,
            _ => VariableKind::Other,
        }
    }
}

/// A four-state logic level as recorded in a VCD.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
pub enum Logic {
    Zero,
    One,
    X,
    Z,
}

impl Logic {
    pub fn from_char(c: char) -> Option<Logic> {
        match c {
            '0' => Some(Logic::Zero),
            '1' => Some(Logic::One),
            'x' | 'X' => Some(Logic::X),
            'z' | 'Z' => Some(Logic::Z),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Logic::Zero => '0',
            Logic::One => '1',
            Logic::X => 'x',
            Logic::Z => 'z',
        }
    }

    /// `true` for `0` and `1`, the only levels a two-state simulator knows.
    pub fn is_known(self) -> bool {
        matches!(self, Logic::Zero | Logic::One)
    }
}

/// Value carried by an assignment. Vector bits are stored MSB first.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub enum Value {
    Scalar(Logic),
    Vector(Vec<Logic>),
}

impl Value {
    pub fn parse_bits(bits: &str) -> Option<Value> {
        bits.chars()
            .map(Logic::from_char)
            .collect::<Option<Vec<_>>>()
            .map(Value::Vector)
    }

    pub fn bits(&self) -> &[Logic] {
        match self {
            Value::Scalar(l) => std::slice::from_ref(l),
            Value::Vector(v) => v,
        }
    }

    pub fn is_known(&self) -> bool {
        self.bits().iter().all(|l| l.is_known())
    }

    /// Returns the value with every `x`/`z` bit replaced by `with`.
    pub fn replace_unknown(&self, with: Logic) -> Value {
        let fix = |l: &Logic| if l.is_known() { *l } else { with };
        match self {
            Value::Scalar(l) => Value::Scalar(fix(l)),
            Value::Vector(v) => Value::Vector(v.iter().map(fix).collect()),
        }
    }

    /// Fits the value to `width` bits, MSB first.
    ///
    /// Shorter values are left-extended following the VCD rules: a leading
    /// `x` or `z` is repeated, anything else extends with `0`. Longer values
    /// keep their low bits.
    pub fn resize(&self, width: usize) -> Vec<Logic> {
        let bits = self.bits();
        if bits.len() >= width {
            return bits[bits.len() - width..].to_vec();
        }
        let fill = match bits.first() {
            Some(Logic::X) => Logic::X,
            Some(Logic::Z) => Logic::Z,
            _ => Logic::Zero,
        };
        let mut out = vec![fill; width - bits.len()];
        out.extend_from_slice(bits);
        out
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub enum TimeUnit {
    Fs,
    Ps,
    Ns,
    Us,
    Ms,
    S,
}

impl TimeUnit {
    fn seconds(self) -> f64 {
        match self {
            TimeUnit::Fs => 1e-15,
            TimeUnit::Ps => 1e-12,
            TimeUnit::Ns => 1e-9,
            TimeUnit::Us => 1e-6,
            TimeUnit::Ms => 1e-3,
            TimeUnit::S => 1.0,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Fs => "fs",
            TimeUnit::Ps => "ps",
            TimeUnit::Ns => "ns",
            TimeUnit::Us => "us",
            TimeUnit::Ms => "ms",
            TimeUnit::S => "s",
        }
    }
}

/// Duration of one VCD tick, e.g. `1ns` or `10 ps`.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct Timescale {
    pub magnitude: u32,
    pub unit: TimeUnit,
}

impl Timescale {
    pub fn seconds(&self) -> f64 {
        self.magnitude as f64 * self.unit.seconds()
    }
}

impl FromStr for Timescale {
    type Err = VcdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        type E<'a> = (&'a str, ErrorKind);
        let unit = |u: &str| match u {
            "fs" => Ok(TimeUnit::Fs),
            "ps" => Ok(TimeUnit::Ps),
            "ns" => Ok(TimeUnit::Ns),
            "us" => Ok(TimeUnit::Us),
            "ms" => Ok(TimeUnit::Ms),
            "s" => Ok(TimeUnit::S),
            _ => Err(()),
        };
        let parsed: IResult<&str, (u32, TimeUnit), E> = all_consuming(delimited(
            multispace0,
            tuple((
                map_res(digit1, u32::from_str),
                delimited(multispace0, map_res(alpha1, unit), multispace0),
            )),
            multispace0,
        ))(s);
        match parsed {
            Ok((_, (magnitude, unit))) if magnitude > 0 => Ok(Timescale { magnitude, unit }),
            _ => Err(VcdError::InvalidTimescale(s.to_string())),
        }
    }
}

impl fmt::Display for Timescale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit.suffix())
    }
}
