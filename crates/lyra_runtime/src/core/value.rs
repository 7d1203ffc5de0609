//! Runtime value representation.
//!
//! One closed enum covers every value kind the language can produce.
//! Values never contain variable handles directly; only opaque and
//! function handles may capture them, which is the sole way reference
//! cycles can form.

use std::fmt;
use std::rc::Rc;

use ahash::RandomState;
use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;

use crate::core::collector::{Collector, VarId};
use crate::core::reference::Reference;
use crate::errors::RuntimeError;

pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;
pub type FastHashSet<K> = HashSet<K, RandomState>;

pub fn fast_hasher() -> RandomState {
    RandomState::with_seeds(0, 0, 0, 0)
}

pub fn fast_map_new<K: Eq + std::hash::Hash, V>() -> FastHashMap<K, V> {
    HashMap::with_hasher(fast_hasher())
}

pub fn fast_set_new<K: Eq + std::hash::Hash>() -> FastHashSet<K> {
    HashSet::with_hasher(fast_hasher())
}

/// Ordered sequence of values.
pub type Array = Vec<Value>;

/// Mapping from text keys to values. Keys are unique; insertion order is
/// preserved for iteration but carries no meaning for comparison.
pub type Object = IndexMap<String, Value>;

/// An external handle stored inside a value. The host names it and may
/// capture collector-managed variables.
pub trait Opaque {
    fn describe(&self) -> String;

    fn enumerate_variables(&self, _visit: &mut dyn FnMut(VarId)) {}
}

/// A callable handle. Invocation receives the receiver-prepended argument
/// references and may return a pending tail call for the trampoline to
/// resolve.
pub trait Callable {
    fn describe(&self) -> String;

    fn invoke(
        &self,
        heap: &mut Collector,
        args: Vec<Reference>,
    ) -> Result<Reference, RuntimeError>;

    fn enumerate_variables(&self, _visit: &mut dyn FnMut(VarId)) {}
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(Rc<str>),
    Opaque(Rc<dyn Opaque>),
    Function(Rc<dyn Callable>),
    Array(Array),
    Object(Object),
}

/// Result of a three-way value comparison. Values of distinct non-null
/// types, and values with no defined ordering, compare as `Unordered`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compare {
    Unordered,
    Less,
    Equal,
    Greater,
}

fn compare_total<T: Ord>(lhs: T, rhs: T) -> Compare {
    match lhs.cmp(&rhs) {
        std::cmp::Ordering::Less => Compare::Less,
        std::cmp::Ordering::Equal => Compare::Equal,
        std::cmp::Ordering::Greater => Compare::Greater,
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "string",
            Value::Opaque(_) => "opaque",
            Value::Function(_) => "function",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Language truthiness.
    pub fn test(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Real(r) => *r != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Opaque(_) | Value::Function(_) => true,
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    /// Three-way comparison. `null` equals `null` and is less than any
    /// other value; reals involving NaN, opaque handles, function handles
    /// and objects are unordered even against themselves; arrays compare
    /// lexicographically by element and then by length.
    pub fn compare(&self, other: &Value) -> Compare {
        match (self, other) {
            (Value::Null, Value::Null) => Compare::Equal,
            (Value::Null, _) => Compare::Less,
            (_, Value::Null) => Compare::Greater,
            (Value::Bool(a), Value::Bool(b)) => compare_total(*a, *b),
            (Value::Int(a), Value::Int(b)) => compare_total(*a, *b),
            (Value::Real(a), Value::Real(b)) => match a.partial_cmp(b) {
                None => Compare::Unordered,
                Some(std::cmp::Ordering::Less) => Compare::Less,
                Some(std::cmp::Ordering::Equal) => Compare::Equal,
                Some(std::cmp::Ordering::Greater) => Compare::Greater,
            },
            (Value::Text(a), Value::Text(b)) => compare_total(a.as_bytes(), b.as_bytes()),
            (Value::Opaque(_), Value::Opaque(_)) => Compare::Unordered,
            (Value::Function(_), Value::Function(_)) => Compare::Unordered,
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let res = x.compare(y);
                    if res != Compare::Equal {
                        return res;
                    }
                }
                compare_total(a.len(), b.len())
            }
            (Value::Object(_), Value::Object(_)) => Compare::Unordered,
            _ => Compare::Unordered,
        }
    }

    /// Visits every variable handle reachable from this value, recursing
    /// through arrays, objects, and captured handles.
    pub fn enumerate_variables(&self, visit: &mut dyn FnMut(VarId)) {
        match self {
            Value::Array(a) => {
                for item in a {
                    item.enumerate_variables(visit);
                }
            }
            Value::Object(o) => {
                for item in o.values() {
                    item.enumerate_variables(visit);
                }
            }
            Value::Opaque(h) => h.enumerate_variables(visit),
            Value::Function(h) => h.enumerate_variables(visit),
            _ => {}
        }
    }

    /// Writes the indented diagnostic dump of this value.
    pub fn dump(&self, out: &mut dyn fmt::Write, indent: usize, step: usize) -> fmt::Result {
        match self {
            Value::Null => out.write_str("null"),
            Value::Bool(b) => write!(out, "boolean {}", b),
            Value::Int(i) => {
                let mut buf = itoa::Buffer::new();
                write!(out, "integer {}", buf.format(*i))
            }
            Value::Real(r) => {
                let mut buf = ryu::Buffer::new();
                write!(out, "real {}", buf.format(*r))
            }
            Value::Text(s) => {
                let mut buf = itoa::Buffer::new();
                write!(out, "string({}) ", buf.format(s.len()))?;
                write_quoted(out, s)
            }
            Value::Opaque(h) => {
                out.write_str("opaque ")?;
                write_quoted(out, &h.describe())
            }
            Value::Function(h) => {
                out.write_str("function ")?;
                write_quoted(out, &h.describe())
            }
            Value::Array(a) => {
                let mut buf = itoa::Buffer::new();
                write!(out, "array({}) [", buf.format(a.len()))?;
                for (i, item) in a.iter().enumerate() {
                    write!(out, "\n{:1$}", "", indent + step)?;
                    write!(out, "{} = ", buf.format(i))?;
                    item.dump(out, indent + step, step)?;
                    out.write_char(',')?;
                }
                write!(out, "\n{:1$}]", "", indent)
            }
            Value::Object(o) => {
                let mut buf = itoa::Buffer::new();
                write!(out, "object({}) {{", buf.format(o.len()))?;
                for (key, item) in o.iter() {
                    write!(out, "\n{:1$}", "", indent + step)?;
                    write_quoted(out, key)?;
                    out.write_str(" = ")?;
                    item.dump(out, indent + step, step)?;
                    out.write_char(',')?;
                }
                write!(out, "\n{:1$}}}", "", indent)
            }
        }
    }
}

/// Writes `text` double-quoted, escaping control and non-ASCII bytes.
fn write_quoted(out: &mut dyn fmt::Write, text: &str) -> fmt::Result {
    out.write_char('"')?;
    for byte in text.bytes() {
        match byte {
            b'"' => out.write_str("\\\"")?,
            b'\\' => out.write_str("\\\\")?,
            b'\n' => out.write_str("\\n")?,
            b'\r' => out.write_str("\\r")?,
            b'\t' => out.write_str("\\t")?,
            0x20..=0x7E => out.write_char(byte as char)?,
            _ => write!(out, "\\x{:02X}", byte)?,
        }
    }
    out.write_char('"')
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.dump(f, 0, 2)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.dump(f, 0, 2)
    }
}
