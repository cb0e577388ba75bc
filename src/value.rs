use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::list::ConcurrentList;

/// The polymorphic value stored in the keyspace and carried over the wire.
///
/// `List` is a shared handle rather than an owned `Vec` because two commands
/// on the same key may operate on the same underlying list concurrently;
/// cloning on read would silently break push semantics.
#[derive(Clone)]
pub enum Value {
    Nil,
    Int(i64),
    Str(Bytes),
    Err(Bytes),
    Array(Vec<Value>),
    List(Arc<ConcurrentList>),
}

impl Value {
    pub fn str(s: impl Into<Bytes>) -> Self {
        Value::Str(s.into())
    }

    pub fn err(msg: impl Into<Bytes>) -> Self {
        Value::Err(msg.into())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Materializes a list handle into an `Array` of its current elements,
    /// for wire serialization and snapshot encoding.
    pub fn flatten(&self) -> Value {
        match self {
            Value::List(list) => Value::Array(
                list.snapshot()
                    .into_iter()
                    .map(Value::Str)
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Str(s) => write!(f, "Str({:?})", String::from_utf8_lossy(s)),
            Value::Err(e) => write!(f, "Err({:?})", String::from_utf8_lossy(e)),
            Value::Array(a) => f.debug_list().entries(a.iter()).finish(),
            Value::List(l) => write!(f, "List(len={})", l.len()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Err(a), Value::Err(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || a.snapshot() == b.snapshot(),
            _ => false,
        }
    }
}
