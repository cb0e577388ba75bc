//! The command dispatcher: translates parsed RESP arrays into keyspace
//! operations via [`Keyspace::map`]/[`Keyspace::mutate`].

use std::sync::Arc;

use bytes::Bytes;

use crate::error::EngineError;
use crate::keyspace::Keyspace;
use crate::list::ConcurrentList;
use crate::persistence::{self, PersistenceConfig};
use crate::value::Value;

pub struct Engine {
    keyspace: Keyspace,
    persistence: PersistenceConfig,
}

impl Engine {
    /// Builds an engine with an empty keyspace, optionally reloading a
    /// prior snapshot first. A parse or dispatch error while reloading is
    /// fatal to construction.
    pub fn new(persistence: PersistenceConfig, reload: bool) -> Result<Self, EngineError> {
        let engine = Engine {
            keyspace: Keyspace::new(),
            persistence,
        };
        if reload {
            persistence::load(&engine.persistence, &engine.keyspace)?;
        }
        Ok(engine)
    }

    /// Dispatches a single parsed request. The input must be an array whose
    /// first element is the command name; anything else is
    /// `UnsupportedCommand`.
    pub fn process(&self, request: Value) -> Result<Value, EngineError> {
        let Value::Array(args) = request else {
            return Err(EngineError::UnsupportedCommand);
        };
        let Some(Value::Str(name)) = args.first() else {
            return Err(EngineError::UnsupportedCommand);
        };
        let command = String::from_utf8_lossy(name).to_ascii_uppercase();
        let args = &args[1..];

        match command.as_str() {
            "COMMAND" => self.command(args),
            "PING" => Ok(Value::str("PONG")),
            "ECHO" => Self::echo(args),
            "GET" => self.get(args),
            "SET" => self.set(args),
            "DEL" => self.del(args),
            "EXISTS" => self.exists(args),
            "INCR" => self.incr(args),
            "DECR" => self.decr(args),
            "RPUSH" => self.rpush(args),
            "LPUSH" => self.lpush(args),
            "SAVE" => self.save(),
            _ => Err(EngineError::UnsupportedCommand),
        }
    }

    fn command(&self, args: &[Value]) -> Result<Value, EngineError> {
        match args.first() {
            Some(Value::Str(sub)) if sub.eq_ignore_ascii_case(b"DOCS") => Ok(Value::Array(vec![])),
            _ => Err(EngineError::UnsupportedCommand),
        }
    }

    fn echo(args: &[Value]) -> Result<Value, EngineError> {
        match args {
            [v] => Ok(v.clone()),
            _ => Err(EngineError::UnsupportedType),
        }
    }

    fn get(&self, args: &[Value]) -> Result<Value, EngineError> {
        let [Value::Str(key)] = args else {
            return Err(EngineError::UnsupportedType);
        };
        let key = key_str(key)?;
        Ok(self
            .keyspace
            .get(&key)
            .map(|v| v.flatten())
            .unwrap_or(Value::Nil))
    }

    fn set(&self, args: &[Value]) -> Result<Value, EngineError> {
        let [Value::Str(key), value] = args else {
            return Err(EngineError::UnsupportedType);
        };
        let key = key_str(key)?;
        self.keyspace.set(&key, materialize_for_storage(value)?);
        Ok(Value::str("OK"))
    }

    fn del(&self, args: &[Value]) -> Result<Value, EngineError> {
        if args.is_empty() {
            return Err(EngineError::UnsupportedType);
        }
        for arg in args {
            let Value::Str(key) = arg else {
                return Err(EngineError::UnsupportedType);
            };
            self.keyspace.delete(&key_str(key)?);
        }
        if args.len() == 1 {
            Ok(Value::str("OK"))
        } else {
            Ok(Value::Int(args.len() as i64))
        }
    }

    fn exists(&self, args: &[Value]) -> Result<Value, EngineError> {
        if args.is_empty() {
            return Err(EngineError::UnsupportedType);
        }
        let mut count = 0i64;
        for arg in args {
            let Value::Str(key) = arg else {
                return Err(EngineError::UnsupportedType);
            };
            if self.keyspace.has(&key_str(key)?) {
                count += 1;
            }
        }
        Ok(Value::Int(count))
    }

    fn incr(&self, args: &[Value]) -> Result<Value, EngineError> {
        self.step(args, 1)
    }

    fn decr(&self, args: &[Value]) -> Result<Value, EngineError> {
        self.step(args, -1)
    }

    /// Shared INCR/DECR coercion: nil seeds at `delta`; an existing integer
    /// or parseable decimal string is adjusted by `delta`; anything else is
    /// `UnsupportedType`. Runs inside the entry's exclusive lock via
    /// `Keyspace::map`, so interleaved INCR/DECR on one key are
    /// linearizable. DECR uses this same coercion with `delta = -1` rather
    /// than a separate decrement-only code path.
    fn step(&self, args: &[Value], delta: i64) -> Result<Value, EngineError> {
        let [Value::Str(key)] = args else {
            return Err(EngineError::UnsupportedType);
        };
        let key = key_str(key)?;
        self.keyspace.map(&key, |current| {
            let next = match current {
                None => delta,
                Some(Value::Int(n)) => n.checked_add(delta).ok_or(EngineError::UnsupportedType)?,
                Some(Value::Str(s)) => {
                    let parsed: i64 = std::str::from_utf8(s)
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .ok_or(EngineError::UnsupportedType)?;
                    parsed.checked_add(delta).ok_or(EngineError::UnsupportedType)?
                }
                Some(_) => return Err(EngineError::UnsupportedType),
            };
            Ok(Value::Int(next))
        })?;
        Ok(Value::str("OK"))
    }

    fn rpush(&self, args: &[Value]) -> Result<Value, EngineError> {
        self.push(args, |list, value| list.push_right(value))
    }

    fn lpush(&self, args: &[Value]) -> Result<Value, EngineError> {
        self.push(args, |list, value| list.push_left(value))
    }

    /// Shared RPUSH/LPUSH implementation: auto-creates a list on first
    /// write, otherwise requires the stored value already be a list; each
    /// value is applied in argument order and the reply is the length
    /// observed after the last push.
    fn push(
        &self,
        args: &[Value],
        apply: impl Fn(&ConcurrentList, Bytes) -> usize,
    ) -> Result<Value, EngineError> {
        let [Value::Str(key), values @ ..] = args else {
            return Err(EngineError::UnsupportedType);
        };
        if values.is_empty() {
            return Err(EngineError::UnsupportedType);
        }
        let key = key_str(key)?;

        let mut last_len = 0usize;
        for value in values {
            let Value::Str(bytes) = value else {
                return Err(EngineError::UnsupportedType);
            };
            let bytes = bytes.clone();
            let result = self.keyspace.mutate(
                &key,
                || Value::List(Arc::new(ConcurrentList::new())),
                |stored| match stored {
                    Value::List(list) => Ok(Value::Int(apply(&**list, bytes.clone()) as i64)),
                    _ => Err(EngineError::UnsupportedType),
                },
            )?;
            let Value::Int(n) = result else {
                unreachable!("push mapper always returns Value::Int")
            };
            last_len = n as usize;
        }
        Ok(Value::Int(last_len as i64))
    }

    fn save(&self) -> Result<Value, EngineError> {
        persistence::save(&self.persistence, &self.keyspace)?;
        Ok(Value::str("OK"))
    }

    #[cfg(test)]
    pub(crate) fn keyspace_for_test(&self) -> &Keyspace {
        &self.keyspace
    }
}

fn key_str(key: &Bytes) -> Result<String, EngineError> {
    std::str::from_utf8(key)
        .map(str::to_string)
        .map_err(|_| EngineError::UnsupportedType)
}

/// The inverse of list-as-array wire serialization: an array payload is
/// materialized into a newly-owned list; scalars are stored as-is. Shared
/// by SET and by snapshot reload, so a list saved to a snapshot is still a
/// pushable list after LOAD.
pub(crate) fn materialize_for_storage(value: &Value) -> Result<Value, EngineError> {
    match value {
        Value::Array(items) => {
            let elements = items
                .iter()
                .map(|v| match v {
                    Value::Str(s) => Ok(s.clone()),
                    _ => Err(EngineError::UnsupportedType),
                })
                .collect::<Result<Vec<Bytes>, EngineError>>()?;
            Ok(Value::List(Arc::new(ConcurrentList::from_values(elements))))
        }
        other => Ok(other.clone()),
    }
}
