//! SAVE/LOAD: a snapshot format that concatenates RESP-encoded
//! `["SET", key, value]` arrays with no extra framing. Not the binary
//! Redis RDB format, despite the conventional filename.

use std::path::{Path, PathBuf};

use crate::codec;
use crate::error::EngineError;
use crate::keyspace::Keyspace;
use crate::value::Value;

pub struct PersistenceConfig {
    path: Option<PathBuf>,
}

impl PersistenceConfig {
    /// `path` is resolved relative to the current working directory unless
    /// `is_absolute` is set.
    pub fn new(path: PathBuf, is_absolute: bool) -> std::io::Result<Self> {
        let path = if is_absolute {
            path
        } else {
            std::env::current_dir()?.join(path)
        };
        Ok(PersistenceConfig { path: Some(path) })
    }

    /// No snapshot file configured; SAVE/LOAD are no-ops. Used by tests that
    /// don't exercise persistence.
    pub fn disabled() -> Self {
        PersistenceConfig { path: None }
    }
}

/// Writes every key in `keyspace` to the configured snapshot path as a
/// sequence of `SET` arrays, via a temp-file-then-rename so a crash mid-write
/// never corrupts a prior snapshot.
pub fn save(config: &PersistenceConfig, keyspace: &Keyspace) -> Result<(), EngineError> {
    let Some(path) = &config.path else {
        return Ok(());
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let mut buf = Vec::new();
    for (key, value) in keyspace.iter() {
        let entry = Value::Array(vec![Value::str("SET"), Value::str(key), value.flatten()]);
        buf.extend_from_slice(&codec::serialize(&entry)?);
    }

    let tmp_path = temp_path(path);
    std::fs::write(&tmp_path, &buf)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Replays a snapshot, if present, into `keyspace` by feeding every parsed
/// `SET` request straight at it (bypassing full command dispatch, since at
/// construction time no `Engine` yet exists to dispatch through). A missing
/// file is not an error; a parse or malformed-entry error is fatal.
pub fn load(config: &PersistenceConfig, keyspace: &Keyspace) -> Result<(), EngineError> {
    let Some(path) = &config.path else {
        return Ok(());
    };
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for request in codec::parse_all(&bytes)? {
        replay_set(keyspace, request)?;
    }
    Ok(())
}

fn replay_set(keyspace: &Keyspace, request: Value) -> Result<(), EngineError> {
    let Value::Array(args) = request else {
        return Err(EngineError::UnsupportedCommand);
    };
    let [Value::Str(_set), Value::Str(key), value] = args.as_slice() else {
        return Err(EngineError::UnsupportedCommand);
    };
    let key = std::str::from_utf8(key).map_err(|_| EngineError::UnsupportedType)?;
    keyspace.set(key, crate::engine::materialize_for_storage(value)?);
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("tinykeep-test-{:?}", std::thread::current().id()))
    }

    #[test]
    fn save_then_reload_roundtrips_keys() {
        let dir = temp_dir();
        let path = dir.join("snapshot.resp");
        let config = PersistenceConfig::new(path, true).unwrap();

        let engine = Engine::new(PersistenceConfig::disabled(), false).unwrap();
        let set = |k: &str, v: &str| {
            engine
                .process(Value::Array(vec![
                    Value::str("SET"),
                    Value::str(k),
                    Value::str(v),
                ]))
                .unwrap();
        };
        set("a", "1");
        set("b", "2");
        save(&config, keyspace_of(&engine)).unwrap();

        let reloaded = Engine::new(config, true).unwrap();
        let get = |k: &str| {
            reloaded
                .process(Value::Array(vec![Value::str("GET"), Value::str(k)]))
                .unwrap()
        };
        assert_eq!(get("a"), Value::str("1"));
        assert_eq!(get("b"), Value::str("2"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn load_of_missing_file_is_not_an_error() {
        let path = temp_dir().join("does-not-exist.resp");
        let config = PersistenceConfig::new(path, true).unwrap();
        let engine = Engine::new(config, true);
        assert!(engine.is_ok());
    }

    #[test]
    fn save_round_trips_a_list() {
        let dir = temp_dir();
        let path = dir.join("list-snapshot.resp");
        let config = PersistenceConfig::new(path, true).unwrap();

        let engine = Engine::new(PersistenceConfig::disabled(), false).unwrap();
        engine
            .process(Value::Array(vec![
                Value::str("RPUSH"),
                Value::str("l"),
                Value::str("x"),
                Value::str("y"),
            ]))
            .unwrap();
        save(&config, keyspace_of(&engine)).unwrap();

        let reloaded = Engine::new(config, true).unwrap();
        assert_eq!(
            reloaded
                .process(Value::Array(vec![Value::str("GET"), Value::str("l")]))
                .unwrap(),
            Value::Array(vec![Value::str("x"), Value::str("y")])
        );

        let _ = std::fs::remove_dir_all(dir);
    }

    fn keyspace_of(engine: &Engine) -> &Keyspace {
        engine.keyspace_for_test()
    }
}
