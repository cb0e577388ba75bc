pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod keyspace;
pub mod list;
pub mod persistence;
pub mod server;
pub mod value;

pub use codec::RespCodec;
pub use engine::Engine;
pub use error::{CodecError, EngineError};
pub use keyspace::Keyspace;
pub use list::ConcurrentList;
pub use value::Value;
