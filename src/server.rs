//! The accept loop and per-connection handler.
//!
//! One task per connection, reading and writing through a framed codec and
//! dispatching every decoded request through [`Engine::process`]. The accept
//! loop itself runs forever; `main` races it against the shutdown signal and
//! drops it on cancellation.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Decoder;

use crate::codec::RespCodec;
use crate::engine::Engine;
use crate::value::Value;

/// Accepts connections forever, spawning one task per connection so a slow
/// or hostile client never blocks the others. Never returns on its own;
/// callers race it against a shutdown signal.
pub async fn serve(listener: TcpListener, engine: Arc<Engine>) -> ! {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                log::info!("accepted connection from {addr}");
                let engine = Arc::clone(&engine);
                tokio::spawn(handle_connection(stream, engine));
            }
            Err(e) => log::warn!("error accepting connection: {e}"),
        }
    }
}

/// The per-connection read-dispatch-write loop. Neither the codec nor
/// `Engine::process` ever themselves `.await`; only the socket I/O and the
/// surrounding task boundary are async.
async fn handle_connection(stream: TcpStream, engine: Arc<Engine>) {
    let mut transport = RespCodec.framed(stream);

    while let Some(decoded) = transport.next().await {
        let reply = match decoded {
            Ok(request) => match engine.process(request) {
                Ok(value) => value,
                Err(e) => {
                    log::debug!("command error: {e}");
                    Value::err(format!("ERR {e}"))
                }
            },
            Err(e) => {
                log::warn!("malformed request: {e}");
                Value::err(format!("ERR {e}"))
            }
        };
        if let Err(e) = transport.send(reply).await {
            log::warn!("error writing reply: {e}");
            break;
        }
    }
}
