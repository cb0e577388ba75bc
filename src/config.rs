//! Command-line configuration. Grounded on
//! `ivanbgd-redis-server-rust/src/cli.rs`'s `clap`-derive shape.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "tinykeep", about = "A small Redis-compatible key-value server")]
pub struct Cli {
    /// TCP port to listen on.
    #[arg(long, default_value_t = 6379)]
    pub port: u16,

    /// Number of tokio runtime worker threads.
    #[arg(long, default_value_t = num_cpus())]
    pub workers: usize,

    /// Snapshot file path, named `dump.rdb` for familiarity though the
    /// format is RESP, not the Redis RDB format.
    #[arg(long, default_value = "dump.rdb")]
    pub snapshot_path: PathBuf,

    /// Use `--snapshot-path` verbatim instead of resolving it against the
    /// current working directory.
    #[arg(long)]
    pub snapshot_path_is_absolute: bool,

    /// Run LOAD against the snapshot path before the listener binds.
    #[arg(long)]
    pub reload: bool,
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
