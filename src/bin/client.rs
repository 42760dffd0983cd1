//! Demo sender: connects, streams a file (or stdin) to the server, then
//! closes. Grounded in `original_source`'s `sender_app.py`, generalized
//! to use the full reliable-delivery API instead of a raw fire-and-forget
//! loop.

use std::fs;
use std::io::{self, Read};
use std::net::SocketAddr;

use clap::Parser;
use rdt::{Connection, ConnectionConfig, Error};

/// Send a file (or stdin) to an rdt server.
#[derive(Parser, Debug)]
struct Args {
    /// Address to bind the local UDP socket to.
    #[arg(long, default_value = "127.0.0.1:0")]
    local: String,

    /// Server address to connect to.
    #[arg(long, default_value = "127.0.0.1:9001")]
    remote: SocketAddr,

    /// Path to the file to send; reads stdin if omitted.
    #[arg(long)]
    file: Option<String>,

    /// Simulated datagram drop probability, in [0, 1].
    #[arg(long, default_value_t = 0.0)]
    drop_prob: f64,

    /// Simulated datagram corruption probability, in [0, 1].
    #[arg(long, default_value_t = 0.0)]
    corrupt_prob: f64,
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let payload = match &args.file {
        Some(path) => fs::read(path).expect("failed to read input file"),
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).expect("failed to read stdin");
            buf
        }
    };

    let config = ConnectionConfig {
        drop_prob: args.drop_prob,
        corrupt_prob: args.corrupt_prob,
        ..ConnectionConfig::default()
    };

    tracing::info!(remote = %args.remote, "connecting");
    let mut conn = Connection::connect(&args.local, args.remote, config)?;
    tracing::info!(remote = %conn.remote_addr(), "connected");

    for chunk in payload.chunks(4096) {
        conn.send(chunk)?;
    }
    tracing::info!(bytes = payload.len(), "all data sent");

    conn.close()?;
    tracing::info!("connection closed");

    Ok(())
}
