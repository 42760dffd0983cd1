//! Demo receiver: accepts one connection, drains it to stdout (or a file),
//! and closes once the peer's FIN arrives. Grounded in `original_source`'s
//! `receiver_app.py`.

use std::fs::File;
use std::io::{self, Write};
use std::time::Duration;

use clap::Parser;
use rdt::{Chunk, Connection, ConnectionConfig, Error};

/// Accept one rdt connection and write the received bytes out.
#[derive(Parser, Debug)]
struct Args {
    /// Address to bind the local UDP socket to.
    #[arg(long, default_value = "127.0.0.1:9001")]
    local: String,

    /// Path to write the received bytes to; writes stdout if omitted.
    #[arg(long)]
    out: Option<String>,

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

    let config = ConnectionConfig {
        drop_prob: args.drop_prob,
        corrupt_prob: args.corrupt_prob,
        ..ConnectionConfig::default()
    };

    tracing::info!(local = %args.local, "waiting for a connection");
    let mut conn = Connection::accept(&args.local, config)?;
    tracing::info!(remote = %conn.remote_addr(), "connection established");

    let mut sink: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(File::create(path).expect("failed to create output file")),
        None => Box::new(io::stdout()),
    };

    let mut total = 0usize;
    loop {
        match conn.receive(Duration::from_secs_f64(1.0))? {
            Chunk::Data(bytes) => {
                total += bytes.len();
                sink.write_all(&bytes).expect("failed to write received bytes");
                tracing::debug!(total, rwnd = conn.available_recv_window(), "received chunk");
            }
            Chunk::TimedOut => continue,
            Chunk::EndOfStream => break,
        }
    }

    tracing::info!(total, "peer closed, tearing down");
    conn.close()?;
    tracing::info!("connection closed");

    Ok(())
}
