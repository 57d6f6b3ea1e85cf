//! Echo server built on iosock.
//!
//! # Usage
//!
//! ```bash
//! iosock-echo --port 7000
//! iosock-echo --address ::1 --port 7000 --events --log-level debug
//! ```

use clap::Parser;
use iosock::{Server, ServerEvent};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Echoes every byte received back to its sender
#[derive(Parser, Debug)]
#[command(name = "iosock-echo")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1")]
    address: String,

    /// Port to bind to, 0 picks a free one
    #[arg(short, long, default_value = "7000")]
    port: u16,

    /// Listen backlog
    #[arg(long, default_value_t = iosock::DEFAULT_BACKLOG)]
    backlog: i32,

    /// Log connect and disconnect events
    #[arg(long)]
    events: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let server = Server::builder()
        .bind(args.address, args.port)
        .backlog(args.backlog)
        .lifecycle_events(args.events)
        .build();

    server.start_with_config()?;

    if let Some(address) = server.local_addr() {
        tracing::info!("echo server listening on {}", address);
    }

    while let Some(event) = server.next_event() {
        let handle = event.handle();

        match event {
            ServerEvent::Data(message) => server.send(handle, message.payload),
            ServerEvent::Connected { peer, .. } => {
                tracing::info!(%handle, ?peer, "client connected");
            }
            ServerEvent::Closed { .. } => {
                tracing::info!(%handle, "client disconnected");
            }
        }
    }

    server.stop()?;

    Ok(())
}
