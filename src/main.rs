//! linedap - a mock Debug Adapter Protocol (DAP) server.
//!
//! Simulates "execution" of a plain text file, line by line: breakpoints
//! with verification and repositioning, forward and backward stepping, a
//! synthetic stack. Intended as a protocol playground and a test double for
//! DAP clients.

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};

use linedap::session::DebugSession;
use linedap::tracer::FileTracer;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on (default: 127.0.0.1:4711)
    #[clap(long, default_value = "127.0.0.1:4711")]
    listen: String,

    /// Exit after the first debug session ends (single-client mode).
    #[clap(long)]
    oneshot: bool,

    /// Serve a single session over stdin/stdout instead of TCP.
    #[clap(long)]
    stdio: bool,

    /// Optional log file for adapter diagnostics (no output to stdout).
    #[clap(long)]
    log_file: Option<std::path::PathBuf>,

    /// Trace DAP traffic (requests/responses/events) into the log file.
    /// Requires --log-file.
    #[clap(long)]
    trace_dap: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    let tracer = match &args.log_file {
        Some(path) => Some(FileTracer::new(path)?),
        None => None,
    };
    if args.trace_dap && tracer.is_none() {
        warn!(target: "dap", "--trace-dap requires --log-file; tracing disabled");
    }
    let traffic = if args.trace_dap { tracer.clone() } else { None };

    if args.stdio {
        info!(target: "dap", "serving DAP over stdio");
        let input = BufReader::new(io::stdin());
        return DebugSession::new(input, io::stdout(), traffic).run();
    }

    let addr: SocketAddr = args.listen.parse().context("Invalid listen address")?;
    let listener = TcpListener::bind(addr).with_context(|| format!("bind {addr}"))?;
    info!(target: "dap", "linedap listening on {addr}");

    // Server mode: accept multiple clients sequentially. One client == one
    // debug session.
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(v) => v,
            Err(err) => {
                warn!(target: "dap", "accept failed: {err:#}");
                continue;
            }
        };
        info!(target: "dap", "DAP client connected: {peer}");
        if let Some(t) = &tracer {
            t.line(&format!("client connected: {peer}"));
        }

        let res = serve_client(stream, traffic.clone());
        if let Err(err) = res {
            warn!(target: "dap", "session ended with error: {err:#}");
            if let Some(t) = &tracer {
                t.line(&format!("session error: {err:#}"));
            }
        } else if let Some(t) = &tracer {
            t.line("session finished OK");
        }

        if args.oneshot {
            break;
        }
    }
    Ok(())
}

fn serve_client(stream: TcpStream, tracer: Option<FileTracer>) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    let reader = BufReader::new(stream.try_clone()?);
    DebugSession::new(reader, stream, tracer).run()
}
