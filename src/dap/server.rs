use crate::dap::args::Args;
use crate::dap::session::DebugSession;
use crate::dap::tracer::FileTracer;
use crate::dap::transport::DapIo;
use crate::engine::SimulationState;
use anyhow::Context;
use log::{info, warn};
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener};

/// Printed on stdout once the listener is bound, clients wait for it before connecting.
pub const READY_BANNER: &str = "Initialization complete";
/// Printed on stdout when another adapter already owns the port.
pub const ADDR_IN_USE_BANNER: &str = "Address already in use";

/// Bind, wait for a single client and serve it until it disconnects.
pub fn serve(args: &Args, engine: Box<dyn SimulationState>) -> anyhow::Result<()> {
    let addr: SocketAddr = args.listen.parse().context("Invalid listen address")?;
    let listener = match TcpListener::bind(addr) {
        Ok(listener) => listener,
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            println!("{ADDR_IN_USE_BANNER}");
            warn!(target: "dap", "{addr} is taken, another adapter is probably running");
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("bind {addr}")),
    };

    let tracer = match &args.log_file {
        Some(path) => Some(FileTracer::new(path)?),
        None => None,
    };
    if args.trace_dap && tracer.is_none() {
        warn!(target: "dap", "--trace-dap requires --log-file; tracing disabled");
    }

    println!("{READY_BANNER}");
    std::io::stdout().flush()?;
    info!(target: "dap", "listening on {addr}");

    let (stream, peer) = listener.accept().context("accept DAP client")?;
    info!(target: "dap", "DAP client connected: {peer}");
    if let Some(t) = &tracer {
        t.line(&format!("client connected: {peer}"));
    }

    let io = DapIo::from_tcp(stream, args.read_timeout(), tracer.clone(), args.trace_dap)?;
    let res = DebugSession::new(io, engine).run();
    match &res {
        Err(err) => {
            warn!(target: "dap", "session ended with error: {err:#}");
            if let Some(t) = &tracer {
                t.line(&format!("session error: {err:#}"));
            }
        }
        Ok(()) => {
            if let Some(t) = &tracer {
                t.line("session finished OK");
            }
        }
    }
    res
}
