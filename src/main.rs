//! qdap - Debug Adapter Protocol server for quantum programs.
//!
//! Listens on TCP, serves exactly one client and exits when it disconnects.

use clap::Parser;
use quantum_dap::dap::args::Args;
use quantum_dap::dap::server;
use quantum_dap::engine::sim::QasmSimulation;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();
    server::serve(&args, Box::new(QasmSimulation::new()))
}
