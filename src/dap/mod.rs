//! Debug Adapter Protocol front-end for the simulation engine.

pub mod args;
pub mod diagnostics;
pub mod message;
pub mod position;
pub mod protocol;
pub mod server;
pub mod session;
pub mod state;
pub mod tracer;
pub mod transport;
