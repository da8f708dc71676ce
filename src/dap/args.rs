use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[clap(long, env = "QDAP_LISTEN", default_value = "127.0.0.1:4711")]
    pub listen: String,

    /// Optional file for DAP traffic traces (nothing is written to stdout).
    #[clap(long, env = "QDAP_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Trace DAP traffic (requests/responses/events) into the log file.
    /// Requires --log-file.
    #[clap(long, env = "QDAP_TRACE_DAP")]
    pub trace_dap: bool,

    /// Give up on a silent client after this many milliseconds (0 waits forever).
    #[clap(long, env = "QDAP_READ_TIMEOUT_MS", default_value_t = 0)]
    pub read_timeout_ms: u64,
}

impl Args {
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}
