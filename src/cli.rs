use clap::{Parser, Subcommand};

/// Shared storage pool with capacity-triggered cleanup
#[derive(Parser, Debug)]
#[command(name = "poolwarden")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (TOML); environment overrides use the POOLWARDEN_ prefix
    #[arg(short, long, global = true, env = "POOLWARDEN_CONFIG")]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the coordinator, capacity monitor and HTTP/WebSocket gateway
    Serve {
        /// Listen address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one cleaner worker against a running gateway
    Cleaner {
        /// Gateway WebSocket URL
        #[arg(long, default_value = "ws://127.0.0.1:5000/ws")]
        url: String,
    },

    /// Run one producer/consumer client against a running gateway
    Client {
        /// Gateway WebSocket URL
        #[arg(long, default_value = "ws://127.0.0.1:5000/ws")]
        url: String,
    },

    /// Run the pool and a set of workers in-process, then print the final state
    Simulate {
        #[arg(long, default_value_t = 2)]
        cleaners: usize,

        #[arg(long, default_value_t = 5)]
        clients: usize,

        /// How long to run before stopping
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
}
