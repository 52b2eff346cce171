// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "grov", about = "Intercepting memory-injection proxy for coding-agent LLM traffic")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the proxy.
    Start {
        /// Path to an explicit config file, merged over the discovered layers.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// Raise the log level to debug.
        #[arg(long)]
        debug: bool,
    },
    /// Print the fully merged configuration and exit.
    ShowConfig {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}
