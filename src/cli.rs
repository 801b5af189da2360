use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "onair")]
#[command(author, version, about = "Broadcast rundown playout controller")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import a studio and rundown from a JSON fixture
    Import {
        /// Fixture file
        #[arg(required = true)]
        fixture: PathBuf,
    },

    /// Show a rundown with its parts and ad-libs
    Show {
        rundown: String,
    },

    /// Activate a rundown
    Activate {
        rundown: String,

        /// Activate in rehearsal mode
        #[arg(long)]
        rehearsal: bool,
    },

    /// Deactivate a rundown
    Deactivate {
        rundown: String,
    },

    /// Reset a rundown to its pre-show state
    Reset {
        rundown: String,
    },

    /// Take the next part on air
    Take {
        rundown: String,
    },

    /// Set (or clear) the next part
    SetNext {
        rundown: String,

        /// Part id or external id; omit to clear
        part: Option<String>,
    },

    /// Move the next part by parts and segments
    MoveNext {
        rundown: String,

        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        parts: i32,

        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        segments: i32,
    },

    /// Arm a hold between the current and next part
    Hold {
        rundown: String,
    },

    /// Start an ad-lib in the current part
    Adlib {
        rundown: String,
        adlib: String,
    },

    /// Print the stored timeline of a studio
    Timeline {
        studio: String,
    },

    /// Print what plays on each layer of a studio
    State {
        studio: String,

        /// Epoch milliseconds (defaults to now)
        #[arg(long)]
        at: Option<i64>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
