// Command-line interface definitions for speechcoach
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "speechcoach")]
#[command(author, version, about = "Terminal speech-practice coach")]
#[command(long_about = "
Speechcoach fetches a speech exercise from your coaching backend, records
you reading it aloud, and shows the scored analysis.

SETUP:
  1. Point it at your backend: speechcoach --api-url https://coach.example.org
     (or set api.base_url in ~/.config/speechcoach/config.toml)
  2. Export your access token: export SPEECHCOACH_TOKEN=...
  3. Run: speechcoach (starts an interactive practice session)

USAGE:
  Press r to start and stop recording, s to submit, n for the next exercise.
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override the backend base URL
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Override the practising user's id
    #[arg(long, value_name = "ID")]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive practice session (default if no command specified)
    Practice,

    /// Print the next exercise and where it came from
    Next,

    /// List the exercises currently assigned to you
    Active,

    /// Ask the backend to plan a week of exercises
    Plan,

    /// Ask the backend to generate a new exercise
    Generate {
        /// Exercise type: sentence, story, conversation or tongue_twister
        #[arg(long, default_value = "sentence")]
        kind: String,
    },

    /// Submit an existing WAV recording for analysis
    Analyze {
        /// Path to a WAV file
        file: std::path::PathBuf,

        /// Exercise the recording attempts
        #[arg(long, value_name = "ID")]
        exercise: String,
    },

    /// Mark an exercise as completed
    Complete {
        /// Exercise id
        exercise_id: String,

        /// Score achieved (0-100)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        score: Option<u8>,
    },

    /// Show current configuration
    Config {
        /// Write the effective configuration (without the token) to the config file
        #[arg(long)]
        save: bool,
    },
}
