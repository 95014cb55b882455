use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// allure-service: HTTP adapter for Allure TestOps launches and PDF reports
#[derive(Parser)]
#[command(name = "allure-service", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind (defaults to SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the first launch created at or after a timestamp
    NextLaunch {
        /// RFC3339 timestamp, e.g. 2025-01-30T22:00:38.625+03:00
        #[arg(long)]
        after: String,
    },

    /// Generate and fetch PDF reports
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Request PDF generation for a launch
    Generate {
        #[arg(long)]
        launch_id: i64,
        #[arg(long)]
        name: String,
    },
    /// Print the download link for a report
    Link {
        #[arg(long)]
        id: String,
    },
    /// Download a generated report
    Download {
        #[arg(long)]
        id: String,
        /// Output path (defaults to allure-report-<id>.pdf in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
