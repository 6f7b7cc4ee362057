use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ProviderKind;

#[derive(Parser, Debug)]
#[command(version, about = "Find near-duplicate texts in a spreadsheet column", long_about = None)]
pub struct Args {
    /// Directory holding config.yaml, reports and cached models
    #[clap(long, global = true, default_value = ".")]
    pub config_dir: PathBuf,

    /// Hide progress bars
    #[clap(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run blocking and refinement over a spreadsheet column and write the reports
    Run {
        /// Spreadsheet (xlsx, xls, ods or CSV) with a header row
        #[clap(short, long)]
        input: PathBuf,

        /// Column holding the texts
        #[clap(short, long)]
        column: String,

        /// Minimum lexical score for a candidate pair [0.0, 1.0]
        #[clap(long)]
        filter_threshold: Option<f64>,

        /// Minimum embedding similarity for a final pair (0.0, 1.0]
        #[clap(long)]
        similarity_threshold: Option<f64>,

        /// Report directory (overrides report.output_dir)
        #[clap(short, long)]
        output_dir: Option<PathBuf>,

        /// Embedding provider (overrides embedding.provider)
        #[clap(long, value_enum)]
        provider: Option<ProviderKind>,

        /// Print the full result as JSON instead of a summary
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// Re-export the last report keeping rows at or above a similarity floor
    Filter {
        /// Report to filter (defaults to the configured report)
        #[clap(short, long)]
        report: Option<PathBuf>,

        /// One of: all, 70, 80, 90
        #[clap(short = 't', long = "type", default_value = "all")]
        kind: String,
    },

    /// Print the texts of a column closest to a query text
    Search {
        #[clap(short, long)]
        input: PathBuf,

        #[clap(short, long)]
        column: String,

        #[clap(short, long)]
        query: String,

        #[clap(short = 'k', long, default_value = "5")]
        top_k: usize,

        #[clap(long, value_enum)]
        provider: Option<ProviderKind>,
    },

    /// Start the HTTP server
    Serve {
        /// Address to listen on (overrides server.bind)
        #[clap(long)]
        bind: Option<String>,
    },
}
