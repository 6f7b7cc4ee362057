use std::io::IsTerminal;
use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod blocking;
mod cli;
mod config;
mod errors;
mod pairs;
mod pipeline;
mod progress;
mod registry;
mod report;
mod semantic;
mod spreadsheet;
#[cfg(test)]
mod tests;
mod web;
mod workers;

use config::{check_filter_threshold, check_similarity_threshold, Config};
use pipeline::{PipelineContext, PipelineOptions};
use report::ReportFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = cli::Args::parse();

    let mut config = Config::load_with(&args.config_dir)?;
    let show_progress = !args.quiet && std::io::stderr().is_terminal();

    match args.command {
        cli::Command::Run {
            input,
            column,
            filter_threshold,
            similarity_threshold,
            output_dir,
            provider,
            json,
        } => {
            if let Some(provider) = provider {
                config.embedding.provider = provider;
            }
            if let Some(dir) = output_dir {
                config.report.output_dir = dir.to_string_lossy().to_string();
            }

            let mut options = PipelineOptions::from_config(&config, show_progress);
            if let Some(value) = filter_threshold {
                options.blocking.filter_threshold = check_filter_threshold("filter threshold", value)?;
            }
            if let Some(value) = similarity_threshold {
                options.refine.similarity_threshold =
                    check_similarity_threshold("similarity threshold", value)?;
            }

            let rows = spreadsheet::read_column(&input, &column)?;
            let ctx = PipelineContext::from_config(&config)?;
            let output = pipeline::run(&ctx, &rows, &options)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&output.response())?);
                return Ok(());
            }

            println!(
                "{} records, {} candidate pairs, {} similar pairs",
                output.total_records,
                output.candidates.len(),
                output.pairs.len()
            );
            for pair in &output.pairs {
                println!(
                    "{:>8}  #{} <-> #{}  {:?} | {:?}",
                    pair.similarity_percentage(),
                    pair.row_a,
                    pair.row_b,
                    pair.text_a,
                    pair.text_b
                );
            }
            for skipped in &output.skipped {
                println!("skipped {:?}: {}", skipped.text, skipped.reason);
            }
            if let Some(path) = &options.final_report {
                println!("report written to {}", path.display());
            }
            Ok(())
        }

        cli::Command::Filter { report, kind } => {
            let filter = ReportFilter::parse(&kind);
            let report = report.unwrap_or_else(|| config.report_path());
            let path = report::filter_report(Path::new(&report), filter)?;
            println!("{}", path.display());
            Ok(())
        }

        cli::Command::Search {
            input,
            column,
            query,
            top_k,
            provider,
        } => {
            if let Some(provider) = provider {
                config.embedding.provider = provider;
            }
            let rows = spreadsheet::read_column(&input, &column)?;
            let ctx = PipelineContext::from_config(&config)?;
            let options = config.refine_options(show_progress);

            let hits = pipeline::search(&ctx, &rows, &query, top_k, &options)?;
            for (text, similarity) in hits {
                println!("{:>8}  {text}", pairs::format_percentage(similarity));
            }
            Ok(())
        }

        cli::Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let ctx = PipelineContext::from_config(&config)?;
            web::start_daemon(ctx, config)
        }
    }
}
