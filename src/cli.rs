use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};

#[derive(Debug, Parser)]
#[command(name = "chat-todo")]
#[command(
    about = "Classify chat suggestion candidates into a deduplicated list of things to do",
    version
)]
pub struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run candidates through the provider chain and aggregate the results.
    Classify(ClassifyArgs),
    /// Re-run duplicate merging over an existing activity list.
    Aggregate(AggregateArgs),
    /// Show the resolved provider chain and credential status.
    Providers,
    /// Delete expired response-cache entries.
    CachePrune,
    /// Check configuration, providers and environment.
    Verify(VerifyArgs),
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// JSON array of candidate messages.
    #[arg(long)]
    pub candidates: PathBuf,
    /// Write activities here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Skip the on-disk response cache for this run.
    #[arg(long)]
    pub no_cache: bool,
    /// Only plan batches and report their estimated size.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct AggregateArgs {
    /// JSON array of classified activities.
    #[arg(long)]
    pub activities: PathBuf,
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Treat warnings such as unknown environment variables as failures.
    #[arg(long)]
    pub strict: bool,
}

fn render_text(report: &CommandReport) -> String {
    let mut out = format!(
        "{}: {}\n",
        report.command,
        if report.ok { "ok" } else { "failed" }
    );
    for detail in &report.details {
        out.push_str(&format!("  {detail}\n"));
    }
    if !report.issues.is_empty() {
        out.push_str("issues:\n");
        for issue in &report.issues {
            out.push_str(&format!("  - {issue}\n"));
        }
    }
    out
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    let rendered = if json {
        format!("{}\n", serde_json::to_string_pretty(report)?)
    } else {
        render_text(report)
    };
    // Keep stdout clean for the activity document when one is emitted.
    match &report.output {
        Some(document) => {
            println!("{document}");
            eprint!("{rendered}");
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match cli.command {
        Command::Classify(args) => commands::classify::run(&commands::classify::ClassifyOptions {
            candidates: args.candidates,
            out: args.out,
            no_cache: args.no_cache,
            dry_run: args.dry_run,
        })?,
        Command::Aggregate(args) => {
            commands::aggregate::run(&commands::aggregate::AggregateOptions {
                activities: args.activities,
                out: args.out,
            })?
        }
        Command::Providers => commands::providers::run()?,
        Command::CachePrune => commands::cache_prune::run()?,
        Command::Verify(args) => commands::verify::run(&commands::verify::VerifyOptions {
            strict: args.strict,
        })?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        anyhow::bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}
