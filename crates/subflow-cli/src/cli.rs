use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use subflow::TranslationService;

#[derive(Parser)]
#[command(name = "subflow")]
#[command(author, version, about = "Download, transcribe and translate video subtitles")]
pub struct Cli {
    /// Path to a JSON config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one job and wait for it
    Run(RunArgs),

    /// Inspect the effective configuration
    Config {
        /// Print the configuration as JSON
        #[arg(long)]
        print: bool,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Video URL to download
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub url: Option<String>,

    /// Local video file
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Target language, e.g. `FR` or `FR - French`
    #[arg(long)]
    pub lang: Option<String>,

    /// Translation service: deepl, chatgpt or o3
    #[arg(long, value_parser = parse_service)]
    pub service: Option<TranslationService>,

    /// Run the models on the GPU
    #[arg(long)]
    pub gpu: bool,

    /// Run one step at a time
    #[arg(long, conflicts_with = "workers")]
    pub sequential: bool,

    /// Parallel step workers for this job
    #[arg(long)]
    pub workers: Option<usize>,
}

fn parse_service(value: &str) -> Result<TranslationService, String> {
    value.parse()
}
