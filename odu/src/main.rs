mod one;
mod prs;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::{one::OneCommand, prs::PrsCommand};

/// Inspect and unpack Sonic Heroes ONE archives
#[derive(clap::Parser, Debug)]
#[clap(version, about)]
struct Args {
    #[clap(subcommand)]
    action: OduAction,
}

#[derive(clap::Subcommand, Debug)]
enum OduAction {
    /// Work with .one archives
    #[clap(subcommand)]
    One(OneCommand),
    /// Work with raw PRS streams
    #[clap(subcommand)]
    Prs(PrsCommand),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .compact()
        .init();
    let args = Args::parse();
    match args.action {
        OduAction::One(cmd) => one::one_command(cmd),
        OduAction::Prs(cmd) => prs::prs_command(cmd),
    }
}
