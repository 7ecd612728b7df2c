use std::path::PathBuf;

use anyhow::{Context, Result};
use canyon_core::format::prs;

#[derive(clap::Subcommand, Debug)]
pub enum PrsCommand {
    /// Decompress a raw PRS stream
    Decode {
        /// Path to the compressed file
        input_path: PathBuf,
        /// Path to the output file
        output_path: PathBuf,
    },
    /// Print the decompressed size of a raw PRS stream without writing anything
    Size { input_path: PathBuf },
}

pub fn prs_command(command: PrsCommand) -> Result<()> {
    match command {
        PrsCommand::Decode {
            input_path,
            output_path,
        } => {
            let input = std::fs::read(&input_path).context("Reading compressed file")?;
            let output = prs::decode(&input).context("Decoding PRS stream")?;
            std::fs::write(&output_path, output.as_slice()).context("Writing file")?;
            println!(
                "Wrote file {} ({} -> {} bytes)",
                output_path.display(),
                input.len(),
                output.size()
            );
            Ok(())
        }
        PrsCommand::Size { input_path } => {
            let input = std::fs::read(&input_path).context("Reading compressed file")?;
            let size = prs::decoded_size(&input).context("Scanning PRS stream")?;
            println!("{}", size);
            Ok(())
        }
    }
}
