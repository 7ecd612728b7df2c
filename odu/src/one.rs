use std::{
    collections::HashSet,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use canyon_core::{
    diagnostics::{Diagnostics, RecordingSink},
    format::one::OneArchive,
    primitives::source::FileSource,
};
use itertools::Itertools;
use tracing::{Level, warn};

#[derive(clap::Subcommand, Debug)]
pub enum OneCommand {
    /// List the entries of the archive, in the order they are stored
    List { archive_path: PathBuf },
    /// Print the archive variant and a summary of its contents
    Info { archive_path: PathBuf },
    /// Decompress one entry of the archive
    ExtractOne {
        /// Path to the .one file
        archive_path: PathBuf,
        /// Name of the entry to extract. With duplicate names, the first one is used
        entry_name: String,
        /// Path to the output file
        output_path: PathBuf,
    },
    /// Decompress multiple entries of the archive into a directory
    Extract {
        /// Path to the .one file
        archive_path: PathBuf,
        /// Path to the output directory (will be created if it does not exist)
        output_dir: PathBuf,
        /// Names of specific entries to be extracted. If none are specified, all entries will be extracted.
        entry_names: Vec<String>,
    },
    /// Print a hex dump of one decompressed entry
    Dump {
        archive_path: PathBuf,
        entry_name: String,
    },
}

fn open_archive(path: &Path) -> Result<OneArchive<FileSource>> {
    let sink = Arc::new(RecordingSink::default());
    let archive = OneArchive::open(path, Diagnostics::from_arc(sink.clone()))
        .with_context(|| format!("Parsing ONE archive {}", path.display()))?;

    // the library degrades to an empty archive, but here there is nothing to do with one
    let records = sink.take();
    for record in &records {
        if record.level != Level::ERROR {
            warn!("{}", record.message);
        }
    }
    if let Some(error) = records.iter().find(|record| record.level == Level::ERROR) {
        bail!("{}", error.message);
    }

    Ok(archive)
}

/// Refuses names that would place the output outside of `output_dir`.
fn entry_output_path(output_dir: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    if name.is_empty()
        || !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
    {
        bail!("Refusing to extract entry with unsafe name {:?}", name);
    }
    Ok(output_dir.join(relative))
}

pub fn one_command(command: OneCommand) -> Result<()> {
    match command {
        OneCommand::List { archive_path } => {
            let archive = open_archive(&archive_path)?;
            let duplicated = archive
                .entries()
                .iter()
                .map(|entry| entry.name.as_str())
                .duplicates()
                .collect::<HashSet<_>>();

            for (index, entry) in archive.entries().iter().enumerate() {
                // only the first entry with a given name can be found by name
                let reachable = archive.find_file(&entry.name) == Some(index);
                let marker = if !reachable {
                    " (shadowed)"
                } else if duplicated.contains(entry.name.as_str()) {
                    " (duplicate name)"
                } else {
                    ""
                };
                println!("{:4} {:>9} {}{}", index, entry.length, entry.name, marker);
            }
            Ok(())
        }
        OneCommand::Info { archive_path } => {
            let archive = open_archive(&archive_path)?;
            let compressed: u64 = archive
                .entries()
                .iter()
                .map(|entry| u64::from(entry.length))
                .sum();
            let unique = archive
                .entries()
                .iter()
                .map(|entry| entry.name.as_str())
                .unique()
                .count();

            println!("archive:    {}", archive.name());
            println!("variant:    {}", archive.variant());
            println!(
                "entries:    {} ({} unique names)",
                archive.file_count(),
                unique
            );
            println!("compressed: {} bytes", compressed);
            Ok(())
        }
        OneCommand::ExtractOne {
            archive_path,
            entry_name,
            output_path,
        } => {
            let archive = open_archive(&archive_path)?;
            let data = archive
                .read_file_by_name(&entry_name)
                .context("Reading entry from archive")?;
            std::fs::write(&output_path, data.as_slice()).context("Writing file")?;
            Ok(())
        }
        OneCommand::Extract {
            archive_path,
            output_dir,
            entry_names,
        } => {
            let archive = open_archive(&archive_path)?;

            for name in &entry_names {
                if archive.find_file(name).is_none() {
                    bail!("No entry named {:?} in {}", name, archive_path.display());
                }
            }

            std::fs::create_dir_all(&output_dir).context("Creating output directory")?;

            for (index, entry) in archive.entries().iter().enumerate() {
                if !entry_names.is_empty()
                    && !entry_names.iter().any(|n| n.as_str() == entry.name.as_str())
                {
                    continue;
                }
                if archive.find_file(&entry.name) != Some(index) {
                    warn!(
                        "Entry #{} shares its name with an earlier entry, skipping {}",
                        index, entry.name
                    );
                    continue;
                }

                let output_path = entry_output_path(&output_dir, &entry.name)?;
                let data = archive
                    .read_file(index)
                    .with_context(|| format!("Reading entry {} from archive", entry.name))?;
                std::fs::write(&output_path, data.as_slice()).context("Writing file")?;

                println!(
                    "Wrote file {} ({} bytes)",
                    output_path.display(),
                    data.size()
                );
            }
            Ok(())
        }
        OneCommand::Dump {
            archive_path,
            entry_name,
        } => {
            let archive = open_archive(&archive_path)?;
            let data = archive
                .read_file_by_name(&entry_name)
                .context("Reading entry from archive")?;
            println!("{} ({} bytes):", entry_name, data.size());
            for line in data.dump_lines() {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use super::entry_output_path;

    #[test]
    fn entry_names_stay_inside_output_dir() {
        let out = Path::new("out");
        assert_eq!(
            entry_output_path(out, "s01.bsp").unwrap(),
            Path::new("out").join("s01.bsp")
        );

        for name in ["", "../x", "/abs", "./s01.bsp", "dir/../../x"] {
            assert!(
                entry_output_path(out, name).is_err(),
                "{:?} should be refused",
                name
            );
        }
    }
}
