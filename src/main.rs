//! Tapedeck CLI

use std::path::{Path, PathBuf};
use std::process;
use std::time::UNIX_EPOCH;

use anyhow::{bail, Context};
use tapedeck::naming::tape_name_from_file_stem;
use tapedeck::storage::FILE_EXTENSION;
use tapedeck::{FileTapeLoader, TapeLoader};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "list" => match args.get(2) {
            Some(root) => list_tapes(Path::new(root)),
            None => usage_error("Usage: tapedeck list <tape-root>"),
        },
        "show" => match (args.get(2), args.get(3)) {
            (Some(root), Some(name)) => show_tape(PathBuf::from(root), name),
            _ => usage_error("Usage: tapedeck show <tape-root> <name>"),
        },
        command => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'tapedeck' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Tapedeck v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: tapedeck <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  list <tape-root>          List stored tapes");
    eprintln!("  show <tape-root> <name>   Print the interactions on a tape");
}

fn usage_error(usage: &str) -> anyhow::Result<()> {
    eprintln!("{usage}");
    process::exit(1);
}

fn list_tapes(root: &Path) -> anyhow::Result<()> {
    if !root.is_dir() {
        bail!("Tape root not found: {}", root.display());
    }

    let mut names: Vec<String> = std::fs::read_dir(root)
        .with_context(|| format!("Failed to read {}", root.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some(FILE_EXTENSION))
        .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).and_then(tape_name_from_file_stem))
        .collect();
    names.sort();

    println!("Tape root: {}", root.display());
    for name in names {
        println!("  {name}");
    }
    Ok(())
}

fn show_tape(root: PathBuf, name: &str) -> anyhow::Result<()> {
    let loader = FileTapeLoader::new(root);
    let path = loader.file_for(name)?;
    if !path.exists() {
        bail!("No tape named '{name}' at {}", path.display());
    }

    let tape = loader.load(name)?;
    println!("Tape '{}': {} interactions", tape.name(), tape.len());

    for (i, interaction) in tape.interactions().iter().enumerate() {
        let recorded = interaction
            .timestamp()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        println!(
            "  #{i} {} {} -> {} ({} bytes, recorded at {recorded})",
            interaction.request().method,
            interaction.request().uri,
            interaction.response().status,
            interaction.response().body.len()
        );
    }
    Ok(())
}
