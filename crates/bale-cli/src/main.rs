#![deny(clippy::all, warnings)]

use clap::Parser;
use color_eyre::{eyre::eyre, Result};

mod cli;

use cli::BaleCli;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = BaleCli::parse();
    init_tracing(cli.verbose);

    let project_root = std::env::current_dir()?;
    match bale_core::pack_project(&project_root, &cli.overrides(), cli.output.clone()) {
        Ok(report) => {
            emit_summary(&cli, &report)?;
            Ok(())
        }
        Err(err) => {
            if cli.verbose > 0 {
                // full report with the error chain
                Err(eyre!("{err:?}"))
            } else {
                eprintln!("bale: {err:#}");
                std::process::exit(1);
            }
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = format!("bale_core={level},bale_cli={level}");
    // logs go to stderr so --json output stays parseable
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_summary(cli: &BaleCli, report: &bale_core::PackReport) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "bale: wrote {} ({} dependency files, {} own files)",
        report.archive.display(),
        report.dependency_files,
        report.own_files
    );
    if report.uploaded {
        println!("bale: uploaded {}", report.archive.display());
    }
    Ok(())
}
