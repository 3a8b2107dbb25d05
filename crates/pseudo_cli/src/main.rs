//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `pseudo_core` linkage.
//! - Optionally dry-run directory parsing: `pseudo_cli [DIRECTORY]`.
//!   Parsing events go to rolling logs under `<temp>/pseudo_cli/logs`.

use pseudo_core::{
    default_log_level, init_logging, parse_directory, PseudoPotential, PseudoPotentialData,
};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("pseudo_core version={}", pseudo_core::core_version());

    let Some(dirpath) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };

    if let Err(err) = start_logging() {
        eprintln!("warning: file logging disabled: {err}");
    }

    match parse_directory::<PseudoPotentialData>(&dirpath) {
        Ok(pseudos) => {
            for pseudo in &pseudos {
                println!(
                    "{} {} {}",
                    pseudo.element().unwrap_or("?"),
                    pseudo.checksum(),
                    pseudo.filename()
                );
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn cli_log_dir() -> PathBuf {
    std::env::temp_dir().join("pseudo_cli").join("logs")
}

fn start_logging() -> Result<(), String> {
    init_logging(default_log_level(), &cli_log_dir().to_string_lossy())
}
