//! Directory ingestion for pseudo-potential families.
//!
//! # Responsibility
//! - Turn a directory of pseudo-potential files into unstored records.
//! - Recover missing element symbols from `ELEMENT.EXTENSION` filenames.
//!
//! # Invariants
//! - Nothing is persisted here; callers decide what to store.
//! - A successful result is non-empty and has one record per element.
//! - The directory may be wrapped in exactly one extra directory level.

use crate::model::node::PseudoError;
use crate::model::pseudo::{capitalize_symbol, PseudoPotential};
use crate::service::family_service::{FamilyError, FamilyResult};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

static FILENAME_ELEMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]{1,2})\.\w+").expect("valid filename element regex"));

/// Parses every file in `dirpath` with the constructor of `P`.
///
/// See [`parse_directory_with`] for the directory rules.
pub fn parse_directory<P: PseudoPotential>(dirpath: impl AsRef<Path>) -> FamilyResult<Vec<P>> {
    parse_directory_with(dirpath, P::from_file)
}

/// Parses every file in `dirpath` with `construct(content, filename)`.
///
/// # Contract
/// - `dirpath` must be a directory. When its only entry is a directory, that
///   nested directory is parsed instead.
/// - Every entry of the parsed directory must be a regular file.
/// - Records without an element get it from the filename (`he.upf` -> `He`).
///
/// # Errors
/// - `InvalidInput` for a non-directory, a nested subdirectory, an empty
///   result or two records with the same element.
/// - `Parsing` naming the file when construction or element recovery fails.
/// - `Io` when the directory or a file cannot be read.
pub fn parse_directory_with<P, F>(dirpath: impl AsRef<Path>, mut construct: F) -> FamilyResult<Vec<P>>
where
    P: PseudoPotential,
    F: FnMut(Vec<u8>, &str) -> Result<P, PseudoError>,
{
    let dirpath = dirpath.as_ref();
    if !dirpath.is_dir() {
        return Err(FamilyError::InvalidInput(format!(
            "`{}` is not a directory",
            dirpath.display()
        )));
    }

    let mut entries = list_entries(dirpath)?;
    let dirpath = if entries.len() == 1 && entries[0].is_dir() {
        let nested = entries.remove(0);
        debug!(
            "event=parse_directory module=service status=descend dir={}",
            nested.display()
        );
        entries = list_entries(&nested)?;
        nested
    } else {
        dirpath.to_path_buf()
    };

    let mut pseudos = Vec::with_capacity(entries.len());
    for filepath in &entries {
        if !filepath.is_file() {
            return Err(FamilyError::InvalidInput(format!(
                "directory `{}` contains at least one entry that is not a file: `{}`",
                dirpath.display(),
                filepath.display()
            )));
        }
        pseudos.push(parse_file(filepath, &mut construct)?);
    }

    if pseudos.is_empty() {
        return Err(FamilyError::InvalidInput(format!(
            "no pseudo potentials were parsed from `{}`",
            dirpath.display()
        )));
    }

    let mut elements = BTreeSet::new();
    for pseudo in &pseudos {
        let element = pseudo.element().unwrap_or_default();
        if !elements.insert(element) {
            return Err(FamilyError::InvalidInput(format!(
                "directory `{}` contains pseudo potentials with duplicate elements: `{element}`",
                dirpath.display()
            )));
        }
    }

    info!(
        "event=parse_directory module=service status=ok pseudo_type={} count={}",
        P::NODE_TYPE,
        pseudos.len()
    );
    Ok(pseudos)
}

/// Extracts the element symbol from an `ELEMENT.EXTENSION` filename.
pub fn element_from_filename(filename: &str) -> Option<&str> {
    FILENAME_ELEMENT_RE
        .captures(filename)
        .and_then(|captures| captures.get(1))
        .map(|symbol| symbol.as_str())
}

fn parse_file<P, F>(filepath: &Path, construct: &mut F) -> FamilyResult<P>
where
    P: PseudoPotential,
    F: FnMut(Vec<u8>, &str) -> Result<P, PseudoError>,
{
    let filename = filepath
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| FamilyError::Parsing {
            path: filepath.to_path_buf(),
            message: "filename is not valid UTF-8".to_string(),
        })?;
    let content = fs::read(filepath).map_err(|source| FamilyError::Io {
        path: filepath.to_path_buf(),
        source,
    })?;

    let mut pseudo = construct(content, filename).map_err(|err| parse_failure(filepath, err))?;

    if pseudo.element().is_none() {
        let element = element_from_filename(filename).ok_or_else(|| FamilyError::Parsing {
            path: filepath.to_path_buf(),
            message: format!(
                "`{}` constructor did not define the element and no valid element symbol could \
                 be parsed from the filename `{filename}`; expected `ELEMENT.EXTENSION`",
                P::NODE_TYPE
            ),
        })?;
        pseudo
            .node_mut()
            .set_element(capitalize_symbol(element))
            .map_err(|err| parse_failure(filepath, err))?;
    }

    Ok(pseudo)
}

fn parse_failure(filepath: &Path, err: PseudoError) -> FamilyError {
    match err {
        PseudoError::Parsing(_) | PseudoError::InvalidElement(_) => FamilyError::Parsing {
            path: filepath.to_path_buf(),
            message: err.to_string(),
        },
        other => other.into(),
    }
}

fn list_entries(dirpath: &Path) -> FamilyResult<Vec<PathBuf>> {
    let io_error = |source: std::io::Error| FamilyError::Io {
        path: dirpath.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(dirpath).map_err(io_error)? {
        entries.push(entry.map_err(io_error)?.path());
    }
    entries.sort();
    Ok(entries)
}
