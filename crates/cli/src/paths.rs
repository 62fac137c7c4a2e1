//! Turning command-line path arguments into the list of files to format.

use std::ffi::OsStr;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

/// Expand `@list` arguments into the paths listed in that file, one per line.
pub fn expand_lists(args: &[String]) -> Result<Vec<PathBuf>, (String, io::Error)> {
    let mut expanded = Vec::new();
    for arg in args {
        match arg.strip_prefix('@') {
            Some(list) => {
                let file = fs::File::open(list).map_err(|e| (list.to_string(), e))?;
                for line in BufReader::new(file).lines() {
                    let line = line.map_err(|e| (list.to_string(), e))?;
                    let line = line.trim();
                    if !line.is_empty() {
                        expanded.push(PathBuf::from(line));
                    }
                }
            }
            None => expanded.push(PathBuf::from(arg)),
        }
    }
    Ok(expanded)
}

/// Per-directory ignore file, read alongside `.gitignore`.
pub const IGNORE_FILE: &str = ".fmtbignore";

/// One file to format, or the reason a path could not be walked.
pub type Entry = Result<PathBuf, (PathBuf, io::Error)>;

/// Walk `paths` in order.
///
/// Named files are always included. Directories are walked recursively in
/// sorted order, skipping hidden entries and anything matched by
/// `.gitignore` (unless `include_gitignored`) or [`IGNORE_FILE`], and only
/// files with one of `extensions` are kept.
pub fn collect_files(
    paths: &[PathBuf],
    extensions: &[String],
    include_gitignored: bool,
) -> Vec<Entry> {
    // WalkBuilder takes its first root in the constructor
    let Some((head, tail)) = paths.split_first() else {
        return Vec::new();
    };
    let mut builder = WalkBuilder::new(head);
    for path in tail {
        builder.add(path);
    }
    builder
        .git_ignore(!include_gitignored)
        .add_custom_ignore_filename(IGNORE_FILE)
        .sort_by_file_name(|a, b| a.cmp(b));

    let mut out = Vec::new();
    for result in builder.build() {
        match result {
            Ok(entry) if entry.depth() == 0 => {
                if !entry.path().is_dir() {
                    out.push(Ok(entry.into_path()));
                }
            }
            Ok(entry) => {
                if entry.path().is_file() && has_extension(entry.path(), extensions) {
                    tracing::trace!(path = %entry.path().display(), "found input file");
                    out.push(Ok(entry.into_path()));
                }
            }
            Err(err) => out.push(Err(split_error(err))),
        }
    }
    out
}

fn split_error(err: ignore::Error) -> (PathBuf, io::Error) {
    let path = error_path(&err).map(Path::to_path_buf).unwrap_or_default();
    let message = err.to_string();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::other(message));
    (path, source)
}

fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| extensions.iter().any(|e| e == ext))
}
