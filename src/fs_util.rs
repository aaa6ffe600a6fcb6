use std::fs::{self, File};
use std::io::{self, BufReader};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::MultiGzDecoder;

use crate::error::CurateError;

/// Decompresses `source` (gzip) into `target` through a temporary file, then removes
/// `source`. A failure leaves no partial `target` behind.
pub fn gunzip_to(source: &Utf8Path, target: &Utf8Path) -> Result<(), CurateError> {
    let parent = target
        .parent()
        .ok_or_else(|| CurateError::Filesystem("invalid destination path".to_string()))?;
    let input = File::open(source.as_std_path())
        .map_err(|err| CurateError::Filesystem(format!("open gzip {source}: {err}")))?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(input));
    let mut temp = tempfile::Builder::new()
        .prefix(".marker-curator-gunzip")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    io::copy(&mut decoder, temp.as_file_mut())
        .map_err(|err| CurateError::Filesystem(format!("decompress {source}: {err}")))?;
    temp.persist(target.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;

    if let Err(err) = fs::remove_file(source.as_std_path()) {
        tracing::error!("failed to remove {source}: {err}");
    }
    Ok(())
}

/// Base names that have both a `.faa` and an `.fna` file in `dir`, sorted.
pub fn paired_genome_names(dir: &Utf8Path) -> Result<Vec<String>, CurateError> {
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| CurateError::Filesystem(format!("read {dir}: {err}")))?;
    let mut names = Vec::new();
    for entry in entries.flatten() {
        let path = match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(path) => path,
            Err(_) => continue,
        };
        if path.extension() != Some("fna") {
            continue;
        }
        let Some(stem) = path.file_stem() else {
            continue;
        };
        if dir.join(format!("{stem}.faa")).as_std_path().is_file() {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Non-hidden regular files in `dir` with extension `ext`, sorted by name.
pub fn list_with_extension(dir: &Utf8Path, ext: &str) -> Result<Vec<Utf8PathBuf>, CurateError> {
    if !dir.as_std_path().exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| CurateError::Filesystem(format!("read {dir}: {err}")))?;
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
            continue;
        };
        let hidden = path
            .file_name()
            .map(|name| name.starts_with('.'))
            .unwrap_or(true);
        if !hidden && path.is_file() && path.extension() == Some(ext) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
