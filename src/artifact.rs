// =============================================================================
// artifact.rs — WHAT WE LEAVE ON DISK
// =============================================================================
//
// The one thing this crate persists: newline-delimited JSON, gzip-compressed,
// one record per line, file name ending in `.ndjson.gz`. Anything that reads
// gzip and splits on '\n' can consume it.
// =============================================================================

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::error::ArtifactError;

pub const EXTENSION: &str = ".ndjson.gz";

fn check_extension(path: &Path) -> Result<(), ArtifactError> {
    let ok = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.len() > EXTENSION.len() && name.ends_with(EXTENSION));
    if ok {
        Ok(())
    } else {
        Err(ArtifactError::InvalidExtension(path.to_path_buf()))
    }
}

/// Write `records` to `path`, one compact JSON object per line.
/// Parent directories are created as needed. Returns the record count.
pub fn write_ndjson_gz<T: Serialize>(records: &[T], path: &Path) -> Result<usize, ArtifactError> {
    check_extension(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut encoder = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
    for (index, record) in records.iter().enumerate() {
        serde_json::to_writer(&mut encoder, record).map_err(|source| ArtifactError::Json {
            line: index + 1,
            source,
        })?;
        encoder.write_all(b"\n")?;
    }
    encoder.finish()?.flush()?;

    info!(path = %path.display(), records = records.len(), "Wrote artifact");
    Ok(records.len())
}

/// Read every record back from an `.ndjson.gz` file. Blank lines are skipped.
pub fn read_ndjson_gz<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ArtifactError> {
    check_extension(path)?;
    let reader = BufReader::new(GzDecoder::new(File::open(path)?));

    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| ArtifactError::Json {
            line: index + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}
