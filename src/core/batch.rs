use crate::domain::model::CutoutTarget;
use crate::domain::ports::Archive;
use crate::utils::error::{AstrogetError, Result};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::time::Duration;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const MANIFEST_NAME: &str = "MANIFEST.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CutoutStatus {
    Ok,
    Failed,
}

/// One row of `MANIFEST.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub index: usize,
    pub md5: String,
    pub hdu_idx: usize,
    pub ra: f64,
    pub dec: f64,
    pub filename: String,
    pub status: CutoutStatus,
    pub message: String,
}

#[derive(Debug)]
pub struct BatchOutput {
    pub run_id: String,
    pub archive_bytes: Vec<u8>,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub run_id: String,
    pub archive_path: String,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn new(
        run_id: String,
        archive_path: String,
        entries: &[ManifestEntry],
        elapsed: Duration,
    ) -> Self {
        let succeeded = entries
            .iter()
            .filter(|e| e.status == CutoutStatus::Ok)
            .count();
        Self {
            run_id,
            archive_path,
            succeeded,
            failed: entries.len() - succeeded,
            elapsed,
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "From RunId={}: {} of {} cutouts written to {} in {:.1}s",
            self.run_id,
            self.succeeded,
            self.succeeded + self.failed,
            self.archive_path,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Fetches cutouts with bounded concurrency and packs them into one zip.
pub struct CutoutBatch<'a, A: Archive> {
    archive: &'a A,
    size: u32,
    concurrency: usize,
}

impl<'a, A: Archive> CutoutBatch<'a, A> {
    pub fn new(archive: &'a A, size: u32, concurrency: usize) -> Self {
        Self {
            archive,
            size,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(&self, targets: &[CutoutTarget]) -> Result<BatchOutput> {
        let run_id = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f").to_string();
        tracing::info!(
            "✂️ RunId={}: fetching {} cutouts ({} at a time)",
            run_id,
            targets.len(),
            self.concurrency
        );

        // buffered 保持原本順序
        let results: Vec<Result<Vec<u8>>> = stream::iter(targets)
            .map(|target| self.archive.fetch_cutout(target, self.size))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut entries = Vec::with_capacity(targets.len());
        let mut files = Vec::new();
        for (index, (target, result)) in targets.iter().zip(results).enumerate() {
            let filename = format!("cutout_{}.fits", index);
            let (status, message) = match result {
                Ok(data) => {
                    files.push((filename.clone(), data));
                    (CutoutStatus::Ok, String::new())
                }
                Err(e) => {
                    tracing::warn!("🔶 Cutout {} ({}) failed: {}", index, target.md5, e);
                    (CutoutStatus::Failed, e.to_string())
                }
            };
            entries.push(ManifestEntry {
                index,
                md5: target.md5.clone(),
                hdu_idx: target.hdu_idx,
                ra: target.ra,
                dec: target.dec,
                filename: if status == CutoutStatus::Ok {
                    filename
                } else {
                    String::new()
                },
                status,
                message,
            });
        }

        let archive_bytes = build_archive(&entries, &files)?;
        tracing::info!(
            "✂️ RunId={}: {} of {} cutouts succeeded",
            run_id,
            files.len(),
            targets.len()
        );

        Ok(BatchOutput {
            run_id,
            archive_bytes,
            entries,
        })
    }
}

pub const MANIFEST_COLUMNS: [&str; 8] = [
    "index", "md5", "hdu_idx", "ra", "dec", "filename", "status", "message",
];

pub fn manifest_csv(entries: &[ManifestEntry]) -> Result<Vec<u8>> {
    // 表頭手動寫入，空批次也要有
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(MANIFEST_COLUMNS)?;
    for entry in entries {
        writer.serialize(entry)?;
    }
    writer
        .into_inner()
        .map_err(|e| AstrogetError::IoError(e.into_error()))
}

fn build_archive(entries: &[ManifestEntry], files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

    zip.start_file(MANIFEST_NAME, SimpleFileOptions::default())?;
    zip.write_all(&manifest_csv(entries)?)?;

    for (name, data) in files {
        zip.start_file(name.as_str(), SimpleFileOptions::default())?;
        zip.write_all(data)?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

/// Read targets from CSV with a `md5,hdu_idx,ra,dec` header.
pub fn read_targets<R: std::io::Read>(reader: R) -> Result<Vec<CutoutTarget>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut targets = Vec::new();
    for row in reader.deserialize() {
        let target: CutoutTarget = row?;
        targets.push(target);
    }
    Ok(targets)
}
