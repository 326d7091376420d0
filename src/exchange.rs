use anyhow::{anyhow, Context};
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::marks::{self, MarkRecord};
use crate::protect::MarksProtection;

const MANIFEST_ENTRY: &str = "manifest.json";
const MARKS_ENTRY: &str = "marks/marks.json";
const BACKUP_ENTRY_PREFIX: &str = "backups/";
pub const BUNDLE_FORMAT_V1: &str = "marksafe-bundle-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub imported: usize,
}

/// Export the collection and its backup log as a zip bundle with a
/// manifest, so mark data can move between workspaces.
pub fn export_marks_bundle(
    protection: &MarksProtection,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let marks = protection
        .marks_snapshot()
        .map_err(|e| anyhow!("failed to load collection: {e}"))?;
    let backups = protection
        .backups()
        .records()
        .map_err(|e| anyhow!("failed to enumerate backups: {e}"))?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "marksCount": marks.len(),
        "backupsCount": backups.len(),
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(MARKS_ENTRY, opts)
        .context("failed to start marks entry")?;
    zip.write_all(
        marks::encode(&marks)
            .context("failed to serialize marks")?
            .as_bytes(),
    )
    .context("failed to write marks entry")?;

    let mut entry_count = 2;
    for record in &backups {
        let name = format!("{BACKUP_ENTRY_PREFIX}{:010}.json", record.seq);
        zip.start_file(name.as_str(), opts)
            .with_context(|| format!("failed to start backup entry {name}"))?;
        zip.write_all(
            serde_json::to_string_pretty(record)
                .context("failed to serialize backup entry")?
                .as_bytes(),
        )
        .with_context(|| format!("failed to write backup entry {name}"))?;
        entry_count += 1;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count,
    })
}

/// Import a bundle (or a legacy raw JSON mark array) into the workspace.
/// The collection is validated, the pre-import state snapshotted, and the
/// commit goes through the atomic writer.
pub fn import_marks_bundle(
    protection: &MarksProtection,
    in_path: &Path,
) -> anyhow::Result<ImportSummary> {
    if !is_zip_file(in_path)? {
        let text = std::fs::read_to_string(in_path).with_context(|| {
            format!("failed to read input file {}", in_path.to_string_lossy())
        })?;
        let records: Vec<MarkRecord> =
            marks::decode(&text).context("legacy input is not a JSON mark array")?;
        let imported = commit_imported(protection, records)?;
        return Ok(ImportSummary {
            bundle_format_detected: "legacy-json".to_string(),
            imported,
        });
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut marks_text = String::new();
    archive
        .by_name(MARKS_ENTRY)
        .context("bundle missing marks/marks.json")?
        .read_to_string(&mut marks_text)
        .context("failed to read marks entry")?;
    let records: Vec<MarkRecord> =
        marks::decode(&marks_text).context("marks entry is not a JSON mark array")?;

    let imported = commit_imported(protection, records)?;
    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        imported,
    })
}

fn commit_imported(
    protection: &MarksProtection,
    records: Vec<MarkRecord>,
) -> anyhow::Result<usize> {
    protection
        .replace_collection(records)
        .map_err(|e| anyhow!("import commit failed: {e}"))
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
