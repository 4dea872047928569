use anyhow::{anyhow, Context};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const ENTRIES_ENTRY: &str = "store/entries.json";
pub const BUNDLE_FORMAT_V1: &str = "rosterd-store-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub entries: Vec<(String, String)>,
}

/// Writes every store entry into a zip bundle at `out_path`.
pub fn export_store_bundle(
    entries: &[(String, String)],
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let tmp_path = out_path.with_extension("exporting");
    let out_file = File::create(&tmp_path).with_context(|| {
        format!(
            "failed to create output file {}",
            tmp_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "entryCount": entries.len(),
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    let map: BTreeMap<&str, &str> = entries
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    zip.start_file(ENTRIES_ENTRY, opts)
        .context("failed to start store entry")?;
    zip.write_all(
        serde_json::to_string(&map)
            .context("failed to serialize store entries")?
            .as_bytes(),
    )
    .context("failed to write store entry")?;

    zip.finish().context("failed to finalize zip bundle")?;
    std::fs::rename(&tmp_path, out_path).with_context(|| {
        format!(
            "failed to move bundle into place at {}",
            out_path.to_string_lossy()
        )
    })?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: map.len(),
    })
}

/// Reads a bundle written by [`export_store_bundle`]. Nothing is applied here.
pub fn import_store_bundle(in_path: &Path) -> anyhow::Result<ImportSummary> {
    if !is_zip_file(in_path)? {
        return Err(anyhow!(
            "not a store bundle: {}",
            in_path.to_string_lossy()
        ));
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

    let mut entries_text = String::new();
    archive
        .by_name(ENTRIES_ENTRY)
        .context("bundle missing store/entries.json")?
        .read_to_string(&mut entries_text)
        .context("failed to read store entries")?;
    let map: BTreeMap<String, String> =
        serde_json::from_str(&entries_text).context("store entries are invalid JSON")?;

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        entries: map.into_iter().collect(),
    })
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
