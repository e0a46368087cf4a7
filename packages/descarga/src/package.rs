//! Turning downloaded packages into classified records.
//!
//! Unzipping is left to an [`ArchiveExtractor`]; this module only decides
//! which entries are documents and parses them.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use sat_cfdi::{parse_xml, TaxDocumentRecord};
use serde::Serialize;

use crate::error::Result;

/// One file inside a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Whether the entry name ends in `.xml`, ignoring case.
    pub fn is_xml(&self) -> bool {
        self.name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("xml"))
    }
}

/// Unpacks package bytes into named entries.
pub trait ArchiveExtractor {
    fn extract(&self, package: &[u8]) -> Result<Vec<ArchiveEntry>>;
}

/// Reads a package that was already unpacked into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryExtractor {
    dir: PathBuf,
}

impl DirectoryExtractor {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Regular files directly inside the directory, sorted by name.
    pub fn entries(&self) -> Result<Vec<ArchiveEntry>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        paths
            .into_iter()
            .map(|path| {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(ArchiveEntry::new(name, std::fs::read(&path)?))
            })
            .collect()
    }
}

impl ArchiveExtractor for DirectoryExtractor {
    /// The package bytes are ignored; the directory is the package.
    fn extract(&self, _package: &[u8]) -> Result<Vec<ArchiveEntry>> {
        self.entries()
    }
}

/// Records parsed from one package, in entry order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageReport {
    pub records: Vec<TaxDocumentRecord>,

    /// Entries that were XML but produced no record, with the reason.
    pub warnings: Vec<String>,
}

/// Parse every XML entry for `own_rfc`.
///
/// Entries are parsed in parallel. Malformed and unsupported documents are
/// reported in `warnings` and never abort the package.
pub fn process_entries(entries: &[ArchiveEntry], own_rfc: &str) -> PackageReport {
    let outcomes: Vec<_> = entries
        .par_iter()
        .filter(|entry| entry.is_xml())
        .map(|entry| (entry.name.as_str(), parse_xml(&entry.bytes, own_rfc)))
        .collect();

    let skipped = entries.len() - outcomes.len();
    if skipped > 0 {
        tracing::debug!(skipped, "non-XML entries ignored");
    }

    let mut report = PackageReport::default();
    for (name, outcome) in outcomes {
        match outcome {
            Ok(Some(record)) => report.records.push(record),
            Ok(None) => report
                .warnings
                .push(format!("{name}: not a supported CFDI")),
            Err(e) => {
                tracing::warn!(entry = name, error = %e, "malformed XML in package");
                report.warnings.push(format!("{name}: {e}"));
            }
        }
    }
    report
}

/// Extract `package` and parse its documents.
pub fn process_package(
    extractor: &dyn ArchiveExtractor,
    package: &[u8],
    own_rfc: &str,
) -> Result<PackageReport> {
    let entries = extractor.extract(package)?;
    let report = process_entries(&entries, own_rfc);
    tracing::info!(
        entries = entries.len(),
        records = report.records.len(),
        warnings = report.warnings.len(),
        "Package processed"
    );
    Ok(report)
}
