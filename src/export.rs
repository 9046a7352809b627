// src/export.rs
//! CSV artifact writer: one file per run, fixed column order, header always
//! present, null fields as empty cells, plain decimals without currency
//! symbols.

use std::path::{Path, PathBuf};

use crate::error::CrawlError;
use crate::record::{ProposalRecord, Source};

pub const COLUMNS: [&str; 14] = [
    "source",
    "title",
    "organization",
    "geography",
    "themes",
    "amount_requested_usd",
    "amount_original",
    "currency",
    "duration_months",
    "document_type",
    "link",
    "year",
    "chapter_or_funder",
    "notes",
];

/// Write the retained rows to `<output_dir>/<per-source file name>`.
/// Returns the artifact path. I/O failures here are fatal to the run.
pub fn write_csv(
    output_dir: &Path,
    source: Source,
    rows: &[ProposalRecord],
) -> Result<PathBuf, CrawlError> {
    let path = output_dir.join(source.artifact_file_name());
    let mut writer = csv::Writer::from_path(&path).map_err(|e| CrawlError::Export {
        path: path.clone(),
        source: e,
    })?;

    let fail = |e: csv::Error| CrawlError::Export {
        path: path.clone(),
        source: e,
    };
    writer.write_record(COLUMNS).map_err(fail)?;
    for row in rows {
        writer.write_record(row_fields(row)).map_err(fail)?;
    }
    writer.flush().map_err(|e| CrawlError::Export {
        path: path.clone(),
        source: csv::Error::from(e),
    })?;
    Ok(path)
}

/// Stringify one record in column order. Null → empty string.
fn row_fields(row: &ProposalRecord) -> [String; 14] {
    let themes = row.themes.iter().cloned().collect::<Vec<_>>().join(", ");
    [
        row.source.to_string(),
        row.title.clone(),
        opt(&row.organization),
        opt(&row.geography),
        themes,
        row.amount_requested_usd.map(plain_decimal).unwrap_or_default(),
        row.amount_original
            .as_ref()
            .map(|a| plain_decimal(a.value))
            .unwrap_or_default(),
        row.amount_original
            .as_ref()
            .map(|a| a.currency.clone())
            .unwrap_or_default(),
        row.duration_months.map(|d| d.to_string()).unwrap_or_default(),
        row.document_type.to_string(),
        opt(&row.link),
        row.year.map(|y| y.to_string()).unwrap_or_default(),
        opt(&row.chapter_or_funder),
        opt(&row.notes),
    ]
}

fn opt(field: &Option<String>) -> String {
    field.clone().unwrap_or_default()
}

/// No currency symbols, no forced precision: whole numbers print without a
/// fraction part.
fn plain_decimal(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DocumentType, OriginalAmount};
    use std::collections::BTreeSet;

    fn sample_row() -> ProposalRecord {
        ProposalRecord {
            source: Source::Asha,
            title: "Digital classrooms, phase two".to_string(),
            organization: Some("Shiksha Trust".to_string()),
            geography: Some("Maharashtra".to_string()),
            themes: BTreeSet::from(["education".to_string()]),
            amount_requested_usd: Some(36_145.0),
            amount_original: Some(OriginalAmount {
                value: 3_000_000.0,
                currency: "INR".to_string(),
            }),
            duration_months: Some(12),
            document_type: DocumentType::Proposal,
            link: Some("https://ashanet.org/project/?pid=101".to_string()),
            year: Some(2021),
            chapter_or_funder: None,
            notes: None,
        }
    }

    #[test]
    fn header_written_even_for_zero_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_csv(tmp.path(), Source::Usaid, &[]).unwrap();
        assert!(path.ends_with("usaid_proposals.csv"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.starts_with("source,title,organization"));
    }

    #[test]
    fn nulls_are_empty_cells_and_amounts_are_plain() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_csv(tmp.path(), Source::Asha, &[sample_row()]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let data_line = content.lines().nth(1).unwrap();
        assert!(data_line.contains("36145"));
        assert!(data_line.contains("3000000,INR"));
        assert!(!data_line.contains('$'));
        assert!(!data_line.contains('\u{20b9}'));
        // Trailing null chapter_or_funder and notes: two empty cells.
        assert!(data_line.ends_with(",,"));
    }

    #[test]
    fn embedded_commas_are_quoted() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_csv(tmp.path(), Source::Asha, &[sample_row()]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"Digital classrooms, phase two\""));

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let rec = rdr.records().next().unwrap().unwrap();
        assert_eq!(rec.get(1), Some("Digital classrooms, phase two"));
        assert_eq!(rec.len(), COLUMNS.len());
    }

    #[test]
    fn unwritable_directory_is_a_fatal_export_error() {
        let missing = Path::new("/nonexistent-dir-for-sure/xyz");
        let err = write_csv(missing, Source::Asha, &[]).unwrap_err();
        assert!(matches!(err, CrawlError::Export { .. }));
    }
}
