//! Bulk generation: one document per row, strictly in row order.

use crate::DocMerge;
use crate::error::DocMergeError;
use crate::filename::{self, OutputFormat};
use crate::page_model::PageModel;
use crate::row::Row;
use std::any::Any;
use std::collections::HashMap;
use std::io::{Seek, Write};
use std::panic::{self, AssertUnwindSafe};
use zip::write::SimpleFileOptions;

pub const FAILED_MANIFEST: &str = "FAILED.txt";

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub format: OutputFormat,
    /// Filename pattern; `None` uses `{fallback_prefix}_{n:04}`.
    pub pattern: Option<String>,
    pub fallback_prefix: String,
}

impl Default for BatchRequest {
    fn default() -> Self {
        Self {
            format: OutputFormat::Pdf,
            pattern: None,
            fallback_prefix: "document".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// Rows processed so far, 1-based after the first row.
    pub current: usize,
    pub total: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Generated {
        index: usize,
        filename: String,
        bytes: Vec<u8>,
    },
    Failed {
        index: usize,
        filename: String,
        error: String,
    },
}

impl RowOutcome {
    pub fn index(&self) -> usize {
        match self {
            RowOutcome::Generated { index, .. } | RowOutcome::Failed { index, .. } => *index,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            RowOutcome::Generated { filename, .. } | RowOutcome::Failed { filename, .. } => filename,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RowOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<RowOutcome>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn generated(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_failed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    pub fn outcome(&self, index: usize) -> Option<&RowOutcome> {
        self.outcomes.iter().find(|o| o.index() == index)
    }
}

/// Render every row with `engine`. A failing row is recorded and the loop
/// moves on; `cancel` is polled before each row.
pub fn generate_batch<P, C>(
    engine: &DocMerge,
    rows: &[Row],
    template: &PageModel,
    request: &BatchRequest,
    progress: P,
    cancel: C,
) -> BatchReport
where
    P: FnMut(BatchProgress),
    C: FnMut() -> bool,
{
    generate_batch_with(
        rows,
        template,
        request,
        |pages, row, format| engine.render(pages, row, format),
        progress,
        cancel,
    )
}

/// [`generate_batch`] over a caller-supplied renderer. A renderer that
/// panics fails only the row it was rendering.
pub fn generate_batch_with<R, P, C>(
    rows: &[Row],
    template: &PageModel,
    request: &BatchRequest,
    mut render: R,
    mut progress: P,
    mut cancel: C,
) -> BatchReport
where
    R: FnMut(&[String], &Row, OutputFormat) -> Result<Vec<u8>, DocMergeError>,
    P: FnMut(BatchProgress),
    C: FnMut() -> bool,
{
    let total = rows.len();
    let pattern = request.pattern.as_deref().unwrap_or("");
    let mut report = BatchReport::default();
    let mut failed = 0usize;

    for (index, row) in rows.iter().enumerate() {
        if cancel() {
            log::info!("batch cancelled after {} of {} rows", index, total);
            report.cancelled = true;
            break;
        }
        let filename = filename::generate(row, pattern, &request.fallback_prefix, index, request.format);
        let rendered = panic::catch_unwind(AssertUnwindSafe(|| {
            render(template.pages(), row, request.format)
        }))
        .unwrap_or_else(|payload| Err(DocMergeError::Render(panic_message(payload.as_ref()))));
        let outcome = match rendered {
            Ok(bytes) => RowOutcome::Generated {
                index,
                filename,
                bytes,
            },
            Err(err) => {
                failed += 1;
                log::warn!("row {} ({}) failed: {}", index + 1, filename, err);
                RowOutcome::Failed {
                    index,
                    filename,
                    error: err.to_string(),
                }
            }
        };
        report.outcomes.push(outcome);
        progress(BatchProgress {
            current: index + 1,
            total,
            failed,
        });
    }
    report
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "renderer panicked".to_string())
}

/// Write generated documents into a ZIP archive. Duplicate names get `_2`,
/// `_3`, ... suffixes; failed rows are listed in `FAILED.txt`.
pub fn write_archive<W: Write + Seek>(report: &BatchReport, writer: W) -> Result<W, DocMergeError> {
    let mut zip = zip::ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut seen: HashMap<String, usize> = HashMap::new();
    // Reserve the manifest name so a row cannot shadow it.
    seen.insert(FAILED_MANIFEST.to_string(), 1);

    for outcome in &report.outcomes {
        if let RowOutcome::Generated { filename, bytes, .. } = outcome {
            let name = filename::dedupe(filename, &mut seen);
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }
    }
    let manifest = failure_manifest(report);
    if !manifest.is_empty() {
        zip.start_file(FAILED_MANIFEST, options)?;
        zip.write_all(manifest.as_bytes())?;
    }
    Ok(zip.finish()?)
}

fn failure_manifest(report: &BatchReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        if let RowOutcome::Failed { index, filename, error } = outcome {
            out.push_str(&format!("row {}\t{}\t{}\n", index + 1, filename, error));
        }
    }
    if report.cancelled && !out.is_empty() {
        out.push_str("batch cancelled before all rows were processed\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn report() -> BatchReport {
        BatchReport {
            outcomes: vec![
                RowOutcome::Generated {
                    index: 0,
                    filename: "Ada.pdf".to_string(),
                    bytes: b"one".to_vec(),
                },
                RowOutcome::Failed {
                    index: 1,
                    filename: "Bob.pdf".to_string(),
                    error: "layout error: boom".to_string(),
                },
                RowOutcome::Generated {
                    index: 2,
                    filename: "Ada.pdf".to_string(),
                    bytes: b"three".to_vec(),
                },
            ],
            cancelled: false,
        }
    }

    #[test]
    fn archive_dedupes_names_and_lists_failures() {
        let cursor = write_archive(&report(), Cursor::new(Vec::new())).expect("zip");
        let mut archive = zip::ZipArchive::new(Cursor::new(cursor.into_inner())).expect("read");
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["Ada.pdf", "Ada_2.pdf", "FAILED.txt"]);

        let mut second = String::new();
        archive
            .by_name("Ada_2.pdf")
            .expect("entry")
            .read_to_string(&mut second)
            .expect("read");
        assert_eq!(second, "three");

        let mut manifest = String::new();
        archive
            .by_name(FAILED_MANIFEST)
            .expect("manifest")
            .read_to_string(&mut manifest)
            .expect("read");
        assert_eq!(manifest, "row 2\tBob.pdf\tlayout error: boom\n");
    }

    #[test]
    fn clean_batches_have_no_manifest() {
        let mut clean = report();
        clean.outcomes.retain(|o| !o.is_failed());
        assert_eq!(clean.generated(), 2);
        assert_eq!(clean.failed(), 0);
        let cursor = write_archive(&clean, Cursor::new(Vec::new())).expect("zip");
        let archive = zip::ZipArchive::new(Cursor::new(cursor.into_inner())).expect("read");
        assert!(archive.file_names().all(|name| name != FAILED_MANIFEST));
    }

    fn rows(names: &[&str]) -> Vec<Row> {
        names.iter().map(|name| Row::new().with("Name", *name)).collect()
    }

    #[test]
    fn failing_row_does_not_stop_the_batch() {
        let template = PageModel::split("<p>{Name}</p>");
        let request = BatchRequest {
            pattern: Some("{Name}".to_string()),
            ..BatchRequest::default()
        };
        let mut seen = Vec::new();
        let report = generate_batch_with(
            &rows(&["Ada", "Bob", "Cy"]),
            &template,
            &request,
            |_, row, _| match row.display("Name").as_deref() {
                Some("Bob") => Err(DocMergeError::Layout("boom".to_string())),
                _ => Ok(b"doc".to_vec()),
            },
            |p| seen.push((p.current, p.failed)),
            || false,
        );
        assert_eq!(seen, vec![(1, 0), (2, 1), (3, 1)]);
        assert_eq!(report.generated(), 2);
        assert_eq!(report.outcome(1).map(RowOutcome::is_failed), Some(true));

        let cursor = write_archive(&report, Cursor::new(Vec::new())).expect("zip");
        let mut archive = zip::ZipArchive::new(Cursor::new(cursor.into_inner())).expect("read");
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["Ada.pdf", "Cy.pdf", "FAILED.txt"]);
        let mut manifest = String::new();
        archive
            .by_name(FAILED_MANIFEST)
            .expect("manifest")
            .read_to_string(&mut manifest)
            .expect("read");
        assert_eq!(manifest, "row 2\tBob.pdf\tlayout error: boom\n");
    }

    #[test]
    fn panicking_renderer_fails_only_its_row() {
        let template = PageModel::split("<p>{Name}</p>");
        let report = generate_batch_with(
            &rows(&["Ada", "Bob"]),
            &template,
            &BatchRequest::default(),
            |_, row, _| {
                if row.display("Name").as_deref() == Some("Ada") {
                    panic!("undecodable image");
                }
                Ok(b"doc".to_vec())
            },
            |_| {},
            || false,
        );
        assert_eq!(report.failed(), 1);
        assert_eq!(report.generated(), 1);
        match report.outcome(0) {
            Some(RowOutcome::Failed { error, .. }) => assert!(error.contains("undecodable image")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
