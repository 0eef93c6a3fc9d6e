use crate::pdf_annotations::{annotate_document, AnnotationWriteSummary};
use crate::{validate_filename, StorageError};
use directories::ProjectDirs;
use lopdf::Document;
use pdf_markup_core::{ArtifactReference, PersistenceGateway, PersistenceResult, SaveRequest};
use std::fs;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Files produced by one save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifacts {
    pub annotations_path: PathBuf,
    pub pdf_path: PathBuf,
    pub written: usize,
    pub skipped: usize,
}

/// Saves annotation sets next to an annotated copy of the source PDF
///
/// Source documents are looked up by filename inside `source_dir`; results go
/// to `output_dir` (PDF) and `output_dir/annotations` (JSON).
#[derive(Debug, Clone)]
pub struct FileGateway {
    source_dir: PathBuf,
    output_dir: PathBuf,
    render_scale: f32,
}

impl FileGateway {
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, render_scale: f32) -> Self {
        Self { source_dir: source_dir.into(), output_dir: output_dir.into(), render_scale }
    }

    /// Write into the platform's local data directory
    pub fn from_default_project(source_dir: impl Into<PathBuf>, render_scale: f32) -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "PdfMarkup", "PdfMarkup").ok_or(StorageError::NoDataDirectory)?;

        Ok(Self::new(source_dir, dirs.data_local_dir().join("exports"), render_scale))
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Save with the current local time as the artifact timestamp
    pub fn save_files(&self, request: &SaveRequest) -> Result<SavedArtifacts, StorageError> {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.save_files_at(request, &timestamp)
    }

    pub fn save_files_at(&self, request: &SaveRequest, timestamp: &str) -> Result<SavedArtifacts, StorageError> {
        validate_filename(&request.filename)?;

        let source = self.source_dir.join(&request.filename);
        if !source.is_file() {
            return Err(StorageError::SourceNotFound(source));
        }

        let base = Path::new(&request.filename)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&request.filename);

        let annotations_dir = self.output_dir.join("annotations");
        fs::create_dir_all(&annotations_dir)?;

        let annotations_path = annotations_dir.join(format!("{base}_annotations_{timestamp}.json"));
        fs::write(&annotations_path, serde_json::to_vec_pretty(&request.annotations)?)?;

        let pdf_path = self.output_dir.join(format!("annotated_{base}_{timestamp}.pdf"));
        let mut doc = Document::load(&source)?;
        let AnnotationWriteSummary { written, skipped } =
            annotate_document(&mut doc, &request.annotations, self.render_scale)?;
        doc.save(&pdf_path)?;

        tracing::info!(
            pdf = %pdf_path.display(),
            annotations = %annotations_path.display(),
            written,
            skipped,
            "annotations exported"
        );

        Ok(SavedArtifacts { annotations_path, pdf_path, written, skipped })
    }
}

impl PersistenceGateway for FileGateway {
    fn save(&self, request: &SaveRequest) -> PersistenceResult<ArtifactReference> {
        let saved = self.save_files(request)?;
        Ok(ArtifactReference::new(saved.pdf_path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_engine::blank_document;
    use pdf_markup_core::{Annotation, Color, PageSize, PersistenceError, Rect};

    fn gateway_with_source(temp: &Path) -> FileGateway {
        let source_dir = temp.join("uploads");
        fs::create_dir_all(&source_dir).expect("source dir should be created");
        let bytes = blank_document(&[PageSize { width: 612.0, height: 792.0 }]).expect("fixture should serialize");
        fs::write(source_dir.join("report.pdf"), bytes).expect("fixture should be written");

        FileGateway::new(source_dir, temp.join("out"), 1.5)
    }

    fn sample_request() -> SaveRequest {
        SaveRequest::new(
            "report.pdf",
            vec![
                Annotation::highlight(Some(1), Rect::new(10.0, 10.0, 50.0, 20.0), Color::YELLOW, 0.3),
                Annotation::highlight(None, Rect::new(10.0, 10.0, 50.0, 20.0), Color::YELLOW, 0.3),
            ],
        )
    }

    #[test]
    fn writes_json_and_annotated_pdf() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let gateway = gateway_with_source(temp.path());

        let saved = gateway.save_files_at(&sample_request(), "20240101120000").expect("save should succeed");

        assert!(saved.annotations_path.ends_with("annotations/report_annotations_20240101120000.json"));
        assert!(saved.pdf_path.ends_with("annotated_report_20240101120000.pdf"));
        assert_eq!((saved.written, saved.skipped), (1, 1));

        let json = fs::read(&saved.annotations_path).expect("json should exist");
        let loaded = Annotation::list_from_json(&json).expect("json should parse");
        assert_eq!(loaded, sample_request().annotations);

        let doc = Document::load(&saved.pdf_path).expect("annotated pdf should parse");
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn repeated_save_is_idempotent() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let gateway = gateway_with_source(temp.path());
        let request = sample_request();

        let first = gateway.save_files_at(&request, "20240101120000").expect("first save");
        let first_json = fs::read(&first.annotations_path).expect("json should exist");
        let second = gateway.save_files_at(&request, "20240101120000").expect("second save");

        assert_eq!(first, second);
        assert_eq!(fs::read(&second.annotations_path).expect("json should exist"), first_json);
    }

    #[test]
    fn rejects_unsafe_filename() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let gateway = gateway_with_source(temp.path());

        let err = gateway.save(&SaveRequest::new("../report.pdf", Vec::new())).expect_err("should reject");
        assert!(matches!(err, PersistenceError::Rejected(_)));
        assert!(!temp.path().join("out").exists());
    }

    #[test]
    fn missing_source_is_rejected() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let gateway = gateway_with_source(temp.path());

        let err = gateway.save_files(&SaveRequest::new("absent.pdf", Vec::new())).expect_err("should fail");
        assert!(matches!(err, StorageError::SourceNotFound(_)));
    }

    #[test]
    fn gateway_reports_pdf_path_as_artifact() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let gateway = gateway_with_source(temp.path());

        let artifact = gateway.save(&sample_request()).expect("save should succeed");
        assert!(artifact.as_str().contains("annotated_report_"));
        assert!(Path::new(artifact.as_str()).is_file());
    }
}
