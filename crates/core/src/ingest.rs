use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::models::Document;
use crate::IngestError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    Ok(digest_bytes(&bytes))
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub checksum: String,
}

/// Writes an uploaded payload into `upload_dir` under the file-name part of
/// `filename`. An existing file with the same name is overwritten.
pub fn save_upload(
    upload_dir: &Path,
    filename: &str,
    bytes: &[u8],
) -> Result<UploadedFile, IngestError> {
    let name = Path::new(filename.trim())
        .file_name()
        .ok_or_else(|| IngestError::MissingFileName(filename.to_string()))?;

    fs::create_dir_all(upload_dir)?;
    let path = upload_dir.join(name);
    fs::write(&path, bytes)?;

    Ok(UploadedFile {
        path,
        checksum: digest_bytes(bytes),
    })
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

pub fn load_pdfs<P: AsRef<Path>>(paths: &[P]) -> LoadReport {
    load_pdfs_with(&LopdfExtractor, paths)
}

/// One [`Document`] per page, in file order then page order. Missing and
/// unreadable files are skipped with a warning.
pub fn load_pdfs_with<X, P>(extractor: &X, paths: &[P]) -> LoadReport
where
    X: PdfExtractor,
    P: AsRef<Path>,
{
    let mut report = LoadReport::default();

    for path in paths {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "file not found, skipping");
            report.skipped.push(SkippedFile {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            });
            continue;
        }

        match load_one(extractor, path) {
            Ok(documents) => report.documents.extend(documents),
            Err(error) => {
                warn!(path = %path.display(), %error, "unreadable pdf, skipping");
                report.skipped.push(SkippedFile {
                    path: path.to_path_buf(),
                    reason: error.to_string(),
                });
            }
        }
    }

    report
}

fn load_one<X: PdfExtractor>(extractor: &X, path: &Path) -> Result<Vec<Document>, IngestError> {
    let source = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
        .to_string();
    let file_path = fs::canonicalize(path)?.to_string_lossy().to_string();

    Ok(extractor
        .extract_pages(path)?
        .into_iter()
        .map(|page| Document {
            text: page.text,
            source: source.clone(),
            file_path: file_path.clone(),
            page: page.number,
        })
        .collect())
}
