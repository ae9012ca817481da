//! Input resolution: find the folder of PDFs and list the documents in it.
//!
//! Where the folder comes from is a [`PathProvider`]: a fixed path from the
//! command line, the conventional `./my_pdfs` folder, or anything else a host
//! application supplies. Nothing here assumes an interactive environment.

use crate::error::Pdf2TsvError;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the conventional input folder.
pub const CONVENTIONAL_INPUT_DIR: &str = "my_pdfs";

/// Supplies the input directory, or `None` when it has none to offer.
pub trait PathProvider {
    fn input_dir(&self) -> Option<PathBuf>;
}

/// Always yields the given path.
#[derive(Debug, Clone)]
pub struct FixedPath(pub PathBuf);

impl PathProvider for FixedPath {
    fn input_dir(&self) -> Option<PathBuf> {
        Some(self.0.clone())
    }
}

/// Yields `<base>/my_pdfs` when that folder exists.
#[derive(Debug, Clone)]
pub struct ConventionalPath {
    pub base: PathBuf,
}

impl PathProvider for ConventionalPath {
    fn input_dir(&self) -> Option<PathBuf> {
        let dir = self.base.join(CONVENTIONAL_INPUT_DIR);
        dir.is_dir().then_some(dir)
    }
}

/// First provider that yields a directory wins.
pub fn first_available(providers: &[&dyn PathProvider]) -> Option<PathBuf> {
    providers.iter().find_map(|p| p.input_dir())
}

/// Check if a path has a `.pdf` extension (any case).
pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// List the PDF files directly inside `dir`, sorted by file name.
///
/// Sorting fixes the processing order, which is also the record order of
/// the consolidated dataset.
pub fn discover_pdfs(dir: &Path) -> Result<Vec<PathBuf>, Pdf2TsvError> {
    if !dir.is_dir() {
        return Err(Pdf2TsvError::InputDirNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| {
        Pdf2TsvError::Internal(format!("cannot list '{}': {}", dir.display(), e))
    })?;

    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_pdf_path(p))
        .collect();
    pdfs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    debug!("Found {} PDFs in {}", pdfs.len(), dir.display());
    Ok(pdfs)
}

/// Document identifier used in reports and the provenance column: the file name.
pub fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Base name used for the per-document artifact: the file stem.
pub fn document_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// Artifact stem reserved for one document of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StemClaim {
    /// The stem belongs to this document alone.
    Owned(String),
    /// An earlier document of the batch already writes to this stem.
    Taken { stem: String, by: String },
}

/// Reserve one artifact stem per path, first come first served.
///
/// Stems compare case-insensitively: `x.pdf` and `x.PDF` would both write
/// `x.tsv`, and on a case-insensitive file system so would `X.pdf`.
pub fn claim_stems(paths: &[PathBuf]) -> Vec<StemClaim> {
    let mut owners: HashMap<String, String> = HashMap::new();
    paths
        .iter()
        .map(|path| {
            let stem = document_stem(path);
            match owners.entry(stem.to_lowercase()) {
                Entry::Occupied(owner) => StemClaim::Taken {
                    stem,
                    by: owner.get().clone(),
                },
                Entry::Vacant(slot) => {
                    slot.insert(document_name(path));
                    StemClaim::Owned(stem)
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_pdf_path() {
        assert!(is_pdf_path(Path::new("a.pdf")));
        assert!(is_pdf_path(Path::new("/x/B.PDF")));
        assert!(!is_pdf_path(Path::new("a.tsv")));
        assert!(!is_pdf_path(Path::new("pdf")));
    }

    #[test]
    fn discover_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.PDF", "notes.txt", "c.pdf"] {
            std::fs::write(dir.path().join(name), b"%PDF").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.pdf")).unwrap();

        let found = discover_pdfs(dir.path()).unwrap();
        let names: Vec<String> = found.iter().map(|p| document_name(p)).collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf", "c.pdf"]);
    }

    #[test]
    fn discover_missing_dir() {
        let err = discover_pdfs(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, Pdf2TsvError::InputDirNotFound { .. }));
    }

    #[test]
    fn names_and_stems() {
        let p = Path::new("/in/remesa 01.pdf");
        assert_eq!(document_name(p), "remesa 01.pdf");
        assert_eq!(document_stem(p), "remesa 01");
    }

    #[test]
    fn path_providers() {
        let dir = tempfile::tempdir().unwrap();
        let conventional = ConventionalPath {
            base: dir.path().to_path_buf(),
        };
        assert_eq!(conventional.input_dir(), None);

        std::fs::create_dir(dir.path().join(CONVENTIONAL_INPUT_DIR)).unwrap();
        assert_eq!(
            conventional.input_dir(),
            Some(dir.path().join(CONVENTIONAL_INPUT_DIR))
        );

        let fixed = FixedPath(PathBuf::from("/data"));
        assert_eq!(
            first_available(&[&fixed, &conventional]),
            Some(PathBuf::from("/data"))
        );
        assert_eq!(
            first_available(&[&conventional]),
            Some(dir.path().join(CONVENTIONAL_INPUT_DIR))
        );
    }

    #[test]
    fn stems_differing_only_in_case_are_claimed_once() {
        let paths: Vec<PathBuf> = ["/in/x.PDF", "/in/x.pdf", "/in/y.pdf", "/in/X.pdf"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let claims = claim_stems(&paths);
        assert_eq!(claims[0], StemClaim::Owned("x".into()));
        assert_eq!(
            claims[1],
            StemClaim::Taken {
                stem: "x".into(),
                by: "x.PDF".into()
            }
        );
        assert_eq!(claims[2], StemClaim::Owned("y".into()));
        assert!(matches!(claims[3], StemClaim::Taken { ref by, .. } if by == "x.PDF"));
    }
}
