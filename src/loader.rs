//! Carga de documentos desde un directorio: PDF y DOCX.
//!
//! El escaneo no es recursivo; cualquier otra extensión se omite sin error.
//! Un PDF produce un RawDocument por página (con número de página en los
//! metadatos); un DOCX produce uno por fichero.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use mime_guess::MimeGuess;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::LoadPolicy;
use crate::error::KgError;
use crate::models::{meta, RawDocument};

/// Escanea `root` (sin descender a subdirectorios) y extrae el texto de los
/// ficheros `.pdf` y `.docx`. Los ficheros ilegibles se tratan según la
/// política: `FailFast` aborta la carga, `SkipAndWarn` avisa y continúa.
pub fn load_documents(root: &Path, policy: LoadPolicy) -> Result<Vec<RawDocument>, KgError> {
    if !root.is_dir() {
        return Err(KgError::io(
            root.display().to_string(),
            io::Error::new(io::ErrorKind::NotFound, "la ruta no es un directorio"),
        ));
    }

    let mut documents = Vec::new();
    let entries = WalkDir::new(root)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file());

    for entry in entries {
        let path = entry.path();
        let extension = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("")
            .to_lowercase();

        let loaded = match extension.as_str() {
            "pdf" => load_pdf(path),
            "docx" => load_docx(path),
            _ => {
                info!(
                    "Saltando fichero con extensión no soportada ('.{}'): {}",
                    extension,
                    path.display()
                );
                continue;
            }
        };

        match loaded {
            Ok(docs) => documents.extend(docs),
            Err(err) => match policy {
                LoadPolicy::FailFast => return Err(err),
                LoadPolicy::SkipAndWarn => {
                    warn!("Saltando fichero ilegible {}: {}", path.display(), err);
                }
            },
        }
    }

    info!("{} documentos cargados desde {}", documents.len(), root.display());
    Ok(documents)
}

/// Extrae el texto de un PDF página a página, un RawDocument por página.
fn load_pdf(path: &Path) -> Result<Vec<RawDocument>, KgError> {
    let pages = pdf_extract::extract_text_by_pages(path)
        .map_err(|e| unreadable(path, e.to_string()))?;

    let total_pages = pages.len();
    let documents = pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(page_idx, text)| {
            let mut metadata = base_metadata(path);
            metadata.insert(meta::PAGE.to_string(), (page_idx + 1).to_string());
            metadata.insert(meta::TOTAL_PAGES.to_string(), total_pages.to_string());
            RawDocument { text, metadata }
        })
        .collect();
    Ok(documents)
}

/// Extrae el texto de un DOCX recorriendo párrafos y runs.
fn load_docx(path: &Path) -> Result<Vec<RawDocument>, KgError> {
    let bytes = fs::read(path).map_err(|e| KgError::io(path.display().to_string(), e))?;
    let docx = docx_rs::read_docx(&bytes).map_err(|e| unreadable(path, e.to_string()))?;

    let mut text = String::new();
    for child in docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            for child in paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(t) = child {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            text.push('\n');
        }
    }

    if text.trim().is_empty() {
        warn!("Fichero vacío o sin texto útil: {}", path.display());
        return Ok(Vec::new());
    }

    Ok(vec![RawDocument {
        text,
        metadata: base_metadata(path),
    }])
}

fn base_metadata(path: &Path) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    let filename = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    metadata.insert(meta::FILENAME.to_string(), filename);
    metadata.insert(meta::PATH.to_string(), path.to_string_lossy().to_string());
    if let Some(mime) = MimeGuess::from_path(path).first() {
        metadata.insert(meta::MIME_TYPE.to_string(), mime.to_string());
    }
    metadata
}

fn unreadable(path: &Path, detail: String) -> KgError {
    KgError::io(
        path.display().to_string(),
        io::Error::new(io::ErrorKind::InvalidData, detail),
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_directory_is_an_io_error() {
        let err = load_documents(Path::new("/no/existe"), LoadPolicy::SkipAndWarn).unwrap_err();
        assert!(matches!(err, KgError::Io { .. }));
    }

    #[test]
    fn unsupported_extensions_are_skipped_without_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notas.txt"), "texto plano").unwrap();
        fs::write(dir.path().join("apuntes.md"), "# markdown").unwrap();

        let docs = load_documents(dir.path(), LoadPolicy::SkipAndWarn).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn subdirectories_are_not_scanned() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("interior");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("roto.pdf"), b"esto no es un pdf").unwrap();

        // Con FailFast, un PDF ilegible abortaría: si no aborta, no se leyó.
        let docs = load_documents(dir.path(), LoadPolicy::FailFast).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn docx_files_yield_a_document_with_source_metadata() {
        use docx_rs::{Docx, Paragraph, Run};

        let dir = tempdir().unwrap();
        let path = dir.path().join("acta.docx");
        let file = fs::File::create(&path).unwrap();
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Alice trabaja en Acme")))
            .build()
            .pack(file)
            .unwrap();
        fs::write(dir.path().join("notas.txt"), "ignorado").unwrap();

        let docs = load_documents(dir.path(), LoadPolicy::FailFast).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].text.contains("Alice trabaja en Acme"));
        assert_eq!(docs[0].metadata[meta::FILENAME], "acta.docx");
        assert!(docs[0].metadata[meta::PATH].ends_with("acta.docx"));
    }

    #[test]
    fn unreadable_file_respects_the_load_policy() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("roto.pdf"), b"esto no es un pdf").unwrap();

        let err = load_documents(dir.path(), LoadPolicy::FailFast).unwrap_err();
        assert!(matches!(err, KgError::Io { .. }));

        let docs = load_documents(dir.path(), LoadPolicy::SkipAndWarn).unwrap();
        assert!(docs.is_empty());
    }
}
