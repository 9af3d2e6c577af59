//! Troceado de documentos en ventanas de tokens con solapamiento fijo.
//!
//! Tokenización determinista por palabras (split en espacios en blanco):
//! cada ventana tiene como máximo `chunk_size` tokens y comparte exactamente
//! `overlap` tokens con la ventana anterior.

use crate::error::KgError;
use crate::models::{meta, Chunk, RawDocument};

/// Divisor de texto en ventanas de tokens.
#[derive(Debug, Clone)]
pub struct TokenSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl TokenSplitter {
    /// Crea un divisor validando que `overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, KgError> {
        if chunk_size == 0 {
            return Err(KgError::Configuration(
                "el tamaño de chunk debe ser mayor que cero".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(KgError::Configuration(format!(
                "el solapamiento ({overlap}) debe ser menor que el tamaño de chunk ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Trocea cada documento y propaga sus metadatos a cada chunk,
    /// añadiendo un índice de chunk en base 0.
    pub fn split_documents(&self, documents: &[RawDocument]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            for (index, text) in self.split_text(&doc.text).into_iter().enumerate() {
                let mut metadata = doc.metadata.clone();
                metadata.insert(meta::CHUNK_INDEX.to_string(), index.to_string());
                chunks.push(Chunk {
                    text,
                    metadata,
                    index,
                });
            }
        }
        chunks
    }

    /// Ventanas consecutivas de `chunk_size` tokens; cada ventana posterior
    /// a la primera empieza `chunk_size - overlap` tokens después de la
    /// anterior. La unión de los tramos no solapados reconstruye la
    /// secuencia original de tokens.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        let step = self.chunk_size - self.overlap;
        let mut windows = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(tokens.len());
            windows.push(tokens[start..end].join(" "));
            if end == tokens.len() {
                break;
            }
            start += step;
        }
        windows
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = TokenSplitter::new(100, 150).unwrap_err();
        assert!(matches!(err, KgError::Configuration(_)));
        assert!(TokenSplitter::new(100, 100).is_err());
        assert!(TokenSplitter::new(100, 99).is_ok());
    }

    #[test]
    fn consecutive_windows_share_exactly_the_overlap() {
        let splitter = TokenSplitter::new(4, 1).unwrap();
        let chunks = splitter.split_text(&words(10));
        assert_eq!(chunks.len(), 3);
        for pair in chunks.windows(2) {
            let prev: Vec<&str> = pair[0].split_whitespace().collect();
            let next: Vec<&str> = pair[1].split_whitespace().collect();
            assert_eq!(prev[prev.len() - 1..], next[..1]);
        }
    }

    #[test]
    fn union_of_disjoint_spans_reconstructs_the_token_sequence() {
        let original = words(23);
        let splitter = TokenSplitter::new(5, 2).unwrap();
        let chunks = splitter.split_text(&original);

        let mut rebuilt: Vec<String> = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let tokens = chunk.split_whitespace().map(str::to_string);
            if i == 0 {
                rebuilt.extend(tokens);
            } else {
                rebuilt.extend(tokens.skip(2));
            }
        }
        assert_eq!(rebuilt.join(" "), original);
    }

    #[test]
    fn short_document_yields_a_single_chunk() {
        let splitter = TokenSplitter::new(100, 10).unwrap();
        let chunks = splitter.split_text("hola mundo");
        assert_eq!(chunks, vec!["hola mundo".to_string()]);
        assert!(splitter.split_text("   ").is_empty());
    }

    #[test]
    fn chunks_inherit_metadata_and_carry_an_index() {
        let mut metadata = BTreeMap::new();
        metadata.insert("filename".to_string(), "informe.pdf".to_string());
        metadata.insert("page".to_string(), "3".to_string());
        let doc = RawDocument {
            text: words(12),
            metadata,
        };

        let splitter = TokenSplitter::new(5, 1).unwrap();
        let chunks = splitter.split_documents(&[doc]);
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.metadata["filename"], "informe.pdf");
            assert_eq!(chunk.metadata["page"], "3");
            assert_eq!(chunk.metadata["chunk_index"], i.to_string());
        }
    }
}
