//! Taxonomía de errores tipados del pipeline.
//!
//! Cada etapa falla rápido con su variante correspondiente; el orquestador
//! los envuelve en `PipelineError` con la etapa que falló. El reintento,
//! si se desea, es responsabilidad del llamante (`is_retryable`).

use std::fmt;

use thiserror::Error;

/// Errores del dominio documento → grafo.
#[derive(Error, Debug)]
pub enum KgError {
    /// Fallo del sistema de archivos (directorio inexistente, fichero ilegible).
    #[error("error de E/S en '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuración inválida (solapamiento >= tamaño de chunk, credenciales ausentes).
    #[error("configuración inválida: {0}")]
    Configuration(String),

    /// Salida mal formada del modelo de extracción.
    #[error("salida de extracción mal formada: {0}")]
    Extraction(String),

    /// Neo4j inalcanzable o fallo de escritura. Reintentable por el llamante.
    #[error("base de datos de grafos no disponible: {0}")]
    StoreUnavailable(#[source] neo4rs::Error),

    /// Consulta de visualización mal formada o con filas incompletas.
    #[error("consulta de visualización inválida: {0}")]
    Query(String),
}

impl KgError {
    /// Construye un error de E/S con la ruta que lo provocó.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Indica si el llamante puede reintentar la operación tal cual.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

/// Etapas del pipeline, en orden de ejecución.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Loading,
    Chunking,
    Extracting,
    Storing,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loading => "carga",
            Self::Chunking => "troceado",
            Self::Extracting => "extracción",
            Self::Storing => "almacenamiento",
        };
        f.write_str(name)
    }
}

/// Fallo terminal de una ejecución del pipeline: etapa + causa.
#[derive(Error, Debug)]
#[error("fallo del pipeline en la etapa de {stage}: {source}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    #[source]
    pub source: KgError,
}

impl PipelineError {
    pub fn new(stage: PipelineStage, source: KgError) -> Self {
        Self { stage, source }
    }
}
