//! Orquestación del pipeline documento → grafo.
//!
//! Etapas: carga → troceado → extracción → almacenamiento, secuenciales
//! sobre la colección completa. Ninguna etapa se reintenta automáticamente:
//! el primer fallo se envuelve con su etapa y se devuelve al llamante. La
//! única frontera de durabilidad es la transacción por GraphDocument del
//! almacén: los chunks confirmados antes de un fallo posterior permanecen.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use neo4rs::Graph;
use tracing::info;

use crate::app_state::Status;
use crate::chunker::TokenSplitter;
use crate::config::AppConfig;
use crate::error::{KgError, PipelineError, PipelineStage};
use crate::extractor::GraphExtractor;
use crate::graph_store;
use crate::loader;
use crate::models::meta;

/// Resumen de una ejecución completa del pipeline.
#[derive(Debug, Default)]
pub struct PipelineSummary {
    pub documents_loaded: usize,
    pub chunks_created: usize,
    pub graph_documents_stored: usize,
    pub nodes_upserted: usize,
    pub relationships_upserted: usize,
}

impl fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Resumen: {} documentos cargados, {} chunks, {} documentos de grafo almacenados con {} nodos y {} relaciones.",
            self.documents_loaded,
            self.chunks_created,
            self.graph_documents_stored,
            self.nodes_upserted,
            self.relationships_upserted
        )
    }
}

/// Ejecuta el pipeline completo sobre un directorio de origen.
pub async fn run_pipeline(
    graph: &Graph,
    extractor: &GraphExtractor,
    cfg: &AppConfig,
    root: &Path,
    status_arc: Arc<Mutex<Status>>,
) -> Result<PipelineSummary, PipelineError> {
    let stage = |s: PipelineStage| move |e: KgError| PipelineError::new(s, e);
    let mut summary = PipelineSummary::default();

    // 1) Carga
    set_status(&status_arc, "Cargando documentos...", 0.0);
    let documents =
        loader::load_documents(root, cfg.load_policy).map_err(stage(PipelineStage::Loading))?;
    summary.documents_loaded = documents.len();
    info!("{} documentos cargados", documents.len());

    // 2) Troceado
    set_status(&status_arc, "Troceando documentos...", 0.05);
    let splitter = TokenSplitter::new(cfg.chunk_size_tokens, cfg.chunk_overlap_tokens)
        .map_err(stage(PipelineStage::Chunking))?;
    let chunks = splitter.split_documents(&documents);
    summary.chunks_created = chunks.len();
    info!("{} chunks generados", chunks.len());

    if chunks.is_empty() {
        set_status(&status_arc, "No hay documentos que ingerir.", 0.0);
        return Ok(summary);
    }

    // 3) Extracción
    let total = chunks.len();
    let mut graph_documents = Vec::with_capacity(total);
    for (i, chunk) in chunks.iter().enumerate() {
        let filename = chunk
            .metadata
            .get(meta::FILENAME)
            .map(String::as_str)
            .unwrap_or("?");
        set_status(
            &status_arc,
            &format!(
                "[{}/{}] Extrayendo conocimiento de '{}' (chunk {})...",
                i + 1,
                total,
                filename,
                chunk.index
            ),
            0.05 + 0.85 * (i as f32 / total as f32),
        );

        let doc = extractor
            .extract(chunk)
            .await
            .map_err(stage(PipelineStage::Extracting))?;
        graph_documents.push(doc);
    }

    // 4) Almacenamiento
    set_status(&status_arc, "Almacenando el grafo en Neo4j...", 0.9);
    let store_summary = graph_store::store(graph, &graph_documents, cfg.include_source)
        .await
        .map_err(stage(PipelineStage::Storing))?;
    summary.graph_documents_stored = store_summary.documents_stored;
    summary.nodes_upserted = store_summary.nodes_upserted;
    summary.relationships_upserted = store_summary.relationships_upserted;

    set_status(&status_arc, "Pipeline completado.", 1.0);
    info!("{summary}");
    Ok(summary)
}

fn set_status(status_arc: &Arc<Mutex<Status>>, message: &str, progress: f32) {
    let mut status = status_arc.lock().unwrap();
    status.message = message.to_string();
    status.progress = progress;
}
