//! Modelos de dominio del pipeline (documentos, chunks y grafo extraído).

use std::collections::BTreeMap;

use serde::Serialize;

/// Etiqueta base que marca todo nodo producido por el pipeline,
/// independientemente de su tipo de entidad.
pub const BASE_LABEL: &str = "Entity";

/// Claves de metadatos de origen usadas por el cargador.
pub mod meta {
    pub const FILENAME: &str = "filename";
    pub const PATH: &str = "path";
    pub const MIME_TYPE: &str = "mime_type";
    pub const PAGE: &str = "page";
    pub const TOTAL_PAGES: &str = "total_pages";
    pub const CHUNK_INDEX: &str = "chunk_index";
}

/// Texto crudo extraído de un fichero, con sus metadatos de origen.
/// Un PDF multipágina produce un RawDocument por página.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

/// Trozo de texto acotado en tokens, con solapamiento respecto a sus
/// vecinos. Hereda los metadatos del documento padre más su índice.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub index: usize,
}

/// Nodo extraído: identidad = (label, id), estable entre ejecuciones.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub properties: BTreeMap<String, String>,
}

/// Relación dirigida entre dos nodos del mismo GraphDocument.
/// Las etiquetas de los extremos se resuelven durante la validación.
#[derive(Debug, Clone)]
pub struct GraphRelationship {
    pub source_id: String,
    pub source_label: String,
    pub target_id: String,
    pub target_label: String,
    pub rel_type: String,
    pub properties: BTreeMap<String, String>,
}

/// Unidad de salida de la extracción y unidad de transacción de
/// almacenamiento: los nodos y relaciones de un chunk, más el chunk.
#[derive(Debug, Clone)]
pub struct GraphDocument {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
    pub source: Chunk,
}

// --- Formas de visualización (API JSON) ---

/// Nodo del diagrama nodo-enlace: etiqueta visible + título al pasar el ratón.
#[derive(Debug, Clone, Serialize)]
pub struct VizNode {
    pub id: String,
    pub label: String,
    pub title: String,
}

/// Arista dirigida del diagrama, etiquetada con el tipo de la relación.
#[derive(Debug, Clone, Serialize)]
pub struct VizEdge {
    pub source: String,
    pub target: String,
    pub label: String,
}

/// Lista genérica de nodos y aristas, reconstruida en cada consulta.
/// No se persiste; cualquier superficie de renderizado la puede consumir.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VisualizationGraph {
    pub nodes: Vec<VizNode>,
    pub edges: Vec<VizEdge>,
}

/// Entrada del árbol de ficheros que muestra el selector de directorios.
#[derive(Debug, Clone, Serialize)]
pub struct FileTreeNode {
    pub path: std::path::PathBuf,
    pub name: String,
    pub is_dir: bool,
    pub children: Vec<FileTreeNode>,
}
