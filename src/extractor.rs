//! Extracción de entidades y relaciones de un chunk vía Rig.
//!
//! El modelo es una capacidad opaca: recibe texto y devuelve un único objeto
//! JSON con nodos y relaciones tipadas. La salida es no determinista entre
//! ejecuciones; lo que se valida aquí es la forma (ids presentes, integridad
//! referencial), nunca el contenido exacto.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::config::{AppConfig, LlmProvider};
use crate::error::KgError;
use crate::models::{Chunk, GraphDocument, GraphNode, GraphRelationship};

// --- Estructuras de la respuesta JSON del modelo ---

#[derive(Debug, Clone, Deserialize)]
pub struct JsonExtractedNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonExtractedRelationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExtractionResult {
    pub nodes: Vec<JsonExtractedNode>,
    pub relationships: Vec<JsonExtractedRelationship>,
}

const EXTRACTION_PROMPT: &str = r#"
Tu tarea es analizar el texto y extraer entidades y relaciones para un grafo de conocimiento.
- Identifica y clasifica entidades en una de estas categorías: 'Person', 'Organization', 'Location', 'Concept', 'Technology'.
- Identifica relaciones dirigidas entre esas entidades. El tipo debe ser un identificador conciso en mayúsculas (ej: 'WORKS_AT', 'PART_OF', 'LOCATED_IN').

La salida DEBE ser un único objeto JSON válido con dos claves: "nodes" y "relationships".
- "nodes": una lista de objetos, cada uno con "id" (nombre de la entidad), "type" y opcionalmente "properties" (pares clave-valor escalares).
- "relationships": una lista de objetos, cada uno con "source", "target", "type" y opcionalmente "properties". "source" y "target" deben ser ids presentes en "nodes".

Si no encuentras nada, devuelve listas vacías. No incluyas explicaciones, solo el JSON.
"#;

/// Extractor de grafos respaldado por un LLM, configurado una vez por proceso.
#[derive(Debug, Clone)]
pub struct GraphExtractor {
    pub provider: LlmProvider,
    pub chat_model: String,
}

impl GraphExtractor {
    /// Construye el extractor a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self, KgError> {
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        })
    }

    /// Extrae el GraphDocument de un chunk. Una salida mal formada
    /// (JSON inválido o relación con extremos inexistentes) rechaza el
    /// chunk completo con `KgError::Extraction`: nunca se almacena a medias.
    pub async fn extract(&self, chunk: &Chunk) -> Result<GraphDocument, KgError> {
        match self.provider {
            LlmProvider::OpenAI => {
                let response = self.prompt_openai(&chunk.text).await?;
                let parsed = parse_extraction_json(&response)?;
                graph_document_from_extraction(parsed, chunk.clone())
            }
            ref other => Err(KgError::Configuration(format!(
                "Proveedor LLM {other:?} aún no implementado para extracción"
            ))),
        }
    }

    async fn prompt_openai(&self, text: &str) -> Result<String, KgError> {
        use rig::client::CompletionClient as _;
        use rig::completion::Prompt;
        use rig::providers::openai;

        let client = openai::Client::from_env();
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let agent = client
            .agent(model_name)
            .preamble(EXTRACTION_PROMPT)
            .build();

        agent
            .prompt(text)
            .await
            .map_err(|e| KgError::Extraction(format!("fallo al invocar el modelo: {e}")))
    }
}

/// Limpia la respuesta del LLM (vallas de código) y la parsea.
pub fn parse_extraction_json(response: &str) -> Result<ExtractionResult, KgError> {
    let json_response = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str::<ExtractionResult>(json_response).map_err(|e| {
        KgError::Extraction(format!(
            "JSON inválido del modelo: {e}. Respuesta: '{}'",
            response.trim()
        ))
    })
}

/// Valida la salida parseada y la convierte en un GraphDocument:
/// etiqueta todos los nodos con la etiqueta base (vía almacenamiento),
/// resuelve las etiquetas de los extremos de cada relación y conserva el
/// chunk de origen como procedencia.
pub fn graph_document_from_extraction(
    parsed: ExtractionResult,
    chunk: Chunk,
) -> Result<GraphDocument, KgError> {
    let mut labels_by_id: HashMap<String, String> = HashMap::new();
    let mut nodes = Vec::with_capacity(parsed.nodes.len());

    for raw in parsed.nodes {
        let id = raw.id.trim().to_string();
        let label = raw.node_type.trim().to_string();
        if id.is_empty() || label.is_empty() {
            return Err(KgError::Extraction(
                "nodo sin id o sin tipo en la salida del modelo".to_string(),
            ));
        }
        // Mismo id repetido: el primero fija la etiqueta, el resto se funde.
        if labels_by_id.contains_key(&id) {
            continue;
        }
        labels_by_id.insert(id.clone(), label.clone());
        nodes.push(GraphNode {
            id,
            label,
            properties: scalar_properties(raw.properties),
        });
    }

    let mut relationships = Vec::with_capacity(parsed.relationships.len());
    for raw in parsed.relationships {
        let source_label = labels_by_id.get(raw.source.trim()).ok_or_else(|| {
            KgError::Extraction(format!(
                "la relación '{}' referencia un nodo inexistente: '{}'",
                raw.rel_type, raw.source
            ))
        })?;
        let target_label = labels_by_id.get(raw.target.trim()).ok_or_else(|| {
            KgError::Extraction(format!(
                "la relación '{}' referencia un nodo inexistente: '{}'",
                raw.rel_type, raw.target
            ))
        })?;
        let rel_type = raw.rel_type.trim().to_string();
        if rel_type.is_empty() {
            return Err(KgError::Extraction(
                "relación sin tipo en la salida del modelo".to_string(),
            ));
        }
        relationships.push(GraphRelationship {
            source_id: raw.source.trim().to_string(),
            source_label: source_label.clone(),
            target_id: raw.target.trim().to_string(),
            target_label: target_label.clone(),
            rel_type,
            properties: scalar_properties(raw.properties),
        });
    }

    Ok(GraphDocument {
        nodes,
        relationships,
        source: chunk,
    })
}

/// Conserva sólo propiedades escalares; listas y objetos anidados se
/// descartan con un aviso.
fn scalar_properties(raw: BTreeMap<String, Value>) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    for (key, value) in raw {
        match value {
            Value::String(s) => {
                properties.insert(key, s);
            }
            Value::Number(n) => {
                properties.insert(key, n.to_string());
            }
            Value::Bool(b) => {
                properties.insert(key, b.to_string());
            }
            Value::Null => {}
            other => {
                warn!("Descartando propiedad no escalar '{key}': {other}");
            }
        }
    }
    properties
}
