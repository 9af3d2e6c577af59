//! Persistencia del grafo extraído en Neo4j.
//!
//! Upsert idempotente por identidad: nodos por (etiqueta, id), relaciones
//! por (origen, destino, tipo). Cada GraphDocument se escribe en su propia
//! transacción: o se confirman todos sus nodos, relaciones y enlaces de
//! procedencia, o ninguno.

use std::fmt;

use chrono::Utc;
use neo4rs::{query, Graph, Txn};
use sha2::{Digest, Sha256};
use tracing::info;
use url::Url;

use crate::config::AppConfig;
use crate::error::KgError;
use crate::models::{Chunk, GraphDocument, GraphNode, GraphRelationship, BASE_LABEL};

/// Resumen de una operación de almacenamiento.
#[derive(Debug, Default)]
pub struct StoreSummary {
    pub documents_stored: usize,
    pub nodes_upserted: usize,
    pub relationships_upserted: usize,
}

impl fmt::Display for StoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documentos de grafo almacenados, {} nodos y {} relaciones fusionados.",
            self.documents_stored, self.nodes_upserted, self.relationships_upserted
        )
    }
}

pub async fn connect_from_config(cfg: &AppConfig) -> Result<Graph, KgError> {
    let url = Url::parse(&cfg.neo4j_uri)
        .map_err(|e| KgError::Configuration(format!("NEO4J_URI inválida: {e}")))?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr}...");
    let graph = Graph::new(&addr, &cfg.neo4j_user, &cfg.neo4j_password)
        .await
        .map_err(KgError::StoreUnavailable)?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Crea los constraints de las etiquetas fijas del pipeline.
/// Los nodos de entidad no llevan constraint global de id: su identidad es
/// (etiqueta, id) y dos etiquetas distintas pueden compartir id.
pub async fn ensure_schema(graph: &Graph) -> Result<(), KgError> {
    let statements = [
        // Document.id único (procedencia de chunks)
        "CREATE CONSTRAINT doc_id IF NOT EXISTS
         FOR (d:Document)
         REQUIRE d.id IS UNIQUE",
    ];

    for stmt in statements {
        graph
            .run(query(stmt))
            .await
            .map_err(KgError::StoreUnavailable)?;
    }

    info!("Esquema de Neo4j asegurado (constraints básicos creados).");
    Ok(())
}

/// Persiste una colección de GraphDocuments. Con `include_source`, cada
/// chunk de origen se guarda como nodo :Document con aristas MENTIONS
/// hacia todos sus nodos extraídos.
pub async fn store(
    graph: &Graph,
    documents: &[GraphDocument],
    include_source: bool,
) -> Result<StoreSummary, KgError> {
    let mut summary = StoreSummary::default();

    for doc in documents {
        let tx = graph.start_txn().await.map_err(KgError::StoreUnavailable)?;

        for node in &doc.nodes {
            upsert_node(&tx, node).await?;
        }
        for rel in &doc.relationships {
            upsert_relationship(&tx, rel).await?;
        }
        if include_source {
            upsert_provenance(&tx, doc).await?;
        }

        tx.commit().await.map_err(KgError::StoreUnavailable)?;

        summary.documents_stored += 1;
        summary.nodes_upserted += doc.nodes.len();
        summary.relationships_upserted += doc.relationships.len();
    }

    info!("{summary}");
    Ok(summary)
}

/// MERGE por (etiqueta, id); SET funde propiedades (claves nuevas se añaden,
/// existentes se sobreescriben). La etiqueta base se aplica siempre.
async fn upsert_node(tx: &Txn, node: &GraphNode) -> Result<(), KgError> {
    let label = cypher_identifier(&node.label);
    let mut cypher = format!("MERGE (n:`{label}` {{id: $id}}) SET n:`{BASE_LABEL}`");

    let mut q;
    {
        let props: Vec<_> = node.properties.iter().collect();
        for (i, (key, _)) in props.iter().enumerate() {
            cypher.push_str(&format!(", n.`{}` = $p{i}", cypher_identifier(key)));
        }
        q = query(&cypher).param("id", node.id.clone());
        for (i, (_, value)) in props.iter().enumerate() {
            q = q.param(&format!("p{i}"), value.to_string());
        }
    }

    tx.run(q).await.map_err(KgError::StoreUnavailable)
}

/// MERGE por (identidad origen, identidad destino, tipo), con la misma
/// política de fusión de propiedades que los nodos.
async fn upsert_relationship(tx: &Txn, rel: &GraphRelationship) -> Result<(), KgError> {
    let source_label = cypher_identifier(&rel.source_label);
    let target_label = cypher_identifier(&rel.target_label);
    let rel_type = cypher_identifier(&rel.rel_type);

    let mut cypher = format!(
        "MATCH (s:`{source_label}` {{id: $sid}}), (t:`{target_label}` {{id: $tid}})
         MERGE (s)-[r:`{rel_type}`]->(t)"
    );

    let mut q;
    {
        let props: Vec<_> = rel.properties.iter().collect();
        for (i, (key, _)) in props.iter().enumerate() {
            let set = if i == 0 { " SET" } else { "," };
            cypher.push_str(&format!("{set} r.`{}` = $p{i}", cypher_identifier(key)));
        }
        q = query(&cypher)
            .param("sid", rel.source_id.clone())
            .param("tid", rel.target_id.clone());
        for (i, (_, value)) in props.iter().enumerate() {
            q = q.param(&format!("p{i}"), value.to_string());
        }
    }

    tx.run(q).await.map_err(KgError::StoreUnavailable)
}

/// Nodo :Document por chunk de origen, con id estable derivado del
/// contenido, y una arista MENTIONS hacia cada nodo extraído.
async fn upsert_provenance(tx: &Txn, doc: &GraphDocument) -> Result<(), KgError> {
    let chunk = &doc.source;
    let doc_id = chunk_provenance_id(chunk);

    let mut cypher = String::from(
        "MERGE (d:Document {id: $id})
         SET d.text = $text, d.ingested_at = datetime($ingested_at)",
    );
    let mut q;
    {
        let entries: Vec<_> = chunk.metadata.iter().collect();
        for (i, (key, _)) in entries.iter().enumerate() {
            cypher.push_str(&format!(", d.`{}` = $m{i}", cypher_identifier(key)));
        }
        q = query(&cypher)
            .param("id", doc_id.clone())
            .param("text", chunk.text.clone())
            .param("ingested_at", Utc::now().to_rfc3339());
        for (i, (_, value)) in entries.iter().enumerate() {
            q = q.param(&format!("m{i}"), value.to_string());
        }
    }
    tx.run(q).await.map_err(KgError::StoreUnavailable)?;

    for node in &doc.nodes {
        let label = cypher_identifier(&node.label);
        let cypher = format!(
            "MATCH (d:Document {{id: $did}}), (n:`{label}` {{id: $nid}})
             MERGE (d)-[:MENTIONS]->(n)"
        );
        tx.run(
            query(&cypher)
                .param("did", doc_id.clone())
                .param("nid", node.id.clone()),
        )
        .await
        .map_err(KgError::StoreUnavailable)?;
    }

    Ok(())
}

/// Id estable de procedencia: hash del texto del chunk más sus metadatos.
/// Reingerir el mismo contenido reutiliza el mismo nodo :Document.
pub fn chunk_provenance_id(chunk: &Chunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.text.as_bytes());
    for (key, value) in &chunk.metadata {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Etiquetas, tipos de relación y claves de propiedad se interpolan en el
/// Cypher (no admiten parámetros), así que se restringen a un identificador
/// seguro: alfanuméricos y guión bajo; los espacios pasan a guión bajo.
fn cypher_identifier(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn identifiers_are_restricted_to_safe_characters() {
        assert_eq!(cypher_identifier("Person"), "Person");
        assert_eq!(cypher_identifier("WORKS AT"), "WORKS_AT");
        assert_eq!(cypher_identifier("Mal`icioso {x}"), "Malicioso_x");
        assert_eq!(cypher_identifier("   "), "_");
    }

    #[test]
    fn provenance_id_is_stable_for_identical_chunks() {
        let mut metadata = BTreeMap::new();
        metadata.insert("filename".to_string(), "informe.pdf".to_string());
        let chunk = Chunk {
            text: "el mismo texto".to_string(),
            metadata: metadata.clone(),
            index: 0,
        };
        let again = Chunk {
            text: "el mismo texto".to_string(),
            metadata,
            index: 0,
        };
        assert_eq!(chunk_provenance_id(&chunk), chunk_provenance_id(&again));
    }

    // --- Tests contra un Neo4j real ---
    // Requieren una instancia accesible vía NEO4J_URI/NEO4J_USER/NEO4J_PASSWORD.
    // Ejecutar con: cargo test -- --ignored

    async fn live_graph() -> Graph {
        let uri = std::env::var("NEO4J_URI").unwrap_or_else(|_| "127.0.0.1:7687".to_string());
        let addr = uri
            .trim_start_matches("neo4j://")
            .trim_start_matches("bolt://")
            .to_string();
        let user = std::env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string());
        let password = std::env::var("NEO4J_PASSWORD").unwrap_or_else(|_| "password".to_string());
        Graph::new(&addr, &user, &password)
            .await
            .expect("Neo4j no accesible para el test de integración")
    }

    async fn count(graph: &Graph, cypher: &str) -> i64 {
        let mut cursor = graph.execute(query(cypher)).await.unwrap();
        let row = cursor.next().await.unwrap().unwrap();
        row.get::<i64>("c").unwrap()
    }

    fn sample_doc(label: &str) -> GraphDocument {
        let mut props = BTreeMap::new();
        props.insert("sector".to_string(), "tech".to_string());
        GraphDocument {
            nodes: vec![
                GraphNode {
                    id: "Alice".to_string(),
                    label: label.to_string(),
                    properties: BTreeMap::new(),
                },
                GraphNode {
                    id: "Acme".to_string(),
                    label: label.to_string(),
                    properties: props,
                },
            ],
            relationships: vec![GraphRelationship {
                source_id: "Alice".to_string(),
                source_label: label.to_string(),
                target_id: "Acme".to_string(),
                target_label: label.to_string(),
                rel_type: "WORKS_AT".to_string(),
                properties: BTreeMap::new(),
            }],
            source: Chunk {
                text: "Alice trabaja en Acme".to_string(),
                metadata: BTreeMap::new(),
                index: 0,
            },
        }
    }

    #[tokio::test]
    #[ignore]
    async fn storing_the_same_document_twice_is_idempotent() {
        let graph = live_graph().await;
        let label = "IdemTestEntity";
        graph
            .run(query(&format!("MATCH (n:`{label}`) DETACH DELETE n")))
            .await
            .unwrap();

        let doc = sample_doc(label);
        store(&graph, std::slice::from_ref(&doc), true).await.unwrap();
        let nodes_once = count(&graph, &format!("MATCH (n:`{label}`) RETURN count(n) AS c")).await;
        let rels_once = count(
            &graph,
            &format!("MATCH (:`{label}`)-[r:WORKS_AT]->(:`{label}`) RETURN count(r) AS c"),
        )
        .await;

        store(&graph, std::slice::from_ref(&doc), true).await.unwrap();
        let nodes_twice = count(&graph, &format!("MATCH (n:`{label}`) RETURN count(n) AS c")).await;
        let rels_twice = count(
            &graph,
            &format!("MATCH (:`{label}`)-[r:WORKS_AT]->(:`{label}`) RETURN count(r) AS c"),
        )
        .await;

        assert_eq!(nodes_once, 2);
        assert_eq!(nodes_once, nodes_twice);
        assert_eq!(rels_once, 1);
        assert_eq!(rels_once, rels_twice);
    }

    #[tokio::test]
    #[ignore]
    async fn overlapping_identity_merges_the_property_union() {
        let graph = live_graph().await;
        let label = "MergeTestEntity";
        graph
            .run(query(&format!("MATCH (n:`{label}`) DETACH DELETE n")))
            .await
            .unwrap();

        let mut first = BTreeMap::new();
        first.insert("sector".to_string(), "tech".to_string());
        let mut second = BTreeMap::new();
        second.insert("pais".to_string(), "ES".to_string());

        for props in [first, second] {
            let doc = GraphDocument {
                nodes: vec![GraphNode {
                    id: "Acme".to_string(),
                    label: label.to_string(),
                    properties: props,
                }],
                relationships: Vec::new(),
                source: Chunk {
                    text: "Acme".to_string(),
                    metadata: BTreeMap::new(),
                    index: 0,
                },
            };
            store(&graph, &[doc], false).await.unwrap();
        }

        let merged = count(
            &graph,
            &format!(
                "MATCH (n:`{label}` {{id: 'Acme'}})
                 WHERE n.sector = 'tech' AND n.pais = 'ES'
                 RETURN count(n) AS c"
            ),
        )
        .await;
        let total = count(&graph, &format!("MATCH (n:`{label}`) RETURN count(n) AS c")).await;
        assert_eq!(merged, 1);
        assert_eq!(total, 1);
    }

    #[test]
    fn provenance_id_depends_on_metadata() {
        let chunk = Chunk {
            text: "texto".to_string(),
            metadata: BTreeMap::new(),
            index: 0,
        };
        let mut metadata = BTreeMap::new();
        metadata.insert("chunk_index".to_string(), "1".to_string());
        let other = Chunk {
            text: "texto".to_string(),
            metadata,
            index: 1,
        };
        assert_ne!(chunk_provenance_id(&chunk), chunk_provenance_id(&other));
    }
}
