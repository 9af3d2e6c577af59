//! Visualización: ejecuta una consulta de sólo lectura y da forma al
//! resultado como lista genérica de nodos y aristas.
//!
//! Las filas deben devolver tripletas (s, r, t). La etiqueta visible de cada
//! nodo se resuelve con la cadena name → title → id; si el nodo no tiene
//! ninguna, se usa su id interno de grafo, de modo que la cadena es total.

use std::collections::HashSet;

use neo4rs::{query, Graph, Node, Relation};

use crate::error::KgError;
use crate::models::{VisualizationGraph, VizEdge, VizNode};

/// Consulta por defecto del visor: sólo nodos extraídos por el pipeline.
pub const DEFAULT_CYPHER: &str = "MATCH (s:Entity)-[r]->(t:Entity) RETURN s, r, t LIMIT 50";

/// Proyección mínima de un nodo de una fila de resultado.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub internal_id: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub id_prop: Option<String>,
}

/// Una fila (s, r, t) ya desacoplada del driver.
#[derive(Debug, Clone)]
pub struct TripleRow {
    pub source: NodeRecord,
    pub rel_type: String,
    pub target: NodeRecord,
}

/// Ejecuta la consulta y devuelve el grafo de visualización. Una consulta
/// mal formada o una fila sin los campos esperados falla con `Query` y
/// descarta cualquier resultado parcial.
pub async fn visualize(graph: &Graph, cypher: &str) -> Result<VisualizationGraph, KgError> {
    let mut cursor = graph
        .execute(query(cypher))
        .await
        .map_err(map_neo4j_error)?;

    let mut rows = Vec::new();
    while let Some(row) = cursor.next().await.map_err(map_neo4j_error)? {
        let source: Node = row
            .get("s")
            .ok_or_else(|| KgError::Query("fila sin el campo 's'".to_string()))?;
        let relation: Relation = row
            .get("r")
            .ok_or_else(|| KgError::Query("fila sin el campo 'r'".to_string()))?;
        let target: Node = row
            .get("t")
            .ok_or_else(|| KgError::Query("fila sin el campo 't'".to_string()))?;

        rows.push(TripleRow {
            source: node_record(&source),
            rel_type: relation.typ(),
            target: node_record(&target),
        });
    }

    Ok(build_visualization(rows))
}

fn node_record(node: &Node) -> NodeRecord {
    NodeRecord {
        internal_id: node.id().to_string(),
        name: node.get("name"),
        title: node.get("title"),
        id_prop: node.get("id"),
    }
}

fn map_neo4j_error(e: neo4rs::Error) -> KgError {
    if matches!(e, neo4rs::Error::ConnectionError) {
        KgError::StoreUnavailable(e)
    } else {
        KgError::Query(e.to_string())
    }
}

/// Nodos deduplicados por identidad, en orden de primera aparición;
/// una arista dirigida por fila, en el orden de las filas.
pub fn build_visualization(rows: Vec<TripleRow>) -> VisualizationGraph {
    let mut seen: HashSet<String> = HashSet::new();
    let mut graph = VisualizationGraph::default();

    for row in rows {
        for record in [&row.source, &row.target] {
            if seen.insert(record.internal_id.clone()) {
                graph.nodes.push(VizNode {
                    id: record.internal_id.clone(),
                    label: display_label(record),
                    title: hover_title(record),
                });
            }
        }
        graph.edges.push(VizEdge {
            source: row.source.internal_id.clone(),
            target: row.target.internal_id.clone(),
            label: row.rel_type,
        });
    }

    graph
}

/// Cadena de resolución: name → title → id → id interno.
fn display_label(record: &NodeRecord) -> String {
    record
        .name
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| record.title.clone().filter(|s| !s.is_empty()))
        .or_else(|| record.id_prop.clone().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| record.internal_id.clone())
}

/// El título al pasar el ratón muestra sólo el id.
fn hover_title(record: &NodeRecord) -> String {
    record
        .id_prop
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| record.internal_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(internal: &str, name: Option<&str>, title: Option<&str>, id: Option<&str>) -> NodeRecord {
        NodeRecord {
            internal_id: internal.to_string(),
            name: name.map(str::to_string),
            title: title.map(str::to_string),
            id_prop: id.map(str::to_string),
        }
    }

    #[test]
    fn shapes_a_works_at_row_like_the_viewer_contract() {
        let rows = vec![TripleRow {
            source: record("1", Some("Alice"), None, Some("1")),
            rel_type: "WORKS_AT".to_string(),
            target: record("2", None, Some("Acme"), Some("2")),
        }];

        let graph = build_visualization(rows);

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].id, "1");
        assert_eq!(graph.nodes[0].label, "Alice");
        assert_eq!(graph.nodes[0].title, "1");
        assert_eq!(graph.nodes[1].label, "Acme");
        assert_eq!(graph.nodes[1].title, "2");

        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].source, "1");
        assert_eq!(graph.edges[0].target, "2");
        assert_eq!(graph.edges[0].label, "WORKS_AT");
    }

    #[test]
    fn nodes_deduplicate_in_first_seen_order_and_edges_keep_row_order() {
        let alice = record("1", Some("Alice"), None, Some("1"));
        let acme = record("2", None, Some("Acme"), Some("2"));
        let bob = record("3", Some("Bob"), None, Some("3"));

        let rows = vec![
            TripleRow {
                source: alice.clone(),
                rel_type: "WORKS_AT".to_string(),
                target: acme.clone(),
            },
            TripleRow {
                source: bob,
                rel_type: "WORKS_AT".to_string(),
                target: acme,
            },
            TripleRow {
                source: alice.clone(),
                rel_type: "KNOWS".to_string(),
                target: record("3", Some("Bob"), None, Some("3")),
            },
        ];

        let graph = build_visualization(rows);

        let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        let labels: Vec<&str> = graph.edges.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["WORKS_AT", "WORKS_AT", "KNOWS"]);
    }

    #[test]
    fn label_fallback_chain_is_total() {
        let bare = record("42", None, None, None);
        let graph = build_visualization(vec![TripleRow {
            source: bare.clone(),
            rel_type: "SELF".to_string(),
            target: bare,
        }]);

        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].label, "42");
        assert_eq!(graph.nodes[0].title, "42");
    }

    #[test]
    fn empty_properties_do_not_short_circuit_the_fallback() {
        let rec = record("7", Some(""), Some("Acme"), Some("7"));
        let graph = build_visualization(vec![TripleRow {
            source: rec.clone(),
            rel_type: "X".to_string(),
            target: record("8", None, None, Some("8")),
        }]);
        assert_eq!(graph.nodes[0].label, "Acme");
    }
}
