use std::path::{Path, PathBuf};

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use neo4rs::query;
use serde::Deserialize;
use serde_json::json;
use tokio::spawn;
use tracing::{error, info};
use url::Url;

use crate::{
    app_state::{AppState, Status},
    error::KgError,
    models::{FileTreeNode, VisualizationGraph},
    pipeline, viewer,
};

// --- Payloads de la API ---

#[derive(Deserialize)]
pub struct SelectDirPayload {
    path: String,
}

#[derive(Deserialize)]
pub struct VisualizePayload {
    cypher: String,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/list-directory", post(list_directory_handler))
        .route("/api/select-directory", post(select_directory_handler))
        .route("/api/ingest", post(ingest_handler))
        .route("/api/status", get(status_handler))
        .route("/api/neo4j-info", get(neo4j_info_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .route("/api/graph-data", get(graph_data_handler))
        .route("/api/visualize", post(visualize_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn list_directory_handler(
    Json(payload): Json<SelectDirPayload>,
) -> Result<Json<FileTreeNode>, (StatusCode, Json<serde_json::Value>)> {
    let path = if payload.path.is_empty() {
        dirs::home_dir().ok_or_else(|| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "No se pudo determinar el directorio home del usuario."})),
            )
        })?
    } else {
        PathBuf::from(&payload.path)
    };

    if !path.is_dir() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "La ruta proporcionada no es un directorio válido."})),
        ));
    }

    match build_file_tree(&path) {
        Ok(tree) => Ok(Json(tree)),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Error al leer el directorio: {}", e)})),
        )),
    }
}

#[axum::debug_handler]
async fn select_directory_handler(
    State(state): State<AppState>,
    Json(payload): Json<SelectDirPayload>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let path = PathBuf::from(&payload.path);
    if !path.is_dir() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "La ruta proporcionada no es un directorio válido."})),
        ));
    }

    *state.current_dir.lock().unwrap() = Some(path);
    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Directorio fijado para la ingesta." })),
    ))
}

/// Lanza el pipeline en segundo plano sobre el directorio seleccionado
/// (o el de subidas por defecto) y devuelve 202 inmediatamente.
#[axum::debug_handler]
async fn ingest_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    {
        let status = state.status.lock().unwrap();
        if status.is_busy {
            return Err((
                StatusCode::CONFLICT,
                Json(json!({"error": "Ya hay una ingesta en curso."})),
            ));
        }
    }

    let root_dir = state
        .current_dir
        .lock()
        .unwrap()
        .clone()
        .unwrap_or_else(|| state.config.uploads_dir.clone());

    spawn(async move {
        {
            let mut status = state.status.lock().unwrap();
            status.is_busy = true;
            status.message = "Iniciando el pipeline...".to_string();
            status.progress = 0.0;
        }

        let result = pipeline::run_pipeline(
            &state.graph,
            &state.extractor,
            &state.config,
            &root_dir,
            state.status.clone(),
        )
        .await;

        let mut status = state.status.lock().unwrap();
        status.is_busy = false;
        status.progress = 0.0;
        match result {
            Ok(summary) => {
                status.message = format!("¡Pipeline completado! {}", summary);
            }
            Err(err) => {
                status.message = format!("Error en el pipeline: {}", err);
                error!(
                    "Fallo del pipeline sobre {} (reintentable: {}): {err}",
                    root_dir.display(),
                    err.source.is_retryable()
                );
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status.lock().unwrap().clone())
}

#[axum::debug_handler]
async fn neo4j_info_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let browser_url = match Url::parse(&state.config.neo4j_uri) {
        Ok(mut url) => {
            let _ = url.set_scheme("http");
            let _ = url.set_port(Some(7474));
            url.to_string()
        }
        Err(_) => "http://localhost:7474".to_string(),
    };

    match state.graph.run(query("RETURN 1")).await {
        Ok(_) => Ok(Json(json!({ "status": "ok", "browser_url": browser_url }))),
        Err(e) => {
            error!("Error en el health check de Neo4j: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// --- Handlers de Visualización ---

/// Grafo de visualización con la consulta por defecto (sólo :Entity).
#[axum::debug_handler]
async fn graph_data_handler(
    State(state): State<AppState>,
) -> Result<Json<VisualizationGraph>, (StatusCode, Json<serde_json::Value>)> {
    run_visualization(&state, viewer::DEFAULT_CYPHER).await
}

/// Grafo de visualización con una consulta Cypher del llamante.
#[axum::debug_handler]
async fn visualize_handler(
    State(state): State<AppState>,
    Json(payload): Json<VisualizePayload>,
) -> Result<Json<VisualizationGraph>, (StatusCode, Json<serde_json::Value>)> {
    run_visualization(&state, &payload.cypher).await
}

async fn run_visualization(
    state: &AppState,
    cypher: &str,
) -> Result<Json<VisualizationGraph>, (StatusCode, Json<serde_json::Value>)> {
    match viewer::visualize(&state.graph, cypher).await {
        Ok(graph) => Ok(Json(graph)),
        Err(e) => {
            error!("Error al construir la visualización: {}", e);
            let code = match &e {
                KgError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_REQUEST,
            };
            Err((code, Json(json!({"error": e.to_string()}))))
        }
    }
}

// --- Handler de Apagado y Utilidades ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state.shutdown_sender.lock().unwrap().take() {
        let _ = sender.send(());
    }
    StatusCode::OK
}

fn build_file_tree(path: &Path) -> std::io::Result<FileTreeNode> {
    let metadata = std::fs::metadata(path)?;
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());

    let is_dir = metadata.is_dir();
    let mut children = Vec::new();

    if is_dir {
        let mut entries: Vec<_> = std::fs::read_dir(path)?
            .filter_map(Result::ok)
            .collect();

        entries.sort_by(|a, b| {
            let a_is_dir = a.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
            let b_is_dir = b.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
            b_is_dir
                .cmp(&a_is_dir)
                .then_with(|| a.file_name().cmp(&b.file_name()))
        });

        for entry in entries {
            if let Ok(entry_meta) = entry.metadata() {
                children.push(FileTreeNode {
                    path: entry.path(),
                    name: entry.file_name().to_string_lossy().to_string(),
                    is_dir: entry_meta.is_dir(),
                    children: Vec::new(),
                });
            }
        }
    }

    Ok(FileTreeNode {
        path: path.to_path_buf(),
        name,
        is_dir,
        children,
    })
}
