use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use neo4rs::Graph;
use tokio::sync::oneshot;

use crate::{config::AppConfig, extractor::GraphExtractor};

/// Estado compartido de la aplicación. El `Graph` es el único recurso
/// mutable compartido: un pool por proceso, creado en `main` e inyectado
/// aquí; se libera cuando cae el último `Arc` tras el apagado.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub graph: Arc<Graph>,
    pub extractor: GraphExtractor,
    pub status: Arc<Mutex<Status>>,
    pub current_dir: Arc<Mutex<Option<PathBuf>>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}
