// Módulos de la aplicación
mod api;
mod app_state;
mod chunker;
mod config;
mod error;
mod extractor;
mod graph_store;
mod loader;
mod models;
mod pipeline;
mod viewer;

use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::Router;
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::app_state::{AppState, Status};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración (falla aquí, nunca a mitad de pipeline)
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Asegurar el directorio de subidas
    std::fs::create_dir_all(&cfg.uploads_dir)
        .context("Error creando el directorio de subidas")?;

    // 4. Conectar a Neo4j y asegurar esquemas
    let graph = graph_store::connect_from_config(&cfg)
        .await
        .context("Error conectando a Neo4j")?;
    graph_store::ensure_schema(&graph)
        .await
        .context("Error asegurando el esquema de Neo4j")?;

    // 5. Inicializar el extractor de grafos
    let extractor =
        extractor::GraphExtractor::from_config(&cfg).context("Error inicializando el extractor")?;

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 6. Crear estado compartido de la aplicación
    let app_state = AppState {
        current_dir: Arc::new(Mutex::new(Some(cfg.uploads_dir.clone()))),
        config: cfg,
        graph: Arc::new(graph),
        extractor,
        status: Arc::new(Mutex::new(Status {
            is_busy: false,
            message: "Servidor listo.".to_string(),
            progress: 0.0,
        })),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 7. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .nest("/", api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new("frontend"))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 8. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .context("Error abriendo el puerto del servidor")?;
    let server_url = format!("http://{}", server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    // Abrir el visor en el navegador por defecto
    if webbrowser::open(&server_url).is_err() {
        info!(
            "No se pudo abrir el navegador. Por favor, accede a {} manualmente.",
            server_url
        );
    }

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .context("El servidor terminó con error")?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
