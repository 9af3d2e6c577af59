//! Carga y gestión de configuración de la aplicación (Neo4j + LLM + pipeline).

use std::env;
use std::path::PathBuf;

use crate::error::KgError;

#[derive(Clone, Debug)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self, KgError> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(KgError::Configuration(format!(
                "Proveedor LLM no soportado: {other}"
            ))),
        }
    }
}

/// Política ante ficheros individuales ilegibles durante la carga.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Aborta la carga completa al primer fichero ilegible.
    FailFast,
    /// Registra un aviso y continúa con el resto (por defecto).
    SkipAndWarn,
}

impl LoadPolicy {
    pub fn from_str(s: &str) -> Result<Self, KgError> {
        match s.to_lowercase().as_str() {
            "fail_fast" | "failfast" => Ok(Self::FailFast),
            "skip_and_warn" | "skipandwarn" => Ok(Self::SkipAndWarn),
            other => Err(KgError::Configuration(format!(
                "Política de carga no soportada: {other}"
            ))),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,

    pub uploads_dir: PathBuf,
    pub chunk_size_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub load_policy: LoadPolicy,
    pub include_source: bool,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    /// Los valores obligatorios ausentes y los parámetros de troceado
    /// inválidos fallan aquí, nunca a mitad de pipeline.
    pub fn from_env() -> Result<Self, KgError> {
        let neo4j_uri = require("NEO4J_URI")?;
        let neo4j_user = require("NEO4J_USER")?;
        let neo4j_password = require("NEO4J_PASSWORD")?;

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;
        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let uploads_dir = PathBuf::from(
            env::var("UPLOADS_DIR").unwrap_or_else(|_| "downloads".to_string()),
        );

        let chunk_size_tokens = parse_usize("CHUNK_SIZE_TOKENS", 1536)?;
        let chunk_overlap_tokens = parse_usize("CHUNK_OVERLAP_TOKENS", 250)?;
        if chunk_overlap_tokens >= chunk_size_tokens {
            return Err(KgError::Configuration(format!(
                "CHUNK_OVERLAP_TOKENS ({chunk_overlap_tokens}) debe ser menor que CHUNK_SIZE_TOKENS ({chunk_size_tokens})"
            )));
        }

        let load_policy_str =
            env::var("LOAD_POLICY").unwrap_or_else(|_| "skip_and_warn".to_string());
        let load_policy = LoadPolicy::from_str(&load_policy_str)?;

        let include_source = env::var("INCLUDE_SOURCE")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Ok(Self {
            neo4j_uri,
            neo4j_user,
            neo4j_password,
            server_addr,
            llm_provider,
            llm_chat_model,
            uploads_dir,
            chunk_size_tokens,
            chunk_overlap_tokens,
            load_policy,
            include_source,
        })
    }
}

fn require(key: &str) -> Result<String, KgError> {
    env::var(key).map_err(|_| KgError::Configuration(format!("Falta {key} en el entorno")))
}

fn parse_usize(key: &str, default: usize) -> Result<usize, KgError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| {
            KgError::Configuration(format!("{key} no es un entero válido: '{raw}'"))
        }),
    }
}
