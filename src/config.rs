//! Configuração do trajwiz carregada a partir de `trajwiz.toml`.
//!
//! A struct [`WizardConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `TRAJWIZ_SERVER_URL` tem precedência sobre o arquivo.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::workflow::{DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_TTL_MS, RetryConfig};

const CONFIG_FILE: &str = "trajwiz.toml";
const SERVER_URL_ENV: &str = "TRAJWIZ_SERVER_URL";

/// Configuração de nível superior carregada de `trajwiz.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct WizardConfig {
    /// URL base do serviço de trajetórias.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Tempo até uma notificação sumir sozinha.
    #[serde(default = "default_notification_ttl_ms")]
    pub notification_ttl_ms: u64,

    /// Máximo de retentativas para chamadas idempotentes.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Atraso base em milissegundos para backoff exponencial.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Limite por requisição. Não se aplica ao canal de progresso.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Tamanho máximo do arquivo de amostra enviado para treino.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

// Valor padrão da URL: servidor local de desenvolvimento.
fn default_server_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_notification_ttl_ms() -> u64 {
    DEFAULT_TTL_MS
}

// Valor padrão para retentativas máximas: 3.
fn default_max_retries() -> u32 {
    3
}

// Valor padrão para o atraso base: 500ms.
fn default_base_delay_ms() -> u64 {
    500
}

fn default_connect_timeout_secs() -> u64 {
    10
}

// Gerar muitas trajetórias pode levar minutos.
fn default_request_timeout_secs() -> u64 {
    300
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            notification_ttl_ms: default_notification_ttl_ms(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl WizardConfig {
    /// Carrega a configuração de `trajwiz.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(Path::new(CONFIG_FILE))?;

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        config.override_server_url(std::env::var(SERVER_URL_ENV).ok());
        Ok(config)
    }

    /// Carrega de um caminho específico; arquivo ausente resulta nos defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str::<WizardConfig>(&contents)
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    /// Substitui a URL do servidor quando o valor não é vazio.
    pub fn override_server_url(&mut self, value: Option<String>) {
        if let Some(url) = value
            && !url.trim().is_empty()
        {
            self.server_url = url.trim().to_string();
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = WizardConfig::default();
        assert_eq!(config.server_url, "http://localhost:8000");
        assert_eq!(config.notification_ttl_ms, 5000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.max_upload_bytes, 500 * 1024 * 1024);
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            server_url = "http://trajectories.internal:9000"
            max_retries = 5
        "#;
        let config: WizardConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server_url, "http://trajectories.internal:9000");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.notification_ttl_ms, 5000);
    }

    #[test]
    fn load_from_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = WizardConfig::load_from(&dir.path().join("trajwiz.toml")).unwrap();
        assert_eq!(missing.max_retries, 3);

        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "notification_ttl_ms = 1500\nbase_delay_ms = 10\n").unwrap();
        let config = WizardConfig::load_from(&path).unwrap();
        assert_eq!(config.notification_ttl_ms, 1500);
        assert_eq!(config.retry_config().base_delay_ms, 10);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajwiz.toml");
        std::fs::write(&path, "max_retries = \"many\"").unwrap();
        assert!(WizardConfig::load_from(&path).is_err());
    }

    #[test]
    fn server_url_override_ignores_empty() {
        let mut config = WizardConfig::default();
        config.override_server_url(Some("  ".into()));
        config.override_server_url(None);
        assert_eq!(config.server_url, "http://localhost:8000");
        config.override_server_url(Some("http://10.0.0.5:8000".into()));
        assert_eq!(config.server_url, "http://10.0.0.5:8000");
    }
}
