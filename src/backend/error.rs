//! Tipos de erro para o cliente do serviço de trajetórias.
//!
//! Define [`BackendError`] com variantes para falhas de transporte, erros
//! retornados pelo servidor e respostas que não puderam ser decodificadas.
//! Usa `thiserror` para derivar `Display` e `Error` a partir dos atributos
//! `#[error(...)]`.

use thiserror::Error;

/// Erros que podem ocorrer ao falar com o serviço de trajetórias.
///
/// - [`Transport`](BackendError::Transport) e [`Io`](BackendError::Io) — a
///   requisição não chegou ou o canal caiu; seguro retentar chamadas idempotentes
/// - [`Server`](BackendError::Server) — o servidor respondeu com status de erro
/// - [`Decode`](BackendError::Decode) — corpo da resposta em formato inesperado
#[derive(Debug, Error)]
pub enum BackendError {
    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Erro de E/S local ao ler o arquivo de amostra ou gravar um download.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// O servidor retornou um status fora da faixa 2xx.
    /// Contém o código HTTP e a mensagem extraída do corpo.
    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// A resposta chegou mas não tem o formato esperado.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Não foi possível montar a URL do pedido a partir da base configurada.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl BackendError {
    /// Falhas de transporte são as únicas que justificam uma nova tentativa.
    pub fn is_transport(&self) -> bool {
        match self {
            BackendError::Transport(e) => !e.is_decode(),
            BackendError::Io(_) => true,
            BackendError::Server { .. }
            | BackendError::Decode(_)
            | BackendError::InvalidUrl(_) => false,
        }
    }

    /// Mensagem para o usuário: o texto do servidor quando houver.
    pub fn message(&self) -> String {
        match self {
            BackendError::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
