//! Transporte HTTP para a API de dispositivos.
//!
//! O publisher e o drainer falam com um [`Transport`]; em produção é o
//! [`HttpTransport`] (reqwest bloqueante), nos testes o `ScriptedTransport`
//! (feature `test-util`).

use crate::config::ConnectionConfig;
use reqwest::header::CONTENT_TYPE;

/// Erros de transporte (conexão, DNS, timeout). Nunca fatais.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Falha ao criar cliente HTTP: {0}")]
    Client(String),

    #[error("Timeout na requisição para {0}")]
    Timeout(String),

    #[error("Falha na requisição: {0}")]
    Request(String),
}

impl TransportError {
    fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(url.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Canal de saída: um POST JSON, resposta = status HTTP.
pub trait Transport: Send + Sync {
    fn post_json(
        &self,
        url: &str,
        body: &str,
        idempotency_key: Option<&str>,
    ) -> Result<u16, TransportError>;
}

/// Cria um cliente bloqueante com proxy/timeout da configuração.
///
/// Sem `timeout_secs` o padrão do reqwest continua valendo.
pub fn build_client(conn: &ConnectionConfig) -> Result<reqwest::blocking::Client, TransportError> {
    let mut builder = reqwest::blocking::Client::builder();
    if let Some(timeout) = conn.timeout() {
        builder = builder.timeout(timeout);
    }
    if !conn.proxy.is_empty() {
        let proxy = reqwest::Proxy::all(&conn.proxy).map_err(|e| TransportError::Client(e.to_string()))?;
        builder = builder.proxy(proxy);
    }
    builder.build().map_err(|e| TransportError::Client(e.to_string()))
}

/// Transporte real via HTTP.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(conn: &ConnectionConfig) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(conn)?,
        })
    }
}

impl Transport for HttpTransport {
    fn post_json(
        &self,
        url: &str,
        body: &str,
        idempotency_key: Option<&str>,
    ) -> Result<u16, TransportError> {
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string());
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request.send().map_err(|e| TransportError::from_reqwest(url, e))?;
        Ok(response.status().as_u16())
    }
}

// ──────────────────────────────────────────────
// Transporte roteirizado (testes)
// ──────────────────────────────────────────────

#[cfg(any(test, feature = "test-util"))]
pub use scripted::{PostCall, ScriptedTransport};

/// Habilitado em testes e pela feature `test-util`.
#[cfg(any(test, feature = "test-util"))]
mod scripted {
    use super::{Transport, TransportError};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Uma chamada registrada pelo [`ScriptedTransport`].
    #[derive(Debug, Clone, PartialEq)]
    pub struct PostCall {
        pub url: String,
        pub body: String,
        pub idempotency_key: Option<String>,
    }

    /// Transporte falso com respostas pré-definidas, para testes.
    pub struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<u16, TransportError>>>,
        fallback: Option<Result<u16, TransportError>>,
        calls: Mutex<Vec<PostCall>>,
    }

    impl ScriptedTransport {
        /// Responde na ordem dada; esgotado, devolve erro de requisição.
        pub fn new(responses: Vec<Result<u16, TransportError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                fallback: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Sempre o mesmo status.
        pub fn always(status: u16) -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                fallback: Some(Ok(status)),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Sempre o mesmo erro de transporte.
        pub fn always_error(error: TransportError) -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                fallback: Some(Err(error)),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<PostCall> {
            self.calls.lock().map(|c| c.to_vec()).unwrap_or_default()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().map(|c| c.len()).unwrap_or_default()
        }
    }

    impl Transport for ScriptedTransport {
        fn post_json(
            &self,
            url: &str,
            body: &str,
            idempotency_key: Option<&str>,
        ) -> Result<u16, TransportError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(PostCall {
                    url: url.to_string(),
                    body: body.to_string(),
                    idempotency_key: idempotency_key.map(str::to_string),
                });
            }

            let next = self.responses.lock().ok().and_then(|mut r| r.pop_front());
            match (next, &self.fallback) {
                (Some(response), _) => response,
                (None, Some(fallback)) => fallback.clone(),
                (None, None) => Err(TransportError::Request("sem respostas roteirizadas".into())),
            }
        }
    }
}
