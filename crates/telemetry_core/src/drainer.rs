//! Reenvio do cache de um dispositivo.
//!
//! Cada linha é enviada como está para o endpoint de telemetria. O arquivo só
//! é apagado se todas as linhas forem aceitas na mesma passada; caso
//! contrário fica intacto e a próxima tentativa recomeça da linha 1
//! (entrega pelo menos uma vez, com possíveis duplicatas no servidor).

use crate::cache::{CacheFile, CacheStore};
use crate::config::ConnectionConfig;
use crate::protocol::{DeviceEndpoints, idempotency_key};
use crate::publisher::HTTP_OK;
use crate::transport::Transport;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// O que aconteceu com um arquivo durante o reenvio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Todas as linhas aceitas, arquivo removido
    Cleared,
    /// Alguma linha recusada, arquivo mantido
    Retained,
    /// Erro de transporte, restante do arquivo não tentado
    Aborted(String),
    /// Não foi possível ler (ou remover) o arquivo
    Unreadable(String),
}

/// Resultado por arquivo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDrain {
    pub path: PathBuf,
    pub lines: usize,
    pub accepted: usize,
    pub outcome: FileOutcome,
}

/// Resultado de um `drain` para um dispositivo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub files: Vec<FileDrain>,
}

impl DrainReport {
    pub fn cleared(&self) -> usize {
        self.files.iter().filter(|f| f.outcome == FileOutcome::Cleared).count()
    }

    pub fn accepted(&self) -> usize {
        self.files.iter().map(|f| f.accepted).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

pub struct Drainer {
    connection: ConnectionConfig,
    cache: CacheStore,
    transport: Arc<dyn Transport>,
}

impl Drainer {
    pub fn new(connection: ConnectionConfig, cache: CacheStore, transport: Arc<dyn Transport>) -> Self {
        Self {
            connection,
            cache,
            transport,
        }
    }

    /// Reenvia todos os arquivos de cache do dispositivo, do mais antigo ao mais novo.
    pub fn drain(&self, device_key: &str) -> DrainReport {
        let mut report = DrainReport::default();

        let files = match self.cache.files_for(device_key) {
            Ok(files) => files,
            Err(e) => {
                warn!("[{device_key}] Não foi possível listar o cache: {e}");
                return report;
            }
        };

        let endpoints = DeviceEndpoints::new(&self.connection.scheme, &self.connection.server, device_key);
        for file in files {
            report.files.push(self.drain_file(device_key, &endpoints.telemetry, &file));
        }
        report
    }

    fn drain_file(&self, device_key: &str, url: &str, file: &CacheFile) -> FileDrain {
        let mut result = FileDrain {
            path: file.path.clone(),
            lines: 0,
            accepted: 0,
            outcome: FileOutcome::Retained,
        };

        let lines = match self.cache.read_lines(&file.path) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("[{device_key}] Não foi possível ler {}: {e}", file.path.display());
                result.outcome = FileOutcome::Unreadable(e.to_string());
                return result;
            }
        };
        result.lines = lines.len();

        for line in &lines {
            let key = self.connection.idempotency_key.then(|| idempotency_key(line));
            match self.transport.post_json(url, line, key.as_deref()) {
                Ok(HTTP_OK) => result.accepted += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "[{device_key}] Servidor indisponível ao reenviar {}: {e}. Nada removido",
                        file.path.display()
                    );
                    result.outcome = FileOutcome::Aborted(e.to_string());
                    return result;
                }
            }
        }

        if result.accepted == result.lines {
            match self.cache.remove(&file.path) {
                Ok(()) => {
                    info!(
                        "[{device_key}] Cache reenviado: {} registros de {}",
                        result.accepted,
                        file.path.display()
                    );
                    result.outcome = FileOutcome::Cleared;
                }
                Err(e) => {
                    warn!("[{device_key}] Registros aceitos, mas falhou ao remover: {e}");
                    result.outcome = FileOutcome::Unreadable(e.to_string());
                }
            }
        } else {
            warn!(
                "[{device_key}] Reenvio parcial de {}: {}/{} aceitos, arquivo mantido",
                file.path.display(),
                result.accepted,
                result.lines
            );
        }
        result
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
