//! Formatos de fio e de disco.
//!
//! Linha de cache (JSON compacto, uma por registro):
//!
//! ```text
//! {"ts":1484512345123,"values":{"temp":38.2,"cpu_used":12.5}}
//! ```
//!
//! Nome do arquivo de cache (um por dispositivo por dia):
//!
//! ```text
//! ┌──────────────────┬───┬────────────┬────────┐
//! │ chave codificada │ _ │ AAAA-MM-DD │ .cache │
//! └──────────────────┴───┴────────────┴────────┘
//! ```
//!
//! A chave é codificada com `%XX` para tudo fora de `[A-Za-z0-9-]`, então o
//! delimitador `_` nunca aparece dentro dela.

use crate::types::TelemetryRecord;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Extensão dos arquivos de cache.
pub const CACHE_EXTENSION: &str = "cache";

/// Separador entre chave e data no nome do arquivo.
pub const KEY_DELIMITER: char = '_';

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Erros de codificação.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Linha de cache inválida: {0}")]
    Deserialize(String),

    #[error("Nome de arquivo de cache inválido: {0}")]
    InvalidFileName(String),
}

// ──────────────────────────────────────────────
// Linhas de cache
// ──────────────────────────────────────────────

/// Serializa um registro como uma linha de cache (sem `\n`).
pub fn encode_record(record: &TelemetryRecord) -> Result<String, CodecError> {
    serde_json::to_string(record).map_err(|e| CodecError::Serialize(e.to_string()))
}

/// Decodifica uma linha de cache.
pub fn decode_record(line: &str) -> Result<TelemetryRecord, CodecError> {
    serde_json::from_str(line.trim_end()).map_err(|e| CodecError::Deserialize(e.to_string()))
}

/// Chave de idempotência de uma linha: SHA-256 em hex.
pub fn idempotency_key(line: &str) -> String {
    let digest = Sha256::digest(line.trim_end().as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

// ──────────────────────────────────────────────
// Nomes de arquivo
// ──────────────────────────────────────────────

/// Identidade de um arquivo de cache: dono + dia.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheFileName {
    pub device_key: String,
    pub date: NaiveDate,
}

impl CacheFileName {
    pub fn new(device_key: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            device_key: device_key.into(),
            date,
        }
    }

    /// Arquivo de hoje (data local) para o dispositivo.
    pub fn today(device_key: &str) -> Self {
        Self::new(device_key, chrono::Local::now().date_naive())
    }

    /// `<chave codificada>_<AAAA-MM-DD>.cache`
    pub fn encode(&self) -> String {
        format!(
            "{}{KEY_DELIMITER}{}.{CACHE_EXTENSION}",
            encode_key(&self.device_key),
            self.date.format(DATE_FORMAT)
        )
    }

    /// Recupera dono e data a partir do nome do arquivo.
    pub fn parse(file_name: &str) -> Result<Self, CodecError> {
        let invalid = || CodecError::InvalidFileName(file_name.to_string());

        let stem = file_name
            .strip_suffix(CACHE_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(invalid)?;
        let (key, date) = stem.split_once(KEY_DELIMITER).ok_or_else(invalid)?;
        if key.is_empty() {
            return Err(invalid());
        }

        let device_key = decode_key(key).ok_or_else(invalid)?;
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| invalid())?;

        Ok(Self { device_key, date })
    }
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

fn decode_key(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = encoded.get(i + 1..i + 3)?;
                if !hex.bytes().all(|h| h.is_ascii_hexdigit()) {
                    return None;
                }
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b if b.is_ascii_alphanumeric() || b == b'-' => {
                out.push(b);
                i += 1;
            }
            _ => return None,
        }
    }
    let key = String::from_utf8(out).ok()?;
    // Só a forma canônica (a que `encode_key` gera) é aceita
    (encode_key(&key) == encoded).then_some(key)
}

// ──────────────────────────────────────────────
// Endpoints
// ──────────────────────────────────────────────

/// URLs da API de dispositivo para uma chave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpoints {
    pub attributes: String,
    pub telemetry: String,
}

impl DeviceEndpoints {
    /// `{scheme}://{server}/api/v1/{key}/attributes|telemetry`
    pub fn new(scheme: &str, server: &str, device_key: &str) -> Self {
        let base = format!("{scheme}://{server}/api/v1/{device_key}");
        Self {
            attributes: format!("{base}/attributes"),
            telemetry: format!("{base}/telemetry"),
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
