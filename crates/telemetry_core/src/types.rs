//! Definição de tipos para telemetria e atributos de dispositivos.
//!
//! Valores são escalares JSON (inteiro, decimal ou texto), serializados sem
//! tag para que o corpo enviado ao servidor seja um objeto plano.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ──────────────────────────────────────────────
// Valores
// ──────────────────────────────────────────────

/// Valor de telemetria ou atributo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TelemetryValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for TelemetryValue {
    fn from(v: i64) -> Self {
        TelemetryValue::Integer(v)
    }
}

impl From<i32> for TelemetryValue {
    fn from(v: i32) -> Self {
        TelemetryValue::Integer(v as i64)
    }
}

impl From<f64> for TelemetryValue {
    fn from(v: f64) -> Self {
        TelemetryValue::Float(v)
    }
}

impl From<f32> for TelemetryValue {
    fn from(v: f32) -> Self {
        TelemetryValue::Float(v as f64)
    }
}

impl From<String> for TelemetryValue {
    fn from(v: String) -> Self {
        TelemetryValue::Text(v)
    }
}

impl From<&str> for TelemetryValue {
    fn from(v: &str) -> Self {
        TelemetryValue::Text(v.to_string())
    }
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryValue::Integer(v) => write!(f, "{v}"),
            TelemetryValue::Float(v) => write!(f, "{v}"),
            TelemetryValue::Text(v) => f.write_str(v),
        }
    }
}

/// Mapa chave → valor (telemetria de um ciclo).
pub type TelemetryMap = BTreeMap<String, TelemetryValue>;

/// Atributos descritivos do dispositivo (esparsos, mudam pouco).
pub type Attributes = BTreeMap<String, TelemetryValue>;

// ──────────────────────────────────────────────
// Registro
// ──────────────────────────────────────────────

/// Registro de telemetria imutável.
///
/// `ts` é o instante de criação (ms desde epoch, UTC), não o da entrega,
/// e sobrevive ao cache para que o replay preserve o horário do evento.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryRecord {
    pub ts: i64,
    pub values: TelemetryMap,
}

impl TelemetryRecord {
    /// Cria um registro com o horário atual.
    pub fn now(values: TelemetryMap) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis(),
            values,
        }
    }
}

// ──────────────────────────────────────────────
// Resultado de entrega
// ──────────────────────────────────────────────

/// Destino de um registro em um ciclo. Exatamente um por registro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryOutcome {
    /// Atributos e telemetria aceitos (HTTP 200) – nada gravado em disco.
    Delivered,
    /// Modo local: gravado em cache sem tentar a rede.
    CachedLocalOnly,
    /// Falha de envio, gravado em cache.
    CachedOnError,
    /// Falha de envio sem cache habilitado (ou cache indisponível).
    DroppedNoCache,
}

impl DeliveryOutcome {
    pub fn is_cached(self) -> bool {
        matches!(self, DeliveryOutcome::CachedLocalOnly | DeliveryOutcome::CachedOnError)
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryOutcome::Delivered => "entregue",
            DeliveryOutcome::CachedLocalOnly => "cache (local)",
            DeliveryOutcome::CachedOnError => "cache (erro)",
            DeliveryOutcome::DroppedNoCache => "descartado",
        };
        f.write_str(s)
    }
}

// ──────────────────────────────────────────────
// Leituras de fontes
// ──────────────────────────────────────────────

/// Resultado explícito de um campo lido por uma fonte.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Value(TelemetryValue),
    /// A fonte não conseguiu ler o campo; carrega o motivo.
    Failed(String),
}

impl Reading {
    pub fn failed(reason: impl Into<String>) -> Self {
        Reading::Failed(reason.into())
    }
}

macro_rules! reading_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Reading {
            fn from(v: $t) -> Self {
                Reading::Value(v.into())
            }
        })*
    };
}

reading_from!(i32, i64, f32, f64, String, &str);

impl From<TelemetryValue> for Reading {
    fn from(v: TelemetryValue) -> Self {
        Reading::Value(v)
    }
}

/// Saída de uma fonte: atributos + telemetria (qualquer metade pode ser vazia).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceReading {
    pub attributes: Attributes,
    pub telemetry: BTreeMap<String, Reading>,
}

impl SourceReading {
    pub fn attr(&mut self, key: impl Into<String>, value: impl Into<TelemetryValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn tele(&mut self, key: impl Into<String>, reading: impl Into<Reading>) {
        self.telemetry.insert(key.into(), reading.into());
    }

    /// Sobrepõe `other` (chaves repetidas: `other` vence).
    pub fn merge(&mut self, other: SourceReading) {
        self.attributes.extend(other.attributes);
        self.telemetry.extend(other.telemetry);
    }

    /// Separa valores válidos de falhas.
    ///
    /// Campos com falha não entram na telemetria; viram o atributo
    /// `<campo>_error` com o motivo.
    pub fn into_publishable(self) -> (Attributes, TelemetryMap, Vec<(String, String)>) {
        let mut attributes = self.attributes;
        let mut telemetry = TelemetryMap::new();
        let mut failures = Vec::new();

        for (key, reading) in self.telemetry {
            match reading {
                Reading::Value(v) => {
                    telemetry.insert(key, v);
                }
                Reading::Failed(reason) => {
                    attributes.insert(format!("{key}_error"), TelemetryValue::Text(reason.clone()));
                    failures.push((key, reason));
                }
            }
        }

        (attributes, telemetry, failures)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
