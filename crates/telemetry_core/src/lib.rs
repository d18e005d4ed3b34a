//! # Telemetry Core
//!
//! Crate compartilhada do agente de Telemetria HTTP: tipos, formato das
//! linhas de cache, configuração TOML e o subsistema de publicação com
//! fallback em disco.
//!
//! ## Módulos
//! - [`types`] – Registros, valores e resultados de entrega
//! - [`protocol`] – Linhas de cache JSON, nomes de arquivo e endpoints
//! - [`config`] – Configuração unificada via TOML
//! - [`cache`] – Arquivos de cache append-only por dispositivo/dia
//! - [`transport`] – POST JSON via reqwest (e transporte roteirizado)
//! - [`publisher`] – Entrega ao vivo com fallback para o cache
//! - [`drainer`] – Reenvio e limpeza do cache

pub mod types;
pub mod protocol;
pub mod config;
pub mod cache;
pub mod transport;
pub mod publisher;
pub mod drainer;

// Re-exports convenientes
pub use types::{Attributes, DeliveryOutcome, Reading, SourceReading, TelemetryMap, TelemetryRecord, TelemetryValue};
pub use protocol::{CacheFileName, DeviceEndpoints};
pub use config::{AppConfig, ConfigError, DeviceConfig, SourceConfig};
pub use cache::{CacheHealth, CacheStore};
pub use transport::{HttpTransport, Transport, TransportError};
pub use publisher::{PublishOptions, Publisher};
pub use drainer::{DrainReport, Drainer};
