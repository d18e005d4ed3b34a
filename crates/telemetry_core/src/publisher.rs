//! Publicação ao vivo com fallback para o cache em disco.
//!
//! Regra central: um registro vai para o cache **se e somente se** não foi
//! entregue ao vivo (modo local ou falha de envio com `cache_on_error`).

use crate::cache::CacheStore;
use crate::config::ConnectionConfig;
use crate::protocol::DeviceEndpoints;
use crate::transport::Transport;
use crate::types::{Attributes, DeliveryOutcome, TelemetryRecord};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Status HTTP considerado sucesso pela API de dispositivos.
pub const HTTP_OK: u16 = 200;

/// Política de entrega de um dispositivo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub cache_on_error: bool,
    pub local_only: bool,
}

/// Envia atributos + telemetria de um dispositivo.
pub struct Publisher {
    connection: ConnectionConfig,
    cache: CacheStore,
    transport: Arc<dyn Transport>,
    /// Modo local global (vale para todos os dispositivos)
    local_only: bool,
}

impl Publisher {
    pub fn new(
        connection: ConnectionConfig,
        cache: CacheStore,
        transport: Arc<dyn Transport>,
        local_only: bool,
    ) -> Self {
        Self {
            connection,
            cache,
            transport,
            local_only,
        }
    }

    pub fn endpoints(&self, device_key: &str) -> DeviceEndpoints {
        DeviceEndpoints::new(&self.connection.scheme, &self.connection.server, device_key)
    }

    /// Publica um registro; nunca propaga erro de rede.
    ///
    /// Só a telemetria vai para o cache: atributos são reenviados no próximo ciclo.
    pub fn publish(
        &self,
        attributes: &Attributes,
        record: &TelemetryRecord,
        device_key: &str,
        options: PublishOptions,
    ) -> DeliveryOutcome {
        if self.local_only || options.local_only {
            return self.cache_record(device_key, record, DeliveryOutcome::CachedLocalOnly);
        }

        let (attr_body, tele_body) = match (
            serde_json::to_string(attributes),
            serde_json::to_string(&record.values),
        ) {
            (Ok(a), Ok(t)) => (a, t),
            (Err(e), _) | (_, Err(e)) => {
                error!("[{device_key}] Registro descartado, erro de serialização: {e}");
                return DeliveryOutcome::DroppedNoCache;
            }
        };

        let endpoints = self.endpoints(device_key);
        // Atributos primeiro, depois telemetria; as duas são sempre tentadas
        let attr_status = self.transport.post_json(&endpoints.attributes, &attr_body, None);
        let tele_status = self.transport.post_json(&endpoints.telemetry, &tele_body, None);

        match (&attr_status, &tele_status) {
            (Ok(HTTP_OK), Ok(HTTP_OK)) => {
                debug!("[{device_key}] Publicado: {} campos de telemetria", record.values.len());
                return DeliveryOutcome::Delivered;
            }
            (Ok(a), Ok(t)) => {
                warn!("[{device_key}] Servidor recusou os dados: atributos {a}, telemetria {t}");
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("[{device_key}] Não foi possível publicar: {e}");
            }
        }

        if options.cache_on_error {
            self.cache_record(device_key, record, DeliveryOutcome::CachedOnError)
        } else {
            warn!("[{device_key}] Registro não gravado em cache (cache_on_error desativado)");
            DeliveryOutcome::DroppedNoCache
        }
    }

    fn cache_record(
        &self,
        device_key: &str,
        record: &TelemetryRecord,
        outcome: DeliveryOutcome,
    ) -> DeliveryOutcome {
        match self.cache.append(device_key, record) {
            Ok(path) => {
                debug!("[{device_key}] {outcome} → {}", path.display());
                outcome
            }
            Err(e) => {
                error!("[{device_key}] Falha ao gravar cache, registro perdido: {e}");
                DeliveryOutcome::DroppedNoCache
            }
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ScriptedTransport, TransportError};
    use crate::types::TelemetryMap;
    use tempfile::TempDir;

    fn setup(transport: ScriptedTransport, local_only: bool) -> (TempDir, Arc<ScriptedTransport>, Publisher) {
        let tmp = TempDir::new().unwrap();
        let transport = Arc::new(transport);
        let publisher = Publisher::new(
            ConnectionConfig::default(),
            CacheStore::new(tmp.path()),
            transport.clone(),
            local_only,
        );
        (tmp, transport, publisher)
    }

    fn attrs() -> Attributes {
        let mut a = Attributes::new();
        a.insert("name".into(), "Lab Freezer".into());
        a
    }

    fn record(temp: i64) -> TelemetryRecord {
        let mut values = TelemetryMap::new();
        values.insert("temp".into(), temp.into());
        TelemetryRecord::now(values)
    }

    fn cached(publisher: &Publisher, key: &str) -> Vec<TelemetryRecord> {
        let path = publisher.cache.today_path(key);
        if !path.exists() {
            return Vec::new();
        }
        publisher.cache.read_records(&path).unwrap()
    }

    #[test]
    fn local_only_device_caches_without_network() {
        let (_tmp, transport, publisher) = setup(ScriptedTransport::always(200), false);
        let rec = record(5);
        let options = PublishOptions {
            cache_on_error: false,
            local_only: true,
        };

        let outcome = publisher.publish(&attrs(), &rec, "key1", options);

        assert_eq!(outcome, DeliveryOutcome::CachedLocalOnly);
        assert_eq!(transport.call_count(), 0);
        assert_eq!(cached(&publisher, "key1"), vec![rec]);
    }

    #[test]
    fn global_local_only_overrides_device() {
        let (_tmp, transport, publisher) = setup(ScriptedTransport::always(200), true);
        let outcome = publisher.publish(&attrs(), &record(1), "key1", PublishOptions::default());
        assert_eq!(outcome, DeliveryOutcome::CachedLocalOnly);
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn delivered_writes_nothing() {
        let (tmp, transport, publisher) = setup(ScriptedTransport::always(200), false);
        let options = PublishOptions {
            cache_on_error: true,
            local_only: false,
        };

        let outcome = publisher.publish(&attrs(), &record(5), "key1", options);

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].url.ends_with("/api/v1/key1/attributes"));
        assert!(calls[1].url.ends_with("/api/v1/key1/telemetry"));
        assert_eq!(calls[0].body, r#"{"name":"Lab Freezer"}"#);
        assert_eq!(calls[1].body, r#"{"temp":5}"#);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn rejected_attributes_cache_telemetry_only() {
        let (_tmp, transport, publisher) = setup(ScriptedTransport::new(vec![Ok(500), Ok(200)]), false);
        let rec = record(7);
        let options = PublishOptions {
            cache_on_error: true,
            local_only: false,
        };

        let outcome = publisher.publish(&attrs(), &rec, "key1", options);

        assert_eq!(outcome, DeliveryOutcome::CachedOnError);
        assert_eq!(transport.call_count(), 2);
        let lines = cached(&publisher, "key1");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].ts, rec.ts);
        assert_eq!(lines[0].values, rec.values);
        assert!(!lines[0].values.contains_key("name"));
    }

    #[test]
    fn transport_error_is_caught_and_cached() {
        let (_tmp, transport, publisher) = setup(
            ScriptedTransport::always_error(TransportError::Timeout("x".into())),
            false,
        );
        let options = PublishOptions {
            cache_on_error: true,
            local_only: false,
        };

        let outcome = publisher.publish(&attrs(), &record(3), "key1", options);

        assert_eq!(outcome, DeliveryOutcome::CachedOnError);
        // Telemetria tentada mesmo após erro nos atributos
        assert_eq!(transport.call_count(), 2);
        assert_eq!(cached(&publisher, "key1").len(), 1);
    }

    #[test]
    fn failure_without_cache_drops() {
        let (tmp, _transport, publisher) = setup(ScriptedTransport::new(vec![Ok(200), Ok(503)]), false);
        let outcome = publisher.publish(&attrs(), &record(3), "key1", PublishOptions::default());
        assert_eq!(outcome, DeliveryOutcome::DroppedNoCache);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn non_200_success_codes_are_failures() {
        let (_tmp, _transport, publisher) = setup(ScriptedTransport::always(204), false);
        let options = PublishOptions {
            cache_on_error: true,
            local_only: false,
        };
        let outcome = publisher.publish(&attrs(), &record(3), "key1", options);
        assert_eq!(outcome, DeliveryOutcome::CachedOnError);
    }

    #[test]
    fn unwritable_cache_degrades_to_drop() {
        let tmp = TempDir::new().unwrap();
        // Um arquivo no lugar do diretório de cache
        let blocker = tmp.path().join("cache");
        std::fs::write(&blocker, "").unwrap();
        let publisher = Publisher::new(
            ConnectionConfig::default(),
            CacheStore::new(&blocker),
            Arc::new(ScriptedTransport::always(500)),
            false,
        );
        let options = PublishOptions {
            cache_on_error: true,
            local_only: false,
        };
        let outcome = publisher.publish(&attrs(), &record(3), "key1", options);
        assert_eq!(outcome, DeliveryOutcome::DroppedNoCache);
    }
}
