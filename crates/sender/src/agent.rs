//! Loop de coleta – um ciclo percorre os dispositivos em ordem de configuração.
//!
//! `run` só agenda ciclos; a unidade de trabalho é `poll_device`, testável
//! sem o loop infinito.

use crate::monitor::HostMonitor;
use crate::sources::{TelemetrySource, build_source};
use std::sync::Arc;
use std::time::Duration;
use telemetry_core::cache::{CacheHealth, CacheStore};
use telemetry_core::config::AppConfig;
use telemetry_core::drainer::Drainer;
use telemetry_core::publisher::{PublishOptions, Publisher};
use telemetry_core::transport::{Transport, TransportError};
use telemetry_core::{DeliveryOutcome, SourceReading, TelemetryRecord};
use tracing::{debug, info, warn};

/// Resultado de um dispositivo dentro de um ciclo.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReport {
    pub device_key: String,
    /// `None` = dispositivo inativo
    pub outcome: Option<DeliveryOutcome>,
}

/// Resultado de um ciclo completo.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// `None` quando a checagem de cache está desligada
    pub cache: Option<CacheHealth>,
    pub devices: Vec<DeviceReport>,
}

pub struct Agent {
    config: AppConfig,
    cache: CacheStore,
    publisher: Publisher,
    drainer: Drainer,
    host: Option<Box<dyn TelemetrySource>>,
    /// Alinhado com `config.devices`
    sensors: Vec<Option<Box<dyn TelemetrySource>>>,
}

impl Agent {
    /// Monta o agente com as fontes reais descritas na configuração.
    pub fn new(config: AppConfig, transport: Arc<dyn Transport>) -> Result<Self, TransportError> {
        let host: Option<Box<dyn TelemetrySource>> = if config.devices.iter().any(|d| d.sys_info) {
            Some(Box::new(HostMonitor::new()))
        } else {
            None
        };

        let mut sensors = Vec::with_capacity(config.devices.len());
        for device in &config.devices {
            let source = build_source(&device.source, &config.weather, &config.connection)?;
            if let Some(s) = &source {
                debug!("[{}] Fonte: {}", device.auth_key, s.name());
            }
            sensors.push(source);
        }

        Ok(Self::with_sources(config, transport, host, sensors))
    }

    /// Monta o agente com fontes já instanciadas.
    pub fn with_sources(
        config: AppConfig,
        transport: Arc<dyn Transport>,
        host: Option<Box<dyn TelemetrySource>>,
        sensors: Vec<Option<Box<dyn TelemetrySource>>>,
    ) -> Self {
        let cache = CacheStore::new(&config.storage.cache_dir);
        let publisher = Publisher::new(
            config.connection.clone(),
            cache.clone(),
            transport.clone(),
            config.storage.local_only,
        );
        let drainer = Drainer::new(config.connection.clone(), cache.clone(), transport);

        Self {
            config,
            cache,
            publisher,
            drainer,
            host,
            sensors,
        }
    }

    /// Roda para sempre: um ciclo, pausa fixa, repete.
    pub fn run(&mut self) -> ! {
        let interval = Duration::from_secs_f64(self.config.poll.interval_secs);
        loop {
            let report = self.poll_cycle();
            let delivered = report
                .devices
                .iter()
                .filter(|d| d.outcome == Some(DeliveryOutcome::Delivered))
                .count();
            info!(
                "Ciclo concluído: {}/{} dispositivos publicados",
                delivered,
                report.devices.len()
            );
            std::thread::sleep(interval);
        }
    }

    /// Um ciclo: checagem do cache e depois cada dispositivo em ordem.
    pub fn poll_cycle(&mut self) -> CycleReport {
        let cache = self.config.poll.cache_check.then(|| self.cache.health_check());
        if cache == Some(CacheHealth::Unknown) {
            warn!("Estado do cache desconhecido, seguindo com a coleta");
        }

        let delay = Duration::from_secs_f64(self.config.poll.device_delay_secs);
        let count = self.config.devices.len();
        let mut devices = Vec::with_capacity(count);

        for index in 0..count {
            let outcome = self.poll_device(index);
            devices.push(DeviceReport {
                device_key: self.config.devices[index].auth_key.clone(),
                outcome,
            });
            if !delay.is_zero() && index + 1 < count {
                std::thread::sleep(delay);
            }
        }

        CycleReport { cache, devices }
    }

    /// Processa um dispositivo: reenvio do cache (se pedido), coleta e publicação.
    pub fn poll_device(&mut self, index: usize) -> Option<DeliveryOutcome> {
        let device = self.config.devices.get(index)?;
        let key = device.auth_key.as_str();

        if device.clear_cache {
            let report = self.drainer.drain(key);
            if !report.is_empty() {
                info!(
                    "[{key}] Reenvio: {} registros aceitos, {}/{} arquivos limpos",
                    report.accepted(),
                    report.cleared(),
                    report.files.len()
                );
            }
        }

        if !device.active {
            debug!("[{key}] Inativo, ignorando");
            return None;
        }

        // Atributos estáticos < host < sensor (o último vence)
        let mut reading = SourceReading {
            attributes: device.attributes.clone(),
            ..Default::default()
        };
        if device.sys_info {
            if let Some(host) = self.host.as_mut() {
                reading.merge(host.read());
            }
        }
        if let Some(Some(sensor)) = self.sensors.get_mut(index) {
            reading.merge(sensor.read());
        }

        let (attributes, telemetry, failures) = reading.into_publishable();
        for (field, reason) in &failures {
            warn!("[{key}] Campo {field} indisponível: {reason}");
        }

        let record = TelemetryRecord::now(telemetry);
        let options = PublishOptions {
            cache_on_error: device.cache_on_error,
            local_only: device.local_only,
        };
        let outcome = self.publisher.publish(&attributes, &record, key, options);
        info!(
            "[{key}] {} campos de telemetria → {outcome}",
            record.values.len()
        );
        Some(outcome)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_core::config::DeviceConfig;
    use telemetry_core::transport::ScriptedTransport;
    use telemetry_core::{Reading, TelemetryValue};
    use tempfile::TempDir;

    /// Fonte fixa para testes.
    struct FixedSource(SourceReading);

    impl TelemetrySource for FixedSource {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn read(&mut self) -> SourceReading {
            self.0.clone()
        }
    }

    fn fixed(attrs: &[(&str, &str)], tele: &[(&str, Reading)]) -> Box<dyn TelemetrySource> {
        let mut reading = SourceReading::default();
        for (k, v) in attrs {
            reading.attr(*k, *v);
        }
        for (k, v) in tele {
            reading.tele(*k, v.clone());
        }
        Box::new(FixedSource(reading))
    }

    fn device(key: &str) -> DeviceConfig {
        DeviceConfig {
            auth_key: key.into(),
            ..Default::default()
        }
    }

    fn config(tmp: &TempDir, devices: Vec<DeviceConfig>) -> AppConfig {
        let mut config = AppConfig {
            devices,
            ..Default::default()
        };
        config.storage.cache_dir = tmp.path().join("cache");
        std::fs::create_dir_all(&config.storage.cache_dir).unwrap();
        config
    }

    fn temp_sensor(temp: i64) -> Option<Box<dyn TelemetrySource>> {
        Some(fixed(&[], &[("temp", Reading::from(temp))]))
    }

    #[test]
    fn devices_are_polled_in_order() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, vec![device("a"), device("b")]);
        let transport = Arc::new(ScriptedTransport::always(200));
        let mut agent = Agent::with_sources(config, transport.clone(), None, vec![temp_sensor(1), temp_sensor(2)]);

        let report = agent.poll_cycle();

        let keys: Vec<&str> = report.devices.iter().map(|d| d.device_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(report.devices.iter().all(|d| d.outcome == Some(DeliveryOutcome::Delivered)));
        let urls: Vec<String> = transport.calls().into_iter().map(|c| c.url).collect();
        assert!(urls[0].ends_with("/a/attributes"));
        assert!(urls[1].ends_with("/a/telemetry"));
        assert!(urls[2].ends_with("/b/attributes"));
    }

    #[test]
    fn inactive_device_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let mut off = device("off");
        off.active = false;
        let config = config(&tmp, vec![off]);
        let transport = Arc::new(ScriptedTransport::always(200));
        let mut agent = Agent::with_sources(config, transport.clone(), None, vec![temp_sensor(1)]);

        assert_eq!(agent.poll_device(0), None);
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn sensor_overrides_host_and_static_attributes() {
        let tmp = TempDir::new().unwrap();
        let mut dev = device("k");
        dev.sys_info = true;
        dev.attributes.insert("platform".into(), "Raspberry Pi".into());
        dev.attributes.insert("name".into(), "Lab Freezer".into());
        let config = config(&tmp, vec![dev]);

        let host = fixed(
            &[("platform", "Linux")],
            &[("temp", Reading::from(1)), ("cpu_used", Reading::from(12.5))],
        );
        let sensor = fixed(&[], &[("temp", Reading::from(38))]);
        let transport = Arc::new(ScriptedTransport::always(200));
        let mut agent = Agent::with_sources(config, transport.clone(), Some(host), vec![Some(sensor)]);

        agent.poll_device(0);

        let calls = transport.calls();
        assert_eq!(calls[0].body, r#"{"name":"Lab Freezer","platform":"Linux"}"#);
        assert_eq!(calls[1].body, r#"{"cpu_used":12.5,"temp":38}"#);
    }

    #[test]
    fn host_stats_only_when_enabled() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, vec![device("k")]);
        let host = fixed(&[], &[("cpu_used", Reading::from(12.5))]);
        let transport = Arc::new(ScriptedTransport::always(200));
        let mut agent = Agent::with_sources(config, transport.clone(), Some(host), vec![temp_sensor(5)]);

        agent.poll_device(0);

        assert_eq!(transport.calls()[1].body, r#"{"temp":5}"#);
    }

    #[test]
    fn failed_fields_are_reported_not_published() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, vec![device("k")]);
        let sensor = fixed(&[], &[("temp", Reading::failed("sem sensor"))]);
        let transport = Arc::new(ScriptedTransport::always(200));
        let mut agent = Agent::with_sources(config, transport.clone(), None, vec![Some(sensor)]);

        agent.poll_device(0);

        let calls = transport.calls();
        assert_eq!(calls[0].body, r#"{"temp_error":"sem sensor"}"#);
        assert_eq!(calls[1].body, "{}");
    }

    #[test]
    fn local_only_device_goes_to_cache() {
        let tmp = TempDir::new().unwrap();
        let mut dev = device("key1");
        dev.local_only = true;
        dev.cache_on_error = false;
        let config = config(&tmp, vec![dev]);
        let cache = CacheStore::new(&config.storage.cache_dir);
        let transport = Arc::new(ScriptedTransport::always(200));
        let mut agent = Agent::with_sources(config, transport.clone(), None, vec![temp_sensor(5)]);

        assert_eq!(agent.poll_device(0), Some(DeliveryOutcome::CachedLocalOnly));
        assert_eq!(transport.call_count(), 0);
        let records = cache.read_records(&cache.today_path("key1")).unwrap();
        assert_eq!(records[0].values["temp"], TelemetryValue::Integer(5));
    }

    #[test]
    fn clear_cache_drains_before_publishing() {
        let tmp = TempDir::new().unwrap();
        let mut dev = device("key1");
        dev.clear_cache = true;
        let config = config(&tmp, vec![dev]);
        let cache = CacheStore::new(&config.storage.cache_dir);
        let old = TelemetryRecord {
            ts: 42,
            values: [("temp".to_string(), TelemetryValue::Integer(1))].into(),
        };
        let cached = cache.append("key1", &old).unwrap();

        let transport = Arc::new(ScriptedTransport::always(200));
        let mut agent = Agent::with_sources(config, transport.clone(), None, vec![temp_sensor(5)]);

        assert_eq!(agent.poll_device(0), Some(DeliveryOutcome::Delivered));
        assert!(!cached.exists());
        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        // Reenvio primeiro, com o timestamp original
        assert_eq!(calls[0].body, r#"{"ts":42,"values":{"temp":1}}"#);
        assert!(calls[1].url.ends_with("/attributes"));
    }

    #[test]
    fn missing_cache_dir_does_not_stop_cycle() {
        let tmp = TempDir::new().unwrap();
        let mut config = config(&tmp, vec![device("k")]);
        config.storage.cache_dir = tmp.path().join("gone");
        let transport = Arc::new(ScriptedTransport::always(200));
        let mut agent = Agent::with_sources(config, transport, None, vec![temp_sensor(5)]);

        let report = agent.poll_cycle();

        assert_eq!(report.cache, Some(CacheHealth::Unknown));
        assert_eq!(report.devices[0].outcome, Some(DeliveryOutcome::Delivered));
    }

    #[test]
    fn server_down_caches_every_cycle() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, vec![device("k")]);
        let cache = CacheStore::new(&config.storage.cache_dir);
        let transport = Arc::new(ScriptedTransport::always(502));
        let mut agent = Agent::with_sources(config, transport, None, vec![temp_sensor(5)]);

        for _ in 0..3 {
            agent.poll_cycle();
        }

        assert_eq!(cache.health_check(), CacheHealth::Pending { files: 1, records: 3 });
    }
}
