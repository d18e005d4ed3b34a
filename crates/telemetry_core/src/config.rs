//! Configuração unificada via TOML.
//!
//! Carregada uma vez na partida e passada explicitamente para publisher,
//! drainer e loop de coleta. Nada de estado global.

use crate::types::Attributes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Erros de configuração e de ambiente.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao ler {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Erro ao parsear {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao gravar {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Configuração inválida: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Diretório {kind} inacessível ({path}): {reason}")]
    Directory {
        kind: &'static str,
        path: PathBuf,
        reason: String,
    },
}

/// Conexão com o servidor de telemetria.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// "http" ou "https"
    pub scheme: String,
    /// Host[:porta] do servidor
    pub server: String,
    /// Timeout das chamadas HTTP (ausente = padrão do cliente)
    pub timeout_secs: Option<u64>,
    /// Proxy para todas as chamadas (vazio = direto)
    pub proxy: String,
    /// Envia `Idempotency-Key` ao reenviar linhas do cache
    pub idempotency_key: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            scheme: "http".into(),
            server: "demo.thingsboard.io".into(),
            timeout_secs: None,
            proxy: String::new(),
            idempotency_key: false,
        }
    }
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Diretórios locais e modo de operação global.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub cache_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Força todos os dispositivos a gravar só em cache
    pub local_only: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            log_dir: PathBuf::from("logs"),
            local_only: false,
        }
    }
}

/// Agendamento do loop de coleta.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Intervalo entre ciclos em segundos
    pub interval_secs: f64,
    /// Pausa entre dispositivos dentro de um ciclo
    pub device_delay_secs: f64,
    /// Loga o estado do cache no início de cada ciclo
    pub cache_check: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10.0,
            device_delay_secs: 0.0,
            cache_check: true,
        }
    }
}

/// APIs de clima (OpenWeatherMap / Weather Underground).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub owm_url: String,
    pub owm_api_key: String,
    pub wund_url: String,
    pub wund_api_key: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            owm_url: "http://api.openweathermap.org/data/2.5/weather".into(),
            owm_api_key: String::new(),
            wund_url: "http://api.wunderground.com/api".into(),
            wund_api_key: String::new(),
        }
    }
}

/// Fonte de telemetria de um dispositivo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Apenas atributos estáticos (+ host stats se habilitado)
    #[default]
    None,
    /// Valores aleatórios para testes de carga/demonstração
    Simulated { temp_low: i64, temp_high: i64 },
    /// Sensor 1-Wire DS18B20 (`/sys/bus/w1/devices/28-*/w1_slave`)
    Ds18b20 { device: PathBuf, label: String },
    /// OpenWeatherMap por CEP/ZIP
    Owm { zip: String, label: String },
    /// Weather Underground por localidade
    Wund { location: String, label: String },
}

/// Um dispositivo lógico.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Token de acesso do dispositivo no servidor
    pub auth_key: String,
    pub notes: String,
    pub active: bool,
    /// Mescla estatísticas do host na leitura
    pub sys_info: bool,
    pub cache_on_error: bool,
    /// Reenvia o cache deste dispositivo a cada ciclo
    pub clear_cache: bool,
    pub local_only: bool,
    /// Atributos estáticos (nome, local, contato…)
    pub attributes: Attributes,
    pub source: SourceConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            auth_key: String::new(),
            notes: String::new(),
            active: true,
            sys_info: false,
            cache_on_error: true,
            clear_cache: false,
            local_only: false,
            attributes: Attributes::new(),
            source: SourceConfig::None,
        }
    }
}

/// Configuração raiz do agente.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub storage: StorageConfig,
    pub poll: PollConfig,
    pub weather: WeatherConfig,
    pub devices: Vec<DeviceConfig>,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    ///
    /// Arquivo ausente devolve a configuração padrão.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("{} não encontrado, usando configuração padrão", path.display());
            return Ok(AppConfig::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str::<AppConfig>(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!(
            "Configuração carregada de {} ({} dispositivos)",
            path.display(),
            config.devices.len()
        );
        Ok(config)
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.connection.scheme != "http" && self.connection.scheme != "https" {
            errors.push(format!("Esquema inválido: {} (http|https)", self.connection.scheme));
        }
        if self.connection.server.trim().is_empty() {
            errors.push("Servidor não pode ser vazio".into());
        }
        if self.connection.timeout_secs == Some(0) {
            errors.push("timeout_secs não pode ser 0".into());
        }
        // NaN/inf passariam pelas comparações e quebrariam `Duration::from_secs_f64`
        if !(0.1..=86_400.0).contains(&self.poll.interval_secs) {
            errors.push(format!(
                "Intervalo de coleta inválido: {} (0.1–86400)",
                self.poll.interval_secs
            ));
        }
        if !self.poll.device_delay_secs.is_finite() || self.poll.device_delay_secs < 0.0 {
            errors.push(format!(
                "device_delay_secs inválido: {} (finito, >= 0)",
                self.poll.device_delay_secs
            ));
        }
        if self.devices.is_empty() {
            errors.push("Nenhum dispositivo configurado".into());
        }

        for (i, device) in self.devices.iter().enumerate() {
            if device.auth_key.trim().is_empty() {
                errors.push(format!("Dispositivo #{i}: auth_key vazio"));
            }
            if let SourceConfig::Simulated { temp_low, temp_high } = device.source {
                if temp_low >= temp_high {
                    errors.push(format!(
                        "Dispositivo #{i}: temp_low ({temp_low}) deve ser menor que temp_high ({temp_high})"
                    ));
                }
            }
        }

        errors
    }

    /// Como [`validate`](Self::validate), mas como erro tipado.
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Verifica se os diretórios de cache e log existem e aceitam escrita.
    pub fn check_directories(&self) -> Result<(), ConfigError> {
        check_writable_dir("cache", &self.storage.cache_dir)?;
        check_writable_dir("log", &self.storage.log_dir)?;
        Ok(())
    }
}

fn check_writable_dir(kind: &'static str, path: &Path) -> Result<(), ConfigError> {
    let err = |reason: String| ConfigError::Directory {
        kind,
        path: path.to_path_buf(),
        reason,
    };

    let meta = std::fs::metadata(path).map_err(|e| err(e.to_string()))?;
    if !meta.is_dir() {
        return Err(err("não é um diretório".into()));
    }

    // Sonda de escrita
    let probe = path.join(".write_probe");
    std::fs::write(&probe, b"").map_err(|e| err(e.to_string()))?;
    if let Err(e) = std::fs::remove_file(&probe) {
        warn!("Não foi possível remover {}: {e}", probe.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_device() -> AppConfig {
        AppConfig {
            devices: vec![DeviceConfig {
                auth_key: "TOKEN".into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn default_config_needs_devices() {
        let errors = AppConfig::default().validate();
        assert_eq!(errors, vec!["Nenhum dispositivo configurado".to_string()]);
    }

    #[test]
    fn config_with_device_is_valid() {
        let errors = one_device().validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn roundtrip_toml() {
        let mut config = one_device();
        config.devices[0].source = SourceConfig::Ds18b20 {
            device: PathBuf::from("/sys/bus/w1/devices/28-0000/w1_slave"),
            label: "_freezer".into(),
        };
        config.devices[0].attributes.insert("name".into(), "Lab Freezer".into());

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.devices[0].auth_key, "TOKEN");
        assert_eq!(parsed.devices[0].source, config.devices[0].source);
        assert_eq!(parsed.connection.server, config.connection.server);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[connection]
server = "tb.local:8080"

[[devices]]
auth_key = "abc"
local_only = true

[devices.attributes]
name = "Lab Freezer"
temp_low = 33

[devices.source]
type = "simulated"
temp_low = 33
temp_high = 39
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.connection.server, "tb.local:8080");
        // Outros campos devem ter valor padrão
        assert_eq!(config.connection.scheme, "http");
        assert_eq!(config.connection.timeout_secs, None);
        assert_eq!(config.poll.interval_secs, 10.0);

        let device = &config.devices[0];
        assert!(device.active);
        assert!(device.local_only);
        assert!(device.cache_on_error);
        assert_eq!(
            device.source,
            SourceConfig::Simulated {
                temp_low: 33,
                temp_high: 39
            }
        );
        assert_eq!(device.attributes.len(), 2);
    }

    #[test]
    fn rejects_inverted_simulated_range() {
        let mut config = one_device();
        config.devices[0].source = SourceConfig::Simulated {
            temp_low: 40,
            temp_high: 39,
        };
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn rejects_non_finite_poll_timing() {
        let partial = r#"
[poll]
interval_secs = nan
device_delay_secs = inf

[[devices]]
auth_key = "abc"
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        let errors = config.validate();
        assert_eq!(errors.len(), 2, "Erros: {:?}", errors);

        let mut config = one_device();
        config.poll.interval_secs = f64::INFINITY;
        config.poll.device_delay_secs = f64::NAN;
        assert_eq!(config.validate().len(), 2);
    }

    #[test]
    fn ensure_valid_wraps_errors() {
        assert!(one_device().ensure_valid().is_ok());
        match AppConfig::default().ensure_valid() {
            Err(ConfigError::Invalid(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("esperava Invalid, veio {other:?}"),
        }
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert!(config.devices.is_empty());
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[devices]]\nsource = { type = \"bogus\" }\n").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        one_device().save(&path).unwrap();
        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.devices.len(), 1);
    }

    #[test]
    fn missing_directories_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = one_device();
        config.storage.cache_dir = dir.path().join("cache");
        config.storage.log_dir = dir.path().to_path_buf();
        assert!(matches!(
            config.check_directories(),
            Err(ConfigError::Directory { kind: "cache", .. })
        ));

        std::fs::create_dir(&config.storage.cache_dir).unwrap();
        assert!(config.check_directories().is_ok());
    }
}
