//! Fontes de telemetria – uma interface, várias implementações.
//!
//! Falhas de leitura voltam como [`Reading::Failed`](telemetry_core::Reading)
//! no campo afetado; uma fonte nunca interrompe o ciclo.

use crate::ds18b20::Ds18b20Source;
use crate::simulated::SimulatedSource;
use crate::weather::{OwmSource, WundSource};
use telemetry_core::config::{ConnectionConfig, SourceConfig, WeatherConfig};
use telemetry_core::transport::{TransportError, build_client};
use telemetry_core::SourceReading;

/// Uma fonte de atributos + telemetria para um dispositivo.
pub trait TelemetrySource {
    /// Nome curto para logs.
    fn name(&self) -> &'static str;

    fn read(&mut self) -> SourceReading;
}

/// Instancia a fonte configurada para um dispositivo (`None` = sem sensor).
pub fn build_source(
    source: &SourceConfig,
    weather: &WeatherConfig,
    connection: &ConnectionConfig,
) -> Result<Option<Box<dyn TelemetrySource>>, TransportError> {
    let source: Box<dyn TelemetrySource> = match source {
        SourceConfig::None => return Ok(None),
        SourceConfig::Simulated { temp_low, temp_high } => {
            Box::new(SimulatedSource::new(*temp_low, *temp_high))
        }
        SourceConfig::Ds18b20 { device, label } => Box::new(Ds18b20Source::new(device.clone(), label.clone())),
        SourceConfig::Owm { zip, label } => Box::new(OwmSource::new(
            build_client(connection)?,
            weather,
            zip.clone(),
            label.clone(),
        )),
        SourceConfig::Wund { location, label } => Box::new(WundSource::new(
            build_client(connection)?,
            weather,
            location.clone(),
            label.clone(),
        )),
    };
    Ok(Some(source))
}
