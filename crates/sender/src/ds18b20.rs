//! Sensor 1-Wire DS18B20 lido via sysfs.
//!
//! Formato do `w1_slave`:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```

use crate::sources::TelemetrySource;
use std::path::PathBuf;
use telemetry_core::{Reading, SourceReading};
use tracing::warn;

pub struct Ds18b20Source {
    device: PathBuf,
    label: String,
}

impl Ds18b20Source {
    pub fn new(device: PathBuf, label: String) -> Self {
        Self { device, label }
    }

    fn key(&self) -> String {
        format!("temp{}", self.label)
    }
}

impl TelemetrySource for Ds18b20Source {
    fn name(&self) -> &'static str {
        "ds18b20"
    }

    fn read(&mut self) -> SourceReading {
        let mut reading = SourceReading::default();
        let value = std::fs::read_to_string(&self.device)
            .map_err(|e| e.to_string())
            .and_then(|raw| parse_w1_slave(&raw));

        match value {
            Ok(temp_f) => reading.tele(self.key(), temp_f),
            Err(reason) => {
                warn!("DS18B20 {}: {reason}", self.device.display());
                reading.tele(self.key(), Reading::failed(reason));
            }
        }
        reading
    }
}

/// Extrai a temperatura em °F (1 casa decimal) do conteúdo do `w1_slave`.
pub fn parse_w1_slave(raw: &str) -> Result<f64, String> {
    let mut lines = raw.lines();
    let crc = lines.next().ok_or("arquivo vazio")?;
    if !crc.trim_end().ends_with("YES") {
        return Err("CRC inválido".into());
    }

    let data = lines.next().ok_or("segunda linha ausente")?;
    let (_, milli) = data.split_once("t=").ok_or("campo t= ausente")?;
    let milli: i64 = milli.trim().parse().map_err(|_| format!("valor inválido: {milli}"))?;

    let celsius = milli as f64 / 1000.0;
    let fahrenheit = celsius * 9.0 / 5.0 + 32.0;
    Ok((fahrenheit * 10.0).round() / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_core::TelemetryValue;

    const SAMPLE: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=23125\n";

    #[test]
    fn parses_fahrenheit() {
        assert_eq!(parse_w1_slave(SAMPLE).unwrap(), 73.6);
    }

    #[test]
    fn negative_temperatures() {
        let raw = "ff ff : crc=00 YES\nff ff t=-10000\n";
        assert_eq!(parse_w1_slave(raw).unwrap(), 14.0);
    }

    #[test]
    fn rejects_bad_crc() {
        let raw = "72 01 : crc=57 NO\n72 01 t=23125\n";
        assert!(parse_w1_slave(raw).is_err());
    }

    #[test]
    fn reads_file_with_label() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("w1_slave");
        std::fs::write(&path, SAMPLE).unwrap();

        let mut source = Ds18b20Source::new(path, "_freezer".into());
        let reading = source.read();
        assert_eq!(
            reading.telemetry["temp_freezer"],
            Reading::Value(TelemetryValue::Float(73.6))
        );
    }

    #[test]
    fn missing_file_is_an_explicit_failure() {
        let mut source = Ds18b20Source::new(PathBuf::from("/nonexistent/w1_slave"), "_a".into());
        assert!(matches!(source.read().telemetry["temp_a"], Reading::Failed(_)));
    }
}
