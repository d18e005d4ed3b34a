//! Fonte simulada – valores aleatórios em faixas fixas.

use crate::sources::TelemetrySource;
use rand::Rng;
use telemetry_core::SourceReading;

pub struct SimulatedSource {
    temp_low: i64,
    temp_high: i64,
}

impl SimulatedSource {
    pub fn new(temp_low: i64, temp_high: i64) -> Self {
        Self { temp_low, temp_high }
    }
}

impl TelemetrySource for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn read(&mut self) -> SourceReading {
        let mut rng = rand::rng();
        let mut reading = SourceReading::default();

        // Faixa inválida (config não validada) vira valor fixo
        let temp = if self.temp_low < self.temp_high {
            rng.random_range(self.temp_low..self.temp_high)
        } else {
            self.temp_low
        };
        reading.tele("temp", temp);
        reading.tele("cpu_temp", rng.random_range(100..120_i64));
        reading.tele("ram_used", rng.random_range(60..80_i64));
        reading.tele("disk_used", rng.random_range(60..80_i64));
        reading.tele("cpu_used", rng.random_range(25..28_i64));
        reading.attr("platform", "Simulated");
        reading
    }
}
