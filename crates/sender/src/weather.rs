//! Condições climáticas via OpenWeatherMap e Weather Underground.
//!
//! O parse é separado da chamada HTTP para ser testável com JSON fixo.

use crate::sources::TelemetrySource;
use serde_json::Value;
use telemetry_core::config::WeatherConfig;
use telemetry_core::{Reading, SourceReading};
use tracing::warn;

/// GET simples; qualquer coisa diferente de 200 vira erro.
fn fetch_json(request: reqwest::blocking::RequestBuilder) -> Result<Value, String> {
    let response = request.send().map_err(|e| e.to_string())?;
    let status = response.status();
    if status.as_u16() != 200 {
        return Err(format!("servidor de clima retornou {status}"));
    }
    let body = response.text().map_err(|e| e.to_string())?;
    serde_json::from_str(&body).map_err(|e| e.to_string())
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

fn field(root: &Value, path: &[&str]) -> Result<f64, String> {
    let mut v = root;
    for key in path {
        v = v.get(key).ok_or_else(|| format!("campo ausente: {}", path.join(".")))?;
    }
    number(v).ok_or_else(|| format!("campo não numérico: {}", path.join(".")))
}

/// Sensação térmica (fórmula NWS, °F e mph). Sem vento ou calor: a própria temperatura.
pub fn wind_chill(temp_f: f64, wind_mph: f64) -> f64 {
    if wind_mph >= 3.0 && temp_f <= 50.0 {
        let v = wind_mph.powf(0.16);
        (35.74 + 0.6215 * temp_f - 35.75 * v + 0.4275 * temp_f * v).trunc()
    } else {
        temp_f
    }
}

// ──────────────────────────────────────────────
// OpenWeatherMap
// ──────────────────────────────────────────────

pub struct OwmSource {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    zip: String,
    label: String,
}

impl OwmSource {
    pub fn new(client: reqwest::blocking::Client, weather: &WeatherConfig, zip: String, label: String) -> Self {
        Self {
            client,
            url: weather.owm_url.clone(),
            api_key: weather.owm_api_key.clone(),
            zip,
            label,
        }
    }
}

impl TelemetrySource for OwmSource {
    fn name(&self) -> &'static str {
        "owm"
    }

    fn read(&mut self) -> SourceReading {
        let request = self.client.get(&self.url).query(&[
            ("zip", self.zip.as_str()),
            ("APPID", self.api_key.as_str()),
            ("mode", "json"),
        ]);
        fetch_json(request)
            .and_then(|json| parse_owm(&json, &self.label))
            .unwrap_or_else(|reason| {
                warn!("OpenWeatherMap ({}): {reason}", self.zip);
                failed(&self.label, reason)
            })
    }
}

/// Converte a resposta do OWM (temperatura em Kelvin) para a leitura.
pub fn parse_owm(json: &Value, label: &str) -> Result<SourceReading, String> {
    let kelvin = field(json, &["main", "temp"])?;
    let temp = (kelvin * 9.0 / 5.0 - 459.67).trunc();
    let wind = field(json, &["wind", "speed"])?;

    let mut reading = SourceReading::default();
    reading.tele(format!("temp{label}"), temp as i64);
    reading.tele("humidity", field(json, &["main", "humidity"])? as i64);
    reading.tele("wind_speed", wind);
    reading.tele("wind_chill", wind_chill(temp, wind.trunc()) as i64);
    reading.tele("pressure", field(json, &["main", "pressure"])? as i64);
    // Nem toda estação reporta direção/visibilidade
    if let Ok(deg) = field(json, &["wind", "deg"]) {
        reading.tele("wind_direction", deg);
    }
    if let Ok(vis) = field(json, &["visibility"]) {
        reading.tele("visibility", vis);
    }
    reading.attr("latitude", field(json, &["coord", "lat"])?);
    reading.attr("longitude", field(json, &["coord", "lon"])?);
    Ok(reading)
}

// ──────────────────────────────────────────────
// Weather Underground
// ──────────────────────────────────────────────

pub struct WundSource {
    client: reqwest::blocking::Client,
    url: String,
    location: String,
    label: String,
}

impl WundSource {
    pub fn new(client: reqwest::blocking::Client, weather: &WeatherConfig, location: String, label: String) -> Self {
        let url = format!(
            "{}/{}/geolookup/conditions/q/{location}.json",
            weather.wund_url.trim_end_matches('/'),
            weather.wund_api_key
        );
        Self {
            client,
            url,
            location,
            label,
        }
    }
}

impl TelemetrySource for WundSource {
    fn name(&self) -> &'static str {
        "wund"
    }

    fn read(&mut self) -> SourceReading {
        let request = self.client.get(&self.url);
        fetch_json(request)
            .and_then(|json| parse_wund(&json, &self.label))
            .unwrap_or_else(|reason| {
                warn!("Weather Underground ({}): {reason}", self.location);
                let mut reading = failed(&self.label, reason);
                reading.attr("weather_status", "error");
                reading
            })
    }
}

pub fn parse_wund(json: &Value, label: &str) -> Result<SourceReading, String> {
    let obs = json.get("current_observation").ok_or("current_observation ausente")?;

    let mut reading = SourceReading::default();
    reading.tele(format!("temp{label}"), field(obs, &["temp_f"])?);
    reading.tele("humidity", field(obs, &["relative_humidity"])? as i64);
    reading.tele("wind_speed", field(obs, &["wind_mph"])?);
    reading.tele("wind_direction", field(obs, &["wind_degrees"])?);
    reading.tele("pressure", field(obs, &["pressure_mb"])? as i64);

    // Campos opcionais: "NA" ou ausentes em algumas estações
    let optional: [(&str, &str, bool); 6] = [
        ("wind_chill", "windchill_f", true),
        ("wind_gusts", "wind_gust_mph", true),
        ("visibility", "visibility_mi", false),
        ("precip_today", "precip_today_in", false),
        ("dewpoint", "dewpoint_f", true),
        ("uv_index", "UV", true),
    ];
    for (key, source_key, integer) in optional {
        match field(obs, &[source_key]) {
            Ok(v) if integer => reading.tele(key, v as i64),
            Ok(v) => reading.tele(key, v),
            Err(reason) => reading.tele(key, Reading::failed(reason)),
        }
    }

    if let Some(loc) = obs.get("observation_location") {
        if let Ok(lat) = field(loc, &["latitude"]) {
            reading.attr("latitude", lat);
        }
        if let Ok(lon) = field(loc, &["longitude"]) {
            reading.attr("longitude", lon);
        }
    }
    Ok(reading)
}

fn failed(label: &str, reason: String) -> SourceReading {
    let mut reading = SourceReading::default();
    reading.tele(format!("temp{label}"), Reading::failed(reason));
    reading
}
