//! Daily forecasts from IPMA (Instituto Português do Mar e da Atmosfera).

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::util::{read_limited_bytes, BodyError};

const MAX_FORECAST_SIZE: usize = 2 * 1024 * 1024; // 2MB

/// IPMA's "no value" marker for temperatures.
const MISSING_TEMPERATURE: &str = "-99";

/// IPMA location codes and display names.
pub const DEFAULT_LOCATIONS: &[(&str, &str)] = &[
    ("1110600", "Lisboa"),
    ("1131200", "Porto"),
    ("1060300", "Coimbra"),
    ("1080500", "Faro"),
];

/// Weather type descriptions indexed by IPMA's `idTipoTempo`.
const WEATHER_TYPES: &[&str] = &[
    "Sem informação",
    "Céu limpo",
    "Céu pouco nublado",
    "Céu parcialmente nublado",
    "Céu muito nublado ou encoberto",
    "Céu nublado por nuvens altas",
    "Aguaceiros",
    "Aguaceiros fracos",
    "Aguaceiros fortes",
    "Chuva",
    "Chuva fraca ou chuvisco",
    "Chuva forte",
    "Períodos de chuva",
    "Períodos de chuva fraca",
    "Períodos de chuva forte",
    "Chuvisco",
    "Neblina",
    "Nevoeiro ou nuvens baixas",
    "Neve",
    "Trovoada",
    "Aguaceiros e trovoada",
    "Granizo",
    "Geada",
    "Chuva forte e trovoada",
    "Nebulosidade convectiva",
    "Céu com periodos muito nublado",
    "Nevoeiro",
    "Céu nublado",
];

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Request failed: {0}")]
    Network(reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Unexpected forecast payload: {0}")]
    Decode(String),
    #[error("Forecast unavailable: {0}")]
    Body(#[from] BodyError),
}

/// One location's forecast for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherReport {
    pub date: NaiveDate,
    pub location: String,
    pub temp_min: String,
    pub temp_max: String,
    pub weather_type: String,
}

/// Supplies per-location forecasts for a date.
pub trait ForecastSource {
    fn reports(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<WeatherReport>, WeatherError>> + Send;
}

/// A single forecast period as published by IPMA. Numeric fields arrive as
/// either JSON numbers or strings depending on the endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpmaEntry {
    #[serde(default)]
    data_prev: String,
    #[serde(default, deserialize_with = "string_or_number")]
    t_max: String,
    #[serde(default, deserialize_with = "string_or_number")]
    t_min: String,
    #[serde(default, deserialize_with = "string_or_number")]
    id_tipo_tempo: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn describe_weather_type(id: &str) -> &'static str {
    id.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| *n >= 0.0)
        .and_then(|n| WEATHER_TYPES.get(n as usize))
        .copied()
        .unwrap_or(WEATHER_TYPES[0])
}

/// Pick the first period of `date` that carries a real maximum temperature.
fn select_entry(entries: Vec<IpmaEntry>, date: NaiveDate) -> Option<IpmaEntry> {
    let prefix = date.format("%Y-%m-%d").to_string();
    entries
        .into_iter()
        .find(|e| e.data_prev.starts_with(&prefix) && !e.t_max.starts_with(MISSING_TEMPERATURE))
}

/// [`ForecastSource`] backed by IPMA's public `alldata` endpoint.
#[derive(Clone)]
pub struct IpmaForecast {
    http: reqwest::Client,
    base_url: String,
    locations: Vec<(String, String)>,
}

impl IpmaForecast {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, WeatherError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(WeatherError::Network)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            locations: DEFAULT_LOCATIONS
                .iter()
                .map(|(code, name)| (code.to_string(), name.to_string()))
                .collect(),
        })
    }

    pub fn with_locations(mut self, locations: Vec<(String, String)>) -> Self {
        self.locations = locations;
        self
    }

    async fn fetch_entries(&self, code: &str) -> Result<Vec<IpmaEntry>, WeatherError> {
        let url = format!("{}/json/alldata/{}.json", self.base_url, code);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(WeatherError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::HttpStatus(status.as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_FORECAST_SIZE).await?;
        serde_json::from_slice(&bytes).map_err(|e| WeatherError::Decode(e.to_string()))
    }
}

impl ForecastSource for IpmaForecast {
    /// Locations that fail or have no usable period are skipped; the call
    /// only fails when every location failed to fetch.
    async fn reports(&self, date: NaiveDate) -> Result<Vec<WeatherReport>, WeatherError> {
        let mut reports = Vec::new();
        let mut last_error = None;

        for (code, name) in &self.locations {
            match self.fetch_entries(code).await {
                Ok(entries) => match select_entry(entries, date) {
                    Some(entry) => reports.push(WeatherReport {
                        date,
                        location: name.clone(),
                        temp_min: entry.t_min,
                        temp_max: entry.t_max,
                        weather_type: describe_weather_type(&entry.id_tipo_tempo).to_string(),
                    }),
                    None => {
                        tracing::debug!(location = %name, date = %date, "No usable forecast period")
                    }
                },
                Err(e) => {
                    tracing::warn!(location = %name, error = %e, "Forecast fetch failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if reports.is_empty() => Err(e),
            _ => Ok(reports),
        }
    }
}
