use std::time::Duration;

use abenteuer_config::Weather;
use abenteuer_contracts::WeatherSummary;
use abenteuer_kernel::weather::DailyForecast;
use abenteuer_kernel::{CallError, WeatherSource};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;

use crate::transport_error;

const DAILY_FIELDS: &str =
    "weather_code,temperature_2m_max,precipitation_probability_max,precipitation_sum,wind_speed_10m_max";

pub struct OpenMeteoWeather {
    client: Client,
    base_url: String,
}

impl OpenMeteoWeather {
    pub fn new(cfg: &Weather) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            base_url: cfg.base_url.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    daily: Option<DailyBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct DailyBlock {
    #[serde(default)]
    weather_code: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m_max: Vec<Option<f64>>,
}

fn first(values: &[Option<f64>]) -> Option<f64> {
    values.first().copied().flatten()
}

impl DailyBlock {
    fn forecast(&self) -> DailyForecast {
        DailyForecast {
            weather_code: first(&self.weather_code)
                .filter(|c| *c >= 0.0 && *c <= f64::from(u16::MAX))
                .map(|c| c as u16),
            temperature_max_c: first(&self.temperature_2m_max),
            precipitation_probability_max: first(&self.precipitation_probability_max),
            precipitation_sum_mm: first(&self.precipitation_sum),
            wind_speed_max_kmh: first(&self.wind_speed_10m_max),
        }
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoWeather {
    async fn get_weather(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
    ) -> Result<WeatherSummary, CallError> {
        let day = date.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("daily", DAILY_FIELDS.to_string()),
                ("timezone", "Europe/Berlin".to_string()),
                ("start_date", day.clone()),
                ("end_date", day),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(CallError::Status {
                status: response.status().as_u16(),
            });
        }
        let body: ForecastResponse = response
            .json()
            .await
            .map_err(|e| CallError::InvalidResponse(e.to_string()))?;
        let daily = body
            .daily
            .ok_or_else(|| CallError::InvalidResponse("missing daily block".to_string()))?;
        Ok(daily.forecast().summarize("open-meteo"))
    }
}
