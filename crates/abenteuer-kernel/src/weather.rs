use abenteuer_contracts::{WeatherCondition, WeatherSummary};

/// WMO weather interpretation code to a coarse condition.
pub fn condition_from_wmo(code: u16) -> WeatherCondition {
    match code {
        0 => WeatherCondition::Sunny,
        1..=3 => WeatherCondition::Cloudy,
        45 | 48 => WeatherCondition::Foggy,
        51..=67 | 80..=82 => WeatherCondition::Rainy,
        71..=77 | 85 | 86 => WeatherCondition::Snowy,
        95..=u16::MAX => WeatherCondition::Stormy,
        _ => WeatherCondition::Unknown,
    }
}

/// Daily forecast values as reported by a forecast service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyForecast {
    pub weather_code: Option<u16>,
    pub temperature_max_c: Option<f64>,
    pub precipitation_probability_max: Option<f64>,
    pub precipitation_sum_mm: Option<f64>,
    pub wind_speed_max_kmh: Option<f64>,
}

impl DailyForecast {
    pub fn summarize(&self, source: &str) -> WeatherSummary {
        let condition = self
            .weather_code
            .map(condition_from_wmo)
            .unwrap_or(WeatherCondition::Unknown);
        let probability = self
            .precipitation_probability_max
            .map(|p| p.clamp(0.0, 100.0).round() as u8);
        let mut summary = WeatherSummary::new(condition, self.temperature_max_c, probability)
            .with_wind(self.wind_speed_max_kmh)
            .with_source(source);
        if self.precipitation_sum_mm.is_some_and(|mm| mm >= 0.5) {
            summary.precipitation = true;
        }
        summary
    }
}
