use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::{
    error::WeatherError,
    model::{Coordinates, CurrentConditions, ForecastDay, LocationQuery, UnitSystem},
    provider::upcoming_days,
};

use super::WeatherProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

const CURRENT_PATH: &str = "/data/2.5/weather";
const FORECAST_PATH: &str = "/data/2.5/onecall";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: Option<String>,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    /// A provider without a key is valid; every lookup then fails with
    /// [`WeatherError::MissingCredential`].
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            http: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_key(&self) -> Result<&str, WeatherError> {
        self.api_key.as_deref().ok_or(WeatherError::MissingCredential)
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(StatusCode, String), WeatherError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "Sending OpenWeather request");

        let res = self.http.get(&url).query(query).send().await?;
        let status = res.status();
        let body = res.text().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn fetch_current(
        &self,
        location: &LocationQuery,
        units: UnitSystem,
    ) -> Result<CurrentConditions, WeatherError> {
        let api_key = self.api_key()?;

        let mut query = match location {
            LocationQuery::Name { value } => vec![("q", value.clone())],
            LocationQuery::Coords { lat, lon } => {
                vec![("lat", lat.to_string()), ("lon", lon.to_string())]
            }
        };
        query.push(("units", units.api_param().to_string()));
        query.push(("appid", api_key.to_string()));

        let (status, body) = self.get(CURRENT_PATH, &query).await?;

        if !status.is_success() {
            tracing::debug!(%status, body = %truncate_body(&body), "OpenWeather current request failed");
            return Err(WeatherError::LocationNotFound {
                by_coords: !location.is_name(),
            });
        }

        let conditions = parse_current(&body)?;
        tracing::info!(location = %conditions.location_name, %units, "Fetched current conditions");
        Ok(conditions)
    }

    async fn try_fetch_forecast(
        &self,
        lat: f64,
        lon: f64,
        units: UnitSystem,
    ) -> Result<Vec<ForecastDay>, WeatherError> {
        let api_key = self.api_key()?;

        let query = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("exclude", "minutely,hourly,alerts".to_string()),
            ("units", units.api_param().to_string()),
            ("appid", api_key.to_string()),
        ];

        let (status, body) = self.get(FORECAST_PATH, &query).await?;

        if !status.is_success() {
            return Err(WeatherError::ForecastUnavailable(format!(
                "status {}: {}",
                status,
                truncate_body(&body)
            )));
        }

        parse_forecast(&body)
    }
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: u8,
}

#[derive(Debug, Default, Deserialize)]
struct OwWeather {
    icon: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    #[serde(default)]
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    coord: OwCoord,
    name: String,
    sys: Option<OwSys>,
    main: OwMain,
    wind: Option<OwWind>,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Default, Deserialize)]
struct OwDailyTemp {
    min: Option<f64>,
    max: Option<f64>,
    day: Option<f64>,
    night: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwDaily {
    dt: i64,
    #[serde(default)]
    temp: OwDailyTemp,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwOneCallResponse {
    #[serde(default)]
    daily: Vec<OwDaily>,
}

pub(crate) fn parse_current(body: &str) -> Result<CurrentConditions, WeatherError> {
    let parsed: OwCurrentResponse = serde_json::from_str(body)
        .map_err(|e| WeatherError::Parse(format!("current conditions: {e}")))?;

    let OwWeather { icon, description } = parsed.weather.into_iter().next().unwrap_or_default();

    Ok(CurrentConditions {
        location_name: parsed.name,
        country: parsed.sys.and_then(|s| s.country),
        coords: Coordinates::new(parsed.coord.lat, parsed.coord.lon),
        temperature: parsed.main.temp,
        feels_like: parsed.main.feels_like,
        humidity_pct: parsed.main.humidity,
        wind_speed: parsed.wind.map(|w| w.speed).unwrap_or_default(),
        description,
        icon,
    })
}

pub(crate) fn parse_forecast(body: &str) -> Result<Vec<ForecastDay>, WeatherError> {
    let parsed: OwOneCallResponse = serde_json::from_str(body)
        .map_err(|e| WeatherError::ForecastUnavailable(format!("invalid forecast body: {e}")))?;

    upcoming_days(parsed.daily)
        .into_iter()
        .map(|d| {
            let date = DateTime::from_timestamp(d.dt, 0).ok_or_else(|| {
                WeatherError::ForecastUnavailable(format!("invalid timestamp {}", d.dt))
            })?;
            let OwWeather { icon, description } = d.weather.into_iter().next().unwrap_or_default();

            Ok(ForecastDay {
                date,
                min: d.temp.min.or(d.temp.night).unwrap_or_default(),
                max: d.temp.max.or(d.temp.day).unwrap_or_default(),
                description,
                icon,
            })
        })
        .collect()
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
