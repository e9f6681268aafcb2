use crate::{
    error::WeatherError,
    model::{CurrentConditions, ForecastDay, LocationQuery, UnitSystem},
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

pub use openweather::OpenWeatherProvider;

/// Number of forecast days shown after today.
pub const FORECAST_DAYS: usize = 5;

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Current conditions for a name or coordinate query.
    async fn fetch_current(
        &self,
        location: &LocationQuery,
        units: UnitSystem,
    ) -> Result<CurrentConditions, WeatherError>;

    /// Raw forecast lookup; errors are reported to the caller.
    async fn try_fetch_forecast(
        &self,
        lat: f64,
        lon: f64,
        units: UnitSystem,
    ) -> Result<Vec<ForecastDay>, WeatherError>;

    /// Forecast lookup that never fails: any error is logged and yields `None`.
    async fn fetch_forecast(&self, lat: f64, lon: f64, units: UnitSystem) -> Option<Vec<ForecastDay>> {
        match self.try_fetch_forecast(lat, lon, units).await {
            Ok(days) => Some(days),
            Err(e) => {
                let e = match e {
                    already @ WeatherError::ForecastUnavailable(_) => already,
                    other => WeatherError::ForecastUnavailable(other.to_string()),
                };
                tracing::warn!(lat, lon, error = %e, "Forecast fetch failed");
                None
            }
        }
    }
}

/// Drop today (index 0) and keep the following [`FORECAST_DAYS`] entries.
pub fn upcoming_days<T>(series: Vec<T>) -> Vec<T> {
    series.into_iter().skip(1).take(FORECAST_DAYS).collect()
}
