//! Session state and the controller that drives it.
//!
//! Every mutation of [`SessionState`] goes through [`WeatherController`].
//! Current conditions are fetched inline; the forecast follows as a detached
//! task that only ever writes the `forecast` field.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::task::JoinHandle;

use crate::{
    error::WeatherError,
    geolocation::Geolocator,
    model::{Coordinates, CurrentConditions, ForecastDay, LocationQuery, UnitSystem},
    provider::WeatherProvider,
    store::LocationStore,
};

/// Everything the presentation layer needs to render a frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    /// Raw contents of the search box.
    pub current_query: String,
    /// Location of the last successful current-conditions lookup.
    pub active_location: Option<LocationQuery>,
    pub conditions: Option<CurrentConditions>,
    pub forecast: Option<Vec<ForecastDay>>,
    pub loading: bool,
    pub error: Option<String>,
    pub units: UnitSystem,
}

pub struct WeatherController {
    state: Arc<Mutex<SessionState>>,
    provider: Arc<dyn WeatherProvider>,
    store: Arc<dyn LocationStore>,
    geolocator: Option<Arc<dyn Geolocator>>,
    /// Bumped on every lookup; responses tagged with an older value are dropped.
    generation: Arc<AtomicU64>,
    forecast_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WeatherController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherController")
            .field("state", &*self.state.lock())
            .field("provider", &self.provider)
            .field("store", &self.store)
            .field("geolocator", &self.geolocator)
            .finish_non_exhaustive()
    }
}

impl WeatherController {
    /// Creates a session, restoring the active location from `store`.
    ///
    /// Pass `None` as `geolocator` when the runtime cannot locate the user.
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        store: Arc<dyn LocationStore>,
        geolocator: Option<Arc<dyn Geolocator>>,
        units: UnitSystem,
    ) -> Self {
        let active_location = store.load();
        if let Some(location) = &active_location {
            tracing::debug!(%location, "Restored last search");
        }

        let state = SessionState {
            active_location,
            units,
            ..SessionState::default()
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            provider,
            store,
            geolocator,
            generation: Arc::new(AtomicU64::new(0)),
            forecast_tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn units(&self) -> UnitSystem {
        self.state.lock().units
    }

    pub fn set_query(&self, input: impl Into<String>) {
        self.state.lock().current_query = input.into();
    }

    /// Searches for whatever is in the search box.
    pub async fn submit(&self) {
        let query = self.state.lock().current_query.clone();
        self.search_by_name(&query).await;
    }

    /// Blank names are ignored.
    pub async fn search_by_name(&self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.lookup(LocationQuery::name(name)).await;
    }

    /// Non-finite coordinates are ignored.
    pub async fn search_by_coords(&self, lat: f64, lon: f64) {
        if !Coordinates::new(lat, lon).is_finite() {
            tracing::debug!(lat, lon, "Ignoring non-finite coordinates");
            return;
        }
        self.lookup(LocationQuery::coords(lat, lon)).await;
    }

    pub async fn use_current_location(&self) {
        let Some(locator) = self.geolocator.clone() else {
            self.state.lock().error = Some(WeatherError::GeolocationUnsupported.user_message());
            return;
        };

        let generation = {
            let mut state = self.state.lock();
            state.loading = true;
            state.conditions = None;
            state.error = None;
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        match locator.current_position().await {
            Ok(pos) if pos.is_finite() => self.search_by_coords(pos.lat, pos.lon).await,
            Ok(pos) => self.fail_geolocation(
                WeatherError::GeolocationDenied(format!("Invalid position {}, {}", pos.lat, pos.lon)),
                generation,
            ),
            Err(e) => self.fail_geolocation(e, generation),
        }
    }

    fn fail_geolocation(&self, e: WeatherError, generation: u64) {
        tracing::warn!(error = %e, "Geolocation failed");
        let mut state = self.state.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        state.loading = false;
        state.forecast = None;
        state.error = Some(e.user_message());
    }

    /// Flips the unit system and re-runs the active location, if any.
    ///
    /// Without an active location the units still flip; only the refetch is skipped.
    pub async fn toggle_units(&self) {
        let (units, active) = {
            let mut state = self.state.lock();
            state.units = state.units.toggled();
            (state.units, state.active_location.clone())
        };
        tracing::info!(%units, "Switched unit system");

        if let Some(location) = active {
            self.lookup(location).await;
        }
    }

    /// Re-runs the active location with the current units.
    pub async fn refresh(&self) {
        let active = self.state.lock().active_location.clone();
        if let Some(location) = active {
            self.lookup(location).await;
        }
    }

    /// Forgets the active location. Displayed data stays on screen.
    pub fn clear_last_search(&self) {
        self.state.lock().active_location = None;
        self.store.save(None);
    }

    /// Waits for outstanding forecast tasks. Their outcome is never reported.
    pub async fn wait_for_forecast(&self) {
        let tasks = std::mem::take(&mut *self.forecast_tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Forecast task aborted");
            }
        }
    }

    async fn lookup(&self, location: LocationQuery) {
        let (units, generation) = {
            let mut state = self.state.lock();
            state.loading = true;
            state.conditions = None;
            state.error = None;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (state.units, generation)
        };

        let result = self.provider.fetch_current(&location, units).await;

        let coords = {
            let mut state = self.state.lock();
            if self.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!(%location, "Discarding stale current-conditions response");
                return;
            }
            state.loading = false;

            match result {
                Ok(conditions) => {
                    let coords = conditions.coords;
                    state.conditions = Some(conditions);
                    state.active_location = Some(location.clone());
                    coords
                }
                Err(e) => {
                    tracing::warn!(%location, error = %e, "Weather lookup failed");
                    state.forecast = None;
                    state.error = Some(e.user_message());
                    return;
                }
            }
        };

        self.store.save(Some(&location));
        self.spawn_forecast(coords, units, generation);
    }

    fn spawn_forecast(&self, coords: Coordinates, units: UnitSystem, issued: u64) {
        let provider = Arc::clone(&self.provider);
        let state = Arc::clone(&self.state);
        let generation = Arc::clone(&self.generation);

        let task = tokio::spawn(async move {
            let days = provider.fetch_forecast(coords.lat, coords.lon, units).await;

            let mut state = state.lock();
            if generation.load(Ordering::SeqCst) != issued {
                tracing::debug!(lat = coords.lat, lon = coords.lon, "Discarding stale forecast");
                return;
            }
            state.forecast = days;
        });

        let mut tasks = self.forecast_tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{geolocation::FixedGeolocator, store::MemoryStore};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tokio::sync::Notify;

    fn conditions(name: &str, country: &str, lat: f64, lon: f64) -> CurrentConditions {
        CurrentConditions {
            location_name: name.to_string(),
            country: Some(country.to_string()),
            coords: Coordinates::new(lat, lon),
            temperature: 15.2,
            feels_like: 14.8,
            humidity_pct: 70,
            wind_speed: 3.1,
            description: Some("few clouds".to_string()),
            icon: Some("02d".to_string()),
        }
    }

    fn london() -> CurrentConditions {
        conditions("London", "GB", 51.5, -0.12)
    }

    fn paris() -> CurrentConditions {
        conditions("Paris", "FR", 48.85, 2.35)
    }

    /// Answers from a fixed list of known places and records every call.
    #[derive(Debug, Default)]
    struct ScriptedProvider {
        known: Vec<CurrentConditions>,
        missing_key: bool,
        forecast_fails: bool,
        /// Forecast requests for this latitude wait until notified.
        gate: Option<(f64, Arc<Notify>)>,
        current_calls: Mutex<Vec<(LocationQuery, UnitSystem)>>,
        forecast_calls: Mutex<Vec<(f64, f64, UnitSystem)>>,
    }

    impl ScriptedProvider {
        fn knowing(known: Vec<CurrentConditions>) -> Self {
            Self {
                known,
                ..Self::default()
            }
        }

        fn current_calls(&self) -> Vec<(LocationQuery, UnitSystem)> {
            self.current_calls.lock().clone()
        }

        fn forecast_calls(&self) -> Vec<(f64, f64, UnitSystem)> {
            self.forecast_calls.lock().clone()
        }
    }

    #[async_trait]
    impl WeatherProvider for ScriptedProvider {
        async fn fetch_current(
            &self,
            location: &LocationQuery,
            units: UnitSystem,
        ) -> Result<CurrentConditions, WeatherError> {
            self.current_calls.lock().push((location.clone(), units));
            if self.missing_key {
                return Err(WeatherError::MissingCredential);
            }

            let found = match location {
                LocationQuery::Name { value } => {
                    self.known.iter().find(|c| &c.location_name == value)
                }
                LocationQuery::Coords { lat, lon } => self
                    .known
                    .iter()
                    .find(|c| c.coords == Coordinates::new(*lat, *lon)),
            };

            found.cloned().ok_or(WeatherError::LocationNotFound {
                by_coords: !location.is_name(),
            })
        }

        async fn try_fetch_forecast(
            &self,
            lat: f64,
            lon: f64,
            units: UnitSystem,
        ) -> Result<Vec<ForecastDay>, WeatherError> {
            self.forecast_calls.lock().push((lat, lon, units));

            if let Some((gated_lat, notify)) = &self.gate {
                if *gated_lat == lat {
                    notify.notified().await;
                }
            }

            if self.forecast_fails {
                return Err(WeatherError::Parse("forecast body".into()));
            }

            Ok((1..=5)
                .map(|i| ForecastDay {
                    date: DateTime::<Utc>::from_timestamp(1_700_000_000 + i * 86_400, 0)
                        .unwrap_or_default(),
                    min: lat,
                    max: lon,
                    description: None,
                    icon: None,
                })
                .collect())
        }
    }

    #[derive(Debug)]
    struct DenyingGeolocator;

    #[async_trait]
    impl Geolocator for DenyingGeolocator {
        async fn current_position(&self) -> Result<Coordinates, WeatherError> {
            Err(WeatherError::GeolocationDenied("User denied Geolocation".into()))
        }
    }

    fn controller_with(
        provider: Arc<ScriptedProvider>,
        store: Arc<MemoryStore>,
        geolocator: Option<Arc<dyn Geolocator>>,
    ) -> WeatherController {
        WeatherController::new(provider, store, geolocator, UnitSystem::Metric)
    }

    #[tokio::test]
    async fn london_search_populates_state() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![london()]));
        let store = Arc::new(MemoryStore::new());
        let ctl = controller_with(provider.clone(), store.clone(), None);

        ctl.search_by_name("London").await;

        let state = ctl.snapshot();
        assert_eq!(state.conditions, Some(london()));
        assert_eq!(state.active_location, Some(LocationQuery::name("London")));
        assert!(!state.loading);
        assert!(state.error.is_none());
        assert_eq!(store.load(), Some(LocationQuery::name("London")));

        ctl.wait_for_forecast().await;
        assert_eq!(provider.forecast_calls(), vec![(51.5, -0.12, UnitSystem::Metric)]);
        assert_eq!(ctl.snapshot().forecast.map(|d| d.len()), Some(5));
    }

    #[tokio::test]
    async fn blank_name_is_a_no_op() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![london()]));
        let ctl = controller_with(provider.clone(), Arc::new(MemoryStore::new()), None);

        ctl.search_by_name("").await;
        ctl.search_by_name("   ").await;

        assert!(provider.current_calls().is_empty());
        assert_eq!(ctl.snapshot(), SessionState::default());
    }

    #[tokio::test]
    async fn failed_lookup_keeps_previous_active_location() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![london()]));
        let store = Arc::new(MemoryStore::new());
        let ctl = controller_with(provider, store.clone(), None);

        ctl.search_by_name("London").await;
        ctl.search_by_name("Atlantis").await;

        let state = ctl.snapshot();
        assert!(state.conditions.is_none());
        assert_eq!(state.error.as_deref(), Some("City not found"));
        assert!(!state.loading);
        assert_eq!(state.active_location, Some(LocationQuery::name("London")));
        assert_eq!(store.load(), Some(LocationQuery::name("London")));
    }

    #[tokio::test]
    async fn unknown_coordinates_report_location_not_found() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![]));
        let ctl = controller_with(provider, Arc::new(MemoryStore::new()), None);

        ctl.search_by_coords(10.0, 10.0).await;

        let state = ctl.snapshot();
        assert_eq!(state.error.as_deref(), Some("Location not found"));
        assert!(state.active_location.is_none());
    }

    #[tokio::test]
    async fn missing_key_sets_error() {
        let provider = Arc::new(ScriptedProvider {
            missing_key: true,
            ..ScriptedProvider::default()
        });
        let ctl = controller_with(provider, Arc::new(MemoryStore::new()), None);

        ctl.search_by_name("Paris").await;

        let state = ctl.snapshot();
        assert!(state.error.as_deref().is_some_and(|e| e.starts_with("Missing API key.")));
        assert!(!state.loading);
        assert!(state.conditions.is_none());
    }

    #[tokio::test]
    async fn forecast_failure_is_silent() {
        let provider = Arc::new(ScriptedProvider {
            known: vec![london()],
            forecast_fails: true,
            ..ScriptedProvider::default()
        });
        let ctl = controller_with(provider, Arc::new(MemoryStore::new()), None);

        ctl.search_by_name("London").await;
        ctl.wait_for_forecast().await;

        let state = ctl.snapshot();
        assert!(state.error.is_none());
        assert_eq!(state.conditions, Some(london()));
        assert!(state.forecast.is_none());
    }

    #[tokio::test]
    async fn coords_search_sets_coords_location() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![paris()]));
        let store = Arc::new(MemoryStore::new());
        let ctl = controller_with(provider, store.clone(), None);

        ctl.search_by_coords(48.85, 2.35).await;

        let expected = LocationQuery::coords(48.85, 2.35);
        assert_eq!(ctl.snapshot().active_location, Some(expected.clone()));
        assert_eq!(store.load(), Some(expected));
    }

    #[tokio::test]
    async fn non_finite_coordinates_are_ignored() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![]));
        let ctl = controller_with(provider.clone(), Arc::new(MemoryStore::new()), None);

        ctl.search_by_coords(f64::NAN, 1.0).await;

        assert!(provider.current_calls().is_empty());
        assert!(!ctl.snapshot().loading);
    }

    #[tokio::test]
    async fn toggle_twice_reruns_same_location() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![london()]));
        let ctl = controller_with(provider.clone(), Arc::new(MemoryStore::new()), None);

        ctl.search_by_name("London").await;
        ctl.toggle_units().await;
        assert_eq!(ctl.units(), UnitSystem::Imperial);
        ctl.toggle_units().await;
        assert_eq!(ctl.units(), UnitSystem::Metric);

        let name = LocationQuery::name("London");
        assert_eq!(
            provider.current_calls(),
            vec![
                (name.clone(), UnitSystem::Metric),
                (name.clone(), UnitSystem::Imperial),
                (name, UnitSystem::Metric),
            ]
        );
    }

    #[tokio::test]
    async fn toggle_without_prior_lookup_only_flips_units() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![london()]));
        let ctl = controller_with(provider.clone(), Arc::new(MemoryStore::new()), None);

        ctl.toggle_units().await;

        assert_eq!(ctl.units(), UnitSystem::Imperial);
        assert!(provider.current_calls().is_empty());
    }

    #[tokio::test]
    async fn clear_last_search_keeps_display() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![london()]));
        let store = Arc::new(MemoryStore::new());
        let ctl = controller_with(provider, store.clone(), None);

        ctl.search_by_name("London").await;
        ctl.clear_last_search();

        let state = ctl.snapshot();
        assert!(state.active_location.is_none());
        assert!(state.conditions.is_some());
        assert!(store.load().is_none());
    }

    #[tokio::test]
    async fn restores_and_reruns_persisted_location() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![paris()]));
        let store = Arc::new(MemoryStore::new());
        store.save(Some(&LocationQuery::coords(48.85, 2.35)));

        let ctl = controller_with(provider.clone(), store, None);
        assert_eq!(
            ctl.snapshot().active_location,
            Some(LocationQuery::coords(48.85, 2.35))
        );

        ctl.refresh().await;
        assert_eq!(ctl.snapshot().conditions, Some(paris()));
        assert_eq!(provider.current_calls().len(), 1);
    }

    #[tokio::test]
    async fn geolocation_unsupported_sets_error() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![london()]));
        let ctl = controller_with(provider.clone(), Arc::new(MemoryStore::new()), None);

        ctl.use_current_location().await;

        let state = ctl.snapshot();
        assert_eq!(
            state.error.as_deref(),
            Some("Geolocation not supported by your browser.")
        );
        assert!(!state.loading);
        assert!(provider.current_calls().is_empty());
    }

    #[tokio::test]
    async fn geolocation_success_searches_by_coords() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![paris()]));
        let locator: Arc<dyn Geolocator> = Arc::new(FixedGeolocator(Coordinates::new(48.85, 2.35)));
        let ctl = controller_with(provider, Arc::new(MemoryStore::new()), Some(locator));

        ctl.use_current_location().await;

        let state = ctl.snapshot();
        assert_eq!(state.active_location, Some(LocationQuery::coords(48.85, 2.35)));
        assert_eq!(state.conditions, Some(paris()));
    }

    #[tokio::test]
    async fn geolocation_denial_clears_loading() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![london()]));
        let ctl = controller_with(
            provider,
            Arc::new(MemoryStore::new()),
            Some(Arc::new(DenyingGeolocator)),
        );

        ctl.search_by_name("London").await;
        ctl.use_current_location().await;

        let state = ctl.snapshot();
        assert!(!state.loading);
        assert!(state.conditions.is_none());
        assert_eq!(state.error.as_deref(), Some("User denied Geolocation"));
        assert_eq!(state.active_location, Some(LocationQuery::name("London")));
    }

    #[tokio::test]
    async fn submit_searches_the_query_box() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![london()]));
        let ctl = controller_with(provider, Arc::new(MemoryStore::new()), None);

        ctl.set_query("  London ");
        ctl.submit().await;

        let state = ctl.snapshot();
        assert_eq!(state.current_query, "  London ");
        assert_eq!(state.active_location, Some(LocationQuery::name("London")));
    }

    #[tokio::test]
    async fn stale_forecast_does_not_overwrite_newer_one() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(ScriptedProvider {
            known: vec![london(), paris()],
            gate: Some((51.5, gate.clone())),
            ..ScriptedProvider::default()
        });
        let ctl = controller_with(provider, Arc::new(MemoryStore::new()), None);

        ctl.search_by_name("London").await;
        ctl.search_by_name("Paris").await;

        // Let the Paris forecast finish while London's is still blocked.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let paris_min = ctl.snapshot().forecast.map(|d| d[0].min);
        assert_eq!(paris_min, Some(48.85));

        gate.notify_one();
        ctl.wait_for_forecast().await;

        let state = ctl.snapshot();
        assert_eq!(state.forecast.map(|d| d[0].min), Some(48.85));
        assert_eq!(state.conditions, Some(paris()));
    }

    #[tokio::test]
    async fn failed_lookup_clears_previous_forecast() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![london()]));
        let ctl = controller_with(provider, Arc::new(MemoryStore::new()), None);

        ctl.search_by_name("London").await;
        ctl.wait_for_forecast().await;
        assert!(ctl.snapshot().forecast.is_some());

        ctl.search_by_name("Atlantis").await;
        ctl.wait_for_forecast().await;

        let state = ctl.snapshot();
        assert!(state.conditions.is_none());
        assert_eq!(state.error.as_deref(), Some("City not found"));
        assert!(state.forecast.is_none());
    }

    #[tokio::test]
    async fn forecast_in_flight_is_dropped_after_geolocation_denial() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(ScriptedProvider {
            known: vec![london()],
            gate: Some((51.5, gate.clone())),
            ..ScriptedProvider::default()
        });
        let ctl = controller_with(
            provider,
            Arc::new(MemoryStore::new()),
            Some(Arc::new(DenyingGeolocator)),
        );

        ctl.search_by_name("London").await;
        ctl.use_current_location().await;

        gate.notify_one();
        ctl.wait_for_forecast().await;

        let state = ctl.snapshot();
        assert_eq!(state.error.as_deref(), Some("User denied Geolocation"));
        assert!(state.conditions.is_none());
        assert!(state.forecast.is_none());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn toggle_twice_reruns_same_coordinates() {
        let provider = Arc::new(ScriptedProvider::knowing(vec![paris()]));
        let ctl = controller_with(provider.clone(), Arc::new(MemoryStore::new()), None);

        ctl.search_by_coords(48.85, 2.35).await;
        ctl.toggle_units().await;
        ctl.toggle_units().await;

        let coords = LocationQuery::coords(48.85, 2.35);
        assert_eq!(ctl.units(), UnitSystem::Metric);
        assert_eq!(ctl.snapshot().active_location, Some(coords.clone()));
        assert_eq!(
            provider.current_calls(),
            vec![
                (coords.clone(), UnitSystem::Metric),
                (coords.clone(), UnitSystem::Imperial),
                (coords, UnitSystem::Metric),
            ]
        );
    }
}
