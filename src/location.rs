use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::config::LocationConfig;
use crate::error::{EarthGuardError, Result};
use crate::models::{Coordinates, LocationState};

pub const UNSUPPORTED: &str = "unsupported";
pub const TIMEOUT_EXPIRED: &str = "Timeout expired";

/// Host geolocation capability. One request per call, no tracking.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LocationSource: Send + Sync {
    fn is_supported(&self) -> bool;

    /// May prompt the user for permission; denial comes back as an error.
    async fn current_position(&self) -> Result<Coordinates>;
}

/// Location capability backed by the `location` config section.
pub struct ConfiguredLocationSource {
    config: LocationConfig,
}

impl ConfiguredLocationSource {
    pub fn new(config: LocationConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LocationSource for ConfiguredLocationSource {
    fn is_supported(&self) -> bool {
        self.config.enabled
    }

    async fn current_position(&self) -> Result<Coordinates> {
        match (self.config.latitude, self.config.longitude) {
            (Some(lat), Some(lon)) => Coordinates::new(lat, lon),
            _ => Err(EarthGuardError::Location("Position unavailable".to_string())),
        }
    }
}

pub struct LocationProvider {
    source: Arc<dyn LocationSource>,
    timeout: Duration,
}

impl LocationProvider {
    pub fn new(source: Arc<dyn LocationSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Single acquisition attempt. Never fails; failures become `LocationState::Failed`.
    pub async fn acquire(&self) -> LocationState {
        if !self.source.is_supported() {
            tracing::info!("Geolocation capability unavailable");
            return LocationState::failed(UNSUPPORTED);
        }

        match tokio::time::timeout(self.timeout, self.source.current_position()).await {
            Ok(Ok(coords)) => {
                tracing::info!(
                    latitude = coords.latitude(),
                    longitude = coords.longitude(),
                    "Location acquired"
                );
                LocationState::Resolved(coords)
            }
            Ok(Err(e)) => {
                tracing::warn!("Location acquisition failed: {}", e);
                let message = match e {
                    EarthGuardError::Location(msg) => msg,
                    other => other.to_string(),
                };
                LocationState::failed(message)
            }
            Err(_) => {
                tracing::warn!("Location acquisition timed out after {:?}", self.timeout);
                LocationState::failed(TIMEOUT_EXPIRED)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(source: impl LocationSource + 'static) -> LocationProvider {
        LocationProvider::new(Arc::new(source), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_unsupported_capability() {
        let mut source = MockLocationSource::new();
        source.expect_is_supported().return_const(false);
        source.expect_current_position().times(0);

        let state = provider(source).acquire().await;
        assert_eq!(state, LocationState::failed("unsupported"));
    }

    #[tokio::test]
    async fn test_permission_denied_carries_platform_message() {
        let mut source = MockLocationSource::new();
        source.expect_is_supported().return_const(true);
        source
            .expect_current_position()
            .times(1)
            .returning(|| Err(EarthGuardError::Location("User denied Geolocation".to_string())));

        let state = provider(source).acquire().await;
        assert_eq!(state.error(), Some("User denied Geolocation"));
        assert_eq!(state.coordinates(), None);
    }

    #[tokio::test]
    async fn test_success_yields_coordinates() {
        let mut source = MockLocationSource::new();
        source.expect_is_supported().return_const(true);
        source
            .expect_current_position()
            .times(1)
            .returning(|| Coordinates::new(23.81, 90.41));

        let state = provider(source).acquire().await;
        assert_eq!(state.coordinates(), Some(Coordinates::new(23.81, 90.41).unwrap()));
        assert_eq!(state.error(), None);
    }

    struct HangingSource;

    #[async_trait]
    impl LocationSource for HangingSource {
        fn is_supported(&self) -> bool {
            true
        }

        async fn current_position(&self) -> Result<Coordinates> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_timeout_becomes_error_state() {
        let state = provider(HangingSource).acquire().await;
        assert_eq!(state.error(), Some(TIMEOUT_EXPIRED));
    }

    #[tokio::test]
    async fn test_configured_source() {
        let disabled = ConfiguredLocationSource::new(LocationConfig::default());
        assert_eq!(provider(disabled).acquire().await.error(), Some("unsupported"));

        let missing = ConfiguredLocationSource::new(LocationConfig {
            enabled: true,
            ..LocationConfig::default()
        });
        assert_eq!(
            provider(missing).acquire().await.error(),
            Some("Position unavailable")
        );

        let dhaka = ConfiguredLocationSource::new(LocationConfig {
            enabled: true,
            latitude: Some(23.81),
            longitude: Some(90.41),
            ..LocationConfig::default()
        });
        assert!(provider(dhaka).acquire().await.coordinates().is_some());

        let bogus = ConfiguredLocationSource::new(LocationConfig {
            enabled: true,
            latitude: Some(123.0),
            longitude: Some(90.41),
            ..LocationConfig::default()
        });
        let state = provider(bogus).acquire().await;
        assert!(state.error().unwrap().contains("latitude"));
    }
}
