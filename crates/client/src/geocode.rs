//! Address geocoding.
//!
//! The geocoding provider is an external collaborator behind [`Geocoder`].
//! [`GoogleGeocoder`] talks to the Google Geocoding web service; tests and
//! embedders can supply their own implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::config::GeocoderConfig;

/// Geocoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeocodeError {
    /// The provider could not be reached.
    #[error("Geocoding service unreachable: {0}")]
    Transport(String),

    #[error("No matching address found")]
    NoResults,

    /// A place came back without coordinates.
    #[error("No details available for this address")]
    MissingGeometry,

    /// The provider answered with a non-OK status.
    #[error("Geocoding failed ({status}){}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Status {
        status: String,
        message: Option<String>,
    },

    #[error("Address lookup is not configured")]
    NotConfigured,
}

// =============================================================================
// Provider types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressComponent {
    pub long_name: String,
    pub short_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

impl AddressComponent {
    fn has_type(&self, kind: &str) -> bool {
        self.types.iter().any(|t| t == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

/// A geocoded place as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    #[serde(default)]
    pub formatted_address: String,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub address_components: Vec<AddressComponent>,
}

// =============================================================================
// DeliveryAddress
// =============================================================================

/// Resolved delivery address, independent of how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub formatted_address: String,
    /// Street number and route, or the formatted address when neither is
    /// present.
    pub street: String,
    pub city: String,
    /// Short form (e.g., `CA`).
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl DeliveryAddress {
    /// Extract an address from a provider place.
    ///
    /// Components are visited in provider order; for single-valued fields
    /// the last matching component wins.
    ///
    /// # Errors
    ///
    /// Returns `GeocodeError::MissingGeometry` if the place has no location.
    pub fn from_place(place: &Place) -> Result<Self, GeocodeError> {
        let location = place
            .geometry
            .as_ref()
            .map(|g| g.location)
            .ok_or(GeocodeError::MissingGeometry)?;

        let mut street_parts: Vec<&str> = Vec::new();
        let mut city = String::new();
        let mut state = String::new();
        let mut postal_code = String::new();
        let mut country = String::new();

        for component in &place.address_components {
            if component.has_type("street_number") || component.has_type("route") {
                street_parts.push(&component.long_name);
            }
            if component.has_type("locality") {
                city.clone_from(&component.long_name);
            }
            if component.has_type("administrative_area_level_1") {
                state.clone_from(&component.short_name);
            }
            if component.has_type("postal_code") {
                postal_code.clone_from(&component.long_name);
            }
            if component.has_type("country") {
                country.clone_from(&component.long_name);
            }
        }

        let street = street_parts.join(" ").trim().to_string();
        let street = if street.is_empty() {
            place.formatted_address.clone()
        } else {
            street
        };

        Ok(Self {
            formatted_address: place.formatted_address.clone(),
            street,
            city,
            state,
            postal_code,
            country,
            latitude: location.lat,
            longitude: location.lng,
        })
    }
}

// =============================================================================
// Geocoder
// =============================================================================

/// Forward and reverse address lookup.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Best match for free-text `query`.
    async fn forward(&self, query: &str) -> Result<Place, GeocodeError>;

    /// Best match for a map point.
    async fn reverse(&self, point: LatLng) -> Result<Place, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<Place>,
    #[serde(default)]
    error_message: Option<String>,
}

/// Google Geocoding web service client.
#[derive(Clone)]
pub struct GoogleGeocoder {
    inner: Arc<GoogleGeocoderInner>,
}

struct GoogleGeocoderInner {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl GoogleGeocoder {
    /// Create a geocoder. Without an API key every lookup fails with
    /// `GeocodeError::NotConfigured`.
    ///
    /// # Errors
    ///
    /// Returns `GeocodeError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &GeocoderConfig, timeout: Duration) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(GoogleGeocoderInner {
                client,
                base_url: config.base_url.clone(),
                api_key: config.api_key.clone(),
            }),
        })
    }

    async fn lookup(&self, param: (&str, String)) -> Result<Place, GeocodeError> {
        let key = self
            .inner
            .api_key
            .as_ref()
            .ok_or(GeocodeError::NotConfigured)?;

        let url = format!(
            "{}/maps/api/geocode/json",
            self.inner.base_url.as_str().trim_end_matches('/')
        );

        let response = self
            .inner
            .client
            .get(&url)
            .query(&[param, ("key", key.expose_secret().to_string())])
            .send()
            .await
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %text.chars().take(500).collect::<String>(),
                "Geocoding service returned non-success status"
            );
            return Err(GeocodeError::Status {
                status: status.to_string(),
                message: None,
            });
        }

        let body: GeocodeResponse = serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse geocoding response"
            );
            GeocodeError::Status {
                status: "INVALID_RESPONSE".to_string(),
                message: None,
            }
        })?;

        match body.status.as_str() {
            "OK" => body.results.into_iter().next().ok_or(GeocodeError::NoResults),
            "ZERO_RESULTS" => Err(GeocodeError::NoResults),
            _ => Err(GeocodeError::Status {
                status: body.status,
                message: body.error_message,
            }),
        }
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    #[instrument(skip(self))]
    async fn forward(&self, query: &str) -> Result<Place, GeocodeError> {
        self.lookup(("address", query.trim().to_string())).await
    }

    #[instrument(skip(self))]
    async fn reverse(&self, point: LatLng) -> Result<Place, GeocodeError> {
        self.lookup(("latlng", format!("{},{}", point.lat, point.lng)))
            .await
    }
}

impl std::fmt::Debug for GoogleGeocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleGeocoder")
            .field("base_url", &self.inner.base_url.as_str())
            .field("configured", &self.inner.api_key.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn component(long: &str, short: &str, types: &[&str]) -> AddressComponent {
        AddressComponent {
            long_name: long.to_string(),
            short_name: short.to_string(),
            types: types.iter().map(|t| (*t).to_string()).collect(),
        }
    }

    fn place(components: Vec<AddressComponent>) -> Place {
        Place {
            formatted_address: "1600 Amphitheatre Pkwy, Mountain View, CA 94043, USA".to_string(),
            geometry: Some(Geometry {
                location: LatLng {
                    lat: 37.422,
                    lng: -122.084,
                },
            }),
            address_components: components,
        }
    }

    fn geocoder_for(server: &MockServer, key: Option<&str>) -> GoogleGeocoder {
        let config = GeocoderConfig {
            base_url: Url::parse(&server.uri()).unwrap(),
            api_key: key.map(|k| SecretString::from(k.to_string())),
        };
        GoogleGeocoder::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_extracts_components() {
        let address = DeliveryAddress::from_place(&place(vec![
            component("1600", "1600", &["street_number"]),
            component("Amphitheatre Parkway", "Amphitheatre Pkwy", &["route"]),
            component("Mountain View", "Mountain View", &["locality", "political"]),
            component("California", "CA", &["administrative_area_level_1", "political"]),
            component("94043", "94043", &["postal_code"]),
            component("United States", "US", &["country", "political"]),
        ]))
        .unwrap();

        assert_eq!(address.street, "1600 Amphitheatre Parkway");
        assert_eq!(address.city, "Mountain View");
        assert_eq!(address.state, "CA");
        assert_eq!(address.postal_code, "94043");
        assert_eq!(address.country, "United States");
        assert!((address.latitude - 37.422).abs() < f64::EPSILON);
    }

    #[test]
    fn test_street_falls_back_to_formatted_address() {
        let address = DeliveryAddress::from_place(&place(vec![component(
            "Mountain View",
            "Mountain View",
            &["locality"],
        )]))
        .unwrap();

        assert_eq!(
            address.street,
            "1600 Amphitheatre Pkwy, Mountain View, CA 94043, USA"
        );
        assert_eq!(address.state, "");
    }

    #[test]
    fn test_missing_geometry() {
        let mut p = place(vec![]);
        p.geometry = None;
        assert_eq!(
            DeliveryAddress::from_place(&p),
            Err(GeocodeError::MissingGeometry)
        );
        assert_eq!(
            GeocodeError::MissingGeometry.to_string(),
            "No details available for this address"
        );
    }

    #[tokio::test]
    async fn test_forward_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/geocode/json"))
            .and(query_param("address", "1600 Amphitheatre"))
            .and(query_param("key", "k3y-AbC9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "OK",
                "results": [{
                    "formatted_address": "1600 Amphitheatre Pkwy",
                    "geometry": { "location": { "lat": 37.4, "lng": -122.1 } },
                    "address_components": []
                }]
            })))
            .mount(&server)
            .await;

        let place = geocoder_for(&server, Some("k3y-AbC9"))
            .forward(" 1600 Amphitheatre ")
            .await
            .unwrap();
        assert_eq!(place.formatted_address, "1600 Amphitheatre Pkwy");
    }

    #[tokio::test]
    async fn test_reverse_zero_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/geocode/json"))
            .and(query_param("latlng", "0,0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ZERO_RESULTS",
                "results": []
            })))
            .mount(&server)
            .await;

        let err = geocoder_for(&server, Some("k"))
            .reverse(LatLng { lat: 0.0, lng: 0.0 })
            .await
            .unwrap_err();
        assert_eq!(err, GeocodeError::NoResults);
    }

    #[tokio::test]
    async fn test_provider_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/geocode/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "REQUEST_DENIED",
                "error_message": "The provided API key is invalid."
            })))
            .mount(&server)
            .await;

        let err = geocoder_for(&server, Some("k"))
            .forward("anywhere")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Geocoding failed (REQUEST_DENIED): The provided API key is invalid."
        );
    }

    #[tokio::test]
    async fn test_missing_key_not_configured() {
        let server = MockServer::start().await;
        let err = geocoder_for(&server, None).forward("x").await.unwrap_err();
        assert_eq!(err, GeocodeError::NotConfigured);
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
