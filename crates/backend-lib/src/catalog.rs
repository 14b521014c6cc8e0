// ============================
// munch-backend-lib/src/catalog.rs
// ============================
//! Restaurant acquisition boundary.
//!
//! The coordinator only depends on the [`RestaurantCatalog`] trait and the
//! [`fetch_restaurants`] driver; [`PlacesCatalog`] is the Google Places
//! implementation. The fetch is one-shot per room: it runs while the room
//! actor parks joins, and a failure or rate limit degrades the room to an
//! empty list instead of hanging the joiners.

use std::time::Duration;

use async_trait::async_trait;
use munch_common::{GeoPoint, Restaurant};
use serde::Deserialize;
use tracing::debug;

use crate::config::PlacesSettings;
use crate::error::AppError;

const METERS_PER_MILE: f64 = 1609.34;

// fast-food chains capped to one listing per room
const SINGLETON_CHAINS: &[&str] = &[
    "STARBUCKS",
    "MCDONALD",
    "SUBWAY",
    "OLIVE GARDEN",
    "TACO BELL",
];

/// One page of upstream results.
#[derive(Debug, Clone)]
pub struct FetchPage {
    pub restaurants: Vec<Restaurant>,
    pub next_page_token: Option<String>,
    pub rate_limited: bool,
}

/// Outcome of the full one-shot fetch pipeline.
#[derive(Debug, Clone)]
pub struct CatalogFetch {
    pub restaurants: Vec<Restaurant>,
    pub rate_limited: bool,
}

/// Trait for restaurant sources
#[async_trait]
pub trait RestaurantCatalog: Send + Sync {
    /// Fetch the first page of restaurants around `location`.
    async fn fetch_initial(
        &self,
        location: GeoPoint,
        radius_miles: f64,
    ) -> Result<FetchPage, AppError>;

    /// Redeem a pagination token returned by an earlier page.
    async fn fetch_more(&self, page_token: &str) -> Result<FetchPage, AppError>;
}

/// Run the one-shot fetch pipeline: first page, at most one paginated
/// follow-up, chain dedup. A missing location hint yields an empty list;
/// a rate limit at any step yields an empty list flagged `rate_limited`.
pub async fn fetch_restaurants(
    catalog: &dyn RestaurantCatalog,
    location: Option<GeoPoint>,
    radius_miles: Option<f64>,
) -> Result<CatalogFetch, AppError> {
    let (Some(location), Some(radius_miles)) = (location, radius_miles) else {
        return Ok(CatalogFetch {
            restaurants: Vec::new(),
            rate_limited: false,
        });
    };

    let initial = catalog.fetch_initial(location, radius_miles).await?;
    if initial.rate_limited {
        return Ok(CatalogFetch {
            restaurants: Vec::new(),
            rate_limited: true,
        });
    }

    let mut restaurants = initial.restaurants;
    if let Some(token) = initial.next_page_token {
        let more = catalog.fetch_more(&token).await?;
        if more.rate_limited {
            return Ok(CatalogFetch {
                restaurants: Vec::new(),
                rate_limited: true,
            });
        }
        restaurants.extend(more.restaurants);
    }

    Ok(CatalogFetch {
        restaurants: dedupe_chains(restaurants),
        rate_limited: false,
    })
}

/// Keep at most one listing per well-known chain; first occurrence wins.
fn dedupe_chains(restaurants: Vec<Restaurant>) -> Vec<Restaurant> {
    let mut seen = [false; SINGLETON_CHAINS.len()];
    restaurants
        .into_iter()
        .filter(|restaurant| {
            let name = restaurant.name.to_uppercase();
            match SINGLETON_CHAINS.iter().position(|chain| name.contains(chain)) {
                Some(i) if seen[i] => false,
                Some(i) => {
                    seen[i] = true;
                    true
                },
                None => true,
            }
        })
        .collect()
}

/// Google Places "nearby search" client.
pub struct PlacesCatalog {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    page_token_delay: Duration,
}

impl PlacesCatalog {
    pub fn new(settings: &PlacesSettings) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build http client: {e}")))?;

        Ok(PlacesCatalog {
            http,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            page_token_delay: Duration::from_millis(settings.page_token_delay_ms),
        })
    }

    async fn nearby_search(&self, query: &[(&str, String)]) -> Result<FetchPage, AppError> {
        let url = format!("{}/maps/api/place/nearbysearch/json", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))?;

        let body: PlacesResponse = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))?;

        match body.status.as_str() {
            "OK" | "ZERO_RESULTS" => {
                debug!(results = body.results.len(), "places page received");
                Ok(FetchPage {
                    restaurants: body.results.into_iter().map(PlaceResult::into_restaurant).collect(),
                    next_page_token: body.next_page_token,
                    rate_limited: false,
                })
            },
            "OVER_QUERY_LIMIT" => Ok(FetchPage {
                restaurants: Vec::new(),
                next_page_token: None,
                rate_limited: true,
            }),
            other => Err(AppError::UpstreamUnavailable(format!(
                "places returned status {other}"
            ))),
        }
    }
}

#[async_trait]
impl RestaurantCatalog for PlacesCatalog {
    async fn fetch_initial(
        &self,
        location: GeoPoint,
        radius_miles: f64,
    ) -> Result<FetchPage, AppError> {
        let radius_meters = radius_miles * METERS_PER_MILE;
        self.nearby_search(&[
            ("location", format!("{},{}", location.latitude, location.longitude)),
            ("radius", format!("{radius_meters:.0}")),
            ("type", "restaurant".to_string()),
            ("opennow", "true".to_string()),
            ("key", self.api_key.clone()),
        ])
        .await
    }

    async fn fetch_more(&self, page_token: &str) -> Result<FetchPage, AppError> {
        // a freshly issued token is not redeemable immediately
        tokio::time::sleep(self.page_token_delay).await;
        self.nearby_search(&[
            ("pagetoken", page_token.to_string()),
            ("key", self.api_key.clone()),
        ])
        .await
    }
}

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlaceResult>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceResult {
    place_id: String,
    name: String,
    rating: Option<f64>,
    price_level: Option<u8>,
    user_ratings_total: Option<u64>,
}

impl PlaceResult {
    fn into_restaurant(self) -> Restaurant {
        Restaurant {
            place_id: self.place_id,
            name: self.name,
            rating: self.rating,
            price_level: self.price_level,
            user_ratings_total: self.user_ratings_total,
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn restaurant(name: &str) -> Restaurant {
        Restaurant {
            place_id: format!("place-{name}"),
            name: name.to_string(),
            rating: None,
            price_level: None,
            user_ratings_total: None,
            details: None,
        }
    }

    struct PagedCatalog {
        pages: Mutex<VecDeque<FetchPage>>,
    }

    impl PagedCatalog {
        fn new(pages: Vec<FetchPage>) -> Self {
            PagedCatalog {
                pages: Mutex::new(pages.into()),
            }
        }

        fn next_page(&self) -> FetchPage {
            self.pages.lock().unwrap().pop_front().expect("no more pages")
        }
    }

    #[async_trait]
    impl RestaurantCatalog for PagedCatalog {
        async fn fetch_initial(
            &self,
            _location: GeoPoint,
            _radius_miles: f64,
        ) -> Result<FetchPage, AppError> {
            Ok(self.next_page())
        }

        async fn fetch_more(&self, _page_token: &str) -> Result<FetchPage, AppError> {
            Ok(self.next_page())
        }
    }

    fn here() -> Option<GeoPoint> {
        Some(GeoPoint {
            latitude: 40.7,
            longitude: -74.0,
        })
    }

    #[test]
    fn test_dedupe_chains_keeps_first_listing() {
        let restaurants = vec![
            restaurant("Starbucks Reserve"),
            restaurant("Luigi's"),
            restaurant("STARBUCKS Downtown"),
            restaurant("McDonald's"),
            restaurant("Taqueria"),
        ];

        let deduped = dedupe_chains(restaurants);
        let names: Vec<_> = deduped.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Starbucks Reserve", "Luigi's", "McDonald's", "Taqueria"]
        );
    }

    #[tokio::test]
    async fn test_missing_location_short_circuits() {
        let catalog = PagedCatalog::new(vec![]);
        let fetch = fetch_restaurants(&catalog, None, Some(5.0)).await.unwrap();
        assert!(fetch.restaurants.is_empty());
        assert!(!fetch.rate_limited);

        let fetch = fetch_restaurants(&catalog, here(), None).await.unwrap();
        assert!(fetch.restaurants.is_empty());
        assert!(!fetch.rate_limited);
    }

    #[tokio::test]
    async fn test_pagination_merges_pages() {
        let catalog = PagedCatalog::new(vec![
            FetchPage {
                restaurants: vec![restaurant("One"), restaurant("Two")],
                next_page_token: Some("token".to_string()),
                rate_limited: false,
            },
            FetchPage {
                restaurants: vec![restaurant("Three")],
                next_page_token: None,
                rate_limited: false,
            },
        ]);

        let fetch = fetch_restaurants(&catalog, here(), Some(5.0)).await.unwrap();
        let names: Vec<_> = fetch.restaurants.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["One", "Two", "Three"]);
    }

    #[tokio::test]
    async fn test_rate_limit_degrades_to_empty() {
        let catalog = PagedCatalog::new(vec![FetchPage {
            restaurants: Vec::new(),
            next_page_token: None,
            rate_limited: true,
        }]);

        let fetch = fetch_restaurants(&catalog, here(), Some(5.0)).await.unwrap();
        assert!(fetch.restaurants.is_empty());
        assert!(fetch.rate_limited);

        // a limit on the follow-up page discards the first page too
        let catalog = PagedCatalog::new(vec![
            FetchPage {
                restaurants: vec![restaurant("One")],
                next_page_token: Some("token".to_string()),
                rate_limited: false,
            },
            FetchPage {
                restaurants: Vec::new(),
                next_page_token: None,
                rate_limited: true,
            },
        ]);

        let fetch = fetch_restaurants(&catalog, here(), Some(5.0)).await.unwrap();
        assert!(fetch.restaurants.is_empty());
        assert!(fetch.rate_limited);
    }
}
