//! Afisha JSON API client.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::errors::AfishaApiError;
use super::json::parse_json_with_context;
use super::models::{Places, Repertory, ScheduleCinema, ScheduleCinemaResponse};
use super::paging::{PagingError, paging_load};
use crate::config::Config;
use crate::utils::log_if_slow;

const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(5);

/// Params for [`AfishaApi::get_schedule_cinema`]. Exactly one of `event_id`
/// and `place_id` must be set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScheduleCinemaParams {
    #[serde(skip)]
    pub event_id: Option<String>,
    #[serde(skip)]
    pub place_id: Option<String>,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl ScheduleCinemaParams {
    fn endpoint(&self) -> Result<String, AfishaApiError> {
        match (&self.event_id, &self.place_id) {
            (Some(_), Some(_)) => Err(AfishaApiError::InvalidRequest(
                "set either event_id or place_id, not both",
            )),
            (Some(event), None) => Ok(format!("events/{event}/schedule_cinema")),
            (None, Some(place)) => Ok(format!("places/{place}/schedule_cinema")),
            (None, None) => Err(AfishaApiError::InvalidRequest(
                "either event_id or place_id is required",
            )),
        }
    }
}

/// Params for [`AfishaApi::get_repertory`]. Without `place_id` every cinema
/// event of the city is listed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepertoryParams {
    #[serde(skip)]
    pub place_id: Option<String>,
    pub city: String,
    pub limit: usize,
    pub offset: usize,
}

impl RepertoryParams {
    fn endpoint(&self) -> String {
        match &self.place_id {
            Some(place) => format!("places/{place}/repertory"),
            None => "events/selection/all-events-cinema".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlacesParams {
    pub city: String,
    pub limit: usize,
    pub offset: usize,
}

/// Rate-limited client for the Afisha API and site.
///
/// Requests are issued one at a time per caller; the limiter is shared by
/// every request made through this client.
pub struct AfishaApi {
    pub(super) http: reqwest::Client,
    api_base: Url,
    pub(super) site_base: Url,
    limiter: DefaultDirectRateLimiter,
}

impl AfishaApi {
    pub fn new(
        api_base: &str,
        site_base: &str,
        requests_per_second: u32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            http,
            api_base: Url::parse(api_base)?,
            site_base: Url::parse(site_base)?,
            limiter: RateLimiter::direct(quota),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            &config.afisha_api_url,
            &config.afisha_site_url,
            config.requests_per_second,
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    /// Wait for a rate limiter slot.
    pub(super) async fn throttle(&self) {
        self.limiter.until_ready().await;
    }

    async fn request<T, Q>(&self, endpoint: &str, params: &Q) -> Result<T, AfishaApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.api_base.join(endpoint)?;
        self.throttle().await;

        let start = Instant::now();
        debug!(url = %url, "fetching");
        let response = self
            .http
            .get(url.clone())
            .query(params)
            .send()
            .await
            .map_err(|source| AfishaApiError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(AfishaApiError::Status {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| AfishaApiError::Transport {
                url: final_url.clone(),
                source,
            })?;
        log_if_slow(start, SLOW_REQUEST_THRESHOLD, endpoint);

        parse_json_with_context(&body).map_err(|source| AfishaApiError::ParseFailed {
            status: status.as_u16(),
            url: final_url,
            source,
        })
    }

    /// Fetch one page of a cinema schedule, either for a place or for an event.
    pub async fn get_schedule_cinema(
        &self,
        params: &ScheduleCinemaParams,
    ) -> Result<ScheduleCinema, AfishaApiError> {
        let endpoint = params.endpoint()?;
        let response: ScheduleCinemaResponse = self.request(&endpoint, params).await?;
        Ok(response.schedule)
    }

    /// [`get_schedule_cinema`](Self::get_schedule_cinema) over every page.
    pub async fn get_schedule_cinema_full(
        &self,
        params: &ScheduleCinemaParams,
    ) -> Result<ScheduleCinema, PagingError<AfishaApiError>> {
        let mut result = ScheduleCinema::default();
        let mut paged = params.clone();

        paging_load(params.offset, params.limit, async |offset, limit| {
            paged.offset = offset;
            paged.limit = limit;

            let page = self.get_schedule_cinema(&paged).await?;
            let count = page.items.len();
            result.params = page.params;
            result.items.extend(page.items);
            Ok::<_, AfishaApiError>((page.paging, count))
        })
        .await?;

        Ok(result)
    }

    /// Fetch one page of the repertory of a city or of a single place.
    pub async fn get_repertory(
        &self,
        params: &RepertoryParams,
    ) -> Result<Repertory, AfishaApiError> {
        self.request(&params.endpoint(), params).await
    }

    /// [`get_repertory`](Self::get_repertory) over every page.
    pub async fn get_repertory_full(
        &self,
        params: &RepertoryParams,
    ) -> Result<Repertory, PagingError<AfishaApiError>> {
        let mut result = Repertory::default();
        let mut paged = params.clone();

        paging_load(params.offset, params.limit, async |offset, limit| {
            paged.offset = offset;
            paged.limit = limit;

            let page = self.get_repertory(&paged).await?;
            let count = page.data.len();
            result.data.extend(page.data);
            result.paging = page.paging;
            Ok::<_, AfishaApiError>((page.paging, count))
        })
        .await?;

        Ok(result)
    }

    /// Fetch one page of the cinemas of a city.
    pub async fn get_places(&self, params: &PlacesParams) -> Result<Places, AfishaApiError> {
        self.request("events/cinema/places", params).await
    }

    /// [`get_places`](Self::get_places) over every page.
    pub async fn get_places_full(
        &self,
        params: &PlacesParams,
    ) -> Result<Places, PagingError<AfishaApiError>> {
        let mut result = Places::default();
        let mut paged = params.clone();

        paging_load(params.offset, params.limit, async |offset, limit| {
            paged.offset = offset;
            paged.limit = limit;

            let page = self.get_places(&paged).await?;
            let count = page.items.len();
            result.items.extend(page.items);
            result.paging = page.paging;
            Ok::<_, AfishaApiError>((page.paging, count))
        })
        .await?;

        Ok(result)
    }
}
