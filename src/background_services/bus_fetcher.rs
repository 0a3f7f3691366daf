//! Responsible for fetching live bus positions from the realtime feed
use std::{future::Future, time::Duration};

use itertools::Itertools;
use tracing::{Instrument, error, info, info_span};

use crate::model::{Bus, hrm_api_model::HrmBusResponse};

pub const DEFAULT_FEED_BASE_URL: &str = "https://prog2700.onrender.com/";

/// A source of live bus positions
pub trait BusFeed: Send + Sync + 'static {
    fn fetch_buses(&self) -> impl Future<Output = Result<Vec<Bus>, FetchBusesError>> + Send;
}

/// The `hrmbuses` JSON endpoint
#[derive(Clone, Debug)]
pub struct HttpBusFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpBusFeed {
    /// Every request is cut off after `timeout`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchBusesError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(HttpBusFeed {
            client,
            url: format!("{}/hrmbuses", base_url.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl BusFeed for HttpBusFeed {
    #[tracing::instrument(err, skip(self), fields(url = %self.url))]
    async fn fetch_buses(&self) -> Result<Vec<Bus>, FetchBusesError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .instrument(info_span!("Fetching buses"))
            .await?
            .error_for_status()?;

        let body = response
            .text()
            .instrument(info_span!("Reading body of response"))
            .await?;

        let response: HrmBusResponse = serde_json::from_str(&body)
            .map_err(|source| FetchBusesError::ParsingError { source, body })?;

        let feed_time = response.header.local_timestamp();
        let buses = response.entity.into_iter().map(Bus::from).collect_vec();

        info!(?feed_time, "got {} buses", buses.len());

        Ok(buses)
    }
}

/// Fetches the buses, logging and returning nothing on failure
pub async fn fetch_buses_or_empty<F: BusFeed>(feed: &F) -> Vec<Bus> {
    feed.fetch_buses().await.unwrap_or_else(|e| {
        error!("Error fetching buses: {e}");
        vec![]
    })
}

#[derive(thiserror::Error, Debug)]
pub enum FetchBusesError {
    #[error("error fetching the buses: {0}")]
    HttpRequestError(#[from] reqwest::Error),

    #[error("error parsing the buses: {source}")]
    ParsingError {
        source: serde_json::Error,
        body: String,
    },
}
