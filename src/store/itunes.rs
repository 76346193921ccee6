use crate::store::{AppStore, Lookup};
use anyhow::{anyhow, Result};
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use url::Url;

pub struct ItunesStore {
    client: Client,
    lookup_url: Url,
}

impl ItunesStore {
    pub fn new(lookup_url: &str, user_agent: &str) -> Result<ItunesStore> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, user_agent.parse()?);

        let client = Client::builder().default_headers(headers).build()?;
        let lookup_url: Url = lookup_url
            .parse()
            .map_err(|e| anyhow!("Invalid lookup url {}: {}", lookup_url, e))?;

        Ok(ItunesStore { client, lookup_url })
    }
}

#[async_trait::async_trait]
impl AppStore for ItunesStore {
    async fn lookup(&self, bundle_id: &str) -> Result<Lookup> {
        info!("Looking up {} on {}", bundle_id, self.lookup_url);
        let req = self
            .client
            .get(self.lookup_url.clone())
            .query(&[("bundleId", bundle_id)])
            .build()?;

        let lookup: Lookup = self
            .client
            .execute(req)
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("{} result(s) for {}", lookup.result_count, bundle_id);
        Ok(lookup)
    }
}
