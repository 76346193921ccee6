use crate::settings::Settings;
use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use url::Url;

mod itunes;

pub use itunes::ItunesStore;

/// Response of the iTunes lookup endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Lookup {
    pub result_count: u64,
    pub results: Vec<LookupResult>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LookupResult {
    pub track_view_url: String,
    pub artwork_url60: String,
    pub artwork_url100: String,
    pub artwork_url512: String,
    pub artist_view_url: String,
    pub screenshot_urls: Vec<String>,
    pub ipad_screenshot_urls: Vec<String>,
    pub appletv_screenshot_urls: Vec<String>,
    pub supported_devices: Vec<String>,
    #[serde(rename = "languageCodesISO2A")]
    pub language_codes_iso2a: Vec<String>,
}

/// App Store page of an application, empty when unknown
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StoreUrl(pub String);

impl StoreUrl {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Same page on the `region` storefront.
    ///
    /// The storefront is the first path segment and is only replaced when the
    /// path has at least two segments. Unparsable urls come back unchanged.
    pub fn regional(&self, region: &str) -> StoreUrl {
        let Ok(mut u) = Url::parse(&self.0) else {
            return self.clone();
        };
        let segments: Vec<String> = match u.path_segments() {
            Some(s) => s.map(|s| s.to_string()).collect(),
            None => return self.clone(),
        };
        if segments.len() < 2 {
            return self.clone();
        }
        let rest = segments[1..].join("/");
        u.set_path(&format!("/{}/{}", region, rest));
        StoreUrl(u.to_string())
    }

    /// China storefront
    pub fn cn(&self) -> StoreUrl {
        self.regional("cn")
    }
}

impl Display for StoreUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Application catalog that can be searched by bundle id
#[async_trait::async_trait]
pub trait AppStore: Send + Sync {
    async fn lookup(&self, bundle_id: &str) -> Result<Lookup>;

    /// Store page of the first lookup result, empty on any failure
    async fn store_url(&self, bundle_id: &str) -> StoreUrl {
        match self.lookup(bundle_id).await {
            Ok(lk) => lk
                .results
                .into_iter()
                .next()
                .map(|r| StoreUrl(r.track_view_url))
                .unwrap_or_default(),
            Err(e) => {
                warn!("Lookup of {} failed: {}", bundle_id, e);
                StoreUrl::default()
            }
        }
    }
}

impl TryFrom<&Settings> for Box<dyn AppStore> {
    type Error = anyhow::Error;

    fn try_from(settings: &Settings) -> std::result::Result<Self, Self::Error> {
        Ok(Box::new(ItunesStore::new(
            &settings.lookup_url,
            &settings.user_agent,
        )?))
    }
}
