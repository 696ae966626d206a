use reqwest::blocking::Client;
use serde::Deserialize;

use crate::config::{CATALOG_TIMEOUT, CatalogEndpoints};
use crate::domain::{CollectionConceptId, Doi, Granule, GranuleId, SortOrder};
use crate::error::SmokeError;
use crate::http;

const PRIORITY_RELS: [&str; 3] = [
    "http://esip.opendap.org/ns/esip/data",
    "http://esip.opendap.org/ns/esip/producer",
    "http://esip.opendap.org/ns/esip/download",
];

#[derive(Debug, Deserialize)]
pub struct SearchResponse<E> {
    #[serde(default = "Feed::empty")]
    pub feed: Feed<E>,
}

#[derive(Debug, Deserialize)]
pub struct Feed<E> {
    #[serde(default = "Vec::new")]
    pub entry: Vec<E>,
}

impl<E> Feed<E> {
    fn empty() -> Self {
        Self { entry: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
pub struct CollectionEntry {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GranuleEntry {
    #[serde(default)]
    pub title: Option<String>,
    pub id: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub rel: String,
}

pub trait CatalogClient: Send + Sync {
    fn find_collection(&self, doi: &Doi) -> Result<Option<CollectionConceptId>, SmokeError>;
    fn find_granule(
        &self,
        collection: &CollectionConceptId,
        order: SortOrder,
        extension: &str,
    ) -> Result<Option<Granule>, SmokeError>;
}

#[derive(Clone)]
pub struct CmrHttpClient {
    client: Client,
    endpoints: CatalogEndpoints,
}

impl CmrHttpClient {
    pub fn new(endpoints: CatalogEndpoints) -> Result<Self, SmokeError> {
        let client = http::client_builder(CATALOG_TIMEOUT)
            .build()
            .map_err(|err| SmokeError::CatalogHttp(err.to_string()))?;
        Ok(Self { client, endpoints })
    }

    fn search<E>(&self, url: &str, query: &[(&str, &str)]) -> Result<Vec<E>, SmokeError>
    where
        E: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|err| SmokeError::CatalogHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "CMR request failed".to_string());
            return Err(SmokeError::CatalogStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| SmokeError::CatalogHttp(err.to_string()))?;
        parse_feed(&body)
    }
}

impl CatalogClient for CmrHttpClient {
    fn find_collection(&self, doi: &Doi) -> Result<Option<CollectionConceptId>, SmokeError> {
        let entries: Vec<CollectionEntry> = self.search(
            &self.endpoints.collections_url,
            &[("doi", doi.as_str()), ("page_size", "1"), ("pretty", "true")],
        )?;
        Ok(first_collection(entries))
    }

    fn find_granule(
        &self,
        collection: &CollectionConceptId,
        order: SortOrder,
        extension: &str,
    ) -> Result<Option<Granule>, SmokeError> {
        let entries: Vec<GranuleEntry> = self.search(
            &self.endpoints.granules_url,
            &[
                ("collection_concept_id", collection.as_str()),
                ("page_size", "1"),
                ("sort_key", order.sort_key()),
                ("pretty", "true"),
            ],
        )?;
        Ok(entries
            .into_iter()
            .next()
            .and_then(|entry| granule_from_entry(entry, collection, extension)))
    }
}

pub fn parse_feed<E>(body: &str) -> Result<Vec<E>, SmokeError>
where
    E: for<'de> Deserialize<'de>,
{
    let response: SearchResponse<E> =
        serde_json::from_str(body).map_err(|err| SmokeError::CatalogParse(err.to_string()))?;
    Ok(response.feed.entry)
}

pub fn first_collection(entries: Vec<CollectionEntry>) -> Option<CollectionConceptId> {
    entries
        .into_iter()
        .next()
        .and_then(|entry| entry.id)
        .filter(|id| !id.is_empty())
        .map(CollectionConceptId::new)
}

/// Turns a CMR granule entry into a [`Granule`]; entries without a usable download link
/// are dropped.
pub fn granule_from_entry(
    entry: GranuleEntry,
    collection: &CollectionConceptId,
    extension: &str,
) -> Option<Granule> {
    let id = entry.id?;
    let download_url = select_download_url(&entry.links, extension)?;
    Some(Granule {
        title: entry.title.unwrap_or_else(|| id.clone()),
        id: GranuleId::new(id),
        download_url,
        collection_id: collection.clone(),
    })
}

/// Picks the download link for a granule.
///
/// Candidates are http(s) links ending in `.<extension>`. Links with an ESIP
/// data/producer/download relation go to the front, everything else to the
/// back. The first https candidate wins, otherwise the first candidate.
pub fn select_download_url(links: &[Link], extension: &str) -> Option<String> {
    let suffix = format!(".{}", extension.to_lowercase());
    let mut candidates: Vec<&str> = Vec::new();
    for link in links {
        let href = link.href.as_str();
        let is_http = href.starts_with("http://") || href.starts_with("https://");
        if !is_http || !href.to_lowercase().ends_with(&suffix) {
            continue;
        }
        if PRIORITY_RELS.contains(&link.rel.as_str()) {
            candidates.insert(0, href);
        } else {
            candidates.push(href);
        }
    }

    candidates
        .iter()
        .find(|href| href.starts_with("https://"))
        .or_else(|| candidates.first())
        .map(|href| href.to_string())
}
