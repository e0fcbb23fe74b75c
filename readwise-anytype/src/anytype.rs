use std::time::Duration;

use itertools::Itertools;
use readwise_common::api::{decode_response, ApiError};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "http://localhost:31009";
pub const DEFAULT_API_VERSION: &str = "2025-05-20";

/// Text property holding the Readwise book id of a synced object. Anytype offers
/// no typed external-id field, so the generic description slot is used instead.
pub const SOURCE_ID_PROPERTY: &str = "description";

const API: &str = "Anytype";
const PAGE_LIMIT: usize = 100;

pub struct Anytype {
    client: Client,
    api_key: String,
    base_url: Url,
    version: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Space {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ObjectType {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Property {
    pub key: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AnytypeObject {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub object_type: Option<ObjectType>,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl AnytypeObject {
    pub fn property_text(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .and_then(|p| p.text.as_deref())
    }

    /// The Readwise book id this object was created from, if any.
    pub fn source_id(&self) -> Option<&str> {
        self.property_text(SOURCE_ID_PROPERTY)
    }

    /// Matches on the type's display name (case-insensitively) or its key.
    pub fn is_of_type(&self, object_type: &str) -> bool {
        self.object_type.as_ref().is_some_and(|t| {
            t.name.eq_ignore_ascii_case(object_type) || t.key == object_type.to_lowercase()
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CreateObjectRequest {
    pub name: String,
    pub type_key: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<ObjectIcon>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyValue>,
}

#[derive(Debug, Serialize)]
pub struct ObjectIcon {
    pub emoji: String,
    pub format: String,
}

impl ObjectIcon {
    pub fn emoji(emoji: &str) -> Self {
        Self {
            emoji: emoji.to_string(),
            format: "emoji".to_string(),
        }
    }
}

/// A text-valued property as sent on object creation.
#[derive(Debug, Serialize)]
pub struct PropertyValue {
    pub key: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateObjectRequest {
    pub name: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    total: Option<i64>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ObjectResponse {
    object: AnytypeObject,
}

impl Anytype {
    pub fn new(
        api_key: &str,
        base_url: Url,
        version: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::transport(API))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url,
            version: version.to_string(),
        })
    }

    pub async fn list_spaces(&self) -> Result<Vec<Space>, ApiError> {
        self.fetch_all(&["v1", "spaces"]).await
    }

    /// The configured space, or else the first one Anytype lists.
    pub async fn resolve_space_id(&self, configured: Option<&str>) -> anyhow::Result<String> {
        if let Some(space_id) = configured {
            return Ok(space_id.to_string());
        }

        let spaces = self.list_spaces().await?;
        let space = spaces
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no spaces found"))?;

        info!("Using space: {} (ID: {})", space.name, space.id);
        Ok(space.id)
    }

    /// Every object in the space whose type matches `object_type`. The API has no
    /// server-side type filter, so the whole space is paged through.
    pub async fn list_objects(
        &self,
        space_id: &str,
        object_type: &str,
    ) -> Result<Vec<AnytypeObject>, ApiError> {
        let objects: Vec<AnytypeObject> =
            self.fetch_all(&["v1", "spaces", space_id, "objects"]).await?;
        let total = objects.len();

        let matching = objects
            .into_iter()
            .filter(|o| o.is_of_type(object_type))
            .collect_vec();

        debug!(
            "{} of {} objects in space {} have type {}",
            matching.len(),
            total,
            space_id,
            object_type
        );

        Ok(matching)
    }

    pub async fn create_object(
        &self,
        space_id: &str,
        request: &CreateObjectRequest,
    ) -> Result<AnytypeObject, ApiError> {
        let url = self.url(&["v1", "spaces", space_id, "objects"])?;
        let response = self
            .request(Method::POST, url)
            .json(request)
            .send()
            .await
            .map_err(ApiError::transport(API))?;

        let created: ObjectResponse = decode_response(API, response).await?;
        Ok(created.object)
    }

    pub async fn update_object(
        &self,
        space_id: &str,
        object_id: &str,
        request: &UpdateObjectRequest,
    ) -> Result<AnytypeObject, ApiError> {
        let url = self.url(&["v1", "spaces", space_id, "objects", object_id])?;
        let response = self
            .request(Method::POST, url)
            .json(request)
            .send()
            .await
            .map_err(ApiError::transport(API))?;

        let updated: ObjectResponse = decode_response(API, response).await?;
        Ok(updated.object)
    }

    async fn fetch_all<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<Vec<T>, ApiError> {
        let url = self.url(segments)?;
        let mut items = vec![];

        loop {
            debug!("Anytype api url: {} (offset {})", url, items.len());

            let response = self
                .request(Method::GET, url.clone())
                .query(&[("offset", items.len()), ("limit", PAGE_LIMIT)])
                .send()
                .await
                .map_err(ApiError::transport(API))?;

            let page: ListResponse<T> = decode_response(API, response).await?;
            let received = page.data.len();
            items.extend(page.data);

            let (has_more, total) = page
                .pagination
                .map(|p| (p.has_more, p.total))
                .unwrap_or((false, None));

            debug!(
                "Received api response: received={}, total={:?}, has_more={}",
                received, total, has_more
            );

            let complete = total.is_some_and(|total| items.len() as i64 >= total);
            if !has_more || received == 0 || complete {
                break;
            }
        }

        Ok(items)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl {
                api: API,
                url: self.base_url.to_string(),
                reason: "cannot be a base url".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.api_key)
            .header("Anytype-Version", &self.version)
    }
}
