use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{Stream, TryStreamExt};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::api::{decode_response, ApiError};
use crate::{Book, Highlight};

pub const DEFAULT_API_ENDPOINT: &str = "https://readwise.io/api/v2";

const API: &str = "Readwise";

/// Somewhere books and their highlights can be read from.
#[async_trait]
pub trait BookSource: Send + Sync {
    /// Every book, optionally only those updated after the given instant.
    async fn books(&self, updated_after: Option<DateTime<Utc>>) -> Result<Vec<Book>, ApiError>;

    /// Every highlight belonging to one book.
    async fn highlights(&self, book_id: i64) -> Result<Vec<Highlight>, ApiError>;
}

pub struct Readwise {
    client: Client,
    token: String,
    api_endpoint: Url,
    api_page_size: i64,
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Resource {
    Books,
    Highlights,
}

impl Resource {
    fn path_segment(self) -> &'static str {
        match self {
            Resource::Books => "books",
            Resource::Highlights => "highlights",
        }
    }
}

impl Readwise {
    pub fn new(token: &str, api_endpoint: Url, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::transport(API))?;

        Ok(Self {
            client,
            token: token.to_string(),
            api_endpoint,
            api_page_size: 1000,
        })
    }

    pub fn fetch_books_stream(
        &self,
        updated_after: Option<DateTime<Utc>>,
    ) -> impl Stream<Item = Result<Vec<Book>, ApiError>> + '_ {
        let mut query = vec![];
        if let Some(updated_after) = updated_after {
            query.push(("updated__gt", updated_after.to_rfc3339()));
        }

        self.fetch_paged(Resource::Books, query)
    }

    pub fn fetch_highlights_stream(
        &self,
        book_id: i64,
    ) -> impl Stream<Item = Result<Vec<Highlight>, ApiError>> + '_ {
        self.fetch_paged(Resource::Highlights, vec![("book_id", book_id.to_string())])
    }

    /// Walks the `next` links of a collection endpoint, yielding one page of results at a time.
    pub fn fetch_paged<T>(
        &self,
        resource: Resource,
        query: Vec<(&'static str, String)>,
    ) -> impl Stream<Item = Result<Vec<T>, ApiError>> + '_
    where
        T: DeserializeOwned + Send + 'static,
    {
        try_stream! {
            let mut next_url = Some(self.resource_url(resource, &query)?);

            while let Some(url) = next_url.take() {
                debug!("Readwise api url: {}", url);

                let response = self
                    .client
                    .get(url)
                    .header(AUTHORIZATION, format!("Token {}", self.token))
                    .send()
                    .await
                    .map_err(ApiError::transport(API))?;

                let page: CollectionResponse<T> = decode_response(API, response).await?;

                debug!(
                    "Received api response: count={count:?}, next={next:?}, previous={previous:?}",
                    count = page.count,
                    next = page.next,
                    previous = page.previous,
                );

                next_url = page.next.as_deref().map(parse_next_url).transpose()?;
                yield page.results;
            }
        }
    }

    fn resource_url(
        &self,
        resource: Resource,
        query: &[(&'static str, String)],
    ) -> Result<Url, ApiError> {
        let mut url = self.api_endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl {
                api: API,
                url: self.api_endpoint.to_string(),
                reason: "cannot be a base url".to_string(),
            })?
            .pop_if_empty()
            .push(resource.path_segment())
            .push("");

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("page_size", &self.api_page_size.to_string());
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl BookSource for Readwise {
    async fn books(&self, updated_after: Option<DateTime<Utc>>) -> Result<Vec<Book>, ApiError> {
        info!(
            "Fetching books from Readwise, since {}",
            updated_after
                .map(|v| v.to_rfc3339())
                .unwrap_or("[all]".to_string())
        );

        self.fetch_books_stream(updated_after).try_concat().await
    }

    async fn highlights(&self, book_id: i64) -> Result<Vec<Highlight>, ApiError> {
        debug!("Fetching highlights for book {}", book_id);
        self.fetch_highlights_stream(book_id).try_concat().await
    }
}

fn parse_next_url(next: &str) -> Result<Url, ApiError> {
    Url::parse(next).map_err(|e| ApiError::InvalidUrl {
        api: API,
        url: next.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct CollectionResponse<T> {
    count: Option<i64>,
    next: Option<String>,
    previous: Option<String>,
    results: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> Readwise {
        let endpoint = format!("{}/api/v2", server.uri()).parse().unwrap();
        Readwise::new("secret", endpoint, Duration::from_secs(5)).unwrap()
    }

    fn book(id: i64, title: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": title,
            "author": "Donella Meadows",
            "category": "books",
            "source": "kindle",
            "num_highlights": 2,
            "tags": []
        })
    }

    #[tokio::test]
    async fn books_follow_next_links_in_page_order() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/books/"))
            .and(query_param("page_size", "1000"))
            .and(header("Authorization", "Token secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 3,
                "next": format!("{}/api/v2/books/?page=2", server.uri()),
                "previous": null,
                "results": [book(1, "First"), book(2, "Second")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v2/books/"))
            .and(query_param("page", "2"))
            .and(header("Authorization", "Token secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 3,
                "next": null,
                "previous": format!("{}/api/v2/books/", server.uri()),
                "results": [book(3, "Third")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let books = client(&server).books(None).await.unwrap();

        let ids: Vec<i64> = books.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(books[2].title, "Third");
    }

    #[tokio::test]
    async fn books_pass_updated_after_bound() {
        let server = MockServer::start().await;
        let since: DateTime<Utc> = "2024-01-01T00:00:00Z".parse().unwrap();

        Mock::given(method("GET"))
            .and(path("/api/v2/books/"))
            .and(query_param("updated__gt", since.to_rfc3339()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 0,
                "next": null,
                "previous": null,
                "results": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let books = client(&server).books(Some(since)).await.unwrap();
        assert!(books.is_empty());
    }

    #[tokio::test]
    async fn highlights_are_requested_per_book() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/highlights/"))
            .and(query_param("book_id", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 2,
                "next": null,
                "previous": null,
                "results": [
                    {"id": 10, "text": "Stocks change through flows.", "note": "", "location": 3,
                     "location_type": "location", "color": "yellow", "book_id": 42, "tags": []},
                    {"id": 11, "text": "Delays cause oscillation.", "note": "see ch. 2", "location": 9,
                     "location_type": "location", "color": "blue", "book_id": 42, "tags": []}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let highlights = client(&server).highlights(42).await.unwrap();

        assert_eq!(highlights.len(), 2);
        assert!(!highlights[0].has_note());
        assert_eq!(highlights[1].note, "see ch. 2");
    }

    #[tokio::test]
    async fn server_error_names_the_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/books/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client(&server).books(None).await.unwrap_err();

        assert_eq!(err.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        assert!(err.to_string().contains("500"), "{}", err);
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/highlights/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server).highlights(1).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }), "{:?}", err);
    }
}
