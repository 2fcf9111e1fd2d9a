//! Trello REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Request, Response};
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use url::Url;

use super::{Board, BoardApi, BoardError, BoardList, Card};
use crate::Config;

/// Board API client authenticating with key/token query parameters.
#[derive(Clone)]
pub struct TrelloClient {
    client: Client,
    base: Url,
    key: String,
    token: String,
}

impl TrelloClient {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// Every request is bounded by `timeout`; a timed-out call is a failure.
    pub fn new(
        base_url: &str,
        key: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BoardError> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(BoardError::Unavailable(format!(
                "{base_url} cannot be used as an API root"
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base,
            key: key.into(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, BoardError> {
        Self::new(
            &config.board_api_url,
            config.board_api_key.clone(),
            config.board_api_token.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    /// Build `<base>/<segments...>?key=..&token=..&<query...>`.
    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.query_pairs_mut()
            .append_pair("key", &self.key)
            .append_pair("token", &self.token)
            .extend_pairs(query);
        url
    }

    async fn send(&self, request: Request, operation: &'static str) -> Result<Response, BoardError> {
        let response = self.client.execute(request).await.map_err(|e| {
            if e.is_timeout() {
                warn!(operation = operation, error = %e, "board_api_timeout");
            } else {
                warn!(operation = operation, error = %e, "board_api_request_error");
            }
            BoardError::Http(e)
        })?;

        let status = response.status();
        if status.is_success() {
            info!(operation = operation, status_code = status.as_u16(), "board_api_call_complete");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let preview: String = body.chars().take(200).collect();
        warn!(
            operation = operation,
            status_code = status.as_u16(),
            body_preview = %preview,
            "board_api_call_rejected"
        );
        Err(BoardError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Comment text travels as a form body; it can be far longer than a URL may be.
    fn comment_request(&self, card_id: &str, text: &str) -> Result<Request, BoardError> {
        let url = self.endpoint(&["cards", card_id, "actions", "comments"], &[]);
        Ok(self.client.post(url).form(&[("text", text)]).build()?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, operation: &'static str) -> Result<T, BoardError> {
        let request = self.client.get(url).build()?;
        let response = self.send(request, operation).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl BoardApi for TrelloClient {
    async fn comment_post(&self, card_id: &str, text: &str) -> Result<(), BoardError> {
        let request = self.comment_request(card_id, text)?;
        self.send(request, "comment_post").await?;
        Ok(())
    }

    async fn card_get(&self, card_id: &str) -> Result<Card, BoardError> {
        let url = self.endpoint(&["cards", card_id], &[]);
        self.get_json(url, "card_get").await
    }

    async fn board_get(&self, board_id: &str) -> Result<Board, BoardError> {
        let url = self.endpoint(&["boards", board_id], &[]);
        self.get_json(url, "board_get").await
    }

    async fn board_lists_get(&self, board_id: &str) -> Result<Vec<BoardList>, BoardError> {
        let url = self.endpoint(&["boards", board_id, "lists"], &[]);
        self.get_json(url, "board_lists_get").await
    }

    async fn card_move(&self, card_id: &str, list_id: &str) -> Result<(), BoardError> {
        let url = self.endpoint(&["cards", card_id], &[("idList", list_id)]);
        let request = self.client.put(url).build()?;
        self.send(request, "card_move").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TrelloClient {
        TrelloClient::new("https://api.trello.com/1/", "k3y", "t0ken", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_appends_segments_and_credentials() {
        let url = client().endpoint(&["cards", "abc123", "actions", "comments"], &[("text", "Ann\nhi")]);
        assert_eq!(url.path(), "/1/cards/abc123/actions/comments");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("key".to_string(), "k3y".to_string()),
                ("token".to_string(), "t0ken".to_string()),
                ("text".to_string(), "Ann\nhi".to_string()),
            ]
        );
    }

    #[test]
    fn test_comment_text_is_sent_as_form_body() {
        let text = format!("Ann\n{}\nhttp://x/1", "é & ü ".repeat(3000));
        let request = client().comment_request("abc123", &text).unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/1/cards/abc123/actions/comments");
        assert!(request.url().query_pairs().all(|(name, _)| name != "text"));
        assert!(request.url().as_str().len() < 200);
        assert_eq!(
            request.headers()[reqwest::header::CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        let fields: Vec<(String, String)> = url::form_urlencoded::parse(body).into_owned().collect();
        assert_eq!(fields, vec![("text".to_string(), text)]);
    }

    #[test]
    fn test_endpoint_without_trailing_slash() {
        let client =
            TrelloClient::new("https://api.trello.com/1", "k", "t", Duration::from_secs(5)).unwrap();
        let url = client.endpoint(&["boards", "b1", "lists"], &[]);
        assert_eq!(url.path(), "/1/boards/b1/lists");
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let url = client().endpoint(&["cards", "a b?c"], &[]);
        assert_eq!(url.path(), "/1/cards/a%20b%3Fc");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            TrelloClient::new("not a url", "k", "t", Duration::from_secs(1)),
            Err(BoardError::Url(_))
        ));
        assert!(matches!(
            TrelloClient::new("mailto:ops@example.com", "k", "t", Duration::from_secs(1)),
            Err(BoardError::Unavailable(_))
        ));
    }
}
