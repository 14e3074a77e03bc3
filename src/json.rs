use serde_json::Value;

use crate::client::Client;
use crate::error::Failure;
use crate::headers::Headers;
use crate::response::Response;
use crate::settings::Settings;

type JsonResult = std::result::Result<(Response, Value), Failure>;

impl Client {
    /// Perform a request and parse a 200 response body as JSON
    ///
    /// Only a 200 body is parsed; any other status is data for the caller
    /// to inspect and comes back with [`Value::Null`]. A 200 body that is
    /// not valid JSON fails with `JsonProcessing`, keeping the response
    /// attached. Underlying request failures pass through unchanged.
    pub async fn request_json_string(
        &self,
        method: &str,
        url: &str,
        body: impl AsRef<[u8]>,
        headers: &Headers,
        extra_settings: &Settings,
    ) -> JsonResult {
        let mut settings = extra_settings.clone();
        settings.insert("http/url", url);
        settings.insert("http/method", method);
        let response = self.request(&settings, headers, body).await?;
        process_json_response(response)
    }

    /// Like [`request_json_string`](Client::request_json_string) with a JSON body
    pub async fn request_json(
        &self,
        method: &str,
        url: &str,
        body: &Value,
        headers: &Headers,
        extra_settings: &Settings,
    ) -> JsonResult {
        let body = if body.is_null() {
            String::new()
        } else {
            body.to_string()
        };
        self.request_json_string(method, url, body, headers, extra_settings)
            .await
    }
}

/// Map a completed response into the JSON-wrapper contract
fn process_json_response(response: Response) -> JsonResult {
    if response.status_code != 200 {
        tracing::debug!(
            status = response.status_code,
            "non-200 response, not parsing body as json"
        );
        return Ok((response, Value::Null));
    }
    match response.json() {
        Ok(parsed) => Ok((response, parsed)),
        Err(error) => Err(Failure::new(error, response)),
    }
}
