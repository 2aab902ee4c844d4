use retry::delay::Fixed;
use retry::{retry, OperationResult};
use serde_json::Value;
use simple_error::bail;
use std::time::Duration;

use crate::FnResult;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_PAUSE_MS: u64 = 5000;
const RETRIES: usize = 3;

/// Builds the agent that all upstream requests go through.
pub fn default_agent() -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build()
}

/// Fetches a JSON document. Transport problems and server errors are retried
/// a few times with a fixed pause. Client errors and malformed bodies are
/// final, those indicate a broken URL or key rather than a hiccup.
pub fn fetch_json(agent: &ureq::Agent, url: &str, verbose: bool) -> FnResult<Value> {
    let result = retry(Fixed::from_millis(RETRY_PAUSE_MS).take(RETRIES), || {
        if verbose {
            println!("Fetching {}", url);
        }
        match agent.get(url).call() {
            Ok(response) => match response.into_json::<Value>() {
                Ok(body) => OperationResult::Ok(body),
                Err(e) => OperationResult::Err(format!("response is not valid JSON: {}", e)),
            },
            Err(ureq::Error::Status(code, _)) if code >= 500 => {
                eprintln!("Server error {} from {}. Will retry shortly…", code, url);
                OperationResult::Retry(format!("server error {}", code))
            }
            Err(ureq::Error::Status(code, _)) => {
                OperationResult::Err(format!("request failed with status {}", code))
            }
            Err(e) => {
                eprintln!("Transport error from {}: {}. Will retry shortly…", url, e);
                OperationResult::Retry(format!("transport error: {}", e))
            }
        }
    });

    match result {
        Ok(body) => Ok(body),
        Err(e) => bail!("Giving up on {}: {}", url, e),
    }
}

/// What one Seoul open data request came back with: the row array, or the
/// RESULT message the service sent instead (missing data, bad key, …).
pub enum ApiRows<'a> {
    Rows(&'a [Value]),
    NoData(String),
}

/// Unpacks the Seoul open data envelope for the given service name.
pub fn api_rows<'a>(body: &'a Value, service: &str) -> ApiRows<'a> {
    if let Some(rows) = body
        .get(service)
        .and_then(|service_body| service_body.get("row"))
        .and_then(|rows| rows.as_array())
    {
        return ApiRows::Rows(rows);
    }
    let message = body
        .pointer("/RESULT/MESSAGE")
        .and_then(|message| message.as_str())
        .unwrap_or("unknown API response")
        .to_string();
    ApiRows::NoData(message)
}
