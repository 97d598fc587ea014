//! Request identity construction
//!
//! Every outbound call carries the same browser-shaped header set plus the
//! account's auth token. Built once per runner and installed as the HTTP
//! client's default headers.

use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, AUTHORIZATION,
    CACHE_CONTROL, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT,
};

/// Widget-embedded API key the public web client ships with
pub(crate) const API_KEY: &str = r#"ResyAPI api_key="VbWk7s3L4KiK5fzlO7JD3Q5EYolJI7n5""#;

const UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Build the header set for authenticated API requests.
pub fn build_request_identity(auth_token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(AUTHORIZATION, HeaderValue::from_static(API_KEY));
    if let Ok(token) = HeaderValue::from_str(auth_token) {
        headers.insert("X-Resy-Auth-Token", token.clone());
        headers.insert("X-Resy-Universal-Auth", token);
    }

    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        ACCEPT_ENCODING,
        HeaderValue::from_static("gzip, deflate, br"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    headers.insert(ORIGIN, HeaderValue::from_static("https://resy.com"));
    headers.insert(REFERER, HeaderValue::from_static("https://resy.com/"));
    headers.insert(
        "Sec-Ch-Ua",
        HeaderValue::from_static(
            r#""Chromium";v="142", "Google Chrome";v="142", "Not:A-Brand";v="99""#,
        ),
    );
    headers.insert("Sec-Ch-Ua-Mobile", HeaderValue::from_static("?0"));
    headers.insert("Sec-Ch-Ua-Platform", HeaderValue::from_static(r#""macOS""#));
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-site"));
    headers.insert(USER_AGENT, HeaderValue::from_static(UA));

    headers
}

/// Extra headers the booking endpoint requires beyond the session defaults.
pub fn booking_headers(auth_token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert("X-Origin", HeaderValue::from_static("https://widgets.resy.com"));
    if let Ok(token) = HeaderValue::from_str(auth_token) {
        headers.insert("X-Resy-Universal-Auth", token);
    }
    headers.insert(REFERER, HeaderValue::from_static("https://widgets.resy.com/"));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));

    headers
}
