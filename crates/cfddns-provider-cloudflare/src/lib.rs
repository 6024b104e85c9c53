// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare DNS provider for the cfddns daemon.
//
// ## Implementation Status
//
// - ✅ Record lookup filtered by name and type
// - ✅ Record creation and in-place update (content, TTL, proxy flag)
// - ✅ Specific error handling for HTTP status codes (401, 403, 404, 429, 5xx)
// - ✅ Cloudflare "record already exists" codes surfaced as `AlreadyExists`
// - ✅ Dry-run mode for safe testing
// - ✅ Both A and AAAA record support
// - ❌ NO retry logic (the next poll is the retry)
// - ❌ NO caching (state owned by the engine's StateStore)
// - ❌ NO background tasks
//
// ## Trust Level: Untrusted (DNS Provider)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTPS API calls to the Cloudflare API only
// - ✅ Parse provider-specific responses
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Implement retry logic
// - ❌ Access state store
// - ❌ Decide whether an update is needed
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - Provider fails fast if token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PATCH `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use cfddns_core::config::RecordType;
use cfddns_core::traits::{DnsProvider, DnsRecord, UpsertRequest};
use cfddns_core::{Error, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Environment variable selecting the provider mode (`dry-run` or live)
pub const MODE_ENV: &str = "CFDDNS_MODE";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloudflare error codes meaning "an identical record already exists"
const RECORD_EXISTS_CODES: [u32; 2] = [81057, 81058];

const PROVIDER: &str = "cloudflare";

/// Whether `CFDDNS_MODE` requests dry-run mode
pub fn dry_run_from_env() -> bool {
    std::env::var(MODE_ENV)
        .map(|mode| mode.eq_ignore_ascii_case("dry-run"))
        .unwrap_or(false)
}

/// Cloudflare DNS provider
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot: each trait call maps to one API request.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (record lookup)
/// - Log the intended POST/PATCH payload
/// - **NOT** actually modify DNS records
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API root, overridable for tests
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip writes
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// Envelope wrapped around every Cloudflare API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: u32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiRecord {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    content: String,
    ttl: u32,
    #[serde(default)]
    proxied: bool,
}

impl ApiRecord {
    fn into_record(self) -> Result<DnsRecord> {
        let record_type = self.record_type.parse::<RecordType>().map_err(|_| {
            Error::provider(
                PROVIDER,
                format!("unexpected record type in response: {}", self.record_type),
            )
        })?;

        Ok(DnsRecord {
            id: self.id,
            name: self.name,
            record_type,
            content: self.content,
            ttl: self.ttl,
            proxied: self.proxied,
        })
    }
}

#[derive(Debug, Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
}

impl<'a> From<&UpsertRequest<'a>> for RecordBody<'a> {
    fn from(request: &UpsertRequest<'a>) -> Self {
        Self {
            record_type: request.record_type.as_str(),
            name: request.name,
            content: request.content,
            ttl: request.ttl,
            proxied: request.proxied,
        }
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `dry_run`: If true, perform GET requests but skip writes
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the token is empty
    /// - `Error::Http` if the HTTP client cannot be built
    pub fn new(api_token: impl Into<String>, dry_run: bool) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("failed to build HTTP client: {}", e)))?;

        if dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }

        Ok(Self {
            api_token,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Point the provider at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether writes are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn records_url(&self, zone_id: &str) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, zone_id)
    }

    /// Send a request and unwrap the Cloudflare envelope
    ///
    /// `action` names the operation in error messages.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, action: &str) -> Result<T> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::http(format!("{} failed: {}", action, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("{} failed reading response: {}", action, e)))?;

        if !status.is_success() {
            let errors = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
                .map(|envelope| envelope.errors)
                .unwrap_or_default();
            return Err(map_failure(status, &errors, &body, action));
        }

        let envelope: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            Error::provider(PROVIDER, format!("{}: failed to parse response: {}", action, e))
        })?;

        if !envelope.success {
            return Err(map_failure(status, &envelope.errors, &body, action));
        }

        envelope.result.ok_or_else(|| {
            Error::provider(PROVIDER, format!("{}: response has no result", action))
        })
    }
}

/// Map a failed API call to a core error
fn map_failure(status: StatusCode, errors: &[ApiMessage], body: &str, action: &str) -> Error {
    let detail = if errors.is_empty() {
        body.trim().to_string()
    } else {
        errors
            .iter()
            .map(|e| format!("{} (code {})", e.message, e.code))
            .collect::<Vec<_>>()
            .join("; ")
    };

    if errors.iter().any(|e| RECORD_EXISTS_CODES.contains(&e.code)) {
        return Error::already_exists(format!("{}: {}", action, detail));
    }

    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "{}: invalid API token or insufficient permissions ({}): {}",
            action, status, detail
        )),
        404 => Error::not_found(format!("{}: {}", action, detail)),
        429 => Error::rate_limited(format!("{}: {}", action, detail)),
        500..=599 => Error::provider(
            PROVIDER,
            format!("{}: Cloudflare server error (transient): {} - {}", action, status, detail),
        ),
        _ => Error::provider(PROVIDER, format!("{}: {} - {}", action, status, detail)),
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?name=home.example.com&type=A
    /// Authorization: Bearer <token>
    /// ```
    async fn find_record(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<Option<DnsRecord>> {
        tracing::debug!("Looking up record: {} (type: {})", name, record_type);

        let request = self
            .client
            .get(self.records_url(zone_id))
            .query(&[("name", name), ("type", record_type.as_str())]);

        let records: Vec<ApiRecord> = self.send(request, "list DNS records").await?;

        match records.into_iter().next() {
            Some(record) => {
                tracing::debug!("Found record ID: {}", record.id);
                record.into_record().map(Some)
            }
            None => Ok(None),
        }
    }

    /// # API Call
    ///
    /// ```http
    /// POST /zones/:zone_id/dns_records
    /// {"type": "A", "name": "...", "content": "1.2.3.4", "ttl": 300, "proxied": false}
    /// ```
    async fn create_record(&self, request: &UpsertRequest<'_>) -> Result<DnsRecord> {
        let body = RecordBody::from(request);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send POST request to {} with payload: {}",
                self.records_url(request.zone_id),
                serde_json::to_string(&body)
                    .map_err(|e| Error::provider(PROVIDER, format!("failed to serialize request: {}", e)))?
            );
            return Ok(DnsRecord {
                id: "dry-run".to_string(),
                name: request.name.to_string(),
                record_type: request.record_type,
                content: request.content.to_string(),
                ttl: request.ttl,
                proxied: request.proxied,
            });
        }

        let http = self
            .client
            .post(self.records_url(request.zone_id))
            .json(&body);

        let created: ApiRecord = self.send(http, "create DNS record").await?;
        tracing::debug!("Created record ID: {}", created.id);
        created.into_record()
    }

    /// # API Call
    ///
    /// ```http
    /// PATCH /zones/:zone_id/dns_records/:record_id
    /// {"type": "A", "name": "...", "content": "1.2.3.4", "ttl": 300, "proxied": false}
    /// ```
    async fn update_record(&self, record_id: &str, request: &UpsertRequest<'_>) -> Result<()> {
        let url = format!("{}/{}", self.records_url(request.zone_id), record_id);
        let body = RecordBody::from(request);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send PATCH request to {} with payload: {}",
                url,
                serde_json::to_string(&body)
                    .map_err(|e| Error::provider(PROVIDER, format!("failed to serialize request: {}", e)))?
            );
            return Ok(());
        }

        let http = self.client.patch(&url).json(&body);
        let _: serde_json::Value = self.send(http, "update DNS record").await?;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfddns_core::traits::UpsertOutcome;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> CloudflareProvider {
        CloudflareProvider::new("test_token", false)
            .unwrap()
            .with_base_url(server.uri())
    }

    fn request<'a>(content: &'a str) -> UpsertRequest<'a> {
        UpsertRequest {
            zone_id: "Z1",
            name: "home.example.com",
            record_type: RecordType::A,
            content,
            ttl: 300,
            proxied: false,
        }
    }

    fn api_record(id: &str, content: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": "home.example.com",
            "type": "A",
            "content": content,
            "ttl": 300,
            "proxied": false
        })
    }

    fn ok(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "errors": [],
            "messages": [],
            "result": result
        }))
    }

    fn failure(status: u16, code: u32, message: &str) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_json(json!({
            "success": false,
            "errors": [{"code": code, "message": message}],
            "messages": [],
            "result": null
        }))
    }

    #[tokio::test]
    async fn test_find_record_filters_by_name_and_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones/Z1/dns_records"))
            .and(query_param("name", "home.example.com"))
            .and(query_param("type", "A"))
            .and(header("authorization", "Bearer test_token"))
            .respond_with(ok(json!([api_record("rec1", "203.0.113.5")])))
            .expect(1)
            .mount(&server)
            .await;

        let record = provider(&server)
            .find_record("Z1", "home.example.com", RecordType::A)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.id, "rec1");
        assert_eq!(record.content, "203.0.113.5");
        assert_eq!(record.record_type, RecordType::A);
        assert_eq!(record.ttl, 300);
    }

    #[tokio::test]
    async fn test_find_record_empty_result_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones/Z1/dns_records"))
            .respond_with(ok(json!([])))
            .mount(&server)
            .await;

        let found = provider(&server)
            .find_record("Z1", "home.example.com", RecordType::Aaaa)
            .await
            .unwrap();

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_status_codes_map_to_specific_errors() {
        let cases = [
            (403, "auth"),
            (401, "auth"),
            (404, "not_found"),
            (429, "rate_limited"),
            (503, "provider"),
        ];

        for (status, expected) in cases {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(failure(status, 1000, "nope"))
                .mount(&server)
                .await;

            let err = provider(&server)
                .find_record("Z1", "home.example.com", RecordType::A)
                .await
                .unwrap_err();

            let matched = match expected {
                "auth" => matches!(err, Error::Authentication(_)),
                "not_found" => matches!(err, Error::NotFound(_)),
                "rate_limited" => matches!(err, Error::RateLimited(_)),
                _ => matches!(err, Error::Provider { .. }),
            };
            assert!(matched, "status {} produced {:?}", status, err);
        }
    }

    #[tokio::test]
    async fn test_create_record_posts_full_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/zones/Z1/dns_records"))
            .and(body_partial_json(json!({
                "type": "A",
                "name": "home.example.com",
                "content": "203.0.113.5",
                "ttl": 300,
                "proxied": false
            })))
            .respond_with(ok(api_record("new1", "203.0.113.5")))
            .expect(1)
            .mount(&server)
            .await;

        let created = provider(&server)
            .create_record(&request("203.0.113.5"))
            .await
            .unwrap();

        assert_eq!(created.id, "new1");
    }

    #[tokio::test]
    async fn test_create_conflict_maps_to_already_exists() {
        let cases = [
            (81057, "Record already exists."),
            (81058, "An identical record already exists."),
        ];

        for (code, message) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(failure(400, code, message))
                .mount(&server)
                .await;

            let err = provider(&server)
                .create_record(&request("203.0.113.5"))
                .await
                .unwrap_err();

            assert!(
                matches!(err, Error::AlreadyExists(_)),
                "code {} produced {:?}",
                code,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_upsert_updates_changed_record_with_patch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ok(json!([api_record("rec1", "198.51.100.7")])))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/zones/Z1/dns_records/rec1"))
            .and(body_partial_json(json!({"content": "203.0.113.5", "ttl": 300})))
            .respond_with(ok(api_record("rec1", "203.0.113.5")))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = provider(&server)
            .upsert_record(&request("203.0.113.5"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            UpsertOutcome::Updated {
                record_id: "rec1".to_string(),
                previous_content: "198.51.100.7".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_upsert_matching_record_makes_no_write() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ok(json!([api_record("rec1", "203.0.113.5")])))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ok(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = provider(&server)
            .upsert_record(&request("203.0.113.5"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            UpsertOutcome::Unchanged {
                record_id: "rec1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_upsert_creates_missing_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ok(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ok(api_record("new1", "203.0.113.5")))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = provider(&server)
            .upsert_record(&request("203.0.113.5"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            UpsertOutcome::Created {
                record_id: "new1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_dry_run_skips_writes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ok(json!([api_record("rec1", "198.51.100.7")])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ok(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let provider = CloudflareProvider::new("test_token", true)
            .unwrap()
            .with_base_url(server.uri());
        assert!(provider.is_dry_run());

        let outcome = provider
            .upsert_record(&request("203.0.113.5"))
            .await
            .unwrap();

        assert!(matches!(outcome, UpsertOutcome::Updated { .. }));
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = CloudflareProvider::new("", false).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let provider = CloudflareProvider::new("secret_token_12345", false).unwrap();

        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));
    }

    #[test]
    fn test_provider_name() {
        let provider = CloudflareProvider::new("token", false).unwrap();
        assert_eq!(provider.provider_name(), "cloudflare");
    }
}
