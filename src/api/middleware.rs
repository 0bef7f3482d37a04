//! API Middleware - Input Validation, Rate Limiting, Request Logging
//!
//! - Per-client fixed-window rate limiting with burst allowance
//! - Request/response logging under a correlation id
//! - Security headers
//! - Webhook shared-secret check

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::server::SharedAppState;
use crate::logging::{generate_correlation_id, log_api_request, log_api_response, log_security_event};

/// Header carrying the request correlation id
pub const CORRELATION_HEADER: &str = "x-correlation-id";

// ============================================================================
// Rate Limiting
// ============================================================================

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
    /// Burst allowance (extra requests allowed temporarily)
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
            burst: 10,
        }
    }
}

impl RateLimitConfig {
    /// Stricter config for tests and hostile environments
    pub fn strict() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
            burst: 5,
        }
    }
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
    burst_tokens: u32,
}

/// In-memory rate limiter keyed by client id
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: RwLock<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Check if a request is allowed for the given client ID
    pub async fn check(&self, client_id: &str) -> Result<(), RateLimitError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        let entry = entries.entry(client_id.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
            burst_tokens: self.config.burst,
        });

        if now.duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
            // Burst replenishes slowly
            entry.burst_tokens = self.config.burst.min(entry.burst_tokens + 2);
        }

        if entry.count < self.config.max_requests {
            entry.count += 1;
            Ok(())
        } else if entry.burst_tokens > 0 {
            entry.burst_tokens -= 1;
            entry.count += 1;
            Ok(())
        } else {
            let elapsed = now.duration_since(entry.window_start).as_secs();
            Err(RateLimitError::Exceeded {
                retry_after: self.config.window.as_secs().saturating_sub(elapsed),
            })
        }
    }

    /// Drop entries idle for two windows
    pub async fn cleanup(&self) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let expiry = self.config.window * 2;

        entries.retain(|_, entry| now.duration_since(entry.window_start) < expiry);
    }

    pub async fn tracked_clients(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[derive(Debug)]
pub enum RateLimitError {
    Exceeded { retry_after: u64 },
}

/// Shared rate limiter state
pub type RateLimitState = Arc<RateLimiter>;

pub fn create_rate_limiter(config: RateLimitConfig) -> RateLimitState {
    Arc::new(RateLimiter::new(config))
}

// ============================================================================
// Input Validation
// ============================================================================

#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            errors: vec![],
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            errors: vec![msg.into()],
        }
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.is_valid = self.is_valid && other.is_valid;
        self.errors.extend(other.errors);
        self
    }

    /// Convert into a 400 response body when invalid
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_valid {
            Ok(())
        } else {
            Err(ValidationError {
                error: self.errors.join("; "),
                code: Some("VALIDATION_ERROR".to_string()),
                details: self.errors,
                retry_after: None,
            })
        }
    }
}

/// Validate a Solana address (base58 public key)
pub fn validate_solana_address(address: &str) -> ValidationResult {
    if address.is_empty() {
        return ValidationResult::error("Wallet address is required");
    }

    // 32 bytes encode to 32..=44 base58 characters
    if address.len() < 32 || address.len() > 44 {
        return ValidationResult::error("Invalid wallet address length");
    }

    // Base58 character set (no 0, O, I, l)
    let valid_chars = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    if address.chars().any(|c| !valid_chars.contains(c)) {
        return ValidationResult::error("Invalid characters in wallet address");
    }

    ValidationResult::ok()
}

/// Validate a decimal amount is positive and within limits
pub fn validate_amount(amount: Decimal, min: Decimal, max: Decimal) -> ValidationResult {
    if amount <= Decimal::ZERO {
        return ValidationResult::error("Amount must be greater than 0");
    }

    if amount < min {
        return ValidationResult::error(format!("Amount must be at least {}", min.normalize()));
    }

    if amount > max {
        return ValidationResult::error(format!("Amount must not exceed {}", max.normalize()));
    }

    ValidationResult::ok()
}

/// Extract client IP from request headers
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            return Some(value.split(',').next()?.trim().to_string());
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            return Some(value.to_string());
        }
    }

    None
}

/// Error body for rejections raised by middleware and validators
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        let status = match self.code.as_deref() {
            Some("RATE_LIMITED") => StatusCode::TOO_MANY_REQUESTS,
            Some("VALIDATION_ERROR") => StatusCode::BAD_REQUEST,
            Some("UNAUTHORIZED") => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

// ============================================================================
// Correlation IDs
// ============================================================================

/// Correlation id of the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CorrelationId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CorrelationId>()
            .cloned()
            .unwrap_or_else(|| CorrelationId(generate_correlation_id())))
    }
}

/// Caller-supplied id if sane, otherwise a fresh one
fn incoming_correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 64 && v.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
        .map(str::to_string)
        .unwrap_or_else(generate_correlation_id)
}

// ============================================================================
// Middleware
// ============================================================================

/// Log request and response under a correlation id, echoed in `x-correlation-id`
pub async fn request_logging_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = incoming_correlation_id(request.headers());
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let client_ip = extract_client_ip(request.headers());

    log_api_request(&method, &path, client_ip.as_deref(), &correlation_id);
    request
        .extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));

    let start = Instant::now();
    let mut response = next.run(request).await;
    log_api_response(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_millis() as u64,
        &correlation_id,
    );

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(rate_limiter): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, ValidationError> {
    let client_id = extract_client_ip(request.headers()).unwrap_or_else(|| "unknown".to_string());

    match rate_limiter.check(&client_id).await {
        Ok(()) => Ok(next.run(request).await),
        Err(RateLimitError::Exceeded { retry_after }) => {
            log_security_event(
                "rate_limited",
                false,
                serde_json::json!({ "client": client_id, "path": request.uri().path() }),
                request.extensions().get::<CorrelationId>().map(CorrelationId::as_str),
            );
            Err(ValidationError {
                error: "Rate limit exceeded".to_string(),
                code: Some("RATE_LIMITED".to_string()),
                details: vec![],
                retry_after: Some(retry_after),
            })
        }
    }
}

/// Reject webhook deliveries without the configured shared secret
pub async fn webhook_auth_middleware(
    State(state): State<SharedAppState>,
    request: Request,
    next: Next,
) -> Result<Response, ValidationError> {
    let Some(secret) = state.webhook_secret.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim());

    if provided == Some(secret) {
        return Ok(next.run(request).await);
    }

    log_security_event(
        "webhook_rejected",
        false,
        serde_json::json!({
            "client": extract_client_ip(request.headers()),
            "authorization_present": provided.is_some(),
        }),
        request.extensions().get::<CorrelationId>().map(CorrelationId::as_str),
    );
    Err(ValidationError {
        error: "Unauthorized".to_string(),
        code: Some("UNAUTHORIZED".to_string()),
        details: vec![],
        retry_after: None,
    })
}

/// Security headers middleware
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'"),
    );

    response
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_solana_address_validation() {
        assert!(validate_solana_address("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM").is_valid);

        assert!(!validate_solana_address("").is_valid);
        assert!(!validate_solana_address("short").is_valid);
        assert!(!validate_solana_address("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl").is_valid);
    }

    #[test]
    fn test_amount_validation() {
        let min = Decimal::from_str("0.001").unwrap();
        let max = Decimal::from(100);

        assert!(validate_amount(Decimal::from(1), min, max).is_valid);
        assert!(!validate_amount(Decimal::ZERO, min, max).is_valid);
        assert!(!validate_amount(Decimal::from_str("0.0001").unwrap(), min, max).is_valid);
        assert!(!validate_amount(Decimal::from(101), min, max).is_valid);

        let merged = validate_solana_address("").merge(validate_amount(Decimal::ZERO, min, max));
        assert_eq!(merged.errors.len(), 2);
        assert!(merged.into_result().is_err());
    }

    #[test]
    fn test_incoming_correlation_id() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(incoming_correlation_id(&headers), "abc-123");

        headers.insert(CORRELATION_HEADER, HeaderValue::from_static("bad id; drop"));
        assert_ne!(incoming_correlation_id(&headers), "bad id; drop");
        assert_eq!(incoming_correlation_id(&HeaderMap::new()).len(), 32);
    }

    #[tokio::test]
    async fn test_rate_limiter() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 3,
            window: Duration::from_secs(60),
            burst: 1,
        });

        assert!(limiter.check("client1").await.is_ok());
        assert!(limiter.check("client1").await.is_ok());
        assert!(limiter.check("client1").await.is_ok());

        // 4th uses burst
        assert!(limiter.check("client1").await.is_ok());

        assert!(matches!(
            limiter.check("client1").await,
            Err(RateLimitError::Exceeded { .. })
        ));

        assert!(limiter.check("client2").await.is_ok());
        assert_eq!(limiter.tracked_clients().await, 2);
    }

    #[tokio::test]
    async fn test_rate_limiter_window_resets() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_millis(20),
            burst: 0,
        });

        assert!(limiter.check("c").await.is_ok());
        assert!(limiter.check("c").await.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(limiter.check("c").await.is_ok());

        tokio::time::sleep(Duration::from_millis(50)).await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_clients().await, 0);
    }
}
