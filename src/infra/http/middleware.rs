//! Edge middleware: admission control, response policy headers, and
//! request/response logging.
//!
//! The gate runs every step in a fixed order. Blocklist and bot checks
//! come first so abusive clients never consume a rate-limit slot, write
//! gating runs before the handler, and header policy plus analytics run
//! on the way out.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{self, HeaderValue, USER_AGENT};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::admission::{client_identifier, IpBlocklist, RateLimitDecision, RateLimiter, RateLimitPolicies};
use crate::analytics::AnalyticsRecorder;
use crate::cache::{AdaptiveStrategy, TrafficMonitor};

const TARGET: &str = "raffica::edge";

/// Shared state for the edge gate.
#[derive(Clone)]
pub struct EdgeState {
    pub limiter: Arc<RateLimiter>,
    pub policies: Arc<RateLimitPolicies>,
    pub blocklist: Arc<IpBlocklist>,
    pub strategy: Arc<AdaptiveStrategy>,
    pub monitor: Arc<TrafficMonitor>,
    pub analytics: Arc<AnalyticsRecorder>,
    pub settings: EdgeSettings,
}

/// Tunables for the response-policy half of the gate.
#[derive(Clone, Debug)]
pub struct EdgeSettings {
    /// When false, no public Cache-Control headers are emitted and CDN
    /// caching is effectively disabled.
    pub edge_cache_enabled: bool,
    /// Path prefixes whose POSTs stay open while the site is read-only.
    pub essential_paths: Vec<String>,
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self {
            edge_cache_enabled: true,
            essential_paths: vec![
                "/login".to_string(),
                "/api/auth".to_string(),
                "/admin/settings".to_string(),
            ],
        }
    }
}

/// Per-request context attached before any other middleware runs.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request_id: Uuid,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let context = RequestContext {
        request_id: Uuid::new_v4(),
    };
    request.extensions_mut().insert(context);
    next.run(request).await
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|context| context.request_id)
        .unwrap_or_default();

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_millis();
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            target: TARGET,
            %request_id, %method, path, status = status.as_u16(), elapsed_ms,
            "request failed"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            target: TARGET,
            %request_id, %method, path, status = status.as_u16(), elapsed_ms,
            "request rejected"
        );
    } else {
        tracing::debug!(
            target: TARGET,
            %request_id, %method, path, status = status.as_u16(), elapsed_ms,
            "request served"
        );
    }
    response
}

/// The admission and policy gate, in a fixed order: blocklist, bot
/// heuristic, rate limit, traffic accounting, write gating, handler,
/// cache headers, security headers, analytics.
pub async fn edge_gate(
    State(state): State<EdgeState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    // Blocked clients are turned away before anything else is spent on them.
    if state.blocklist.is_blocked(ip).await {
        metrics::counter!("raffica_admission_rejected_total", "reason" => "blocked").increment(1);
        return rejection(StatusCode::FORBIDDEN, "Access denied");
    }

    // Non-GET traffic from clients that look automated escalates toward a
    // block instead of being silently served.
    let mut bot_flagged = false;
    if method != Method::GET && looks_automated(user_agent.as_deref()) {
        bot_flagged = true;
        if state.blocklist.record_violation(ip).await {
            metrics::counter!("raffica_admission_rejected_total", "reason" => "bot_blocked")
                .increment(1);
            return rejection(StatusCode::FORBIDDEN, "Access denied");
        }
    }

    let policy = if bot_flagged {
        &state.policies.bot
    } else {
        state.policies.for_path(&path)
    };
    let identifier = client_identifier(ip, user_agent.as_deref());
    let decision = state.limiter.check(&identifier, policy).await;
    if !decision.success {
        // Window breaches count toward the violation tally that escalates
        // into a full block.
        state.blocklist.record_violation(ip).await;
        metrics::counter!("raffica_admission_rejected_total", "reason" => "rate_limited")
            .increment(1);
        return rate_limited(&decision);
    }

    // Only admitted requests count toward the traffic level.
    state.monitor.record_request().await;

    if method == Method::POST && !is_essential(&path, &state.settings.essential_paths) {
        let posture = state.strategy.decision().await;
        if posture.read_only {
            metrics::counter!("raffica_admission_rejected_total", "reason" => "read_only")
                .increment(1);
            let mut response =
                rejection(StatusCode::SERVICE_UNAVAILABLE, "Temporarily read-only");
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("60"));
            return response;
        }
    }

    let mut response = next.run(request).await;

    apply_cache_control(&mut response, &method, &path, state.settings.edge_cache_enabled);
    apply_security_headers(&mut response);

    if method == Method::GET
        && response.status().is_success()
        && !path.starts_with("/api")
        && !path.starts_with("/admin")
    {
        // Fire and forget: a full queue drops the view, never the response.
        state.analytics.record_view(&path);
    }

    response
}

fn rejection(status: StatusCode, message: &'static str) -> Response {
    (status, message).into_response()
}

fn rate_limited(decision: &RateLimitDecision) -> Response {
    let mut response = (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "X-RateLimit-Reset",
        HeaderValue::from(decision.reset.unix_timestamp()),
    );
    response
}

/// Best-effort client address: proxy headers first, then the socket peer.
fn client_ip(request: &Request<Body>) -> IpAddr {
    let headers = request.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());
    if let Some(ip) = forwarded {
        return ip;
    }
    let real = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<IpAddr>().ok());
    if let Some(ip) = real {
        return ip;
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// A missing, tiny, or self-identifying agent string on a mutating
/// request is treated as automation.
fn looks_automated(user_agent: Option<&str>) -> bool {
    let Some(agent) = user_agent else {
        return true;
    };
    if agent.len() < 10 {
        return true;
    }
    let lowered = agent.to_ascii_lowercase();
    ["bot", "crawler", "spider", "scrape", "curl/", "python-requests"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn is_essential(path: &str, essential: &[String]) -> bool {
    essential.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

fn apply_cache_control(response: &mut Response, method: &Method, path: &str, edge_enabled: bool) {
    if response.headers().contains_key(header::CACHE_CONTROL) {
        return;
    }
    let value = if *method != Method::GET || path.starts_with("/api") || path.starts_with("/admin")
    {
        HeaderValue::from_static("private, no-store")
    } else if edge_enabled && response.status().is_success() {
        HeaderValue::from_static("public, s-maxage=300, stale-while-revalidate=600")
    } else {
        HeaderValue::from_static("no-store")
    };
    response.headers_mut().insert(header::CACHE_CONTROL, value);
}

fn apply_security_headers(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn automated_agents_are_flagged() {
        assert!(looks_automated(None));
        assert!(looks_automated(Some("curl/8.4.0")));
        assert!(looks_automated(Some("python-requests/2.31")));
        assert!(looks_automated(Some("Googlebot/2.1 (+http://www.google.com/bot.html)")));
        assert!(looks_automated(Some("x")));
        assert!(!looks_automated(Some(
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36"
        )));
    }

    #[test]
    fn forwarded_header_wins_over_peer() {
        let request = Request::builder()
            .uri("/posts/hello")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), "203.0.113.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn real_ip_header_is_second_choice() {
        let request = Request::builder()
            .uri("/")
            .header("x-real-ip", "198.51.100.7")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), "198.51.100.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn missing_peer_falls_back_to_loopback() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(client_ip(&request), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn essential_prefixes_match() {
        let settings = EdgeSettings::default();
        assert!(is_essential("/login", &settings.essential_paths));
        assert!(is_essential("/api/auth/refresh", &settings.essential_paths));
        assert!(!is_essential("/api/comments", &settings.essential_paths));
    }
}
