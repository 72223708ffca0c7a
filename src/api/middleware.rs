//! HTTP Middleware
//!
//! Security headers and sanitized request logging for the engine API.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{error, info, warn};

/// Request logging configuration, carried as middleware state.
#[derive(Debug, Clone)]
pub struct RequestLogConfig {
    pub log_requests: bool,
}

/// Add standard security headers to all responses
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Cache-Control",
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.remove("Server");

    response
}

/// Request logging middleware with client IP sanitization
pub async fn logging_middleware(
    State(config): State<RequestLogConfig>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if !config.log_requests {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = sanitize_for_log(&get_client_ip(&headers, &addr));

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            client_ip = %client_ip,
            "Request failed"
        );
    } else if status.is_client_error() {
        warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            client_ip = %client_ip,
            "Client error"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            client_ip = %client_ip,
            "Request completed"
        );
    }

    response
}

/// Prefer the proxy-supplied client address, fall back to the socket.
fn get_client_ip(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string())
}

/// Mask the host portion of an address so logs carry network origin
/// without a full client identifier.
fn sanitize_for_log(ip: &str) -> String {
    match ip.rsplit_once('.') {
        Some((prefix, _)) => format!("{}.xxx", prefix),
        None => match ip.rsplit_once(':') {
            Some((prefix, _)) => format!("{}:xxxx", prefix),
            None => "unknown".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.1.2.3, 172.16.0.1"));
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(get_client_ip(&headers, &addr), "10.1.2.3");
    }

    #[test]
    fn test_socket_addr_fallback() {
        let addr: SocketAddr = "192.168.1.7:9000".parse().unwrap();
        assert_eq!(get_client_ip(&HeaderMap::new(), &addr), "192.168.1.7");
    }

    #[test]
    fn test_sanitize_masks_host_octet() {
        assert_eq!(sanitize_for_log("192.168.1.7"), "192.168.1.xxx");
        assert_eq!(sanitize_for_log("fe80::1"), "fe80::xxxx");
    }
}
