use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by client IP.
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    counters: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(max_per_minute: u32) -> Arc<Self> {
        Arc::new(Self::new(max_per_minute, Duration::from_secs(60)))
    }

    /// Count one request from `client`. Returns the seconds until the window
    /// resets when the limit is exceeded.
    pub fn check(&self, client: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());

        let window = counters.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }

        window.count += 1;
        if window.count > self.max_per_window {
            let elapsed = now.duration_since(window.started);
            let remaining = self.window.saturating_sub(elapsed);
            return Err(remaining.as_secs().max(1));
        }

        Ok(())
    }
}

/// Per-IP rate limiting; exceeded requests get 429 with Retry-After.
pub async fn enforce_rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(retry_after_secs) = limiter.check(addr.ip()) {
        tracing::warn!(client = %addr.ip(), "rate limit exceeded");
        return Err(ApiError::TooManyRequests { retry_after_secs });
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.check(ip(1)).is_ok());
        }
        let retry = limiter.check(ip(1)).unwrap_err();
        assert!(retry >= 1);
    }

    #[test]
    fn clients_are_counted_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(2)).is_ok());
        assert!(limiter.check(ip(1)).is_err());
    }

    #[test]
    fn window_expiry_resets_the_count() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(1)).is_err());
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check(ip(1)).is_ok());
    }

    #[tokio::test]
    async fn middleware_returns_429_with_retry_after() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                limiter,
                enforce_rate_limit,
            ));

        let addr = SocketAddr::from(([127, 0, 0, 1], 40000));

        let mut first = HttpRequest::builder().uri("/").body(Body::empty()).unwrap();
        first.extensions_mut().insert(ConnectInfo(addr));
        let response = app.clone().oneshot(first).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut second = HttpRequest::builder().uri("/").body(Body::empty()).unwrap();
        second.extensions_mut().insert(ConnectInfo(addr));
        let response = app.oneshot(second).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
    }
}
