use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

/// Per-IP fixed-window limiter. A scan burst from one classroom comes from
/// many addresses, so the window only has to stop a single misbehaving
/// client from hammering the submission endpoint.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, Window>>,
    max_requests: u32,
    window_duration: Duration,
}

#[derive(Debug)]
struct Window {
    started_at: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            max_requests: requests_per_minute,
            window_duration: Duration::from_secs(60),
        }
    }

    fn client_key(addr: &SocketAddr) -> String {
        addr.ip().to_string()
    }

    pub fn check(&self, client_key: &str) -> bool {
        let now = Instant::now();

        let mut window = self
            .windows
            .entry(client_key.to_string())
            .or_insert(Window {
                started_at: now,
                count: 0,
            });

        if now.duration_since(window.started_at) >= self.window_duration {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            return false;
        }

        window.count += 1;
        true
    }
}

pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let limiter = req
        .extensions()
        .get::<RateLimiter>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    if !limiter.check(&RateLimiter::client_key(&addr)) {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(req).await)
}
