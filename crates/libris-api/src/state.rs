//! Application state management

use crate::auth::middleware::AuthGate;
use crate::auth::password::PasswordConfig;
use crate::auth::service::AuthService;
use libris_core::{AppConfig, MemoryStore, RefreshTokenStore, UserDirectory};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Latency histogram buckets
#[derive(Debug, Clone, Default)]
pub struct LatencyBuckets {
    pub under_10ms: u64,
    pub ms_10_50: u64,
    pub ms_50_100: u64,
    pub ms_100_500: u64,
    pub ms_500_1000: u64,
    pub over_1s: u64,
}

impl LatencyBuckets {
    fn observe(&mut self, latency_us: u64) {
        let bucket = match latency_us {
            0..=9_999 => &mut self.under_10ms,
            10_000..=49_999 => &mut self.ms_10_50,
            50_000..=99_999 => &mut self.ms_50_100,
            100_000..=499_999 => &mut self.ms_100_500,
            500_000..=999_999 => &mut self.ms_500_1000,
            _ => &mut self.over_1s,
        };
        *bucket += 1;
    }
}

/// Per-endpoint request statistics
#[derive(Debug, Clone, Default)]
pub struct EndpointMetrics {
    pub status_counts: HashMap<u16, u64>,
    pub total_latency_us: u64,
    pub latency_count: u64,
    pub latency_buckets: LatencyBuckets,
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Register, login, refresh and logout
    pub auth: AuthService,
    /// Request gate for protected routes
    pub gate: AuthGate,
    /// Probed by the readiness check
    pub users: Arc<dyn UserDirectory>,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Metrics keyed by normalized endpoint
    pub metrics: RwLock<HashMap<String, EndpointMetrics>>,
}

impl AppState {
    /// Wire the auth core over the given persistence collaborators
    pub fn new(
        config: AppConfig,
        users: Arc<dyn UserDirectory>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        let auth = AuthService::new(&config.auth, users.clone(), refresh_tokens);
        Self::with_auth_service(config, auth, users)
    }

    /// In-memory state with cheap password hashing
    pub fn for_testing(config: AppConfig) -> Self {
        let store = MemoryStore::new();
        let users: Arc<dyn UserDirectory> = store.users;
        let refresh_tokens: Arc<dyn RefreshTokenStore> = store.refresh_tokens;
        let auth = AuthService::new(&config.auth, users.clone(), refresh_tokens)
            .with_password_config(PasswordConfig::light());
        Self::with_auth_service(config, auth, users)
    }

    fn with_auth_service(
        config: AppConfig,
        auth: AuthService,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let gate = AuthGate::from_config(&config.auth, users.clone());
        Self {
            config,
            auth,
            gate,
            users,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Record one finished request against its endpoint
    pub async fn record_request(&self, endpoint: String, status: u16, latency_us: u64) {
        self.increment_requests();

        let mut metrics = self.metrics.write().await;
        let entry = metrics.entry(endpoint).or_default();
        *entry.status_counts.entry(status).or_insert(0) += 1;
        entry.total_latency_us = entry.total_latency_us.saturating_add(latency_us);
        entry.latency_count += 1;
        entry.latency_buckets.observe(latency_us);
    }
}
