// tests/common/mod.rs
pub use axum::Router;
pub use tokio::task::JoinHandle;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::error::{BrokerError, BrokerResult};
use crate::identity::crd::{format_status_time, AzureClusterIdentityRequestStatus, TokenReference};
use crate::identity::{AzureClusterIdentityRequest, ExchangeSettings, IdentityRequestStore};

pub const TEST_RSA_KEY: &str = include_str!("../fixtures/test_rsa_key.pem");
pub const TEST_RSA_PUB: &str = include_str!("../fixtures/test_rsa_pub.pem");
pub const TEST_CERT: &str = include_str!("../fixtures/test_cert.pem");

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// Millisecond timings so exchange scenarios finish quickly.
pub fn fast_exchange_settings() -> ExchangeSettings {
    ExchangeSettings {
        renew_before: Duration::from_secs(60 * 60),
        poll_interval: Duration::from_millis(20),
        wait_timeout: Duration::from_millis(400),
        api_version: None,
    }
}

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_owned(), name.to_owned())
}

/// In-memory stand-in for the API server: identity requests plus secrets.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    requests: Mutex<HashMap<Key, AzureClusterIdentityRequest>>,
    secrets: Mutex<HashMap<Key, HashMap<String, String>>>,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub status_clears: AtomicUsize,
}

impl InMemoryIdentityStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_secret(&self, namespace: &str, name: &str, data_key: &str, value: &str) {
        self.secrets
            .lock()
            .unwrap()
            .entry(key(namespace, name))
            .or_default()
            .insert(data_key.to_owned(), value.to_owned());
    }

    pub fn request(&self, namespace: &str, name: &str) -> Option<AzureClusterIdentityRequest> {
        self.requests.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn request_names(&self) -> Vec<String> {
        self.requests.lock().unwrap().keys().map(|(_, name)| name.clone()).collect()
    }

    /// Store an already-answered request, as left behind by a previous broker.
    pub fn insert_answered(&self, request: AzureClusterIdentityRequest, token: &str, expires_at: DateTime<Utc>) {
        let namespace = request.metadata.namespace.clone().unwrap_or_default();
        let name = request.metadata.name.clone().unwrap_or_default();
        self.requests.lock().unwrap().insert(key(&namespace, &name), request);
        self.answer(&namespace, &name, token, &format_status_time(expires_at));
    }

    /// Populate status and the referenced secret, as the issuer does.
    pub fn answer(&self, namespace: &str, name: &str, token: &str, expiration_time: &str) {
        let secret_name = format!("{}-token", name);
        self.insert_secret(namespace, &secret_name, "token", token);
        if let Some(request) = self.requests.lock().unwrap().get_mut(&key(namespace, name)) {
            request.status = Some(AzureClusterIdentityRequestStatus {
                token_reference: TokenReference { secret_name, data_name: "token".to_owned() },
                expiration_time: expiration_time.to_owned(),
            });
        }
    }

    /// Requests whose status is still empty.
    pub fn pending(&self) -> Vec<Key> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, request)| !request.status.as_ref().map(|s| s.is_populated()).unwrap_or(false))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[async_trait]
impl IdentityRequestStore for InMemoryIdentityStore {
    async fn get(&self, namespace: &str, name: &str) -> BrokerResult<Option<AzureClusterIdentityRequest>> {
        Ok(self.request(namespace, name))
    }

    async fn create(&self, request: &AzureClusterIdentityRequest) -> BrokerResult<()> {
        let namespace = request.metadata.namespace.clone().unwrap_or_default();
        let name = request.metadata.name.clone().unwrap_or_default();
        let mut requests = self.requests.lock().unwrap();
        if requests.contains_key(&key(&namespace, &name)) {
            return Err(BrokerError::transient(format!("{} already exists", name)));
        }
        requests.insert(key(&namespace, &name), request.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, request: &AzureClusterIdentityRequest) -> BrokerResult<()> {
        let namespace = request.metadata.namespace.clone().unwrap_or_default();
        let name = request.metadata.name.clone().unwrap_or_default();
        let mut requests = self.requests.lock().unwrap();
        let existing = requests
            .get_mut(&key(&namespace, &name))
            .ok_or_else(|| BrokerError::transient(format!("{} not found", name)))?;
        // spec only; status is a subresource
        existing.spec = request.spec.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_status(&self, namespace: &str, name: &str) -> BrokerResult<()> {
        if let Some(request) = self.requests.lock().unwrap().get_mut(&key(namespace, name)) {
            request.status = None;
        }
        self.status_clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn secret_value(&self, namespace: &str, name: &str, data_key: &str) -> BrokerResult<String> {
        self.secrets
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .and_then(|data| data.get(data_key).cloned())
            .ok_or_else(|| BrokerError::transient(format!("secret {}/{} key {} not found", namespace, name, data_key)))
    }
}

/// Simulated issuer: answers every pending request after `delay`.
pub fn spawn_issuer(
    store: Arc<InMemoryIdentityStore>,
    delay: Duration,
    token: &str,
    expiration_time: String,
) -> JoinHandle<()> {
    let token = token.to_owned();
    tokio::spawn(async move {
        loop {
            let pending = store.pending();
            if !pending.is_empty() {
                tokio::time::sleep(delay).await;
                for (namespace, name) in store.pending() {
                    store.answer(&namespace, &name, &token, &expiration_time);
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
}
