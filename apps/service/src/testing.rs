//! Test doubles shared by the unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Instant;
use uuid::Uuid;

use crate::database::{Database, TargetStore};
use crate::error::{ProbeError, StoreError};
use crate::monitoring::checker::Checker;
use crate::monitoring::transition::TransitionKind;
use crate::monitoring::types::{
    CheckInterval, Integration, MonitorStatus, MonitorTarget, ProbeOutcome, ProbeResult, Protocol, TargetId,
};
use crate::notifications::{Notifier, NotifyError, StatusChange};

/// In-memory [`Database`] with switchable failures
#[derive(Default)]
pub struct MemoryStore {
    targets: Mutex<HashMap<TargetId, MonitorTarget>>,
    results: Mutex<Vec<ProbeResult>>,
    integrations: Mutex<Vec<Integration>>,
    fail_saves: AtomicBool,
    fail_list: AtomicBool,
    fail_deletes: AtomicBool,
    delete_delay: Mutex<Duration>,
}

impl MemoryStore {
    pub fn with_targets(targets: impl IntoIterator<Item = MonitorTarget>) -> Self {
        let store = Self::default();
        store.targets.lock().unwrap().extend(targets.into_iter().map(|t| (t.id, t)));
        store
    }

    pub fn target(&self, id: TargetId) -> Option<MonitorTarget> {
        self.targets.lock().unwrap().get(&id).cloned()
    }

    pub fn set_status(&self, id: TargetId, status: MonitorStatus) {
        if let Some(target) = self.targets.lock().unwrap().get_mut(&id) {
            target.status = status;
        }
    }

    /// Stored results of one target, oldest first
    pub fn results_for(&self, id: TargetId) -> Vec<ProbeResult> {
        self.results.lock().unwrap().iter().filter(|r| r.target_id == id).cloned().collect()
    }

    pub fn insert_result(&self, result: ProbeResult) {
        self.results.lock().unwrap().push(result);
    }

    pub fn insert_integration(&self, integration: Integration) {
        self.integrations.lock().unwrap().push(integration);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make `delete_target` sleep before touching any rows
    pub fn delay_deletes(&self, delay: Duration) {
        *self.delete_delay.lock().unwrap() = delay;
    }
}

fn injected() -> StoreError {
    StoreError::Pool("injected failure".into())
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn list_targets(&self) -> Result<Vec<MonitorTarget>, StoreError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let mut targets: Vec<_> = self.targets.lock().unwrap().values().cloned().collect();
        targets.sort_by_key(|t| t.created_at);
        Ok(targets)
    }

    async fn save_result(&self, result: &ProbeResult) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }

    async fn update_status(&self, target_id: TargetId, status: MonitorStatus) -> Result<(), StoreError> {
        match self.targets.lock().unwrap().get_mut(&target_id) {
            Some(target) => {
                target.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }
}

#[async_trait]
impl Database for MemoryStore {
    async fn create_target(&self, target: &MonitorTarget) -> Result<(), StoreError> {
        let mut targets = self.targets.lock().unwrap();
        let clash = targets
            .values()
            .any(|t| t.user_id == target.user_id && t.protocol == target.protocol && t.url == target.url);
        if clash || targets.contains_key(&target.id) {
            return Err(StoreError::Conflict);
        }
        targets.insert(target.id, target.clone());
        Ok(())
    }

    async fn get_target(&self, id: TargetId) -> Result<Option<MonitorTarget>, StoreError> {
        Ok(self.target(id))
    }

    async fn list_targets_by_user(&self, user_id: &str) -> Result<Vec<MonitorTarget>, StoreError> {
        let mut targets: Vec<_> =
            self.targets.lock().unwrap().values().filter(|t| t.user_id == user_id).cloned().collect();
        targets.sort_by_key(|t| t.created_at);
        Ok(targets)
    }

    async fn find_target(
        &self,
        user_id: &str,
        protocol: Protocol,
        url: &str,
    ) -> Result<Option<MonitorTarget>, StoreError> {
        Ok(self
            .targets
            .lock()
            .unwrap()
            .values()
            .find(|t| t.user_id == user_id && t.protocol == protocol && t.url == url)
            .cloned())
    }

    async fn update_target_definition(&self, target: &MonitorTarget) -> Result<(), StoreError> {
        let mut targets = self.targets.lock().unwrap();
        let stored = targets.get_mut(&target.id).ok_or(StoreError::NotFound)?;
        stored.protocol = target.protocol;
        stored.url = target.url.clone();
        stored.interval = target.interval;
        stored.updated_at = target.updated_at;
        Ok(())
    }

    async fn delete_target(&self, id: TargetId) -> Result<bool, StoreError> {
        let delay = *self.delete_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.results.lock().unwrap().retain(|r| r.target_id != id);
        Ok(self.targets.lock().unwrap().remove(&id).is_some())
    }

    async fn recent_results(&self, target_id: TargetId, limit: usize) -> Result<Vec<ProbeResult>, StoreError> {
        let mut results = self.results_for(target_id);
        results.reverse();
        results.truncate(limit);
        Ok(results)
    }

    async fn delete_results_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut results = self.results.lock().unwrap();
        let before = results.len();
        results.retain(|r| r.timestamp >= cutoff);
        Ok((before - results.len()) as u64)
    }

    async fn add_integration(&self, integration: &Integration) -> Result<(), StoreError> {
        self.insert_integration(integration.clone());
        Ok(())
    }

    async fn list_integrations(&self, user_id: &str) -> Result<Vec<Integration>, StoreError> {
        Ok(self.integrations.lock().unwrap().iter().filter(|i| i.user_id == user_id).cloned().collect())
    }

    async fn get_integration(&self, user_id: &str, id: Uuid) -> Result<Option<Integration>, StoreError> {
        Ok(self.integrations.lock().unwrap().iter().find(|i| i.user_id == user_id && i.id == id).cloned())
    }

    async fn delete_integration(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError> {
        let mut integrations = self.integrations.lock().unwrap();
        let before = integrations.len();
        integrations.retain(|i| !(i.user_id == user_id && i.id == id));
        Ok(integrations.len() != before)
    }
}

/// One scripted checker response
#[derive(Debug, Clone)]
pub struct Step {
    pub delay: Duration,
    pub outcome: Result<u16, ProbeError>,
}

impl Step {
    pub fn status(code: u16) -> Self {
        Self::delayed(code, Duration::ZERO)
    }

    pub fn delayed(code: u16, delay: Duration) -> Self {
        Self { delay, outcome: Ok(code) }
    }

    pub fn failure(reason: &str) -> Self {
        Self { delay: Duration::ZERO, outcome: Err(ProbeError::Transport(reason.into())) }
    }
}

/// [`Checker`] replaying per-endpoint scripts and recording every call
pub struct ScriptedChecker {
    default: Step,
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<(String, Instant)>>,
    in_flight: Mutex<HashMap<String, usize>>,
    peak_per_endpoint: Mutex<HashMap<String, usize>>,
    in_flight_total: AtomicUsize,
    peak_total: AtomicUsize,
}

impl ScriptedChecker {
    /// `default` answers whenever an endpoint's script has run out
    pub fn new(default: Step) -> Self {
        Self {
            default,
            scripts: Mutex::default(),
            calls: Mutex::default(),
            in_flight: Mutex::default(),
            peak_per_endpoint: Mutex::default(),
            in_flight_total: AtomicUsize::new(0),
            peak_total: AtomicUsize::new(0),
        }
    }

    pub fn script(&self, endpoint: &str, steps: impl IntoIterator<Item = Step>) {
        self.scripts.lock().unwrap().entry(endpoint.to_string()).or_default().extend(steps);
    }

    /// When each call to `endpoint` started
    pub fn calls_for(&self, endpoint: &str) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().filter(|(e, _)| e == endpoint).map(|(_, at)| *at).collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn peak_for(&self, endpoint: &str) -> usize {
        self.peak_per_endpoint.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    pub fn peak_total(&self) -> usize {
        self.peak_total.load(Ordering::SeqCst)
    }

    pub fn in_flight_total(&self) -> usize {
        self.in_flight_total.load(Ordering::SeqCst)
    }

    fn enter(&self, endpoint: &str) -> InFlight<'_> {
        let mut in_flight = self.in_flight.lock().unwrap();
        let count = in_flight.entry(endpoint.to_string()).or_default();
        *count += 1;
        let mut peaks = self.peak_per_endpoint.lock().unwrap();
        let peak = peaks.entry(endpoint.to_string()).or_default();
        *peak = (*peak).max(*count);

        let total = self.in_flight_total.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_total.fetch_max(total, Ordering::SeqCst);
        InFlight { checker: self, endpoint: endpoint.to_string() }
    }
}

/// Decrements in-flight counters even when the probe future is dropped
struct InFlight<'a> {
    checker: &'a ScriptedChecker,
    endpoint: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(count) = self.checker.in_flight.lock().unwrap().get_mut(&self.endpoint) {
            *count -= 1;
        }
        self.checker.in_flight_total.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    async fn check(&self, endpoint: &str) -> Result<u16, ProbeError> {
        self.calls.lock().unwrap().push((endpoint.to_string(), Instant::now()));
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default.clone());

        let _guard = self.enter(endpoint);
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.outcome
    }
}

/// [`Notifier`] that keeps every change it is handed
#[derive(Default)]
pub struct RecordingNotifier {
    changes: Mutex<Vec<StatusChange>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self { fail: AtomicBool::new(true), ..Default::default() }
    }

    pub fn changes(&self) -> Vec<StatusChange> {
        self.changes.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<TransitionKind> {
        self.changes.lock().unwrap().iter().map(|c| c.transition).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, change: &StatusChange) -> Result<(), NotifyError> {
        self.changes.lock().unwrap().push(change.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Partial { failed: 1, attempted: 1 });
        }
        Ok(())
    }
}

pub fn sample_change(transition: TransitionKind) -> StatusChange {
    let target = MonitorTarget::new("user-1", Protocol::Https, "status.example.com", CheckInterval::minutes(1));
    let outcome = match transition {
        TransitionKind::Degraded => ProbeOutcome::down("503 Service Unavailable", Duration::from_millis(85)),
        _ => ProbeOutcome::up(200, Duration::from_millis(85)),
    };
    let result = ProbeResult::from_outcome(target.id, &outcome, Utc::now());
    StatusChange { user_id: target.user_id.clone(), target, transition, result }
}

/// Local HTTP server answering every request with a fixed status
pub struct HttpStub {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl HttpStub {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub async fn spawn_http_stub(status: u16, delay: Duration) -> HttpStub {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let counter = counter.clone();
            tokio::spawn(async move {
                read_request(&mut socket).await;
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                let response =
                    format!("HTTP/1.1 {status} Stub\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    HttpStub { addr, hits }
}

// Consume headers and body so closing the socket does not reset the connection
async fn read_request(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let Ok(n) = socket.read(&mut chunk).await else { return };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else { continue };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let body_len = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= header_end + 4 + body_len {
            return;
        }
    }
}
