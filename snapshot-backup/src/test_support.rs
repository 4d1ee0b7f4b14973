//! In-process Elasticsearch stand-in used by the unit tests.
//!
//! Serves the handful of snapshot and index endpoints the crate calls and
//! records every request it receives.

use crate::config::EnvironmentConfig;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::Router;
use futures::stream::BoxStream;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{
    GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta, ObjectStore, PutMultipartOpts,
    PutOptions, PutPayload, PutResult,
};
use serde_json::json;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

pub const TEST_INDEX_PREFIX: &str = "myindex-";

/// Environment pointing at `url` with the fixture bucket and prefix.
pub fn test_config(url: &str) -> EnvironmentConfig {
    let yaml = format!(
        "test:\n  elasticsearch_url: {url}\n  bucket_name: es-backups\n  region: us-east-1\n  base_path: staging\n  backup_index: {TEST_INDEX_PREFIX}\n"
    );
    EnvironmentConfig::from_yaml(&yaml, "test").expect("valid test config")
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: String,
}

/// Scripted reply to a snapshot creation request.
#[derive(Debug, Clone, Copy)]
pub enum CreateReply {
    Created,
    /// 504, and the snapshot completes in the background.
    TimeoutThenCompleted,
    /// 504, and the snapshot is still running afterwards.
    TimeoutStillRunning,
    /// 504, and the cluster drops the snapshot.
    TimeoutAbandoned,
    Fail(u16),
}

#[derive(Default)]
struct ClusterState {
    requests: Vec<RecordedRequest>,
    indices: BTreeSet<String>,
    snapshots: BTreeSet<(String, String)>,
    running: BTreeSet<(String, String)>,
    creates: VecDeque<CreateReply>,
    repository_failure: Option<(u16, String)>,
    restore_failure: Option<u16>,
}

#[derive(Clone)]
pub struct MockCluster {
    addr: std::net::SocketAddr,
    state: Arc<Mutex<ClusterState>>,
}

impl MockCluster {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(ClusterState::default()));
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock cluster");
        let addr = listener.local_addr().expect("mock cluster address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock cluster");
        });
        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().expect("mock cluster lock")
    }

    pub fn add_index(&self, index: &str) {
        self.lock().indices.insert(index.to_string());
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.lock().indices.contains(index)
    }

    pub fn add_snapshot(&self, repository: &str, snapshot: &str) {
        self.lock()
            .snapshots
            .insert((repository.to_string(), snapshot.to_string()));
    }

    pub fn add_running_snapshot(&self, repository: &str, snapshot: &str) {
        self.lock()
            .running
            .insert((repository.to_string(), snapshot.to_string()));
    }

    pub fn has_snapshot(&self, repository: &str, snapshot: &str) -> bool {
        self.lock()
            .snapshots
            .contains(&(repository.to_string(), snapshot.to_string()))
    }

    pub fn script_creates(&self, replies: impl IntoIterator<Item = CreateReply>) {
        self.lock().creates.extend(replies);
    }

    pub fn fail_repository_creation(&self, status: u16, body: &str) {
        self.lock().repository_failure = Some((status, body.to_string()));
    }

    pub fn fail_restores(&self, status: u16) {
        self.lock().restore_failure = Some(status);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Number of requests matching `method` and `path`.
    pub fn count(&self, method: &str, path: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

async fn handle(
    State(state): State<Arc<Mutex<ClusterState>>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> (StatusCode, String) {
    let mut cluster = state.lock().expect("mock cluster lock");
    cluster.requests.push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let segments: Vec<&str> = uri.path().trim_start_matches('/').split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("PUT", ["_snapshot", _repository]) => match cluster.repository_failure.clone() {
            Some((status, body)) => (status_code(status), body),
            None => (StatusCode::OK, json!({ "acknowledged": true }).to_string()),
        },
        ("PUT", ["_snapshot", repository, snapshot]) => {
            let key = (repository.to_string(), snapshot.to_string());
            match cluster.creates.pop_front().unwrap_or(CreateReply::Created) {
                CreateReply::Created => {
                    cluster.running.remove(&key);
                    cluster.snapshots.insert(key);
                    (StatusCode::OK, json!({ "accepted": true }).to_string())
                }
                CreateReply::TimeoutThenCompleted => {
                    cluster.snapshots.insert(key);
                    (StatusCode::GATEWAY_TIMEOUT, String::new())
                }
                CreateReply::TimeoutStillRunning => {
                    cluster.running.insert(key);
                    (StatusCode::GATEWAY_TIMEOUT, String::new())
                }
                CreateReply::TimeoutAbandoned => (StatusCode::GATEWAY_TIMEOUT, String::new()),
                CreateReply::Fail(status) => (
                    status_code(status),
                    json!({ "error": "snapshot_creation_exception" }).to_string(),
                ),
            }
        }
        ("GET", ["_snapshot", repository, snapshot]) => {
            let key = (repository.to_string(), snapshot.to_string());
            let state = if cluster.snapshots.contains(&key) {
                "SUCCESS"
            } else if cluster.running.contains(&key) {
                "IN_PROGRESS"
            } else {
                return (
                    StatusCode::NOT_FOUND,
                    json!({ "error": "snapshot_missing_exception" }).to_string(),
                );
            };
            (
                StatusCode::OK,
                json!({ "snapshots": [{ "snapshot": snapshot, "state": state }] }).to_string(),
            )
        }
        ("DELETE", ["_snapshot", repository, snapshot]) => {
            let key = (repository.to_string(), snapshot.to_string());
            if cluster.snapshots.remove(&key) {
                (StatusCode::OK, json!({ "acknowledged": true }).to_string())
            } else {
                (
                    StatusCode::NOT_FOUND,
                    json!({ "error": "snapshot_missing_exception" }).to_string(),
                )
            }
        }
        ("POST", ["_snapshot", _repository, _snapshot, "_restore"]) => match cluster.restore_failure {
            Some(status) => (status_code(status), json!({ "error": "restore_exception" }).to_string()),
            None => (StatusCode::OK, json!({ "accepted": true }).to_string()),
        },
        ("GET", ["_cat", "indices", pattern]) => {
            let prefix = pattern.trim_end_matches('*');
            let rows: Vec<serde_json::Value> = cluster
                .indices
                .iter()
                .filter(|index| index.starts_with(prefix))
                .map(|index| json!({ "index": index }))
                .collect();
            (StatusCode::OK, serde_json::Value::Array(rows).to_string())
        }
        ("HEAD", [index]) => {
            if cluster.indices.contains(*index) {
                (StatusCode::OK, String::new())
            } else {
                (StatusCode::NOT_FOUND, String::new())
            }
        }
        ("DELETE", [index]) => {
            if cluster.indices.remove(*index) {
                (StatusCode::OK, json!({ "acknowledged": true }).to_string())
            } else {
                (
                    StatusCode::NOT_FOUND,
                    json!({ "error": "index_not_found_exception" }).to_string(),
                )
            }
        }
        _ => (StatusCode::BAD_REQUEST, "unsupported request".to_string()),
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Failure injected by [`FaultyStore`].
#[derive(Debug, Clone, Copy)]
pub enum StoreFault {
    NotFound,
    Unavailable,
}

impl StoreFault {
    fn error(self, location: &ObjectPath) -> object_store::Error {
        match self {
            StoreFault::NotFound => object_store::Error::NotFound {
                path: location.to_string(),
                source: "no such bucket".into(),
            },
            StoreFault::Unavailable => object_store::Error::Generic {
                store: "faulty",
                source: "service unavailable".into(),
            },
        }
    }
}

/// In-memory object store whose reads or writes fail on demand.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: InMemory,
    get_fault: Option<StoreFault>,
    put_fault: Option<StoreFault>,
}

impl FaultyStore {
    pub fn failing_get(mut self, fault: StoreFault) -> Self {
        self.get_fault = Some(fault);
        self
    }

    pub fn failing_put(mut self, fault: StoreFault) -> Self {
        self.put_fault = Some(fault);
        self
    }
}

impl std::fmt::Display for FaultyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FaultyStore")
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn put_opts(
        &self,
        location: &ObjectPath,
        payload: PutPayload,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        match self.put_fault {
            Some(fault) => Err(fault.error(location)),
            None => self.inner.put_opts(location, payload, opts).await,
        }
    }

    async fn put_multipart_opts(
        &self,
        location: &ObjectPath,
        opts: PutMultipartOpts,
    ) -> object_store::Result<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(
        &self,
        location: &ObjectPath,
        options: GetOptions,
    ) -> object_store::Result<GetResult> {
        match self.get_fault {
            Some(fault) => Err(fault.error(location)),
            None => self.inner.get_opts(location, options).await,
        }
    }

    async fn delete(&self, location: &ObjectPath) -> object_store::Result<()> {
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&ObjectPath>) -> BoxStream<'_, object_store::Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(&self, prefix: Option<&ObjectPath>) -> object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &ObjectPath, to: &ObjectPath) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &ObjectPath, to: &ObjectPath) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}
