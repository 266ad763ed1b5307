//! In-memory [`LogBackend`] for handler and router tests.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

use kubetap_k8s::{BackendError, LogBackend, LogStream};
use kubetap_types::{LogRequest, PodInfo};

/// What the next opened log stream reads from
pub enum Script {
    Bytes(Vec<u8>),
    Reader(LogStream),
}

/// Reader that records its own drop
struct Tracked {
    inner: LogStream,
    closes: Arc<AtomicUsize>,
}

impl AsyncRead for Tracked {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_read(cx, buf)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pods: HashMap<(String, String), PodInfo>,
    script: Mutex<Option<Script>>,
    opened: Mutex<Vec<LogRequest>>,
    get_calls: AtomicUsize,
    closes: Arc<AtomicUsize>,
    fail_get: AtomicBool,
    fail_open: AtomicBool,
}

impl FakeBackend {
    /// `default/web-0` with containers `app`, `sidecar` and init container `init`
    pub fn with_web_pod() -> Self {
        let pod = PodInfo::new("web-0".into(), "default".into())
            .with_container("app")
            .with_container("sidecar")
            .with_init_container("init");
        let mut backend = Self::default();
        backend
            .pods
            .insert(("default".into(), "web-0".into()), pod);
        backend
    }

    pub fn with_output(self, bytes: &[u8]) -> Self {
        self.set_script(Script::Bytes(bytes.to_vec()));
        self
    }

    pub fn with_reader(self, reader: impl AsyncRead + Send + 'static) -> Self {
        self.set_script(Script::Reader(Box::pin(reader)));
        self
    }

    pub fn failing_get_pod(self) -> Self {
        self.fail_get.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_open(self) -> Self {
        self.fail_open.store(true, Ordering::SeqCst);
        self
    }

    fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = Some(script);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Number of opened streams that have been dropped
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<LogRequest> {
        self.opened.lock().unwrap().clone()
    }

    fn check_cluster(cluster: Option<&str>) -> Result<(), BackendError> {
        match cluster {
            None | Some("dev") => Ok(()),
            Some(other) => Err(BackendError::ClusterNotFound(other.to_string())),
        }
    }
}

impl LogBackend for FakeBackend {
    async fn get_pod(
        &self,
        cluster: Option<&str>,
        namespace: &str,
        name: &str,
    ) -> Result<PodInfo, BackendError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Self::check_cluster(cluster)?;
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(BackendError::Upstream("connection refused".into()));
        }
        self.pods
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| BackendError::PodNotFound {
                namespace: namespace.to_string(),
                pod: name.to_string(),
            })
    }

    async fn open_log_stream(&self, request: &LogRequest) -> Result<LogStream, BackendError> {
        Self::check_cluster(request.cluster.as_deref())?;
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(BackendError::Upstream("stream refused".into()));
        }
        self.opened.lock().unwrap().push(request.clone());

        let inner: LogStream = match self.script.lock().unwrap().take() {
            Some(Script::Bytes(bytes)) => Box::pin(io::Cursor::new(bytes)),
            Some(Script::Reader(reader)) => reader,
            None => Box::pin(tokio::io::empty()),
        };
        Ok(Box::pin(Tracked {
            inner,
            closes: Arc::clone(&self.closes),
        }))
    }
}
