//! Remote stub seam.
//!
//! A [`ServiceStub`] is the client-side surface of one gRPC service: one
//! callable per remote method, addressed by method name, exchanging JSON
//! values. The bridge never talks to a transport directly; everything goes
//! through this trait. [`crate::grpc_client::GrpcStub`] is the tonic-backed
//! implementation; tests substitute mocks.

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Stream of response values from a server-streaming call.
///
/// Items are `data` events; the stream ending cleanly is the `end` event
/// and an `Err` item is the terminal `status` event. Dropping the stream
/// cancels the underlying call.
pub type ResponseStream = BoxStream<'static, std::result::Result<Value, tonic::Status>>;

/// Client-side surface of one gRPC service.
#[async_trait]
pub trait ServiceStub: Send + Sync {
    /// Invoke a unary method: one request, one response.
    ///
    /// The response is the raw remote value; errors are passed through
    /// unwrapped.
    async fn call_unary(&self, method: &str, request: Value) -> Result<Value>;

    /// Open a server-streaming call.
    ///
    /// Failure to establish the call is an error here, never an empty
    /// stream; callers must be able to distinguish "no results" from
    /// "call could not be made".
    async fn call_server_streaming(&self, method: &str, request: Value) -> Result<ResponseStream>;
}

/// Registry of stubs keyed by fully qualified service name.
///
/// One stub per service, registered once at startup, read-only afterwards.
#[derive(Clone, Default)]
pub struct StubPool {
    stubs: Arc<RwLock<HashMap<String, Arc<dyn ServiceStub>>>>,
}

impl StubPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stub for a service (e.g. `try.Pizzeria`).
    pub fn add(&self, service: impl Into<String>, stub: Arc<dyn ServiceStub>) {
        self.stubs.write().insert(service.into(), stub);
    }

    pub fn get(&self, service: &str) -> Option<Arc<dyn ServiceStub>> {
        self.stubs.read().get(service).cloned()
    }

    pub fn len(&self) -> usize {
        self.stubs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.read().is_empty()
    }

    /// Registered service names, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stubs.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for StubPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubPool")
            .field("services", &self.service_names())
            .finish()
    }
}
