//! Call adapters: one resolver per service method.
//!
//! A [`UnaryMethod`] turns a query/mutation field invocation into exactly
//! one unary call; a [`StreamingMethod`] turns a subscription activation
//! into one server-streaming call bridged through a fresh
//! [`crate::fanout::FanoutTopic`]. Adapters hold no per-invocation state
//! and may be driven concurrently.

use crate::error::Result;
use crate::fanout::{FanoutHub, FanoutStream};
use crate::stub::ServiceStub;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Resolver map keyed by `serviceField.methodField`
/// (e.g. `pizzeria.makeSimplePizza`).
pub type ResolverMap = BTreeMap<String, Resolver>;

/// One generated resolver.
#[derive(Debug)]
pub enum Resolver {
    Unary(UnaryMethod),
    Stream(StreamingMethod),
}

impl Resolver {
    pub fn as_unary(&self) -> Option<&UnaryMethod> {
        match self {
            Resolver::Unary(method) => Some(method),
            Resolver::Stream(_) => None,
        }
    }

    pub fn as_stream(&self) -> Option<&StreamingMethod> {
        match self {
            Resolver::Stream(method) => Some(method),
            Resolver::Unary(_) => None,
        }
    }
}

/// Explicit field-by-field copy between the argument shape and the request
/// shape. Only fields of the request message are copied; fields the caller
/// did not supply stay unset.
fn build_request(request_fields: &[String], args: &Map<String, Value>) -> Value {
    let mut request = Map::new();
    for name in request_fields {
        if let Some(value) = args.get(name) {
            if !value.is_null() {
                request.insert(name.clone(), value.clone());
            }
        }
    }
    Value::Object(request)
}

/// Resolver for a unary method: query field in, one remote call out.
pub struct UnaryMethod {
    stub: Arc<dyn ServiceStub>,
    method: String,
    request_fields: Vec<String>,
}

impl UnaryMethod {
    pub fn new(stub: Arc<dyn ServiceStub>, method: impl Into<String>, request_fields: Vec<String>) -> Self {
        Self {
            stub,
            method: method.into(),
            request_fields,
        }
    }

    pub fn method_name(&self) -> &str {
        &self.method
    }

    /// Resolve the field: build the request from the arguments, invoke the
    /// stub, and pass the raw response or the unwrapped error straight
    /// through. No validation, no retry, no transformation.
    pub async fn resolve(&self, args: &Map<String, Value>) -> Result<Value> {
        let request = build_request(&self.request_fields, args);
        self.stub.call_unary(&self.method, request).await
    }
}

impl fmt::Debug for UnaryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryMethod")
            .field("method", &self.method)
            .field("request_fields", &self.request_fields)
            .finish_non_exhaustive()
    }
}

/// Resolver for a server-streaming method: subscription activation in, a
/// lazily driven consumer stream out.
pub struct StreamingMethod {
    stub: Arc<dyn ServiceStub>,
    method: String,
    request_fields: Vec<String>,
    hub: FanoutHub,
}

impl StreamingMethod {
    pub fn new(
        stub: Arc<dyn ServiceStub>,
        method: impl Into<String>,
        request_fields: Vec<String>,
        hub: FanoutHub,
    ) -> Self {
        Self {
            stub,
            method: method.into(),
            request_fields,
            hub,
        }
    }

    pub fn method_name(&self) -> &str {
        &self.method
    }

    /// Activate the subscription.
    ///
    /// Each activation opens its own upstream call and its own fan-out
    /// topic; if the upstream call cannot be established the activation
    /// fails immediately rather than yielding an empty stream.
    pub async fn subscribe(&self, args: &Map<String, Value>) -> Result<FanoutStream> {
        let request = build_request(&self.request_fields, args);
        let upstream = self.stub.call_server_streaming(&self.method, request).await?;

        let topic = self.hub.open();
        debug!(topic = %topic.id(), method = %self.method, "subscription activated");
        let consumer = topic.subscribe();
        tokio::spawn(topic.forward(upstream));
        Ok(consumer)
    }
}

impl fmt::Debug for StreamingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingMethod")
            .field("method", &self.method)
            .field("request_fields", &self.request_fields)
            .finish_non_exhaustive()
    }
}
