//! Bridge facade: builder and main orchestration.
//!
//! The [`Bridge`] ties descriptor sets and stubs together into one
//! assembled schema. It is created via the [`BridgeBuilder`] and then
//! handed to an execution engine: the engine takes the schema text and
//! drives the resolver map; HTTP/WebSocket transport and GraphQL parsing
//! are the engine's business, not ours.
//!
//! # Example
//!
//! ```rust,no_run
//! use grpc_graphql_bridge::Bridge;
//!
//! # fn example(descriptors: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let bridge = Bridge::builder()
//!     .with_descriptor_set_bytes(descriptors)?
//!     .add_service_endpoint("try.Pizzeria", "http://localhost:50051")
//!     .build()?;
//!
//! println!("{}", bridge.sdl());
//! # Ok(())
//! # }
//! ```

use crate::descriptor::DescriptorSet;
use crate::error::{Error, Result};
use crate::fanout::{FanoutConfig, FanoutHub};
use crate::grpc_client::{GrpcClient, GrpcStub};
use crate::reflection;
use crate::resolver::ResolverMap;
use crate::schema::{assemble, BridgeSchema};
use crate::stub::{ServiceStub, StubPool};
use prost_reflect::DescriptorPool;
use std::path::Path;
use std::sync::Arc;

/// An assembled bridge: schema text plus resolver map, ready to register
/// with an execution engine.
#[derive(Debug)]
pub struct Bridge {
    schema: BridgeSchema,
    stubs: StubPool,
    hub: FanoutHub,
}

impl Bridge {
    /// Create a new bridge builder
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// The assembled GraphQL schema text
    pub fn sdl(&self) -> &str {
        self.schema.sdl()
    }

    /// The resolver map keyed by `serviceField.methodField`
    pub fn resolvers(&self) -> &ResolverMap {
        self.schema.resolvers()
    }

    pub fn schema(&self) -> &BridgeSchema {
        &self.schema
    }

    /// The stub pool backing the resolvers
    pub fn stubs(&self) -> &StubPool {
        &self.stubs
    }

    /// The fan-out hub tracking live subscription topics
    pub fn fanout_hub(&self) -> &FanoutHub {
        &self.hub
    }

    pub fn into_schema(self) -> BridgeSchema {
        self.schema
    }
}

/// Builder for creating a [`Bridge`].
#[derive(Debug)]
pub struct BridgeBuilder {
    pools: Vec<DescriptorPool>,
    defs: DescriptorSet,
    stubs: StubPool,
    endpoints: Vec<(String, String)>,
    fanout: FanoutConfig,
}

impl BridgeBuilder {
    pub fn new() -> Self {
        Self {
            pools: Vec::new(),
            defs: DescriptorSet::new(),
            stubs: StubPool::new(),
            endpoints: Vec::new(),
            fanout: FanoutConfig::default(),
        }
    }

    /// Add a compiled protobuf descriptor set (bytes).
    ///
    /// May be called repeatedly to combine descriptor sets from several
    /// backends into one schema; name collisions fail at [`Self::build`].
    pub fn with_descriptor_set_bytes(mut self, bytes: impl AsRef<[u8]>) -> Result<Self> {
        self.pools.push(reflection::decode_pool(bytes.as_ref())?);
        Ok(self)
    }

    /// Add a compiled protobuf descriptor set from a file.
    pub fn with_descriptor_set_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.pools.push(reflection::pool_from_file(path)?);
        Ok(self)
    }

    /// Add an already-decoded descriptor set, as produced by `prost-build`
    /// or `tonic-build`.
    pub fn with_file_descriptor_set(
        mut self,
        set: prost_types::FileDescriptorSet,
    ) -> Result<Self> {
        let pool = DescriptorPool::from_file_descriptor_set(set)
            .map_err(|e| Error::Descriptor(e.to_string()))?;
        self.pools.push(pool);
        Ok(self)
    }

    /// Add definitions directly at the model level. Mostly useful for
    /// tests and hand-built schemas.
    pub fn with_descriptors(mut self, defs: DescriptorSet) -> Self {
        self.defs.services.extend(defs.services);
        self.defs.messages.extend(defs.messages);
        self.defs.enums.extend(defs.enums);
        self
    }

    /// Register a custom stub for a service (e.g. a mock, or a hand-rolled
    /// transport).
    pub fn add_stub(self, service: impl Into<String>, stub: Arc<dyn ServiceStub>) -> Self {
        self.stubs.add(service, stub);
        self
    }

    /// Connect a service to a gRPC backend address. The tonic-backed stub
    /// is built at [`Self::build`] from the loaded descriptor sets; the
    /// connection itself is established lazily on first call.
    pub fn add_service_endpoint(
        mut self,
        service: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        self.endpoints.push((service.into(), endpoint.into()));
        self
    }

    /// Tune fan-out topic buffering.
    pub fn with_fanout_config(mut self, config: FanoutConfig) -> Self {
        self.fanout = config;
        self
    }

    /// Assemble the bridge. Fails fast on schema errors, dangling
    /// references, and services without a stub.
    pub fn build(self) -> Result<Bridge> {
        let mut defs = self.defs;
        for pool in &self.pools {
            let loaded = reflection::descriptors_from_pool(pool)?;
            defs.services.extend(loaded.services);
            defs.messages.extend(loaded.messages);
            defs.enums.extend(loaded.enums);
        }

        for (service, endpoint) in &self.endpoints {
            let descriptor = self
                .pools
                .iter()
                .find_map(|pool| pool.get_service_by_name(service))
                .ok_or_else(|| {
                    Error::Descriptor(format!(
                        "service `{service}` not found in the loaded descriptor sets"
                    ))
                })?;
            let client = GrpcClient::connect_lazy(endpoint.clone())?;
            self.stubs
                .add(service.clone(), Arc::new(GrpcStub::new(client, descriptor)));
        }

        let hub = FanoutHub::with_config(self.fanout);
        let schema = assemble(&defs, &self.stubs, &hub)?;
        Ok(Bridge {
            schema,
            stubs: self.stubs,
            hub,
        })
    }
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        FieldDescriptor, FieldKind, InvocationMode, MethodDescriptor, ServiceDescriptor,
        TypeDescriptor,
    };
    use crate::stub::ResponseStream;
    use async_trait::async_trait;
    use serde_json::Value;

    struct NullStub;

    #[async_trait]
    impl ServiceStub for NullStub {
        async fn call_unary(&self, _method: &str, _request: Value) -> Result<Value> {
            Err(Error::Internal("unreachable".into()))
        }

        async fn call_server_streaming(
            &self,
            _method: &str,
            _request: Value,
        ) -> Result<ResponseStream> {
            Err(Error::Internal("unreachable".into()))
        }
    }

    fn greeter_defs() -> DescriptorSet {
        DescriptorSet {
            services: vec![ServiceDescriptor {
                name: "Greeter".into(),
                full_name: "hello.Greeter".into(),
                methods: vec![MethodDescriptor {
                    name: "SayHello".into(),
                    input_type: "HelloRequest".into(),
                    output_type: "HelloReply".into(),
                    mode: InvocationMode::Unary,
                }],
            }],
            messages: vec![
                TypeDescriptor::new(
                    "HelloRequest",
                    vec![FieldDescriptor::new("name", FieldKind::String, true)],
                ),
                TypeDescriptor::new(
                    "HelloReply",
                    vec![FieldDescriptor::new("message", FieldKind::String, true)],
                ),
            ],
            enums: Vec::new(),
        }
    }

    #[test]
    fn test_build_with_model_descriptors() {
        let bridge = Bridge::builder()
            .with_descriptors(greeter_defs())
            .add_stub("hello.Greeter", Arc::new(NullStub))
            .build()
            .unwrap();

        assert!(bridge.sdl().contains("type GreeterService {"));
        assert!(bridge.resolvers().contains_key("greeter.sayHello"));
        assert!(bridge.fanout_hub().is_empty());
        assert_eq!(bridge.stubs().len(), 1);
    }

    #[test]
    fn test_build_without_stub_fails() {
        let err = Bridge::builder()
            .with_descriptors(greeter_defs())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn test_unknown_endpoint_service_fails() {
        let err = Bridge::builder()
            .with_descriptors(greeter_defs())
            .add_service_endpoint("hello.Greeter", "http://localhost:50051")
            .build()
            .unwrap_err();
        // The endpoint wiring needs a loaded descriptor set, which we
        // never provided
        assert!(matches!(err, Error::Descriptor(_)));
    }

    #[test]
    fn test_bad_descriptor_bytes_fail_early() {
        let err = Bridge::builder()
            .with_descriptor_set_bytes([0xde, 0xad])
            .unwrap_err();
        assert!(matches!(err, Error::Descriptor(_)));
    }

    #[tokio::test]
    async fn test_build_from_file_descriptor_set() {
        use prost_types::field_descriptor_proto::{Label, Type};
        use prost_types::{
            DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
            MethodDescriptorProto, ServiceDescriptorProto,
        };

        let set = FileDescriptorSet {
            file: vec![FileDescriptorProto {
                name: Some("hello.proto".into()),
                package: Some("hello".into()),
                syntax: Some("proto3".into()),
                message_type: vec![
                    DescriptorProto {
                        name: Some("HelloRequest".into()),
                        field: vec![FieldDescriptorProto {
                            name: Some("name".into()),
                            number: Some(1),
                            r#type: Some(Type::String as i32),
                            label: Some(Label::Optional as i32),
                            ..Default::default()
                        }],
                        ..Default::default()
                    },
                    DescriptorProto {
                        name: Some("HelloReply".into()),
                        field: vec![FieldDescriptorProto {
                            name: Some("message".into()),
                            number: Some(1),
                            r#type: Some(Type::String as i32),
                            label: Some(Label::Optional as i32),
                            ..Default::default()
                        }],
                        ..Default::default()
                    },
                ],
                service: vec![ServiceDescriptorProto {
                    name: Some("Greeter".into()),
                    method: vec![MethodDescriptorProto {
                        name: Some("SayHello".into()),
                        input_type: Some(".hello.HelloRequest".into()),
                        output_type: Some(".hello.HelloReply".into()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };

        let bridge = Bridge::builder()
            .with_file_descriptor_set(set)
            .unwrap()
            .add_service_endpoint("hello.Greeter", "http://localhost:50051")
            .build()
            .unwrap();

        assert!(bridge
            .sdl()
            .contains("sayHello(name: String): HelloHelloReply!"));
        assert!(bridge.resolvers().contains_key("greeter.sayHello"));
    }
}
