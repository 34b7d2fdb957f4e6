//! # grpc-graphql-bridge
//!
//! A bridge layer that exposes gRPC services through a GraphQL API: typed
//! schema generation from protobuf descriptors plus generated resolvers
//! that translate each GraphQL field invocation into exactly one remote
//! call.
//!
//! ## Features
//!
//! - **Schema generation**: deterministic GraphQL schema text from
//!   protobuf descriptor sets, with output/input type pairs per message
//!   and shared enum declarations
//! - **Unary bridging**: query fields backed by request/response calls,
//!   with raw value and error passthrough
//! - **Subscription bridging**: server-streaming calls fanned out through
//!   per-invocation publish/subscribe topics
//! - **Dynamic transport**: no generated client code; calls go through a
//!   reflection-driven codec over a lazily connected channel
//!
//! ## Main Components
//!
//! - [`Bridge`] / [`BridgeBuilder`]: the main entry point.
//! - [`schema::assemble`]: low-level assembly of schema text and resolver
//!   map from a [`descriptor::DescriptorSet`].
//! - [`mapper`]: the pure type mapper.
//! - [`fanout::FanoutHub`]: lifecycle tracking for subscription topics.
//! - [`stub::ServiceStub`]: the transport seam; [`GrpcStub`] is the
//!   tonic-backed implementation.
//!
//! ## Example
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
//! // Hand the schema text and resolver map to your execution engine
//! let (sdl, resolvers) = bridge.into_schema().into_parts();
//! # let _ = (sdl, resolvers);
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod descriptor;
pub mod error;
pub mod fanout;
pub mod grpc_client;
pub mod mapper;
pub mod reflection;
pub mod resolver;
pub mod schema;
pub mod stub;

pub use bridge::{Bridge, BridgeBuilder};
pub use descriptor::{
    DescriptorSet, EnumDescriptor, FieldDescriptor, FieldKind, InvocationMode, MethodDescriptor,
    ServiceDescriptor, TypeDescriptor, TypeRole,
};
pub use error::{Error, Result};
pub use fanout::{FanoutConfig, FanoutHub, FanoutStream, FanoutTopic};
pub use grpc_client::{GrpcClient, GrpcStub};
pub use mapper::{INPUT_SUFFIX, TIMESTAMP_TYPE};
pub use resolver::{Resolver, ResolverMap, StreamingMethod, UnaryMethod};
pub use schema::{assemble, assemble_sdl, BridgeSchema};
pub use stub::{ResponseStream, ServiceStub, StubPool};
