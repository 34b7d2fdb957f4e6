//! Tonic-backed stub: dynamic gRPC calls driven by protobuf reflection.
//!
//! [`GrpcStub`] implements [`ServiceStub`] for one service using a lazily
//! connected [`Channel`] and a dynamic codec, so no generated client code
//! is needed. Requests and responses cross the boundary as JSON values:
//! enum values as variant names, bytes base64-encoded, field names exactly
//! as declared in the proto file.

use crate::error::{Error, Result};
use crate::stub::{ResponseStream, ServiceStub};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::StreamExt;
use prost::bytes::Buf;
use prost::Message as _;
use prost_reflect::{DynamicMessage, Kind, MessageDescriptor, ReflectMessage};
use serde_json::Value;
use tonic::client::Grpc;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::codegen::http;
use tonic::transport::{Channel, Endpoint};

/// Lazily connected channel to one gRPC backend.
///
/// The connection is established on first use; construction never blocks.
#[derive(Clone)]
pub struct GrpcClient {
    channel: Channel,
}

impl GrpcClient {
    /// Create a client for the given endpoint, e.g. `http://localhost:50051`.
    pub fn connect_lazy(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = Endpoint::from_shared(endpoint.into())
            .map_err(|e| Error::Connection(format!("invalid endpoint: {e}")))?;
        Ok(Self {
            channel: endpoint.connect_lazy(),
        })
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }
}

/// [`ServiceStub`] implementation for one gRPC service.
pub struct GrpcStub {
    client: GrpcClient,
    service: prost_reflect::ServiceDescriptor,
}

impl GrpcStub {
    pub fn new(client: GrpcClient, service: prost_reflect::ServiceDescriptor) -> Self {
        Self { client, service }
    }

    fn method(&self, name: &str) -> Result<prost_reflect::MethodDescriptor> {
        self.service
            .methods()
            .find(|m| m.name() == name)
            .ok_or_else(|| {
                Error::Connection(format!(
                    "service `{}` has no method `{name}`",
                    self.service.full_name()
                ))
            })
    }

    fn path(&self, method: &prost_reflect::MethodDescriptor) -> Result<http::uri::PathAndQuery> {
        format!("/{}/{}", self.service.full_name(), method.name())
            .parse()
            .map_err(|e| Error::Internal(format!("invalid gRPC path: {e}")))
    }
}

#[async_trait]
impl ServiceStub for GrpcStub {
    async fn call_unary(&self, method: &str, request: Value) -> Result<Value> {
        let method = self.method(method)?;
        let request_msg = json_to_message(&method.input(), &request)?;

        let mut grpc = Grpc::new(self.client.channel());
        grpc.ready()
            .await
            .map_err(|e| Error::Connection(format!("backend not ready: {e}")))?;

        let codec = DynamicCodec::new(method.output());
        let response = grpc
            .unary(tonic::Request::new(request_msg), self.path(&method)?, codec)
            .await?;
        message_to_json(&response.into_inner())
    }

    async fn call_server_streaming(&self, method: &str, request: Value) -> Result<ResponseStream> {
        let method = self.method(method)?;
        let request_msg = json_to_message(&method.input(), &request)?;

        let mut grpc = Grpc::new(self.client.channel());
        grpc.ready()
            .await
            .map_err(|e| Error::Connection(format!("backend not ready: {e}")))?;

        let codec = DynamicCodec::new(method.output());
        let response = grpc
            .server_streaming(tonic::Request::new(request_msg), self.path(&method)?, codec)
            .await?;

        let stream = response
            .into_inner()
            .map(|item| {
                item.and_then(|msg| {
                    message_to_json(&msg).map_err(|e| tonic::Status::internal(e.to_string()))
                })
            })
            .boxed();
        Ok(stream)
    }
}

/// Codec for encoding/decoding dynamic protobuf messages.
#[derive(Clone)]
struct DynamicCodec {
    response: MessageDescriptor,
}

impl DynamicCodec {
    fn new(response: MessageDescriptor) -> Self {
        Self { response }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;
    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder {
            desc: self.response.clone(),
        }
    }
}

struct DynamicEncoder;

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = tonic::Status;

    fn encode(
        &mut self,
        item: Self::Item,
        dst: &mut EncodeBuf<'_>,
    ) -> std::result::Result<(), Self::Error> {
        item.encode(dst)
            .map_err(|e| tonic::Status::internal(format!("encode error: {e}")))
    }
}

struct DynamicDecoder {
    desc: MessageDescriptor,
}

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = tonic::Status;

    fn decode(
        &mut self,
        src: &mut DecodeBuf<'_>,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        let buf = src.chunk();
        if buf.is_empty() {
            return Ok(None);
        }
        let msg = DynamicMessage::decode(self.desc.clone(), buf)
            .map_err(|e| tonic::Status::internal(format!("decode error: {e}")))?;
        src.advance(buf.len());
        Ok(Some(msg))
    }
}

/// Build a request message from a JSON object.
///
/// Every supplied field must exist on the message; the copy contract is
/// established at schema assembly, so a mismatch here is an internal error.
/// Null and absent fields stay unset.
pub fn json_to_message(descriptor: &MessageDescriptor, value: &Value) -> Result<DynamicMessage> {
    let map = match value {
        Value::Object(map) => map,
        _ => {
            return Err(Error::Internal(format!(
                "expected an object for message `{}`",
                descriptor.full_name()
            )))
        }
    };

    let mut message = DynamicMessage::new(descriptor.clone());
    for (name, value) in map {
        if value.is_null() {
            continue;
        }
        let field = descriptor.get_field_by_name(name).ok_or_else(|| {
            Error::Internal(format!(
                "message `{}` has no field `{name}`",
                descriptor.full_name()
            ))
        })?;
        let converted = json_to_field(value, &field)?;
        message.set_field(&field, converted);
    }
    Ok(message)
}

fn json_to_field(
    json: &Value,
    field: &prost_reflect::FieldDescriptor,
) -> Result<prost_reflect::Value> {
    use prost_reflect::Value as PbValue;

    match (json, field.kind()) {
        (Value::Array(items), _) if field.is_list() => {
            let values: Result<Vec<_>> = items.iter().map(|v| json_to_field(v, field)).collect();
            Ok(PbValue::List(values?))
        }
        (Value::Bool(b), Kind::Bool) => Ok(PbValue::Bool(*b)),
        (Value::Number(n), Kind::Int32 | Kind::Sint32 | Kind::Sfixed32) => {
            Ok(PbValue::I32(n.as_i64().unwrap_or(0) as i32))
        }
        (Value::Number(n), Kind::Int64 | Kind::Sint64 | Kind::Sfixed64) => {
            Ok(PbValue::I64(n.as_i64().unwrap_or(0)))
        }
        (Value::Number(n), Kind::Uint32 | Kind::Fixed32) => {
            Ok(PbValue::U32(n.as_u64().unwrap_or(0) as u32))
        }
        (Value::Number(n), Kind::Uint64 | Kind::Fixed64) => {
            Ok(PbValue::U64(n.as_u64().unwrap_or(0)))
        }
        (Value::Number(n), Kind::Float) => Ok(PbValue::F32(n.as_f64().unwrap_or(0.0) as f32)),
        (Value::Number(n), Kind::Double) => Ok(PbValue::F64(n.as_f64().unwrap_or(0.0))),
        (Value::String(s), Kind::String) => Ok(PbValue::String(s.clone())),
        (Value::String(s), Kind::Bytes) => {
            let bytes = BASE64
                .decode(s)
                .map_err(|e| Error::Internal(format!("invalid base64 in `{}`: {e}", field.name())))?;
            Ok(PbValue::Bytes(prost::bytes::Bytes::from(bytes)))
        }
        (Value::String(s), Kind::Enum(enum_desc)) => enum_desc
            .get_value_by_name(s)
            .map(|v| PbValue::EnumNumber(v.number()))
            .ok_or_else(|| {
                Error::Internal(format!(
                    "unknown value `{s}` for enum `{}`",
                    enum_desc.full_name()
                ))
            }),
        (Value::Object(_), Kind::Message(msg_desc)) => {
            Ok(PbValue::Message(json_to_message(&msg_desc, json)?))
        }
        _ => Err(Error::Internal(format!(
            "cannot convert {json:?} to field `{}` of kind {:?}",
            field.name(),
            field.kind()
        ))),
    }
}

/// Convert a response message to a JSON object keyed by proto field names.
pub fn message_to_json(message: &DynamicMessage) -> Result<Value> {
    let mut object = serde_json::Map::new();
    for field in message.descriptor().fields() {
        let value = message.get_field(&field);
        object.insert(field.name().to_string(), field_to_json(&value, &field)?);
    }
    Ok(Value::Object(object))
}

fn field_to_json(
    value: &prost_reflect::Value,
    field: &prost_reflect::FieldDescriptor,
) -> Result<Value> {
    use prost_reflect::Value as PbValue;

    match value {
        PbValue::Bool(b) => Ok(Value::Bool(*b)),
        PbValue::I32(n) => Ok(serde_json::json!(*n)),
        PbValue::I64(n) => Ok(serde_json::json!(*n)),
        PbValue::U32(n) => Ok(serde_json::json!(*n)),
        PbValue::U64(n) => Ok(serde_json::json!(*n)),
        PbValue::F32(n) => Ok(serde_json::json!(*n)),
        PbValue::F64(n) => Ok(serde_json::json!(*n)),
        PbValue::String(s) => Ok(Value::String(s.clone())),
        PbValue::Bytes(b) => Ok(Value::String(BASE64.encode(b))),
        PbValue::EnumNumber(n) => match field.kind() {
            // GraphQL enum values are variant names, not numbers
            Kind::Enum(enum_desc) => Ok(enum_desc
                .get_value(*n)
                .map(|v| Value::String(v.name().to_string()))
                .unwrap_or_else(|| serde_json::json!(*n))),
            _ => Ok(serde_json::json!(*n)),
        },
        PbValue::Message(msg) => message_to_json(msg),
        PbValue::List(items) => {
            let values: Result<Vec<_>> = items.iter().map(|v| field_to_json(v, field)).collect();
            Ok(Value::Array(values?))
        }
        PbValue::Map(_) => Err(Error::Internal(format!(
            "map field `{}` is not supported",
            field.name()
        ))),
    }
}
