//! Bridge descriptor model.
//!
//! These types describe a gRPC surface in the terms the bridge needs:
//! message shapes, enums, and service methods with their invocation mode.
//! They are constructed once (from a compiled descriptor set via
//! [`crate::reflection`], or directly in code) and are immutable afterwards.

use heck::{ToLowerCamelCase, ToUpperCamelCase};

/// The kind of a single message field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Boolean scalar
    Bool,
    /// Any protobuf integer width
    Int,
    /// `float` / `double`
    Float,
    /// `string` / `bytes` (bytes cross the boundary base64-encoded)
    String,
    /// Reference to an enum declaration, by GraphQL name
    Enum(String),
    /// Reference to another message, by GraphQL output-type name
    Message(String),
    /// The well-known `google.protobuf.Timestamp` message
    Timestamp,
    /// Repeated field; the element kind must not itself be repeated
    Repeated(Box<FieldKind>),
}

impl FieldKind {
    /// Message name referenced by this kind, looking through one level of
    /// list wrapping. `None` for scalars, enums and timestamps.
    pub fn message_name(&self) -> Option<&str> {
        match self {
            FieldKind::Message(name) => Some(name),
            FieldKind::Repeated(inner) => match inner.as_ref() {
                FieldKind::Message(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// Enum name referenced by this kind, looking through one level of
    /// list wrapping.
    pub fn enum_name(&self) -> Option<&str> {
        match self {
            FieldKind::Enum(name) => Some(name),
            FieldKind::Repeated(inner) => match inner.as_ref() {
                FieldKind::Enum(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether this kind references the well-known timestamp, looking
    /// through one level of list wrapping.
    pub fn references_timestamp(&self) -> bool {
        match self {
            FieldKind::Timestamp => true,
            FieldKind::Repeated(inner) => matches!(inner.as_ref(), FieldKind::Timestamp),
            _ => false,
        }
    }
}

/// One field of a message type.
///
/// The `required` flag only applies when the owning type is rendered in
/// output position; input position treats every field as optional.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind, required: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            required,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Whether a message type is being rendered as a return shape or an
/// argument shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRole {
    Output,
    Input,
}

/// One message type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    /// GraphQL output-type name, unique within the schema
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub description: Option<String>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One enum declaration, shared between output and input contexts.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDescriptor {
    pub name: String,
    /// Variant names, in declaration order
    pub variants: Vec<String>,
    pub description: Option<String>,
}

impl EnumDescriptor {
    pub fn new(name: impl Into<String>, variants: Vec<String>) -> Self {
        Self {
            name: name.into(),
            variants,
            description: None,
        }
    }
}

/// How a method is invoked on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// One request, one response: resolved as a query field
    Unary,
    /// One request, a push stream of responses: resolved as a subscription
    ServerStream,
}

/// One service method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    /// Proto method name, e.g. `MakeSimplePizza`
    pub name: String,
    /// GraphQL name of the request message
    pub input_type: String,
    /// GraphQL name of the response message
    pub output_type: String,
    pub mode: InvocationMode,
}

impl MethodDescriptor {
    /// GraphQL field name for this method (`MakeSimplePizza` →
    /// `makeSimplePizza`).
    pub fn field_name(&self) -> String {
        self.name.to_lower_camel_case()
    }
}

/// One service: a named, ordered collection of methods.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    /// Short service name, e.g. `Pizzeria`
    pub name: String,
    /// Fully qualified proto name, e.g. `try.Pizzeria`; used to address the
    /// stub and to build gRPC paths
    pub full_name: String,
    pub methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    /// Root field name for this service (`Pizzeria` → `pizzeria`).
    pub fn field_name(&self) -> String {
        self.name.to_lower_camel_case()
    }

    /// Name of the query-side object type (`Pizzeria` → `PizzeriaService`).
    pub fn query_type_name(&self) -> String {
        format!("{}Service", self.name)
    }

    /// Name of the subscription-side object type (`Pizzeria` →
    /// `PizzeriaSubscription`).
    pub fn subscription_type_name(&self) -> String {
        format!("{}Subscription", self.name)
    }
}

/// The full set of definitions the assembler consumes.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSet {
    pub services: Vec<ServiceDescriptor>,
    pub messages: Vec<TypeDescriptor>,
    pub enums: Vec<EnumDescriptor>,
}

impl DescriptorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&self, name: &str) -> Option<&TypeDescriptor> {
        self.messages.iter().find(|m| m.name == name)
    }

    pub fn enum_(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enums.iter().find(|e| e.name == name)
    }
}

/// GraphQL type name for a fully qualified proto name.
///
/// Dots become word boundaries: `google.protobuf.Timestamp` →
/// `GoogleProtobufTimestamp`, an unpackaged `Pizza` stays `Pizza`.
pub fn graphql_type_name(proto_full_name: &str) -> String {
    proto_full_name
        .trim_start_matches('.')
        .replace('.', "_")
        .to_upper_camel_case()
}
