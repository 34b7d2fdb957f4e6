//! Type mapper: pure translation of bridge descriptors into GraphQL type
//! text.
//!
//! Each message maps to an output `type`, plus an `input` counterpart when
//! it is reachable from an argument position: same fields, all optional,
//! name carrying the fixed [`INPUT_SUFFIX`]. Enums are shared by
//! both roles and rendered once. The mapper is stateless; reachability
//! tracking and deduplication live in [`crate::schema`].

use crate::descriptor::{EnumDescriptor, FieldDescriptor, FieldKind, TypeDescriptor, TypeRole};
use crate::error::{Error, Result};

/// Suffix appended to an output type name to form its input counterpart.
pub const INPUT_SUFFIX: &str = "Input";

/// GraphQL name of the well-known `google.protobuf.Timestamp` composite.
pub const TIMESTAMP_TYPE: &str = "GoogleProtobufTimestamp";

/// The descriptor backing [`TIMESTAMP_TYPE`]: two required integer fields,
/// `seconds` and `nanos`.
pub fn timestamp_descriptor() -> TypeDescriptor {
    TypeDescriptor::new(
        TIMESTAMP_TYPE,
        vec![
            FieldDescriptor::new("seconds", FieldKind::Int, true)
                .with_description(" Seconds of UTC time since Unix epoch"),
            FieldDescriptor::new("nanos", FieldKind::Int, true)
                .with_description(" Non-negative fractions of a second at nanosecond resolution"),
        ],
    )
    .with_description(" A point in time, independent of any time zone or calendar")
}

/// Render the GraphQL type reference for a field kind.
///
/// In input position, message and timestamp references are rewritten to
/// their input counterparts. List wrapping carries no null-ness of its own.
pub fn render_kind(kind: &FieldKind, role: TypeRole) -> Result<String> {
    match kind {
        FieldKind::Bool => Ok("Boolean".to_string()),
        FieldKind::Int => Ok("Int".to_string()),
        FieldKind::Float => Ok("Float".to_string()),
        FieldKind::String => Ok("String".to_string()),
        FieldKind::Enum(name) => Ok(name.clone()),
        FieldKind::Message(name) => Ok(match role {
            TypeRole::Output => name.clone(),
            TypeRole::Input => format!("{name}{INPUT_SUFFIX}"),
        }),
        FieldKind::Timestamp => Ok(match role {
            TypeRole::Output => TIMESTAMP_TYPE.to_string(),
            TypeRole::Input => format!("{TIMESTAMP_TYPE}{INPUT_SUFFIX}"),
        }),
        FieldKind::Repeated(inner) => {
            if matches!(inner.as_ref(), FieldKind::Repeated(_)) {
                return Err(Error::UnknownKind("repeated of repeated".to_string()));
            }
            Ok(format!("[{}]", render_kind(inner, role)?))
        }
    }
}

fn render_field(out: &mut String, field: &FieldDescriptor, role: TypeRole) -> Result<()> {
    if let Some(description) = &field.description {
        for line in description.lines() {
            out.push_str(&format!("  #{line}\n"));
        }
    }
    // The required flag only exists in output position
    let required = field.required && role == TypeRole::Output;
    out.push_str(&format!(
        "  {}: {}{}\n",
        field.name,
        render_kind(&field.kind, role)?,
        if required { "!" } else { "" }
    ));
    Ok(())
}

/// Map one message type to a GraphQL `type` (output role) or `input`
/// declaration (input role).
pub fn map_type(descriptor: &TypeDescriptor, role: TypeRole) -> Result<String> {
    let mut out = String::new();
    if let Some(description) = &descriptor.description {
        for line in description.lines() {
            out.push_str(&format!("#{line}\n"));
        }
    }
    match role {
        TypeRole::Output => out.push_str(&format!("type {} {{\n", descriptor.name)),
        TypeRole::Input => {
            out.push_str(&format!("input {}{} {{\n", descriptor.name, INPUT_SUFFIX))
        }
    }

    for field in &descriptor.fields {
        render_field(&mut out, field, role)?;
    }
    out.push('}');
    Ok(out)
}

/// Map one enum to its single shared declaration.
pub fn map_enum(descriptor: &EnumDescriptor) -> String {
    let mut out = String::new();
    if let Some(description) = &descriptor.description {
        for line in description.lines() {
            out.push_str(&format!("#{line}\n"));
        }
    }
    out.push_str(&format!("enum {} {{\n", descriptor.name));
    for variant in &descriptor.variants {
        out.push_str(&format!("  {variant}\n"));
    }
    out.push('}');
    out
}
