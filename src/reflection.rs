//! Build bridge descriptors from compiled protobuf descriptor sets.
//!
//! The loader walks a [`DescriptorPool`] and produces the model in
//! [`crate::descriptor`]: qualified proto names become GraphQL names
//! (`try.Pizza` → `TryPizza`), `google.protobuf.Timestamp` references
//! become the well-known timestamp kind, and the `google.protobuf.*`
//! definitions themselves are skipped.

use crate::descriptor::{
    graphql_type_name, DescriptorSet, EnumDescriptor, FieldDescriptor, FieldKind,
    InvocationMode, MethodDescriptor, ServiceDescriptor, TypeDescriptor,
};
use crate::error::{Error, Result};
use prost_reflect::{DescriptorPool, Kind};
use std::path::Path;
use tracing::warn;

const TIMESTAMP_FULL_NAME: &str = "google.protobuf.Timestamp";
const WELL_KNOWN_PREFIX: &str = "google.protobuf.";

/// Decode a compiled `FileDescriptorSet`.
pub fn decode_pool(bytes: &[u8]) -> Result<DescriptorPool> {
    DescriptorPool::decode(bytes).map_err(|e| Error::Descriptor(e.to_string()))
}

/// Read and decode a compiled `FileDescriptorSet` from a file.
pub fn pool_from_file(path: impl AsRef<Path>) -> Result<DescriptorPool> {
    let bytes = std::fs::read(path)?;
    decode_pool(&bytes)
}

/// Convert every service, message and enum in the pool into the bridge
/// model.
pub fn descriptors_from_pool(pool: &DescriptorPool) -> Result<DescriptorSet> {
    let mut defs = DescriptorSet::new();

    for message in pool.all_messages() {
        if message.full_name().starts_with(WELL_KNOWN_PREFIX) {
            continue;
        }
        defs.messages.push(convert_message(&message)?);
    }

    for enum_ in pool.all_enums() {
        if enum_.full_name().starts_with(WELL_KNOWN_PREFIX) {
            continue;
        }
        defs.enums.push(EnumDescriptor::new(
            graphql_type_name(enum_.full_name()),
            enum_.values().map(|v| v.name().to_string()).collect(),
        ));
    }

    for service in pool.services() {
        defs.services.push(convert_service(&service));
    }

    Ok(defs)
}

fn convert_message(message: &prost_reflect::MessageDescriptor) -> Result<TypeDescriptor> {
    let mut fields = Vec::new();
    for field in message.fields() {
        fields.push(convert_field(&field)?);
    }
    Ok(TypeDescriptor::new(
        graphql_type_name(message.full_name()),
        fields,
    ))
}

fn convert_field(field: &prost_reflect::FieldDescriptor) -> Result<FieldDescriptor> {
    if field.is_map() {
        return Err(Error::UnknownKind(format!(
            "map field `{}`",
            field.full_name()
        )));
    }

    let base = match field.kind() {
        Kind::Bool => FieldKind::Bool,
        Kind::Int32
        | Kind::Int64
        | Kind::Uint32
        | Kind::Uint64
        | Kind::Sint32
        | Kind::Sint64
        | Kind::Fixed32
        | Kind::Fixed64
        | Kind::Sfixed32
        | Kind::Sfixed64 => FieldKind::Int,
        Kind::Float | Kind::Double => FieldKind::Float,
        Kind::String | Kind::Bytes => FieldKind::String,
        Kind::Enum(enum_desc) => FieldKind::Enum(graphql_type_name(enum_desc.full_name())),
        Kind::Message(msg_desc) if msg_desc.full_name() == TIMESTAMP_FULL_NAME => {
            FieldKind::Timestamp
        }
        Kind::Message(msg_desc) => FieldKind::Message(graphql_type_name(msg_desc.full_name())),
    };
    let kind = if field.is_list() {
        FieldKind::Repeated(Box::new(base))
    } else {
        base
    };

    // proto3 `optional` fields (and oneof members) are the only optional
    // ones; everything else renders required in output position
    let required = field.containing_oneof().is_none();

    Ok(FieldDescriptor::new(field.name(), kind, required))
}

fn convert_service(service: &prost_reflect::ServiceDescriptor) -> ServiceDescriptor {
    let mut methods = Vec::new();
    for method in service.methods() {
        if method.is_client_streaming() {
            warn!(
                service = service.full_name(),
                method = method.name(),
                "client-streaming methods cannot be bridged, skipping"
            );
            continue;
        }
        let mode = if method.is_server_streaming() {
            InvocationMode::ServerStream
        } else {
            InvocationMode::Unary
        };
        methods.push(MethodDescriptor {
            name: method.name().to_string(),
            input_type: graphql_type_name(method.input().full_name()),
            output_type: graphql_type_name(method.output().full_name()),
            mode,
        });
    }
    ServiceDescriptor {
        name: service.name().to_string(),
        full_name: service.full_name().to_string(),
        methods,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::field_descriptor_proto::{Label, Type};
    use prost_types::{
        DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
        FileDescriptorProto, FileDescriptorSet, MethodDescriptorProto, ServiceDescriptorProto,
    };

    fn field(
        name: &str,
        number: i32,
        ty: Type,
        type_name: Option<&str>,
        label: Label,
    ) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.into()),
            number: Some(number),
            r#type: Some(ty as i32),
            type_name: type_name.map(Into::into),
            label: Some(label as i32),
            ..Default::default()
        }
    }

    fn timestamp_file() -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some("google/protobuf/timestamp.proto".into()),
            package: Some("google.protobuf".into()),
            syntax: Some("proto3".into()),
            message_type: vec![DescriptorProto {
                name: Some("Timestamp".into()),
                field: vec![
                    field("seconds", 1, Type::Int64, None, Label::Optional),
                    field("nanos", 2, Type::Int32, None, Label::Optional),
                ],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn pizzeria_file() -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some("try.proto".into()),
            syntax: Some("proto3".into()),
            dependency: vec!["google/protobuf/timestamp.proto".into()],
            message_type: vec![
                DescriptorProto {
                    name: Some("Topping".into()),
                    field: vec![
                        field("name", 1, Type::String, None, Label::Optional),
                        field("sweet", 2, Type::Bool, None, Label::Optional),
                        field("vitamins", 3, Type::String, None, Label::Repeated),
                    ],
                    ..Default::default()
                },
                DescriptorProto {
                    name: Some("Pizza".into()),
                    field: vec![
                        field("title", 1, Type::String, None, Label::Optional),
                        field(
                            "baked_at",
                            2,
                            Type::Message,
                            Some(".google.protobuf.Timestamp"),
                            Label::Optional,
                        ),
                        field(
                            "toppings",
                            3,
                            Type::Message,
                            Some(".Topping"),
                            Label::Repeated,
                        ),
                        field("sauce", 4, Type::Enum, Some(".PizzaSauce"), Label::Optional),
                    ],
                    ..Default::default()
                },
                DescriptorProto {
                    name: Some("SimplePizzaRequest".into()),
                    field: vec![field(
                        "topping",
                        1,
                        Type::Message,
                        Some(".Topping"),
                        Label::Optional,
                    )],
                    ..Default::default()
                },
            ],
            enum_type: vec![EnumDescriptorProto {
                name: Some("PizzaSauce".into()),
                value: vec![
                    EnumValueDescriptorProto {
                        name: Some("TOMATO".into()),
                        number: Some(0),
                        ..Default::default()
                    },
                    EnumValueDescriptorProto {
                        name: Some("CREAM".into()),
                        number: Some(1),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            service: vec![ServiceDescriptorProto {
                name: Some("Pizzeria".into()),
                method: vec![
                    MethodDescriptorProto {
                        name: Some("MakeSimplePizza".into()),
                        input_type: Some(".SimplePizzaRequest".into()),
                        output_type: Some(".Pizza".into()),
                        ..Default::default()
                    },
                    MethodDescriptorProto {
                        name: Some("ObservePizzas".into()),
                        input_type: Some(".SimplePizzaRequest".into()),
                        output_type: Some(".Pizza".into()),
                        server_streaming: Some(true),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn pool() -> DescriptorPool {
        DescriptorPool::from_file_descriptor_set(FileDescriptorSet {
            file: vec![timestamp_file(), pizzeria_file()],
        })
        .expect("valid descriptor set")
    }

    #[test]
    fn test_well_known_definitions_are_skipped() {
        let defs = descriptors_from_pool(&pool()).unwrap();
        let names: Vec<&str> = defs.messages.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Topping", "Pizza", "SimplePizzaRequest"]);
    }

    #[test]
    fn test_timestamp_reference_becomes_well_known_kind() {
        let defs = descriptors_from_pool(&pool()).unwrap();
        let pizza = defs.message("Pizza").unwrap();
        let baked_at = pizza.fields.iter().find(|f| f.name == "baked_at").unwrap();
        assert_eq!(baked_at.kind, FieldKind::Timestamp);
    }

    #[test]
    fn test_field_kinds_and_requiredness() {
        let defs = descriptors_from_pool(&pool()).unwrap();
        let topping = defs.message("Topping").unwrap();
        assert_eq!(topping.fields[0].kind, FieldKind::String);
        assert_eq!(topping.fields[1].kind, FieldKind::Bool);
        assert_eq!(
            topping.fields[2].kind,
            FieldKind::Repeated(Box::new(FieldKind::String))
        );
        assert!(topping.fields.iter().all(|f| f.required));

        let pizza = defs.message("Pizza").unwrap();
        let sauce = pizza.fields.iter().find(|f| f.name == "sauce").unwrap();
        assert_eq!(sauce.kind, FieldKind::Enum("PizzaSauce".into()));
        let toppings = pizza.fields.iter().find(|f| f.name == "toppings").unwrap();
        assert_eq!(
            toppings.kind,
            FieldKind::Repeated(Box::new(FieldKind::Message("Topping".into())))
        );
    }

    #[test]
    fn test_service_and_methods() {
        let defs = descriptors_from_pool(&pool()).unwrap();
        assert_eq!(defs.services.len(), 1);
        let service = &defs.services[0];
        assert_eq!(service.name, "Pizzeria");
        assert_eq!(service.full_name, "Pizzeria");

        assert_eq!(service.methods.len(), 2);
        let make = &service.methods[0];
        assert_eq!(make.name, "MakeSimplePizza");
        assert_eq!(make.input_type, "SimplePizzaRequest");
        assert_eq!(make.output_type, "Pizza");
        assert_eq!(make.mode, InvocationMode::Unary);

        let observe = &service.methods[1];
        assert_eq!(observe.mode, InvocationMode::ServerStream);
    }

    #[test]
    fn test_client_streaming_methods_are_skipped() {
        let mut file = pizzeria_file();
        file.service[0].method.push(MethodDescriptorProto {
            name: Some("UploadPizzas".into()),
            input_type: Some(".Pizza".into()),
            output_type: Some(".Pizza".into()),
            client_streaming: Some(true),
            ..Default::default()
        });
        let pool = DescriptorPool::from_file_descriptor_set(FileDescriptorSet {
            file: vec![timestamp_file(), file],
        })
        .unwrap();

        let defs = descriptors_from_pool(&pool).unwrap();
        assert!(defs.services[0]
            .methods
            .iter()
            .all(|m| m.name != "UploadPizzas"));
    }

    #[test]
    fn test_map_fields_are_unknown_kind() {
        // A map<string, string> field compiles to a repeated synthetic
        // MapEntry message
        let mut file = pizzeria_file();
        file.message_type.push(DescriptorProto {
            name: Some("Menu".into()),
            field: vec![field(
                "prices",
                1,
                Type::Message,
                Some(".Menu.PricesEntry"),
                Label::Repeated,
            )],
            nested_type: vec![DescriptorProto {
                name: Some("PricesEntry".into()),
                field: vec![
                    field("key", 1, Type::String, None, Label::Optional),
                    field("value", 2, Type::String, None, Label::Optional),
                ],
                options: Some(prost_types::MessageOptions {
                    map_entry: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        });
        let pool = DescriptorPool::from_file_descriptor_set(FileDescriptorSet {
            file: vec![timestamp_file(), file],
        })
        .unwrap();

        let err = descriptors_from_pool(&pool).unwrap_err();
        match err {
            Error::UnknownKind(message) => assert!(message.contains("prices")),
            other => panic!("expected UnknownKind, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_pool_rejects_garbage() {
        let err = decode_pool(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, Error::Descriptor(_)));
    }

    #[test]
    fn test_packaged_names_are_qualified() {
        let mut file = pizzeria_file();
        file.package = Some("kitchen.v1".into());
        // References must be package-qualified too
        for message in &mut file.message_type {
            for f in &mut message.field {
                if let Some(tn) = &f.type_name {
                    if !tn.starts_with(".google") {
                        f.type_name = Some(format!(".kitchen.v1{tn}"));
                    }
                }
            }
        }
        for service in &mut file.service {
            for m in &mut service.method {
                m.input_type = Some(format!(".kitchen.v1{}", m.input_type.take().unwrap()));
                m.output_type = Some(format!(".kitchen.v1{}", m.output_type.take().unwrap()));
            }
        }
        let pool = DescriptorPool::from_file_descriptor_set(FileDescriptorSet {
            file: vec![timestamp_file(), file],
        })
        .unwrap();

        let defs = descriptors_from_pool(&pool).unwrap();
        assert!(defs.message("KitchenV1Pizza").is_some());
        let service = &defs.services[0];
        assert_eq!(service.full_name, "kitchen.v1.Pizzeria");
        assert_eq!(service.methods[0].input_type, "KitchenV1SimplePizzaRequest");
    }
}
