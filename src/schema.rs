//! Schema assembler.
//!
//! Walks the full descriptor set, applies the type mapper to every
//! definition, and emits deterministic GraphQL schema text plus the
//! resolver map. All naming conflicts and dangling references are caught
//! here, before the server starts serving; assembly never produces a
//! partially built schema.
//!
//! Declaration order is fixed for reproducible diffs: enums, message
//! output types, message input types (argument-reachable only), service
//! object types, then the root `Query`/`Subscription` types.

use crate::descriptor::{DescriptorSet, InvocationMode, ServiceDescriptor, TypeDescriptor, TypeRole};
use crate::error::{Error, Result};
use crate::fanout::FanoutHub;
use crate::mapper::{self, INPUT_SUFFIX, TIMESTAMP_TYPE};
use crate::resolver::{Resolver, ResolverMap, StreamingMethod, UnaryMethod};
use crate::stub::StubPool;
use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};
use tracing::info;

/// An assembled schema: deterministic SDL text plus the resolver map the
/// execution engine drives.
#[derive(Debug)]
pub struct BridgeSchema {
    sdl: String,
    resolvers: ResolverMap,
}

impl BridgeSchema {
    pub fn sdl(&self) -> &str {
        &self.sdl
    }

    pub fn resolvers(&self) -> &ResolverMap {
        &self.resolvers
    }

    /// Look up one resolver by `serviceField.methodField` key.
    pub fn resolver(&self, key: &str) -> Option<&Resolver> {
        self.resolvers.get(key)
    }

    pub fn into_parts(self) -> (String, ResolverMap) {
        (self.sdl, self.resolvers)
    }
}

/// Resolve a message name, treating the well-known timestamp as a
/// synthetic message.
fn resolve_message<'a>(defs: &'a DescriptorSet, name: &str) -> Option<Cow<'a, TypeDescriptor>> {
    if name == TIMESTAMP_TYPE {
        Some(Cow::Owned(mapper::timestamp_descriptor()))
    } else {
        defs.message(name).map(Cow::Borrowed)
    }
}

fn validate_references(defs: &DescriptorSet) -> Result<()> {
    for message in &defs.messages {
        for field in &message.fields {
            if let Some(name) = field.kind.message_name() {
                if resolve_message(defs, name).is_none() {
                    return Err(Error::UnknownKind(format!(
                        "field `{}.{}` references unknown message `{name}`",
                        message.name, field.name
                    )));
                }
            }
            if let Some(name) = field.kind.enum_name() {
                if defs.enum_(name).is_none() {
                    return Err(Error::UnknownKind(format!(
                        "field `{}.{}` references unknown enum `{name}`",
                        message.name, field.name
                    )));
                }
            }
        }
    }
    for service in &defs.services {
        for method in &service.methods {
            for (label, name) in [("request", &method.input_type), ("response", &method.output_type)]
            {
                if resolve_message(defs, name).is_none() {
                    return Err(Error::UnknownKind(format!(
                        "method `{}.{}` references unknown {label} message `{name}`",
                        service.name, method.name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Messages reachable from an argument position, i.e. referenced (possibly
/// transitively) by a field of some method's request message. The request
/// message itself is flattened into arguments and is not reachable unless
/// a field references it. Returns the reachable set and whether the
/// timestamp input counterpart is needed.
fn argument_reachable(defs: &DescriptorSet) -> Result<(BTreeSet<String>, bool)> {
    let mut reachable = BTreeSet::new();
    let mut timestamp = false;
    let mut stack: Vec<String> = Vec::new();

    for service in &defs.services {
        for method in &service.methods {
            let request = resolve_message(defs, &method.input_type).ok_or_else(|| {
                Error::UnknownKind(format!(
                    "method `{}.{}` references unknown request message `{}`",
                    service.name, method.name, method.input_type
                ))
            })?;
            for field in &request.fields {
                if field.kind.references_timestamp() {
                    timestamp = true;
                }
                if let Some(name) = field.kind.message_name() {
                    if reachable.insert(name.to_string()) {
                        stack.push(name.to_string());
                    }
                }
            }
        }
    }

    while let Some(name) = stack.pop() {
        let message = resolve_message(defs, &name)
            .ok_or_else(|| Error::UnknownKind(format!("reference to unknown message `{name}`")))?;
        for field in &message.fields {
            if field.kind.references_timestamp() {
                timestamp = true;
            }
            if let Some(nested) = field.kind.message_name() {
                if reachable.insert(nested.to_string()) {
                    stack.push(nested.to_string());
                }
            }
        }
    }

    Ok((reachable, timestamp))
}

fn declare(declared: &mut HashSet<String>, name: String) -> Result<()> {
    if declared.insert(name.clone()) {
        Ok(())
    } else {
        Err(Error::SchemaNameConflict(name))
    }
}

fn check_name_conflicts(
    defs: &DescriptorSet,
    input_reachable: &BTreeSet<String>,
    timestamp_output: bool,
    timestamp_input: bool,
) -> Result<()> {
    let mut declared = HashSet::new();

    for e in &defs.enums {
        declare(&mut declared, e.name.clone())?;
    }
    if timestamp_output {
        declare(&mut declared, TIMESTAMP_TYPE.to_string())?;
    }
    for m in &defs.messages {
        declare(&mut declared, m.name.clone())?;
    }
    if timestamp_input {
        declare(&mut declared, format!("{TIMESTAMP_TYPE}{INPUT_SUFFIX}"))?;
    }
    for name in input_reachable {
        declare(&mut declared, format!("{name}{INPUT_SUFFIX}"))?;
    }
    for service in &defs.services {
        declare(&mut declared, service.query_type_name())?;
        declare(&mut declared, service.subscription_type_name())?;
    }
    declare(&mut declared, "Query".to_string())?;
    declare(&mut declared, "Subscription".to_string())?;

    // Root fields are their own namespace
    let mut root_fields = HashSet::new();
    for service in &defs.services {
        if !root_fields.insert(service.field_name()) {
            return Err(Error::SchemaNameConflict(format!(
                "root field `{}`",
                service.field_name()
            )));
        }
    }
    Ok(())
}

fn render_service_object(
    defs: &DescriptorSet,
    service: &ServiceDescriptor,
    mode: InvocationMode,
) -> Result<String> {
    let name = match mode {
        InvocationMode::Unary => service.query_type_name(),
        InvocationMode::ServerStream => service.subscription_type_name(),
    };
    let mut out = String::new();
    out.push_str(&format!("type {name} {{\n"));

    for method in service.methods.iter().filter(|m| m.mode == mode) {
        let request = resolve_message(defs, &method.input_type).ok_or_else(|| {
            Error::UnknownKind(format!(
                "method `{}.{}` references unknown request message `{}`",
                service.name, method.name, method.input_type
            ))
        })?;

        // One argument per request field, same name, input role: the
        // explicit contract the resolver copies field-by-field against
        let mut args = Vec::new();
        for field in &request.fields {
            args.push(format!(
                "{}: {}",
                field.name,
                mapper::render_kind(&field.kind, TypeRole::Input)?
            ));
        }

        if args.is_empty() {
            out.push_str(&format!(
                "  {}: {}!\n",
                method.field_name(),
                method.output_type
            ));
        } else {
            out.push_str(&format!(
                "  {}({}): {}!\n",
                method.field_name(),
                args.join(", "),
                method.output_type
            ));
        }
    }
    out.push('}');
    Ok(out)
}

fn render_root<F>(defs: &DescriptorSet, name: &str, object_name: F) -> String
where
    F: Fn(&ServiceDescriptor) -> String,
{
    let mut out = String::new();
    out.push_str(&format!("type {name} {{\n"));
    for service in &defs.services {
        out.push_str(&format!(
            "  {}: {}!\n",
            service.field_name(),
            object_name(service)
        ));
    }
    out.push('}');
    out
}

/// Assemble the schema text alone.
///
/// Deterministic: the same descriptor set always yields byte-identical
/// text.
pub fn assemble_sdl(defs: &DescriptorSet) -> Result<String> {
    validate_references(defs)?;
    let (input_reachable, timestamp_in_args) = argument_reachable(defs)?;

    let timestamp_used = timestamp_in_args
        || defs
            .messages
            .iter()
            .any(|m| m.fields.iter().any(|f| f.kind.references_timestamp()))
        || defs.services.iter().any(|s| {
            s.methods
                .iter()
                .any(|m| m.input_type == TIMESTAMP_TYPE || m.output_type == TIMESTAMP_TYPE)
        });

    check_name_conflicts(defs, &input_reachable, timestamp_used, timestamp_in_args)?;

    let mut declarations: Vec<String> = Vec::new();

    for e in &defs.enums {
        declarations.push(mapper::map_enum(e));
    }
    if timestamp_used {
        declarations.push(mapper::map_type(
            &mapper::timestamp_descriptor(),
            TypeRole::Output,
        )?);
    }
    for m in &defs.messages {
        declarations.push(mapper::map_type(m, TypeRole::Output)?);
    }
    if timestamp_in_args {
        declarations.push(mapper::map_type(
            &mapper::timestamp_descriptor(),
            TypeRole::Input,
        )?);
    }
    for m in &defs.messages {
        if input_reachable.contains(&m.name) {
            declarations.push(mapper::map_type(m, TypeRole::Input)?);
        }
    }
    for s in &defs.services {
        declarations.push(render_service_object(defs, s, InvocationMode::Unary)?);
        declarations.push(render_service_object(defs, s, InvocationMode::ServerStream)?);
    }
    declarations.push(render_root(defs, "Query", ServiceDescriptor::query_type_name));
    declarations.push(render_root(
        defs,
        "Subscription",
        ServiceDescriptor::subscription_type_name,
    ));

    Ok(declarations.join("\n\n") + "\n")
}

/// Assemble schema text and resolver map.
///
/// Every service must have a stub registered under its fully qualified
/// name; a missing stub fails assembly rather than the first request.
pub fn assemble(defs: &DescriptorSet, stubs: &StubPool, hub: &FanoutHub) -> Result<BridgeSchema> {
    let sdl = assemble_sdl(defs)?;

    let mut resolvers = ResolverMap::new();
    for service in &defs.services {
        let stub = stubs.get(&service.full_name).ok_or_else(|| {
            Error::Connection(format!(
                "no stub registered for service `{}`",
                service.full_name
            ))
        })?;
        for method in &service.methods {
            let request = resolve_message(defs, &method.input_type).ok_or_else(|| {
                Error::UnknownKind(format!(
                    "method `{}.{}` references unknown request message `{}`",
                    service.name, method.name, method.input_type
                ))
            })?;
            let request_fields: Vec<String> =
                request.fields.iter().map(|f| f.name.clone()).collect();
            let key = format!("{}.{}", service.field_name(), method.field_name());
            let resolver = match method.mode {
                InvocationMode::Unary => Resolver::Unary(UnaryMethod::new(
                    stub.clone(),
                    method.name.clone(),
                    request_fields,
                )),
                InvocationMode::ServerStream => Resolver::Stream(StreamingMethod::new(
                    stub.clone(),
                    method.name.clone(),
                    request_fields,
                    hub.clone(),
                )),
            };
            resolvers.insert(key, resolver);
        }
    }

    info!(
        services = defs.services.len(),
        resolvers = resolvers.len(),
        "schema assembled"
    );
    Ok(BridgeSchema { sdl, resolvers })
}
