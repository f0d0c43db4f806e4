//! The normalized result cache and its read/diff/write primitives.
//!
//! Results are flattened into an id-addressed map of objects. Scalars live
//! directly on their owning object; composite fields hold the id (or array
//! of ids) of the object(s) they point at. Which interpretation applies is
//! decided by the selection being read: a field with a subselection is a
//! reference, anything else is a scalar.

pub mod diff;
pub mod read;
pub mod write;

use std::sync::Arc;

use apollo_compiler::ast;
use indexmap::IndexMap;
use serde_json::Value;

use crate::{error::DocumentError, types::Variables};

/// One normalized entity: response keys (with arguments folded in) to
/// scalar values or references.
pub type StoreObject = serde_json::Map<String, Value>;

/// The whole normalized entity map.
pub type NormalizedCache = IndexMap<String, StoreObject>;

/// Optional hook assigning stable ids to result objects. When it returns
/// `None` (or is not configured) the writer falls back to path-generated ids
/// of the form `parent.fieldKey` / `parent.fieldKey.index`.
pub type DataIdFromObject = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// The key a field's value is stored under: the bare field name, or
/// `name({"arg":value,…})` with argument values resolved against the
/// operation's variables so distinct argument sets occupy distinct slots.
pub fn store_key_name_from_field(field: &ast::Field, variables: Option<&Variables>) -> Result<String, DocumentError> {
    if field.arguments.is_empty() {
        return Ok(field.name.to_string());
    }
    let mut args = serde_json::Map::new();
    for argument in &field.arguments {
        args.insert(argument.name.to_string(), graphql_value_to_json(&argument.value, variables)?);
    }
    Ok(format!("{}({})", field.name, Value::Object(args)))
}

/// Resolve an AST value to its JSON runtime value, looking variables up in
/// the caller-supplied map.
pub fn graphql_value_to_json(value: &ast::Value, variables: Option<&Variables>) -> Result<Value, DocumentError> {
    Ok(match value {
        ast::Value::Null => Value::Null,
        ast::Value::Boolean(b) => Value::Bool(*b),
        ast::Value::Enum(name) => Value::String(name.to_string()),
        ast::Value::String(s) => Value::String(s.as_str().to_string()),
        ast::Value::Int(i) => {
            let number = i.as_str().parse::<serde_json::Number>().map_err(|e| DocumentError::Parse(e.to_string()))?;
            Value::Number(number)
        }
        ast::Value::Float(f) => {
            let number = f.as_str().parse::<serde_json::Number>().map_err(|e| DocumentError::Parse(e.to_string()))?;
            Value::Number(number)
        }
        ast::Value::Variable(name) => variables
            .and_then(|vars| vars.get(name.as_str()))
            .cloned()
            .ok_or_else(|| DocumentError::UndefinedVariable(name.to_string()))?,
        ast::Value::List(items) => {
            Value::Array(items.iter().map(|item| graphql_value_to_json(item, variables)).collect::<Result<_, _>>()?)
        }
        ast::Value::Object(fields) => {
            let mut object = serde_json::Map::new();
            for (name, field_value) in fields {
                object.insert(name.to_string(), graphql_value_to_json(field_value, variables)?);
            }
            Value::Object(object)
        }
    })
}
