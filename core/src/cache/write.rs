//! Normalizing writer: flattens a result tree into the entity map.
//!
//! Objects get the id the configured hook assigns them, falling back to a
//! path of store keys from the write root (`parent.fieldKey`,
//! `parent.fieldKey.index` inside arrays), so a later write of the same
//! path merges into the same entity.

use apollo_compiler::ast;
use serde_json::Value;

use crate::{
    cache::{store_key_name_from_field, DataIdFromObject, NormalizedCache},
    document::{self, FragmentMap},
    error::{CacheError, DocumentError},
    types::Variables,
};

pub struct StoreWrite<'a> {
    pub variables: Option<&'a Variables>,
    pub fragment_map: &'a FragmentMap,
    pub data_id_from_object: Option<&'a DataIdFromObject>,
}

impl StoreWrite<'_> {
    fn data_id(&self, value: &Value) -> Option<String> { self.data_id_from_object.and_then(|hook| hook(value)) }
}

pub fn write_result_to_store(
    ctx: &StoreWrite,
    result: &Value,
    root_id: &str,
    selection_set: &[ast::Selection],
    store: &mut NormalizedCache,
) -> Result<(), CacheError> {
    match result {
        Value::Null => Ok(()),
        Value::Object(object) => write_selection_set(ctx, object, root_id, selection_set, store),
        _ => Err(CacheError::NonObjectResult { id: root_id.to_string() }),
    }
}

fn write_selection_set(
    ctx: &StoreWrite,
    object: &serde_json::Map<String, Value>,
    data_id: &str,
    selections: &[ast::Selection],
    store: &mut NormalizedCache,
) -> Result<(), CacheError> {
    for selection in selections {
        match selection {
            ast::Selection::Field(field) => {
                let response_key = document::response_key(field).as_str();
                let Some(value) = object.get(response_key) else {
                    return Err(CacheError::MissingResultField { field: response_key.to_string(), id: data_id.to_string() });
                };
                let store_key = store_key_name_from_field(field, ctx.variables)?;

                let stored_value = if field.selection_set.is_empty() || value.is_null() {
                    value.clone()
                } else if let Value::Array(items) = value {
                    let mut references = Vec::with_capacity(items.len());
                    for (index, item) in items.iter().enumerate() {
                        if item.is_null() {
                            references.push(Value::Null);
                            continue;
                        }
                        let child_id = ctx.data_id(item).unwrap_or_else(|| format!("{data_id}.{store_key}.{index}"));
                        let child = item.as_object().ok_or(CacheError::NonObjectResult { id: child_id.clone() })?;
                        write_selection_set(ctx, child, &child_id, &field.selection_set, store)?;
                        references.push(Value::String(child_id));
                    }
                    Value::Array(references)
                } else {
                    let child_id = ctx.data_id(value).unwrap_or_else(|| format!("{data_id}.{store_key}"));
                    let child = value.as_object().ok_or(CacheError::NonObjectResult { id: child_id.clone() })?;
                    write_selection_set(ctx, child, &child_id, &field.selection_set, store)?;
                    Value::String(child_id)
                };

                store.entry(data_id.to_string()).or_default().insert(store_key, stored_value);
            }
            ast::Selection::FragmentSpread(spread) => {
                let fragment = ctx
                    .fragment_map
                    .get(&spread.fragment_name)
                    .ok_or_else(|| DocumentError::UnknownFragment(spread.fragment_name.to_string()))?;
                write_selection_set(ctx, object, data_id, &fragment.selection_set, store)?;
            }
            ast::Selection::InlineFragment(fragment) => {
                write_selection_set(ctx, object, data_id, &fragment.selection_set, store)?;
            }
        }
    }
    Ok(())
}
