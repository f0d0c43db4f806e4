//! The diff planner: compares a wanted selection against the normalized
//! cache and reports both the best-effort projection and the residual
//! selections whose data the cache lacks.
//!
//! Missing data nested below a present field bubbles upward as a pruned copy
//! of the parent field, so the residual is always a well-formed query rooted
//! at the same place the original was.

use apollo_compiler::{ast, Name, Node};
use serde_json::Value;

use crate::{
    cache::{store_key_name_from_field, NormalizedCache},
    document::{self, FragmentMap},
    error::{CacheError, DocumentError},
    types::{SelectionSetWithRoot, Variables, ROOT_QUERY_ID},
};

pub struct StoreDiff<'a> {
    pub store: &'a NormalizedCache,
    pub variables: Option<&'a Variables>,
    pub fragment_map: &'a FragmentMap,
    /// Fail on the first absent field instead of reporting it as residual
    pub throw_on_missing_field: bool,
}

#[derive(Debug)]
pub struct DiffResult {
    /// Best-effort projection assembled from the cache
    pub result: Value,
    /// Selection subtrees whose data is absent; empty means the cache fully
    /// satisfies the request and no network round trip is needed
    pub missing_selection_sets: Vec<SelectionSetWithRoot>,
}

pub fn diff_selection_set_against_store(
    ctx: &StoreDiff,
    selection_set: &[ast::Selection],
    root_id: &str,
    type_name: &Name,
) -> Result<DiffResult, CacheError> {
    let (result, missing) = diff_level(ctx, selection_set, root_id)?;
    let missing_selection_sets = if missing.is_empty() {
        vec![]
    } else {
        vec![SelectionSetWithRoot { id: root_id.to_string(), type_name: type_name.clone(), selection_set: missing }]
    };
    Ok(DiffResult { result: Value::Object(result), missing_selection_sets })
}

fn diff_level(
    ctx: &StoreDiff,
    selections: &[ast::Selection],
    id: &str,
) -> Result<(serde_json::Map<String, Value>, Vec<ast::Selection>), CacheError> {
    let mut result = serde_json::Map::new();
    let mut missing: Vec<ast::Selection> = Vec::new();

    for selection in selections {
        match selection {
            ast::Selection::Field(field) => {
                let store_key = store_key_name_from_field(field, ctx.variables)?;
                let stored = ctx.store.get(id).and_then(|object| object.get(&store_key));
                let Some(stored) = stored else {
                    if ctx.throw_on_missing_field {
                        return Err(CacheError::MissingField { field: store_key, id: id.to_string() });
                    }
                    missing.push(selection.clone());
                    continue;
                };
                let response_key = document::response_key(field).to_string();

                if field.selection_set.is_empty() {
                    result.insert(response_key, stored.clone());
                    continue;
                }

                // Composite field: the stored value is a reference or an
                // array of references.
                match stored {
                    Value::Null => {
                        result.insert(response_key, Value::Null);
                    }
                    Value::Array(elements) => {
                        let mut items = Vec::with_capacity(elements.len());
                        let mut pruned: Vec<ast::Selection> = Vec::new();
                        let mut dangling = false;
                        for element in elements {
                            match element {
                                Value::Null => items.push(Value::Null),
                                Value::String(child_id) => {
                                    let (child, child_missing) = diff_level(ctx, &field.selection_set, child_id)?;
                                    items.push(Value::Object(child));
                                    for sub in child_missing {
                                        if !pruned.contains(&sub) {
                                            pruned.push(sub);
                                        }
                                    }
                                }
                                _ => dangling = true,
                            }
                        }
                        if dangling {
                            if ctx.throw_on_missing_field {
                                return Err(CacheError::MissingField { field: store_key, id: id.to_string() });
                            }
                            missing.push(selection.clone());
                        } else {
                            result.insert(response_key, Value::Array(items));
                            if !pruned.is_empty() {
                                missing.push(pruned_field(field, pruned));
                            }
                        }
                    }
                    Value::String(child_id) if ctx.store.contains_key(child_id.as_str()) => {
                        let (child, child_missing) = diff_level(ctx, &field.selection_set, child_id)?;
                        result.insert(response_key, Value::Object(child));
                        if !child_missing.is_empty() {
                            missing.push(pruned_field(field, child_missing));
                        }
                    }
                    // A composite field whose stored value is not a live
                    // reference holds no usable data.
                    _ => {
                        if ctx.throw_on_missing_field {
                            return Err(CacheError::MissingField { field: store_key, id: id.to_string() });
                        }
                        missing.push(selection.clone());
                    }
                }
            }
            ast::Selection::FragmentSpread(spread) => {
                let fragment = ctx
                    .fragment_map
                    .get(&spread.fragment_name)
                    .ok_or_else(|| DocumentError::UnknownFragment(spread.fragment_name.to_string()))?;
                let (sub, sub_missing) = diff_level(ctx, &fragment.selection_set, id)?;
                result.extend(sub);
                // Pruned fragment fields rejoin the residual inline
                missing.extend(sub_missing);
            }
            ast::Selection::InlineFragment(fragment) => {
                let (sub, sub_missing) = diff_level(ctx, &fragment.selection_set, id)?;
                result.extend(sub);
                if !sub_missing.is_empty() {
                    let mut shell = fragment.as_ref().clone();
                    shell.selection_set = sub_missing;
                    missing.push(ast::Selection::InlineFragment(Node::new(shell)));
                }
            }
        }
    }

    Ok((result, missing))
}

fn pruned_field(field: &Node<ast::Field>, selections: Vec<ast::Selection>) -> ast::Selection {
    let mut pruned = field.as_ref().clone();
    pruned.selection_set = selections;
    ast::Selection::Field(Node::new(pruned))
}

/// Compose the residual document: the missing subtrees re-rooted under a
/// query operation that keeps the original operation's name and variable
/// definitions, plus any fragment definitions the subtrees still reference.
pub fn document_for_missing_selections(
    missing: &[SelectionSetWithRoot],
    name: Option<Name>,
    variable_definitions: &[Node<ast::VariableDefinition>],
    fragment_map: &FragmentMap,
) -> ast::Document {
    let mut selections: Vec<ast::Selection> = Vec::new();
    for item in missing {
        if item.id == ROOT_QUERY_ID {
            selections.extend(item.selection_set.iter().cloned());
        } else {
            selections.push(ast::Selection::InlineFragment(Node::new(ast::InlineFragment {
                type_condition: Some(item.type_name.clone()),
                directives: Default::default(),
                selection_set: item.selection_set.clone(),
            })));
        }
    }

    let mut spread_names: Vec<Name> = Vec::new();
    collect_spread_names(&selections, fragment_map, &mut spread_names);

    let operation = ast::OperationDefinition {
        operation_type: ast::OperationType::Query,
        name,
        variables: variable_definitions.to_vec(),
        directives: Default::default(),
        selection_set: selections,
    };
    let mut doc = ast::Document::new();
    doc.definitions.push(ast::Definition::OperationDefinition(Node::new(operation)));
    for spread_name in spread_names {
        if let Some(fragment) = fragment_map.get(&spread_name) {
            doc.definitions.push(ast::Definition::FragmentDefinition(fragment.clone()));
        }
    }
    doc
}

fn collect_spread_names(selections: &[ast::Selection], fragment_map: &FragmentMap, found: &mut Vec<Name>) {
    for selection in selections {
        match selection {
            ast::Selection::Field(field) => collect_spread_names(&field.selection_set, fragment_map, found),
            ast::Selection::InlineFragment(fragment) => collect_spread_names(&fragment.selection_set, fragment_map, found),
            ast::Selection::FragmentSpread(spread) => {
                if !found.contains(&spread.fragment_name) {
                    found.push(spread.fragment_name.clone());
                    if let Some(fragment) = fragment_map.get(&spread.fragment_name) {
                        collect_spread_names(&fragment.selection_set, fragment_map, found);
                    }
                }
            }
        }
    }
}
