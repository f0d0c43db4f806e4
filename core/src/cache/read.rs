//! Cache reads: the same walk as the diff planner, demanding completeness
//! unless the caller opted into partial data.

use apollo_compiler::{ast, name};
use serde_json::Value;

use crate::{
    cache::{
        diff::{diff_selection_set_against_store, StoreDiff},
        NormalizedCache,
    },
    document::{self, FragmentMap},
    error::CacheError,
    types::{Variables, ROOT_QUERY_ID},
};

pub fn read_selection_set_from_store(
    store: &NormalizedCache,
    root_id: &str,
    selection_set: &[ast::Selection],
    variables: Option<&Variables>,
    fragment_map: &FragmentMap,
    return_partial_data: bool,
) -> Result<Value, CacheError> {
    let ctx = StoreDiff { store, variables, fragment_map, throw_on_missing_field: !return_partial_data };
    let out = diff_selection_set_against_store(&ctx, selection_set, root_id, &name!("Query"))?;
    Ok(out.result)
}

/// Read a whole query document against the cache, failing on any missing
/// field.
pub fn read_query_from_store(store: &NormalizedCache, doc: &ast::Document, variables: Option<&Variables>) -> Result<Value, CacheError> {
    let operation = document::query_definition(doc)?;
    let fragments = document::fragment_map(doc);
    read_selection_set_from_store(store, ROOT_QUERY_ID, &operation.selection_set, variables, &fragments, false)
}
