//! Helpers for picking apart already-parsed operation documents.
//!
//! The manager never parses user input itself beyond round-tripping its own
//! residual queries; callers hand it `apollo_compiler::ast::Document` values
//! and these helpers extract the pieces the fetch and mutation paths need.

use apollo_compiler::{ast, Name, Node};
use indexmap::IndexMap;

#[cfg(test)]
use apollo_compiler::name;

use crate::error::DocumentError;

/// Name → definition lookup for every fragment in a document, derived once
/// and threaded through every read, write, and diff involving it.
pub type FragmentMap = IndexMap<Name, Node<ast::FragmentDefinition>>;

pub fn fragment_map(doc: &ast::Document) -> FragmentMap {
    doc.definitions
        .iter()
        .filter_map(|definition| match definition {
            ast::Definition::FragmentDefinition(fragment) => Some((fragment.name.clone(), fragment.clone())),
            _ => None,
        })
        .collect()
}

/// The single query operation of a document, or an error when the document
/// holds anything else at the operation level.
pub fn query_definition(doc: &ast::Document) -> Result<Node<ast::OperationDefinition>, DocumentError> {
    single_operation(doc, ast::OperationType::Query).ok_or(DocumentError::MissingOperation("query"))
}

/// The single mutation operation of a document.
pub fn mutation_definition(doc: &ast::Document) -> Result<Node<ast::OperationDefinition>, DocumentError> {
    single_operation(doc, ast::OperationType::Mutation).ok_or(DocumentError::MissingOperation("mutation"))
}

fn single_operation(doc: &ast::Document, kind: ast::OperationType) -> Option<Node<ast::OperationDefinition>> {
    let mut operations = doc.definitions.iter().filter_map(|definition| match definition {
        ast::Definition::OperationDefinition(operation) => Some(operation),
        _ => None,
    });
    match (operations.next(), operations.next()) {
        (Some(operation), None) if operation.operation_type == kind => Some(operation.clone()),
        _ => None,
    }
}

/// Replace the document's operation definition with a rewritten one,
/// leaving fragments and everything else untouched.
pub fn replace_operation(doc: &ast::Document, operation: Node<ast::OperationDefinition>) -> ast::Document {
    let mut out = doc.clone();
    if let Some(slot) = out.definitions.iter_mut().find(|definition| matches!(definition, ast::Definition::OperationDefinition(_))) {
        *slot = ast::Definition::OperationDefinition(operation);
    }
    out
}

/// Canonical printed form of a document; this exact text is what goes over
/// the wire and what the store records.
pub fn print(doc: &ast::Document) -> String { doc.serialize().no_indent().to_string() }

pub fn parse(source: &str) -> Result<ast::Document, DocumentError> {
    ast::Document::parse(source, "query.graphql").map_err(|e| DocumentError::Parse(e.to_string()))
}

/// The key under which a field's value appears in a result object.
pub fn response_key(field: &ast::Field) -> &Name { field.alias.as_ref().unwrap_or(&field.name) }
