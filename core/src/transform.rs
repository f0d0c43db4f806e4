//! Configuration-time operation rewriting.
//!
//! A manager may be configured with one [`QueryTransformer`]; it is applied
//! exactly once per fetch or mutation, to a copy of the operation, which is
//! then substituted back into the document. Transformers must not depend on
//! anything but the operation they are given.

use apollo_compiler::{ast, name, Node};

use crate::document;

pub trait QueryTransformer: Send + Sync {
    fn transform(&self, operation: &mut ast::OperationDefinition);

    /// Rewrite a named fragment's body. A fragment's selections live only at
    /// its definition, so this is where they get transformed; spread sites
    /// are left alone.
    fn transform_fragment(&self, _fragment: &mut ast::FragmentDefinition) {}
}

/// Run `transformer` over `operation` and every fragment definition, and
/// substitute the rewritten pieces back into `doc`. Returns the rewritten
/// document and operation.
pub fn apply_transformer(
    doc: &ast::Document,
    operation: &Node<ast::OperationDefinition>,
    transformer: &dyn QueryTransformer,
) -> (ast::Document, Node<ast::OperationDefinition>) {
    let mut rewritten = operation.as_ref().clone();
    transformer.transform(&mut rewritten);
    let rewritten = Node::new(rewritten);
    let mut out = document::replace_operation(doc, rewritten.clone());
    for definition in out.definitions.iter_mut() {
        if let ast::Definition::FragmentDefinition(fragment) = definition {
            transformer.transform_fragment(fragment.make_mut());
        }
    }
    (out, rewritten)
}

/// The canonical transformer: injects `__typename` into every non-empty
/// selection set, named fragment bodies included, so normalized writes
/// always record the concrete type of each object they store.
pub struct AddTypename;

impl QueryTransformer for AddTypename {
    fn transform(&self, operation: &mut ast::OperationDefinition) { add_typename_to_selections(&mut operation.selection_set); }

    fn transform_fragment(&self, fragment: &mut ast::FragmentDefinition) { add_typename_to_selections(&mut fragment.selection_set); }
}

fn add_typename_to_selections(selections: &mut Vec<ast::Selection>) {
    if selections.is_empty() {
        return;
    }
    let present = selections
        .iter()
        .any(|selection| matches!(selection, ast::Selection::Field(field) if field.alias.is_none() && field.name.as_str() == "__typename"));
    if !present {
        selections.push(ast::Selection::Field(Node::new(ast::Field {
            alias: None,
            name: name!("__typename"),
            arguments: vec![],
            directives: Default::default(),
            selection_set: vec![],
        })));
    }
    for selection in selections.iter_mut() {
        match selection {
            ast::Selection::Field(field) => add_typename_to_selections(&mut field.make_mut().selection_set),
            ast::Selection::InlineFragment(fragment) => add_typename_to_selections(&mut fragment.make_mut().selection_set),
            // Named fragments are rewritten where they are defined, not at each spread
            ast::Selection::FragmentSpread(_) => {}
        }
    }
}
