use crate::builder::WhereRewriter;
use crate::directives::DirectiveIndex;
use crate::error::{CompilerError, CompilerResult};
use crate::graphql::Schema;
use crate::transpile::CypherCompiler;
use crate::traverse::Traverse;
use graphql_parser::query::{
    Definition, Document, FragmentDefinition, OperationDefinition, Text,
};
use itertools::Itertools;
use serde_json::Value;
use tracing::debug;

/// Selects the requested operation from a parsed document and compiles its
/// `root_field` top-level selection into Cypher. Fragment definitions are
/// collected into the traversal's fragments table; mutations and
/// subscriptions are rejected.
pub fn compile_operation<'q, 'a, T: Text<'a>>(
    document: &'q Document<'a, T>,
    operation_name: Option<&str>,
    root_field: &str,
    variables: &'q Value,
    schema: &Schema,
    index: &DirectiveIndex,
    rewriter: &'q dyn WhereRewriter,
) -> CompilerResult<String> {
    if !matches!(variables, Value::Object(_)) {
        return Err(CompilerError::operation("variables must be an object"));
    }

    let mut operation_defs: Vec<&OperationDefinition<T>> = vec![];
    let mut fragment_defs: Vec<&FragmentDefinition<T>> = vec![];
    for def in &document.definitions {
        match def {
            Definition::Operation(v) => operation_defs.push(v),
            Definition::Fragment(v) => fragment_defs.push(v),
        }
    }

    let operation_names: Vec<Option<String>> = operation_defs
        .iter()
        .map(|def| match def {
            OperationDefinition::Query(q) => q.name.as_ref().map(|x| x.as_ref().to_string()),
            OperationDefinition::Mutation(m) => m.name.as_ref().map(|x| x.as_ref().to_string()),
            _ => None,
        })
        .collect();

    if operation_names.iter().filter(|x| x.is_none()).count() >= 1 && operation_names.len() > 1 {
        return Err(CompilerError::operation(
            "Anonymous operations must be the only defined operation",
        ));
    }
    if operation_names.iter().unique().count() != operation_names.len() {
        return Err(CompilerError::operation("Operation names must be unique"));
    }

    let operation: &OperationDefinition<T> = operation_defs
        .iter()
        .zip(&operation_names)
        .find(|(_, name)| {
            name.as_deref() == operation_name
                || (operation_names.len() == 1 && operation_name.is_none())
        })
        .map(|(op, _)| *op)
        .ok_or_else(|| CompilerError::operation("Operation not found"))?;

    let variable_definitions = match operation {
        OperationDefinition::Query(q) => q.variable_definitions.as_slice(),
        _ => &[],
    };

    debug!(root_field, "compile.operation");
    let mut compiler =
        CypherCompiler::new(schema, index, variables, variable_definitions, rewriter);
    Traverse::new(root_field, &fragment_defs).walk(operation, &mut compiler)?;
    Ok(compiler.compile())
}
