//! GraphQL-to-Cypher compiler for Neo4j-family labeled property graphs.
//!
//! A query document (nested field sets, fragments, arguments, and a
//! `where`/`options` filter DSL) is compiled into a single Cypher string,
//! driven by an SDL schema whose fields carry `@cypher(statement: …)` and
//! `@relationship(type, direction)` directives. Execution, result shaping,
//! and tenancy-context derivation are the caller's concern.
//!
//! ```no_run
//! use neo_graphql::{compile_query, DirectiveIndex, Schema};
//!
//! let sdl = r#"
//! type Query { movies(where: MovieWhere): [Movie] }
//! type Movie { id: ID! title: String }
//! "#;
//! let schema = Schema::parse(sdl)?;
//! let index = DirectiveIndex::build(&schema);
//! let cypher = compile_query(
//!     &schema,
//!     &index,
//!     "{ movies(where: { title: \"Arrival\" }) { id title } }",
//!     "movies",
//!     None,
//!     &serde_json::json!({}),
//! )?;
//! # Ok::<(), neo_graphql::CompilerError>(())
//! ```

use graphql_parser::parse_query;

pub mod builder;
pub mod constants;
pub mod directives;
pub mod error;
pub mod graphql;
pub mod gson;
pub mod parser_util;
pub mod resolve;
pub mod tenant;
pub mod transpile;
pub mod traverse;

pub use builder::{Condition, PassthroughRewriter, WhereRewriter};
pub use directives::{load_directive_index, DirectiveIndex};
pub use error::{CompilerError, CompilerResult};
pub use graphql::Schema;
pub use tenant::TenantScope;
pub use transpile::CypherCompiler;
pub use traverse::Traverse;

/// Parses and compiles one query's `root_field` with the base compiler.
pub fn compile_query(
    schema: &Schema,
    index: &DirectiveIndex,
    query: &str,
    root_field: &str,
    operation_name: Option<&str>,
    variables: &serde_json::Value,
) -> CompilerResult<String> {
    let document = parse_query::<String>(query)?;
    resolve::compile_operation(
        &document,
        operation_name,
        root_field,
        variables,
        schema,
        index,
        &PassthroughRewriter,
    )
}

/// Parses and compiles one query's `root_field` with tenant scoping: every
/// field whose target type declares `tenantId`/`tenantIds` is filtered to
/// `$cypherParams.tenantId`.
pub fn compile_query_scoped(
    schema: &Schema,
    index: &DirectiveIndex,
    query: &str,
    root_field: &str,
    operation_name: Option<&str>,
    variables: &serde_json::Value,
) -> CompilerResult<String> {
    let document = parse_query::<String>(query)?;
    resolve::compile_operation(
        &document,
        operation_name,
        root_field,
        variables,
        schema,
        index,
        &TenantScope,
    )
}
