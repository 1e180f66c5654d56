use crate::builder::{
    create_condition_trees, read_options, ComparisonOp, Condition, WhereRewriter,
};
use crate::constants::{args, connection, introspection, params};
use crate::directives::{DirectiveIndex, RelationshipDirection, RelationshipDirective};
use crate::error::{CompilerError, CompilerResult};
use crate::graphql::{camel_case, innermost_name, is_connection_name, is_list_type, Schema, TypeKind};
use crate::gson;
use crate::parser_util::{alias_or_name, get_argument, to_filter_gson, to_gson};
use crate::traverse::{QueryVisitor, SelectionParent};
use graphql_parser::query::{
    Field as QueryField, InlineFragment, Text, TypeCondition, VariableDefinition,
};
use graphql_parser::schema::Field as SchemaField;
use itertools::Itertools;
use tracing::{debug, trace};

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Escapes a `@cypher` statement for embedding inside a double-quoted
/// `apoc.cypher.runFirstColumn` argument.
pub fn escape_statement(statement: &str) -> String {
    statement.replace('\\', "\\\\").replace('"', "\\\"")
}

/// How a directive-driven field closes its emission.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Comprehension {
    None,
    Single,
    List,
}

/// A pending emission unit. Tokens accumulate while a subtree is walked and
/// collapse into their parent's map projection when the selection set closes.
#[derive(Debug)]
struct Token {
    level: i32,
    value: Vec<String>,
}

/// One existential chain derived from a relationship condition: the ordered
/// traversal hops plus whether the path crossed an OR branch.
struct ExistentialPath<'c> {
    hops: Vec<&'c Condition>,
    contains_or: bool,
}

struct HopInfo<'s> {
    rel_type: &'s str,
    direction: RelationshipDirection,
    target: &'s str,
}

/// The Cypher emitter. One instance compiles one query; it is constructed
/// with the schema, directive index, and runtime variables, driven by
/// [`crate::traverse::Traverse`], and consumed by [`CypherCompiler::compile`].
pub struct CypherCompiler<'q, 'a, 's, T: Text<'a>> {
    schema: &'s Schema,
    index: &'s DirectiveIndex,
    variables: &'q serde_json::Value,
    variable_definitions: &'q [VariableDefinition<'a, T>],
    rewriter: &'q dyn WhereRewriter,
    type_path: Vec<&'s str>,
    field_path: Vec<&'s SchemaField<'static, String>>,
    field_node_path: Vec<&'q QueryField<'a, T>>,
    comprehension_path: Vec<Comprehension>,
    // (type_path depth at push, type name); active only while the depth holds
    inline_type_overrides: Vec<(usize, &'q str)>,
    level: i32,
    buffer: Vec<String>,
    token_buffer: Vec<Token>,
}

impl<'q, 'a, 's, T: Text<'a>> CypherCompiler<'q, 'a, 's, T> {
    pub fn new(
        schema: &'s Schema,
        index: &'s DirectiveIndex,
        variables: &'q serde_json::Value,
        variable_definitions: &'q [VariableDefinition<'a, T>],
        rewriter: &'q dyn WhereRewriter,
    ) -> Self {
        CypherCompiler {
            schema,
            index,
            variables,
            variable_definitions,
            rewriter,
            type_path: vec!["Query"],
            field_path: vec![],
            field_node_path: vec![],
            comprehension_path: vec![],
            inline_type_overrides: vec![],
            level: -1,
            buffer: vec![],
            token_buffer: vec![],
        }
    }

    /// Flushes pending tokens and returns the assembled Cypher.
    pub fn compile(mut self) -> String {
        for token in std::mem::take(&mut self.token_buffer) {
            let payload = token.value.join(" ");
            if !payload.is_empty() {
                self.buffer.push(payload);
            }
        }
        let cypher = self.buffer.join(" ");
        trace!(cypher = %cypher, "compile.flush");
        cypher
    }

    fn current_type_name(&self) -> &str {
        if let Some((depth, name)) = self.inline_type_overrides.last() {
            if *depth == self.type_path.len() {
                return name;
            }
        }
        self.type_path.last().copied().unwrap_or("Query")
    }

    fn push_token_value(&mut self, piece: String) {
        if let Some(token) = self.token_buffer.last_mut() {
            token.value.push(piece);
        }
    }

    /// The most recent enclosing field that is neither `node` nor a
    /// connection wrapper, as (level, schema field). The entity variable it
    /// bound is `camelCase(target) + level`.
    fn closest_node_frame(&self) -> Option<(usize, &'s SchemaField<'static, String>)> {
        let upper = self.field_path.len().saturating_sub(1);
        for i in (0..upper).rev() {
            let field = self.field_path[i];
            let name = field.name.as_str();
            if name == connection::NODE || is_connection_name(name) {
                continue;
            }
            return Some((i, field));
        }
        None
    }

    fn closest_node_var(&self) -> String {
        match self.closest_node_frame() {
            Some((level, field)) => {
                let target = self.schema.target_node_type(field.name.as_str(), field);
                format!("{}{}", camel_case(target), level)
            }
            None => match self.field_path.first() {
                Some(field) => {
                    let target = self.schema.target_node_type(field.name.as_str(), field);
                    format!("{}0", camel_case(target))
                }
                None => String::new(),
            },
        }
    }

    fn closest_node_level(&self) -> usize {
        self.closest_node_frame().map(|(level, _)| level).unwrap_or(0)
    }

    /// Conditions for a field's `where` argument, tenant-rewritten. The tree
    /// parent is the raw target type so connection `node`/`edge` keys route.
    fn field_conditions(
        &self,
        field: &'q QueryField<'a, T>,
        property_name: &str,
        tree_parent_type: &str,
        node_target_type: &str,
    ) -> CompilerResult<Vec<Condition>> {
        let where_value = match get_argument(field, args::WHERE) {
            Some(value) => to_filter_gson(value, self.variables, self.variable_definitions)?,
            None => gson::Value::Absent,
        };
        let rewritten = self.rewriter.rewrite(
            property_name,
            node_target_type,
            is_connection_name(tree_parent_type),
            where_value,
            self.schema,
        );
        create_condition_trees(&rewritten, tree_parent_type, property_name, false, self.schema)
    }

    /// Top-level `MATCH … RETURN …` (or `UNWIND` for `@cypher` roots).
    fn top_level_expression(
        &mut self,
        field: &'q QueryField<'a, T>,
        schema_field: &'s SchemaField<'static, String>,
        cypher_statement: Option<&str>,
    ) -> CompilerResult<()> {
        let field_name = field.name.as_ref();
        let target_raw = innermost_name(&schema_field.field_type);
        let target = self.schema.target_node_type(field_name, schema_field);
        let var = format!("{}0", camel_case(target));
        debug!(field = field_name, target = target, "compile.root");

        if let Some(statement) = cypher_statement {
            self.buffer.push(format!(
                "UNWIND apoc.cypher.runFirstColumn(\"{}\", {{{params}: ${params}}}) AS {} RETURN {}",
                escape_statement(statement),
                var,
                var,
                params = params::CYPHER_PARAMS
            ));
            return Ok(());
        }

        let conditions = self.field_conditions(field, field_name, target_raw, target)?;
        let inline = inline_property_map(&conditions, false);
        let where_clause = self.synthesize_where(&conditions, 0)?;

        match inline.is_empty() {
            true => self.buffer.push(format!("MATCH ({}:{})", var, target)),
            false => self
                .buffer
                .push(format!("MATCH ({}:{} {})", var, target, inline)),
        }
        if !where_clause.is_empty() {
            self.buffer.push(where_clause);
        }
        self.buffer.push(format!("RETURN {}", var));
        Ok(())
    }

    /// Relationship-driven list comprehension. For an `edges` field the
    /// enclosing connection field names the relationship variable and
    /// carries the `where` argument, and edges themselves are projected.
    fn relationship_comprehension(
        &self,
        field: &'q QueryField<'a, T>,
        schema_field: &'s SchemaField<'static, String>,
        rel: &RelationshipDirective,
        alias: &str,
    ) -> CompilerResult<String> {
        let field_name = field.name.as_ref();
        let is_edges = field_name == connection::EDGES;
        let frames_back = if is_edges { 3 } else { 2 };
        let src_type = self.type_path[self.type_path.len() - frames_back];
        let src_var = format!("{}{}", camel_case(src_type), self.closest_node_level());
        let level = self.level;

        let target = self.schema.target_node_type(field_name, schema_field);
        let target_var = format!("{}{}", camel_case(target), level);

        let conditions = if is_edges {
            let connection_type = self.type_path[self.type_path.len() - 2];
            let connection_field = self.field_node_path[self.field_node_path.len() - 2];
            let prop_name = connection_field.name.as_ref();
            self.field_conditions(connection_field, prop_name, connection_type, target)?
        } else {
            self.field_conditions(field, field_name, target, target)?
        };

        let prop_name = if is_edges {
            self.field_node_path[self.field_node_path.len() - 2]
                .name
                .as_ref()
        } else {
            field_name
        };
        let rel_var = format!("rel_{}{}", prop_name, level);

        let rel_props = inline_property_map(&conditions, true);
        let node_props = inline_property_map(&conditions, false);
        let where_clause = self.synthesize_where(&conditions, level)?;

        let (lhs, rhs) = arrows(rel.direction);
        let yielded = if is_edges { &rel_var } else { &target_var };

        let rel_pattern = match rel_props.is_empty() {
            true => format!("[{}:{}]", rel_var, rel.rel_type),
            false => format!("[{}:{} {}]", rel_var, rel.rel_type, rel_props),
        };
        let node_pattern = match node_props.is_empty() {
            true => format!("({}:{})", target_var, target),
            false => format!("({}:{} {})", target_var, target, node_props),
        };

        let mut out = format!(
            "{}: [({}){}{}{}{}",
            alias, src_var, lhs, rel_pattern, rhs, node_pattern
        );
        if !where_clause.is_empty() {
            out.push(' ');
            out.push_str(&where_clause);
        }
        out.push_str(" | ");
        out.push_str(yielded);
        Ok(out)
    }

    /// Synthesizes a `WHERE …` clause for one scope: existentials for the
    /// relationship conditions (each condition's OR-crossing paths joined
    /// with `OR` in their own bracket), then the remaining non-relationship
    /// predicates AND-joined. Returns the empty string when nothing was
    /// produced.
    fn synthesize_where(&self, conditions: &[Condition], level: i32) -> CompilerResult<String> {
        let mut clauses: Vec<String> = vec![];

        for condition in conditions {
            if !condition.is_traversal() {
                continue;
            }
            // disjunction stays local to the condition that forked it
            let mut or_clauses: Vec<String> = vec![];
            for path in enumerate_paths(condition) {
                let clause = self.render_existential(&path, level)?;
                if clause.is_empty() {
                    continue;
                }
                match path.contains_or {
                    true => or_clauses.push(clause),
                    false => clauses.push(clause),
                }
            }
            if !or_clauses.is_empty() {
                clauses.push(format!("({})", or_clauses.join(" OR ")));
            }
        }

        for condition in conditions {
            if condition.is_traversal() {
                continue;
            }
            if let Some(clause) = self.render_scope_condition(condition, level, true)? {
                clauses.push(clause);
            }
        }

        match clauses.is_empty() {
            true => Ok(String::new()),
            false => Ok(format!("WHERE {}", clauses.join(" AND "))),
        }
    }

    /// Renders a non-traversal condition at scope level. Inline-eligible
    /// leaves (default equality on a scalar literal) are skipped when the
    /// scope consumed them into a property map.
    fn render_scope_condition(
        &self,
        condition: &Condition,
        level: i32,
        allow_inline: bool,
    ) -> CompilerResult<Option<String>> {
        if condition.is_leaf() {
            // a valueless leaf is an object filter that produced nothing
            if condition.value.is_none() {
                return Ok(None);
            }
            if allow_inline && inlines_into_pattern(condition) {
                return Ok(None);
            }
            let accessor = scope_accessor(condition, level);
            return Ok(Some(render_predicate(&accessor, condition)));
        }

        if condition.is_or {
            let mut branches: Vec<String> = vec![];
            for group in &condition.nested {
                if let Some(clause) = self.render_scope_condition(group, level, false)? {
                    branches.push(clause);
                }
            }
            if branches.is_empty() {
                return Ok(None);
            }
            return Ok(Some(format!("({})", branches.join(" OR "))));
        }

        if condition.is_group {
            let mut parts: Vec<String> = vec![];
            for child in &condition.nested {
                if child.is_traversal() {
                    let mut or_parts: Vec<String> = vec![];
                    for path in enumerate_paths(child) {
                        let clause = self.render_existential(&path, level)?;
                        if clause.is_empty() {
                            continue;
                        }
                        match path.contains_or {
                            true => or_parts.push(clause),
                            false => parts.push(clause),
                        }
                    }
                    if !or_parts.is_empty() {
                        parts.push(format!("({})", or_parts.join(" OR ")));
                    }
                } else if let Some(clause) = self.render_scope_condition(child, level, false)? {
                    parts.push(clause);
                }
            }
            if parts.is_empty() {
                return Ok(None);
            }
            return Ok(Some(format!("({})", parts.join(" AND "))));
        }

        Ok(None)
    }

    /// Renders one existential chain, choosing the fast inline-map form when
    /// every hop's subtree is operator-free and the slow subquery form
    /// otherwise.
    fn render_existential(&self, path: &ExistentialPath, level: i32) -> CompilerResult<String> {
        let mut resolved: Vec<HopInfo> = vec![];
        for hop in &path.hops {
            match self.resolve_hop(hop)? {
                Some(info) => resolved.push(info),
                // No relationship directive to traverse: no predicate.
                None => return Ok(String::new()),
            }
        }

        let scope_var = match path.hops.first() {
            Some(first) => format!("{}{}", camel_case(&first.parent_type), level),
            None => return Ok(String::new()),
        };

        let fast = path.hops.iter().all(|hop| qualifies_fast(hop));
        match fast {
            true => Ok(self.render_fast_existential(path, &resolved, &scope_var)),
            false => self.render_slow_existential(path, &resolved, &scope_var, level),
        }
    }

    fn render_fast_existential(
        &self,
        path: &ExistentialPath,
        resolved: &[HopInfo],
        scope_var: &str,
    ) -> String {
        let mut pattern = format!("({})", scope_var);
        for (hop, info) in path.hops.iter().zip(resolved) {
            let rel_props = inline_property_map(&hop.nested, true);
            let node_props = inline_property_map(&hop.nested, false);
            let (lhs, rhs) = arrows(info.direction);
            let rel_pattern = match rel_props.is_empty() {
                true => format!("[:{}]", info.rel_type),
                false => format!("[:{} {}]", info.rel_type, rel_props),
            };
            let node_pattern = match node_props.is_empty() {
                true => format!("(:{})", info.target),
                false => format!("(:{} {})", info.target, node_props),
            };
            pattern.push_str(&format!("{}{}{}{}", lhs, rel_pattern, rhs, node_pattern));
        }
        format!("exists({})", pattern)
    }

    fn render_slow_existential(
        &self,
        path: &ExistentialPath,
        resolved: &[HopInfo],
        scope_var: &str,
        level: i32,
    ) -> CompilerResult<String> {
        let mut pattern = format!("({})", scope_var);
        let mut predicates: Vec<String> = vec![];

        for (i, (hop, info)) in path.hops.iter().zip(resolved).enumerate() {
            // group/OR conditions do not advance the chain index
            let index = i + 1;
            let rel_var = format!("rel_{}{}_{}", hop.property, level, index);
            let node_var = format!("{}{}_{}", camel_case(info.target), level, index);
            let (lhs, rhs) = arrows(info.direction);
            pattern.push_str(&format!(
                "{}[{}:{}]{}({}:{})",
                lhs, rel_var, info.rel_type, rhs, node_var, info.target
            ));
            predicates.extend(self.hop_predicates(hop, level, index)?);
        }

        match predicates.is_empty() {
            true => Ok(format!("exists {{ MATCH {} }}", pattern)),
            false => Ok(format!(
                "exists {{ MATCH {} WHERE {} }}",
                pattern,
                predicates.join(" AND ")
            )),
        }
    }

    /// Property predicates attached to one hop of an existential chain,
    /// addressed through the hop's `_<index>`-suffixed variables.
    fn hop_predicates(
        &self,
        hop: &Condition,
        level: i32,
        index: usize,
    ) -> CompilerResult<Vec<String>> {
        let mut out: Vec<String> = vec![];
        for child in &hop.nested {
            if child.is_traversal() {
                // emitted as a later hop of the chain (or as a sibling path)
                continue;
            }
            if child.is_leaf() {
                if child.value.is_none() {
                    continue;
                }
                let accessor = chain_accessor(child, level, index);
                out.push(render_predicate(&accessor, child));
                continue;
            }
            if child.is_or {
                let mut branches: Vec<String> = vec![];
                for group in &child.nested {
                    let parts = self.hop_predicates(group, level, index)?;
                    if !parts.is_empty() {
                        branches.push(format!("({})", parts.join(" AND ")));
                    }
                }
                if !branches.is_empty() {
                    out.push(format!("({})", branches.join(" OR ")));
                }
                continue;
            }
            if child.is_group {
                let parts = self.hop_predicates(child, level, index)?;
                if !parts.is_empty() {
                    out.push(format!("({})", parts.join(" AND ")));
                }
            }
        }
        Ok(out)
    }

    /// Resolves a traversal condition to its edge label, direction, and
    /// target node type. Connections take the directive from their `edges`
    /// field; plain relationship fields carry it themselves.
    fn resolve_hop(&self, hop: &Condition) -> CompilerResult<Option<HopInfo<'s>>> {
        let schema = self.schema;
        let index = self.index;
        let field = schema
            .field(&hop.parent_type, &hop.property)
            .ok_or_else(|| CompilerError::field_not_found(&hop.property, &hop.parent_type))?;
        let raw = innermost_name(&field.field_type);

        let (rel, target) = match is_connection_name(raw) {
            true => (
                index.relationship(raw, connection::EDGES),
                schema.connection_node_type(raw),
            ),
            false => (
                index.relationship(&hop.parent_type, &hop.property),
                Some(raw),
            ),
        };

        Ok(match (rel, target) {
            (Some(rel), Some(target)) => Some(HopInfo {
                rel_type: &rel.rel_type,
                direction: rel.direction,
                target,
            }),
            _ => None,
        })
    }

    /// `ORDER BY` / `SKIP` / `LIMIT` from the root field's `options`
    /// argument. `SKIP 0` is emitted when `offset` is explicitly zero; a
    /// zero `limit` emits nothing.
    fn options_clause(&mut self, field: &'q QueryField<'a, T>) -> CompilerResult<()> {
        let options_value = match get_argument(field, args::OPTIONS) {
            Some(value) => to_gson(value, self.variables, self.variable_definitions)?,
            None => gson::Value::Absent,
        };
        let options = read_options(&options_value);
        if options.sort.is_empty() && options.offset.is_none() && options.limit.is_none() {
            return Ok(());
        }

        let var = match self.field_path.first() {
            Some(root) => {
                let target = self.schema.target_node_type(root.name.as_str(), root);
                format!("{}0", camel_case(target))
            }
            None => return Ok(()),
        };

        if !options.sort.is_empty() {
            let entries = options
                .sort
                .iter()
                .map(|entry| format!("{}.{} {}", var, entry.key, entry.direction.as_cypher()))
                .join(", ");
            self.buffer.push(format!("ORDER BY {}", entries));
        }
        if let Some(offset) = options.offset {
            self.buffer.push(format!("SKIP {}", offset));
        }
        if let Some(limit) = options.limit {
            if limit != 0 {
                self.buffer.push(format!("LIMIT {}", limit));
            }
        }
        Ok(())
    }
}

impl<'q, 'a, 's, T: Text<'a>> QueryVisitor<'q, 'a, T> for CypherCompiler<'q, 'a, 's, T> {
    fn visit_field(&mut self, field: &'q QueryField<'a, T>) -> CompilerResult<bool> {
        self.level += 1;
        self.token_buffer.push(Token {
            level: self.level,
            value: vec![],
        });

        let alias = alias_or_name(field);
        let field_name = field.name.as_ref();

        if field_name == introspection::TYPENAME {
            let type_name = self.current_type_name().to_string();
            self.push_token_value(format!("{}: {}", alias, quote_literal(&type_name)));
            return Ok(true);
        }

        let schema = self.schema;
        let index = self.index;
        let parent_type_name = self.current_type_name().to_string();
        let schema_field = schema
            .field(&parent_type_name, field_name)
            .ok_or_else(|| CompilerError::field_not_found(field_name, &parent_type_name))?;
        let target_name = innermost_name(&schema_field.field_type);

        self.field_path.push(schema_field);
        self.field_node_path.push(field);
        self.comprehension_path.push(Comprehension::None);
        self.type_path.push(target_name);

        let cypher_dir = index.cypher(&parent_type_name, field_name);
        let rel_dir = index.relationship(&parent_type_name, field_name);

        if self.level == 0 {
            let statement = cypher_dir.map(|c| c.statement.as_str());
            self.top_level_expression(field, schema_field, statement)?;
            return Ok(false);
        }

        match schema.type_kind(target_name) {
            TypeKind::Scalar | TypeKind::Enum(_) => {
                match cypher_dir {
                    Some(cypher) => {
                        let this_var = self.closest_node_var();
                        let suffix = match is_list_type(&schema_field.field_type) {
                            true => "",
                            false => "[0]",
                        };
                        self.push_token_value(format!(
                            "{}: apoc.cypher.runFirstColumn(\"{}\", {{this: {}, {params}: ${params}}}){}",
                            alias,
                            escape_statement(&cypher.statement),
                            this_var,
                            suffix,
                            params = params::CYPHER_PARAMS
                        ));
                    }
                    None => {
                        self.push_token_value(format!("{}: .{}", alias, field_name));
                    }
                }
                Ok(false)
            }
            TypeKind::Object(_) => {
                if cypher_dir.is_none() && rel_dir.is_none() {
                    if field_name == connection::NODE {
                        let node_var = self.closest_node_var();
                        self.push_token_value(format!("{}: {}", alias, node_var));
                        return Ok(false);
                    }
                    if !is_connection_name(target_name) {
                        self.push_token_value(format!("{}: null", alias));
                        return Ok(true);
                    }
                    // connection wrapper: children populate the projection
                    self.push_token_value(format!("{}:", alias));
                    return Ok(false);
                }

                let flag = match is_list_type(&schema_field.field_type) {
                    true => Comprehension::List,
                    false => Comprehension::Single,
                };
                if let Some(slot) = self.comprehension_path.last_mut() {
                    *slot = flag;
                }

                if let Some(cypher) = cypher_dir {
                    let this_var = self.closest_node_var();
                    let target_var = format!("{}{}", camel_case(target_name), self.level);
                    self.push_token_value(format!(
                        "{}: [{} IN apoc.cypher.runFirstColumn(\"{}\", {{this: {}, {params}: ${params}}}) | {}",
                        alias,
                        target_var,
                        escape_statement(&cypher.statement),
                        this_var,
                        target_var,
                        params = params::CYPHER_PARAMS
                    ));
                } else if let Some(rel) = rel_dir {
                    let piece = self.relationship_comprehension(field, schema_field, rel, &alias)?;
                    self.push_token_value(piece);
                }
                Ok(false)
            }
        }
    }

    fn visit_end_field(&mut self, field: &'q QueryField<'a, T>) -> CompilerResult<()> {
        if field.name.as_ref() == introspection::TYPENAME {
            self.level -= 1;
            return Ok(());
        }

        if self.level == 0 {
            self.options_clause(field)?;
        }

        let flag = self.comprehension_path.pop().unwrap_or(Comprehension::None);
        if self.level > 0 {
            match flag {
                Comprehension::List => self.push_token_value("]".to_string()),
                Comprehension::Single => self.push_token_value("][0]".to_string()),
                Comprehension::None => (),
            }
        }

        self.field_path.pop();
        self.field_node_path.pop();
        self.type_path.pop();
        self.level -= 1;
        Ok(())
    }

    fn visit_inline_fragment(&mut self, fragment: &'q InlineFragment<'a, T>) -> CompilerResult<()> {
        match &fragment.type_condition {
            Some(TypeCondition::On(name)) => {
                self.inline_type_overrides
                    .push((self.type_path.len(), name.as_ref()));
                Ok(())
            }
            None => Err(CompilerError::MissingTypeCondition),
        }
    }

    fn visit_end_inline_fragment(&mut self) {
        self.inline_type_overrides.pop();
    }

    fn visit_end_selection_set(&mut self, parent: SelectionParent) -> CompilerResult<()> {
        match parent {
            SelectionParent::Operation
            | SelectionParent::InlineFragment
            | SelectionParent::FragmentDefinition => return Ok(()),
            SelectionParent::Field => (),
        }
        if self.level < 0 {
            return Ok(());
        }

        let level = self.level;
        let mut children: Vec<Token> = vec![];
        let mut remaining: Vec<Token> = vec![];
        for token in self.token_buffer.drain(..) {
            match token.level > level {
                true => children.push(token),
                false => remaining.push(token),
            }
        }
        self.token_buffer = remaining;

        let entries: Vec<String> = children
            .iter()
            .map(|token| token.value.join(" "))
            .filter(|payload| !payload.is_empty())
            .collect();
        if entries.is_empty() {
            return Ok(());
        }
        let projection = format!("{{ {} }}", entries.join(", "));

        match level == 0 {
            true => self.buffer.push(projection),
            false => self.push_token_value(projection),
        }
        Ok(())
    }
}

fn arrows(direction: RelationshipDirection) -> (&'static str, &'static str) {
    match direction {
        RelationshipDirection::Out => ("-", "->"),
        RelationshipDirection::In => ("<-", "-"),
    }
}

/// Inline `{k: v, …}` map of a scope's default-equality scalar leaves,
/// split by node vs relationship side. Empty string when nothing inlines.
fn inline_property_map(conditions: &[Condition], rel_side: bool) -> String {
    let entries: Vec<String> = conditions
        .iter()
        .filter(|c| c.is_leaf() && c.operator.is_none() && c.is_rel_property == rel_side)
        .filter_map(|c| {
            c.value
                .as_ref()
                .filter(|v| is_scalar_literal(v))
                .map(|v| format!("{}: {}", c.property, v))
        })
        .collect();
    match entries.is_empty() {
        true => String::new(),
        false => format!("{{{}}}", entries.join(", ")),
    }
}

fn inlines_into_pattern(condition: &Condition) -> bool {
    condition.operator.is_none()
        && condition
            .value
            .as_ref()
            .map(|v| is_scalar_literal(v))
            .unwrap_or(false)
}

fn is_scalar_literal(value: &str) -> bool {
    !value.starts_with('[') && value != "null"
}

fn scope_accessor(condition: &Condition, level: i32) -> String {
    match condition.is_rel_property {
        true => format!("rel_{}{}", condition.parent_property_name, level),
        false => format!("{}{}", camel_case(&condition.parent_type), level),
    }
}

fn chain_accessor(condition: &Condition, level: i32, index: usize) -> String {
    match condition.is_rel_property {
        true => format!("rel_{}{}_{}", condition.parent_property_name, level, index),
        false => format!("{}{}_{}", camel_case(&condition.parent_type), level, index),
    }
}

/// Maps a leaf condition's operator to its Cypher emission.
fn render_predicate(accessor: &str, condition: &Condition) -> String {
    let access = format!("{}.{}", accessor, condition.property);
    let value = condition.value.as_deref().unwrap_or("null");
    match condition.operator {
        None | Some(ComparisonOp::Equals) => format!("{} = {}", access, value),
        Some(ComparisonOp::Not) => format!("{} <> {}", access, value),
        Some(ComparisonOp::Gt) => format!("{} > {}", access, value),
        Some(ComparisonOp::Gte) => format!("{} >= {}", access, value),
        Some(ComparisonOp::Lt) => format!("{} < {}", access, value),
        Some(ComparisonOp::Lte) => format!("{} <= {}", access, value),
        Some(ComparisonOp::In) => format!("{} IN {}", access, value),
        Some(ComparisonOp::NotIn) => format!("NOT ( {} IN {} )", access, value),
        Some(ComparisonOp::Contains) => format!("{} CONTAINS {}", access, value),
        Some(ComparisonOp::NotContains) => format!("NOT ( {} CONTAINS {} )", access, value),
        Some(ComparisonOp::EndsWith) => format!("{} ENDS WITH {}", access, value),
        Some(ComparisonOp::NotEndsWith) => format!("NOT ( {} ENDS WITH {} )", access, value),
        Some(ComparisonOp::Matches) => format!("{} =~ {}", access, value),
        Some(ComparisonOp::Includes) => format!("{} IN {}", value, access),
    }
}

/// A hop qualifies for the fast inline-map existential only when its whole
/// subtree is operator-free and OR-free; anything else needs the subquery
/// form's explicit `WHERE`.
fn qualifies_fast(condition: &Condition) -> bool {
    condition.nested.iter().all(|child| {
        if child.is_or {
            return false;
        }
        if child.is_leaf() {
            return child.operator.is_none();
        }
        qualifies_fast(child)
    })
}

/// Depth-first enumeration of existential chains under a relationship
/// condition. Traversals nested through group/OR wrappers fork the path;
/// crossing an OR marks every path it forked.
fn enumerate_paths(root: &Condition) -> Vec<ExistentialPath<'_>> {
    let mut out = vec![];
    let mut prefix = vec![root];
    collect_paths(root, &mut prefix, false, &mut out);
    out
}

fn collect_paths<'c>(
    condition: &'c Condition,
    prefix: &mut Vec<&'c Condition>,
    has_or: bool,
    out: &mut Vec<ExistentialPath<'c>>,
) {
    let continuations = traversal_children(condition);
    if continuations.is_empty() {
        out.push(ExistentialPath {
            hops: prefix.clone(),
            contains_or: has_or,
        });
        return;
    }
    for (child, through_or) in continuations {
        prefix.push(child);
        collect_paths(child, prefix, has_or || through_or, out);
        prefix.pop();
    }
}

fn traversal_children(condition: &Condition) -> Vec<(&Condition, bool)> {
    let mut out = vec![];
    for child in &condition.nested {
        if child.is_traversal() {
            out.push((child, false));
        } else if child.is_group {
            out.extend(traversal_children(child));
        } else if child.is_or {
            for branch in &child.nested {
                for (sub, _) in traversal_children(branch) {
                    out.push((sub, true));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_and_escapes_literals() {
        assert_eq!(quote_literal("Lads"), "'Lads'");
        assert_eq!(quote_literal("it's"), r"'it\'s'");
        assert_eq!(
            escape_statement(r#"RETURN "x""#),
            r#"RETURN \"x\""#
        );
    }

    fn leaf(property: &str, operator: Option<ComparisonOp>, value: &str) -> Condition {
        Condition {
            parent_type: "Agreement".to_string(),
            parent_property_name: "baseAgreements".to_string(),
            property: property.to_string(),
            operator,
            value: Some(value.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn predicate_emission_table() {
        let cases = [
            (None, "agreement0.version = 1"),
            (Some(ComparisonOp::Not), "agreement0.version <> 1"),
            (Some(ComparisonOp::Gt), "agreement0.version > 1"),
            (Some(ComparisonOp::Gte), "agreement0.version >= 1"),
            (Some(ComparisonOp::Lt), "agreement0.version < 1"),
            (Some(ComparisonOp::Lte), "agreement0.version <= 1"),
            (Some(ComparisonOp::In), "agreement0.version IN 1"),
            (Some(ComparisonOp::NotIn), "NOT ( agreement0.version IN 1 )"),
            (Some(ComparisonOp::Contains), "agreement0.version CONTAINS 1"),
            (
                Some(ComparisonOp::NotContains),
                "NOT ( agreement0.version CONTAINS 1 )",
            ),
            (
                Some(ComparisonOp::EndsWith),
                "agreement0.version ENDS WITH 1",
            ),
            (
                Some(ComparisonOp::NotEndsWith),
                "NOT ( agreement0.version ENDS WITH 1 )",
            ),
            (Some(ComparisonOp::Matches), "agreement0.version =~ 1"),
            (Some(ComparisonOp::Includes), "1 IN agreement0.version"),
        ];
        for (operator, expected) in cases {
            let condition = leaf("version", operator, "1");
            assert_eq!(
                render_predicate(&scope_accessor(&condition, 0), &condition),
                expected
            );
        }
    }

    #[test]
    fn inline_map_takes_default_equality_scalars_only() {
        let conditions = vec![
            leaf("status", None, "'RUNNING_TEST'"),
            leaf("version", Some(ComparisonOp::Gte), "0"),
            leaf("roles", None, "['A', 'B']"),
        ];
        assert_eq!(
            inline_property_map(&conditions, false),
            "{status: 'RUNNING_TEST'}"
        );
        assert_eq!(inline_property_map(&conditions, true), "");
    }

    #[test]
    fn fast_qualification_rejects_operators_and_or() {
        let mut hop = Condition {
            parent_type: "Agreement".to_string(),
            property: "counterpartiesConnection".to_string(),
            nested: vec![leaf("role", None, "'BUYER_TEST'")],
            ..Default::default()
        };
        assert!(qualifies_fast(&hop));

        hop.nested.push(leaf("role", Some(ComparisonOp::In), "['X']"));
        assert!(!qualifies_fast(&hop));
    }
}
