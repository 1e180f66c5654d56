use crate::constants::{args, filter};
use crate::error::{CompilerError, CompilerResult};
use crate::graphql::{self, Schema, TypeKind};
use crate::gson;
use crate::parser_util::{json_to_gson, to_filter_gson};
use crate::transpile::quote_literal;
use graphql_parser::query::{Text, Value, VariableDefinition};
use itertools::Itertools;
use std::str::FromStr;

/// Comparison operators recognized as `_<OPERATOR>` suffixes on filter keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparisonOp {
    Equals,
    Not,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Contains,
    NotContains,
    EndsWith,
    NotEndsWith,
    Matches,
    Includes,
}

impl FromStr for ComparisonOp {
    type Err = CompilerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "EQUALS" => Ok(Self::Equals),
            "NOT" => Ok(Self::Not),
            "GT" => Ok(Self::Gt),
            "GTE" => Ok(Self::Gte),
            "LT" => Ok(Self::Lt),
            "LTE" => Ok(Self::Lte),
            "IN" => Ok(Self::In),
            "NOT_IN" => Ok(Self::NotIn),
            "CONTAINS" => Ok(Self::Contains),
            "NOT_CONTAINS" => Ok(Self::NotContains),
            "ENDS_WITH" => Ok(Self::EndsWith),
            "NOT_ENDS_WITH" => Ok(Self::NotEndsWith),
            "MATCHES" => Ok(Self::Matches),
            "INCLUDES" => Ok(Self::Includes),
            _ => Err(CompilerError::unknown_operator(input)),
        }
    }
}

/// A node of the analyzed `where` filter.
///
/// One record with discriminator flags rather than a class hierarchy: a leaf
/// has empty `nested` and carries `operator`/`value`; an OR carries group
/// children; a traversal (relationship) condition carries the related type's
/// conditions in `nested`. `operator == None` is the default equality and is
/// what makes a leaf eligible for inline property-map emission.
#[derive(Clone, Debug, Default)]
pub struct Condition {
    pub parent_type: String,
    pub parent_property_name: String,
    pub property: String,
    pub operator: Option<ComparisonOp>,
    pub is_or: bool,
    pub is_group: bool,
    /// Lives on a related type reached through a relationship traversal;
    /// set on every condition nested under an object-typed filter key.
    pub is_relationship: bool,
    /// Leaf compares a relationship property (built under an `edge` key).
    pub is_rel_property: bool,
    /// Pre-serialized Cypher literal; `None` for non-leaf conditions.
    pub value: Option<String>,
    pub nested: Vec<Condition>,
}

impl Condition {
    pub fn is_leaf(&self) -> bool {
        self.nested.is_empty() && !self.is_group && !self.is_or
    }

    /// A relationship condition: not itself a group or OR, and its nested
    /// conditions are marked as living on the related type.
    pub fn is_traversal(&self) -> bool {
        !self.is_group
            && !self.is_or
            && self.nested.iter().any(|child| child.is_relationship)
    }
}

/// Builds condition trees from a query-AST `where` value.
pub fn conditions_from_ast<'a, T>(
    value: &Value<'a, T>,
    variables: &serde_json::Value,
    variable_definitions: &[VariableDefinition<'a, T>],
    parent_type: &str,
    parent_property_name: &str,
    schema: &Schema,
) -> CompilerResult<Vec<Condition>>
where
    T: Text<'a>,
{
    let gson_value = to_filter_gson(value, variables, variable_definitions)?;
    create_condition_trees(&gson_value, parent_type, parent_property_name, false, schema)
}

/// Builds condition trees from a deserialized runtime `where` object.
pub fn conditions_from_variable(
    value: &serde_json::Value,
    parent_type: &str,
    parent_property_name: &str,
    schema: &Schema,
) -> CompilerResult<Vec<Condition>> {
    let gson_value = json_to_gson(value)?;
    create_condition_trees(&gson_value, parent_type, parent_property_name, false, schema)
}

/// The shared tree builder both entry points normalize into.
pub fn create_condition_trees(
    value: &gson::Value,
    parent_type: &str,
    parent_property_name: &str,
    in_edge_context: bool,
    schema: &Schema,
) -> CompilerResult<Vec<Condition>> {
    let kv_map = match value {
        gson::Value::Object(kv) => kv,
        // Missing or malformed filters produce empty clauses.
        _ => return Ok(vec![]),
    };

    let mut conditions: Vec<Condition> = vec![];

    for (key, val) in kv_map {
        if val.is_absent() {
            continue;
        }

        if key == filter::AND {
            match val {
                gson::Value::Array(items) => {
                    for item in items {
                        conditions.extend(create_condition_trees(
                            item,
                            parent_type,
                            parent_property_name,
                            in_edge_context,
                            schema,
                        )?);
                    }
                }
                gson::Value::Object(_) => {
                    conditions.extend(create_condition_trees(
                        val,
                        parent_type,
                        parent_property_name,
                        in_edge_context,
                        schema,
                    )?);
                }
                _ => (),
            }
            continue;
        }

        if key == filter::OR {
            if let gson::Value::Array(items) = val {
                let mut groups: Vec<Condition> = vec![];
                for item in items {
                    let nested = create_condition_trees(
                        item,
                        parent_type,
                        parent_property_name,
                        in_edge_context,
                        schema,
                    )?;
                    if nested.is_empty() {
                        continue;
                    }
                    groups.push(Condition {
                        parent_type: parent_type.to_string(),
                        parent_property_name: parent_property_name.to_string(),
                        is_group: true,
                        nested,
                        ..Default::default()
                    });
                }
                if !groups.is_empty() {
                    conditions.push(Condition {
                        parent_type: parent_type.to_string(),
                        parent_property_name: parent_property_name.to_string(),
                        is_or: true,
                        nested: groups,
                        ..Default::default()
                    });
                }
            }
            continue;
        }

        if key == filter::NODE && graphql::is_connection_name(parent_property_name) {
            if let Some(node_type) = schema.connection_node_type(parent_type) {
                conditions.extend(create_condition_trees(
                    val,
                    node_type,
                    parent_property_name,
                    false,
                    schema,
                )?);
            }
            continue;
        }

        if key == filter::EDGE && graphql::is_connection_name(parent_property_name) {
            if let Some(edge_type) = schema.edge_type_name(parent_type) {
                conditions.extend(create_condition_trees(
                    val,
                    edge_type,
                    parent_property_name,
                    true,
                    schema,
                )?);
            }
            continue;
        }

        let (property, operator) = split_operator(key)?;
        let field = schema
            .field(parent_type, property)
            .ok_or_else(|| CompilerError::field_not_found(property, parent_type))?;
        let target = graphql::innermost_name(&field.field_type);

        match schema.type_kind(target) {
            TypeKind::Object(_) => {
                let mut nested =
                    create_condition_trees(val, target, property, false, schema)?;
                for child in &mut nested {
                    child.is_relationship = true;
                }
                conditions.push(Condition {
                    parent_type: parent_type.to_string(),
                    parent_property_name: parent_property_name.to_string(),
                    property: property.to_string(),
                    nested,
                    ..Default::default()
                });
            }
            _ => {
                conditions.push(Condition {
                    parent_type: parent_type.to_string(),
                    parent_property_name: parent_property_name.to_string(),
                    property: property.to_string(),
                    operator,
                    is_rel_property: in_edge_context,
                    value: Some(serialize_value(val)),
                    ..Default::default()
                });
            }
        }
    }

    Ok(conditions)
}

/// Splits `<field>[_<OPERATOR>]` on the first underscore. A suffix that is
/// not in the operator table is fatal.
fn split_operator(key: &str) -> CompilerResult<(&str, Option<ComparisonOp>)> {
    match key.split_once('_') {
        Some((property, suffix)) => Ok((property, Some(suffix.parse()?))),
        None => Ok((key, None)),
    }
}

/// Serializes a filter value into a Cypher literal. Strings and enums are
/// single-quoted, lists bracket their serialized items, parameter references
/// become `$name`, and date-shaped objects normalize to `'yyyy-MM-dd'`.
/// Everything else degrades to `null`.
pub fn serialize_value(value: &gson::Value) -> String {
    match value {
        gson::Value::Absent | gson::Value::Null => "null".to_string(),
        gson::Value::Boolean(x) => x.to_string(),
        gson::Value::Number(gson::Number::Integer(x)) => x.to_string(),
        gson::Value::Number(gson::Number::Float(x)) => x.to_string(),
        gson::Value::String(x) => quote_literal(x),
        gson::Value::Param(name) => format!("${}", name),
        gson::Value::Array(items) => {
            format!("[{}]", items.iter().map(serialize_value).join(", "))
        }
        gson::Value::Object(map) => match date_shape(map) {
            Some(date) => quote_literal(&date),
            None => "null".to_string(),
        },
    }
}

fn date_shape(map: &indexmap::IndexMap<String, gson::Value>) -> Option<String> {
    let year = map.get("year")?.as_i64()?;
    let month = map.get("month")?.as_i64()?;
    let day = map.get("day")?.as_i64()?;
    Some(format!("{:04}-{:02}-{:02}", year, month, day))
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_cypher(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SortEntry {
    pub key: String,
    pub direction: SortDirection,
}

/// The parsed `options` argument.
#[derive(Clone, Debug, Default)]
pub struct QueryOptions {
    pub sort: Vec<SortEntry>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// Reads `{ sort?: object | [object], offset?: int, limit?: int }`.
/// Unknown shapes degrade to the default.
pub fn read_options(value: &gson::Value) -> QueryOptions {
    let mut options = QueryOptions::default();
    let map = match value {
        gson::Value::Object(map) => map,
        _ => return options,
    };

    match map.get(args::SORT) {
        Some(gson::Value::Object(entries)) => push_sort_entries(entries, &mut options),
        Some(gson::Value::Array(items)) => {
            for item in items {
                if let gson::Value::Object(entries) = item {
                    push_sort_entries(entries, &mut options);
                }
            }
        }
        _ => (),
    }

    options.offset = map.get(args::OFFSET).and_then(|v| v.as_i64());
    options.limit = map.get(args::LIMIT).and_then(|v| v.as_i64());
    options
}

fn push_sort_entries(
    entries: &indexmap::IndexMap<String, gson::Value>,
    options: &mut QueryOptions,
) {
    for (key, dir) in entries {
        let direction = match dir.as_str() {
            Some("DESC") => SortDirection::Desc,
            _ => SortDirection::Asc,
        };
        options.sort.push(SortEntry {
            key: key.to_string(),
            direction,
        });
    }
}

/// Hook applied to a field's `where` argument before condition trees are
/// built. The tenant layer supplies a rewriter that AND-nests its predicate;
/// the base compiler passes arguments through untouched.
pub trait WhereRewriter {
    fn rewrite(
        &self,
        field_name: &str,
        target_type: &str,
        is_connection: bool,
        where_value: gson::Value,
        schema: &Schema,
    ) -> gson::Value;
}

pub struct PassthroughRewriter;

impl WhereRewriter for PassthroughRewriter {
    fn rewrite(
        &self,
        _field_name: &str,
        _target_type: &str,
        _is_connection: bool,
        where_value: gson::Value,
        _schema: &Schema,
    ) -> gson::Value {
        where_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SDL: &str = r#"
    type Query {
        baseAgreements(where: BaseAgreementWhere, options: QueryOptions): [Agreement]
    }

    type Agreement {
        id: ID!
        status: Status
        version: Int
        counterpartiesConnection: AgreementOrganizationConnection
    }

    type AgreementOrganizationConnection {
        edges: [AgreementOrganizationEdge]
            @relationship(type: HAS_PARTNER, direction: "OUT")
    }

    type AgreementOrganizationEdge {
        role: Role
        isApprovalRequired: Boolean
        node: Organization
    }

    type Organization {
        id: ID!
        name: String
    }

    enum Status {
        RUNNING_TEST
    }

    enum Role {
        BUYER_TEST
        SELLER_TEST
    }
    "#;

    fn schema() -> Schema {
        Schema::parse(SDL).unwrap()
    }

    #[test]
    fn leaf_conditions_serialize_values() {
        let schema = schema();
        let conds = conditions_from_variable(
            &json!({"status": "RUNNING_TEST", "version_GTE": 1}),
            "Agreement",
            "baseAgreements",
            &schema,
        )
        .unwrap();

        assert_eq!(conds.len(), 2);
        let status = conds.iter().find(|c| c.property == "status").unwrap();
        assert!(status.is_leaf());
        assert_eq!(status.operator, None);
        assert_eq!(status.value.as_deref(), Some("'RUNNING_TEST'"));

        let version = conds.iter().find(|c| c.property == "version").unwrap();
        assert_eq!(version.operator, Some(ComparisonOp::Gte));
        assert_eq!(version.value.as_deref(), Some("1"));
    }

    #[test]
    fn and_flattens_into_siblings() {
        let schema = schema();
        let conds = conditions_from_variable(
            &json!({"AND": [{"version_GTE": 0}, {"version_LTE": 10}]}),
            "Agreement",
            "baseAgreements",
            &schema,
        )
        .unwrap();
        assert_eq!(conds.len(), 2);
        assert!(conds.iter().all(|c| c.is_leaf()));

        let nested_form = conditions_from_variable(
            &json!({"AND": {"version_GTE": 0, "version_LTE": 10}}),
            "Agreement",
            "baseAgreements",
            &schema,
        )
        .unwrap();
        assert_eq!(nested_form.len(), 2);
    }

    #[test]
    fn or_produces_group_children() {
        let schema = schema();
        let conds = conditions_from_variable(
            &json!({"OR": [{"version": 1}, {"version": 2}]}),
            "Agreement",
            "baseAgreements",
            &schema,
        )
        .unwrap();
        assert_eq!(conds.len(), 1);
        let or = &conds[0];
        assert!(or.is_or);
        assert_eq!(or.nested.len(), 2);
        assert!(or.nested.iter().all(|g| g.is_group));
        assert!(or.nested.iter().all(|g| g.nested.len() == 1));
    }

    #[test]
    fn connection_filters_route_node_and_edge() {
        let schema = schema();
        let conds = conditions_from_variable(
            &json!({"counterpartiesConnection": {
                "edge": {"role": "BUYER_TEST"},
                "node": {"name": "Lads"}
            }}),
            "Agreement",
            "baseAgreements",
            &schema,
        )
        .unwrap();

        assert_eq!(conds.len(), 1);
        let traversal = &conds[0];
        assert!(traversal.is_traversal());
        assert_eq!(traversal.property, "counterpartiesConnection");
        assert_eq!(traversal.nested.len(), 2);
        assert!(traversal.nested.iter().all(|c| c.is_relationship));

        let role = traversal.nested.iter().find(|c| c.property == "role").unwrap();
        assert!(role.is_rel_property);
        assert_eq!(role.parent_type, "AgreementOrganizationEdge");

        let name = traversal.nested.iter().find(|c| c.property == "name").unwrap();
        assert!(!name.is_rel_property);
        assert_eq!(name.parent_type, "Organization");
        assert_eq!(name.parent_property_name, "counterpartiesConnection");
    }

    #[test]
    fn unknown_operator_is_fatal() {
        let schema = schema();
        let err = conditions_from_variable(
            &json!({"version_BETWEEN": 3}),
            "Agreement",
            "baseAgreements",
            &schema,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CompilerError::UnknownOperator { ref operator } if operator == "BETWEEN"
        ));
    }

    #[test]
    fn unknown_field_is_fatal() {
        let schema = schema();
        let err = conditions_from_variable(
            &json!({"nope": 1}),
            "Agreement",
            "baseAgreements",
            &schema,
        )
        .unwrap_err();
        assert!(matches!(err, CompilerError::FieldNotFound { .. }));
    }

    #[test]
    fn serializes_dates_lists_and_params() {
        assert_eq!(
            serialize_value(&gson::Value::Object(
                [
                    ("year".to_string(), gson::Value::Number(gson::Number::Integer(2024))),
                    ("month".to_string(), gson::Value::Number(gson::Number::Integer(3))),
                    ("day".to_string(), gson::Value::Number(gson::Number::Integer(7))),
                ]
                .into_iter()
                .collect()
            )),
            "'2024-03-07'"
        );
        assert_eq!(
            serialize_value(&gson::Value::Array(vec![
                gson::Value::String("a".to_string()),
                gson::Value::Number(gson::Number::Integer(2)),
            ])),
            "['a', 2]"
        );
        assert_eq!(
            serialize_value(&gson::Value::Param("cypherParams.tenantId".to_string())),
            "$cypherParams.tenantId"
        );
    }

    #[test]
    fn options_offset_and_limit_are_read_independently() {
        let options = read_options(
            &json_to_gson(&json!({"sort": [{"name": "DESC"}], "offset": 0, "limit": 0})).unwrap(),
        );
        assert_eq!(options.sort.len(), 1);
        assert_eq!(options.sort[0].key, "name");
        assert_eq!(options.sort[0].direction, SortDirection::Desc);
        assert_eq!(options.offset, Some(0));
        assert_eq!(options.limit, Some(0));
    }
}
