use crate::error::{CompilerError, CompilerResult};
use crate::gson;
use graphql_parser::query::{Field, Text, Value, VariableDefinition};
use indexmap::IndexMap;

pub fn alias_or_name<'a, T>(query_field: &Field<'a, T>) -> String
where
    T: Text<'a>,
{
    query_field
        .alias
        .as_ref()
        .map(|x| x.as_ref().to_string())
        .unwrap_or_else(|| query_field.name.as_ref().to_string())
}

pub fn get_argument<'q, 'a, T>(
    query_field: &'q Field<'a, T>,
    arg_name: &str,
) -> Option<&'q Value<'a, T>>
where
    T: Text<'a>,
{
    query_field
        .arguments
        .iter()
        .find(|(name, _)| name.as_ref() == arg_name)
        .map(|(_, value)| value)
}

pub fn json_to_gson(val: &serde_json::Value) -> CompilerResult<gson::Value> {
    let result = match val {
        serde_json::Value::Null => gson::Value::Null,
        serde_json::Value::Bool(x) => gson::Value::Boolean(*x),
        serde_json::Value::Number(x) => {
            if let Some(num) = x.as_i64() {
                gson::Value::Number(gson::Number::Integer(num))
            } else if let Some(num) = x.as_f64() {
                gson::Value::Number(gson::Number::Float(num))
            } else {
                return Err(CompilerError::operation("Invalid numeric input"));
            }
        }
        serde_json::Value::String(x) => gson::Value::String(x.to_owned()),
        serde_json::Value::Array(x_arr) => {
            let mut out_arr: Vec<gson::Value> = vec![];
            for x in x_arr {
                out_arr.push(json_to_gson(x)?);
            }
            gson::Value::Array(out_arr)
        }
        serde_json::Value::Object(obj) => {
            let mut out_map: IndexMap<String, gson::Value> = IndexMap::new();
            for (key, json_val) in obj.iter() {
                out_map.insert(key.to_string(), json_to_gson(json_val)?);
            }
            gson::Value::Object(out_map)
        }
    };
    Ok(result)
}

/// Converts a query AST value to gson, resolving variables to their runtime
/// values (falling back to variable-definition defaults). Used for the
/// `options` argument, where structure is always needed.
pub fn to_gson<'a, T>(
    graphql_value: &Value<'a, T>,
    variables: &serde_json::Value,
    variable_definitions: &[VariableDefinition<'a, T>],
) -> CompilerResult<gson::Value>
where
    T: Text<'a>,
{
    let result = match graphql_value {
        Value::Null => gson::Value::Null,
        Value::Boolean(x) => gson::Value::Boolean(*x),
        Value::Int(x) => match x.as_i64() {
            Some(num) => gson::Value::Number(gson::Number::Integer(num)),
            None => return Err(CompilerError::operation("Invalid Int input")),
        },
        Value::Float(x) => gson::Value::Number(gson::Number::Float(*x)),
        Value::String(x) => gson::Value::String(x.to_owned()),
        Value::Enum(x) => gson::Value::String(x.as_ref().to_string()),
        Value::List(x_arr) => {
            let mut out_arr: Vec<gson::Value> = vec![];
            for x in x_arr {
                out_arr.push(to_gson(x, variables, variable_definitions)?);
            }
            gson::Value::Array(out_arr)
        }
        Value::Object(obj) => {
            let mut out_map: IndexMap<String, gson::Value> = IndexMap::new();
            for (key, graphql_val) in obj.iter() {
                out_map.insert(
                    key.as_ref().to_string(),
                    to_gson(graphql_val, variables, variable_definitions)?,
                );
            }
            gson::Value::Object(out_map)
        }
        Value::Variable(var_name) => match variables.get(var_name.as_ref()) {
            Some(x) => json_to_gson(x)?,
            None => match variable_default(var_name.as_ref(), variable_definitions) {
                Some(default) => to_gson(default, variables, variable_definitions)?,
                None => gson::Value::Absent,
            },
        },
    };
    Ok(result)
}

/// Converts a query AST value to gson for filter analysis. Object- and
/// list-valued variables are resolved structurally (the analyzer needs their
/// shape); scalar-position variables stay symbolic as `Param` so the driver
/// binds them at execution time.
pub fn to_filter_gson<'a, T>(
    graphql_value: &Value<'a, T>,
    variables: &serde_json::Value,
    variable_definitions: &[VariableDefinition<'a, T>],
) -> CompilerResult<gson::Value>
where
    T: Text<'a>,
{
    let result = match graphql_value {
        Value::Variable(var_name) => match variables.get(var_name.as_ref()) {
            Some(runtime @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
                json_to_gson(runtime)?
            }
            Some(_) => gson::Value::Param(var_name.as_ref().to_string()),
            None => match variable_default(var_name.as_ref(), variable_definitions) {
                Some(default) => to_filter_gson(default, variables, variable_definitions)?,
                None => gson::Value::Param(var_name.as_ref().to_string()),
            },
        },
        Value::List(x_arr) => {
            let mut out_arr: Vec<gson::Value> = vec![];
            for x in x_arr {
                out_arr.push(to_filter_gson(x, variables, variable_definitions)?);
            }
            gson::Value::Array(out_arr)
        }
        Value::Object(obj) => {
            let mut out_map: IndexMap<String, gson::Value> = IndexMap::new();
            for (key, graphql_val) in obj.iter() {
                out_map.insert(
                    key.as_ref().to_string(),
                    to_filter_gson(graphql_val, variables, variable_definitions)?,
                );
            }
            gson::Value::Object(out_map)
        }
        other => to_gson(other, variables, variable_definitions)?,
    };
    Ok(result)
}

fn variable_default<'q, 'a, T>(
    var_name: &str,
    variable_definitions: &'q [VariableDefinition<'a, T>],
) -> Option<&'q Value<'a, T>>
where
    T: Text<'a>,
{
    variable_definitions
        .iter()
        .find(|var_def| var_def.name.as_ref() == var_name)
        .and_then(|x| x.default_value.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphql_parser::parse_query;
    use graphql_parser::query::{Definition, Document, OperationDefinition, Query, Selection};
    use serde_json::json;

    fn first_query<'q, 'a>(doc: &'q Document<'a, String>) -> &'q Query<'a, String> {
        doc.definitions
            .iter()
            .find_map(|d| match d {
                Definition::Operation(OperationDefinition::Query(q)) => Some(q),
                _ => None,
            })
            .unwrap()
    }

    fn argument_value<'q, 'a>(doc: &'q Document<'a, String>, arg: &str) -> &'q Value<'a, String> {
        let field = first_query(doc)
            .selection_set
            .items
            .iter()
            .find_map(|s| match s {
                Selection::Field(f) => Some(f),
                _ => None,
            })
            .unwrap();
        get_argument(field, arg).unwrap()
    }

    #[test]
    fn scalar_variables_stay_symbolic_in_filters() {
        let doc =
            parse_query::<String>("query ($n: String) { things(where: { name: $n }) { id } }")
                .unwrap();
        let value = argument_value(&doc, "where");
        let gson_val = to_filter_gson(value, &json!({"n": "x"}), &[]).unwrap();
        match gson_val {
            gson::Value::Object(map) => {
                assert_eq!(map.get("name"), Some(&gson::Value::Param("n".to_string())));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn object_variables_resolve_structurally() {
        let doc =
            parse_query::<String>("query ($w: ThingWhere) { things(where: $w) { id } }").unwrap();
        let value = argument_value(&doc, "where");
        let gson_val = to_filter_gson(value, &json!({"w": {"name": "Lads"}}), &[]).unwrap();
        match gson_val {
            gson::Value::Object(map) => {
                assert_eq!(
                    map.get("name"),
                    Some(&gson::Value::String("Lads".to_string()))
                );
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn missing_variables_fall_back_to_defaults() {
        let doc = parse_query::<String>(
            "query ($first: Int = 10) { things(options: { limit: $first }) { id } }",
        )
        .unwrap();
        let value = argument_value(&doc, "options");
        let variable_definitions = &first_query(&doc).variable_definitions;
        let gson_val = to_gson(value, &json!({}), variable_definitions).unwrap();
        match gson_val {
            gson::Value::Object(map) => {
                assert_eq!(map.get("limit").and_then(|v| v.as_i64()), Some(10));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }
}
