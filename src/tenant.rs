use crate::builder::WhereRewriter;
use crate::constants::{filter, tenant};
use crate::graphql::Schema;
use crate::gson;
use indexmap::IndexMap;

/// Rewrites `where` arguments so every field whose target type carries a
/// tenant discriminator is scoped to `$cypherParams.tenantId`. Fields on the
/// exempt list and the `FlexEntity` type pass through untouched.
///
/// The injector does not inspect the existing filter for prior tenant
/// predicates; it nests exactly one predicate per field occurrence, with the
/// caller's `where` kept as the first operand of the AND.
pub struct TenantScope;

fn tenant_predicate(discriminator: &str) -> gson::Value {
    let mut map = IndexMap::new();
    map.insert(
        discriminator.to_string(),
        gson::Value::Param(tenant::CYPHER_PARAMS_TENANT_ID.to_string()),
    );
    gson::Value::Object(map)
}

impl WhereRewriter for TenantScope {
    fn rewrite(
        &self,
        field_name: &str,
        target_type: &str,
        is_connection: bool,
        where_value: gson::Value,
        schema: &Schema,
    ) -> gson::Value {
        if tenant::EXEMPT_FIELDS.contains(&field_name) || target_type == tenant::FLEX_ENTITY {
            return where_value;
        }

        let discriminator = if schema.field(target_type, tenant::TENANT_ID).is_some() {
            tenant::TENANT_ID
        } else if schema.field(target_type, tenant::TENANT_IDS).is_some() {
            tenant::TENANT_IDS_INCLUDES
        } else {
            return where_value;
        };

        let mut predicate = tenant_predicate(discriminator);
        if is_connection {
            let mut wrapper = IndexMap::new();
            wrapper.insert(filter::NODE.to_string(), predicate);
            predicate = gson::Value::Object(wrapper);
        }

        match where_value {
            gson::Value::Absent | gson::Value::Null => predicate,
            existing => {
                let mut map = IndexMap::new();
                map.insert(
                    filter::AND.to_string(),
                    gson::Value::Array(vec![existing, predicate]),
                );
                gson::Value::Object(map)
            }
        }
    }
}
