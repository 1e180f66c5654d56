use crate::constants::directives;
use crate::graphql::Schema;
use cached::proc_macro::cached;
use cached::SizedCache;
use graphql_parser::schema::Value;
use indexmap::IndexMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A `@cypher(statement: "…")` directive.
#[derive(Clone, Debug, PartialEq)]
pub struct CypherDirective {
    pub statement: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RelationshipDirection {
    In,
    Out,
}

/// A `@relationship(type: EDGE_LABEL, direction: "IN" | "OUT")` directive.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationshipDirective {
    pub rel_type: String,
    pub direction: RelationshipDirection,
}

/// Directives attached to a single schema field. At most one of each kind is
/// recognized; later duplicates are ignored.
#[derive(Clone, Debug, Default)]
pub struct FieldDirectives {
    pub cypher: Option<CypherDirective>,
    pub relationship: Option<RelationshipDirective>,
}

/// Static lookup from `"{TypeName}.{FieldName}"` to the directives attached
/// to that field. Built once per schema; missing keys behave as empty.
#[derive(Debug, Default)]
pub struct DirectiveIndex {
    entries: IndexMap<String, FieldDirectives>,
}

fn string_argument(arguments: &[(String, Value<'static, String>)], name: &str) -> Option<String> {
    arguments.iter().find(|(k, _)| k == name).and_then(|(_, v)| match v {
        Value::String(s) => Some(s.clone()),
        Value::Enum(s) => Some(s.clone()),
        _ => None,
    })
}

impl DirectiveIndex {
    pub fn build(schema: &Schema) -> DirectiveIndex {
        let mut entries: IndexMap<String, FieldDirectives> = IndexMap::new();

        for obj in schema.object_types() {
            for field in &obj.fields {
                let mut parsed = FieldDirectives::default();
                for directive in &field.directives {
                    match directive.name.as_str() {
                        directives::CYPHER if parsed.cypher.is_none() => {
                            if let Some(statement) =
                                string_argument(&directive.arguments, directives::STATEMENT)
                            {
                                parsed.cypher = Some(CypherDirective { statement });
                            }
                        }
                        directives::RELATIONSHIP if parsed.relationship.is_none() => {
                            let rel_type =
                                string_argument(&directive.arguments, directives::TYPE);
                            let direction =
                                string_argument(&directive.arguments, directives::DIRECTION);
                            if let (Some(rel_type), Some(direction)) = (rel_type, direction) {
                                let direction = match direction.as_str() {
                                    directives::DIRECTION_IN => RelationshipDirection::In,
                                    directives::DIRECTION_OUT => RelationshipDirection::Out,
                                    // malformed directions traverse outward
                                    _ => RelationshipDirection::Out,
                                };
                                parsed.relationship =
                                    Some(RelationshipDirective { rel_type, direction });
                            }
                        }
                        _ => (),
                    }
                }
                if parsed.cypher.is_some() || parsed.relationship.is_some() {
                    entries.insert(format!("{}.{}", obj.name, field.name), parsed);
                }
            }
        }

        DirectiveIndex { entries }
    }

    pub fn cypher(&self, type_name: &str, field_name: &str) -> Option<&CypherDirective> {
        self.entries
            .get(&format!("{}.{}", type_name, field_name))
            .and_then(|d| d.cypher.as_ref())
    }

    pub fn relationship(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Option<&RelationshipDirective> {
        self.entries
            .get(&format!("{}.{}", type_name, field_name))
            .and_then(|d| d.relationship.as_ref())
    }
}

pub fn calculate_hash<T: Hash>(t: &T) -> u64 {
    let mut s = DefaultHasher::new();
    t.hash(&mut s);
    s.finish()
}

/// Process-wide memoized directive index, keyed by SDL content. The index is
/// immutable and freely shareable across threads.
#[cached(
    type = "SizedCache<u64, Result<Arc<DirectiveIndex>, String>>",
    create = "{ SizedCache::with_size(250) }",
    convert = r#"{ calculate_hash(&sdl) }"#,
    sync_writes = true
)]
pub fn load_directive_index(sdl: &str) -> Result<Arc<DirectiveIndex>, String> {
    let schema = Schema::parse(sdl).map_err(|e| e.to_string())?;
    Ok(Arc::new(DirectiveIndex::build(&schema)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDL: &str = r#"
    type Query {
        agreements: [Agreement]
    }

    type Agreement {
        id: ID!
        partnerCount: Int
            @cypher(statement: "MATCH (this)-[:HAS_PARTNER]->(o) RETURN count(o)")
        partners: [Organization]
            @relationship(type: HAS_PARTNER, direction: "OUT")
        owner: Organization
            @relationship(type: OWNS, direction: "IN")
    }

    type Organization {
        id: ID!
    }
    "#;

    #[test]
    fn indexes_cypher_and_relationship_directives() {
        let schema = Schema::parse(SDL).unwrap();
        let index = DirectiveIndex::build(&schema);

        let cypher = index.cypher("Agreement", "partnerCount").unwrap();
        assert!(cypher.statement.starts_with("MATCH (this)"));

        let rel = index.relationship("Agreement", "partners").unwrap();
        assert_eq!(rel.rel_type, "HAS_PARTNER");
        assert_eq!(rel.direction, RelationshipDirection::Out);

        let owner = index.relationship("Agreement", "owner").unwrap();
        assert_eq!(owner.direction, RelationshipDirection::In);
    }

    #[test]
    fn missing_keys_are_empty() {
        let schema = Schema::parse(SDL).unwrap();
        let index = DirectiveIndex::build(&schema);
        assert!(index.cypher("Agreement", "id").is_none());
        assert!(index.relationship("Organization", "id").is_none());
        assert!(index.cypher("Nope", "nothing").is_none());
    }

    #[test]
    fn cached_loader_is_stable() {
        let a = load_directive_index(SDL).unwrap();
        let b = load_directive_index(SDL).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
