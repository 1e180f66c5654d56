use crate::constants::connection;
use graphql_parser::parse_schema;
use graphql_parser::schema::{
    Definition, Document, EnumType, Field, ObjectType, Type, TypeDefinition,
};
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{CompilerError, CompilerResult};

lazy_static! {
    static ref CONNECTION_SUFFIX_RE: Regex = Regex::new("Connection$").unwrap();
}

/// True when a field or type name carries the relay-style connection suffix.
pub fn is_connection_name(name: &str) -> bool {
    CONNECTION_SUFFIX_RE.is_match(name)
}

/// AccountHolder => accountHolder
pub fn camel_case(token: &str) -> String {
    if token.is_empty() {
        return String::new();
    }
    token[0..1].to_lowercase() + &token[1..]
}

/// Innermost named type, unwrapping list and non-null wrappers.
pub fn innermost_name<'t>(ty: &'t Type<'static, String>) -> &'t str {
    match ty {
        Type::NamedType(name) => name,
        Type::ListType(inner) => innermost_name(inner),
        Type::NonNullType(inner) => innermost_name(inner),
    }
}

/// True when the type is a list, unwrapping nullability only.
pub fn is_list_type(ty: &Type<'static, String>) -> bool {
    match ty {
        Type::NamedType(_) => false,
        Type::ListType(_) => true,
        Type::NonNullType(inner) => is_list_type(inner),
    }
}

/// Classification of a field's target type.
pub enum TypeKind<'s> {
    Object(&'s ObjectType<'static, String>),
    Enum(&'s EnumType<'static, String>),
    Scalar,
}

/// The SDL schema that drives compilation. Wraps the parsed document and
/// resolves names to type definitions; validation is assumed to have already
/// happened upstream.
pub struct Schema {
    document: Document<'static, String>,
}

impl Schema {
    pub fn new(document: Document<'static, String>) -> Self {
        Schema { document }
    }

    pub fn parse(sdl: &str) -> CompilerResult<Self> {
        let document = parse_schema::<String>(sdl)
            .map_err(|err| CompilerError::SchemaParse(err.to_string()))?
            .into_static();
        Ok(Schema { document })
    }

    pub fn document(&self) -> &Document<'static, String> {
        &self.document
    }

    pub fn object_types(&self) -> impl Iterator<Item = &ObjectType<'static, String>> {
        self.document.definitions.iter().filter_map(|def| match def {
            Definition::TypeDefinition(TypeDefinition::Object(obj)) => Some(obj),
            _ => None,
        })
    }

    pub fn object_type(&self, name: &str) -> Option<&ObjectType<'static, String>> {
        self.object_types().find(|obj| obj.name == name)
    }

    pub fn enum_type(&self, name: &str) -> Option<&EnumType<'static, String>> {
        self.document.definitions.iter().find_map(|def| match def {
            Definition::TypeDefinition(TypeDefinition::Enum(e)) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Looks up a field on an object type.
    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&Field<'static, String>> {
        self.object_type(type_name)?
            .fields
            .iter()
            .find(|f| f.name == field_name)
    }

    /// Classifies a named type. Anything that is neither an object nor an
    /// enum definition is treated as a scalar, built-ins included.
    pub fn type_kind(&self, name: &str) -> TypeKind<'_> {
        if let Some(obj) = self.object_type(name) {
            return TypeKind::Object(obj);
        }
        if let Some(e) = self.enum_type(name) {
            return TypeKind::Enum(e);
        }
        TypeKind::Scalar
    }

    /// The element type of a connection's `edges` list.
    pub fn edge_type_name(&self, connection_type: &str) -> Option<&str> {
        let edges = self.field(connection_type, connection::EDGES)?;
        Some(innermost_name(&edges.field_type))
    }

    /// The node type reached through a connection's `edges.node` chain.
    pub fn connection_node_type(&self, connection_type: &str) -> Option<&str> {
        let edge = self.edge_type_name(connection_type)?;
        let node = self.field(edge, connection::NODE)?;
        Some(innermost_name(&node.field_type))
    }

    /// The entity type a field ultimately projects, unwrapping the
    /// connection envelope (`…Connection` → `edges` → `node`) when present.
    /// For an `edges` field the edge's `node` target is returned.
    pub fn target_node_type<'s>(
        &'s self,
        field_name: &str,
        field: &'s Field<'static, String>,
    ) -> &'s str {
        let target = innermost_name(&field.field_type);
        if is_connection_name(target) {
            if let Some(node) = self.connection_node_type(target) {
                return node;
            }
        } else if field_name == connection::EDGES {
            if let Some(node) = self.field(target, connection::NODE) {
                return innermost_name(&node.field_type);
            }
        }
        target
    }
}
