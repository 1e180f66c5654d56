use crate::error::{CompilerError, CompilerResult};
use graphql_parser::query::{
    Field, FragmentDefinition, InlineFragment, OperationDefinition, Selection, Text,
};
use std::collections::HashMap;

/// The kind of node owning a selection set, passed to the visitor when the
/// set opens and closes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionParent {
    Operation,
    Field,
    InlineFragment,
    FragmentDefinition,
}

/// Callbacks driven by [`Traverse::walk`]. `visit_field` returning `true`
/// marks the field as fully handled: its selection set is not descended.
pub trait QueryVisitor<'q, 'a, T: Text<'a>> {
    fn visit_field(&mut self, field: &'q Field<'a, T>) -> CompilerResult<bool>;
    fn visit_end_field(&mut self, field: &'q Field<'a, T>) -> CompilerResult<()>;
    fn visit_inline_fragment(&mut self, fragment: &'q InlineFragment<'a, T>) -> CompilerResult<()>;
    fn visit_end_inline_fragment(&mut self);
    fn visit_selection_set(&mut self, _parent: SelectionParent) {}
    fn visit_end_selection_set(&mut self, parent: SelectionParent) -> CompilerResult<()>;
}

/// Depth-first walk over one operation. Fragment spreads are resolved
/// through the fragments table and walked in place, without selection-set
/// bracketing, so their fields fold into the enclosing field's projection.
pub struct Traverse<'q, 'a, T: Text<'a>> {
    root_field: String,
    fragments: HashMap<&'q str, &'q FragmentDefinition<'a, T>>,
}

impl<'q, 'a, T: Text<'a>> Traverse<'q, 'a, T> {
    pub fn new(
        root_field: impl Into<String>,
        fragment_definitions: &[&'q FragmentDefinition<'a, T>],
    ) -> Self {
        let fragments = fragment_definitions
            .iter()
            .map(|def| (def.name.as_ref(), *def))
            .collect();
        Traverse {
            root_field: root_field.into(),
            fragments,
        }
    }

    /// Walks the operation, restricting the root selection set to the
    /// configured root field. One top-level field is compiled per call.
    pub fn walk<V>(
        &self,
        operation: &'q OperationDefinition<'a, T>,
        visitor: &mut V,
    ) -> CompilerResult<()>
    where
        V: QueryVisitor<'q, 'a, T>,
    {
        let selection_set = match operation {
            OperationDefinition::Query(query) => &query.selection_set,
            OperationDefinition::SelectionSet(selection_set) => selection_set,
            OperationDefinition::Mutation(_) => {
                return Err(CompilerError::unsupported_operation(
                    "only read operations are compiled",
                ))
            }
            OperationDefinition::Subscription(_) => {
                return Err(CompilerError::unsupported_operation(
                    "subscriptions are not compiled",
                ))
            }
        };

        visitor.visit_selection_set(SelectionParent::Operation);
        for selection in &selection_set.items {
            if let Selection::Field(field) = selection {
                if field.name.as_ref() == self.root_field {
                    self.walk_selection(selection, visitor)?;
                }
            }
        }
        visitor.visit_end_selection_set(SelectionParent::Operation)
    }

    fn walk_selection<V>(
        &self,
        selection: &'q Selection<'a, T>,
        visitor: &mut V,
    ) -> CompilerResult<()>
    where
        V: QueryVisitor<'q, 'a, T>,
    {
        match selection {
            Selection::Field(field) => {
                let handled = visitor.visit_field(field)?;
                if !handled && !field.selection_set.items.is_empty() {
                    visitor.visit_selection_set(SelectionParent::Field);
                    for item in &field.selection_set.items {
                        self.walk_selection(item, visitor)?;
                    }
                    visitor.visit_end_selection_set(SelectionParent::Field)?;
                }
                visitor.visit_end_field(field)
            }
            Selection::InlineFragment(fragment) => {
                visitor.visit_inline_fragment(fragment)?;
                visitor.visit_selection_set(SelectionParent::InlineFragment);
                for item in &fragment.selection_set.items {
                    self.walk_selection(item, visitor)?;
                }
                visitor.visit_end_selection_set(SelectionParent::InlineFragment)?;
                visitor.visit_end_inline_fragment();
                Ok(())
            }
            Selection::FragmentSpread(spread) => {
                let name = spread.fragment_name.as_ref();
                let fragment = self
                    .fragments
                    .get(name)
                    .ok_or_else(|| CompilerError::UnknownFragment {
                        name: name.to_string(),
                    })?;
                for item in &fragment.selection_set.items {
                    self.walk_selection(item, visitor)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphql_parser::parse_query;
    use graphql_parser::query::{Definition, Document};

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl<'q, 'a, T: Text<'a>> QueryVisitor<'q, 'a, T> for Recorder {
        fn visit_field(&mut self, field: &'q Field<'a, T>) -> CompilerResult<bool> {
            self.events.push(format!("field:{}", field.name.as_ref()));
            Ok(false)
        }

        fn visit_end_field(&mut self, field: &'q Field<'a, T>) -> CompilerResult<()> {
            self.events.push(format!("end_field:{}", field.name.as_ref()));
            Ok(())
        }

        fn visit_inline_fragment(
            &mut self,
            _fragment: &'q InlineFragment<'a, T>,
        ) -> CompilerResult<()> {
            self.events.push("inline".to_string());
            Ok(())
        }

        fn visit_end_inline_fragment(&mut self) {
            self.events.push("end_inline".to_string());
        }

        fn visit_end_selection_set(&mut self, _parent: SelectionParent) -> CompilerResult<()> {
            Ok(())
        }
    }

    fn walk(query: &str, root: &str) -> Vec<String> {
        let document: Document<&str> = parse_query(query).unwrap();
        let mut operations = vec![];
        let mut fragments = vec![];
        for def in &document.definitions {
            match def {
                Definition::Operation(op) => operations.push(op),
                Definition::Fragment(frag) => fragments.push(frag),
            }
        }
        let mut recorder = Recorder::default();
        Traverse::new(root, &fragments)
            .walk(operations[0], &mut recorder)
            .unwrap();
        recorder.events
    }

    #[test]
    fn restricts_root_selection_to_root_field() {
        let events = walk("{ a { x } b { y } }", "b");
        assert_eq!(
            events,
            vec!["field:b", "field:y", "end_field:y", "end_field:b"]
        );
    }

    #[test]
    fn fragment_spreads_walk_in_place() {
        let events = walk(
            "query { a { ...parts } } fragment parts on A { x y }",
            "a",
        );
        assert_eq!(
            events,
            vec![
                "field:a",
                "field:x",
                "end_field:x",
                "field:y",
                "end_field:y",
                "end_field:a"
            ]
        );
    }

    #[test]
    fn inline_fragments_are_bracketed() {
        let events = walk("{ a { ... on A { x } } }", "a");
        assert_eq!(
            events,
            vec![
                "field:a",
                "inline",
                "field:x",
                "end_field:x",
                "end_inline",
                "end_field:a"
            ]
        );
    }

    #[test]
    fn unknown_fragment_is_fatal() {
        let document: Document<&str> = parse_query("{ a { ...ghost } }").unwrap();
        let op = match &document.definitions[0] {
            Definition::Operation(op) => op,
            _ => unreachable!(),
        };
        let mut recorder = Recorder::default();
        let err = Traverse::new("a", &[]).walk(op, &mut recorder).unwrap_err();
        assert!(matches!(err, CompilerError::UnknownFragment { .. }));
    }
}
