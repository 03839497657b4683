use indexmap::IndexMap;

use crate::value::Value;

/// Handle to a scope owned by a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Default)]
struct Scope {
    variables: IndexMap<String, Value>,
    parent: Option<ScopeId>,
}

/// All variable scopes of one page.
///
/// A scope's parent is fixed when it is created and always refers to an
/// earlier scope, so chains are acyclic. Reads walk up the chain; writes
/// only ever touch the scope they are addressed to.
#[derive(Debug, Default)]
pub struct Scopes {
    scopes: Vec<Scope>,
}

impl Scopes {
    pub fn create(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            variables: IndexMap::new(),
            parent,
        });
        id
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.scopes[id.0].parent
    }

    /// Look up `name`, falling back to parent scopes on a miss.
    pub fn lookup(&self, id: ScopeId, name: &str) -> Option<&Value> {
        let mut current = Some(id);
        while let Some(scope_id) = current {
            let scope = &self.scopes[scope_id.0];
            if let Some(value) = scope.variables.get(name) {
                return Some(value);
            }
            current = scope.parent;
        }
        None
    }

    pub fn get_own(&self, id: ScopeId, name: &str) -> Option<&Value> {
        self.scopes[id.0].variables.get(name)
    }

    pub fn set_own(&mut self, id: ScopeId, name: impl Into<String>, value: Value) {
        self.scopes[id.0].variables.insert(name.into(), value);
    }

    /// Names defined directly in this scope, in insertion order.
    pub fn names(&self, id: ScopeId) -> impl Iterator<Item = &str> {
        self.scopes[id.0].variables.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parents() {
        let mut scopes = Scopes::default();
        let root = scopes.create(None);
        let child = scopes.create(Some(root));
        scopes.set_own(root, "title", Value::from("Root"));
        assert_eq!(scopes.lookup(child, "title"), Some(&Value::from("Root")));
        assert_eq!(scopes.get_own(child, "title"), None);
        assert_eq!(scopes.parent(child), Some(root));
    }

    #[test]
    fn writes_stay_local() {
        let mut scopes = Scopes::default();
        let root = scopes.create(None);
        let child = scopes.create(Some(root));
        scopes.set_own(root, "item", Value::from("outer"));
        scopes.set_own(child, "item", Value::from("inner"));
        assert_eq!(scopes.lookup(child, "item"), Some(&Value::from("inner")));
        assert_eq!(scopes.lookup(root, "item"), Some(&Value::from("outer")));
        assert_eq!(scopes.names(child).collect::<Vec<_>>(), vec!["item"]);
    }
}
