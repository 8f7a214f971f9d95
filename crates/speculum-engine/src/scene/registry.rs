use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::error::ContractError;

/// Typed index returned at registration.
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    #[inline]
    fn new(index: usize) -> Self {
        Self {
            index: index as u32,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// Name-keyed store with unique names and stable handles. Entries are never removed.
pub struct Registry<T> {
    kind: &'static str,
    names: HashMap<String, u32>,
    entries: Vec<(String, T)>,
}

impl<T> Registry<T> {
    /// `kind` names the entry type in error messages ("target", "texture").
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            names: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Fails with [`ContractError::DuplicateName`] when `name` is taken.
    pub fn ensure_vacant(&self, name: &str) -> Result<(), ContractError> {
        if self.names.contains_key(name) {
            return Err(ContractError::DuplicateName {
                kind: self.kind,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn register(&mut self, name: &str, value: T) -> Result<Handle<T>, ContractError> {
        self.ensure_vacant(name)?;
        let handle = Handle::new(self.entries.len());
        self.names.insert(name.to_string(), handle.index);
        self.entries.push((name.to_string(), value));
        log::debug!("registered {} `{name}` as {handle:?}", self.kind);
        Ok(handle)
    }

    /// Resolves a name to its handle.
    pub fn lookup(&self, name: &str) -> Result<Handle<T>, ContractError> {
        self.names
            .get(name)
            .map(|&i| Handle::new(i as usize))
            .ok_or_else(|| ContractError::UnknownName {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.entries.get(handle.index()).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.entries.get_mut(handle.index()).map(|(_, v)| v)
    }

    pub fn by_name(&self, name: &str) -> Result<&T, ContractError> {
        let handle = self.lookup(name)?;
        Ok(&self.entries[handle.index()].1)
    }

    pub fn by_name_mut(&mut self, name: &str) -> Result<&mut T, ContractError> {
        let handle = self.lookup(name)?;
        Ok(&mut self.entries[handle.index()].1)
    }

    pub fn name(&self, handle: Handle<T>) -> Option<&str> {
        self.entries.get(handle.index()).map(|(n, _)| n.as_str())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &str, &T)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, (n, v))| (Handle::new(i), n.as_str(), v))
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.entries.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup() {
        let mut reg = Registry::new("texture");
        let a = reg.register("sky", 1).unwrap();
        let b = reg.register("floor", 2).unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.lookup("floor").unwrap(), b);
        assert_eq!(reg.get(a), Some(&1));
        assert_eq!(reg.by_name("sky").unwrap(), &1);
        assert_eq!(reg.name(b), Some("floor"));
    }

    #[test]
    fn duplicate_name_is_rejected_and_keeps_original() {
        let mut reg = Registry::new("target");
        reg.register("skybox", 'a').unwrap();
        let err = reg.register("skybox", 'b').unwrap_err();
        assert_eq!(
            err,
            ContractError::DuplicateName {
                kind: "target",
                name: "skybox".into(),
            }
        );
        assert_eq!(reg.by_name("skybox").unwrap(), &'a');
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unknown_name_is_a_contract_error() {
        let reg: Registry<u8> = Registry::new("texture");
        assert_eq!(
            reg.lookup("missing").unwrap_err(),
            ContractError::UnknownName {
                kind: "texture",
                name: "missing".into(),
            }
        );
    }

    #[test]
    fn iteration_follows_registration_order() {
        let mut reg = Registry::new("target");
        for name in ["c", "a", "b"] {
            reg.register(name, ()).unwrap();
        }
        let names: Vec<&str> = reg.iter().map(|(_, n, _)| n).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }
}
