//! Explicit registry of persons, owned by whoever runs the agents.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{Person, PersonId};
use crate::error::{DecisionError, Result};

/// Holds every known person. Profiles are shared read-only with running cycles via `Arc`.
#[derive(Debug, Clone, Default)]
pub struct PersonRegistry {
    persons: HashMap<PersonId, Arc<Person>>,
}

impl PersonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a person, replacing any previous profile with the same id.
    pub fn insert(&mut self, person: Person) -> Result<PersonId> {
        person.validate()?;
        let id = person.id;
        debug!(person = %id, name = %person.name, "registered person");
        self.persons.insert(id, Arc::new(person));
        Ok(id)
    }

    pub fn get(&self, id: PersonId) -> Option<&Arc<Person>> {
        self.persons.get(&id)
    }

    /// Shared handle to a profile, for handing to a cycle running on another thread.
    pub fn shared(&self, id: PersonId) -> Result<Arc<Person>> {
        self.persons
            .get(&id)
            .cloned()
            .ok_or(DecisionError::AgentNotFound(id))
    }

    /// Mutable access; clones the profile if a running cycle still holds it.
    pub fn get_mut(&mut self, id: PersonId) -> Option<&mut Person> {
        self.persons.get_mut(&id).map(Arc::make_mut)
    }

    pub fn remove(&mut self, id: PersonId) -> Option<Arc<Person>> {
        self.persons.remove(&id)
    }

    pub fn contains(&self, id: PersonId) -> bool {
        self.persons.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PersonId, &Arc<Person>)> {
        self.persons.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person::{TraitKind, TraitProfile};

    #[test]
    fn test_insert_and_get() {
        let mut registry = PersonRegistry::new();
        let id = registry.insert(Person::new("Lydia", "lydia")).unwrap();

        assert!(registry.contains(id));
        assert_eq!(registry.get(id).unwrap().name, "Lydia");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rejects_invalid_person() {
        let mut registry = PersonRegistry::new();
        let person = Person::new("Broken", "broken")
            .with_traits(TraitProfile::default().with(TraitKind::Aggression, 2.0));
        assert!(registry.insert(person).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_get_mut_does_not_affect_shared_handle() {
        let mut registry = PersonRegistry::new();
        let id = registry.insert(Person::new("Lydia", "lydia")).unwrap();
        let shared = registry.shared(id).unwrap();

        registry.get_mut(id).unwrap().traits.aggression = 0.9;

        assert_eq!(shared.traits.aggression, 0.5);
        assert_eq!(registry.get(id).unwrap().traits.aggression, 0.9);
    }

    #[test]
    fn test_missing_person() {
        let registry = PersonRegistry::new();
        let id = PersonId::new();
        assert!(matches!(
            registry.shared(id),
            Err(DecisionError::AgentNotFound(missing)) if missing == id
        ));
    }
}
