use std::collections::BTreeMap;

use crate::fixture::Fixture;

/// Fixtures of one session, keyed by name.
#[derive(Debug, Default)]
pub struct FixtureRegistry {
    fixtures: BTreeMap<String, Fixture>,
}

impl FixtureRegistry {
    pub fn new() -> FixtureRegistry {
        FixtureRegistry::default()
    }

    /// Add a fixture, destroying and returning the one it replaces.
    pub fn insert(&mut self, fixture: Fixture) -> Option<Fixture> {
        let mut replaced = self.fixtures.insert(fixture.name.clone(), fixture)?;
        replaced.destroy();
        Some(replaced)
    }

    pub fn get(&self, name: &str) -> Option<&Fixture> {
        self.fixtures.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Fixture> {
        self.fixtures.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.fixtures.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fixture> {
        self.fixtures.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Fixture> {
        self.fixtures.values_mut()
    }

    /// Destroy every fixture and its observers.
    pub fn clear(&mut self) {
        for fixture in self.fixtures.values_mut() {
            fixture.destroy();
        }
        self.fixtures.clear();
    }
}
