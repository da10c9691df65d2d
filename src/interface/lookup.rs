use std::collections::HashMap;

/// Ordered name → storage-index map.
///
/// Iteration follows declaration order, which is what the renaming
/// operations use to break ties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lookup {
    entries: Vec<(String, usize)>,
    positions: HashMap<String, usize>,
}

impl Lookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.positions.get(name).map(|&pos| self.entries[pos].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Bind `name` unless it is already bound. Returns whether it was inserted.
    pub fn claim(&mut self, name: String, index: usize) -> bool {
        if self.positions.contains_key(&name) {
            return false;
        }
        self.positions.insert(name.clone(), self.entries.len());
        self.entries.push((name, index));
        true
    }

    /// Bind `name`, replacing the index of an existing binding in place
    pub fn bind(&mut self, name: String, index: usize) {
        match self.positions.get(&name) {
            Some(&pos) => self.entries[pos].1 = index,
            None => {
                self.positions.insert(name.clone(), self.entries.len());
                self.entries.push((name, index));
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.entries.iter().map(|(name, index)| (name.as_str(), *index))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_index(&self) -> Option<usize> {
        self.entries.iter().map(|(_, index)| *index).max()
    }
}

impl<S: Into<String>> FromIterator<(S, usize)> for Lookup {
    fn from_iter<I: IntoIterator<Item = (S, usize)>>(iter: I) -> Self {
        let mut lookup = Lookup::new();
        for (name, index) in iter {
            lookup.bind(name.into(), index);
        }
        lookup
    }
}
