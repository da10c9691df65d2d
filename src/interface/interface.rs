//! Named registry of (slot, gate) pairs and its composition algebra.
//!
//! An interface is a view: two parallel sequences of shared handles plus a
//! name → index map. Composing interfaces copies handles and names, never the
//! underlying storage or gates. Several names may point at one index.
//!
//! Renaming views (`remap`, `use_namespace`, `wrap`, `select`) and clones
//! share their source's gate sequence, so a `link` through any of them is seen
//! by all. `concat` and `accumulate` start a new sequence.

use crate::core::errors::{RmsError, Result};
use crate::gate::Gate;
use crate::interface::lookup::Lookup;
use crate::slot::Slot;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::ops::{Add, AddAssign};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct Interface {
    slots: Vec<Slot>,
    gates: Arc<RwLock<Vec<Arc<Gate>>>>,
    lookup: Lookup,
}

impl Interface {
    /// Build from named slots, allocating one fresh gate per slot.
    ///
    /// A repeated name keeps its first position and its last slot.
    pub fn new<I, S>(objects: I) -> Self
    where
        I: IntoIterator<Item = (S, Slot)>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        let mut slots: Vec<Slot> = Vec::new();
        let mut lookup = Lookup::new();
        for (name, slot) in objects {
            let name = name.into();
            match lookup.get(&name) {
                Some(index) => slots[index] = slot,
                None => {
                    lookup.bind(name.clone(), slots.len());
                    names.push(name);
                    slots.push(slot);
                }
            }
        }
        let gates = names.iter().map(|name| Arc::new(Gate::labelled(name.as_str()))).collect();
        Self {
            slots,
            gates: Arc::new(RwLock::new(gates)),
            lookup,
        }
    }

    /// Build from explicit parts, as produced by another interface.
    ///
    /// Without `gates`, one fresh gate is allocated per slot. Without `lookup`,
    /// slot `i` is named `"i"`. Fails if the gate count differs from the slot
    /// count or the lookup points outside the sequences.
    pub fn from_parts(
        slots: Vec<Slot>,
        gates: Option<Vec<Arc<Gate>>>,
        lookup: Option<Lookup>,
    ) -> Result<Self> {
        let lookup = lookup.unwrap_or_else(|| (0..slots.len()).map(|i| (i.to_string(), i)).collect());
        if let Some(max) = lookup.max_index() {
            if max >= slots.len() {
                return Err(RmsError::invalid_argument(format!(
                    "lookup index {} out of range for {} slots",
                    max,
                    slots.len()
                )));
            }
        }
        let gates = match gates {
            Some(gates) if gates.len() != slots.len() => {
                return Err(RmsError::invalid_argument(format!(
                    "{} gates supplied for {} slots",
                    gates.len(),
                    slots.len()
                )));
            }
            Some(gates) => gates,
            None => (0..slots.len())
                .map(|index| {
                    let label = lookup
                        .iter()
                        .find(|(_, i)| *i == index)
                        .map(|(name, _)| name.to_string())
                        .unwrap_or_else(|| index.to_string());
                    Arc::new(Gate::labelled(label))
                })
                .collect(),
        };
        Ok(Self {
            slots,
            gates: Arc::new(RwLock::new(gates)),
            lookup,
        })
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.lookup
            .get(name)
            .ok_or_else(|| RmsError::unknown_variable(name))
    }

    pub fn slot(&self, name: &str) -> Result<&Slot> {
        Ok(&self.slots[self.index_of(name)?])
    }

    /// Gate currently bound to `name`. A later `link` does not affect a
    /// gate already handed out.
    pub fn gate(&self, name: &str) -> Result<Arc<Gate>> {
        let index = self.index_of(name)?;
        Ok(self.gates.read()[index].clone())
    }

    /// Resolve a name to its slot and gate
    pub fn get(&self, name: &str) -> Result<(&Slot, Arc<Gate>)> {
        let index = self.index_of(name)?;
        Ok((&self.slots[index], self.gates.read()[index].clone()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains(name)
    }

    /// Variable names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.lookup.iter().map(|(name, _)| name)
    }

    /// Number of names
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// Number of backing (slot, gate) pairs, including unnamed ones
    pub fn storage_len(&self) -> usize {
        self.slots.len()
    }

    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    fn with_lookup(&self, lookup: Lookup) -> Self {
        Self {
            slots: self.slots.clone(),
            gates: Arc::clone(&self.gates),
            lookup,
        }
    }

    /// `self` followed by `other`. On a name present in both, `self`'s
    /// binding wins and `other`'s entry is unreachable under that name.
    pub fn concat(&self, other: &Interface) -> Interface {
        let mut result = self.clone();
        result.accumulate(other.clone());
        result
    }

    /// In-place [`Interface::concat`]
    pub fn accumulate(&mut self, other: Interface) {
        let offset = self.slots.len();
        self.slots.extend(other.slots);
        let mut gates = self.gates.read().clone();
        gates.extend(other.gates.read().iter().cloned());
        self.gates = Arc::new(RwLock::new(gates));
        for (name, index) in other.lookup.iter() {
            if !self.lookup.claim(name.to_string(), offset + index) {
                debug!("accumulate: '{}' already bound, keeping existing binding", name);
            }
        }
    }

    /// Rename variables. Names not in `mapping` keep their name. Names are
    /// visited in declaration order and the first to claim a target name wins.
    pub fn remap<I, K, V>(&self, mapping: I) -> Interface
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mapping: HashMap<String, String> = mapping
            .into_iter()
            .map(|(from, to)| (from.into(), to.into()))
            .collect();
        self.rename(|name| mapping.get(name).cloned().unwrap_or_else(|| name.to_string()))
    }

    /// Expose `namespace.name` as `name`. Names outside the namespace pass
    /// through. First to claim a name wins.
    pub fn use_namespace(&self, namespace: &str) -> Interface {
        let prefix = format!("{}.", namespace);
        self.rename(|name| name.strip_prefix(&prefix).unwrap_or(name).to_string())
    }

    /// Prefix every name with `namespace.`
    pub fn wrap(&self, namespace: &str) -> Interface {
        self.rename(|name| format!("{}.{}", namespace, name))
    }

    /// Restrict the view to `names`, in the given order
    pub fn select<I, S>(&self, names: I) -> Result<Interface>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut lookup = Lookup::new();
        for name in names {
            let name = name.as_ref();
            lookup.claim(name.to_string(), self.index_of(name)?);
        }
        Ok(self.with_lookup(lookup))
    }

    fn rename<F: Fn(&str) -> String>(&self, rename: F) -> Interface {
        let mut lookup = Lookup::new();
        for (name, index) in self.lookup.iter() {
            let target = rename(name);
            if !lookup.claim(target.clone(), index) {
                debug!("rename: '{}' -> '{}' dropped, name already claimed", name, target);
            }
        }
        self.with_lookup(lookup)
    }

    /// Make `origin` synchronise through `target`'s gate.
    ///
    /// Every name aliasing `origin`'s index sees the new gate, in this view
    /// and in every view sharing its gate sequence. Slot bindings are
    /// untouched. Link before building the runners that use either name.
    pub fn link(&self, origin: &str, target: &str) -> Result<()> {
        let origin_index = self.index_of(origin)?;
        let target_index = self.index_of(target)?;
        let mut gates = self.gates.write();
        let target_gate = gates[target_index].clone();
        gates[origin_index] = target_gate;
        debug!("link: '{}' now uses the gate of '{}'", origin, target);
        Ok(())
    }

    /// Current value of every variable, keyed by name. Not synchronised with
    /// the gates; intended for inspection and logging.
    pub fn snapshot(&self) -> Value {
        let mut map = Map::new();
        for (name, index) in self.lookup.iter() {
            map.insert(name.to_string(), self.slots[index].to_json());
        }
        Value::Object(map)
    }
}

impl Add<&Interface> for &Interface {
    type Output = Interface;

    fn add(self, other: &Interface) -> Interface {
        self.concat(other)
    }
}

impl Add for Interface {
    type Output = Interface;

    fn add(mut self, other: Interface) -> Interface {
        self.accumulate(other);
        self
    }
}

impl AddAssign for Interface {
    fn add_assign(&mut self, other: Interface) {
        self.accumulate(other);
    }
}
