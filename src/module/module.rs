use crate::core::errors::{Access, RmsError, Result};
use crate::interface::Interface;
use crate::slot::{Element, Slot};
use async_trait::async_trait;
use std::collections::HashMap;

/// User behaviour driven by a [`ModuleRunner`](crate::module::ModuleRunner).
///
/// `setup` runs once before the first cycle. `iterate` runs once per cycle,
/// after every declared input is fresh and before any declared output is
/// published. `iterate` must not block on anything outside the gate protocol
/// or the liveness of the whole graph is at risk.
#[async_trait]
pub trait Module: Send + 'static {
    async fn setup(&mut self, _ports: &Ports) -> anyhow::Result<()> {
        Ok(())
    }

    async fn iterate(&mut self, ports: &Ports) -> anyhow::Result<()>;
}

/// Typed access to a module's declared variables.
///
/// Reads are allowed on declared inputs and on the module's own outputs;
/// writes only on declared outputs.
#[derive(Debug, Clone)]
pub struct Ports {
    module: String,
    inputs: HashMap<String, Slot>,
    outputs: HashMap<String, Slot>,
    cycle: u64,
}

impl Ports {
    pub(crate) fn resolve(
        module: &str,
        interface: &Interface,
        reads: &[String],
        writes: &[String],
    ) -> Result<Self> {
        let bind = |names: &[String]| -> Result<HashMap<String, Slot>> {
            names
                .iter()
                .map(|name| Ok((name.clone(), interface.slot(name)?.clone())))
                .collect()
        };
        Ok(Self {
            module: module.to_string(),
            inputs: bind(reads)?,
            outputs: bind(writes)?,
            cycle: 0,
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Zero-based index of the cycle currently running
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub(crate) fn set_cycle(&mut self, cycle: u64) {
        self.cycle = cycle;
    }

    fn readable(&self, name: &str) -> Result<&Slot> {
        self.inputs
            .get(name)
            .or_else(|| self.outputs.get(name))
            .ok_or_else(|| RmsError::undeclared(&self.module, name, Access::Read))
    }

    fn writable(&self, name: &str) -> Result<&Slot> {
        self.outputs
            .get(name)
            .ok_or_else(|| RmsError::undeclared(&self.module, name, Access::Write))
    }

    /// Raw slot of a declared input or output
    pub fn slot(&self, name: &str) -> Result<&Slot> {
        self.readable(name)
    }

    pub fn read<T: Element>(&self, name: &str) -> Result<T> {
        self.readable(name)?.get()
    }

    pub fn read_at<T: Element>(&self, name: &str, index: &[usize]) -> Result<T> {
        self.readable(name)?.get_at(index)
    }

    pub fn read_array<T: Element>(&self, name: &str) -> Result<Vec<T>> {
        self.readable(name)?.to_vec()
    }

    /// Stage the next value of an output; consumers see it once the cycle publishes
    pub fn write<T: Element>(&self, name: &str, value: T) -> Result<()> {
        self.writable(name)?.set(value)
    }

    pub fn write_at<T: Element>(&self, name: &str, index: &[usize], value: T) -> Result<()> {
        self.writable(name)?.set_at(index, value)
    }

    pub fn write_array<T: Element>(&self, name: &str, values: &[T]) -> Result<()> {
        self.writable(name)?.copy_from(values)
    }
}
