//! Build, validate and start a set of modules sharing one interface.
//!
//! A `Network` does not schedule or supervise anything: once started, every
//! module runs independently until it stops on its own or is shut down.

use crate::core::config::NetworkConfig;
use crate::core::errors::{RmsError, Result};
use crate::interface::Interface;
use crate::module::{Module, ModuleHandle, ModuleRunner, RunSummary};
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Network {
    interface: Interface,
    config: NetworkConfig,
    runners: Vec<ModuleRunner>,
}

impl Network {
    pub fn new(interface: Interface) -> Self {
        Self {
            interface,
            config: NetworkConfig::default(),
            runners: Vec::new(),
        }
    }

    pub fn with_config(interface: Interface, config: NetworkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            interface,
            config,
            runners: Vec::new(),
        })
    }

    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    /// Register a module against the network's interface
    pub fn add<R, W, S, M>(&mut self, name: &str, reads: R, writes: W, behaviour: M) -> Result<&mut Self>
    where
        R: IntoIterator<Item = S>,
        W: IntoIterator<Item = S>,
        S: Into<String>,
        M: Module,
    {
        self.ensure_unique(name)?;
        let config = self.config.for_module(name);
        let runner = ModuleRunner::with_config(name, &self.interface, reads, writes, behaviour, config)?;
        self.runners.push(runner);
        Ok(self)
    }

    /// Adopt a runner built elsewhere, e.g. against a different view of the
    /// same slots and gates. The runner keeps its own `ModuleConfig`; the
    /// network's per-module overrides do not apply to it.
    pub fn add_runner(&mut self, runner: ModuleRunner) -> Result<&mut Self> {
        self.ensure_unique(runner.name())?;
        self.runners.push(runner);
        Ok(self)
    }

    fn ensure_unique(&self, name: &str) -> Result<()> {
        if self.runners.iter().any(|r| r.name() == name) {
            return Err(RmsError::invalid_argument(format!(
                "module '{}' is already part of the network",
                name
            )));
        }
        Ok(())
    }

    /// Producer → consumer graph over modules, one edge per shared gate
    fn wait_graph(&self) -> DiGraph<&str, ()> {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = self.runners.iter().map(|r| graph.add_node(r.name())).collect();
        for (p, producer) in self.runners.iter().enumerate() {
            for (c, consumer) in self.runners.iter().enumerate() {
                let shares_gate = producer
                    .write_gates()
                    .any(|w| consumer.read_gates().any(|r| Arc::ptr_eq(w, r)));
                if shares_gate {
                    graph.add_edge(nodes[p], nodes[c], ());
                }
            }
        }
        graph
    }

    /// Reject wirings that deadlock on their first cycle.
    ///
    /// Every module waits for all of its inputs before publishing any output,
    /// so any directed cycle of producer → consumer edges means each module in
    /// it waits for a value that can only be produced after its own.
    pub fn check_wiring(&self) -> Result<()> {
        let graph = self.wait_graph();
        if !is_cyclic_directed(&graph) {
            return Ok(());
        }
        let mut cycle: Vec<String> = tarjan_scc(&graph)
            .into_iter()
            .find(|component| component.len() > 1)
            .map(|component| component.iter().rev().map(|&n| graph[n].to_string()).collect())
            .unwrap_or_default();
        if let Some(first) = cycle.first().cloned() {
            cycle.push(first);
        }
        warn!("Circular wait detected: {}", cycle.join(" -> "));
        Err(RmsError::CircularWait { cycle })
    }

    fn prepare(&self) -> Result<()> {
        if self.config.skip_wiring_check {
            warn!("Starting network without wiring check");
            Ok(())
        } else {
            self.check_wiring()
        }
    }

    /// Start every module on its own OS thread
    pub fn start_threads(self) -> Result<NetworkHandle> {
        self.prepare()?;
        info!("Starting {} modules on threads", self.runners.len());
        let mut handles = Vec::with_capacity(self.runners.len());
        for runner in self.runners {
            match runner.spawn_thread() {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // already running modules would block forever on the missing one
                    for handle in &handles {
                        handle.shutdown();
                    }
                    return Err(e);
                }
            }
        }
        Ok(NetworkHandle { handles })
    }

    /// Start every module as a task on the current tokio runtime.
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start_tasks(self) -> Result<NetworkHandle> {
        self.prepare()?;
        info!("Starting {} modules as tasks", self.runners.len());
        let handles = self.runners.into_iter().map(ModuleRunner::spawn_task).collect();
        Ok(NetworkHandle { handles })
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("variables", &self.interface.names().collect::<Vec<_>>())
            .field("modules", &self.runners)
            .finish()
    }
}

/// Handles to every module of a started network
#[derive(Debug)]
pub struct NetworkHandle {
    handles: Vec<ModuleHandle>,
}

impl NetworkHandle {
    /// Stop one module by name. Returns false if no such module exists.
    pub fn shutdown_module(&self, name: &str) -> bool {
        match self.handles.iter().find(|h| h.name() == name) {
            Some(handle) => {
                handle.shutdown();
                true
            }
            None => false,
        }
    }

    pub fn shutdown(&self) {
        for handle in &self.handles {
            handle.shutdown();
        }
    }

    /// Wait for every module, in registration order
    pub async fn join(self) -> Vec<Result<RunSummary>> {
        futures::future::join_all(self.handles.into_iter().map(ModuleHandle::join)).await
    }

    pub fn join_blocking(self) -> Vec<Result<RunSummary>> {
        self.handles.into_iter().map(ModuleHandle::join_blocking).collect()
    }

    /// Stop everything and wait for it
    pub async fn shutdown_and_join(self) -> Vec<Result<RunSummary>> {
        self.shutdown();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Ports, StopReason};
    use crate::slot::Slot;
    use async_trait::async_trait;

    struct Pass;

    #[async_trait]
    impl Module for Pass {
        async fn iterate(&mut self, _ports: &Ports) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn vars(names: &[&str]) -> Interface {
        Interface::new(names.iter().map(|n| (n.to_string(), Slot::scalar(0.0f64))))
    }

    #[test]
    fn test_chain_is_accepted() {
        let mut net = Network::new(vars(&["a", "b"]));
        net.add("source", Vec::<&str>::new(), vec!["a"], Pass).unwrap();
        net.add("middle", vec!["a"], vec!["b"], Pass).unwrap();
        net.add("sink", vec!["b"], Vec::<&str>::new(), Pass).unwrap();
        assert!(net.check_wiring().is_ok());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut net = Network::new(vars(&["x", "y"]));
        net.add("a", vec!["x"], vec!["y"], Pass).unwrap();
        net.add("b", vec!["y"], vec!["x"], Pass).unwrap();
        match net.check_wiring() {
            Err(RmsError::CircularWait { cycle }) => {
                assert_eq!(cycle.len(), 3);
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.contains(&"a".to_string()));
                assert!(cycle.contains(&"b".to_string()));
            }
            other => panic!("expected CircularWait, got {:?}", other),
        }
        assert!(matches!(net.start_threads(), Err(RmsError::CircularWait { .. })));
    }

    #[test]
    fn test_linked_gates_count_as_edges() {
        let iface = vars(&["left", "right", "back"]);
        iface.link("right", "left").unwrap();
        let mut net = Network::new(iface);
        net.add("w", vec!["back"], vec!["left"], Pass).unwrap();
        net.add("r", vec!["right"], vec!["back"], Pass).unwrap();
        assert!(matches!(net.check_wiring(), Err(RmsError::CircularWait { .. })));
    }

    #[test]
    fn test_add_runner_from_other_view() {
        let iface = vars(&["x", "y"]);
        let view = iface.wrap("robot");
        let mut net = Network::new(iface);
        net.add("a", vec!["x"], vec!["y"], Pass).unwrap();
        let runner = ModuleRunner::new("b", &view, vec!["robot.y"], vec!["robot.x"], Pass).unwrap();
        net.add_runner(runner).unwrap();
        // the cycle is only visible through the shared gates
        assert!(matches!(net.check_wiring(), Err(RmsError::CircularWait { .. })));
    }

    #[test]
    fn test_add_runner_duplicate_name() {
        let iface = vars(&["x", "y"]);
        let mut net = Network::new(iface.clone());
        net.add("m", Vec::<&str>::new(), vec!["x"], Pass).unwrap();
        let runner = ModuleRunner::new("m", &iface, vec!["x"], vec!["y"], Pass).unwrap();
        assert!(matches!(net.add_runner(runner), Err(RmsError::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_single_module() {
        let iface = vars(&["a"]);
        let mut net = Network::new(iface);
        net.add("writer", Vec::<&str>::new(), vec!["a"], Pass).unwrap();
        net.add("reader", vec!["a"], Vec::<&str>::new(), Pass).unwrap();
        let handle = net.start_tasks().unwrap();

        assert!(!handle.shutdown_module("missing"));
        assert!(handle.shutdown_module("writer"));
        // the reader blocks on a producer that no longer cycles until stopped too
        assert!(handle.shutdown_module("reader"));
        let results = handle.join().await;
        for summary in results {
            assert_eq!(summary.unwrap().reason, StopReason::Shutdown);
        }
    }

    #[test]
    fn test_duplicate_module_name() {
        let mut net = Network::new(vars(&["a", "b"]));
        net.add("m", Vec::<&str>::new(), vec!["a"], Pass).unwrap();
        assert!(matches!(
            net.add("m", Vec::<&str>::new(), vec!["b"], Pass),
            Err(RmsError::InvalidArgument { .. })
        ));
    }
}
