use crate::core::config::ModuleConfig;
use crate::core::errors::{RmsError, Result};
use crate::gate::{ConsumerId, Gate};
use crate::interface::Interface;
use crate::module::module::{Module, Ports};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Cooperative stop request shared between a runner and its handles.
///
/// A triggered signal ends the loop at the runner's next gate wait (or at the
/// top of the next cycle), never in the middle of `iterate`.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a module loop ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxCycles,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub module: String,
    /// Fully completed cycles
    pub cycles: u64,
    pub reason: StopReason,
}

struct ReadBinding {
    name: String,
    gate: Arc<Gate>,
    consumer: ConsumerId,
}

struct WriteBinding {
    name: String,
    gate: Arc<Gate>,
}

enum Flow {
    Continue,
    Stop,
}

/// A module bound to its gates, ready to run.
///
/// Construction registers the module as consumer of every read gate and
/// producer of every write gate. Build every runner of a graph before starting
/// any of them.
pub struct ModuleRunner {
    name: String,
    config: ModuleConfig,
    reads: Vec<ReadBinding>,
    writes: Vec<WriteBinding>,
    ports: Ports,
    behaviour: Box<dyn Module>,
    shutdown: ShutdownSignal,
}

impl ModuleRunner {
    pub fn new<R, W, S, M>(
        name: &str,
        interface: &Interface,
        reads: R,
        writes: W,
        behaviour: M,
    ) -> Result<Self>
    where
        R: IntoIterator<Item = S>,
        W: IntoIterator<Item = S>,
        S: Into<String>,
        M: Module,
    {
        Self::with_config(name, interface, reads, writes, behaviour, ModuleConfig::default())
    }

    pub fn with_config<R, W, S, M>(
        name: &str,
        interface: &Interface,
        reads: R,
        writes: W,
        behaviour: M,
        config: ModuleConfig,
    ) -> Result<Self>
    where
        R: IntoIterator<Item = S>,
        W: IntoIterator<Item = S>,
        S: Into<String>,
        M: Module,
    {
        config.validate()?;
        let reads = dedup(reads.into_iter().map(Into::into));
        let writes = dedup(writes.into_iter().map(Into::into));

        // Check everything before registering anything, so a rejected module
        // leaves no half-registered consumers behind to stall a producer.
        let read_gates = gates_for(interface, &reads)?;
        let write_gates = gates_for(interface, &writes)?;
        for (i, (write, gate)) in writes.iter().zip(&write_gates).enumerate() {
            if gate.has_producer() || write_gates[..i].iter().any(|g| Arc::ptr_eq(g, gate)) {
                return Err(RmsError::duplicate_producer(write.as_str()));
            }
            if read_gates.iter().any(|g| Arc::ptr_eq(g, gate)) {
                return Err(RmsError::invalid_argument(format!(
                    "module '{}' both reads and writes '{}'; it would wait on itself",
                    name, write
                )));
            }
        }
        if let Some(gate) = read_gates.iter().chain(&write_gates).find(|g| g.is_sealed()) {
            return Err(RmsError::registration_closed(gate.label()));
        }

        let ports = Ports::resolve(name, interface, &reads, &writes)?;

        let mut read_bindings = Vec::with_capacity(reads.len());
        for (variable, gate) in reads.into_iter().zip(read_gates) {
            let consumer = gate.add_consumer()?;
            read_bindings.push(ReadBinding {
                name: variable,
                gate,
                consumer,
            });
        }
        let mut write_bindings = Vec::with_capacity(writes.len());
        for (variable, gate) in writes.into_iter().zip(write_gates) {
            gate.add_producer()?;
            write_bindings.push(WriteBinding { name: variable, gate });
        }
        debug!(
            "Module '{}' registered: reads {:?}, writes {:?}",
            name,
            read_bindings.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            write_bindings.iter().map(|w| w.name.as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            name: name.to_string(),
            config,
            reads: read_bindings,
            writes: write_bindings,
            ports,
            behaviour: Box::new(behaviour),
            shutdown: ShutdownSignal::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn reads(&self) -> impl Iterator<Item = &str> + '_ {
        self.reads.iter().map(|r| r.name.as_str())
    }

    pub fn writes(&self) -> impl Iterator<Item = &str> + '_ {
        self.writes.iter().map(|w| w.name.as_str())
    }

    /// Gates this module waits on as a consumer
    pub(crate) fn read_gates(&self) -> impl Iterator<Item = &Arc<Gate>> + '_ {
        self.reads.iter().map(|r| &r.gate)
    }

    /// Gates this module publishes to
    pub(crate) fn write_gates(&self) -> impl Iterator<Item = &Arc<Gate>> + '_ {
        self.writes.iter().map(|w| &w.gate)
    }

    /// Signal that stops this runner once it is running
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Run `setup` once, then cycle until shutdown, `max_cycles`, or an error
    pub async fn run(self) -> Result<RunSummary> {
        let ModuleRunner {
            name,
            config,
            reads,
            writes,
            mut ports,
            mut behaviour,
            shutdown,
        } = self;
        let mut stop = shutdown.subscribe();
        let stall = config.stall_warning();
        let summary = |cycles, reason| RunSummary {
            module: name.clone(),
            cycles,
            reason,
        };

        info!("Module '{}' starting", name);
        behaviour.setup(&ports).await.map_err(|e| {
            error!("Module '{}' setup failed: {:#}", name, e);
            RmsError::module(name.as_str(), e)
        })?;

        let mut cycles: u64 = 0;
        loop {
            if config.max_cycles.map_or(false, |max| cycles >= max) {
                info!("Module '{}' finished {} cycles", name, cycles);
                return Ok(summary(cycles, StopReason::MaxCycles));
            }
            if shutdown.is_triggered() {
                info!("Module '{}' stopped after {} cycles", name, cycles);
                return Ok(summary(cycles, StopReason::Shutdown));
            }

            for read in &reads {
                let fresh = read.gate.await_producer(read.consumer);
                if let Flow::Stop = guarded(fresh, &mut stop, stall, &name, &read.name).await? {
                    info!("Module '{}' stopped after {} cycles", name, cycles);
                    return Ok(summary(cycles, StopReason::Shutdown));
                }
            }

            ports.set_cycle(cycles);
            if let Err(e) = behaviour.iterate(&ports).await {
                error!("Module '{}' failed in cycle {}: {:#}", name, cycles, e);
                return Err(RmsError::module(name.as_str(), e));
            }

            for read in &reads {
                read.gate.consume(read.consumer)?;
            }
            for write in &writes {
                write.gate.produce();
            }
            for write in &writes {
                let drained = write.gate.await_consumers();
                if let Flow::Stop = guarded(drained, &mut stop, stall, &name, &write.name).await? {
                    info!("Module '{}' stopped after {} cycles", name, cycles);
                    return Ok(summary(cycles, StopReason::Shutdown));
                }
            }

            cycles += 1;
            if config.trace_cycles {
                trace!("Module '{}' completed cycle {}", name, cycles);
            }
            // modules with nothing to block on would otherwise starve their executor
            tokio::task::yield_now().await;
        }
    }

    /// Run on a dedicated OS thread with its own single-threaded runtime
    pub fn spawn_thread(self) -> Result<ModuleHandle> {
        let name = self.name.clone();
        let shutdown = self.shutdown.clone();
        let join = std::thread::Builder::new()
            .name(format!("rms-{}", name))
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| RmsError::concurrency_with_source("build_runtime", e))?;
                runtime.block_on(self.run())
            })
            .map_err(|e| RmsError::concurrency_with_source("spawn_thread", e))?;
        Ok(ModuleHandle {
            name,
            shutdown,
            join: Join::Thread(join),
        })
    }

    /// Run as a task on the current tokio runtime.
    ///
    /// Panics outside a tokio runtime. With `stall_warning_ms` set, the
    /// runtime also needs its time driver enabled.
    pub fn spawn_task(self) -> ModuleHandle {
        let name = self.name.clone();
        let shutdown = self.shutdown.clone();
        ModuleHandle {
            name,
            shutdown,
            join: Join::Task(tokio::spawn(self.run())),
        }
    }
}

impl std::fmt::Debug for ModuleRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRunner")
            .field("name", &self.name)
            .field("reads", &self.reads().collect::<Vec<_>>())
            .field("writes", &self.writes().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

fn dedup<I: Iterator<Item = String>>(names: I) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for name in names {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }
    unique
}

fn gates_for(interface: &Interface, names: &[String]) -> Result<Vec<Arc<Gate>>> {
    names
        .iter()
        .map(|name| interface.gate(name))
        .collect()
}

async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            // no sender left, nobody can ask us to stop
            std::future::pending::<()>().await;
        }
    }
}

/// Wait on a gate operation unless shutdown is requested first. Logs once if
/// the wait outlasts `stall`.
async fn guarded<F>(
    wait: F,
    stop: &mut watch::Receiver<bool>,
    stall: Option<Duration>,
    module: &str,
    variable: &str,
) -> Result<Flow>
where
    F: Future<Output = Result<()>>,
{
    tokio::pin!(wait);
    if let Some(limit) = stall {
        tokio::select! {
            res = &mut wait => return res.map(|_| Flow::Continue),
            _ = stop_requested(stop) => return Ok(Flow::Stop),
            _ = tokio::time::sleep(limit) => {
                warn!(
                    "Module '{}' has waited more than {:?} on '{}'",
                    module, limit, variable
                );
            }
        }
    }
    tokio::select! {
        res = &mut wait => res.map(|_| Flow::Continue),
        _ = stop_requested(stop) => Ok(Flow::Stop),
    }
}

enum Join {
    Thread(std::thread::JoinHandle<Result<RunSummary>>),
    Task(tokio::task::JoinHandle<Result<RunSummary>>),
}

/// Handle to a started module
pub struct ModuleHandle {
    name: String,
    shutdown: ShutdownSignal,
    join: Join,
}

impl ModuleHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the module to stop at its next suspension point
    pub fn shutdown(&self) {
        debug!("Shutdown requested for module '{}'", self.name);
        self.shutdown.trigger();
    }

    pub fn is_finished(&self) -> bool {
        match &self.join {
            Join::Thread(handle) => handle.is_finished(),
            Join::Task(handle) => handle.is_finished(),
        }
    }

    /// Wait for the module to end. Must be called from within a tokio runtime.
    pub async fn join(self) -> Result<RunSummary> {
        match self.join {
            Join::Thread(handle) => tokio::task::spawn_blocking(move || join_thread(handle))
                .await
                .map_err(|e| RmsError::concurrency_with_source("join_module", e))?,
            Join::Task(handle) => handle
                .await
                .map_err(|e| RmsError::concurrency_with_source("join_module", e))?,
        }
    }

    /// Wait for the module to end from synchronous code. Do not call from a
    /// thread that is driving the module's own runtime.
    pub fn join_blocking(self) -> Result<RunSummary> {
        match self.join {
            Join::Thread(handle) => join_thread(handle),
            Join::Task(handle) => futures::executor::block_on(handle)
                .map_err(|e| RmsError::concurrency_with_source("join_module", e))?,
        }
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn join_thread(handle: std::thread::JoinHandle<Result<RunSummary>>) -> Result<RunSummary> {
    handle
        .join()
        .map_err(|_| RmsError::concurrency("module thread panicked"))?
}
