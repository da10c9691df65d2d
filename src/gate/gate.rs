//! Single-producer / multi-consumer handoff barrier for one variable.
//!
//! One cycle of the protocol:
//!
//! ```text
//! producer                          consumer i
//! --------                          ----------
//! write slot
//! produce()      --signal[i]-->     await_producer(i)
//!                                   read slot
//! await_consumers() <--ack-------   consume(i)
//! ```
//!
//! Every consumer owns its own counting semaphore for the produce signal, so a
//! fast consumer that loops around cannot take a signal meant for a slower
//! one. Acknowledgements share one counting semaphore that the producer drains
//! `consumer_count` permits at a time. Both counts return to zero at the end of
//! each cycle, so the barrier is reusable indefinitely.
//!
//! All registration must happen before the first runtime call. The first
//! runtime call seals the gate and later registrations fail.

use crate::core::errors::{RmsError, Result};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Handle returned by [`Gate::add_consumer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(usize);

impl ConsumerId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Handle returned by [`Gate::add_producer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerId;

#[derive(Default)]
struct Registrations {
    /// One produce-signal semaphore per consumer
    signals: Vec<Arc<Semaphore>>,
    has_producer: bool,
}

pub struct Gate {
    label: String,
    registrations: RwLock<Registrations>,
    acks: Semaphore,
    sealed: AtomicBool,
}

impl Gate {
    pub fn new() -> Self {
        Self::labelled("<anonymous>")
    }

    /// Gate whose errors and logs refer to `label`
    pub fn labelled<S: Into<String>>(label: S) -> Self {
        Self {
            label: label.into(),
            registrations: RwLock::new(Registrations::default()),
            acks: Semaphore::new(0),
            sealed: AtomicBool::new(false),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Register a reader. Must happen before any module starts cycling.
    pub fn add_consumer(&self) -> Result<ConsumerId> {
        if self.is_sealed() {
            return Err(RmsError::registration_closed(&self.label));
        }
        let mut registrations = self.registrations.write();
        registrations.signals.push(Arc::new(Semaphore::new(0)));
        let id = ConsumerId(registrations.signals.len() - 1);
        debug!("Gate '{}': registered consumer {}", self.label, id.0);
        Ok(id)
    }

    /// Register the writer. At most one producer per gate; a second attempt
    /// fails and leaves the gate untouched.
    pub fn add_producer(&self) -> Result<ProducerId> {
        if self.is_sealed() {
            return Err(RmsError::registration_closed(&self.label));
        }
        let mut registrations = self.registrations.write();
        if registrations.has_producer {
            return Err(RmsError::duplicate_producer(&self.label));
        }
        registrations.has_producer = true;
        debug!("Gate '{}': registered producer", self.label);
        Ok(ProducerId)
    }

    pub fn consumer_count(&self) -> usize {
        self.registrations.read().signals.len()
    }

    pub fn has_producer(&self) -> bool {
        self.registrations.read().has_producer
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    fn signal_for(&self, consumer: ConsumerId) -> Result<(Arc<Semaphore>, bool)> {
        let registrations = self.registrations.read();
        let signal = registrations.signals.get(consumer.0).cloned().ok_or_else(|| {
            RmsError::invalid_argument(format!(
                "consumer {} is not registered on gate '{}'",
                consumer.0, self.label
            ))
        })?;
        Ok((signal, registrations.has_producer))
    }

    /// Block until the producer has published the current cycle's value.
    /// Returns immediately when the variable has no producer.
    pub async fn await_producer(&self, consumer: ConsumerId) -> Result<()> {
        self.seal();
        let (signal, has_producer) = self.signal_for(consumer)?;
        if !has_producer {
            return Ok(());
        }
        signal.acquire().await?.forget();
        Ok(())
    }

    /// Acknowledge that this consumer is done reading. No-op without a producer.
    pub fn consume(&self, consumer: ConsumerId) -> Result<()> {
        self.seal();
        let (_, has_producer) = self.signal_for(consumer)?;
        if has_producer {
            self.acks.add_permits(1);
        }
        Ok(())
    }

    /// Release exactly one signal to every registered consumer
    pub fn produce(&self) {
        self.seal();
        let registrations = self.registrations.read();
        if !registrations.has_producer {
            return;
        }
        for signal in &registrations.signals {
            signal.add_permits(1);
        }
    }

    /// Block until every registered consumer acknowledged, taking exactly
    /// `consumer_count` acknowledgements.
    pub async fn await_consumers(&self) -> Result<()> {
        self.seal();
        let count = self.consumer_count();
        if count == 0 {
            return Ok(());
        }
        let count = u32::try_from(count).map_err(|_| {
            RmsError::concurrency(format!("gate '{}' has too many consumers", self.label))
        })?;
        self.acks.acquire_many(count).await?.forget();
        Ok(())
    }

    /// [`Gate::await_producer`] for callers outside any async runtime
    pub fn await_producer_blocking(&self, consumer: ConsumerId) -> Result<()> {
        futures::executor::block_on(self.await_producer(consumer))
    }

    /// [`Gate::await_consumers`] for callers outside any async runtime
    pub fn await_consumers_blocking(&self) -> Result<()> {
        futures::executor::block_on(self.await_consumers())
    }

    /// Produce signals issued but not yet taken by consumers
    pub fn pending_signals(&self) -> usize {
        self.registrations
            .read()
            .signals
            .iter()
            .map(|signal| signal.available_permits())
            .sum()
    }

    /// Acknowledgements issued but not yet taken by the producer
    pub fn pending_acks(&self) -> usize {
        self.acks.available_permits()
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registrations = self.registrations.read();
        f.debug_struct("Gate")
            .field("label", &self.label)
            .field("consumers", &registrations.signals.len())
            .field("has_producer", &registrations.has_producer)
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_duplicate_producer_leaves_state() {
        let gate = Gate::labelled("x");
        gate.add_consumer().unwrap();
        gate.add_producer().unwrap();

        match gate.add_producer() {
            Err(RmsError::DuplicateProducer { variable }) => assert_eq!(variable, "x"),
            other => panic!("expected DuplicateProducer, got {:?}", other),
        }
        assert!(gate.has_producer());
        assert_eq!(gate.consumer_count(), 1);
        assert_eq!(gate.pending_signals(), 0);
        assert_eq!(gate.pending_acks(), 0);
        assert!(!gate.is_sealed());
    }

    #[test]
    fn test_consumer_ids_are_sequential() {
        let gate = Gate::new();
        assert_eq!(gate.add_consumer().unwrap().index(), 0);
        assert_eq!(gate.add_consumer().unwrap().index(), 1);
        assert_eq!(gate.consumer_count(), 2);
    }

    #[tokio::test]
    async fn test_registration_closed_after_run() {
        let gate = Gate::labelled("y");
        gate.add_producer().unwrap();
        gate.await_consumers().await.unwrap();
        assert!(gate.is_sealed());
        assert!(matches!(
            gate.add_consumer(),
            Err(RmsError::RegistrationClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_produce_releases_one_per_consumer() {
        let gate = Gate::new();
        gate.add_producer().unwrap();
        let ids: Vec<_> = (0..3).map(|_| gate.add_consumer().unwrap()).collect();

        for _ in 0..1000 {
            gate.produce();
            assert_eq!(gate.pending_signals(), 3);
            for id in &ids {
                gate.await_producer(*id).await.unwrap();
            }
            assert_eq!(gate.pending_signals(), 0);
            for id in &ids {
                gate.consume(*id).unwrap();
            }
            assert_eq!(gate.pending_acks(), 3);
            gate.await_consumers().await.unwrap();
            assert_eq!(gate.pending_acks(), 0);
        }
    }

    #[tokio::test]
    async fn test_consumer_blocks_until_produce() {
        let gate = Gate::new();
        gate.add_producer().unwrap();
        let id = gate.add_consumer().unwrap();

        let early = timeout(Duration::from_millis(50), gate.await_producer(id)).await;
        assert!(early.is_err(), "await_producer returned before produce");

        gate.produce();
        timeout(Duration::from_millis(500), gate.await_producer(id))
            .await
            .expect("await_producer should return after produce")
            .unwrap();
    }

    #[tokio::test]
    async fn test_producer_blocks_until_all_consumed() {
        let gate = Gate::new();
        gate.add_producer().unwrap();
        let a = gate.add_consumer().unwrap();
        let b = gate.add_consumer().unwrap();

        gate.produce();
        gate.await_producer(a).await.unwrap();
        gate.await_producer(b).await.unwrap();
        gate.consume(a).unwrap();

        let partial = timeout(Duration::from_millis(50), gate.await_consumers()).await;
        assert!(partial.is_err(), "await_consumers returned with one ack missing");
        // the timed-out acquire must not have swallowed the ack it was holding
        assert_eq!(gate.pending_acks(), 1);

        gate.consume(b).unwrap();
        gate.await_consumers().await.unwrap();
        assert_eq!(gate.pending_acks(), 0);
    }

    #[tokio::test]
    async fn test_zero_producers() {
        let gate = Gate::new();
        let id = gate.add_consumer().unwrap();
        for _ in 0..10 {
            gate.await_producer(id).await.unwrap();
            gate.consume(id).unwrap();
        }
        gate.produce();
        assert_eq!(gate.pending_signals(), 0);
        assert_eq!(gate.pending_acks(), 0);
    }

    #[tokio::test]
    async fn test_zero_consumers() {
        let gate = Gate::new();
        gate.add_producer().unwrap();
        for _ in 0..10 {
            gate.produce();
            gate.await_consumers().await.unwrap();
        }
        assert_eq!(gate.pending_signals(), 0);
    }

    #[test]
    fn test_unknown_consumer_id() {
        let gate = Gate::new();
        gate.add_producer().unwrap();
        assert!(matches!(
            gate.consume(ConsumerId(4)),
            Err(RmsError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_blocking_variants_across_threads() {
        let gate = Arc::new(Gate::new());
        gate.add_producer().unwrap();
        let id = gate.add_consumer().unwrap();

        let reader = {
            let gate = gate.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    gate.await_producer_blocking(id).unwrap();
                    gate.consume(id).unwrap();
                }
            })
        };
        for _ in 0..100 {
            gate.produce();
            gate.await_consumers_blocking().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(gate.pending_signals(), 0);
        assert_eq!(gate.pending_acks(), 0);
    }
}
