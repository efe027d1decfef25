// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Test-only tools with observable behavior.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::traits::{Invocation, Tool, ToolKind, ToolOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalEvent {
    Started,
    Finished,
}

/// Shared, ordered log of tool starts and finishes across every stub that holds it.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<(String, JournalEvent)>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, node_id: &str, event: JournalEvent) {
        if let Ok(mut entries) = self.0.lock() {
            entries.push((node_id.to_string(), event));
        }
    }

    pub fn entries(&self) -> Vec<(String, JournalEvent)> {
        self.0.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Position of an event, for ordering assertions.
    pub fn position(&self, node_id: &str, event: JournalEvent) -> Option<usize> {
        self.entries()
            .iter()
            .position(|(id, e)| id == node_id && *e == event)
    }
}

/// In-flight invocation counter with a high-water mark. Clones share the count,
/// so handing one gauge to several tools measures their combined concurrency.
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }
}

/// Writes the node id into every declared output. Counts calls and tracks peak concurrency.
#[derive(Clone)]
pub struct StubTool {
    name: String,
    version: String,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    gauge: Gauge,
    journal: Option<Journal>,
}

impl StubTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: "1.0".to_string(),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            gauge: Gauge::new(),
            journal: None,
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_gauge(mut self, gauge: Gauge) -> Self {
        self.gauge = gauge;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.gauge.peak()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Tool for StubTool {
    async fn invoke(&self, invocation: Invocation) -> ToolOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = self.gauge.enter();
        if let Some(journal) = &self.journal {
            journal.push(&invocation.node_id, JournalEvent::Started);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        for path in invocation.outputs.values() {
            if let Err(e) = std::fs::write(path, &invocation.node_id) {
                return ToolOutcome::failure(Some(1), e.to_string());
            }
        }
        if let Some(journal) = &self.journal {
            journal.push(&invocation.node_id, JournalEvent::Finished);
        }
        ToolOutcome::success(invocation.outputs)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Builtin
    }
}

/// Exits nonzero for the first `failures` calls, then behaves like [`StubTool`].
#[derive(Clone)]
pub struct FailingTool {
    name: String,
    failures: usize,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    gauge: Gauge,
}

impl FailingTool {
    /// Never succeeds.
    pub fn always(name: &str) -> Self {
        Self::first(name, usize::MAX)
    }

    pub fn first(name: &str, failures: usize) -> Self {
        Self {
            name: name.to_string(),
            failures,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            gauge: Gauge::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_gauge(mut self, gauge: Gauge) -> Self {
        self.gauge = gauge;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for FailingTool {
    async fn invoke(&self, invocation: Invocation) -> ToolOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = self.gauge.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if call < self.failures {
            return ToolOutcome::failure(Some(1), "Simulated tool failure");
        }
        for path in invocation.outputs.values() {
            if let Err(e) = std::fs::write(path, &invocation.node_id) {
                return ToolOutcome::failure(Some(1), e.to_string());
            }
        }
        ToolOutcome::success(invocation.outputs)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Builtin
    }
}

/// Exits zero without writing its declared outputs.
pub struct NoOutputTool {
    name: String,
}

impl NoOutputTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Tool for NoOutputTool {
    async fn invoke(&self, invocation: Invocation) -> ToolOutcome {
        ToolOutcome::success(invocation.outputs)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Builtin
    }
}
