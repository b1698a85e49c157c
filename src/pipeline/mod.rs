//! Per-connection stage pipeline and the buffer hand-off contract.
//!
//! A [`Pipeline`] is an ordered chain of [`Stage`]s, each with an inbound
//! and an outbound buffer slot. Stage 0 sits closest to the transport.
//! Raw bytes pushed in at the transport side travel stage-to-stage toward
//! the application; written units travel the other way on flush.
//!
//! Hand-off is move semantics: a unit is popped from the current stage's
//! slot and pushed into the adjacent slot, so it exists in exactly one
//! place at a time. Order is FIFO per direction. A stage that needs more
//! input before it can produce anything simply forwards nothing and
//! returns — that is the backpressure mechanism, there is no separate
//! flow-control channel.
//!
//! Event delivery into one pipeline is serialized by ownership: every
//! entry point takes `&mut self`, so no two events can be in flight for
//! the same chain and the buffer slots need no locking. Independent
//! pipelines run fully in parallel.
//!
//! # Failure and teardown
//!
//! A stage error mid-drain leaves the chain at an inconsistent boundary;
//! the pipeline closes itself, discards what was buffered, and surfaces
//! [`PipelineError::StageDrain`] carrying the discard count. Explicit
//! [`Pipeline::close`] likewise reports every buffered-but-undelivered
//! unit — a discard is never silent.

use std::collections::VecDeque;
use std::fmt;

use thiserror::Error;

pub mod logging;

pub use logging::LogStage;

/// Boxed error a stage may raise while draining.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage failed mid-drain. The pipeline is closed and its buffered
    /// units have been discarded; the report says how many.
    #[error("stage `{stage}` failed while draining ({discarded}): {source}")]
    StageDrain {
        /// Name of the failing stage.
        stage: String,
        /// The stage's own error.
        #[source]
        source: BoxError,
        /// What the forced teardown discarded.
        discarded: DiscardReport,
    },

    /// The pipeline has been closed; no further events are accepted.
    #[error("pipeline is closed")]
    Closed,

    /// A stage with this name already exists in the chain.
    #[error("a stage named `{0}` already exists in this pipeline")]
    DuplicateStage(String),
}

/// Counts of buffered-but-undelivered units discarded at teardown.
///
/// Units already popped into the application or transport sink were
/// delivered and are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscardReport {
    /// Units discarded from inbound slots (travelling toward the app).
    pub inbound: usize,
    /// Units discarded from outbound slots (travelling toward the transport).
    pub outbound: usize,
}

impl DiscardReport {
    /// Total units discarded in both directions.
    #[must_use]
    pub fn total(&self) -> usize {
        self.inbound + self.outbound
    }

    /// Returns `true` if nothing was discarded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl fmt::Display for DiscardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "discarded {} inbound, {} outbound",
            self.inbound, self.outbound
        )
    }
}

/// A named, chainable pipeline unit.
///
/// Stages react to two events. On *inbound buffer updated* the stage must
/// drain its inbound slot completely — taking every unit, optionally
/// transforming it, and forwarding the results in order. On *flush
/// requested* the same contract applies to the outbound slot, travelling
/// toward the transport. Draining without forwarding is legal (that is
/// backpressure); returning with units still in the slot is a contract
/// violation that breaks delivery accounting.
///
/// The default method bodies implement exact pass-through: every unit is
/// forwarded unchanged.
pub trait Stage<U>: Send {
    /// The stage's inbound slot received units.
    fn on_inbound(&mut self, ctx: &mut StageContext<'_, U>) -> Result<(), BoxError> {
        ctx.forward_all();
        Ok(())
    }

    /// A flush was requested; drain the outbound slot toward the transport.
    fn on_flush(&mut self, ctx: &mut StageContext<'_, U>) -> Result<(), BoxError> {
        ctx.forward_all();
        Ok(())
    }
}

/// A stage's window onto its own buffer slot and the adjacent one.
///
/// [`take`](Self::take) pops from the slot being drained;
/// [`forward`](Self::forward) moves a unit into the neighbouring slot.
/// The context never hands out references into either buffer, so a stage
/// cannot retain access to a unit after forwarding it.
pub struct StageContext<'a, U> {
    name: &'a str,
    own: &'a mut VecDeque<U>,
    next: &'a mut VecDeque<U>,
}

impl<U> StageContext<'_, U> {
    /// Name of the stage being invoked.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    /// Units still waiting in the slot being drained.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.own.len()
    }

    /// Takes the oldest unit out of the slot being drained.
    pub fn take(&mut self) -> Option<U> {
        self.own.pop_front()
    }

    /// Moves a unit into the adjacent slot, preserving arrival order.
    pub fn forward(&mut self, unit: U) {
        self.next.push_back(unit);
    }

    /// Drains the slot completely, forwarding every unit unchanged.
    pub fn forward_all(&mut self) {
        while let Some(unit) = self.own.pop_front() {
            self.next.push_back(unit);
        }
    }
}

struct StageSlot<U> {
    name: String,
    stage: Box<dyn Stage<U>>,
    inbound: VecDeque<U>,
    outbound: VecDeque<U>,
}

/// An ordered chain of stages owned by one connection.
///
/// Constructed once per connection; stages are added with
/// [`add_last`](Self::add_last) before the first event. Inbound units
/// enter at the transport side via [`push_inbound`](Self::push_inbound)
/// and, once fully propagated, are popped from the application side with
/// [`next_inbound`](Self::next_inbound). Outbound units are staged with
/// [`write`](Self::write) and travel toward the transport on
/// [`flush`](Self::flush), landing in [`next_outbound`](Self::next_outbound).
pub struct Pipeline<U> {
    stages: Vec<StageSlot<U>>,
    /// Application-facing sink: inbound units that traversed every stage.
    inbound_sink: VecDeque<U>,
    /// Transport-facing sink: flushed units ready to be sent.
    outbound_sink: VecDeque<U>,
    closed: bool,
}

impl<U> Default for Pipeline<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> Pipeline<U> {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            inbound_sink: VecDeque::new(),
            outbound_sink: VecDeque::new(),
            closed: false,
        }
    }

    /// Appends a stage at the application end of the chain.
    ///
    /// Names must be unique within the pipeline.
    pub fn add_last(
        &mut self,
        name: impl Into<String>,
        stage: impl Stage<U> + 'static,
    ) -> Result<(), PipelineError> {
        if self.closed {
            return Err(PipelineError::Closed);
        }
        let name = name.into();
        if self.stages.iter().any(|s| s.name == name) {
            return Err(PipelineError::DuplicateStage(name));
        }
        self.stages.push(StageSlot {
            name,
            stage: Box::new(stage),
            inbound: VecDeque::new(),
            outbound: VecDeque::new(),
        });
        Ok(())
    }

    /// Stage names in chain order, transport side first.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.name.as_str())
    }

    /// Returns `true` once the pipeline has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Feeds one unit in at the transport side and propagates the
    /// inbound-updated event through the chain.
    pub fn push_inbound(&mut self, unit: U) -> Result<(), PipelineError> {
        if self.closed {
            return Err(PipelineError::Closed);
        }
        match self.stages.first_mut() {
            Some(first) => first.inbound.push_back(unit),
            None => {
                self.inbound_sink.push_back(unit);
                return Ok(());
            }
        }
        for i in 0..self.stages.len() {
            self.fire_inbound(i)?;
        }
        Ok(())
    }

    /// Stages one unit for sending, at the application end.
    ///
    /// Nothing moves toward the transport until [`flush`](Self::flush).
    pub fn write(&mut self, unit: U) -> Result<(), PipelineError> {
        if self.closed {
            return Err(PipelineError::Closed);
        }
        match self.stages.last_mut() {
            Some(last) => last.outbound.push_back(unit),
            None => self.outbound_sink.push_back(unit),
        }
        Ok(())
    }

    /// Propagates the flush event from the application end toward the
    /// transport, draining each stage's outbound slot in turn.
    pub fn flush(&mut self) -> Result<(), PipelineError> {
        if self.closed {
            return Err(PipelineError::Closed);
        }
        for i in (0..self.stages.len()).rev() {
            self.fire_flush(i)?;
        }
        Ok(())
    }

    /// Pops the oldest fully-propagated inbound unit, application side.
    pub fn next_inbound(&mut self) -> Option<U> {
        self.inbound_sink.pop_front()
    }

    /// Pops the oldest flushed outbound unit, ready for the transport.
    pub fn next_outbound(&mut self) -> Option<U> {
        self.outbound_sink.pop_front()
    }

    /// Units waiting in the application-side sink.
    #[must_use]
    pub fn inbound_ready(&self) -> usize {
        self.inbound_sink.len()
    }

    /// Units waiting in the transport-side sink.
    #[must_use]
    pub fn outbound_ready(&self) -> usize {
        self.outbound_sink.len()
    }

    /// Tears the pipeline down, discarding every unit still sitting in a
    /// stage slot, and reports the discard to the owner.
    ///
    /// Units already delivered into a sink remain poppable so the owner
    /// can finish handing them off. Closing twice reports nothing the
    /// second time.
    pub fn close(&mut self) -> DiscardReport {
        if self.closed {
            return DiscardReport::default();
        }
        self.closed = true;
        let report = self.discard_stage_buffers();
        if report.is_empty() {
            tracing::debug!("pipeline closed with no buffered units");
        } else {
            tracing::warn!(
                inbound = report.inbound,
                outbound = report.outbound,
                "pipeline closed; {report}"
            );
        }
        report
    }

    fn discard_stage_buffers(&mut self) -> DiscardReport {
        let mut report = DiscardReport::default();
        for slot in &mut self.stages {
            report.inbound += slot.inbound.len();
            report.outbound += slot.outbound.len();
            slot.inbound.clear();
            slot.outbound.clear();
        }
        report
    }

    /// Invokes stage `i`'s inbound event. Its inbound slot drains toward
    /// stage `i + 1`, or into the application sink at the end of the chain.
    fn fire_inbound(&mut self, i: usize) -> Result<(), PipelineError> {
        let (chain, rest) = self.stages.split_at_mut(i + 1);
        let slot = &mut chain[i];
        let next = rest
            .first_mut()
            .map_or(&mut self.inbound_sink, |n| &mut n.inbound);
        let mut ctx = StageContext {
            name: &slot.name,
            own: &mut slot.inbound,
            next,
        };
        if let Err(source) = slot.stage.on_inbound(&mut ctx) {
            return Err(self.fail(i, source));
        }
        Ok(())
    }

    /// Invokes stage `i`'s flush event. Its outbound slot drains toward
    /// stage `i - 1`, or into the transport sink at the head of the chain.
    fn fire_flush(&mut self, i: usize) -> Result<(), PipelineError> {
        let (before, rest) = self.stages.split_at_mut(i);
        let slot = &mut rest[0];
        let next = before
            .last_mut()
            .map_or(&mut self.outbound_sink, |p| &mut p.outbound);
        let mut ctx = StageContext {
            name: &slot.name,
            own: &mut slot.outbound,
            next,
        };
        if let Err(source) = slot.stage.on_flush(&mut ctx) {
            return Err(self.fail(i, source));
        }
        Ok(())
    }

    /// Stage `i` raised mid-drain: close the chain, discard, and report.
    fn fail(&mut self, i: usize, source: BoxError) -> PipelineError {
        let stage = self.stages[i].name.clone();
        self.closed = true;
        let discarded = self.discard_stage_buffers();
        tracing::warn!(stage = %stage, error = %source, "stage drain failed; {discarded}");
        PipelineError::StageDrain {
            stage,
            source,
            discarded,
        }
    }
}

impl<U> fmt::Debug for Pipeline<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Pipeline");
        d.field("closed", &self.closed)
            .field("inbound_ready", &self.inbound_sink.len())
            .field("outbound_ready", &self.outbound_sink.len());
        for slot in &self.stages {
            d.field(
                &slot.name,
                &format_args!("in={} out={}", slot.inbound.len(), slot.outbound.len()),
            );
        }
        d.finish()
    }
}
