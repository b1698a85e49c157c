//! Pass-through instrumentation stage.
//!
//! [`LogStage`] observes the units flowing through it and forwards every
//! one unchanged. It is the exemplar of the forwarding contract each
//! stage must honor: drain completely, preserve order, transfer
//! ownership. Its only side effect is a `tracing` event per drain.

use tracing::Level;

use super::{BoxError, Stage, StageContext};

/// A stage that logs buffer observations and forwards units unmodified.
///
/// Emits one event per drain, `RECEIVED(n)` for inbound and `WRITE(n)`
/// for flush, with the stage name attached as a structured field.
#[derive(Debug, Clone)]
pub struct LogStage {
    level: Level,
}

impl LogStage {
    /// Creates a stage logging at DEBUG.
    #[must_use]
    pub fn new() -> Self {
        Self::with_level(Level::DEBUG)
    }

    /// Creates a stage logging at the given level.
    #[must_use]
    pub fn with_level(level: Level) -> Self {
        Self { level }
    }

    fn observe(&self, stage: &str, op: &str, units: usize) {
        if self.level == Level::ERROR {
            tracing::error!(stage, units, "{op}({units})");
        } else if self.level == Level::WARN {
            tracing::warn!(stage, units, "{op}({units})");
        } else if self.level == Level::INFO {
            tracing::info!(stage, units, "{op}({units})");
        } else if self.level == Level::DEBUG {
            tracing::debug!(stage, units, "{op}({units})");
        } else {
            tracing::trace!(stage, units, "{op}({units})");
        }
    }
}

impl Default for LogStage {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> Stage<U> for LogStage {
    fn on_inbound(&mut self, ctx: &mut StageContext<'_, U>) -> Result<(), BoxError> {
        self.observe(ctx.name(), "RECEIVED", ctx.pending());
        ctx.forward_all();
        Ok(())
    }

    fn on_flush(&mut self, ctx: &mut StageContext<'_, U>) -> Result<(), BoxError> {
        self.observe(ctx.name(), "WRITE", ctx.pending());
        ctx.forward_all();
        Ok(())
    }
}
