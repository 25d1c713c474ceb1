//! Progress reporter port. In the shape of `presentation/src/agent/progress.rs`'s
//! `AgentProgressReporter` (named slots, debounced starts), generalized
//! to the handle-based API the orchestrator needs, plus a scoped "I/O
//! region" so approval prompts never interleave with spinner redraws.

use std::time::Duration;

/// Opaque handle to one in-flight progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub u64);

/// Held for the duration of a synchronous interaction with the
/// terminal (e.g. an approval prompt) that must not be interleaved with
/// spinner redraws. Implementations suspend redraws on construction and
/// resume them on drop.
pub trait IoRegionGuard: Send {}

pub trait ProgressReporter: Send + Sync {
    /// Register a task that is shown immediately.
    fn add_task(&self, label: &str) -> TaskHandle;

    /// Register a task that only becomes visible if it is still running
    /// after `delay` — used for tool calls so fast ones don't flicker.
    fn start_debounced_task(&self, label: &str, delay: Duration) -> TaskHandle;

    /// Mark a task finished, optionally replacing its label for the
    /// final redraw (e.g. appending a duration or error marker).
    fn complete_task(&self, handle: TaskHandle, label: Option<&str>);

    /// Enter a scoped region during which the reporter must not redraw.
    fn aio_io(&self) -> Box<dyn IoRegionGuard + '_>;
}

/// No-op implementation for `--no-progress` and tests.
pub struct NoProgress;

struct NoGuard;
impl IoRegionGuard for NoGuard {}

impl ProgressReporter for NoProgress {
    fn add_task(&self, _label: &str) -> TaskHandle {
        TaskHandle(0)
    }

    fn start_debounced_task(&self, _label: &str, _delay: Duration) -> TaskHandle {
        TaskHandle(0)
    }

    fn complete_task(&self, _handle: TaskHandle, _label: Option<&str>) {}

    fn aio_io(&self) -> Box<dyn IoRegionGuard + '_> {
        Box::new(NoGuard)
    }
}
