//! `indicatif`-backed `ProgressReporter`. Generalizes a named-slot
//! `MultiProgress`/`Mutex<Option<ProgressBar>>` pattern into one slot
//! keyed by an opaque `TaskHandle`, and adds debounced starts so a tool
//! call that finishes before its delay elapses never flashes a spinner.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use turnloop_application::ports::progress_reporter::{IoRegionGuard, ProgressReporter, TaskHandle};

enum Slot {
    Pending(String),
    Visible(ProgressBar),
    Done,
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner().template("{spinner:.green} {msg}").unwrap()
}

fn spawn_bar(multi: &MultiProgress, label: &str) -> ProgressBar {
    let pb = multi.add(ProgressBar::new_spinner());
    pb.set_style(spinner_style());
    pb.set_message(label.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// One spinner per in-flight task, rendered through a shared
/// `MultiProgress` so concurrent tool calls stack without clobbering
/// each other's line.
pub struct IndicatifProgressReporter {
    multi: MultiProgress,
    slots: Arc<Mutex<HashMap<u64, Slot>>>,
    next_id: AtomicU64,
}

impl IndicatifProgressReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for IndicatifProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn add_task(&self, label: &str) -> TaskHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pb = spawn_bar(&self.multi, label);
        self.slots.lock().unwrap().insert(id, Slot::Visible(pb));
        TaskHandle(id)
    }

    fn start_debounced_task(&self, label: &str, delay: Duration) -> TaskHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().unwrap().insert(id, Slot::Pending(label.to_string()));

        let multi = self.multi.clone();
        let slots = self.slots.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut guard = slots.lock().unwrap();
            if let Some(Slot::Pending(label)) = guard.get(&id) {
                let pb = spawn_bar(&multi, label);
                guard.insert(id, Slot::Visible(pb));
            }
        });

        TaskHandle(id)
    }

    fn complete_task(&self, handle: TaskHandle, label: Option<&str>) {
        let mut guard = self.slots.lock().unwrap();
        if let Some(Slot::Visible(pb)) = guard.get(&handle.0) {
            match label {
                Some(msg) => pb.finish_with_message(msg.to_string()),
                None => pb.finish_and_clear(),
            }
        }
        guard.insert(handle.0, Slot::Done);
    }

    fn aio_io(&self) -> Box<dyn IoRegionGuard + '_> {
        let guard = self.slots.lock().unwrap();
        for slot in guard.values() {
            if let Slot::Visible(pb) = slot {
                pb.set_draw_target(ProgressDrawTarget::hidden());
            }
        }
        drop(guard);
        Box::new(SuspendGuard { slots: self.slots.clone() })
    }
}

struct SuspendGuard {
    slots: Arc<Mutex<HashMap<u64, Slot>>>,
}

impl IoRegionGuard for SuspendGuard {}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        let guard = self.slots.lock().unwrap();
        for slot in guard.values() {
            if let Slot::Visible(pb) = slot {
                pb.set_draw_target(ProgressDrawTarget::stderr());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_task_returns_unique_handles() {
        let reporter = IndicatifProgressReporter::new();
        let a = reporter.add_task("one");
        let b = reporter.add_task("two");
        assert_ne!(a, b);
        reporter.complete_task(a, None);
        reporter.complete_task(b, Some("done"));
    }

    #[test]
    fn aio_io_guard_can_be_constructed_and_dropped() {
        let reporter = IndicatifProgressReporter::new();
        let _task = reporter.add_task("x");
        let guard = reporter.aio_io();
        drop(guard);
    }

    #[tokio::test]
    async fn debounced_task_becomes_visible_after_delay() {
        let reporter = IndicatifProgressReporter::new();
        let handle = reporter.start_debounced_task("slow", Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(30)).await;
        reporter.complete_task(handle, None);
    }

    #[tokio::test]
    async fn debounced_task_completed_before_delay_never_shows() {
        let reporter = IndicatifProgressReporter::new();
        let handle = reporter.start_debounced_task("fast", Duration::from_secs(5));
        reporter.complete_task(handle, None);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
