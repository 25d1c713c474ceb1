//! Translate discovered tool specs into LLM function specs, and
//! accumulate streaming tool-call deltas into complete calls.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use turnloop_domain::tool::ToolSpec;

use crate::ports::llm_client::{Chunk, FinishReason, StreamInfo};

/// Build the `tools` array for a request from the currently known specs.
pub fn build_tool_specs(specs: &[ToolSpec]) -> Value {
    Value::Array(
        specs
            .iter()
            .map(|s| {
                json!({
                    "type": "function",
                    "function": {
                        "name": s.name,
                        "description": s.description,
                        "parameters": s.input_schema,
                    }
                })
            })
            .collect(),
    )
}

/// One tool call under construction, accumulated across stream deltas.
#[derive(Debug, Clone, Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Accumulates `Chunk::ToolDelta` entries keyed by stream index, and
/// tracks the two observables the state machine needs at stream end.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    calls: BTreeMap<usize, PartialCall>,
    saw_tool_delta: bool,
    finish_reason: Option<FinishReason>,
    visible_text: String,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, chunk: &Chunk) {
        match chunk {
            Chunk::Text(text) => self.visible_text.push_str(text),
            Chunk::ToolDelta { index, id, name, arguments } => {
                self.saw_tool_delta = true;
                let entry = self.calls.entry(*index).or_default();
                if let Some(id) = id {
                    entry.id = Some(id.clone());
                }
                if let Some(name) = name {
                    entry.name = Some(name.clone());
                }
                entry.arguments.push_str(arguments);
            }
            Chunk::Usage(_) | Chunk::Other => {}
        }
    }

    pub fn set_finish_reason(&mut self, reason: FinishReason) {
        self.finish_reason = Some(reason);
    }

    pub fn visible_text(&self) -> Option<String> {
        if self.visible_text.is_empty() {
            None
        } else {
            Some(self.visible_text.clone())
        }
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            finish_reason: self.finish_reason.unwrap_or(FinishReason::Other),
            saw_tool_delta: self.saw_tool_delta,
        }
    }

    /// The accumulated tool calls, in stream index order, keeping only
    /// entries that have both an id and a name (a delta that never
    /// introduced its call is unusable — the orchestrator's non-stream
    /// fallback exists for exactly this case).
    pub fn complete_tool_calls(&self) -> Vec<turnloop_domain::message::ToolCallRef> {
        self.calls
            .values()
            .filter_map(|c| {
                Some(turnloop_domain::message::ToolCallRef {
                    id: c.id.clone()?,
                    name: c.name.clone()?,
                    arguments: c.arguments.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_arguments_across_deltas() {
        let mut acc = StreamAccumulator::new();
        acc.observe(&Chunk::ToolDelta {
            index: 0,
            id: Some("call_1".into()),
            name: Some("fs__read".into()),
            arguments: "{\"path\":".into(),
        });
        acc.observe(&Chunk::ToolDelta {
            index: 0,
            id: None,
            name: None,
            arguments: "\"/x\"}".into(),
        });
        acc.set_finish_reason(FinishReason::ToolCalls);

        let calls = acc.complete_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, "{\"path\":\"/x\"}");
        assert!(acc.info().saw_tool_delta);
    }

    #[test]
    fn preserves_declaration_order_by_index() {
        let mut acc = StreamAccumulator::new();
        acc.observe(&Chunk::ToolDelta {
            index: 1,
            id: Some("call_2".into()),
            name: Some("time__now".into()),
            arguments: "{}".into(),
        });
        acc.observe(&Chunk::ToolDelta {
            index: 0,
            id: Some("call_1".into()),
            name: Some("fs__read".into()),
            arguments: "{}".into(),
        });
        let calls = acc.complete_tool_calls();
        assert_eq!(calls[0].name, "fs__read");
        assert_eq!(calls[1].name, "time__now");
    }

    #[test]
    fn incomplete_delta_without_id_is_dropped() {
        let mut acc = StreamAccumulator::new();
        acc.observe(&Chunk::ToolDelta {
            index: 0,
            id: None,
            name: None,
            arguments: "{}".into(),
        });
        assert!(acc.complete_tool_calls().is_empty());
    }

    #[test]
    fn text_chunks_accumulate_visible_text() {
        let mut acc = StreamAccumulator::new();
        acc.observe(&Chunk::Text("hi ".into()));
        acc.observe(&Chunk::Text("there".into()));
        assert_eq!(acc.visible_text(), Some("hi there".into()));
    }
}
