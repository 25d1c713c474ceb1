//! Chat session turn orchestrator: the streaming tool-use state machine.
//! A turn starts a request, streams the reply, and loops through tool
//! rounds (execute the requested calls, feed results back, request
//! again) until the model stops asking for tools or the turn is
//! cancelled or denied.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use turnloop_domain::message::{normalize, ContentPart, Message, ToolCallRef};
use turnloop_domain::tool::{split_qualified, ToolCallRequest, ToolExecutionResult, ToolSpec};
use turnloop_domain::usage::Usage;

use crate::ports::approval_policy::ApprovalPolicy;
use crate::ports::llm_client::{Chunk, FinishReason, GatewayError, LlmClient, RequestParams};
use crate::ports::mcp_client::{McpClient, TransportError};
use crate::ports::progress_reporter::ProgressReporter;
use crate::use_cases::tool_adapter::{build_tool_specs, StreamAccumulator};

const TOOL_ARG_PREVIEW_LEN: usize = 500;
const DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("tool approval denied for '{0}' while tools are required")]
    ApprovalDenied(String),
    #[error("turn cancelled")]
    Cancelled,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A user-supplied attachment, prior to multimodal content assembly.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub mime: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    pub no_tools: bool,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub final_text: Option<String>,
    /// Every message produced by this turn, in append order, starting
    /// with the user message. Commit this to the session history only
    /// after `run_turn` returns `Ok`.
    pub new_messages: Vec<Message>,
}

/// Receives visible text as it streams in, in arrival order.
pub trait TurnSink: Send {
    fn on_text(&mut self, text: &str);
}

/// No-op sink for tests and one-shot runs that only want the final text.
pub struct NullSink;
impl TurnSink for NullSink {
    fn on_text(&mut self, _text: &str) {}
}

fn build_user_content(req: &TurnRequest, vision: bool, pdf: bool) -> Message {
    if req.attachments.is_empty() {
        return Message::user(req.prompt.clone());
    }
    let mut parts = vec![ContentPart::text(req.prompt.clone())];
    let mut degraded_markers = String::new();
    for att in &req.attachments {
        let supported = (att.mime.starts_with("image/") && vision) || (att.mime == "application/pdf" && pdf);
        if supported {
            let encoded = BASE64.encode(&att.data);
            parts.push(ContentPart::image_data_url(&att.mime, &encoded));
        } else {
            degraded_markers.push_str(&format!("\n[Attached: {}, {} bytes]", att.mime, att.data.len()));
        }
    }
    if !degraded_markers.is_empty() {
        if let Some(ContentPart::Text { text }) = parts.first_mut() {
            text.push_str(&degraded_markers);
        }
    }
    Message::user_parts(parts)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

fn build_params(
    model: &str,
    messages: &[Message],
    tool_specs: &[ToolSpec],
    no_tools: bool,
    base_params: &Value,
) -> RequestParams {
    let mut params = base_params.clone();
    let obj = params.as_object_mut().expect("base params must be a JSON object");
    obj.insert("model".into(), json!(model));
    obj.insert("messages".into(), serde_json::to_value(messages).unwrap());
    if !no_tools && !tool_specs.is_empty() {
        obj.insert("tools".into(), build_tool_specs(tool_specs));
        obj.insert("tool_choice".into(), json!("auto"));
        obj.insert("parallel_tool_calls".into(), json!(true));
    }
    params
}

/// Owns one conversation's message history and usage counters. Exclusive
/// owner of its LLM client handle; owns or shares an `MCPManager`
/// depending on whether this is a one-shot run or a REPL session.
pub struct ChatSession {
    pub history: Vec<Message>,
    pub usage: Usage,
    model: String,
    base_params: Value,
    tool_choice_required: bool,
    llm: Arc<dyn LlmClient>,
    mcp: Arc<dyn McpClient>,
    approval: Arc<dyn ApprovalPolicy>,
    progress: Arc<dyn ProgressReporter>,
}

impl ChatSession {
    pub fn new(
        model: String,
        base_params: Value,
        tool_choice_required: bool,
        llm: Arc<dyn LlmClient>,
        mcp: Arc<dyn McpClient>,
        approval: Arc<dyn ApprovalPolicy>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            history: Vec::new(),
            usage: Usage::default(),
            model,
            base_params,
            tool_choice_required,
            llm,
            mcp,
            approval,
            progress,
        }
    }

    pub fn resume(mut self, history: Vec<Message>, usage: Usage) -> Self {
        self.history = normalize(&history);
        self.usage = usage;
        self
    }

    /// Drive one user prompt to completion, interleaving any number of
    /// tool rounds. On success, commits every produced message to
    /// `self.history`. On any error (including cancellation) `self.history`
    /// is left untouched.
    pub async fn run_turn(
        &mut self,
        request: TurnRequest,
        sink: &mut dyn TurnSink,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let tool_specs_by_server = self.mcp.list_tools_all().await;
        let tool_specs: Vec<ToolSpec> = tool_specs_by_server.into_values().flatten().collect();

        let caps = self.llm.capabilities(&self.model);
        let user_message = build_user_content(&request, caps.vision, caps.pdf);

        let mut conversation = normalize(&self.history);
        conversation.push(user_message.clone());
        let mut delta = vec![user_message];

        loop {
            if cancel.is_cancelled() {
                return Err(TurnError::Cancelled);
            }

            let params = build_params(&self.model, &conversation, &tool_specs, request.no_tools, &self.base_params);
            let handle = self.progress.add_task(&format!("Waiting for {}", self.model));
            let mut stream = self.llm.stream(params.clone()).await?;
            let mut acc = StreamAccumulator::new();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.progress.complete_task(handle, Some("cancelled"));
                        return Err(TurnError::Cancelled);
                    }
                    chunk = stream.next_chunk() => {
                        match chunk? {
                            Some(Chunk::Text(text)) => {
                                sink.on_text(&text);
                                acc.observe(&Chunk::Text(text));
                            }
                            Some(Chunk::Usage(delta_usage)) => {
                                self.usage.accumulate(&delta_usage);
                                acc.observe(&Chunk::Usage(delta_usage));
                            }
                            Some(other) => acc.observe(&other),
                            None => break,
                        }
                    }
                }
            }
            let stream_info = stream.finish();
            acc.set_finish_reason(stream_info.finish_reason);
            self.progress.complete_task(handle, None);

            let visible_text = acc.visible_text();
            let enters_tool_round = !request.no_tools
                && (stream_info.finish_reason == FinishReason::ToolCalls
                    || stream_info.saw_tool_delta
                    || visible_text.is_none());

            if !enters_tool_round {
                if let Some(text) = &visible_text {
                    delta.push(Message::assistant(Some(text.clone())));
                }
                return Ok(TurnOutcome { final_text: visible_text, new_messages: delta });
            }

            let mut calls = acc.complete_tool_calls();
            if calls.is_empty() {
                let fallback = self.llm.complete(params).await?;
                if let Some(usage) = &fallback.usage {
                    self.usage.accumulate(usage);
                }
                if fallback.tool_calls.is_empty() {
                    delta.push(Message::assistant(fallback.text.clone()));
                    return Ok(TurnOutcome { final_text: fallback.text, new_messages: delta });
                }
                calls = fallback.tool_calls;
            }

            let stub = Message::assistant_with_tool_calls(visible_text, calls.clone());
            delta.push(stub.clone());
            conversation.push(stub);

            let results = self.run_tool_round(&calls, &cancel).await?;
            for (call, result) in calls.iter().zip(results.into_iter()) {
                let msg = Message::tool_result(&call.id, &call.name, result.content);
                delta.push(msg.clone());
                conversation.push(msg);
            }
        }
    }

    /// Resolve approval for every call (sequential — approval
    /// confirmation is serialized by contract), then execute approved
    /// calls concurrently, returning results in declaration order.
    async fn run_tool_round(
        &self,
        calls: &[ToolCallRef],
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolExecutionResult>, TurnError> {
        #[derive(Clone, Copy)]
        enum Decision {
            Approved,
            Denied,
        }

        let mut decisions = Vec::with_capacity(calls.len());
        for call in calls {
            let (server, tool) = split_qualified(&call.name).unwrap_or_else(|_| (call.name.clone(), String::new()));
            let request = ToolCallRequest {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            };
            let auto = self.approval.is_auto_allowed(&server, &tool);
            let approved = if auto {
                true
            } else {
                let args = Value::Object(request.parsed_arguments());
                let _region = self.progress.aio_io();
                self.approval.confirm(&server, &tool, &args).await
            };
            if !approved && self.tool_choice_required {
                return Err(TurnError::ApprovalDenied(call.name.clone()));
            }
            decisions.push(if approved { Decision::Approved } else { Decision::Denied });
        }

        let mut results: Vec<Option<ToolExecutionResult>> = vec![None; calls.len()];
        let mut join_set: JoinSet<(usize, ToolExecutionResult)> = JoinSet::new();

        for (idx, (call, decision)) in calls.iter().zip(decisions.iter()).enumerate() {
            match decision {
                Decision::Denied => {
                    results[idx] = Some(ToolExecutionResult::denied(&call.id, &call.name));
                }
                Decision::Approved => {
                    let (server, tool) = split_qualified(&call.name).unwrap_or_else(|_| (call.name.clone(), String::new()));
                    let args = Value::Object(
                        ToolCallRequest {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        }
                        .parsed_arguments(),
                    );
                    let preview = truncate(&args.to_string(), TOOL_ARG_PREVIEW_LEN);
                    let mcp = self.mcp.clone();
                    let progress = self.progress.clone();
                    let call_id = call.id.clone();
                    let call_name = call.name.clone();
                    join_set.spawn(async move {
                        let handle = progress.start_debounced_task(&format!("{call_name}({preview})"), DEBOUNCE);
                        let outcome = match mcp.call_tool(&server, &tool, args).await {
                            Ok(content) => ToolExecutionResult::ok(call_id, call_name, content),
                            Err(err) => ToolExecutionResult::error(call_id, call_name, err.to_string()),
                        };
                        progress.complete_task(handle, None);
                        (idx, outcome)
                    });
                }
            }
        }

        while let Some(joined) = join_set.join_next().await {
            if cancel.is_cancelled() {
                join_set.abort_all();
                return Err(TurnError::Cancelled);
            }
            let (idx, outcome) = joined.map_err(|_| TurnError::Cancelled)?;
            results[idx] = Some(outcome);
        }

        Ok(results.into_iter().map(|r| r.expect("every index resolved")).collect())
    }

    pub fn commit(&mut self, outcome: &TurnOutcome, now: impl Fn() -> String) {
        self.history.extend(outcome.new_messages.clone());
        let _ = now;
    }
}
