// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// Integration tests for the full turn pipeline using a scripted provider.
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nca_core::{
    parse_assistant_message, Agent, AgentMode, CheckpointManager, TagFilter, TaskOutcome,
};
use nca_model::{
    lookup_model, ChatProvider, ChatResponse, FinishReason, Message, ProviderError, StreamEvent,
    Usage,
};
use tokio::sync::{mpsc, oneshot};

/// Plays back canned responses, streaming each one in small chunks the way
/// a real SSE stream would.
struct ScriptedProvider {
    responses: Mutex<VecDeque<ChatResponse>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ChatResponse>) -> Arc<Self> {
        Arc::new(Self { responses: Mutex::new(responses.into()) })
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn stream_chat(
        &self,
        _messages: &[Message],
        events: mpsc::Sender<StreamEvent>,
        _cancel: &mut oneshot::Receiver<()>,
    ) -> Result<ChatResponse, ProviderError> {
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("script exhausted");
        // Stream in 7-byte chunks to exercise chunk-boundary handling in
        // consumers.
        let mut rest = response.content.as_str();
        while !rest.is_empty() {
            let mut cut = rest.len().min(7);
            while !rest.is_char_boundary(cut) {
                cut += 1;
            }
            let (chunk, tail) = rest.split_at(cut);
            let _ = events.send(StreamEvent::Content(chunk.to_string())).await;
            rest = tail;
        }
        let _ = events.send(StreamEvent::Done).await;
        Ok(response)
    }

    fn model_name(&self) -> &str {
        "deepseek-chat"
    }
}

fn reply(content: &str) -> ChatResponse {
    ChatResponse {
        reasoning_content: String::new(),
        content: content.to_string(),
        usage: Some(Usage { prompt_tokens: 50, completion_tokens: 20, total_tokens: 70 }),
        finish_reason: Some(FinishReason::Stop),
    }
}

fn agent_with_script(script: Vec<ChatResponse>, workdir: &Path) -> Agent {
    Agent::new(
        ScriptedProvider::new(script),
        lookup_model("deepseek-chat"),
        CheckpointManager::load(workdir).unwrap(),
        None,
        AgentMode::Agent,
        workdir.to_path_buf(),
    )
}

#[tokio::test]
async fn full_turn_writes_edits_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("hello.txt");
    let script = vec![
        reply(&format!(
            "Creating the file.\n<write_to_file><path>{p}</path>\
             <content>hello world</content></write_to_file>",
            p = target.display()
        )),
        reply(&format!(
            "<replace_in_file><path>{p}</path><diff><<<<<<< SEARCH\nworld\n=======\nnca\n\
             >>>>>>> REPLACE</diff></replace_in_file>",
            p = target.display()
        )),
        reply("<attempt_completion><result>File created and edited.</result></attempt_completion>"),
    ];

    let mut agent = agent_with_script(script, dir.path());
    let (tx, mut rx) = mpsc::channel(1024);
    let outcome = agent.run_task("make hello.txt", tx).await.unwrap();

    assert_eq!(outcome, TaskOutcome::Completed);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello nca");

    // Both mutations were journaled under one checkpoint, in order.
    let checkpoint = agent.checkpoints().list().last().unwrap().clone();
    assert_eq!(checkpoint.operations.len(), 2);

    // Restoring the checkpoint undoes the edit and the creation.
    agent.checkpoints().restore(&checkpoint.id).unwrap();
    assert!(!target.exists());

    // Redo brings the final state back.
    agent.checkpoints().redo(&checkpoint.id).unwrap();
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello nca");

    // The display stream, reassembled through the filter, shows prose and
    // labels but no raw markup.
    let mut filter = TagFilter::new(false, false);
    let mut shown = String::new();
    while let Ok(event) = rx.try_recv() {
        if let nca_core::AgentEvent::ContentChunk(c) = event {
            shown.push_str(&filter.feed(&c));
        }
    }
    shown.push_str(&filter.flush());
    assert!(shown.contains("Creating the file."));
    assert!(shown.contains("Write "));
    assert!(!shown.contains("<write_to_file>"));
    assert!(!shown.contains("</content>"));
}

#[tokio::test]
async fn tool_errors_flow_back_as_conversation_content() {
    let dir = tempfile::tempdir().unwrap();
    let script = vec![
        reply("<read_file><path>/no/such/file.txt</path></read_file>"),
        reply("<attempt_completion><result>Could not read it.</result></attempt_completion>"),
    ];

    let mut agent = agent_with_script(script, dir.path());
    let (tx, _rx) = mpsc::channel(1024);
    let outcome = agent.run_task("read the file", tx).await.unwrap();

    assert_eq!(outcome, TaskOutcome::Completed);
    let feedback = agent
        .conversation()
        .messages()
        .iter()
        .find(|m| m.content.starts_with("[read_file] Error:"))
        .expect("tool error must be fed back to the model");
    assert!(feedback.content.contains("cannot read"));
}

#[tokio::test]
async fn search_results_reach_the_model() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("lib.rs"), "pub fn entry() {}\n").unwrap();
    let script = vec![
        reply(&format!(
            "<search_files><path>{p}</path><regex>fn \\w+</regex></search_files>",
            p = dir.path().display()
        )),
        reply("<attempt_completion><result>Found it.</result></attempt_completion>"),
    ];

    let mut agent = agent_with_script(script, dir.path());
    let (tx, _rx) = mpsc::channel(1024);
    agent.run_task("find the entry point", tx).await.unwrap();

    let feedback = agent
        .conversation()
        .messages()
        .iter()
        .find(|m| m.content.starts_with("[search_files] Result:"))
        .unwrap();
    assert!(feedback.content.contains("lib.rs:1"));
    assert!(feedback.content.contains("pub fn entry()"));
}

#[test]
fn raw_stream_and_display_stream_agree_on_the_tool() {
    // The same assistant content drives both the parser (raw buffer) and
    // the filter (display); they must tell a consistent story.
    let content = "I'll run it.\n<execute_command>\n<command>cargo build</command>\n\
                   <requires_approval>false</requires_approval>\n</execute_command>";

    let invocation = parse_assistant_message(content).unwrap();
    assert_eq!(invocation.name, "execute_command");
    assert_eq!(invocation.params["command"], "cargo build");

    let mut filter = TagFilter::new(false, false);
    let mut shown = filter.feed(content);
    shown.push_str(&filter.flush());
    assert!(shown.contains("I'll run it."));
    assert!(shown.contains("Execute "));
    assert!(shown.contains("cargo build"));
    assert!(!shown.contains("requires_approval"));
    assert!(!shown.contains("false"));
}
