/// Round-trip deserialization tests for [`ThreadEvent`] using representative
/// JSONL payloads from the `codex exec --json` protocol, plus shape checks
/// for the result document.
#[cfg(test)]
mod unit {
    use crate::types::{BridgeResult, RunOutcome, SandboxPolicy, ThreadEvent, ThreadItem};
    use crate::BridgeError;

    fn parse(json: &str) -> ThreadEvent {
        serde_json::from_str(json).expect("failed to parse event")
    }

    #[test]
    fn parse_thread_started() {
        let event = parse(r#"{"type":"thread.started","thread_id":"0199a213-81ef"}"#);
        assert_eq!(event.session_id(), Some("0199a213-81ef"));
        assert!(!event.is_terminal());
    }

    #[test]
    fn parse_turn_lifecycle() {
        let started = parse(r#"{"type":"turn.started"}"#);
        assert!(!started.is_terminal());

        let completed = parse(
            r#"{"type":"turn.completed","usage":{"input_tokens":1200,"cached_input_tokens":300,"output_tokens":80}}"#,
        );
        assert!(completed.is_terminal());
        let ThreadEvent::TurnCompleted(c) = completed else {
            panic!("expected TurnCompleted")
        };
        assert_eq!(c.usage.input_tokens, 1200);
        assert_eq!(c.usage.output_tokens, 80);

        let failed = parse(r#"{"type":"turn.failed","error":{"message":"boom"}}"#);
        assert!(failed.is_terminal());
        let ThreadEvent::TurnFailed(f) = failed else {
            panic!("expected TurnFailed")
        };
        assert_eq!(f.error.message, "boom");
    }

    #[test]
    fn parse_agent_message_item() {
        let event = parse(
            r#"{"type":"item.completed","item":{"id":"item_3","type":"agent_message","text":"All done."}}"#,
        );
        let Some(ThreadItem::AgentMessage { text }) = event.item() else {
            panic!("expected AgentMessage")
        };
        assert_eq!(text, "All done.");
    }

    #[test]
    fn parse_command_execution_item() {
        let event = parse(
            r#"{"type":"item.completed","item":{"type":"command_execution","command":"cargo test","aggregated_output":"ok. 42 passed","exit_code":0,"status":"completed"}}"#,
        );
        let Some(ThreadItem::CommandExecution {
            command,
            aggregated_output,
            exit_code,
            ..
        }) = event.item()
        else {
            panic!("expected CommandExecution")
        };
        assert_eq!(command, "cargo test");
        assert_eq!(aggregated_output, "ok. 42 passed");
        assert_eq!(*exit_code, Some(0));
    }

    #[test]
    fn parse_command_execution_started_has_no_output_yet() {
        let event = parse(
            r#"{"type":"item.started","item":{"type":"command_execution","command":"ls"}}"#,
        );
        let Some(ThreadItem::CommandExecution {
            aggregated_output, ..
        }) = event.item()
        else {
            panic!("expected CommandExecution")
        };
        assert!(aggregated_output.is_empty());
    }

    #[test]
    fn parse_function_call_pair() {
        let call = parse(
            r#"{"type":"item.started","item":{"type":"function_call","name":"fetch","arguments":"{\"url\":\"x\"}"}}"#,
        );
        assert!(matches!(
            call.item(),
            Some(ThreadItem::FunctionCall { .. })
        ));

        let output = parse(
            r#"{"type":"item.completed","item":{"type":"function_call_output","output":"200 OK"}}"#,
        );
        let Some(ThreadItem::FunctionCallOutput { output }) = output.item() else {
            panic!("expected FunctionCallOutput")
        };
        assert_eq!(output, "200 OK");
    }

    #[test]
    fn parse_unknown_item_type_becomes_other() {
        let event = parse(
            r#"{"type":"item.completed","item":{"type":"web_search","query":"rust serde"}}"#,
        );
        assert!(matches!(event.item(), Some(ThreadItem::Other)));
    }

    #[test]
    fn parse_stream_error_and_transience() {
        let event = parse(r#"{"type":"error","message":"Reconnecting... 3/5"}"#);
        let ThreadEvent::StreamError(e) = event else {
            panic!("expected StreamError")
        };
        assert!(e.is_transient());

        let event = parse(r#"{"type":"error","message":"stream disconnected"}"#);
        let ThreadEvent::StreamError(e) = event else {
            panic!("expected StreamError")
        };
        assert!(!e.is_transient());
    }

    #[test]
    fn sandbox_policy_round_trips_its_cli_spellings() {
        for (text, policy) in [
            ("read-only", SandboxPolicy::ReadOnly),
            ("workspace-write", SandboxPolicy::WorkspaceWrite),
            ("danger-full-access", SandboxPolicy::DangerFullAccess),
        ] {
            assert_eq!(text.parse::<SandboxPolicy>().unwrap(), policy);
            assert_eq!(policy.as_str(), text);
        }
        assert!(matches!(
            "yolo".parse::<SandboxPolicy>(),
            Err(BridgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn result_document_success_shape() {
        let outcome = RunOutcome {
            session_id: Some("s1".into()),
            agent_message: "OK".into(),
            events: Vec::new(),
            error: None,
        };
        let doc = serde_json::to_value(BridgeResult::from_outcome(outcome, false)).unwrap();
        assert_eq!(doc["success"], true);
        assert_eq!(doc["session_id"], "s1");
        assert_eq!(doc["agent_messages"], "OK");
        assert!(doc.get("error").is_none());
    }

    #[test]
    fn result_document_failure_keeps_session_id_for_resume() {
        let mut outcome = RunOutcome::failed(BridgeError::Timeout { seconds: 600 });
        outcome.session_id = Some("s1".into());
        let doc = serde_json::to_value(BridgeResult::from_outcome(outcome, false)).unwrap();
        assert_eq!(doc["success"], false);
        assert_eq!(doc["session_id"], "s1");
        assert!(doc["error"].as_str().unwrap().contains("600s timeout"));
    }

    #[test]
    fn result_document_full_trace_is_a_list() {
        let outcome = RunOutcome {
            session_id: Some("s1".into()),
            agent_message: "OK".into(),
            events: vec![
                parse(r#"{"type":"thread.started","thread_id":"s1"}"#),
                parse(r#"{"type":"turn.completed","usage":{}}"#),
            ],
            error: None,
        };
        let doc = serde_json::to_value(BridgeResult::from_outcome(outcome, true)).unwrap();
        let trace = doc["agent_messages"].as_array().unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0]["type"], "thread.started");
        assert_eq!(trace[1]["type"], "turn.completed");
    }

    #[test]
    fn result_document_omits_absent_session_id() {
        let outcome = RunOutcome::failed(BridgeError::InvalidInput("prompt".into()));
        let doc = serde_json::to_value(BridgeResult::from_outcome(outcome, false)).unwrap();
        assert!(doc.get("session_id").is_none());
    }
}
