use std::time::Duration;

use readagent::chat::{ChatError, ChatNotice, ChatSession, IgnoreReason, Message, Role, SendOutcome};
use readagent::test_utils::test_helpers::{Chunk, FakeTransport};
use tokio::sync::mpsc::UnboundedReceiver;

fn ready_session() -> ChatSession {
    let chat = ChatSession::new("user_test");
    chat.set_session_id(Some("s1".to_string()));
    chat.set_document_loaded(true);
    chat
}

fn input_notices(rx: &mut UnboundedReceiver<ChatNotice>) -> Vec<bool> {
    let mut seen = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        if let ChatNotice::InputEnabled(enabled) = notice {
            seen.push(enabled);
        }
    }
    seen
}

#[tokio::test]
async fn split_reply_is_assembled_and_input_comes_back_once() {
    let chat = ready_session();
    let transport = FakeTransport::new().with_reply(vec![
        Chunk::delta("Hel"),
        Chunk::delta("lo"),
        Chunk::done(),
    ]);
    let mut notices = chat.subscribe();

    let outcome = chat.send_message("hi", &transport).await.unwrap();

    assert_eq!(outcome, SendOutcome::Completed);
    let history = chat.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], Message::user("hi"));
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].content, "Hello");
    assert!(!history[1].is_streaming);
    assert!(!history[1].is_error);
    assert_eq!(input_notices(&mut notices), vec![false, true]);
    assert!(chat.can_send());

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].session_id, "s1");
    assert_eq!(requests[0].user_id, "user_test");
    assert_eq!(requests[0].message, "hi");
}

#[tokio::test]
async fn chunk_boundaries_inside_a_line_do_not_matter() {
    let chat = ready_session();
    let transport = FakeTransport::new().with_reply(vec![
        Chunk::data("data: {\"cont"),
        Chunk::data("ent\":\"Hé"),
        Chunk::data("llo\"}\n\ndata: {\"event\":\"done\"}\n"),
    ]);

    chat.send_message("q", &transport).await.unwrap();

    assert_eq!(chat.last().unwrap().content, "Héllo");
}

#[tokio::test]
async fn empty_and_whitespace_messages_are_no_ops() {
    let chat = ready_session();
    let transport = FakeTransport::new();

    for text in ["", "   ", "\n\t"] {
        let outcome = chat.send_message(text, &transport).await.unwrap();
        assert_eq!(outcome, SendOutcome::Ignored(IgnoreReason::Empty));
    }
    assert!(chat.is_empty());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn missing_session_fails_before_any_request() {
    let chat = ChatSession::new("user_test");
    chat.set_document_loaded(true);
    let transport = FakeTransport::new();

    let result = chat.send_message("hello", &transport).await;

    assert_eq!(result, Err(ChatError::NoSession));
    assert!(chat.is_empty());
    assert!(transport.requests().is_empty());
    assert!(chat.can_send());
}

#[tokio::test]
async fn disabled_input_ignores_sends() {
    let chat = ChatSession::new("user_test");
    chat.set_session_id(Some("s1".to_string()));
    let transport = FakeTransport::new();

    let outcome = chat.send_message("hello", &transport).await.unwrap();

    assert_eq!(outcome, SendOutcome::Ignored(IgnoreReason::InputDisabled));
    assert!(transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_send_while_streaming_is_rejected() {
    let chat = ready_session();
    let transport = FakeTransport::new().with_reply(vec![Chunk::delta("thinking"), Chunk::Hang]);

    let first = chat.send_message("one", &transport);
    let second = async {
        while !chat.is_generating() {
            tokio::task::yield_now().await;
        }
        let outcome = chat.send_message("two", &transport).await;
        assert_eq!(outcome, Ok(SendOutcome::Ignored(IgnoreReason::Busy)));
    };
    let timed_out = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(first, second)
    })
    .await;

    assert!(timed_out.is_err(), "the hanging stream never completes");
    assert_eq!(transport.requests().len(), 1);
    let history = chat.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "one");
}

#[tokio::test]
async fn dropping_the_turn_still_releases_the_input() {
    let chat = ready_session();
    let transport = FakeTransport::new().with_reply(vec![Chunk::delta("partial"), Chunk::Hang]);
    let mut notices = chat.subscribe();

    {
        let send = chat.send_message("one", &transport);
        tokio::pin!(send);
        let polled = tokio::time::timeout(Duration::from_millis(20), &mut send).await;
        assert!(polled.is_err());
        assert!(chat.is_generating());
    }

    assert!(!chat.is_generating());
    assert!(chat.can_send());
    assert!(!chat.last().unwrap().is_streaming);
    assert_eq!(chat.last().unwrap().content, "partial");
    assert_eq!(input_notices(&mut notices), vec![false, true]);
}

#[tokio::test]
async fn backend_error_event_marks_the_reply() {
    let chat = ready_session();
    let transport = FakeTransport::new().with_reply(vec![
        Chunk::delta("Hal"),
        Chunk::data("data: {\"error\":\"model overloaded\"}\n\n"),
        Chunk::delta("ignored"),
    ]);
    let mut notices = chat.subscribe();

    let outcome = chat.send_message("hi", &transport).await.unwrap();

    assert_eq!(outcome, SendOutcome::Failed("model overloaded".to_string()));
    let reply = chat.last().unwrap();
    assert!(reply.is_error);
    assert_eq!(reply.content, "model overloaded");
    assert_eq!(input_notices(&mut notices), vec![false, true]);
}

#[tokio::test]
async fn transport_failure_mid_stream_becomes_an_error_message() {
    let chat = ready_session();
    let transport = FakeTransport::new().with_reply(vec![
        Chunk::delta("Hel"),
        Chunk::Fail("connection reset".to_string()),
    ]);
    let mut notices = chat.subscribe();

    let outcome = chat.send_message("hi", &transport).await.unwrap();

    assert_eq!(outcome, SendOutcome::Failed("connection reset".to_string()));
    assert!(chat.last().unwrap().is_error);
    assert_eq!(input_notices(&mut notices), vec![false, true]);
    assert!(chat.can_send());
}

#[tokio::test]
async fn failing_to_open_the_stream_reports_in_the_chat() {
    let chat = ready_session();
    let transport = FakeTransport::new().with_open_failure("service unavailable");

    let outcome = chat.send_message("hi", &transport).await.unwrap();

    let SendOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.contains("service unavailable"));
    let reply = chat.last().unwrap();
    assert!(reply.is_error);
    assert_eq!(reply.content, message);
    assert!(chat.can_send());
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
    let chat = ready_session();
    let transport = FakeTransport::new().with_reply(vec![
        Chunk::data(": keep-alive\n"),
        Chunk::data("data: {not json}\n"),
        Chunk::delta("ok"),
        Chunk::done(),
    ]);

    let outcome = chat.send_message("hi", &transport).await.unwrap();

    assert_eq!(outcome, SendOutcome::Completed);
    assert_eq!(chat.last().unwrap().content, "ok");
}

#[tokio::test]
async fn delete_removes_each_index_once() {
    let chat = ready_session();
    chat.push_system("Welcome");
    chat.push_assistant("Summary");
    chat.push_system("Note");

    assert_eq!(chat.delete_messages(&[0, 2, 2, 9]), 2);
    assert_eq!(chat.history(), vec![Message::assistant("Summary")]);
    assert_eq!(chat.message_text(0).as_deref(), Some("Summary"));
    assert!(chat.delete_message(0));
    assert!(chat.is_empty());
}

#[tokio::test]
async fn loading_history_replaces_messages() {
    let chat = ready_session();
    chat.push_system("old");
    let mut streaming = Message::assistant("stale");
    streaming.is_streaming = true;

    chat.load_history(vec![Message::user("q"), streaming]);

    let history = chat.history();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|m| !m.is_streaming));
}
