use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use switchboard::agents::config::ModelConfig;
use switchboard::agents::domain::{ChatEvent, EmitAction, Message, Role};
use switchboard::agents::error::AgentResult;
use switchboard::agents::memory::{HistoryStore, InMemoryHistory};
use switchboard::agents::{ChatApplication, FunctionRuntime};
use switchboard::config::{Credentials, Settings};

type Events = Arc<Mutex<Vec<(Option<String>, ChatEvent)>>>;

fn handoff_function() -> Value {
    json!({
        "name": "handoff",
        "description": "Hand the conversation to another agent",
        "parameters": {
            "type": "object",
            "properties": { "agent": { "type": "string" } },
            "required": ["agent"]
        }
    })
}

fn handoff_agent(title: &str, emit_data: Value) -> Value {
    json!({
        "title": title,
        "functions": [handoff_function()],
        "actions": {
            "handoff": {
                "type": "emit",
                "emit_method": "switch_session",
                "emit_data": emit_data
            }
        }
    })
}

fn settings(manifests: Value) -> Settings {
    Settings {
        models: vec![ModelConfig::new("echo", "echo", "echo")],
        manifests: serde_json::from_value(manifests).unwrap(),
        ..Default::default()
    }
}

fn app(settings: Settings) -> (ChatApplication, Events) {
    let events: Events = Arc::default();
    let sink = events.clone();
    let app = ChatApplication::new(settings, Credentials::default())
        .unwrap()
        .with_callback(move |agent, event| {
            sink.lock().unwrap().push((agent.map(str::to_string), event.clone()));
        });
    (app, events)
}

fn bot_texts(events: &Events) -> Vec<String> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|(_, e)| match e {
            ChatEvent::Bot { text, partial: false } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_emit_switch_continues_under_new_agent() {
    let (mut app, events) = app(settings(json!({
        "a": handoff_agent("Agent A", json!({ "agent": "{{ agent }}", "message": "continue" })),
        "b": { "title": "Agent B" }
    })));
    assert!(app.switch_session(Some("a"), true, None, None).await);
    events.lock().unwrap().clear();

    app.ask("handoff('b')").await.unwrap();

    assert_eq!(app.session().agent_name(), Some("b"));
    assert_eq!(
        app.session().messages(),
        &[Message::user("continue"), Message::assistant("continue")]
    );

    let events = events.lock().unwrap();
    let [(emit_agent, ChatEvent::Emit { action: EmitAction::SwitchSession(request) }), (_, activation), (bot_agent, bot)] =
        events.as_slice()
    else {
        panic!("unexpected events: {:?}", events);
    };
    assert_eq!(emit_agent.as_deref(), Some("a"));
    assert_eq!(request.agent.as_deref(), Some("b"));
    assert_eq!(activation, &ChatEvent::info("Activating: Agent B"));
    assert_eq!(bot_agent.as_deref(), Some("b"));
    assert_eq!(bot, &ChatEvent::bot("continue"));
}

#[tokio::test]
async fn test_rejected_switch_keeps_session() {
    let (mut app, events) = app(settings(json!({
        "a": handoff_agent("Agent A", json!({ "agent": "{{ agent }}", "message": "continue" }))
    })));
    app.switch_session(Some("a"), true, None, None).await;
    let session_id = app.session().session_id().to_string();

    app.ask("handoff('nobody')").await.unwrap();

    assert_eq!(app.session().agent_name(), Some("a"));
    assert_eq!(app.session().session_id(), session_id);
    // Nothing was appended after the function result
    let last = app.session().messages().last().unwrap();
    assert_eq!(last.role, Role::Function);
    assert_eq!(last.name.as_deref(), Some("handoff"));

    let events = events.lock().unwrap();
    assert!(matches!(
        &events.last().unwrap().1,
        ChatEvent::Error { message } if message == "Invalid agent: nobody"
    ));
}

#[tokio::test]
async fn test_memory_merges_across_handoffs() {
    let emit_data = json!({
        "agent": "{{ agent }}",
        "message": "continue",
        "memory": { "x": 1 },
        "merge": true
    });
    let (mut app, _) = app(settings(json!({
        "a": handoff_agent("Agent A", emit_data.clone()),
        "b": handoff_agent("Agent B", emit_data)
    })));
    let memory = json!({ "y": 2 }).as_object().cloned().unwrap();
    app.switch_session(Some("a"), true, Some(memory), None).await;

    app.ask("handoff('b')").await.unwrap();
    assert_eq!(app.session().agent_name(), Some("b"));
    assert_eq!(Value::Object(app.session().memory().clone()), json!({ "x": 1, "y": 2 }));

    app.ask("handoff('a')").await.unwrap();
    assert_eq!(app.session().agent_name(), Some("a"));
    assert_eq!(Value::Object(app.session().memory().clone()), json!({ "x": 1, "y": 2 }));
}

#[tokio::test]
async fn test_memory_replaced_without_merge() {
    let (mut app, _) = app(settings(json!({
        "a": handoff_agent("Agent A", json!({
            "agent": "{{ agent }}",
            "memory": { "x": 1 },
            "merge": false
        })),
        "b": { "title": "Agent B", "prompt": "x is {{ x }}" }
    })));
    let memory = json!({ "y": 2 }).as_object().cloned().unwrap();
    app.switch_session(Some("a"), true, Some(memory), None).await;

    app.ask("handoff('b')").await.unwrap();
    assert_eq!(app.session().agent_name(), Some("b"));
    assert_eq!(Value::Object(app.session().memory().clone()), json!({ "x": 1 }));
    assert_eq!(app.session().messages()[0], Message::system("x is 1"));
}

#[tokio::test]
async fn test_streaming_matches_whole_response() {
    let question = "the quick brown fox jumps over the lazy dog";

    let (mut whole_app, whole_events) = app(settings(json!({ "a": { "title": "A" } })));
    whole_app.switch_session(Some("a"), false, None, None).await;
    whole_app.ask(question).await.unwrap();

    let (mut stream_app, stream_events) = app(settings(json!({ "a": { "title": "A", "stream": true } })));
    stream_app.switch_session(Some("a"), false, None, None).await;
    stream_app.ask(question).await.unwrap();

    let fragments: String = stream_events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|(_, e)| match e {
            ChatEvent::Bot { text, partial: true } => Some(text.clone()),
            _ => None,
        })
        .collect();

    assert_eq!(bot_texts(&whole_events), vec![question.to_string()]);
    assert_eq!(fragments, question);
    assert_eq!(whole_app.session().messages(), stream_app.session().messages());
}

#[tokio::test]
async fn test_cancel_reaches_session_after_handoff() {
    let app = ChatApplication::new(
        settings(json!({
            "a": handoff_agent("Agent A", json!({ "agent": "{{ agent }}", "message": "one two three four five" })),
            "b": { "title": "Agent B", "stream": true }
        })),
        Credentials::default(),
    )
    .unwrap();

    // Taken before the handoff, the way the REPL does
    let cancel = app.cancel_handle();
    let partials = Arc::new(Mutex::new(Vec::new()));
    let sink = partials.clone();
    let mut app = app.with_callback(move |_, event| {
        if let ChatEvent::Bot { text, partial: true } = event {
            sink.lock().unwrap().push(text.clone());
            cancel.cancel();
        }
    });
    app.switch_session(Some("a"), false, None, None).await;

    app.ask("handoff('b')").await.unwrap();

    assert_eq!(app.session().agent_name(), Some("b"));
    assert_eq!(*partials.lock().unwrap(), vec!["one ".to_string()]);
    assert_eq!(
        app.session().messages(),
        &[Message::user("one two three four five"), Message::assistant("one ")]
    );

    // The next question starts uncancelled
    app.ask("six seven").await.unwrap();
    assert_eq!(partials.lock().unwrap().len(), 2);
}

struct NotebookRuntime;

#[async_trait]
impl FunctionRuntime for NotebookRuntime {
    async fn call_function(&self, name: &str, arguments: &Value) -> AgentResult<Value> {
        Ok(json!({ "called": name, "arguments": arguments }))
    }

    async fn create_notebook(&self, model_name: &str) -> AgentResult<Value> {
        Ok(json!({ "notebook_name": format!("{}-notebook", model_name) }))
    }
}

#[tokio::test]
async fn test_notebook_created_on_activation() {
    let (app, events) = app(settings(json!({
        "analyst": { "title": "Analyst", "notebook": true, "intro": ["Ready."] }
    })));
    let mut app = app.with_runtime(Arc::new(NotebookRuntime));
    assert!(app.switch_session(Some("analyst"), true, None, None).await);

    let events: Vec<ChatEvent> = events.lock().unwrap().iter().map(|(_, e)| e.clone()).collect();
    assert_eq!(
        events,
        vec![
            ChatEvent::info("Activating: Analyst"),
            ChatEvent::info("Created a notebook: echo-notebook"),
            ChatEvent::bot("Ready."),
        ]
    );
}

#[tokio::test]
async fn test_runtime_result_fed_back_to_model() {
    let (app, events) = app(settings(json!({
        "a": { "title": "A", "functions": [handoff_function()] }
    })));
    let mut app = app.with_runtime(Arc::new(NotebookRuntime));
    app.switch_session(Some("a"), false, None, None).await;

    app.ask("handoff('z')").await.unwrap();

    let messages = app.session().messages();
    assert_eq!(messages[1].role, Role::Function);
    assert!(messages[1].text().contains("\"called\":\"handoff\""));
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|(_, e)| matches!(e, ChatEvent::Function { name, .. } if name == "handoff")));
}

#[tokio::test]
async fn test_transcript_persisted_to_history() {
    let history = Arc::new(InMemoryHistory::new());
    let (app, _) = app(settings(json!({ "a": { "title": "A" } })));
    let mut app = app.with_history(history.clone());
    app.switch_session(Some("a"), false, None, None).await;

    app.ask("remember me").await.unwrap();

    let session_id = app.session().session_id().to_string();
    let record = history.load(&session_id).await.unwrap().expect("saved transcript");
    assert_eq!(record.agent_name.as_deref(), Some("a"));
    assert_eq!(
        record.messages,
        vec![Message::user("remember me"), Message::assistant("remember me")]
    );
    assert_eq!(history.list(Some("a")).await.unwrap(), vec![session_id]);
}
