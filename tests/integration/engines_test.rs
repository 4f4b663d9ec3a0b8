use axum::http::StatusCode;
use serde_json::{json, Value};
use switchboard::agents::config::ModelConfig;
use switchboard::agents::domain::{Manifest, Message};
use switchboard::agents::llm::{HostedEngine, LlmEngine, OllamaEngine, OpenAiEngine, OpenAiVisionEngine};
use switchboard::config::Credentials;

use crate::common::stub_provider::{Reply, StubProvider};

fn credentials() -> Credentials {
    Credentials::default()
        .with("OPENAI_API_KEY", "sk-test")
        .with("HOSTED_KEY", "hosted-secret")
}

fn lookup_manifest() -> Manifest {
    serde_json::from_value(json!({
        "functions": [{
            "name": "lookup",
            "description": "Weather for a city",
            "parameters": {
                "type": "object",
                "properties": { "city": { "type": "string" } },
                "required": ["city"]
            }
        }]
    }))
    .unwrap()
}

fn chat_reply(message: Value) -> Reply {
    Reply::json(json!({
        "model": "gpt-3.5-turbo",
        "choices": [{ "index": 0, "message": message, "finish_reason": "stop" }],
        "usage": { "prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12 }
    }))
}

fn openai_engine(server: &StubProvider, model: &str) -> OpenAiEngine {
    let config = ModelConfig::new("gpt", "openai-gpt", model)
        .with_api_key("OPENAI_API_KEY")
        .with_api_base(server.base_url.clone());
    OpenAiEngine::new(&config, &credentials()).unwrap()
}

// OpenAI

#[tokio::test]
async fn test_openai_text_reply() {
    let server = StubProvider::start(
        "/chat/completions",
        chat_reply(json!({ "role": "assistant", "content": "Hello!" })),
    )
    .await;
    let engine = openai_engine(&server, "gpt-3.5-turbo");

    let completion = engine
        .chat_completion(&[Message::user("hi")], &Manifest::default(), false)
        .await;
    assert_eq!(completion.text.as_deref(), Some("Hello!"));
    assert!(completion.function_call.is_none());
    assert!(!completion.is_failure());

    let request = server.single_request();
    assert_eq!(request.headers.get("authorization").unwrap(), "Bearer sk-test");
    assert_eq!(request.body["model"], "gpt-3.5-turbo");
    assert_eq!(request.body["messages"], json!([{ "role": "user", "content": "hi" }]));
    assert!(request.body.get("functions").is_none());
    assert!(request.body.get("stream").is_none());
}

#[tokio::test]
async fn test_openai_native_function_call() {
    let server = StubProvider::start(
        "/chat/completions",
        chat_reply(json!({
            "role": "assistant",
            "content": null,
            "function_call": { "name": "lookup", "arguments": "{\"city\": \"Paris\"}" }
        })),
    )
    .await;
    let engine = openai_engine(&server, "gpt-3.5-turbo");

    let completion = engine
        .chat_completion(&[Message::user("weather in Paris?")], &lookup_manifest(), false)
        .await;
    let call = completion.function_call.expect("function call");
    assert_eq!(call.name, "lookup");
    assert_eq!(call.arguments, json!({ "city": "Paris" }));
    assert!(completion.text.is_none());

    let request = server.single_request();
    assert_eq!(request.body["functions"][0]["name"], "lookup");
}

#[tokio::test]
async fn test_openai_never_calls_without_declared_functions() {
    let server = StubProvider::start(
        "/chat/completions",
        chat_reply(json!({
            "role": "assistant",
            "content": "lookup('Paris')",
            "function_call": { "name": "lookup", "arguments": "{}" }
        })),
    )
    .await;
    let engine = openai_engine(&server, "gpt-3.5-turbo");

    let completion = engine
        .chat_completion(&[Message::user("hi")], &Manifest::default(), false)
        .await;
    assert!(completion.function_call.is_none());
    assert_eq!(completion.text.as_deref(), Some("lookup('Paris')"));
}

#[tokio::test]
async fn test_openai_extracts_call_from_text() {
    let server = StubProvider::start(
        "/chat/completions",
        chat_reply(json!({ "role": "assistant", "content": "Let me check. lookup('Paris')" })),
    )
    .await;
    let engine = openai_engine(&server, "gpt-3.5-turbo");

    let completion = engine
        .chat_completion(&[Message::user("weather in Paris?")], &lookup_manifest(), false)
        .await;
    let call = completion.function_call.expect("extracted call");
    assert_eq!(call.name, "lookup");
    assert_eq!(call.arguments, json!({ "city": "Paris" }));
}

#[tokio::test]
async fn test_openai_error_status_degrades() {
    let server = StubProvider::start(
        "/chat/completions",
        Reply::error(StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded"),
    )
    .await;
    let engine = openai_engine(&server, "gpt-3.5-turbo");

    let completion = engine
        .chat_completion(&[Message::user("hi")], &lookup_manifest(), false)
        .await;
    assert_eq!(completion.text.as_deref(), Some(""));
    assert!(completion.function_call.is_none());
    assert!(completion.failure.unwrap().contains("500"));
}

#[tokio::test]
async fn test_openai_streamed_text() {
    let server = StubProvider::start(
        "/chat/completions",
        Reply::sse(&[
            json!({ "choices": [{ "delta": { "role": "assistant", "content": "" }, "finish_reason": null }] }),
            json!({ "choices": [{ "delta": { "content": "Hello" }, "finish_reason": null }] }),
            json!({ "choices": [{ "delta": { "content": " world" }, "finish_reason": null }] }),
            json!({ "choices": [{ "delta": {}, "finish_reason": "stop" }] }),
        ]),
    )
    .await;
    let engine = openai_engine(&server, "gpt-3.5-turbo");
    assert!(engine.supports_streaming());

    let mut stream = engine
        .complete_stream(&[Message::user("hi")], &Manifest::default(), false)
        .unwrap();
    let mut fragments = Vec::new();
    while let Some(chunk) = stream.next_chunk().await {
        let chunk = chunk.unwrap();
        if chunk.has_content() {
            fragments.push(chunk.content);
        }
    }
    assert_eq!(fragments, vec!["Hello", " world"]);

    let request = server.single_request();
    assert_eq!(request.body["stream"], true);
}

#[tokio::test]
async fn test_openai_streamed_function_call() {
    let server = StubProvider::start(
        "/chat/completions",
        Reply::sse(&[
            json!({ "choices": [{ "delta": { "function_call": { "name": "lookup", "arguments": "" } }, "finish_reason": null }] }),
            json!({ "choices": [{ "delta": { "function_call": { "arguments": "{\"city\":" } }, "finish_reason": null }] }),
            json!({ "choices": [{ "delta": { "function_call": { "arguments": " \"Rome\"}" } }, "finish_reason": null }] }),
            json!({ "choices": [{ "delta": {}, "finish_reason": "function_call" }] }),
        ]),
    )
    .await;
    let engine = openai_engine(&server, "gpt-3.5-turbo");

    let completion = engine
        .complete_stream(&[Message::user("weather in Rome?")], &lookup_manifest(), false)
        .unwrap()
        .collect()
        .await
        .unwrap();
    let call = completion.function_call.expect("function call");
    assert_eq!(call.name, "lookup");
    assert_eq!(call.arguments, json!({ "city": "Rome" }));
}

#[tokio::test]
async fn test_openai_stream_error_status() {
    let server = StubProvider::start(
        "/chat/completions",
        Reply::error(StatusCode::TOO_MANY_REQUESTS, "slow down"),
    )
    .await;
    let engine = openai_engine(&server, "gpt-3.5-turbo");

    let result = engine
        .complete_stream(&[Message::user("hi")], &Manifest::default(), false)
        .unwrap()
        .collect()
        .await;
    assert!(result.is_err());
}

// Vision

fn vision_engine(server: &StubProvider) -> OpenAiVisionEngine {
    let config = ModelConfig::new("vision", "openai-vision", "gpt-4-vision-preview")
        .with_api_key("OPENAI_API_KEY")
        .with_api_base(server.base_url.clone());
    OpenAiVisionEngine::new(&config, &credentials()).unwrap()
}

#[tokio::test]
async fn test_vision_sends_image_part() {
    let server = StubProvider::start(
        "/chat/completions",
        chat_reply(json!({ "role": "assistant", "content": "A cat on a mat." })),
    )
    .await;
    let engine = vision_engine(&server);

    let completion = engine
        .chat_completion(
            &[Message::user("What is this? https://x.test/cat.png")],
            &lookup_manifest(),
            false,
        )
        .await;
    assert_eq!(completion.text.as_deref(), Some("A cat on a mat."));

    let request = server.single_request();
    assert_eq!(
        request.body["messages"][0]["content"],
        json!([
            { "type": "text", "text": "What is this?" },
            { "type": "image_url", "image_url": { "url": "https://x.test/cat.png" } }
        ])
    );
    assert_eq!(request.body["max_tokens"], 1024);
    assert!(request.body.get("functions").is_none());
}

#[tokio::test]
async fn test_vision_without_url_degrades() {
    let server = StubProvider::start(
        "/chat/completions",
        chat_reply(json!({ "role": "assistant", "content": "unused" })),
    )
    .await;
    let engine = vision_engine(&server);

    let completion = engine
        .chat_completion(&[Message::user("What is this?")], &Manifest::default(), false)
        .await;
    assert!(completion.is_failure());
    assert_eq!(completion.text.as_deref(), Some(""));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_vision_extracts_call_from_text() {
    let server = StubProvider::start(
        "/chat/completions",
        chat_reply(json!({ "role": "assistant", "content": "call lookup('Paris')" })),
    )
    .await;
    let engine = vision_engine(&server);

    let completion = engine
        .chat_completion(
            &[Message::user("Where was this taken? https://x.test/tower.png")],
            &lookup_manifest(),
            false,
        )
        .await;
    let call = completion.function_call.expect("extracted call");
    assert_eq!(call.name, "lookup");
    assert_eq!(call.arguments, json!({ "city": "Paris" }));
    assert!(completion.text.is_none());
}

#[tokio::test]
async fn test_vision_error_status_degrades() {
    let server = StubProvider::start(
        "/chat/completions",
        Reply::error(StatusCode::INTERNAL_SERVER_ERROR, "vision backend down"),
    )
    .await;
    let engine = vision_engine(&server);

    let completion = engine
        .chat_completion(&[Message::user("What is this? https://x.test/cat.png")], &lookup_manifest(), false)
        .await;
    assert!(completion.is_failure());
    assert_eq!(completion.text.as_deref(), Some(""));
    assert!(completion.function_call.is_none());
    assert_eq!(server.requests().len(), 1);
}

// Hosted

async fn hosted_engine(reply: Reply) -> (StubProvider, HostedEngine) {
    let server = StubProvider::start("/v2/models/llama/infer", reply).await;
    let config = ModelConfig::new("llama", "hosted", "llama2-7b")
        .with_api_key("HOSTED_KEY")
        .with_url(server.url("/v2/models/llama/infer"))
        .with_header_api_key("X-Api-Key");
    let engine = HostedEngine::new(&config, &credentials()).unwrap();
    (server, engine)
}

fn inference_reply(message: Value) -> Reply {
    Reply::json(json!({
        "model_name": "llama",
        "outputs": [{
            "name": "output-0",
            "datatype": "BYTES",
            "shape": [1],
            "data": [json!({ "message": message }).to_string()]
        }]
    }))
}

#[tokio::test]
async fn test_hosted_decodes_nested_message() {
    let (server, engine) = hosted_engine(inference_reply(json!(["Bonjour", " Paris"]))).await;

    let messages = vec![Message::system("Be brief."), Message::user("Say hi")];
    let completion = engine.chat_completion(&messages, &Manifest::default(), false).await;
    assert_eq!(completion.text.as_deref(), Some("Bonjour Paris"));

    let request = server.single_request();
    assert_eq!(request.headers.get("x-api-key").unwrap(), "hosted-secret");
    let prompt = request.body["inputs"][0]["data"][0].as_str().unwrap();
    assert!(prompt.contains("[INST]"));
    assert!(prompt.contains("Be brief."));
    assert!(prompt.contains("Say hi"));
    assert_eq!(request.body["inputs"][0]["datatype"], "BYTES");
}

#[tokio::test]
async fn test_hosted_extracts_call_from_text() {
    let (server, engine) = hosted_engine(inference_reply(json!("lookup('Lyon')"))).await;

    let completion = engine
        .chat_completion(&[Message::user("weather in Lyon?")], &lookup_manifest(), false)
        .await;
    let call = completion.function_call.expect("extracted call");
    assert_eq!(call.name, "lookup");
    assert_eq!(call.arguments, json!({ "city": "Lyon" }));

    let prompt = server.single_request().body["inputs"][0]["data"][0]
        .as_str()
        .unwrap()
        .to_string();
    assert!(prompt.contains("lookup"));
}

#[tokio::test]
async fn test_hosted_error_status_degrades() {
    let (_server, engine) = hosted_engine(Reply::error(StatusCode::BAD_GATEWAY, "no backend")).await;

    let completion = engine
        .chat_completion(&[Message::user("hi")], &Manifest::default(), false)
        .await;
    assert!(completion.is_failure());
    assert_eq!(completion.text.as_deref(), Some(""));
    assert!(completion.function_call.is_none());
}

// Ollama

fn ollama_engine(server: &StubProvider) -> OllamaEngine {
    let config = ModelConfig::new("local", "ollama", "llama3").with_api_base(server.base_url.clone());
    OllamaEngine::new(&config, &Credentials::default()).unwrap()
}

#[tokio::test]
async fn test_ollama_chat() {
    let server = StubProvider::start(
        "/api/chat",
        Reply::json(json!({
            "model": "llama3",
            "message": { "role": "assistant", "content": "Hi" },
            "done": true,
            "prompt_eval_count": 4,
            "eval_count": 1
        })),
    )
    .await;
    let engine = ollama_engine(&server);

    let completion = engine
        .chat_completion(&[Message::user("hello")], &Manifest::default(), false)
        .await;
    assert_eq!(completion.text.as_deref(), Some("Hi"));

    let request = server.single_request();
    assert_eq!(request.body["stream"], false);
    assert_eq!(request.body["messages"][0]["content"], "hello");
}

#[tokio::test]
async fn test_ollama_streamed_text() {
    let server = StubProvider::start(
        "/api/chat",
        Reply::ndjson(&[
            json!({ "message": { "role": "assistant", "content": "Hi" }, "done": false }),
            json!({ "message": { "role": "assistant", "content": " there" }, "done": false }),
            json!({ "done": true }),
        ]),
    )
    .await;
    let engine = ollama_engine(&server);

    let completion = engine
        .complete_stream(&[Message::user("hello")], &Manifest::default(), false)
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(completion.text.as_deref(), Some("Hi there"));
}

#[tokio::test]
async fn test_ollama_error_status_degrades() {
    let server = StubProvider::start(
        "/api/chat",
        Reply::error(StatusCode::INTERNAL_SERVER_ERROR, "model not loaded"),
    )
    .await;
    let engine = ollama_engine(&server);

    let completion = engine
        .chat_completion(&[Message::user("hello")], &lookup_manifest(), false)
        .await;
    assert!(completion.is_failure());
    assert_eq!(completion.text.as_deref(), Some(""));
    assert!(completion.function_call.is_none());
}
