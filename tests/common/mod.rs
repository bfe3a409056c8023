//! Local chat-completions endpoints for integration tests.
#![allow(dead_code)]

use std::time::Duration;

use axum::{http::StatusCode, routing::post, Json, Router};
use labnorm::{
    config::AiProvider,
    nlp::llm::{ChatClient, ChatEndpoint},
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Bind `app` to an ephemeral port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Endpoint whose first choice always carries `content`.
pub async fn chat_answering(content: &'static str) -> String {
    serve(Router::new().route(
        "/chat/completions",
        post(move |Json(_): Json<Value>| async move {
            Json(json!({ "choices": [{ "message": { "content": content } }] }))
        }),
    ))
    .await
}

/// Endpoint replying with a fixed status and raw body.
pub async fn chat_replying(status: StatusCode, body: &'static str) -> String {
    serve(Router::new().route(
        "/chat/completions",
        post(move || async move { (status, body) }),
    ))
    .await
}

/// Endpoint that answers only after `delay`.
pub async fn chat_stalling(delay: Duration) -> String {
    serve(Router::new().route(
        "/chat/completions",
        post(move || async move {
            tokio::time::sleep(delay).await;
            Json(json!({ "choices": [] }))
        }),
    ))
    .await
}

pub fn client(base_url: String, timeout: Duration) -> ChatClient {
    ChatClient::new(ChatEndpoint {
        provider: AiProvider::Zhipu,
        base_url,
        model: "glm-4-flash".into(),
        api_key: Some("test-key".into()),
        timeout,
    })
    .unwrap()
}
