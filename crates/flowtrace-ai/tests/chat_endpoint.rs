use flowtrace_ai::{LLMProvider, OpenAICompatibleConfig, OpenAICompatibleProvider};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Serves one canned HTTP response and hands back the raw request.
async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let lower = line.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
    });

    (format!("http://{}/v1", addr), rx)
}

fn provider(base_url: String) -> OpenAICompatibleProvider {
    OpenAICompatibleProvider::new(OpenAICompatibleConfig {
        base_url,
        model: "test-model".to_string(),
        api_key: Some("sk-local".to_string()),
        provider_name: "test".to_string(),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn posts_chat_completion_and_returns_content() {
    let (base_url, request) = serve_once(
        "200 OK",
        r#"{"model":"test-model","choices":[{"message":{"role":"assistant","content":"{\"action\":\"stop\"}"},"finish_reason":"stop"}]}"#,
    )
    .await;

    let reply = provider(base_url)
        .complete("system text", "user text", 0.0)
        .await
        .unwrap();
    assert_eq!(reply, r#"{"action":"stop"}"#);

    let raw = request.await.unwrap();
    assert!(raw.starts_with("POST /v1/chat/completions"));
    assert!(raw.to_ascii_lowercase().contains("authorization: bearer sk-local"));
    assert!(raw.contains(r#""temperature":0.0"#));
    assert!(raw.contains(r#""content":"user text""#));
    assert!(!raw.contains("enable_thinking"));
}

#[tokio::test]
async fn error_status_is_reported_without_retry() {
    let (base_url, request) = serve_once("503 Service Unavailable", r#"{"error":"overloaded"}"#).await;

    let err = provider(base_url)
        .complete("s", "u", 0.0)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("503"));
    assert!(err.to_string().contains("overloaded"));

    // The stub accepts exactly one connection; a retry would have failed to connect.
    assert!(request.await.is_ok());
}
