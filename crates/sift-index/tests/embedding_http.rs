use std::time::Duration;

use sift_core::{EmbeddingConfig, EmbeddingProviderKind, SiftError};
use sift_index::embedding::{provider_from_config, EmbeddingProvider};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Read one HTTP request (headers plus `Content-Length` body).
async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Serve `responses` in order, one connection each, returning the requests.
async fn mock_server(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut stream).await);
            let response = format!(
                "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        }
        requests
    });
    (base_url, handle)
}

fn ollama_config(base_url: &str) -> EmbeddingConfig {
    EmbeddingConfig {
        provider: EmbeddingProviderKind::Ollama,
        model: "nomic-embed-text".into(),
        base_url: Some(base_url.to_string()),
        api_key: None,
        timeout_secs: 5,
    }
}

fn openai_config(base_url: &str) -> EmbeddingConfig {
    EmbeddingConfig {
        provider: EmbeddingProviderKind::OpenAi,
        model: "text-embedding-3-small".into(),
        base_url: Some(base_url.to_string()),
        api_key: Some("sk-test".into()),
        timeout_secs: 5,
    }
}

#[tokio::test]
async fn ollama_sends_one_request_per_text() {
    let (base_url, server) = mock_server(vec![
        (200, r#"{"embedding":[0.5,1.5]}"#.into()),
        (200, r#"{"embedding":[2.0,-1.0]}"#.into()),
    ])
    .await;

    let provider = provider_from_config(&ollama_config(&base_url)).unwrap();
    let vectors = provider
        .embed_many(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![0.5, 1.5], vec![2.0, -1.0]]);

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("POST /api/embeddings"));
    assert!(requests[0].contains(r#""model":"nomic-embed-text""#));
    assert!(requests[0].contains(r#""prompt":"first""#));
    assert!(requests[1].contains(r#""prompt":"second""#));
}

#[tokio::test]
async fn ollama_empty_embedding_is_an_error() {
    let (base_url, _server) = mock_server(vec![(200, r#"{"embedding":[]}"#.into())]).await;
    let provider = provider_from_config(&ollama_config(&base_url)).unwrap();
    let err = provider.embed_one("hello").await.unwrap_err();
    assert!(matches!(err, SiftError::Embedding(_)));
    assert!(err.to_string().contains("empty embedding"));
}

#[tokio::test]
async fn openai_orders_by_index_and_sends_bearer_token() {
    let body = r#"{"data":[
        {"embedding":[0.0,1.0],"index":1},
        {"embedding":[1.0,0.0],"index":0}
    ]}"#;
    let (base_url, server) = mock_server(vec![(200, body.into())]).await;

    let provider = provider_from_config(&openai_config(&base_url)).unwrap();
    let vectors = provider
        .embed_many(&["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("POST /v1/embeddings"));
    assert!(requests[0]
        .to_ascii_lowercase()
        .contains("authorization: bearer sk-test"));
    assert!(requests[0].contains(r#""input":["a","b"]"#));
}

#[tokio::test]
async fn openai_short_response_is_an_error() {
    let body = r#"{"data":[{"embedding":[1.0],"index":0}]}"#;
    let (base_url, _server) = mock_server(vec![(200, body.into())]).await;
    let provider = provider_from_config(&openai_config(&base_url)).unwrap();
    let err = provider
        .embed_many(&["a".to_string(), "b".to_string()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("expected 2 embeddings"), "{err}");
}

#[tokio::test]
async fn error_status_is_reported_with_body() {
    let (base_url, _server) =
        mock_server(vec![(500, r#"{"error":"model not loaded"}"#.into())]).await;
    let provider = provider_from_config(&ollama_config(&base_url)).unwrap();
    let err = provider.embed_one("hello").await.unwrap_err().to_string();
    assert!(err.contains("500"), "{err}");
    assert!(err.contains("model not loaded"), "{err}");
}

#[tokio::test]
async fn slow_provider_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let _server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request(&mut stream).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let mut config = ollama_config(&base_url);
    config.timeout_secs = 1;
    let provider = provider_from_config(&config).unwrap();
    let err = provider.embed_one("hello").await.unwrap_err();
    assert!(matches!(err, SiftError::Embedding(_)));
    assert!(err.to_string().contains("timed out"), "{err}");
}

#[tokio::test]
async fn unreachable_provider_is_an_embedding_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let provider = provider_from_config(&ollama_config(&base_url)).unwrap();
    let err = provider.embed_one("hello").await.unwrap_err();
    assert!(matches!(err, SiftError::Embedding(_)));
}
