//! HTTP server for question answering
//! Simple HTTP/1.1 server using tokio and basic request parsing

use serde::Deserialize;
use sql_answer::pipeline::{CollectingObserver, FanOut, Pipeline, PipelineObserver, Question, TracingObserver};
use sql_answer::render::DisplayResult;
use sql_answer::AppConfig;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const MAX_REQUEST_BYTES: usize = 1_000_000;

#[derive(Deserialize)]
struct AskRequest {
    question: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    let pipeline = Arc::new(Pipeline::from_config(&config).await?);

    let addr = std::env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        debug!("New connection from: {}", peer);
        tokio::spawn(handle_connection(stream, Arc::clone(&pipeline)));
    }
}

async fn handle_connection(mut stream: TcpStream, pipeline: Arc<Pipeline>) {
    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    // Read request with timeout to prevent hanging
    let read_result = timeout(Duration::from_secs(5), async {
        loop {
            let n = stream.read(&mut temp_buf).await?;
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&temp_buf[..n]);
            if request_complete(&buffer) || buffer.len() > MAX_REQUEST_BYTES {
                break;
            }
        }
        Ok::<(), std::io::Error>(())
    })
    .await;

    match read_result {
        Err(_) => {
            warn!("Request read timeout");
            return;
        }
        Ok(Err(e)) => {
            error!("Failed to read from stream: {}", e);
            return;
        }
        Ok(Ok(())) => {}
    }

    if buffer.is_empty() {
        return;
    }

    let response = match String::from_utf8(buffer) {
        Ok(request) => handle_request(&request, &pipeline).await,
        Err(_) => create_response(400, "Bad Request", r#"{"error":"Request is not valid UTF-8"}"#),
    };
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        error!("Failed to write response: {}", e);
    }
}

/// True once the headers and `Content-Length` bytes of body have arrived.
fn request_complete(buffer: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(buffer) else {
        return false;
    };
    let Some(headers_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let body_len = extract_content_length(&text[..headers_end]).unwrap_or(0);
    buffer.len() >= headers_end + 4 + body_len
}

fn extract_content_length(headers: &str) -> Option<usize> {
    headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

async fn handle_request(request: &str, pipeline: &Pipeline) -> String {
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let (Some(method), Some(full_path)) = (parts.next(), parts.next()) else {
        return create_response(400, "Bad Request", "{}");
    };
    let path = full_path.split('?').next().unwrap_or("/").trim_end_matches('/');
    let body = request.split_once("\r\n\r\n").map(|(_, b)| b.trim()).unwrap_or("");

    debug!("Request: {} {}", method, path);

    match (method, path) {
        ("OPTIONS", _) => create_response(204, "No Content", ""),
        ("GET", "/api/health") => {
            create_response(200, "OK", r#"{"status":"ok","service":"sql-answer"}"#)
        }
        ("GET", "/api/schema") => match pipeline.schema().await {
            Ok(schema) => json_response(200, "OK", &serde_json::json!(schema)),
            Err(e) => json_response(500, "Internal Server Error", &serde_json::json!({"error": e.to_string()})),
        },
        ("POST", "/api/ask") => handle_ask(body, pipeline).await,
        _ => create_response(404, "Not Found", r#"{"error":"Not found"}"#),
    }
}

async fn handle_ask(body: &str, pipeline: &Pipeline) -> String {
    if body.is_empty() {
        return create_response(400, "Bad Request", r#"{"error":"JSON body required"}"#);
    }

    let request: AskRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(e) => {
            return json_response(400, "Bad Request", &serde_json::json!({"error": format!("Invalid JSON: {}", e)}))
        }
    };

    let question = match Question::new(request.question.unwrap_or_default()) {
        Ok(question) => question,
        Err(_) => {
            return create_response(
                400,
                "Bad Request",
                r#"{"error":"Field 'question' is required and cannot be empty"}"#,
            )
        }
    };

    let collector = CollectingObserver::new();
    let observers: Vec<&dyn PipelineObserver> = vec![&collector, &TracingObserver];
    let output = pipeline.run_with_observer(&question, &FanOut(observers)).await;

    let body = serde_json::json!({
        "query": output.query,
        "result": output.result.as_deref().map(DisplayResult::classify),
        "answer": output.answer,
        "errors": collector.failures(),
        "steps": collector.reports(),
    });
    json_response(200, "OK", &body)
}

fn json_response(status: u16, status_text: &str, body: &serde_json::Value) -> String {
    create_response(status, status_text, &body.to_string())
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_complete_waits_for_body() {
        let partial = b"POST /api/ask HTTP/1.1\r\nContent-Length: 20\r\n\r\n{\"question\":";
        assert!(!request_complete(partial));
        let full = b"POST /api/ask HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        assert!(request_complete(full));
        assert!(request_complete(b"GET /api/health HTTP/1.1\r\nHost: x\r\n\r\n"));
    }

    #[test]
    fn test_extract_content_length_is_case_insensitive() {
        assert_eq!(extract_content_length("Host: x\r\ncontent-LENGTH: 42"), Some(42));
        assert_eq!(extract_content_length("Host: x"), None);
    }

    #[test]
    fn test_create_response_sets_length() {
        let response = create_response(200, "OK", "{}");
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Length: 2\r\n"));
        assert!(response.ends_with("\r\n\r\n{}"));
    }
}
