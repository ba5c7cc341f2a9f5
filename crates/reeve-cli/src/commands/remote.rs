//! CLI methods of a running bridge.

use anyhow::{Context, Result, bail};
use reeve_config::system::parse_base_url;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct CliResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Invoke `method` with `args` and print the reply.
pub async fn call(api_url: &str, method: &str, args: Vec<String>) -> Result<()> {
    let result = invoke(api_url, method, args).await?;
    println!("{}", result);
    Ok(())
}

pub async fn invoke(api_url: &str, method: &str, args: Vec<String>) -> Result<String> {
    let base_url = parse_base_url("api-url", api_url)?;
    let url = format!("{}api/v1/cli/{}", base_url, urlencoding::encode(method));

    let response = reqwest::Client::new()
        .post(&url)
        .json(&json!({ "args": args }))
        .send()
        .await
        .with_context(|| format!("calling {}", url))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|e| e.error)
            .unwrap_or(text);
        bail!("{} failed ({}): {}", method, status, message);
    }

    let reply: CliResponse = response.json().await.context("parsing reply")?;
    Ok(reply.result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use tokio::net::TcpListener;

    async fn cli_method(
        Path(method): Path<String>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        match method.as_str() {
            "rescan" => (StatusCode::OK, Json(json!({ "result": "accepted" }))),
            "action" => (StatusCode::OK, Json(json!({ "result": body["args"].to_string() }))),
            _ => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("unknown method {}", method) })),
            ),
        }
    }

    async fn serve() -> String {
        let router = Router::new().route("/api/v1/cli/{method}", post(cli_method));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_invoke() {
        let url = serve().await;

        let result = invoke(&url, "rescan", Vec::new()).await.unwrap();
        assert_eq!(result, "accepted");

        let args = vec!["deploy".to_string(), "acme".to_string()];
        let result = invoke(&url, "action", args).await.unwrap();
        assert_eq!(result, r#"["deploy","acme"]"#);
    }

    #[tokio::test]
    async fn test_invoke_error() {
        let url = serve().await;

        let err = invoke(&url, "deploy", Vec::new()).await.unwrap_err();
        assert!(err.to_string().contains("unknown method deploy"));
    }
}
