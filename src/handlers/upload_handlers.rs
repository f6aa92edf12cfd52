//! HTTP handlers for the upload link: the multipart upload itself and the
//! read-only status check the upload page calls first.
//!
//! Bodies are taken as raw bytes; decoding happens in `UploadService`.

use super::AppState;
use crate::{
    errors::UploadError,
    models::upload::{TokenStatusResponse, UploadResponse},
};
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, header},
};
use serde::Deserialize;

/// `token` as sent in a query string or a JSON body.
#[derive(Debug, Default, Deserialize)]
pub struct TokenParam {
    pub token: Option<String>,
}

/// POST `/api/upload`: relay the files of a multipart body.
pub async fn upload_files(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, UploadError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let response = state.uploads.handle_upload(content_type, body).await?;
    Ok(Json(response))
}

/// GET `/api/upload/status?token=...`
pub async fn token_status(
    State(state): State<AppState>,
    Query(query): Query<TokenParam>,
) -> Result<Json<TokenStatusResponse>, UploadError> {
    let status = state.uploads.token_status(query.token.as_deref()).await?;
    Ok(Json(status))
}

/// POST `/api/upload/status`: token in a JSON body, falling back to the query.
pub async fn token_status_body(
    State(state): State<AppState>,
    Query(query): Query<TokenParam>,
    body: Bytes,
) -> Result<Json<TokenStatusResponse>, UploadError> {
    let token = serde_json::from_slice::<TokenParam>(&body)
        .ok()
        .and_then(|param| param.token)
        .or(query.token);

    let status = state.uploads.token_status(token.as_deref()).await?;
    Ok(Json(status))
}

#[cfg(test)]
mod tests {
    use crate::{
        handlers::AppState,
        multipart::tests::{Field, build_body, content_type},
        routes::routes::routes,
        services::{
            graph_client::tests::{client_for, start_mock_graph},
            token_store::tests::{insert_user, memory_store},
            upload_service::UploadService,
        },
    };
    use chrono::Duration;
    use serde_json::{Value, json};
    use std::sync::Arc;

    /// Serve the real router against an in-memory store and a mock drive.
    async fn start_app() -> (String, String, crate::services::graph_client::tests::MockGraph) {
        let (graph_base, mock) = start_mock_graph().await;
        let store = memory_store().await;
        insert_user(&store, "user-7", "Mary", "Jackson").await;
        let token = store
            .issue_token("user-7", 3, Duration::days(2))
            .await
            .unwrap();

        let state = AppState {
            uploads: UploadService::new(
                Arc::new(store.clone()),
                Arc::new(client_for(&graph_base)),
                "ClientUploads",
            ),
            db: store.db.clone(),
        };
        let app = routes(64 * 1024 * 1024).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (base, token.token, mock)
    }

    #[tokio::test]
    async fn upload_end_to_end() {
        let (base, token, mock) = start_app().await;
        let big = vec![3u8; 5 * 1024 * 1024];
        let body = build_body(&[
            Field::File {
                filename: "letter.docx",
                mime: Some(
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                ),
                data: b"PK",
            },
            Field::File {
                filename: "scan.jpg",
                mime: Some("image/jpeg"),
                data: &big,
            },
            Field::Text("token", &token),
        ]);

        let resp = reqwest::Client::new()
            .post(format!("{base}/api/upload"))
            .header("content-type", content_type())
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let json: Value = resp.json().await.unwrap();
        assert_eq!(
            json,
            json!({
                "results": [
                    {"filename": "letter.docx", "success": true},
                    {"filename": "scan.jpg", "success": true}
                ],
                "remainingUploads": 1
            })
        );

        let recorded = mock.recorded();
        assert!(recorded[0].path.starts_with("root:/ClientUploads/user-7/"));
        assert!(recorded[0].path.ends_with("-letter.docx:/content"));
        assert!(recorded.iter().any(|r| r.path.ends_with("-scan.jpg:/createUploadSession")));
        assert_eq!(recorded.iter().filter(|r| r.path == "session").count(), 2);
    }

    #[tokio::test]
    async fn upload_failure_of_one_file_is_reported_per_file() {
        let (base, token, mock) = start_app().await;
        *mock.fail_on.lock().unwrap() = Some("bad.png".into());
        let body = build_body(&[
            Field::Text("token", &token),
            Field::File {
                filename: "good.png",
                mime: Some("image/png"),
                data: b"png",
            },
            Field::File {
                filename: "bad.png",
                mime: Some("image/png"),
                data: b"png",
            },
        ]);

        let resp = reqwest::Client::new()
            .post(format!("{base}/api/upload"))
            .header("content-type", content_type())
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json["results"][0]["success"], true);
        assert_eq!(json["results"][1]["success"], false);
        assert_eq!(json["results"][1]["error"], "Upload failed");
        assert_eq!(json["remainingUploads"], 2);
    }

    #[tokio::test]
    async fn upload_error_statuses() {
        let (base, token, _) = start_app().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/upload"))
            .header("content-type", "multipart/form-data")
            .body("x")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let body = build_body(&[
            Field::Text("token", "unknown"),
            Field::File {
                filename: "a.pdf",
                mime: Some("application/pdf"),
                data: b"1",
            },
        ]);
        let resp = client
            .post(format!("{base}/api/upload"))
            .header("content-type", content_type())
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 410);
        let json: Value = resp.json().await.unwrap();
        assert!(json.get("reason").is_none());

        let body = build_body(&[
            Field::Text("token", &token),
            Field::File {
                filename: "a.gif",
                mime: Some("image/gif"),
                data: b"GIF89a",
            },
        ]);
        let resp = client
            .post(format!("{base}/api/upload"))
            .header("content-type", content_type())
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json["error"], "File type not allowed: a.gif");
    }

    #[tokio::test]
    async fn status_via_query_and_body() {
        let (base, token, _) = start_app().await;
        let client = reqwest::Client::new();

        let resp = client
            .get(format!("{base}/api/upload/status"))
            .query(&[("token", token.as_str())])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json["valid"], true);
        assert_eq!(json["clientName"], "Mary Jackson");
        assert_eq!(json["remainingUploads"], 3);
        assert!(json["expiresAt"].is_string());

        let resp = client
            .post(format!("{base}/api/upload/status"))
            .json(&json!({ "token": token }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let resp = client
            .get(format!("{base}/api/upload/status"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = client
            .get(format!("{base}/api/upload/status?token=nope"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 410);
    }

    #[tokio::test]
    async fn health_endpoints() {
        let (base, _, _) = start_app().await;
        let resp = reqwest::get(format!("{base}/healthz")).await.unwrap();
        assert_eq!(resp.status(), 200);

        let resp = reqwest::get(format!("{base}/readyz")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json["checks"]["sqlite"]["ok"], true);
    }
}
