mod common;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{Note, User, database};
use modelkit::web;
use modelkit::{
    AuthCheck, CallerContext, Changes, Crud, Database, DeleteMode, SaveOptions, WriteOutcome,
};
use serde_json::{Value, json};
use tower::ServiceExt;

const CALLER: CallerContext = CallerContext::user(1);

async fn show_note(
    State(db): State<Database>,
    Path(token): Path<String>,
) -> web::Result<Json<Value>> {
    let session = db.session();
    let note = Note::get_by_token_or_404(&session, &token).await?;
    Ok(Json(json!({ "title": note.title, "rank": note.rank })))
}

async fn patch_note(
    State(db): State<Database>,
    Path(token): Path<String>,
    Json(body): Json<Value>,
) -> web::Result<Json<Value>> {
    let object = body
        .as_object()
        .ok_or_else(|| web::WebError::Input("expected a JSON object".into()))?;
    let changes = Changes::from_json(object)?;

    let session = db.session();
    let mut note = Note::get_by_token_or_404(&session, &token).await?;
    let _ = note
        .update(&session, &CALLER, changes, AuthCheck::Required)
        .await?;
    Ok(Json(json!({ "title": note.title })))
}

fn caller_from(headers: &HeaderMap) -> CallerContext {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .map(CallerContext::user)
        .unwrap_or_else(CallerContext::anonymous)
}

async fn delete_note(
    State(db): State<Database>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> web::Result<StatusCode> {
    let caller = caller_from(&headers);
    let session = db.session();
    let mut note = Note::get_by_token_or_404(&session, &token).await?;
    match note
        .delete(&session, &caller, DeleteMode::Soft, AuthCheck::Required)
        .await?
    {
        WriteOutcome::Skipped => Err(web::WebError::Unauthorized(
            "sign in to delete notes".into(),
        )),
        _ => Ok(StatusCode::NO_CONTENT),
    }
}

async fn create_user(State(db): State<Database>, Json(body): Json<Value>) -> web::Result<StatusCode> {
    let email = body["email"].as_str().unwrap_or_default();
    let session = db.session();
    let mut user = User::new(email, "Someone", "pw");
    let _ = user.save(&session, &CALLER, SaveOptions::default()).await?;
    Ok(StatusCode::CREATED)
}

fn router(db: Database) -> Router {
    Router::new()
        .route(
            "/notes/:token",
            get(show_note).patch(patch_note).delete(delete_note),
        )
        .route("/users", post(create_user))
        .with_state(db)
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn decode_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn test_lookup_by_token_over_http() -> anyhow::Result<()> {
    let db = database().await?;
    let mut note = Note::new(1, "served", 9);
    let _ = note.save(&db.session(), &CALLER, SaveOptions::default()).await?;

    let uri = format!("/notes/{}", note.base.token());
    let response = router(db)
        .oneshot(Request::builder().uri(uri).body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = decode_json(response).await;
    assert_eq!(body["title"], "served");
    assert_eq!(body["rank"], 9);

    Ok(())
}

#[tokio::test]
async fn test_missing_token_is_404() -> anyhow::Result<()> {
    let db = database().await?;

    let response = router(db)
        .oneshot(Request::builder().uri("/notes/nope").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = decode_json(response).await;
    assert_eq!(body["code"], "not_found");
    assert!(body["error"].as_str().unwrap_or_default().contains("nope"));

    Ok(())
}

#[tokio::test]
async fn test_duplicate_unique_column_is_409() -> anyhow::Result<()> {
    let db = database().await?;
    let app = router(db);

    let created = app
        .clone()
        .oneshot(json_request(Method::POST, "/users", json!({ "email": "x@example.com" })))
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);

    let duplicate = app
        .oneshot(json_request(Method::POST, "/users", json!({ "email": "x@example.com" })))
        .await?;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    assert_eq!(decode_json(duplicate).await["code"], "conflict");

    Ok(())
}

#[tokio::test]
async fn test_patch_validation_errors_are_422() -> anyhow::Result<()> {
    let db = database().await?;
    let mut note = Note::new(1, "patchable", 0);
    let _ = note.save(&db.session(), &CALLER, SaveOptions::default()).await?;
    let uri = format!("/notes/{}", note.base.token());
    let app = router(db);

    let ok = app
        .clone()
        .oneshot(json_request(Method::PATCH, &uri, json!({ "title": "patched" })))
        .await?;
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(decode_json(ok).await["title"], "patched");

    for body in [
        json!({ "colour": "red" }),
        json!({ "created_at": "2024-01-01T00:00:00Z" }),
        json!({ "rank": "high" }),
        json!({ "title": ["nested"] }),
    ] {
        let response = app
            .clone()
            .oneshot(json_request(Method::PATCH, &uri, body))
            .await?;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(decode_json(response).await["code"], "input_error");
    }

    Ok(())
}

#[tokio::test]
async fn test_anonymous_delete_is_401() -> anyhow::Result<()> {
    let db = database().await?;
    let mut note = Note::new(1, "guarded", 0);
    let _ = note.save(&db.session(), &CALLER, SaveOptions::default()).await?;
    let id = note.base.id().unwrap();
    let uri = format!("/notes/{}", note.base.token());
    let app = router(db.clone());

    let refused = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri(&uri)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(refused.status(), StatusCode::UNAUTHORIZED);
    let body = decode_json(refused).await;
    assert_eq!(body["code"], "unauthorized");
    assert_eq!(body["error"], "sign in to delete notes");
    assert!(Note::get_by_id_or_404(&db.session(), id).await?.base.is_active());

    let accepted = app
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri(&uri)
                .header("x-user-id", "1")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(accepted.status(), StatusCode::NO_CONTENT);
    assert!(!Note::get_by_id_or_404(&db.session(), id).await?.base.is_active());

    Ok(())
}
