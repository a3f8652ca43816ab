use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use include_dir::{include_dir, Dir};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::codec::EmbeddedImage;
use crate::models::{
    AuthStatus, ChooseGarmentRequest, GarmentItem, SessionView, SubmitPhotoRequest,
};
use crate::wizard::{Wizard, WizardError};

static ASSETS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/static");

const RESULT_FILENAME: &str = "umadefit-look-50anos.png";

#[derive(Clone)]
pub struct AppState {
    pub wizard: Arc<Wizard>,
    pub key_configured: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/auth/status", get(auth_status))
        .route("/api/catalog", get(catalog))
        .route("/api/session", post(create_session))
        .route("/api/session/:id", get(get_session))
        .route("/api/session/:id/photo", post(submit_photo))
        .route("/api/session/:id/garment", post(choose_garment))
        .route("/api/session/:id/confirm", post(confirm_result))
        .route("/api/session/:id/reset", post(reset))
        .route("/api/session/:id/result.png", get(download_result))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

impl From<WizardError> for StatusCode {
    fn from(err: WizardError) -> Self {
        match err {
            WizardError::UnknownSession | WizardError::UnknownGarment => StatusCode::NOT_FOUND,
            WizardError::Busy | WizardError::InvalidStep => StatusCode::CONFLICT,
        }
    }
}

async fn index() -> Response {
    match ASSETS.get_file("index.html") {
        Some(file) => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            file.contents(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn auth_status(State(state): State<AppState>) -> Json<AuthStatus> {
    Json(AuthStatus {
        key_configured: state.key_configured,
    })
}

async fn catalog(State(state): State<AppState>) -> Json<Vec<GarmentItem>> {
    Json(state.wizard.catalog().list().to_vec())
}

async fn create_session(State(state): State<AppState>) -> Json<SessionView> {
    Json(SessionView::from_session(&state.wizard.create_session()))
}

async fn get_session(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, StatusCode> {
    let session = state.wizard.session(id)?;
    Ok(Json(SessionView::from_session(&session)))
}

async fn submit_photo(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<SubmitPhotoRequest>,
) -> Result<Json<SessionView>, StatusCode> {
    let photo = EmbeddedImage::from_data_url(&body.image).map_err(|e| {
        tracing::warn!("Rejected photo upload: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    let session = state.wizard.submit_photo(id, photo)?;
    Ok(Json(SessionView::from_session(&session)))
}

#[axum::debug_handler]
async fn choose_garment(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ChooseGarmentRequest>,
) -> Result<Json<SessionView>, StatusCode> {
    let session = state.wizard.choose_garment(id, &body.garment_id).await?;
    Ok(Json(SessionView::from_session(&session)))
}

async fn confirm_result(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, StatusCode> {
    let session = state.wizard.confirm_result(id)?;
    Ok(Json(SessionView::from_session(&session)))
}

async fn reset(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, StatusCode> {
    let session = state.wizard.reset(id)?;
    Ok(Json(SessionView::from_session(&session)))
}

/// One-way export of the finished look as a PNG attachment. Non-PNG
/// results are transcoded so the saved file always matches its name.
async fn download_result(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Response, StatusCode> {
    let session = state.wizard.session(id)?;
    let image = session.state.result_image.ok_or(StatusCode::NOT_FOUND)?;
    let png_bytes = if image.is_png() {
        let (_, payload) = image.into_parts();
        payload.to_vec()
    } else {
        transcode_to_png(&image).ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
    };
    let headers = [
        (header::CONTENT_TYPE, "image/png".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{RESULT_FILENAME}\""),
        ),
    ];
    Ok((StatusCode::OK, headers, png_bytes).into_response())
}

fn transcode_to_png(image: &EmbeddedImage) -> Option<Vec<u8>> {
    let decoded = match image::load_from_memory(image.payload()) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::error!("Could not decode result ({}): {}", image.mime_type(), e);
            return None;
        }
    };
    let mut buf = std::io::Cursor::new(Vec::new());
    if let Err(e) = decoded.write_to(&mut buf, image::ImageFormat::Png) {
        tracing::error!("Could not transcode result to PNG: {}", e);
        return None;
    }
    Some(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::catalog::Catalog;
    use crate::codec::{CodecError, ImageFetcher};
    use crate::tryon::{TryOnError, TryOnService};

    struct StubFetcher;

    #[async_trait]
    impl ImageFetcher for StubFetcher {
        async fn fetch_and_encode(&self, _url: &str) -> Result<EmbeddedImage, CodecError> {
            Ok(EmbeddedImage::new("image/png", vec![7]))
        }
    }

    struct StubTryOn;

    #[async_trait]
    impl TryOnService for StubTryOn {
        async fn composite(
            &self,
            _subject_photo: &EmbeddedImage,
            _garment_mockup: &EmbeddedImage,
            _instruction: &str,
            _garment_flat_art: Option<&EmbeddedImage>,
        ) -> Result<EmbeddedImage, TryOnError> {
            Ok(EmbeddedImage::new("image/png", red_png()))
        }
    }

    fn red_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(10, 10, image::Rgb([255, 0, 0]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn test_router() -> Router {
        let wizard = Wizard::new(
            Catalog::jubilee_collection(),
            Arc::new(StubFetcher),
            Arc::new(StubTryOn),
            "prova a camiseta".into(),
        );
        router(AppState {
            wizard: Arc::new(wizard),
            key_configured: true,
        })
    }

    async fn send_json(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(value) => Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn full_flow_over_http() {
        let app = test_router();

        let (status, session) = send_json(&app, "POST", "/api/session", None).await;
        assert_eq!(status, StatusCode::OK);
        let id = session["id"].as_str().unwrap().to_string();
        assert_eq!(session["step"], "awaiting_photo");

        let photo = EmbeddedImage::new("image/png", red_png()).to_data_url();
        let (status, after_photo) = send_json(
            &app,
            "POST",
            &format!("/api/session/{id}/photo"),
            Some(json!({ "image": photo })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after_photo["step"], "awaiting_garment_choice");

        let (status, after_choice) = send_json(
            &app,
            "POST",
            &format!("/api/session/{id}/garment"),
            Some(json!({ "garment_id": "tshirt-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after_choice["busy"], false);
        assert!(after_choice["result_image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));

        let (status, confirmed) =
            send_json(&app, "POST", &format!("/api/session/{id}/confirm"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(confirmed["step"], "showing_result");

        let request = Request::builder()
            .uri(format!("/api/session/{id}/result.png"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/png"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.to_vec(), red_png());

        let (status, after_reset) =
            send_json(&app, "POST", &format!("/api/session/{id}/reset"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after_reset["step"], "awaiting_photo");
        assert!(after_reset["result_image"].is_null());
    }

    #[tokio::test]
    async fn precondition_violations_map_to_statuses() {
        let app = test_router();
        let (_, session) = send_json(&app, "POST", "/api/session", None).await;
        let id = session["id"].as_str().unwrap().to_string();

        // Garment choice before any photo.
        let (status, _) = send_json(
            &app,
            "POST",
            &format!("/api/session/{id}/garment"),
            Some(json!({ "garment_id": "tshirt-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // Confirm before a result exists.
        let (status, _) = send_json(&app, "POST", &format!("/api/session/{id}/confirm"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        // Download before a result exists.
        let (status, _) =
            send_json(&app, "GET", &format!("/api/session/{id}/result.png"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Bad payloads and unknown resources.
        let (status, _) = send_json(
            &app,
            "POST",
            &format!("/api/session/{id}/photo"),
            Some(json!({ "image": "not a data url" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let photo = EmbeddedImage::new("image/png", red_png()).to_data_url();
        send_json(
            &app,
            "POST",
            &format!("/api/session/{id}/photo"),
            Some(json!({ "image": photo })),
        )
        .await;
        let (status, _) = send_json(
            &app,
            "POST",
            &format!("/api/session/{id}/garment"),
            Some(json!({ "garment_id": "tshirt-99" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let ghost = Uuid::new_v4();
        let (status, _) = send_json(&app, "GET", &format!("/api/session/{ghost}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn catalog_and_auth_status_render() {
        let app = test_router();

        let (status, catalog) = send_json(&app, "GET", "/api/catalog", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(catalog[0]["id"], "tshirt-1");
        assert_eq!(catalog[1]["name"], "Camiseta Verde");

        let (status, auth) = send_json(&app, "GET", "/api/auth/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(auth["key_configured"], true);
    }
}
