use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use uuid::Uuid;

use crate::codec::EmbeddedImage;

/// One of the fixed t-shirts offered by the fitting room. The catalog is
/// defined at process start and never mutated.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GarmentItem {
    pub id: String,
    pub name: String,
    /// Shows the model the garment's color and silhouette.
    pub mockup_url: String,
    /// Shows the model the print in isolation.
    pub flat_art_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    #[default]
    AwaitingPhoto,
    AwaitingGarmentChoice,
    ShowingResult,
}

/// The linear try-on flow for one visitor. `step = ShowingResult` is only
/// ever reached with `result_image` present; the controller refuses the
/// transition otherwise.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WizardState {
    pub step: WizardStep,
    pub subject_photo: Option<EmbeddedImage>,
    pub selected_garment: Option<GarmentItem>,
    pub result_image: Option<EmbeddedImage>,
    /// Token of the try-on call currently in flight, if any. A completion
    /// whose token no longer matches is stale and gets discarded.
    pub inflight: Option<Uuid>,
    pub error_message: Option<String>,
    pub needs_reauth: bool,
}

impl WizardState {
    pub fn busy(&self) -> bool {
        self.inflight.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: WizardState,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            state: WizardState::default(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// --- HTTP DTOs ---

#[derive(Debug, Deserialize)]
pub struct SubmitPhotoRequest {
    /// The uploaded photo as a `data:` URL; the browser reads the file
    /// locally, nothing is stored server-side beyond the session.
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub struct ChooseGarmentRequest {
    pub garment_id: String,
}

#[derive(Debug, Serialize)]
pub struct AuthStatus {
    pub key_configured: bool,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub step: WizardStep,
    pub subject_photo: Option<String>,
    pub selected_garment: Option<GarmentItem>,
    pub result_image: Option<String>,
    pub busy: bool,
    pub error_message: Option<String>,
    pub needs_reauth: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionView {
    pub fn from_session(session: &Session) -> Self {
        let state = &session.state;
        Self {
            id: session.id,
            step: state.step,
            subject_photo: state.subject_photo.as_ref().map(EmbeddedImage::to_data_url),
            selected_garment: state.selected_garment.clone(),
            result_image: state.result_image.as_ref().map(EmbeddedImage::to_data_url),
            busy: state.busy(),
            error_message: state.error_message.clone(),
            needs_reauth: state.needs_reauth,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}
