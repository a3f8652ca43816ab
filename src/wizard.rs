use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::codec::{CodecError, EmbeddedImage, ImageFetcher};
use crate::models::{GarmentItem, Session, WizardState, WizardStep};
use crate::tryon::{TryOnError, TryOnService};

// User-facing copy, one message per failure kind. Only the credential
// failure additionally raises the re-auth flag.
const MSG_ASSET_UNREADABLE: &str = "Não foi possível carregar as imagens. Tente novamente.";
const MSG_NO_IMAGE: &str = "Não foi possível gerar a prévia. Tente uma foto com fundo mais limpo.";
const MSG_UPSTREAM: &str = "Erro na IA: verifique sua conexão e tente novamente em instantes.";
const MSG_REAUTH: &str = "Sessão expirada. Ative o provador novamente.";

/// Precondition violations. Try-on failures are not errors at this level:
/// they land in the session's `error_message` so the user can retry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("unknown session")]
    UnknownSession,
    #[error("unknown garment")]
    UnknownGarment,
    #[error("a try-on is already in progress")]
    Busy,
    #[error("action not valid in the current step")]
    InvalidStep,
}

/// Owns every wizard session and drives the linear flow
/// `AwaitingPhoto -> AwaitingGarmentChoice -> ShowingResult`. Views never
/// touch state directly; they go through these methods.
pub struct Wizard {
    sessions: RwLock<HashMap<Uuid, Session>>,
    catalog: Catalog,
    fetcher: Arc<dyn ImageFetcher>,
    tryon: Arc<dyn TryOnService>,
    instruction: String,
}

impl Wizard {
    pub fn new(
        catalog: Catalog,
        fetcher: Arc<dyn ImageFetcher>,
        tryon: Arc<dyn TryOnService>,
        instruction: String,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            catalog,
            fetcher,
            tryon,
            instruction,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn create_session(&self) -> Session {
        let session = Session::new();
        info!("🆕 Session {} opened", session.id);
        self.sessions.write().insert(session.id, session.clone());
        session
    }

    pub fn session(&self, id: Uuid) -> Result<Session, WizardError> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(WizardError::UnknownSession)
    }

    /// Valid only while awaiting the photo; stores it and advances to the
    /// garment choice.
    pub fn submit_photo(&self, id: Uuid, photo: EmbeddedImage) -> Result<Session, WizardError> {
        let mut guard = self.sessions.write();
        let session = guard.get_mut(&id).ok_or(WizardError::UnknownSession)?;
        if session.state.step != WizardStep::AwaitingPhoto {
            return Err(WizardError::InvalidStep);
        }
        session.state.subject_photo = Some(photo);
        session.state.error_message = None;
        session.state.step = WizardStep::AwaitingGarmentChoice;
        session.touch();
        info!("📷 Session {} received a photo", id);
        Ok(session.clone())
    }

    /// Fetches the garment references, calls the try-on service and stores
    /// the outcome. At most one call is in flight per session; a second
    /// choice while busy is rejected. Failures never change the step, so
    /// the user can retry with the same photo.
    pub async fn choose_garment(&self, id: Uuid, garment_id: &str) -> Result<Session, WizardError> {
        let garment = self
            .catalog
            .get(garment_id)
            .cloned()
            .ok_or(WizardError::UnknownGarment)?;

        // Claim the session under the lock before any I/O.
        let (token, photo) = {
            let mut guard = self.sessions.write();
            let session = guard.get_mut(&id).ok_or(WizardError::UnknownSession)?;
            if session.state.step != WizardStep::AwaitingGarmentChoice {
                return Err(WizardError::InvalidStep);
            }
            let photo = match &session.state.subject_photo {
                Some(photo) => photo.clone(),
                None => return Err(WizardError::InvalidStep),
            };
            if session.state.busy() {
                return Err(WizardError::Busy);
            }
            let token = Uuid::new_v4();
            session.state.inflight = Some(token);
            session.state.error_message = None;
            session.state.needs_reauth = false;
            session.state.selected_garment = Some(garment.clone());
            session.touch();
            (token, photo)
        };

        info!("👕 Session {} trying on '{}'", id, garment.name);
        let outcome = self.run_tryon(&photo, &garment).await;

        let mut guard = self.sessions.write();
        let session = guard.get_mut(&id).ok_or(WizardError::UnknownSession)?;
        if session.state.inflight != Some(token) {
            // The session was reset while the call was in flight.
            info!("🗑️ Session {} discarded a stale try-on outcome", id);
            return Ok(session.clone());
        }
        session.state.inflight = None;
        match outcome {
            Ok(image) => {
                info!("✅ Session {} got a look ({} bytes)", id, image.payload().len());
                session.state.result_image = Some(image);
            }
            Err((message, needs_reauth)) => {
                session.state.error_message = Some(message);
                session.state.needs_reauth = needs_reauth;
            }
        }
        session.touch();
        Ok(session.clone())
    }

    /// Valid only in the garment-choice step with a generated look present.
    pub fn confirm_result(&self, id: Uuid) -> Result<Session, WizardError> {
        let mut guard = self.sessions.write();
        let session = guard.get_mut(&id).ok_or(WizardError::UnknownSession)?;
        if session.state.busy() {
            return Err(WizardError::Busy);
        }
        if session.state.step != WizardStep::AwaitingGarmentChoice
            || session.state.result_image.is_none()
        {
            return Err(WizardError::InvalidStep);
        }
        session.state.step = WizardStep::ShowingResult;
        session.touch();
        Ok(session.clone())
    }

    /// Valid from any state; restores the initial flow. An in-flight
    /// try-on loses its claim token and its outcome is dropped on arrival.
    pub fn reset(&self, id: Uuid) -> Result<Session, WizardError> {
        let mut guard = self.sessions.write();
        let session = guard.get_mut(&id).ok_or(WizardError::UnknownSession)?;
        session.state = WizardState::default();
        session.touch();
        info!("🔄 Session {} reset", id);
        Ok(session.clone())
    }

    async fn run_tryon(
        &self,
        photo: &EmbeddedImage,
        garment: &GarmentItem,
    ) -> Result<EmbeddedImage, (String, bool)> {
        let mockup = self
            .fetcher
            .fetch_and_encode(&garment.mockup_url)
            .await
            .map_err(|e| asset_failure(garment, e))?;
        let flat_art = self
            .fetcher
            .fetch_and_encode(&garment.flat_art_url)
            .await
            .map_err(|e| asset_failure(garment, e))?;
        self.tryon
            .composite(photo, &mockup, &self.instruction, Some(&flat_art))
            .await
            .map_err(|e| match e {
                TryOnError::NoImageReturned => {
                    error!("❌ Upstream returned no image");
                    (MSG_NO_IMAGE.to_string(), false)
                }
                TryOnError::AuthenticationRequired => {
                    error!("❌ Upstream credential missing or rejected");
                    (MSG_REAUTH.to_string(), true)
                }
                TryOnError::UpstreamUnavailable(reason) => {
                    error!("❌ Upstream unavailable: {}", reason);
                    (MSG_UPSTREAM.to_string(), false)
                }
            })
    }
}

fn asset_failure(garment: &GarmentItem, err: CodecError) -> (String, bool) {
    error!("❌ Could not load references for '{}': {}", garment.id, err);
    (MSG_ASSET_UNREADABLE.to_string(), false)
}
