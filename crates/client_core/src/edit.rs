use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use shared::{
    domain::{editable_field, FieldKind, SiteId},
    error::CatalogError,
    protocol::SiteUpdate,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    api::ApiClient,
    error::{AuthError, ClientError, ValidationError},
    gate::{EditCredentials, EditGate},
    render::{normalize_date_input, render_record, RecordView},
};

const DATE_PLACEHOLDER: &str = "dd-mm-yyyy";
const UPDATED: &str = "Site updated successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Viewing,
    Editing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditInput {
    pub field: &'static str,
    pub label: &'static str,
    pub value: String,
    pub placeholder: Option<&'static str>,
    touched: bool,
}

impl EditInput {
    pub fn is_touched(&self) -> bool {
        self.touched
    }
}

/// Editable rendering of the displayed record, pre-populated from the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditForm {
    pub site_id: SiteId,
    pub inputs: Vec<EditInput>,
}

impl EditForm {
    fn from_view(site_id: SiteId, view: &RecordView) -> Self {
        let inputs = view
            .slots
            .iter()
            .filter(|slot| slot.kind != FieldKind::Identifier)
            .map(|slot| {
                let (value, placeholder) = if slot.kind == FieldKind::Date {
                    (normalize_date_input(&slot.text), Some(DATE_PLACEHOLDER))
                } else {
                    (slot.text.clone(), None)
                };
                EditInput {
                    field: slot.slot,
                    label: slot.label,
                    value,
                    placeholder,
                    touched: false,
                }
            })
            .collect();
        Self { site_id, inputs }
    }

    pub fn value(&self, field: &str) -> Option<&str> {
        self.input(field).map(|input| input.value.as_str())
    }

    pub fn input(&self, field: &str) -> Option<&EditInput> {
        self.inputs.iter().find(|input| input.field == field)
    }

    fn set(&mut self, field: &str, value: &str) -> Result<(), ValidationError> {
        let def = editable_field(field)?;
        let input = self
            .inputs
            .iter_mut()
            .find(|input| input.field == def.slot)
            .ok_or_else(|| CatalogError::UnknownField(field.to_string()))?;
        input.value = value.to_string();
        input.touched = true;
        Ok(())
    }

    /// Fields the user touched, trimmed, with blanks left out: an emptied
    /// input means "unchanged", never "clear the field".
    pub fn pending_edits(&self) -> SiteUpdate {
        self.inputs
            .iter()
            .filter(|input| input.touched)
            .filter_map(|input| {
                let trimmed = input.value.trim();
                (!trimmed.is_empty()).then(|| (input.field.to_string(), trimmed.to_string()))
            })
            .collect()
    }
}

/// Outcome of a save request that did not fail.
#[derive(Debug)]
pub enum SaveOutcome {
    /// Update accepted and the canonical record re-rendered.
    Saved { message: String, view: RecordView },
    /// Update accepted, but re-fetching the record failed; the displayed
    /// view still shows the pre-edit values.
    SavedStale {
        message: String,
        refresh_error: ClientError,
    },
    /// Another save for this session is still outstanding.
    Ignored,
}

struct EditSession {
    record_id: SiteId,
    original_snapshot: RecordView,
    form: EditForm,
}

#[derive(Default)]
struct ControllerState {
    displayed: Option<RecordView>,
    session: Option<EditSession>,
    /// Token the edit gate was passed under.
    grant: Option<String>,
}

/// Owns the read-only view / in-place edit toggle and reconciles edits
/// with the server. Editing is active exactly when an `EditSession` exists.
pub struct EditSessionController {
    api: Arc<ApiClient>,
    gate: Arc<dyn EditGate>,
    state: Mutex<ControllerState>,
    /// Serializes search, save and cancel so a cancel waits for an
    /// outstanding save instead of racing its re-fetch.
    op_lock: Mutex<()>,
    save_in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EditSessionController {
    pub fn new(api: Arc<ApiClient>, gate: Arc<dyn EditGate>) -> Arc<Self> {
        Arc::new(Self {
            api,
            gate,
            state: Mutex::new(ControllerState::default()),
            op_lock: Mutex::new(()),
            save_in_flight: AtomicBool::new(false),
        })
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub async fn mode(&self) -> EditMode {
        if self.state.lock().await.session.is_some() {
            EditMode::Editing
        } else {
            EditMode::Viewing
        }
    }

    pub async fn displayed(&self) -> Option<RecordView> {
        self.state.lock().await.displayed.clone()
    }

    pub async fn form(&self) -> Option<EditForm> {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .map(|session| session.form.clone())
    }

    /// View as it was when edit mode was entered.
    pub async fn original_snapshot(&self) -> Option<RecordView> {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .map(|session| session.original_snapshot.clone())
    }

    /// Looks a site up and displays it, discarding any edit in progress.
    pub async fn search(&self, raw_site_id: &str) -> Result<RecordView, ClientError> {
        let site_id = SiteId::parse(raw_site_id).ok_or(ValidationError::EmptySiteId)?;
        let _op = self.op_lock.lock().await;

        let record = self.api.fetch_site(&site_id).await?;
        let view = render_record(&record);

        let mut state = self.state.lock().await;
        if state.session.take().is_some() {
            info!(%site_id, "edit session discarded by new search");
        }
        state.displayed = Some(view.clone());
        debug!(%site_id, "site displayed");
        Ok(view)
    }

    /// Passes the edit gate for the current login.
    pub async fn unlock_editing(&self, credentials: &EditCredentials) -> Result<(), ClientError> {
        let token = self
            .api
            .session()
            .token()
            .ok_or(AuthError::NotAuthenticated)?;
        self.gate.authorize(credentials).await?;
        self.state.lock().await.grant = Some(token);
        Ok(())
    }

    pub async fn is_edit_unlocked(&self) -> bool {
        let grant = self.state.lock().await.grant.clone();
        grant.is_some() && grant == self.api.session().token()
    }

    /// Viewing -> Editing. Re-entering while already editing returns the
    /// live form unchanged.
    pub async fn enter_edit(&self) -> Result<EditForm, ClientError> {
        let token = self.api.session().token();
        let mut state = self.state.lock().await;
        if let Some(session) = &state.session {
            return Ok(session.form.clone());
        }

        let view = state
            .displayed
            .clone()
            .ok_or(ValidationError::NoRecordSelected)?;
        let site_id = view.site_id().ok_or(ValidationError::NoRecordSelected)?;

        if token.is_none() || state.grant != token {
            return Err(ClientError::PermissionDenied(
                "edit access has not been granted for this login".into(),
            ));
        }

        let form = EditForm::from_view(site_id.clone(), &view);
        state.session = Some(EditSession {
            record_id: site_id.clone(),
            original_snapshot: view,
            form: form.clone(),
        });
        info!(%site_id, "edit mode entered");
        Ok(form)
    }

    pub async fn set_field(&self, field: &str, value: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        let session = state.session.as_mut().ok_or(ValidationError::NotEditing)?;
        session.form.set(field, value)?;
        Ok(())
    }

    /// Sends the pending edits. On failure the session stays in edit mode
    /// with every input intact so the user can retry.
    pub async fn save(&self) -> Result<SaveOutcome, ClientError> {
        if self.save_in_flight.swap(true, Ordering::AcqRel) {
            debug!("save ignored: another save is outstanding");
            return Ok(SaveOutcome::Ignored);
        }
        let _in_flight = InFlight(&self.save_in_flight);
        let _op = self.op_lock.lock().await;

        let (site_id, edits) = {
            let state = self.state.lock().await;
            let session = state.session.as_ref().ok_or(ValidationError::NotEditing)?;
            let edits = session.form.pending_edits();
            if edits.is_empty() {
                return Err(ValidationError::NothingToUpdate.into());
            }
            (session.record_id.clone(), edits)
        };

        info!(%site_id, fields = edits.len(), "saving site edits");
        let response = match self.api.update_site(&site_id, &edits).await {
            Ok(response) => response,
            Err(err) => {
                warn!(%site_id, %err, "save failed; staying in edit mode");
                return Err(err);
            }
        };
        let message = response.message.unwrap_or_else(|| UPDATED.to_string());
        self.state.lock().await.session = None;

        match self.api.fetch_site(&site_id).await {
            Ok(record) => {
                let view = render_record(&record);
                self.state.lock().await.displayed = Some(view.clone());
                info!(%site_id, "site saved and re-rendered");
                Ok(SaveOutcome::Saved { message, view })
            }
            Err(refresh_error) => {
                warn!(%site_id, err = %refresh_error, "site saved but re-fetch failed");
                Ok(SaveOutcome::SavedStale {
                    message,
                    refresh_error,
                })
            }
        }
    }

    /// Editing -> Viewing, reloading the record from the server rather than
    /// restoring the snapshot. Waits for an outstanding save first; if that
    /// save already ended the session this is a no-op returning `None`.
    ///
    /// When the reload fails the session is still gone and the view keeps
    /// whatever it displayed before editing.
    pub async fn cancel(&self) -> Result<Option<RecordView>, ClientError> {
        let _op = self.op_lock.lock().await;
        let site_id = match self.state.lock().await.session.take() {
            Some(session) => session.record_id,
            None => return Ok(None),
        };
        info!(%site_id, "edit cancelled; reloading site");

        let record = self.api.fetch_site(&site_id).await?;
        let view = render_record(&record);
        self.state.lock().await.displayed = Some(view.clone());
        Ok(Some(view))
    }

    /// Drops everything tied to the current login: the displayed record, any
    /// edit session and the edit grant.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        *state = ControllerState::default();
    }
}

#[cfg(test)]
#[path = "tests/edit_tests.rs"]
mod tests;
