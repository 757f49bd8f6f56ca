//! Client-side logic for the rental site dashboard: session handling, the
//! authenticated API gateway, record rendering and the edit workflow.

pub mod api;
pub mod edit;
pub mod error;
pub mod gate;
pub mod render;
pub mod session;

pub use api::ApiClient;
pub use edit::{EditForm, EditInput, EditMode, EditSessionController, SaveOutcome};
pub use error::{AuthError, ClientError, ValidationError};
pub use gate::{EditCredentials, EditGate, ServerEditGate};
pub use render::{render_record, DisplaySlot, RecordView};
pub use session::{
    FileSessionStore, MemorySessionStore, SessionContext, SessionEvent, SessionStore,
    StoredSession,
};

#[cfg(test)]
#[path = "tests/mock_backend.rs"]
mod mock_backend;
