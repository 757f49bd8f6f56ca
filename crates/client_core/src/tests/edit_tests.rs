use super::*;

use axum::http::StatusCode;
use serde_json::json;

use crate::{
    gate::ServerEditGate,
    mock_backend::{record, sample_site, signed_in_client, MockBackend},
};

async fn backend() -> MockBackend {
    MockBackend::default()
        .with_site("1042", sample_site())
        .await
        .with_user("admin", "s3cret", "admin")
        .await
        .with_user("clerk", "clerk-pass", "user")
        .await
}

fn controller_for(base_url: &str) -> Arc<EditSessionController> {
    let api = signed_in_client(base_url);
    let gate = Arc::new(ServerEditGate::new(api.clone()));
    EditSessionController::new(api, gate)
}

fn admin_credentials() -> EditCredentials {
    EditCredentials::new("admin", "s3cret")
}

/// Controller with site 1042 displayed and edit mode entered.
async fn editing(backend: &MockBackend) -> Arc<EditSessionController> {
    let controller = controller_for(&backend.clone().spawn().await);
    controller.search("1042").await.expect("search");
    controller
        .unlock_editing(&admin_credentials())
        .await
        .expect("unlock");
    controller.enter_edit().await.expect("enter edit");
    controller
}

#[tokio::test]
async fn starts_viewing_with_nothing_displayed() {
    let controller = controller_for(&backend().await.spawn().await);
    assert_eq!(controller.mode().await, EditMode::Viewing);
    assert!(controller.displayed().await.is_none());
    assert!(controller.form().await.is_none());
}

#[tokio::test]
async fn empty_search_is_rejected_locally() {
    let backend = backend().await;
    let controller = controller_for(&backend.clone().spawn().await);

    let err = controller.search("   ").await.expect_err("must fail");

    assert_eq!(err.validation(), Some(&ValidationError::EmptySiteId));
    assert_eq!(backend.site_gets(), 0);
}

#[tokio::test]
async fn search_renders_site() {
    let controller = controller_for(&backend().await.spawn().await);

    let view = controller.search(" 1042 ").await.expect("search");

    assert_eq!(view.text("site"), Some("1042"));
    assert_eq!(view.text("site_id"), Some("1042"));
    assert_eq!(view.text("hike_percentage"), Some("12.5%"));
    assert_eq!(view.text("present_rent"), Some("45000"));
    assert_eq!(controller.displayed().await, Some(view));
}

#[tokio::test]
async fn enter_edit_without_record_fails() {
    let controller = controller_for(&backend().await.spawn().await);
    controller
        .unlock_editing(&admin_credentials())
        .await
        .expect("unlock");

    let err = controller.enter_edit().await.expect_err("must fail");

    assert_eq!(err.validation(), Some(&ValidationError::NoRecordSelected));
    assert_eq!(controller.mode().await, EditMode::Viewing);
}

#[tokio::test]
async fn enter_edit_requires_gate() {
    let controller = controller_for(&backend().await.spawn().await);
    controller.search("1042").await.expect("search");

    let err = controller.enter_edit().await.expect_err("must fail");

    assert!(matches!(err, ClientError::PermissionDenied(_)), "{err:?}");
    assert_eq!(controller.mode().await, EditMode::Viewing);
}

#[tokio::test]
async fn gate_rejects_bad_password_and_stays_viewing() {
    let controller = controller_for(&backend().await.spawn().await);
    controller.search("1042").await.expect("search");

    let err = controller
        .unlock_editing(&EditCredentials::new("admin", "admin@123"))
        .await
        .expect_err("must fail");

    assert_eq!(err.validation(), Some(&ValidationError::InvalidCredentials));
    assert!(!controller.is_edit_unlocked().await);
    assert_eq!(controller.mode().await, EditMode::Viewing);
    assert!(controller.api().session().is_authenticated());
}

#[tokio::test]
async fn gate_rejects_role_without_edit_rights() {
    let controller = controller_for(&backend().await.spawn().await);

    let err = controller
        .unlock_editing(&EditCredentials::new("clerk", "clerk-pass"))
        .await
        .expect_err("must fail");

    assert!(matches!(err, ClientError::PermissionDenied(_)), "{err:?}");
    assert!(!controller.is_edit_unlocked().await);
}

#[tokio::test]
async fn grant_does_not_survive_a_new_login() {
    let controller = controller_for(&backend().await.spawn().await);
    controller.search("1042").await.expect("search");
    controller
        .unlock_editing(&admin_credentials())
        .await
        .expect("unlock");
    assert!(controller.is_edit_unlocked().await);

    controller.api().login("clerk", "clerk-pass").await.expect("login");

    assert!(!controller.is_edit_unlocked().await);
    assert!(matches!(
        controller.enter_edit().await,
        Err(ClientError::PermissionDenied(_))
    ));
}

#[tokio::test]
async fn enter_edit_snapshots_view_and_normalizes_dates() {
    let backend = backend().await;
    let controller = editing(&backend).await;

    assert_eq!(controller.mode().await, EditMode::Editing);
    let form = controller.form().await.expect("form");
    assert_eq!(form.site_id, SiteId("1042".into()));
    assert_eq!(form.value("doo"), Some("31-01-2024"));
    assert_eq!(form.value("validity_date"), Some("31-01-2024"));
    assert_eq!(form.input("doo").expect("doo").placeholder, Some("dd-mm-yyyy"));
    assert_eq!(form.value("region"), Some("East"));
    assert_eq!(form.value("hike_percentage"), Some("12.5%"));
    assert!(form.input("site").is_none());
    assert!(form.input("site_id").is_none());

    let snapshot = controller.original_snapshot().await.expect("snapshot");
    assert_eq!(snapshot.text("doo"), Some("2024-01-31"));
    assert_eq!(Some(snapshot), controller.displayed().await);
}

#[tokio::test]
async fn enter_edit_twice_keeps_live_form() {
    let backend = backend().await;
    let controller = editing(&backend).await;
    controller.set_field("region", "North").await.expect("set");

    let form = controller.enter_edit().await.expect("enter again");

    assert_eq!(form.value("region"), Some("North"));
}

#[tokio::test]
async fn set_field_rejects_identifier_and_unknown_fields() {
    let backend = backend().await;
    let controller = editing(&backend).await;

    let err = controller
        .set_field("site_id", "1")
        .await
        .expect_err("must fail");
    assert!(matches!(
        err.validation(),
        Some(ValidationError::InvalidField(_))
    ));

    let err = controller
        .set_field("colour", "red")
        .await
        .expect_err("must fail");
    assert!(matches!(
        err.validation(),
        Some(ValidationError::InvalidField(_))
    ));
}

#[tokio::test]
async fn set_field_outside_edit_mode_fails() {
    let controller = controller_for(&backend().await.spawn().await);
    controller.search("1042").await.expect("search");

    let err = controller
        .set_field("region", "North")
        .await
        .expect_err("must fail");

    assert_eq!(err.validation(), Some(&ValidationError::NotEditing));
}

#[tokio::test]
async fn save_with_all_fields_empty_makes_no_call() {
    let backend = backend().await;
    let controller = editing(&backend).await;
    let form = controller.form().await.expect("form");
    for input in &form.inputs {
        controller.set_field(input.field, "   ").await.expect("clear");
    }

    let err = controller.save().await.expect_err("must fail");

    assert_eq!(err.validation(), Some(&ValidationError::NothingToUpdate));
    assert_eq!(backend.put_calls(), 0);
    assert_eq!(controller.mode().await, EditMode::Editing);
}

#[tokio::test]
async fn save_sends_only_trimmed_touched_fields() {
    let backend = backend().await;
    let controller = editing(&backend).await;
    controller
        .set_field("region", "  North  ")
        .await
        .expect("set");
    controller.set_field("remarks", "").await.expect("set");

    let outcome = controller.save().await.expect("save");

    let puts = backend.puts.lock().await.clone();
    assert_eq!(puts, vec![("1042".to_string(), json!({ "region": "North" }))]);
    match outcome {
        SaveOutcome::Saved { message, view } => {
            assert_eq!(message, "Site updated successfully");
            assert_eq!(view.text("region"), Some("North"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(controller.mode().await, EditMode::Viewing);
    assert!(controller.form().await.is_none());
    assert_eq!(
        controller.displayed().await.expect("view").text("region"),
        Some("North")
    );
}

#[tokio::test]
async fn failed_save_keeps_editing_with_inputs() {
    let backend = backend().await;
    *backend.put_failure.lock().await = Some((
        StatusCode::BAD_REQUEST,
        json!({ "message": "Error updating site: bad date" }),
    ));
    let controller = editing(&backend).await;
    controller.set_field("doo", "99-99-2024").await.expect("set");

    let err = controller.save().await.expect_err("must fail");

    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Error updating site: bad date");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(controller.mode().await, EditMode::Editing);
    let form = controller.form().await.expect("form");
    assert_eq!(form.value("doo"), Some("99-99-2024"));

    *backend.put_failure.lock().await = None;
    assert!(matches!(
        controller.save().await.expect("retry"),
        SaveOutcome::Saved { .. }
    ));
}

#[tokio::test]
async fn save_with_expired_token_clears_session_and_stays_editing() {
    let backend = backend().await;
    let controller = editing(&backend).await;
    controller.set_field("region", "North").await.expect("set");
    backend.reject_tokens.store(true, Ordering::SeqCst);

    let err = controller.save().await.expect_err("must fail");

    assert_eq!(err.auth(), Some(AuthError::SessionExpired));
    assert!(!controller.api().session().is_authenticated());
    assert_eq!(controller.mode().await, EditMode::Editing);
}

#[tokio::test]
async fn save_reports_stale_view_when_refetch_fails() {
    let backend = backend().await;
    let controller = editing(&backend).await;
    controller.set_field("region", "North").await.expect("set");
    let before = controller.displayed().await;
    let release = backend.hold_puts().await;

    let saving = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.save().await })
    };
    backend.put_started.notified().await;
    backend.reject_tokens.store(true, Ordering::SeqCst);
    release.notify_one();

    let outcome = saving.await.expect("join").expect("save");
    match outcome {
        SaveOutcome::SavedStale {
            message,
            refresh_error,
        } => {
            assert_eq!(message, "Site updated successfully");
            assert_eq!(refresh_error.auth(), Some(AuthError::SessionExpired));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(controller.mode().await, EditMode::Viewing);
    assert_eq!(controller.displayed().await, before);
}

#[tokio::test]
async fn cancel_reloads_current_server_state() {
    let backend = backend().await;
    let controller = editing(&backend).await;
    controller.set_field("region", "North").await.expect("set");
    backend
        .records
        .lock()
        .await
        .insert("1042".into(), json!({ "site": 1042, "region": "South" }));

    let view = controller.cancel().await.expect("cancel").expect("view");

    assert_eq!(view.text("region"), Some("South"));
    assert_eq!(controller.mode().await, EditMode::Viewing);
    assert_eq!(backend.put_calls(), 0);
    assert_eq!(controller.displayed().await, Some(view));
}

#[tokio::test]
async fn cancel_while_viewing_is_a_no_op() {
    let backend = backend().await;
    let controller = controller_for(&backend.clone().spawn().await);
    controller.search("1042").await.expect("search");
    let gets = backend.site_gets();

    assert!(controller.cancel().await.expect("cancel").is_none());
    assert_eq!(backend.site_gets(), gets);
}

#[tokio::test]
async fn cancel_with_failed_reload_leaves_viewing() {
    let backend = backend().await;
    let controller = editing(&backend).await;
    let before = controller.displayed().await;
    backend.records.lock().await.clear();

    let err = controller.cancel().await.expect_err("must fail");

    assert!(matches!(err, ClientError::Api { status: 404, .. }), "{err:?}");
    assert_eq!(controller.mode().await, EditMode::Viewing);
    assert_eq!(controller.displayed().await, before);
}

#[tokio::test]
async fn second_save_while_outstanding_is_ignored() {
    let backend = backend().await;
    let controller = editing(&backend).await;
    controller.set_field("region", "North").await.expect("set");
    let release = backend.hold_puts().await;

    let first = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.save().await })
    };
    backend.put_started.notified().await;

    let second = controller.save().await.expect("second save");
    assert!(matches!(second, SaveOutcome::Ignored));

    release.notify_one();
    let first = first.await.expect("join").expect("first save");
    assert!(matches!(first, SaveOutcome::Saved { .. }));
    assert_eq!(backend.put_calls(), 1);
}

#[tokio::test]
async fn cancel_waits_for_outstanding_save() {
    let backend = backend().await;
    let controller = editing(&backend).await;
    controller.set_field("region", "North").await.expect("set");
    let gets_before_save = backend.site_gets();
    let release = backend.hold_puts().await;

    let saving = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.save().await })
    };
    backend.put_started.notified().await;
    let cancelling = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.cancel().await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!cancelling.is_finished());

    release.notify_one();
    let saved = saving.await.expect("join").expect("save");
    let cancelled = cancelling.await.expect("join").expect("cancel");

    assert!(matches!(saved, SaveOutcome::Saved { .. }));
    assert!(cancelled.is_none());
    assert_eq!(backend.site_gets(), gets_before_save + 1);
    assert_eq!(
        controller.displayed().await.expect("view").text("region"),
        Some("North")
    );
}

#[tokio::test]
async fn new_search_discards_edit_session() {
    let backend = backend()
        .await
        .with_site("77", json!({ "site": 77, "region": "West" }))
        .await;
    let controller = editing(&backend).await;
    controller.set_field("region", "North").await.expect("set");

    let view = controller.search("77").await.expect("search");

    assert_eq!(view.text("region"), Some("West"));
    assert_eq!(controller.mode().await, EditMode::Viewing);
    assert!(controller.form().await.is_none());
}

#[tokio::test]
async fn reset_forgets_view_session_and_grant() {
    let backend = backend().await;
    let controller = editing(&backend).await;

    controller.reset().await;

    assert_eq!(controller.mode().await, EditMode::Viewing);
    assert!(controller.displayed().await.is_none());
    assert!(!controller.is_edit_unlocked().await);
}

#[test]
fn pending_edits_skip_untouched_and_blank_inputs() {
    let view = crate::render::render_record(&record(sample_site()));
    let mut form = EditForm::from_view(SiteId("1042".into()), &view);
    form.set("region", " North ").expect("set");
    form.set("remarks", "   ").expect("set");

    let edits = form.pending_edits();

    assert_eq!(
        edits,
        SiteUpdate::from([("region".to_string(), "North".to_string())])
    );
    assert!(form.input("region").expect("region").is_touched());
    assert!(!form.input("store_name").expect("store").is_touched());
}
