//! Repopulates the blind indexes used to look users up by email and name.
//!
//! ```text
//! siteworks-server task BlindIndexUpdate --index=all
//! siteworks-server task BlindIndexUpdate --index=first_name --truncate=yes
//! ```

use crate::app_services::AppServices;
use crate::blind_index_store::{BlindIndexKind, BlindIndexStore, SearchValue};
use crate::tasks::{TaskContext, TaskHandler, TaskOutcome, TaskParams};
use crate::user_store::User;
use crate::vault_store::untokenize;
use std::collections::HashMap;

pub const ALIAS: &str = "BlindIndexUpdate";

const ALLOWED_INDEXES: [&str; 4] = ["all", "email", "first_name", "last_name"];

/// Email is rebuilt last: logins depend on it, so the other indexes must have
/// gone through the same data cleanly first.
const REBUILD_ORDER: [BlindIndexKind; 3] = [
    BlindIndexKind::FirstName,
    BlindIndexKind::LastName,
    BlindIndexKind::Email,
];

pub struct BlindIndexRebuildTask;

impl TaskHandler for BlindIndexRebuildTask {
    fn alias(&self) -> &'static str {
        ALIAS
    }

    fn title(&self) -> &'static str {
        "Blind Index Update"
    }

    fn description(&self) -> &'static str {
        "Truncates a blind index table, and repopulates it with the current data"
    }

    fn handle(&self, ctx: &mut TaskContext) -> TaskOutcome {
        let index = ctx.param("index").to_string();
        let truncate = ctx.param("truncate") == "yes";

        if !ALLOWED_INDEXES.contains(&index.as_str()) {
            ctx.log_error(format!(
                "Invalid index: '{}'. Must be one of: '{}'. Aborted.",
                index,
                ALLOWED_INDEXES.join("', '")
            ));
            return TaskOutcome::failed(format!("invalid index '{}'", index));
        }

        if self.enqueue_if_requested(ctx, TaskParams::new().with("index", index.as_str())) {
            return TaskOutcome::Succeeded;
        }

        for kind in REBUILD_ORDER {
            if index != "all" && index != kind.as_str() {
                continue;
            }
            if !rebuild_index(ctx, kind, truncate) {
                return TaskOutcome::failed(format!("{} index rebuild aborted", kind.as_str()));
            }
        }

        TaskOutcome::Succeeded
    }
}

fn label(kind: BlindIndexKind) -> &'static str {
    match kind {
        BlindIndexKind::Email => "email",
        BlindIndexKind::FirstName => "first name",
        BlindIndexKind::LastName => "last name",
    }
}

fn field_token(user: &User, kind: BlindIndexKind) -> &str {
    match kind {
        BlindIndexKind::Email => &user.email,
        BlindIndexKind::FirstName => &user.first_name,
        BlindIndexKind::LastName => &user.last_name,
    }
}

fn rebuild_index(ctx: &mut TaskContext, kind: BlindIndexKind, truncate: bool) -> bool {
    ctx.log_info(format!("Rebuilding {} index:", label(kind)));

    let services = ctx.services().clone();
    let Some(user_store) = services.user_store.clone() else {
        ctx.log_error("User store is not configured. Aborted.");
        return false;
    };
    let Some(index_store) = services.blind_index_store(kind).cloned() else {
        ctx.log_error(format!(
            "Blind index store for {} is not configured. Aborted.",
            kind.as_str()
        ));
        return false;
    };

    if truncate {
        ctx.log_info(" - Truncating blind index table");
        if let Err(e) = index_store.truncate() {
            ctx.log_error(format!("Error truncating blind index table: {}", e));
            return false;
        }
    }

    ctx.log_info(" - Fetching users list");
    let users = match user_store.list_users() {
        Ok(users) => users,
        Err(e) => {
            ctx.log_error(format!("Error retrieving users: {}", e));
            return false;
        }
    };

    ctx.log_info(" - Rebuilding index");
    for user in &users {
        if !upsert_for_user(ctx, &services, index_store.as_ref(), kind, user) {
            ctx.log_error(format!(
                "- Failed to insert {} for user: {}. Aborted.",
                label(kind),
                user.id
            ));
            return false;
        }
    }

    ctx.log_info(" - Index rebuilt successfully");
    true
}

fn upsert_for_user(
    ctx: &mut TaskContext,
    services: &AppServices,
    index_store: &dyn BlindIndexStore,
    kind: BlindIndexKind,
    user: &User,
) -> bool {
    let existing = match index_store.find_by_source_reference_id(&user.id) {
        Ok(existing) => existing,
        Err(e) => {
            ctx.log_error(format!(
                "Error searching for blind index by source reference ID: {} - {}",
                user.id, e
            ));
            return false;
        }
    };

    let token = field_token(user, kind);
    if token.is_empty() {
        delete_if_present(ctx, index_store, existing, &user.id);
        return true;
    }

    let tokens = HashMap::from([(kind.as_str().to_string(), token.to_string())]);
    let plaintext = match untokenize(
        services.vault_store.as_ref(),
        &services.settings.vault_key,
        &tokens,
    ) {
        Ok(mut values) => values.remove(kind.as_str()).unwrap_or_default(),
        Err(e) => {
            ctx.log_error(format!("Error untokenizing user token: {} - {}", token, e));
            return false;
        }
    };

    if plaintext.is_empty() {
        delete_if_present(ctx, index_store, existing, &user.id);
        return true;
    }

    match existing {
        Some(mut value) => {
            value.search_value = plaintext;
            if let Err(e) = index_store.update(&value) {
                ctx.log_error(format!(
                    "Error updating blind index for user: {} - {}",
                    user.id, e
                ));
                return false;
            }
        }
        None => {
            if let Err(e) = index_store.create(&user.id, &plaintext) {
                ctx.log_error(format!(
                    "Error creating blind index for user: {} - {}",
                    user.id, e
                ));
                return false;
            }
        }
    }
    true
}

/// An empty value is useless in a search, so any existing row goes away.
fn delete_if_present(
    ctx: &mut TaskContext,
    index_store: &dyn BlindIndexStore,
    existing: Option<SearchValue>,
    user_id: &str,
) {
    if let Some(value) = existing {
        if let Err(e) = index_store.delete(&value) {
            ctx.log_error(format!(
                "Error deleting blind index for user: {} - {}",
                user_id, e
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_store::{TaskQuery, TaskStatus, TaskStore};
    use crate::test_support::{StoresFixture, TEST_VAULT_KEY};
    use crate::user_store::UserStore;
    use crate::vault_store::VaultStore;
    use anyhow::{bail, Result};
    use std::sync::{Arc, Mutex};

    /// Delegates to a real index and records which index was touched.
    struct RecordingIndex {
        inner: Arc<dyn BlindIndexStore>,
        touched: Arc<Mutex<Vec<BlindIndexKind>>>,
        fail_lookups: bool,
    }

    impl RecordingIndex {
        fn record(&self) {
            self.touched.lock().unwrap().push(self.inner.kind());
        }
    }

    impl BlindIndexStore for RecordingIndex {
        fn kind(&self) -> BlindIndexKind {
            self.inner.kind()
        }
        fn truncate(&self) -> Result<()> {
            self.record();
            self.inner.truncate()
        }
        fn find_by_source_reference_id(&self, id: &str) -> Result<Option<SearchValue>> {
            self.record();
            if self.fail_lookups {
                bail!("index offline");
            }
            self.inner.find_by_source_reference_id(id)
        }
        fn create(&self, id: &str, value: &str) -> Result<SearchValue> {
            self.record();
            self.inner.create(id, value)
        }
        fn update(&self, value: &SearchValue) -> Result<()> {
            self.record();
            self.inner.update(value)
        }
        fn delete(&self, value: &SearchValue) -> Result<()> {
            self.record();
            self.inner.delete(value)
        }
        fn search(&self, value: &str) -> Result<Vec<String>> {
            self.inner.search(value)
        }
        fn list(&self) -> Result<Vec<SearchValue>> {
            self.inner.list()
        }
    }

    fn tokenize(fixture: &StoresFixture, value: &str) -> String {
        fixture.vault_store.tokenize(value, TEST_VAULT_KEY).unwrap()
    }

    fn run(services: AppServices, params: TaskParams) -> (TaskOutcome, Vec<String>) {
        let mut ctx = TaskContext::new(Arc::new(services), params);
        let outcome = BlindIndexRebuildTask.handle(&mut ctx);
        (outcome, ctx.log_lines().to_vec())
    }

    fn all_params() -> TaskParams {
        TaskParams::new().with("index", "all").with("truncate", "yes")
    }

    fn recording(
        services: &mut AppServices,
        touched: &Arc<Mutex<Vec<BlindIndexKind>>>,
        failing: Option<BlindIndexKind>,
    ) {
        for kind in REBUILD_ORDER {
            let inner = services.blind_index_store(kind).unwrap().clone();
            let wrapped: Arc<dyn BlindIndexStore> = Arc::new(RecordingIndex {
                inner,
                touched: touched.clone(),
                fail_lookups: failing == Some(kind),
            });
            match kind {
                BlindIndexKind::Email => services.blind_index_email = Some(wrapped),
                BlindIndexKind::FirstName => services.blind_index_first_name = Some(wrapped),
                BlindIndexKind::LastName => services.blind_index_last_name = Some(wrapped),
            }
        }
    }

    #[test]
    fn invalid_index_aborts_without_writes() {
        let fixture = StoresFixture::new();
        fixture
            .user_store
            .create_user(&User::new("u1").with_email(tokenize(&fixture, "a@b.com")))
            .unwrap();
        let services = fixture.services();
        let email_index = services.blind_index_email.clone().unwrap();

        let (outcome, lines) = run(services, TaskParams::new().with("index", "bogus"));

        assert!(matches!(outcome, TaskOutcome::Failed(_)));
        assert!(lines[0].contains(
            "Invalid index: 'bogus'. Must be one of: 'all', 'email', 'first_name', 'last_name'. Aborted."
        ));
        assert!(email_index.list().unwrap().is_empty());
        assert!(fixture.task_store.list(&TaskQuery::new()).unwrap().is_empty());
    }

    #[test]
    fn missing_index_is_invalid() {
        let fixture = StoresFixture::new();
        let (outcome, lines) = run(fixture.services(), TaskParams::new());
        assert!(matches!(outcome, TaskOutcome::Failed(_)));
        assert!(lines[0].contains("Invalid index: ''"));
    }

    #[test]
    fn rebuild_all_indexes_single_user() {
        let fixture = StoresFixture::new();
        let user = User::new("user-1").with_email(tokenize(&fixture, "a@b.com"));
        fixture.user_store.create_user(&user).unwrap();
        let services = fixture.services();

        // A stale first name row for the same user must disappear.
        let first_names = services.blind_index_first_name.clone().unwrap();
        first_names.create("user-1", "Stale").unwrap();
        let emails = services.blind_index_email.clone().unwrap();
        let last_names = services.blind_index_last_name.clone().unwrap();

        let (outcome, _) = run(services, all_params());

        assert_eq!(outcome, TaskOutcome::Succeeded);
        let rows = emails.list().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_reference_id, "user-1");
        assert_eq!(rows[0].search_value, "a@b.com");
        assert!(first_names.list().unwrap().is_empty());
        assert!(last_names.list().unwrap().is_empty());
    }

    #[test]
    fn every_user_with_a_value_gets_exactly_one_row() {
        let fixture = StoresFixture::new();
        let users = vec![
            User::new("u1")
                .with_email(tokenize(&fixture, "one@example.com"))
                .with_first_name(tokenize(&fixture, "Ada"))
                .with_last_name(tokenize(&fixture, "Lovelace")),
            User::new("u2")
                .with_email(tokenize(&fixture, "two@example.com"))
                .with_first_name(tokenize(&fixture, "")),
            User::new("u3"),
        ];
        for user in &users {
            fixture.user_store.create_user(user).unwrap();
        }
        let services = fixture.services();
        let emails = services.blind_index_email.clone().unwrap();
        let first_names = services.blind_index_first_name.clone().unwrap();
        let last_names = services.blind_index_last_name.clone().unwrap();

        // Run twice: the second pass upserts instead of duplicating.
        let (outcome, _) = run(fixture.services(), all_params());
        assert_eq!(outcome, TaskOutcome::Succeeded);
        let (outcome, _) = run(services, TaskParams::new().with("index", "all"));
        assert_eq!(outcome, TaskOutcome::Succeeded);

        let mut email_rows: Vec<(String, String)> = emails
            .list()
            .unwrap()
            .into_iter()
            .map(|v| (v.source_reference_id, v.search_value))
            .collect();
        email_rows.sort();
        assert_eq!(
            email_rows,
            vec![
                ("u1".to_string(), "one@example.com".to_string()),
                ("u2".to_string(), "two@example.com".to_string()),
            ]
        );
        assert_eq!(first_names.search("Ada").unwrap(), vec!["u1".to_string()]);
        assert_eq!(first_names.list().unwrap().len(), 1);
        assert_eq!(last_names.list().unwrap().len(), 1);
    }

    #[test]
    fn existing_row_is_updated_in_place() {
        let fixture = StoresFixture::new();
        fixture
            .user_store
            .create_user(&User::new("u1").with_email(tokenize(&fixture, "new@example.com")))
            .unwrap();
        let services = fixture.services();
        let emails = services.blind_index_email.clone().unwrap();
        let old = emails.create("u1", "old@example.com").unwrap();

        let (outcome, _) = run(services, TaskParams::new().with("index", "email"));

        assert_eq!(outcome, TaskOutcome::Succeeded);
        let rows = emails.list().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, old.id);
        assert_eq!(rows[0].search_value, "new@example.com");
    }

    #[test]
    fn indexes_rebuild_first_name_then_last_name_then_email() {
        let fixture = StoresFixture::new();
        fixture
            .user_store
            .create_user(
                &User::new("u1")
                    .with_email(tokenize(&fixture, "a@b.com"))
                    .with_first_name(tokenize(&fixture, "Ada"))
                    .with_last_name(tokenize(&fixture, "Byron")),
            )
            .unwrap();
        let mut services = fixture.services();
        let touched = Arc::new(Mutex::new(Vec::new()));
        recording(&mut services, &touched, None);

        let (outcome, _) = run(services, all_params());
        assert_eq!(outcome, TaskOutcome::Succeeded);

        let mut order = touched.lock().unwrap().clone();
        order.dedup();
        assert_eq!(
            order,
            vec![
                BlindIndexKind::FirstName,
                BlindIndexKind::LastName,
                BlindIndexKind::Email
            ]
        );
    }

    #[test]
    fn failing_index_skips_the_later_ones() {
        let fixture = StoresFixture::new();
        fixture
            .user_store
            .create_user(&User::new("u1").with_email(tokenize(&fixture, "a@b.com")))
            .unwrap();
        let mut services = fixture.services();
        let touched = Arc::new(Mutex::new(Vec::new()));
        recording(&mut services, &touched, Some(BlindIndexKind::FirstName));
        let emails = services.blind_index_email.clone().unwrap();

        let (outcome, lines) = run(services, all_params());

        assert!(matches!(outcome, TaskOutcome::Failed(_)));
        assert!(lines
            .iter()
            .any(|l| l.contains("- Failed to insert first name for user: u1. Aborted.")));
        let touched = touched.lock().unwrap();
        assert!(!touched.contains(&BlindIndexKind::LastName));
        assert!(!touched.contains(&BlindIndexKind::Email));
        assert!(emails.list().unwrap().is_empty());
    }

    #[test]
    fn untokenize_failure_aborts_the_index() {
        let fixture = StoresFixture::new();
        fixture
            .user_store
            .create_user(&User::new("u1").with_email(tokenize(&fixture, "a@b.com")))
            .unwrap();
        let mut services = fixture.services();
        services.settings.vault_key = "wrong-key".to_string();

        let (outcome, lines) = run(services, TaskParams::new().with("index", "email"));

        assert!(matches!(outcome, TaskOutcome::Failed(_)));
        assert!(lines.iter().any(|l| l.contains("Error untokenizing user token")));
    }

    #[test]
    fn missing_user_store_aborts() {
        let fixture = StoresFixture::new();
        let mut services = fixture.services();
        services.user_store = None;

        let (outcome, lines) = run(services, TaskParams::new().with("index", "email"));

        assert!(matches!(outcome, TaskOutcome::Failed(_)));
        assert!(lines
            .iter()
            .any(|l| l.contains("User store is not configured. Aborted.")));
    }

    #[test]
    fn enqueue_request_schedules_a_queue_entry() {
        let fixture = StoresFixture::new();
        let (outcome, lines) = run(
            fixture.services(),
            TaskParams::new()
                .with("index", "email")
                .with("truncate", "yes")
                .with("enqueue", "yes"),
        );

        assert_eq!(outcome, TaskOutcome::Succeeded);
        assert!(lines[0].ends_with("[SUCCESS] Task enqueued."));

        let queued = fixture
            .task_store
            .list(&TaskQuery::new().alias(ALIAS).status(TaskStatus::Queued))
            .unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].params.get("index"), "email");
        assert!(!queued[0].params.contains("truncate"));
    }
}
