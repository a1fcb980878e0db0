use agentops::credentials::{
    AntiForgeryIssuer, AntiForgeryToken, Authorization, CredentialError, CredentialSource,
    SecretMaterial, SecretStore,
};
use agentops::identity::naming::{company_email, principal_name};
use agentops::identity::{IdentityError, IdentityIssuer, IdentityRequest, IssuedIdentity};
use agentops::onboarding::{
    AccessItemStatus, AccessItemUpdate, DelayedTaskQueue, NewUser, Notification,
    NotificationKind, Notifier, NotifyError, NotifyOutcome, OnboardingDelays, OnboardingFlow,
    OnboardingPolicy, OnboardingService, OnboardingStage, OutboxNotifier, PocRoutingRule,
    StoreError, TransitionOutcome, UserStatus, UserStore,
};
use agentops::onboarding::OnboardingError;
use agentops::pipeline::{
    PipelineAck, PipelineError, PipelineRequest, PipelineTrigger, ProvisioningClient,
};
use agentops::shared::logging::EventLog;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

struct FakeDirectory {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl IdentityIssuer for FakeDirectory {
    fn issue(&self, request: &IdentityRequest) -> Result<IssuedIdentity, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        if self.fail.load(Ordering::SeqCst) {
            return Err(IdentityError::Transport("directory offline".to_string()));
        }
        Ok(IssuedIdentity {
            email: company_email(&request.firstname, &request.lastname, "example.com"),
            principal_name: principal_name(&request.firstname, &request.lastname),
            display_name: request.full_name.clone().unwrap_or_default(),
            object_id: None,
        })
    }
}

struct StaticSecrets;

impl SecretStore for StaticSecrets {
    fn get_secret(&self, _name: &str) -> Result<SecretMaterial, CredentialError> {
        Ok(SecretMaterial::new("svc", "pw"))
    }
}

struct StaticCrumb;

impl AntiForgeryIssuer for StaticCrumb {
    fn issue(&self, _secret: &SecretMaterial) -> Result<AntiForgeryToken, CredentialError> {
        Ok(AntiForgeryToken {
            field: "Jenkins-Crumb".to_string(),
            value: "crumb".to_string(),
            session_cookie: None,
        })
    }
}

#[derive(Default)]
struct FakePipeline {
    requests: Mutex<Vec<PipelineRequest>>,
    reject: AtomicBool,
}

impl PipelineTrigger for FakePipeline {
    fn trigger(
        &self,
        request: &PipelineRequest,
        _authorization: Authorization,
    ) -> Result<PipelineAck, PipelineError> {
        self.requests.lock().expect("lock").push(request.clone());
        if self.reject.load(Ordering::SeqCst) {
            return Err(PipelineError::Rejected {
                status: 500,
                body: "executor offline".to_string(),
            });
        }
        Ok(PipelineAck {
            status_code: 201,
            queue_url: Some("http://jenkins.local/queue/item/1/".to_string()),
        })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    keys: Mutex<HashSet<String>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<NotifyOutcome, NotifyError> {
        if !self.keys.lock().expect("lock").insert(notification.dedupe_key()) {
            return Ok(NotifyOutcome::Duplicate);
        }
        self.sent.lock().expect("lock").push(notification.clone());
        Ok(NotifyOutcome::Sent)
    }
}

struct Fixture {
    dir: TempDir,
    store: UserStore,
    directory: Arc<FakeDirectory>,
    pipeline: Arc<FakePipeline>,
    notifier: Arc<RecordingNotifier>,
    flow: OnboardingFlow,
}

fn policy() -> OnboardingPolicy {
    OnboardingPolicy {
        identity_contact: "it-ops@example.com".to_string(),
        provisioning_contact: "access-ops@example.com".to_string(),
        aws_iam_user_group: Some("developers".to_string()),
        github_team: None,
        supported_services: Vec::new(),
    }
}

fn fixture_with(policy: OnboardingPolicy) -> Fixture {
    let dir = tempdir().expect("tempdir");
    let store = UserStore::open(&dir.path().join("db").join("users.sqlite")).expect("open");
    for (role, item, poc) in [
        ("engineer", "AWS", "poc-cloud"),
        ("engineer", "GitHub", "poc-scm"),
        ("engineer", "Email", "poc-it"),
        ("lead", "github", "poc-scm"),
        ("engineer", "Slack", "poc-it"),
    ] {
        store
            .add_route(&PocRoutingRule {
                role: role.to_string(),
                team: "backend".to_string(),
                access_item: item.to_string(),
                poc_id: poc.to_string(),
            })
            .expect("route");
    }
    let directory = Arc::new(FakeDirectory {
        calls: AtomicUsize::new(0),
        fail: AtomicBool::new(false),
    });
    let pipeline = Arc::new(FakePipeline::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let client = ProvisioningClient::new(
        pipeline.clone(),
        CredentialSource::new(Arc::new(StaticSecrets), Arc::new(StaticCrumb), "jenkins"),
        "job/ProvideAccess",
    );
    let flow = OnboardingFlow::new(
        store.clone(),
        directory.clone(),
        client,
        notifier.clone(),
        policy,
    )
    .with_event_log(EventLog::for_state_root(dir.path()));
    Fixture {
        dir,
        store,
        directory,
        pipeline,
        notifier,
        flow,
    }
}

fn fixture() -> Fixture {
    fixture_with(policy())
}

fn ada() -> NewUser {
    let mut user = NewUser::new("Ada Lovelace", "ada@personal.example.org", "backend");
    user.role = Some("engineer".to_string());
    user
}

fn item_names(user: &agentops::onboarding::UserEntity) -> Vec<String> {
    user.access_items.iter().map(|i| i.service.clone()).collect()
}

#[test]
fn creation_seeds_distinct_sorted_pending_items() {
    let f = fixture();
    let user = f.flow.create_user(&ada()).expect("create");

    assert_eq!(user.stage, OnboardingStage::New);
    assert_eq!(user.status, UserStatus::New);
    assert_eq!(item_names(&user), vec!["AWS", "Email", "GitHub", "Slack"]);
    assert!(user
        .access_items
        .iter()
        .all(|item| item.status == AccessItemStatus::Pending));
    assert_eq!(f.directory.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn duplicate_user_is_refused() {
    let f = fixture();
    f.flow.create_user(&ada()).expect("create");
    let err = f.flow.create_user(&ada()).expect_err("duplicate");
    assert!(matches!(
        err,
        OnboardingError::Store(StoreError::DuplicateUser { .. })
    ));
}

#[test]
fn identity_issuance_completes_email_items_and_notifies_once() {
    let f = fixture();
    let user = f.flow.create_user(&ada()).expect("create");

    let first = f.flow.issue_identity(user.id).expect("issue");
    assert_eq!(first, TransitionOutcome::Advanced(OnboardingStage::EmailIssued));
    let second = f.flow.issue_identity(user.id).expect("repeat");
    assert_eq!(second, TransitionOutcome::AlreadyPast(OnboardingStage::EmailIssued));

    assert_eq!(f.directory.calls.load(Ordering::SeqCst), 1);
    let user = f.store.require_user(user.id).expect("load");
    assert_eq!(user.company_email.as_deref(), Some("ada.lovelace@example.com"));
    assert_eq!(
        user.access_item("email").map(|i| i.status),
        Some(AccessItemStatus::Completed)
    );
    let sent = f.notifier.sent.lock().expect("lock");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::IdentityIssued);
    assert_eq!(sent[0].recipient, "it-ops@example.com");
}

#[test]
fn provisioning_before_identity_is_not_ready() {
    let f = fixture();
    let user = f.flow.create_user(&ada()).expect("create");
    let outcome = f.flow.provision_access(user.id).expect("provision");
    assert_eq!(outcome, TransitionOutcome::NotReady(OnboardingStage::New));
    assert!(f.pipeline.requests.lock().expect("lock").is_empty());
}

#[test]
fn provisioning_triggers_once_for_supported_items() {
    let f = fixture();
    let user = f.flow.create_user(&ada()).expect("create");
    f.flow.issue_identity(user.id).expect("issue");

    let outcome = f.flow.provision_access(user.id).expect("provision");
    assert_eq!(
        outcome,
        TransitionOutcome::Advanced(OnboardingStage::ProvisioningAccess)
    );
    let again = f.flow.provision_access(user.id).expect("repeat");
    assert_eq!(
        again,
        TransitionOutcome::AlreadyPast(OnboardingStage::ProvisioningAccess)
    );

    let requests = f.pipeline.requests.lock().expect("lock");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].get("Option"), Some("AWS,GitHub"));
    assert_eq!(requests[0].get("userEmail"), Some("ada.lovelace@example.com"));
    assert_eq!(requests[0].get("awsIAMUserGroup"), Some("developers"));

    let user = f.store.require_user(user.id).expect("load");
    assert_eq!(
        user.pending_items().map(|i| i.service.as_str()).collect::<Vec<_>>(),
        vec!["Slack"]
    );
    assert_eq!(user.status, UserStatus::InProgress);
}

#[test]
fn pipeline_failure_blocks_without_moving_the_stage() {
    let f = fixture();
    let user = f.flow.create_user(&ada()).expect("create");
    f.flow.issue_identity(user.id).expect("issue");
    f.pipeline.reject.store(true, Ordering::SeqCst);

    let outcome = f.flow.provision_access(user.id).expect("provision");
    match &outcome {
        TransitionOutcome::Blocked { stage, reason } => {
            assert_eq!(*stage, OnboardingStage::EmailIssued);
            assert!(reason.contains("executor offline"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    let blocked = f.store.require_user(user.id).expect("load");
    assert_eq!(blocked.stage, OnboardingStage::EmailIssued);
    assert_eq!(
        blocked.access_item("AWS").map(|i| i.status),
        Some(AccessItemStatus::Pending)
    );

    f.pipeline.reject.store(false, Ordering::SeqCst);
    let retried = f.flow.advance(user.id).expect("advance");
    assert_eq!(
        retried,
        TransitionOutcome::Advanced(OnboardingStage::ProvisioningAccess)
    );
}

#[test]
fn identity_failure_leaves_the_entity_new() {
    let f = fixture();
    let user = f.flow.create_user(&ada()).expect("create");
    f.directory.fail.store(true, Ordering::SeqCst);

    let outcome = f.flow.issue_identity(user.id).expect("issue");
    assert!(matches!(
        outcome,
        TransitionOutcome::Blocked {
            stage: OnboardingStage::New,
            ..
        }
    ));
    let user = f.store.require_user(user.id).expect("load");
    assert_eq!(user.stage, OnboardingStage::New);
    assert!(user.company_email.is_none());
    assert!(user
        .activity
        .iter()
        .any(|entry| entry.message.contains("directory offline")));
}

#[test]
fn manual_updates_finish_onboarding_and_never_regress() {
    let f = fixture();
    let user = f.flow.create_user(&ada()).expect("create");
    f.flow.issue_identity(user.id).expect("issue");
    f.flow.provision_access(user.id).expect("provision");

    let (changed, outcome) = f
        .flow
        .update_access_items(
            user.id,
            &[AccessItemUpdate {
                service: "slack".to_string(),
                status: AccessItemStatus::Completed,
            }],
        )
        .expect("update");
    assert_eq!(changed, vec!["Slack".to_string()]);
    assert_eq!(outcome, TransitionOutcome::Advanced(OnboardingStage::Completed));

    let done = f.store.require_user(user.id).expect("load");
    assert_eq!(done.status, UserStatus::Completed);
    assert!(done.all_items_completed());

    let err = f
        .flow
        .update_access_items(
            user.id,
            &[AccessItemUpdate {
                service: "AWS".to_string(),
                status: AccessItemStatus::Pending,
            }],
        )
        .expect_err("regression");
    assert!(matches!(
        err,
        OnboardingError::Store(StoreError::AccessItemRegression { .. })
    ));
    assert_eq!(
        f.flow.advance(user.id).expect("advance"),
        TransitionOutcome::AlreadyPast(OnboardingStage::Completed)
    );
}

#[test]
fn advancing_a_completed_entity_changes_nothing() {
    let f = fixture();
    let user = f.flow.create_user(&ada()).expect("create");
    f.flow.issue_identity(user.id).expect("issue");
    f.flow.provision_access(user.id).expect("provision");
    f.flow
        .update_access_items(
            user.id,
            &[AccessItemUpdate {
                service: "Slack".to_string(),
                status: AccessItemStatus::Completed,
            }],
        )
        .expect("update");

    let before = f.store.require_user(user.id).expect("load");
    assert_eq!(before.stage, OnboardingStage::Completed);
    let items_before: Vec<_> = before
        .access_items
        .iter()
        .map(|item| (item.service.clone(), item.status, item.completed_at))
        .collect();
    let sent_before = f.notifier.sent.lock().expect("lock").len();
    let identity_calls = f.directory.calls.load(Ordering::SeqCst);
    let pipeline_calls = f.pipeline.requests.lock().expect("lock").len();

    for _ in 0..2 {
        assert_eq!(
            f.flow.advance(user.id).expect("advance"),
            TransitionOutcome::AlreadyPast(OnboardingStage::Completed)
        );
    }

    let after = f.store.require_user(user.id).expect("load");
    let items_after: Vec<_> = after
        .access_items
        .iter()
        .map(|item| (item.service.clone(), item.status, item.completed_at))
        .collect();
    assert_eq!(items_after, items_before);
    assert_eq!(after.stage, OnboardingStage::Completed);
    assert_eq!(f.notifier.sent.lock().expect("lock").len(), sent_before);
    assert_eq!(f.directory.calls.load(Ordering::SeqCst), identity_calls);
    assert_eq!(f.pipeline.requests.lock().expect("lock").len(), pipeline_calls);
}

#[test]
fn restricted_service_list_leaves_other_items_pending() {
    let mut restricted = policy();
    restricted.supported_services = vec!["aws".to_string()];
    let f = fixture_with(restricted);
    let user = f.flow.create_user(&ada()).expect("create");
    f.flow.issue_identity(user.id).expect("issue");
    f.flow.provision_access(user.id).expect("provision");

    let requests = f.pipeline.requests.lock().expect("lock");
    assert_eq!(requests[0].get("Option"), Some("AWS"));
    let user = f.store.require_user(user.id).expect("load");
    assert_eq!(
        user.access_item("GitHub").map(|i| i.status),
        Some(AccessItemStatus::Pending)
    );
}

#[test]
fn concurrent_transitions_issue_a_single_identity() {
    let f = fixture();
    let user = f.flow.create_user(&ada()).expect("create");
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let flow = f.flow.clone();
            thread::spawn(move || flow.advance(user.id).expect("advance"))
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }

    assert_eq!(f.directory.calls.load(Ordering::SeqCst), 1);
    assert!(f.pipeline.requests.lock().expect("lock").len() <= 1);
    let stage = f.store.require_user(user.id).expect("load").stage;
    assert!(stage >= OnboardingStage::EmailIssued);
}

#[test]
fn run_to_completion_drives_every_stage() {
    let f = fixture();
    let service = OnboardingService::new(
        f.flow.clone(),
        OnboardingDelays {
            issuance: Duration::ZERO,
            provisioning: Duration::ZERO,
        },
    );
    let mut user = ada();
    user.team = "platform".to_string();
    let user = service.run_to_completion(&user).expect("run");

    // No routes for platform, so nothing is left to provision.
    assert_eq!(user.stage, OnboardingStage::Completed);
    assert!(f.pipeline.requests.lock().expect("lock").is_empty());
    assert_eq!(f.notifier.sent.lock().expect("lock").len(), 1);
}

#[test]
fn scheduled_onboarding_returns_immediately_and_finishes_in_background() {
    let f = fixture();
    let service = OnboardingService::new(
        f.flow.clone(),
        OnboardingDelays {
            issuance: Duration::from_millis(20),
            provisioning: Duration::from_millis(20),
        },
    );
    let queue = DelayedTaskQueue::start(EventLog::disabled());
    let created = service.onboard(&ada(), &queue.handle()).expect("onboard");
    assert_eq!(created.stage, OnboardingStage::New);

    assert!(queue.wait_idle(Duration::from_secs(10)));
    queue.shutdown();

    let user = f.store.require_user(created.id).expect("load");
    assert_eq!(user.stage, OnboardingStage::ProvisioningAccess);
    assert_eq!(f.pipeline.requests.lock().expect("lock").len(), 1);
    let kinds: Vec<_> = f
        .notifier
        .sent
        .lock()
        .expect("lock")
        .iter()
        .map(|n| n.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::IdentityIssued,
            NotificationKind::AccessProvisioned
        ]
    );
}

fn outbox_files(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[test]
fn outbox_notifier_writes_one_file_per_entity_and_kind() {
    let f = fixture();
    let outbox = f.dir.path().join("outbox");
    let notifier = OutboxNotifier::new(&outbox);
    let notification = Notification::new(
        7,
        NotificationKind::IdentityIssued,
        "it-ops@example.com",
        "Company email issued",
        "first body",
    );
    assert_eq!(notifier.notify(&notification).expect("first"), NotifyOutcome::Sent);
    let retry = Notification::new(
        7,
        NotificationKind::IdentityIssued,
        "it-ops@example.com",
        "Company email issued",
        "second body",
    );
    assert_eq!(
        notifier.notify(&retry).expect("second"),
        NotifyOutcome::Duplicate
    );
    assert_eq!(outbox_files(&outbox), 1);
}
