use super::domain::{AccessItemUpdate, NewUser, OnboardingStage, UserEntity};
use super::locks::EntityLocks;
use super::notify::{Notification, NotificationKind, Notifier, NotifyOutcome};
use super::store::{StoreError, UserStore};
use crate::identity::{IdentityIssuer, IdentityRequest};
use crate::orchestration::OrchestratorError;
use crate::pipeline::{canonical_service, ProvideAccessParams, ProvisionError, ProvisioningClient};
use crate::shared::logging::EventLog;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The entity moved to this stage.
    Advanced(OnboardingStage),
    /// The entity was already beyond the transition; nothing changed.
    AlreadyPast(OnboardingStage),
    /// The transition's precondition does not hold yet.
    NotReady(OnboardingStage),
    /// An external call failed; the entity stays at `stage`.
    Blocked {
        stage: OnboardingStage,
        reason: String,
    },
}

impl TransitionOutcome {
    pub fn stage(&self) -> OnboardingStage {
        match self {
            Self::Advanced(stage) | Self::AlreadyPast(stage) | Self::NotReady(stage) => *stage,
            Self::Blocked { stage, .. } => *stage,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Operational contacts and fixed pipeline parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnboardingPolicy {
    pub identity_contact: String,
    pub provisioning_contact: String,
    pub aws_iam_user_group: Option<String>,
    pub github_team: Option<String>,
    /// Services the pipeline may be asked for. Empty means every service the
    /// pipeline recognises.
    pub supported_services: Vec<String>,
}

impl OnboardingPolicy {
    fn allows(&self, service: &str) -> bool {
        let Some(canonical) = canonical_service(service) else {
            return false;
        };
        self.supported_services.is_empty()
            || self
                .supported_services
                .iter()
                .any(|allowed| canonical_service(allowed) == Some(canonical))
    }
}

/// Stage transitions for onboarding entities. Every public operation holds the
/// entity's lock and is safe to repeat: a transition the entity is already
/// past reports `AlreadyPast` and touches nothing.
#[derive(Clone)]
pub struct OnboardingFlow {
    store: UserStore,
    identity: Arc<dyn IdentityIssuer>,
    provisioning: ProvisioningClient,
    notifier: Arc<dyn Notifier>,
    locks: Arc<EntityLocks>,
    policy: OnboardingPolicy,
    log: EventLog,
}

impl OnboardingFlow {
    pub fn new(
        store: UserStore,
        identity: Arc<dyn IdentityIssuer>,
        provisioning: ProvisioningClient,
        notifier: Arc<dyn Notifier>,
        policy: OnboardingPolicy,
    ) -> Self {
        Self {
            store,
            identity,
            provisioning,
            notifier,
            locks: Arc::new(EntityLocks::new()),
            policy,
            log: EventLog::disabled(),
        }
    }

    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn store(&self) -> &UserStore {
        &self.store
    }

    pub fn create_user(&self, user: &NewUser) -> Result<UserEntity, OnboardingError> {
        let entity = self.store.create_user(user)?;
        self.log.info(
            "onboarding.created",
            format!(
                "user_id={} team={} access_items={}",
                entity.id,
                entity.team,
                entity.access_items.len()
            ),
        );
        Ok(entity)
    }

    /// Runs whichever transition follows the entity's current stage.
    pub fn advance(&self, user_id: i64) -> Result<TransitionOutcome, OnboardingError> {
        let stage = self.store.require_user(user_id)?.stage;
        match stage {
            OnboardingStage::New => self.issue_identity(user_id),
            OnboardingStage::EmailIssued => self.provision_access(user_id),
            OnboardingStage::ProvisioningAccess => self.refresh_completion(user_id),
            OnboardingStage::Completed => Ok(TransitionOutcome::AlreadyPast(stage)),
        }
    }

    /// `new -> email_issued`.
    pub fn issue_identity(&self, user_id: i64) -> Result<TransitionOutcome, OnboardingError> {
        self.locks
            .with_entity(user_id, || self.issue_identity_locked(user_id))
    }

    /// `email_issued -> provisioning_access`, triggering the pipeline once for
    /// every pending item the pipeline supports.
    pub fn provision_access(&self, user_id: i64) -> Result<TransitionOutcome, OnboardingError> {
        self.locks
            .with_entity(user_id, || self.provision_access_locked(user_id))
    }

    /// `provisioning_access -> completed` once nothing is pending.
    pub fn refresh_completion(&self, user_id: i64) -> Result<TransitionOutcome, OnboardingError> {
        self.locks
            .with_entity(user_id, || self.refresh_completion_locked(user_id))
    }

    /// Applies manual status updates, then re-evaluates completion.
    pub fn update_access_items(
        &self,
        user_id: i64,
        updates: &[AccessItemUpdate],
    ) -> Result<(Vec<String>, TransitionOutcome), OnboardingError> {
        self.locks.with_entity(user_id, || {
            let changed = self.store.apply_updates(user_id, updates)?;
            if !changed.is_empty() {
                self.log.info(
                    "onboarding.items_updated",
                    format!("user_id={user_id} items={}", changed.join(",")),
                );
            }
            let outcome = self.refresh_completion_locked(user_id)?;
            Ok((changed, outcome))
        })
    }

    fn issue_identity_locked(&self, user_id: i64) -> Result<TransitionOutcome, OnboardingError> {
        let user = self.store.require_user(user_id)?;
        if user.stage != OnboardingStage::New {
            return Ok(TransitionOutcome::AlreadyPast(user.stage));
        }

        let issued = IdentityRequest::from_display_name(&user.name)
            .and_then(|request| self.identity.issue(&request));
        let issued = match issued {
            Ok(issued) => issued,
            Err(err) => {
                let reason = err.to_string();
                self.log.error(
                    "onboarding.identity_failed",
                    format!("user_id={user_id} error={reason}"),
                );
                self.store
                    .append_activity(user_id, &format!("identity issuance failed: {reason}"))?;
                return Ok(TransitionOutcome::Blocked {
                    stage: user.stage,
                    reason,
                });
            }
        };

        if !self.store.record_identity_issued(user_id, &issued.email)? {
            let current = self.store.require_user(user_id)?.stage;
            return Ok(TransitionOutcome::AlreadyPast(current));
        }
        self.log.info(
            "onboarding.email_issued",
            format!("user_id={user_id} company_email={}", issued.email),
        );
        self.send(Notification::new(
            user_id,
            NotificationKind::IdentityIssued,
            &self.policy.identity_contact,
            format!("Company email issued for {}", user.name),
            format!(
                "{} ({}) was issued {} on team {}.",
                user.name, user.email, issued.email, user.team
            ),
        ));
        Ok(TransitionOutcome::Advanced(OnboardingStage::EmailIssued))
    }

    fn provision_access_locked(&self, user_id: i64) -> Result<TransitionOutcome, OnboardingError> {
        let user = self.store.require_user(user_id)?;
        match user.stage {
            OnboardingStage::New => return Ok(TransitionOutcome::NotReady(user.stage)),
            OnboardingStage::ProvisioningAccess | OnboardingStage::Completed => {
                return Ok(TransitionOutcome::AlreadyPast(user.stage))
            }
            OnboardingStage::EmailIssued => {}
        }

        let selected: Vec<String> = user
            .pending_items()
            .filter(|item| self.policy.allows(&item.service))
            .map(|item| item.service.clone())
            .collect();

        if selected.is_empty() {
            self.log.info(
                "onboarding.no_pipeline_services",
                format!("user_id={user_id} pending={}", user.pending_items().count()),
            );
        } else {
            let address = user.company_email.clone().unwrap_or_else(|| user.email.clone());
            let mut params = ProvideAccessParams::new(address, &selected);
            params.aws_iam_user_group = self.policy.aws_iam_user_group.clone();
            params.github_team = self.policy.github_team.clone();

            match self.provisioning.provide_access(&params) {
                Ok(ack) => {
                    self.log.info(
                        "onboarding.pipeline_triggered",
                        format!(
                            "user_id={user_id} services={} status={} queue_url={}",
                            params.services.join(","),
                            ack.status_code,
                            ack.queue_url.as_deref().unwrap_or("-")
                        ),
                    );
                }
                Err(err) => {
                    let reason = match err {
                        ProvisionError::Credentials(err) => {
                            OrchestratorError::CredentialUnavailable(err).to_string()
                        }
                        other => other.to_string(),
                    };
                    self.log.error(
                        "onboarding.provisioning_failed",
                        format!("user_id={user_id} error={reason}"),
                    );
                    self.store
                        .append_activity(user_id, &format!("access provisioning failed: {reason}"))?;
                    return Ok(TransitionOutcome::Blocked {
                        stage: user.stage,
                        reason,
                    });
                }
            }
            self.store.complete_access_items(user_id, &selected)?;
        }

        if !self.store.advance_stage(
            user_id,
            OnboardingStage::EmailIssued,
            OnboardingStage::ProvisioningAccess,
        )? {
            let current = self.store.require_user(user_id)?.stage;
            return Ok(TransitionOutcome::AlreadyPast(current));
        }
        if !selected.is_empty() {
            self.send(Notification::new(
                user_id,
                NotificationKind::AccessProvisioned,
                &self.policy.provisioning_contact,
                format!("Access provisioned for {}", user.name),
                format!(
                    "Pipeline access requested for {}: {}.",
                    user.company_email.as_deref().unwrap_or(&user.email),
                    selected.join(", ")
                ),
            ));
        }

        match self.refresh_completion_locked(user_id)? {
            TransitionOutcome::Advanced(stage) => Ok(TransitionOutcome::Advanced(stage)),
            _ => Ok(TransitionOutcome::Advanced(OnboardingStage::ProvisioningAccess)),
        }
    }

    fn refresh_completion_locked(&self, user_id: i64) -> Result<TransitionOutcome, OnboardingError> {
        let user = self.store.require_user(user_id)?;
        match user.stage {
            OnboardingStage::Completed => Ok(TransitionOutcome::AlreadyPast(user.stage)),
            OnboardingStage::ProvisioningAccess => {
                if self.store.complete_if_all_done(user_id)? {
                    self.log
                        .info("onboarding.completed", format!("user_id={user_id}"));
                    Ok(TransitionOutcome::Advanced(OnboardingStage::Completed))
                } else {
                    Ok(TransitionOutcome::NotReady(user.stage))
                }
            }
            other => Ok(TransitionOutcome::NotReady(other)),
        }
    }

    /// Notification failures are logged and never undo a transition.
    fn send(&self, notification: Notification) {
        match self.notifier.notify(&notification) {
            Ok(NotifyOutcome::Sent) => self.log.info(
                "onboarding.notified",
                format!(
                    "user_id={} kind={} recipient={}",
                    notification.entity_id,
                    notification.kind.as_str(),
                    notification.recipient
                ),
            ),
            Ok(NotifyOutcome::Duplicate) => self.log.info(
                "onboarding.notify_duplicate",
                format!(
                    "user_id={} kind={}",
                    notification.entity_id,
                    notification.kind.as_str()
                ),
            ),
            Err(err) => self.log.warn(
                "onboarding.notify_failed",
                format!("user_id={} error={err}", notification.entity_id),
            ),
        }
    }
}

impl std::fmt::Debug for OnboardingFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnboardingFlow")
            .field("store", &self.store)
            .field("provisioning", &self.provisioning)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
