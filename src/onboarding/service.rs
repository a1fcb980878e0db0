use super::domain::{NewUser, OnboardingStage, UserEntity};
use super::flow::{OnboardingError, OnboardingFlow, TransitionOutcome};
use super::scheduler::SchedulerHandle;
use crate::shared::logging::EventLog;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnboardingDelays {
    pub issuance: Duration,
    pub provisioning: Duration,
}

impl Default for OnboardingDelays {
    fn default() -> Self {
        Self {
            issuance: Duration::from_secs(5),
            provisioning: Duration::from_secs(5),
        }
    }
}

/// Entry point for onboarding requests.
#[derive(Debug, Clone)]
pub struct OnboardingService {
    flow: OnboardingFlow,
    delays: OnboardingDelays,
    log: EventLog,
}

impl OnboardingService {
    pub fn new(flow: OnboardingFlow, delays: OnboardingDelays) -> Self {
        Self {
            flow,
            delays,
            log: EventLog::disabled(),
        }
    }

    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn flow(&self) -> &OnboardingFlow {
        &self.flow
    }

    /// Creates the entity and returns immediately. Issuance runs after the
    /// first delay; provisioning is scheduled after the second delay only if
    /// issuance succeeded.
    pub fn onboard(
        &self,
        user: &NewUser,
        scheduler: &SchedulerHandle,
    ) -> Result<UserEntity, OnboardingError> {
        let entity = self.flow.create_user(user)?;
        let user_id = entity.id;
        let flow = self.flow.clone();
        let next = scheduler.clone();
        let provisioning_delay = self.delays.provisioning;
        let log = self.log.clone();

        let scheduled = scheduler.schedule(self.delays.issuance, move || {
            let issued = match flow.issue_identity(user_id) {
                Ok(outcome) => outcome,
                Err(err) => {
                    log.error(
                        "onboarding.issue_error",
                        format!("user_id={user_id} error={err}"),
                    );
                    return;
                }
            };
            if issued.stage() != OnboardingStage::EmailIssued {
                log.info(
                    "onboarding.provisioning_skipped",
                    format!("user_id={user_id} outcome={issued:?}"),
                );
                return;
            }
            let provision_log = log.clone();
            let queued = next.schedule(provisioning_delay, move || {
                if let Err(err) = flow.provision_access(user_id) {
                    provision_log.error(
                        "onboarding.provision_error",
                        format!("user_id={user_id} error={err}"),
                    );
                }
            });
            if let Err(err) = queued {
                log.error(
                    "onboarding.schedule_failed",
                    format!("user_id={user_id} stage=provisioning error={err}"),
                );
            }
        });
        if let Err(err) = scheduled {
            self.log.error(
                "onboarding.schedule_failed",
                format!("user_id={user_id} stage=issuance error={err}"),
            );
        }
        Ok(entity)
    }

    /// Same transitions as [`Self::onboard`], run inline on the calling
    /// thread. Returns the entity as it stands afterwards.
    pub fn run_to_completion(&self, user: &NewUser) -> Result<UserEntity, OnboardingError> {
        let entity = self.flow.create_user(user)?;
        thread::sleep(self.delays.issuance);
        let issued = self.flow.issue_identity(entity.id)?;
        if let TransitionOutcome::Blocked { .. } | TransitionOutcome::NotReady(_) = issued {
            return Ok(self.flow.store().require_user(entity.id)?);
        }
        thread::sleep(self.delays.provisioning);
        self.flow.provision_access(entity.id)?;
        Ok(self.flow.store().require_user(entity.id)?)
    }
}
