//! Long-running onboarding: user entities advance
//! `new -> email_issued -> provisioning_access -> completed` through timed,
//! idempotent transitions.

pub mod domain;
pub mod flow;
pub mod locks;
pub mod notify;
pub mod scheduler;
pub mod service;
pub mod store;

pub use domain::{
    AccessItem, AccessItemStatus, AccessItemUpdate, ActivityEntry, NewUser, OnboardingStage,
    PocRoutingRule, UserEntity, UserStatus,
};
pub use flow::{OnboardingError, OnboardingFlow, OnboardingPolicy, TransitionOutcome};
pub use locks::EntityLocks;
pub use notify::{
    Notification, NotificationKind, Notifier, NotifyError, NotifyOutcome, OutboxNotifier,
};
pub use scheduler::{DelayedTaskQueue, SchedulerError, SchedulerHandle};
pub use service::{OnboardingDelays, OnboardingService};
pub use store::{StoreError, UserStore};
