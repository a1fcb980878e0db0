pub mod agents;
pub mod app;
pub mod capability;
pub mod config;
pub mod credentials;
pub mod identity;
pub mod onboarding;
pub mod orchestration;
pub mod pipeline;
pub mod planning;
pub mod shared;
