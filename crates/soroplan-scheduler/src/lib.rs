#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Session planning for soroplan.
//!
//! [`SessionPlanner`] turns mastery estimates into a budgeted draft plan
//! using one of three [`SlotPolicy`] implementations; [`SessionService`]
//! drives that plan through approval, start and result recording.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod planner;
pub mod policy;

pub use config::{PartShare, PlannerConfig};
pub use error::{Result, SessionError};
pub use lifecycle::{SessionContext, SessionService};
pub use memory::{InMemoryStore, StaticProgress, StoreSnapshot};
pub use planner::{PlanRequest, SessionPlanner};
pub use policy::{
    policy_for, weakness, AdaptiveBktPolicy, AdaptivePolicy, ClassicPolicy, SlotPolicy,
};
