//! Infrastructure layer: directory clients, session persistence and the
//! async services that drive the pure `scholaris-auth` state machine.

pub mod assignment;
pub mod config;
pub mod controller;
pub mod directory;
pub mod resolver;
pub mod session_store;
pub mod tracker;


pub use assignment::{AssignmentOutcome, EngineError, HolderRoles, RoleAssignmentEngine};
pub use config::ScholarisConfig;
pub use controller::SessionController;
pub use directory::{DirectoryError, IdentityDirectory, SpecialRoleDirectory};
pub use resolver::{Resolution, TenantResolver};
pub use session_store::{PersistedSession, SessionStore, SessionStoreError};
pub use tracker::SessionTracker;
