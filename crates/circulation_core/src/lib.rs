//! Core logic for the library circulation engine.
//! This crate is the single source of truth for loan, stock and
//! notification invariants; every viewer process links against it.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod scheduler;
pub mod service;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    load_config, parse_config, CirculationConfig, ConfigError, ViewerPolicy, ViewerRole,
};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::book::{Book, BookId};
pub use model::loan::{Loan, LoanId, LoanStatus};
pub use model::notification::{Notification, NotificationId, NotificationKind};
pub use model::user::{User, UserId, UserRole};
pub use model::ValidationError;
pub use repo::circulation_repo::{
    CirculationRepository, RepoError, RepoResult, StoreRepository, StoreSnapshot,
};
pub use scheduler::{CancelHandle, ChangeSignal, PollingScheduler, SchedulerStats, Trigger};
pub use service::circulation::CirculationService;
pub use service::error::{CirculationError, CirculationResult, EntityRef};
pub use service::inventory::{Availability, BookUpdate, CatalogFilter, InventoryLedger, NewBook};
pub use service::notifications::{AlertSink, NotificationEngine, ViewerScope};
pub use service::session::ViewerSession;
pub use service::users::UserDirectory;
pub use store::{KvStore, SqliteKvStore, StoreError, StoreKey};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
