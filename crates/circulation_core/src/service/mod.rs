//! Circulation use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into the loan, inventory, notification and
//!   user operations viewers call.
//! - Keep callers decoupled from storage details.

pub mod circulation;
pub mod deadline;
pub mod error;
pub mod inventory;
pub mod lookup;
pub mod notifications;
pub mod session;
pub mod users;
