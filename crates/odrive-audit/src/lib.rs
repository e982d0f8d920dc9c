//! ODrive Audit - Structured logging and audit trail
//!
//! Provides:
//! - Structured event logging
//! - Human-readable explanations
//! - Queryable audit history
//! - Integration with `odrive explain`

pub mod logger;
pub mod reason;

pub use logger::AuditLogger;
pub use reason::ReasonCode;
