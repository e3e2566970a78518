//! Data models for Lendit

pub mod enums;
pub mod equipment;
pub mod loan;
pub mod report;
pub mod user;

// Re-export commonly used types
pub use enums::{EquipmentLabel, EquipmentStatus, LoanStatus, Role, UserStatus};
pub use equipment::Equipment;
pub use loan::{BorrowRecord, OverdueEntry, OverdueScope};
pub use report::ReportSummary;
pub use user::User;
