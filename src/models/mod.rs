//! Data models for Bookshare

pub mod book;
pub mod borrow_request;
pub mod notification;
pub mod profile;
pub mod session;

// Re-export commonly used types
pub use book::{Book, BookStatus, BookWithOwner};
pub use borrow_request::{BorrowAction, BorrowRequest, BorrowRequestView, BorrowStatus, Role};
pub use notification::BorrowNotification;
pub use profile::Profile;
pub use session::{Actor, SessionClaims};
