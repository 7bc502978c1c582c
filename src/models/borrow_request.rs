//! Borrow request model and the request/book status state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

use super::book::{Book, BookStatus};
use super::profile::Profile;

/// Borrow request status.
///
/// `pending -> approved -> returned` or `pending -> rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Pending,
    Approved,
    Rejected,
    Returned,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Pending => "pending",
            BorrowStatus::Approved => "approved",
            BorrowStatus::Rejected => "rejected",
            BorrowStatus::Returned => "returned",
        }
    }

    /// Pending and approved requests still hold a claim on the book
    pub fn is_active(&self) -> bool {
        matches!(self, BorrowStatus::Pending | BorrowStatus::Approved)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BorrowStatus::Rejected | BorrowStatus::Returned)
    }
}

impl std::fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BorrowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BorrowStatus::Pending),
            "approved" => Ok(BorrowStatus::Approved),
            "rejected" => Ok(BorrowStatus::Rejected),
            "returned" => Ok(BorrowStatus::Returned),
            _ => Err(format!("Invalid borrow request status: {}", s)),
        }
    }
}

impl sqlx::Type<Postgres> for BorrowStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for BorrowStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for BorrowStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Side of a borrow request a user stands on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Borrower,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Borrower => write!(f, "borrower"),
        }
    }
}

/// Transition applied to an existing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowAction {
    Approve,
    Reject,
    Return,
}

impl BorrowAction {
    /// Role allowed to perform the action
    pub fn actor_role(self) -> Role {
        match self {
            BorrowAction::Approve | BorrowAction::Reject => Role::Owner,
            BorrowAction::Return => Role::Borrower,
        }
    }

    /// Status the request must be in
    pub fn from_status(self) -> BorrowStatus {
        match self {
            BorrowAction::Approve | BorrowAction::Reject => BorrowStatus::Pending,
            BorrowAction::Return => BorrowStatus::Approved,
        }
    }

    pub fn to_status(self) -> BorrowStatus {
        match self {
            BorrowAction::Approve => BorrowStatus::Approved,
            BorrowAction::Reject => BorrowStatus::Rejected,
            BorrowAction::Return => BorrowStatus::Returned,
        }
    }

    /// Book status written after the request status, if any
    pub fn book_status(self) -> Option<BookStatus> {
        match self {
            BorrowAction::Approve => Some(BookStatus::Borrowed),
            BorrowAction::Reject => None,
            BorrowAction::Return => Some(BookStatus::Available),
        }
    }
}

impl std::fmt::Display for BorrowAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BorrowAction::Approve => write!(f, "approve"),
            BorrowAction::Reject => write!(f, "reject"),
            BorrowAction::Return => write!(f, "return"),
        }
    }
}

/// Borrow request ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowRequest {
    pub id: Uuid,
    pub book_id: Uuid,
    pub owner_id: Uuid,
    pub borrower_id: Uuid,
    pub status: BorrowStatus,
    pub created_at: DateTime<Utc>,
}

impl BorrowRequest {
    pub fn role_of(&self, user_id: Uuid) -> Option<Role> {
        if user_id == self.owner_id {
            Some(Role::Owner)
        } else if user_id == self.borrower_id {
            Some(Role::Borrower)
        } else {
            None
        }
    }

    /// The other party, seen from `role`
    pub fn counterparty(&self, role: Role) -> Uuid {
        match role {
            Role::Owner => self.borrower_id,
            Role::Borrower => self.owner_id,
        }
    }

    /// Check that `actor` may apply `action` now and return the resulting status
    pub fn transition(&self, actor: Uuid, action: BorrowAction) -> AppResult<BorrowStatus> {
        let required = action.actor_role();
        if self.role_of(actor) != Some(required) {
            return Err(AppError::InvalidState(format!(
                "Only the {} may {} borrow request {}",
                required, action, self.id
            )));
        }

        if self.status != action.from_status() {
            return Err(AppError::InvalidState(format!(
                "Cannot {} a {} borrow request",
                action, self.status
            )));
        }

        Ok(action.to_status())
    }
}

/// Insert payload for the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct NewBorrowRequest {
    pub book_id: Uuid,
    pub owner_id: Uuid,
    pub borrower_id: Uuid,
}

impl NewBorrowRequest {
    /// Build a request for `book` on behalf of `borrower_id`.
    /// The owner is copied from the book.
    pub fn for_book(book: &Book, borrower_id: Uuid) -> AppResult<Self> {
        if book.owner_id == borrower_id {
            return Err(AppError::InvalidState(
                "You cannot borrow your own book".to_string(),
            ));
        }
        if book.status != BookStatus::Available {
            return Err(AppError::InvalidState(format!(
                "Book {} is not available",
                book.id
            )));
        }

        Ok(Self {
            book_id: book.id,
            owner_id: book.owner_id,
            borrower_id,
        })
    }
}

/// Equality / inclusion filter over the ledger
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerFilter {
    pub owner_id: Option<Uuid>,
    pub borrower_id: Option<Uuid>,
    pub book_id: Option<Uuid>,
    pub book_ids: Option<Vec<Uuid>>,
    pub statuses: Option<Vec<BorrowStatus>>,
}

impl LedgerFilter {
    pub fn for_role(user_id: Uuid, role: Role) -> Self {
        match role {
            Role::Owner => Self {
                owner_id: Some(user_id),
                ..Default::default()
            },
            Role::Borrower => Self {
                borrower_id: Some(user_id),
                ..Default::default()
            },
        }
    }

    pub fn matches(&self, request: &BorrowRequest) -> bool {
        self.owner_id.map_or(true, |id| request.owner_id == id)
            && self.borrower_id.map_or(true, |id| request.borrower_id == id)
            && self.book_id.map_or(true, |id| request.book_id == id)
            && self
                .book_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&request.book_id))
            && self
                .statuses
                .as_ref()
                .map_or(true, |statuses| statuses.contains(&request.status))
    }
}

/// Create borrow request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBorrowRequest {
    pub book_id: Uuid,
}

/// Query parameters for listing a user's borrow requests
#[derive(Debug, Deserialize, ToSchema)]
pub struct BorrowRequestQuery {
    /// `owner` for incoming requests, `borrower` for outgoing ones
    pub role: Role,
    pub status: Option<BorrowStatus>,
}

/// Borrow request joined with its book and the counterparty's profile
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowRequestView {
    #[serde(flatten)]
    pub request: BorrowRequest,
    /// Role of the viewing user
    pub role: Role,
    pub book: Option<Book>,
    pub counterparty: Option<Profile>,
}

/// Way a book's status disagrees with the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    BorrowedWithoutApprovedRequest,
    ApprovedRequestOnAvailableBook,
    MultipleApprovedRequests,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StatusMismatch {
    pub book_id: Uuid,
    pub title: String,
    pub book_status: BookStatus,
    pub approved_requests: Vec<Uuid>,
    pub kind: MismatchKind,
}

impl StatusMismatch {
    /// Compare a book against the ids of its approved requests
    pub fn detect(book: &Book, approved_requests: Vec<Uuid>) -> Option<Self> {
        let kind = match (book.status, approved_requests.len()) {
            (BookStatus::Borrowed, 0) => MismatchKind::BorrowedWithoutApprovedRequest,
            (BookStatus::Available, n) if n > 0 => MismatchKind::ApprovedRequestOnAvailableBook,
            (_, n) if n > 1 => MismatchKind::MultipleApprovedRequests,
            _ => return None,
        };

        Some(Self {
            book_id: book.id,
            title: book.title.clone(),
            book_status: book.status,
            approved_requests,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(status: BorrowStatus) -> BorrowRequest {
        BorrowRequest {
            id: Uuid::new_v4(),
            book_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            borrower_id: Uuid::new_v4(),
            status,
            created_at: Utc::now(),
        }
    }

    fn book(status: BookStatus) -> Book {
        Book {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "The Hobbit".to_string(),
            author: None,
            genre: None,
            synopsis: None,
            cover_url: None,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_owner_transitions() {
        let r = request(BorrowStatus::Pending);
        assert_eq!(
            r.transition(r.owner_id, BorrowAction::Approve).unwrap(),
            BorrowStatus::Approved
        );
        assert_eq!(
            r.transition(r.owner_id, BorrowAction::Reject).unwrap(),
            BorrowStatus::Rejected
        );
    }

    #[test]
    fn test_borrower_cannot_approve() {
        let r = request(BorrowStatus::Pending);
        let err = r.transition(r.borrower_id, BorrowAction::Approve).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let err = r.transition(Uuid::new_v4(), BorrowAction::Reject).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn test_return_only_from_approved() {
        let approved = request(BorrowStatus::Approved);
        assert_eq!(
            approved
                .transition(approved.borrower_id, BorrowAction::Return)
                .unwrap(),
            BorrowStatus::Returned
        );
        assert!(approved
            .transition(approved.owner_id, BorrowAction::Return)
            .is_err());

        for status in [BorrowStatus::Pending, BorrowStatus::Rejected, BorrowStatus::Returned] {
            let r = request(status);
            let err = r.transition(r.borrower_id, BorrowAction::Return).unwrap_err();
            assert!(matches!(err, AppError::InvalidState(_)), "{status}");
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for status in [BorrowStatus::Rejected, BorrowStatus::Returned] {
            assert!(status.is_terminal());
            let r = request(status);
            for action in [BorrowAction::Approve, BorrowAction::Reject] {
                assert!(r.transition(r.owner_id, action).is_err());
            }
        }
    }

    #[test]
    fn test_book_status_follows_action() {
        assert_eq!(BorrowAction::Approve.book_status(), Some(BookStatus::Borrowed));
        assert_eq!(BorrowAction::Return.book_status(), Some(BookStatus::Available));
        assert_eq!(BorrowAction::Reject.book_status(), None);
    }

    #[test]
    fn test_new_request_checks_book() {
        let available = book(BookStatus::Available);
        let borrower = Uuid::new_v4();
        let new = NewBorrowRequest::for_book(&available, borrower).unwrap();
        assert_eq!(new.owner_id, available.owner_id);
        assert_eq!(new.borrower_id, borrower);

        let err = NewBorrowRequest::for_book(&available, available.owner_id).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let borrowed = book(BookStatus::Borrowed);
        let err = NewBorrowRequest::for_book(&borrowed, borrower).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn test_ledger_filter() {
        let r = request(BorrowStatus::Approved);
        assert!(LedgerFilter::for_role(r.owner_id, Role::Owner).matches(&r));
        assert!(!LedgerFilter::for_role(r.owner_id, Role::Borrower).matches(&r));

        let active = LedgerFilter {
            statuses: Some(vec![BorrowStatus::Pending, BorrowStatus::Approved]),
            ..Default::default()
        };
        assert!(active.matches(&r));
        assert!(!active.matches(&request(BorrowStatus::Returned)));
    }

    #[test]
    fn test_detect_mismatch() {
        assert_eq!(StatusMismatch::detect(&book(BookStatus::Available), vec![]), None);
        assert_eq!(
            StatusMismatch::detect(&book(BookStatus::Borrowed), vec![Uuid::new_v4()]),
            None
        );

        let m = StatusMismatch::detect(&book(BookStatus::Borrowed), vec![]).unwrap();
        assert_eq!(m.kind, MismatchKind::BorrowedWithoutApprovedRequest);

        let m = StatusMismatch::detect(&book(BookStatus::Available), vec![Uuid::new_v4()]).unwrap();
        assert_eq!(m.kind, MismatchKind::ApprovedRequestOnAvailableBook);

        let m = StatusMismatch::detect(
            &book(BookStatus::Borrowed),
            vec![Uuid::new_v4(), Uuid::new_v4()],
        )
        .unwrap();
        assert_eq!(m.kind, MismatchKind::MultipleApprovedRequests);
    }
}
