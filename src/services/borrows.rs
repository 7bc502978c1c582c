//! Borrow workflow: requests, approvals, returns and their side effects.
//!
//! Each operation is a sequence of independent store calls. Approve and Return
//! write the request status first and the book status second, without a
//! transaction spanning both; a failed second write leaves the pair
//! inconsistent until [`BorrowService::audit_consistency`] reports it.
//!
//! The request write only succeeds if the status is still the one read at the
//! start of the operation, so at most one action wins on a given request.
//! The "already lent" check on Approve reads the book without locking it and
//! only guards approvals that run one after another.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookFilter, BookStatus},
        borrow_request::{
            BorrowAction, BorrowRequest, BorrowRequestView, BorrowStatus, LedgerFilter,
            NewBorrowRequest, Role, StatusMismatch,
        },
        notification::BorrowNotification,
        session::Actor,
    },
    repository::Repository,
};

use super::notifications::NotificationQueue;

#[derive(Clone)]
pub struct BorrowService {
    repository: Repository,
    notifications: NotificationQueue,
}

impl BorrowService {
    pub fn new(repository: Repository, notifications: NotificationQueue) -> Self {
        Self {
            repository,
            notifications,
        }
    }

    /// Ask to borrow `book_id`. The owner is notified in the background.
    pub async fn create_request(&self, actor: &Actor, book_id: Uuid) -> AppResult<BorrowRequest> {
        let book = self.repository.books.get_by_id(book_id).await?;
        let new_request = NewBorrowRequest::for_book(&book, actor.id)?;

        let previous = self
            .repository
            .borrow_requests
            .list(LedgerFilter {
                book_id: Some(book.id),
                borrower_id: Some(actor.id),
                ..Default::default()
            })
            .await?;
        if previous.iter().any(|r| r.status.is_active()) {
            return Err(AppError::InvalidState(format!(
                "You already have an open request for book {}",
                book.id
            )));
        }

        let request = self.repository.borrow_requests.insert(&new_request).await?;
        tracing::info!(
            request_id = %request.id,
            book_id = %book.id,
            borrower_id = %actor.id,
            "Borrow request created"
        );

        match self.prepare_notification(actor, &book).await {
            Ok(notification) => {
                self.notifications.enqueue(notification, actor.token.clone());
            }
            Err(e) => tracing::warn!(
                request_id = %request.id,
                "Could not prepare borrow request notification: {}",
                e
            ),
        }

        Ok(request)
    }

    pub async fn approve(&self, actor: &Actor, request_id: Uuid) -> AppResult<BorrowRequest> {
        self.apply(actor, request_id, BorrowAction::Approve).await
    }

    pub async fn reject(&self, actor: &Actor, request_id: Uuid) -> AppResult<BorrowRequest> {
        self.apply(actor, request_id, BorrowAction::Reject).await
    }

    pub async fn return_book(&self, actor: &Actor, request_id: Uuid) -> AppResult<BorrowRequest> {
        self.apply(actor, request_id, BorrowAction::Return).await
    }

    async fn apply(
        &self,
        actor: &Actor,
        request_id: Uuid,
        action: BorrowAction,
    ) -> AppResult<BorrowRequest> {
        let request = self.repository.borrow_requests.get_by_id(request_id).await?;
        let next = request.transition(actor.id, action)?;

        if action == BorrowAction::Approve {
            let book = self.repository.books.get_by_id(request.book_id).await?;
            if book.status == BookStatus::Borrowed {
                return Err(AppError::InvalidState(format!(
                    "Book {} is already lent out",
                    book.id
                )));
            }
        }

        let updated = self
            .repository
            .borrow_requests
            .set_status(request.id, request.status, next)
            .await?;

        if let Some(book_status) = action.book_status() {
            if let Err(e) = self
                .repository
                .books
                .set_status(request.book_id, book_status)
                .await
            {
                tracing::error!(
                    request_id = %request.id,
                    book_id = %request.book_id,
                    request_status = %next,
                    book_status = %book_status,
                    "Borrow request updated but book status was not: {}",
                    e
                );
                return Err(AppError::RemoteFailure(format!(
                    "Request {} is {} but book {} could not be marked {}",
                    request.id, next, request.book_id, book_status
                )));
            }
        }

        tracing::info!(
            request_id = %request.id,
            book_id = %request.book_id,
            actor_id = %actor.id,
            "Borrow request {}",
            next
        );

        Ok(updated)
    }

    /// Requests where `user_id` plays `role`, newest first, joined with their
    /// book and the other party's profile
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        role: Role,
        status: Option<BorrowStatus>,
    ) -> AppResult<Vec<BorrowRequestView>> {
        let filter = LedgerFilter {
            statuses: status.map(|s| vec![s]),
            ..LedgerFilter::for_role(user_id, role)
        };
        let requests = self.repository.borrow_requests.list(filter).await?;
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let books: HashMap<Uuid, Book> = self
            .repository
            .books
            .list(BookFilter {
                ids: Some(distinct(requests.iter().map(|r| r.book_id))),
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        let profiles: HashMap<Uuid, _> = self
            .repository
            .profiles
            .get_many(distinct(requests.iter().map(|r| r.counterparty(role))))
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        Ok(requests
            .into_iter()
            .map(|request| BorrowRequestView {
                book: books.get(&request.book_id).cloned(),
                counterparty: profiles.get(&request.counterparty(role)).cloned(),
                role,
                request,
            })
            .collect())
    }

    /// Books of `owner_id` whose status disagrees with the ledger
    pub async fn audit_consistency(&self, owner_id: Uuid) -> AppResult<Vec<StatusMismatch>> {
        let books = self
            .repository
            .books
            .list(BookFilter {
                owner_id: Some(owner_id),
                ..Default::default()
            })
            .await?;
        if books.is_empty() {
            return Ok(Vec::new());
        }

        let approved = self
            .repository
            .borrow_requests
            .list(LedgerFilter {
                book_ids: Some(books.iter().map(|b| b.id).collect()),
                statuses: Some(vec![BorrowStatus::Approved]),
                ..Default::default()
            })
            .await?;

        let mut by_book: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for request in approved {
            by_book.entry(request.book_id).or_default().push(request.id);
        }

        let mismatches: Vec<StatusMismatch> = books
            .iter()
            .filter_map(|book| {
                StatusMismatch::detect(book, by_book.remove(&book.id).unwrap_or_default())
            })
            .collect();

        if !mismatches.is_empty() {
            tracing::warn!(
                owner_id = %owner_id,
                count = mismatches.len(),
                "Book status disagrees with borrow ledger"
            );
        }

        Ok(mismatches)
    }

    async fn prepare_notification(&self, actor: &Actor, book: &Book) -> AppResult<BorrowNotification> {
        let owner = self.repository.profiles.get(book.owner_id).await?;
        let requester = self.repository.profiles.get(actor.id).await?;

        let requester_name = requester
            .as_ref()
            .and_then(|p| p.display_name())
            .or_else(|| actor.email_handle())
            .ok_or_else(|| {
                AppError::Validation("Requester has neither a profile name nor an email".to_string())
            })?
            .to_string();

        Ok(BorrowNotification {
            owner_id: book.owner_id,
            owner_name: owner.and_then(|p| p.name).unwrap_or_default(),
            book_title: book.title.clone(),
            requester_name,
            requester_class: requester.and_then(|p| p.class).unwrap_or_default(),
        })
    }
}

fn distinct(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = ids.collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            book::{CreateBook, UpdateBook},
            borrow_request::MismatchKind,
            profile::Profile,
        },
        repository::{memory::MemoryStore, BookStore, MockBookStore, MockBorrowLedger},
        services::{
            books::BooksService,
            notifications::{MockNotifier, RetryPolicy},
        },
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Book store that can be told to fail status writes
    struct FlakyBooks {
        inner: Arc<MemoryStore>,
        fail_status_writes: AtomicBool,
    }

    #[async_trait]
    impl BookStore for FlakyBooks {
        async fn get_by_id(&self, id: Uuid) -> AppResult<Book> {
            BookStore::get_by_id(self.inner.as_ref(), id).await
        }

        async fn list(&self, filter: BookFilter) -> AppResult<Vec<Book>> {
            BookStore::list(self.inner.as_ref(), filter).await
        }

        async fn create(&self, owner_id: Uuid, book: &CreateBook) -> AppResult<Book> {
            self.inner.create(owner_id, book).await
        }

        async fn update(&self, id: Uuid, update: &UpdateBook) -> AppResult<Book> {
            self.inner.update(id, update).await
        }

        async fn set_status(&self, id: Uuid, status: BookStatus) -> AppResult<()> {
            if self.fail_status_writes.load(Ordering::SeqCst) {
                return Err(AppError::RemoteFailure("connection reset".to_string()));
            }
            BookStore::set_status(self.inner.as_ref(), id, status).await
        }

        async fn delete(&self, id: Uuid) -> AppResult<()> {
            BookStore::delete(self.inner.as_ref(), id).await
        }

        async fn ping(&self) -> AppResult<()> {
            Ok(())
        }
    }

    struct Fixture {
        service: BorrowService,
        repository: Repository,
        notifications: mpsc::UnboundedReceiver<(BorrowNotification, String)>,
    }

    fn fixture_with(repository: Repository) -> Fixture {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().returning(move |n, bearer| {
            let _ = tx.send((n.clone(), bearer.to_string()));
            Ok(())
        });
        let queue = NotificationQueue::start(
            Arc::new(notifier),
            16,
            RetryPolicy {
                max_attempts: 1,
                backoff: Duration::from_millis(1),
            },
        );

        Fixture {
            service: BorrowService::new(repository.clone(), queue),
            repository,
            notifications: rx,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Repository::in_memory())
    }

    async fn user(repository: &Repository, name: &str, class: Option<&str>) -> Actor {
        let id = Uuid::new_v4();
        repository
            .profiles
            .upsert(&Profile {
                id,
                name: Some(name.to_string()),
                class: class.map(str::to_string),
            })
            .await
            .unwrap();
        Actor::new(id, Some(format!("{}@example.com", name.to_lowercase())), format!("token-{}", name))
    }

    async fn book(repository: &Repository, owner: &Actor, title: &str) -> Book {
        repository
            .books
            .create(
                owner.id,
                &CreateBook {
                    title: title.to_string(),
                    author: None,
                    genre: None,
                    synopsis: None,
                    cover_url: None,
                },
            )
            .await
            .unwrap()
    }

    async fn book_status(repository: &Repository, id: Uuid) -> BookStatus {
        repository.books.get_by_id(id).await.unwrap().status
    }

    async fn next_notification(
        rx: &mut mpsc::UnboundedReceiver<(BorrowNotification, String)>,
    ) -> (BorrowNotification, String) {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_approve_return_scenario() {
        let mut f = fixture();
        let u1 = user(&f.repository, "U1", None).await;
        let u2 = user(&f.repository, "U2", Some("4A")).await;
        let b1 = book(&f.repository, &u1, "B1 title").await;

        let r1 = f.service.create_request(&u2, b1.id).await.unwrap();
        assert_eq!(r1.status, BorrowStatus::Pending);
        assert_eq!(r1.owner_id, u1.id);
        assert_eq!(r1.borrower_id, u2.id);

        let (notification, bearer) = next_notification(&mut f.notifications).await;
        assert_eq!(notification.owner_id, u1.id);
        assert_eq!(notification.owner_name, "U1");
        assert_eq!(notification.book_title, "B1 title");
        assert_eq!(notification.requester_name, "U2");
        assert_eq!(notification.requester_class, "4A");
        assert_eq!(bearer, "token-U2");

        let approved = f.service.approve(&u1, r1.id).await.unwrap();
        assert_eq!(approved.status, BorrowStatus::Approved);
        assert_eq!(book_status(&f.repository, b1.id).await, BookStatus::Borrowed);

        let returned = f.service.return_book(&u2, r1.id).await.unwrap();
        assert_eq!(returned.status, BorrowStatus::Returned);
        assert_eq!(book_status(&f.repository, b1.id).await, BookStatus::Available);

        assert!(f.service.audit_consistency(u1.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requester_name_falls_back_to_email_handle() {
        let mut f = fixture();
        let owner = user(&f.repository, "Owner", None).await;
        let b = book(&f.repository, &owner, "Momo").await;
        let anonymous = Actor::new(Uuid::new_v4(), Some("kim.lee@school.org".to_string()), "t");

        f.service.create_request(&anonymous, b.id).await.unwrap();

        let (notification, _) = next_notification(&mut f.notifications).await;
        assert_eq!(notification.requester_name, "kim.lee");
        assert_eq!(notification.requester_class, "");
    }

    #[tokio::test]
    async fn test_request_on_borrowed_book_fails() {
        let f = fixture();
        let owner = user(&f.repository, "Owner", None).await;
        let b = book(&f.repository, &owner, "Pippi").await;
        f.repository
            .books
            .set_status(b.id, BookStatus::Borrowed)
            .await
            .unwrap();

        let borrower = user(&f.repository, "Borrower", None).await;
        let err = f.service.create_request(&borrower, b.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_cannot_request_own_or_missing_book_or_twice() {
        let f = fixture();
        let owner = user(&f.repository, "Owner", None).await;
        let b = book(&f.repository, &owner, "Pippi").await;

        let err = f.service.create_request(&owner, b.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let err = f
            .service
            .create_request(&owner, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let borrower = user(&f.repository, "Borrower", None).await;
        f.service.create_request(&borrower, b.id).await.unwrap();
        let err = f.service.create_request(&borrower, b.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_only_owner_may_approve() {
        let f = fixture();
        let owner = user(&f.repository, "Owner", None).await;
        let borrower = user(&f.repository, "Borrower", None).await;
        let stranger = user(&f.repository, "Stranger", None).await;
        let b = book(&f.repository, &owner, "Krabat").await;
        let r = f.service.create_request(&borrower, b.id).await.unwrap();

        for actor in [&borrower, &stranger] {
            let err = f.service.approve(actor, r.id).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidState(_)));
        }
        assert_eq!(book_status(&f.repository, b.id).await, BookStatus::Available);

        let err = f.service.approve(&owner, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_return_requires_approved_request() {
        let f = fixture();
        let owner = user(&f.repository, "Owner", None).await;
        let borrower = user(&f.repository, "Borrower", None).await;
        let b = book(&f.repository, &owner, "Momo").await;

        let pending = f.service.create_request(&borrower, b.id).await.unwrap();
        let err = f.service.return_book(&borrower, pending.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        f.service.reject(&owner, pending.id).await.unwrap();
        let err = f.service.return_book(&borrower, pending.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(book_status(&f.repository, b.id).await, BookStatus::Available);
    }

    #[tokio::test]
    async fn test_reject_twice_fails() {
        let f = fixture();
        let owner = user(&f.repository, "Owner", None).await;
        let borrower = user(&f.repository, "Borrower", None).await;
        let b = book(&f.repository, &owner, "Momo").await;
        let r = f.service.create_request(&borrower, b.id).await.unwrap();

        let rejected = f.service.reject(&owner, r.id).await.unwrap();
        assert_eq!(rejected.status, BorrowStatus::Rejected);
        assert_eq!(book_status(&f.repository, b.id).await, BookStatus::Available);

        let err = f.service.reject(&owner, r.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_racing_approve_and_reject_only_one_wins() {
        let f = fixture();
        let owner = user(&f.repository, "Owner", None).await;
        let borrower = user(&f.repository, "Borrower", None).await;
        let b = book(&f.repository, &owner, "Emil").await;
        let r = f.service.create_request(&borrower, b.id).await.unwrap();

        let (approved, rejected) = tokio::join!(
            f.service.approve(&owner, r.id),
            f.service.reject(&owner, r.id)
        );
        let final_status = f.repository.borrow_requests.get_by_id(r.id).await.unwrap().status;
        match (approved, rejected) {
            (Ok(a), Err(AppError::InvalidState(_))) => {
                assert_eq!(a.status, BorrowStatus::Approved);
                assert_eq!(final_status, BorrowStatus::Approved);
                assert_eq!(book_status(&f.repository, b.id).await, BookStatus::Borrowed);
            }
            (Err(AppError::InvalidState(_)), Ok(rj)) => {
                assert_eq!(rj.status, BorrowStatus::Rejected);
                assert_eq!(final_status, BorrowStatus::Rejected);
                assert_eq!(book_status(&f.repository, b.id).await, BookStatus::Available);
            }
            other => panic!("exactly one action should win, got {:?}", other),
        }
    }

    /// No uniqueness guard across borrowers: both requests are accepted.
    /// Approving the second one after the first is refused.
    #[tokio::test]
    async fn test_concurrent_requests_from_different_borrowers_both_succeed() {
        let f = fixture();
        let owner = user(&f.repository, "U1", None).await;
        let u2 = user(&f.repository, "U2", None).await;
        let u3 = user(&f.repository, "U3", None).await;
        let b1 = book(&f.repository, &owner, "B1").await;

        let (r2, r3) = tokio::join!(
            f.service.create_request(&u2, b1.id),
            f.service.create_request(&u3, b1.id)
        );
        let (r2, r3) = (r2.unwrap(), r3.unwrap());
        assert_eq!(r2.status, BorrowStatus::Pending);
        assert_eq!(r3.status, BorrowStatus::Pending);

        let incoming = f
            .service
            .list_for_user(owner.id, Role::Owner, Some(BorrowStatus::Pending))
            .await
            .unwrap();
        assert_eq!(incoming.len(), 2);

        f.service.approve(&owner, r2.id).await.unwrap();
        let err = f.service.approve(&owner, r3.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(
            f.repository.borrow_requests.get_by_id(r3.id).await.unwrap().status,
            BorrowStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_list_for_user_joins_book_and_counterparty() {
        let f = fixture();
        let owner = user(&f.repository, "Ada", Some("Staff")).await;
        let borrower = user(&f.repository, "Sam", Some("4A")).await;
        let first = book(&f.repository, &owner, "First").await;
        let second = book(&f.repository, &owner, "Second").await;

        let r1 = f.service.create_request(&borrower, first.id).await.unwrap();
        let r2 = f.service.create_request(&borrower, second.id).await.unwrap();
        f.service.approve(&owner, r1.id).await.unwrap();

        let incoming = f
            .service
            .list_for_user(owner.id, Role::Owner, None)
            .await
            .unwrap();
        assert_eq!(incoming.len(), 2);
        assert_eq!(incoming[0].request.id, r2.id);
        assert_eq!(incoming[0].role, Role::Owner);
        assert_eq!(incoming[0].book.as_ref().map(|b| b.title.as_str()), Some("Second"));
        assert_eq!(
            incoming[0].counterparty.as_ref().and_then(|p| p.class.as_deref()),
            Some("4A")
        );

        let borrowing = f
            .service
            .list_for_user(borrower.id, Role::Borrower, Some(BorrowStatus::Approved))
            .await
            .unwrap();
        assert_eq!(borrowing.len(), 1);
        assert_eq!(borrowing[0].request.id, r1.id);
        assert_eq!(
            borrowing[0].counterparty.as_ref().and_then(|p| p.name.as_deref()),
            Some("Ada")
        );

        let none = f
            .service
            .list_for_user(owner.id, Role::Borrower, None)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    fn flaky_repository() -> (Repository, Arc<FlakyBooks>) {
        let store = Arc::new(MemoryStore::new());
        let books = Arc::new(FlakyBooks {
            inner: store.clone(),
            fail_status_writes: AtomicBool::new(false),
        });
        let repository = Repository {
            books: books.clone(),
            borrow_requests: store.clone(),
            profiles: store,
        };
        (repository, books)
    }

    #[tokio::test]
    async fn test_partial_return_leaves_book_borrowed_and_is_audited() {
        let (repository, books) = flaky_repository();
        let f = fixture_with(repository);
        let owner = user(&f.repository, "Owner", None).await;
        let borrower = user(&f.repository, "Borrower", None).await;
        let b = book(&f.repository, &owner, "Momo").await;
        let r = f.service.create_request(&borrower, b.id).await.unwrap();
        f.service.approve(&owner, r.id).await.unwrap();

        books.fail_status_writes.store(true, Ordering::SeqCst);
        let err = f.service.return_book(&borrower, r.id).await.unwrap_err();
        assert!(matches!(err, AppError::RemoteFailure(_)));

        // Book is borrowed but no approved request exists
        assert_eq!(
            f.repository.borrow_requests.get_by_id(r.id).await.unwrap().status,
            BorrowStatus::Returned
        );
        assert_eq!(book_status(&f.repository, b.id).await, BookStatus::Borrowed);

        let mismatches = f.service.audit_consistency(owner.id).await.unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].book_id, b.id);
        assert_eq!(mismatches[0].kind, MismatchKind::BorrowedWithoutApprovedRequest);

        // The book stays unavailable to others
        let other = user(&f.repository, "Other", None).await;
        let err = f.service.create_request(&other, b.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_partial_approve_is_audited() {
        let (repository, books) = flaky_repository();
        let f = fixture_with(repository);
        let owner = user(&f.repository, "Owner", None).await;
        let borrower = user(&f.repository, "Borrower", None).await;
        let b = book(&f.repository, &owner, "Momo").await;
        let r = f.service.create_request(&borrower, b.id).await.unwrap();

        books.fail_status_writes.store(true, Ordering::SeqCst);
        let err = f.service.approve(&owner, r.id).await.unwrap_err();
        assert!(matches!(err, AppError::RemoteFailure(_)));

        let mismatches = f.service.audit_consistency(owner.id).await.unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].kind, MismatchKind::ApprovedRequestOnAvailableBook);
        assert_eq!(mismatches[0].approved_requests, vec![r.id]);
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_request() {
        let repository = Repository::in_memory();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .returning(|_, _| Err(crate::services::notifications::DeliveryError::RecipientNotFound));
        let queue = NotificationQueue::start(
            Arc::new(notifier),
            4,
            RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(1),
            },
        );
        let service = BorrowService::new(repository.clone(), queue);

        let owner = user(&repository, "Owner", None).await;
        let borrower = user(&repository, "Borrower", None).await;
        let b = book(&repository, &owner, "Momo").await;

        let r = service.create_request(&borrower, b.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            repository.borrow_requests.get_by_id(r.id).await.unwrap().status,
            BorrowStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_store_error_surfaces_without_insert() {
        let owner_id = Uuid::new_v4();
        let mut books = MockBookStore::new();
        books
            .expect_get_by_id()
            .returning(|_| Err(AppError::RemoteFailure("connection refused".to_string())));
        let mut ledger = MockBorrowLedger::new();
        ledger.expect_insert().never();

        let repository = Repository {
            books: Arc::new(books),
            borrow_requests: Arc::new(ledger),
            profiles: Arc::new(MemoryStore::new()),
        };
        let service = BorrowService::new(repository, NotificationQueue::disabled());

        let err = service
            .create_request(&Actor::new(owner_id, None, "t"), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RemoteFailure(_)));
    }

    #[tokio::test]
    async fn test_deleting_book_keeps_its_requests() {
        let f = fixture();
        let owner = user(&f.repository, "Owner", None).await;
        let borrower = user(&f.repository, "Borrower", None).await;
        let b = book(&f.repository, &owner, "Momo").await;
        let pending = f.service.create_request(&borrower, b.id).await.unwrap();

        BooksService::new(f.repository.clone())
            .delete(owner.id, b.id)
            .await
            .unwrap();

        let kept = f.repository.borrow_requests.get_by_id(pending.id).await.unwrap();
        assert_eq!(kept.status, BorrowStatus::Pending);

        let outgoing = f
            .service
            .list_for_user(borrower.id, Role::Borrower, None)
            .await
            .unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].request.id, pending.id);
        assert!(outgoing[0].book.is_none());

        // The book is gone, so it cannot be lent, but the owner can still decline
        let err = f.service.approve(&owner, pending.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let rejected = f.service.reject(&owner, pending.id).await.unwrap();
        assert_eq!(rejected.status, BorrowStatus::Rejected);
    }

    #[tokio::test]
    async fn test_audit_ignores_other_owners() {
        let f = fixture();
        let owner = user(&f.repository, "Owner", None).await;
        let someone = user(&f.repository, "Someone", None).await;
        let b = book(&f.repository, &someone, "Momo").await;
        f.repository
            .books
            .set_status(b.id, BookStatus::Borrowed)
            .await
            .unwrap();

        assert!(f.service.audit_consistency(owner.id).await.unwrap().is_empty());
        assert_eq!(f.service.audit_consistency(someone.id).await.unwrap().len(), 1);
    }
}
