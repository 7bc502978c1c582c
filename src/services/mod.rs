//! Business logic services

pub mod books;
pub mod borrows;
pub mod directory;
pub mod email;
pub mod notifications;
pub mod profiles;

use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::{AppConfig, NotifierMode},
    error::{AppError, AppResult},
    repository::Repository,
};

use notifications::{NotificationQueue, NotificationService, Notifier, RemoteNotifier, RetryPolicy};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub books: books::BooksService,
    pub profiles: profiles::ProfilesService,
    pub borrows: borrows::BorrowService,
    pub notifications: NotificationService,
    pub repository: Repository,
}

impl Services {
    /// Create all services with the given repository.
    /// Starts the notification worker, so it must run inside a Tokio runtime.
    pub fn new(repository: Repository, config: &AppConfig) -> AppResult<Self> {
        let timeout = Duration::from_secs(config.notifications.timeout_secs);

        let notifications = NotificationService::new(
            directory::build_directory(&config.identity, timeout)?,
            email::build_mailer(&config.email)?,
            config.email.from_name.clone(),
        );

        let notifier: Option<Arc<dyn Notifier>> = match config.notifications.mode {
            NotifierMode::Inline => Some(Arc::new(notifications.clone())),
            NotifierMode::Remote => {
                let endpoint = config.notifications.endpoint.as_deref().ok_or_else(|| {
                    AppError::Internal(
                        "notifications.endpoint is required in remote mode".to_string(),
                    )
                })?;
                Some(Arc::new(RemoteNotifier::new(endpoint, timeout)?))
            }
            NotifierMode::Disabled => None,
        };

        let queue = match notifier {
            Some(notifier) => NotificationQueue::start(
                notifier,
                config.notifications.queue_capacity,
                RetryPolicy::from(&config.notifications),
            ),
            None => NotificationQueue::disabled(),
        };
        tracing::info!(mode = ?config.notifications.mode, "Borrow request notifications configured");

        Ok(Self {
            books: books::BooksService::new(repository.clone()),
            profiles: profiles::ProfilesService::new(repository.clone()),
            borrows: borrows::BorrowService::new(repository.clone(), queue),
            notifications,
            repository,
        })
    }
}
