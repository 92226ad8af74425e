//! Business logic services

pub mod catalog;
pub mod email;
pub mod fines;
pub mod loans;
pub mod overdue;

use std::sync::Arc;

use chrono::Duration;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub overdue: overdue::OverdueNotifier,
}

impl Services {
    /// Create all services with the given repository, mailing through SMTP
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let sender = Arc::new(email::EmailService::new(config.email.clone()));
        Self::with_sender(repository, config, sender)
    }

    /// Create all services with a custom message sender
    pub fn with_sender(
        repository: Repository,
        config: &AppConfig,
        sender: Arc<dyn email::MessageSender>,
    ) -> Self {
        Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            loans: loans::LoansService::new(repository.clone(), &config.loans),
            overdue: overdue::OverdueNotifier::new(
                repository.borrows.clone(),
                sender,
                Duration::hours(config.overdue.grace_hours),
            ),
        }
    }
}
