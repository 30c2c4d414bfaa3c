//! Business logic services

pub mod auth;
pub mod catalog;
pub mod ledger;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub catalog: catalog::CatalogService,
    pub ledger: ledger::LedgerService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        Self {
            auth: auth::AuthService::new(repository.clone(), config.auth.clone()),
            catalog: catalog::CatalogService::new(repository.clone(), config.catalog.clone()),
            ledger: ledger::LedgerService::new(
                repository,
                ledger::LedgerPolicy::from(&config.ledger),
            ),
        }
    }
}
