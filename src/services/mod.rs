//! Business logic services

pub mod audit;
pub mod catalog;
pub mod circulation;
pub mod fines;
pub mod redis;
pub mod uploads;
pub mod users;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub repository: Repository,
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub circulation: circulation::CirculationService,
    pub fines: fines::FinesService,
    pub audit: audit::AuditService,
    pub uploads: uploads::UploadService,
    pub redis: redis::RedisService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig, redis_service: redis::RedisService) -> Self {
        let audit = audit::AuditService::new(repository.clone(), config.library.audit_log_per_page);
        let uploads = uploads::UploadService::new(config.uploads.clone());

        Self {
            users: users::UsersService::new(
                repository.clone(),
                config.auth.clone(),
                redis_service.clone(),
                audit.clone(),
                uploads.clone(),
            ),
            catalog: catalog::CatalogService::new(
                repository.clone(),
                audit.clone(),
                uploads.clone(),
                config.library.books_per_page,
            ),
            circulation: circulation::CirculationService::new(
                repository.clone(),
                audit.clone(),
                config.library.clone(),
            ),
            fines: fines::FinesService::new(repository.clone(), audit.clone()),
            audit,
            uploads,
            redis: redis_service,
            repository,
        }
    }
}
