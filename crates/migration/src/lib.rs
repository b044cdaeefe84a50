pub use sea_orm_migration::prelude::*;

mod m20240601_000001_create_accounts;
mod m20240601_000002_create_teachers_and_courses;
mod m20240601_000003_create_subscriptions_and_reviews;
mod m20240601_000004_enable_rls;

// Row level security helpers
pub mod utils;

pub use m20240601_000001_create_accounts::SEED_PROFILES;
pub use m20240601_000004_enable_rls::{client_policies, CLIENT_TABLES};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_accounts::Migration),
            Box::new(m20240601_000002_create_teachers_and_courses::Migration),
            Box::new(m20240601_000003_create_subscriptions_and_reviews::Migration),
            Box::new(m20240601_000004_enable_rls::Migration),
        ]
    }
}
