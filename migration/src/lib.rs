pub use sea_orm_migration::prelude::*;

mod m20250901_000001_create_stores_and_prizes;
mod m20250901_000002_create_claim_records;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_000001_create_stores_and_prizes::Migration),
            Box::new(m20250901_000002_create_claim_records::Migration),
        ]
    }
}
