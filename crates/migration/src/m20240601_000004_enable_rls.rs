use sea_orm_migration::prelude::*;

use crate::utils::{disable_rls_sql, enable_rls_sql, execute_sql, RlsCommand, RlsPolicy};

/// Tables the client reaches through the anon key
pub const CLIENT_TABLES: [&str; 7] = [
    "perfiles",
    "usuario",
    "usuario_perfil",
    "profesores",
    "cursos",
    "usuario_cursos",
    "resenas",
];

const COMMANDS: [RlsCommand; 4] = [
    RlsCommand::Select,
    RlsCommand::Insert,
    RlsCommand::Update,
    RlsCommand::Delete,
];

/// Every policy this migration installs
pub fn client_policies() -> Vec<RlsPolicy> {
    CLIENT_TABLES
        .iter()
        .flat_map(|table| {
            COMMANDS
                .iter()
                .map(move |command| RlsPolicy::anon_full_access(table, *command))
        })
        .collect()
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in CLIENT_TABLES {
            execute_sql(manager, &enable_rls_sql(table, Some("public"))).await?;
        }
        for policy in client_policies() {
            execute_sql(manager, &policy.create_policy_sql()).await?;
            println!(" -> RLS policy '{}' created.", policy.name);
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for policy in client_policies() {
            execute_sql(manager, &policy.drop_policy_sql()).await?;
        }
        for table in CLIENT_TABLES {
            execute_sql(manager, &disable_rls_sql(table, Some("public"))).await?;
        }
        Ok(())
    }
}
