use sea_orm_migration::prelude::*;

use crate::m20240601_000001_create_accounts::Usuario;
use crate::m20240601_000002_create_teachers_and_courses::Cursos;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // The composite key is the conflict target of idempotent subscriptions
        manager
            .create_table(
                Table::create()
                    .table(UsuarioCursos::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(UsuarioCursos::Idcurso).integer().not_null())
                    .col(ColumnDef::new(UsuarioCursos::Idalumno).integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(UsuarioCursos::Idcurso)
                            .col(UsuarioCursos::Idalumno),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_usuario_cursos_curso")
                            .from(UsuarioCursos::Table, UsuarioCursos::Idcurso)
                            .to(Cursos::Table, Cursos::Idcurso)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_usuario_cursos_alumno")
                            .from(UsuarioCursos::Table, UsuarioCursos::Idalumno)
                            .to(Usuario::Table, Usuario::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Resenas::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Resenas::Idresena)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Resenas::Texto).text().not_null())
                    .col(ColumnDef::new(Resenas::Idalumno).integer())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_resenas_alumno")
                            .from(Resenas::Table, Resenas::Idalumno)
                            .to(Usuario::Table, Usuario::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Resenas::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UsuarioCursos::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum UsuarioCursos {
    Table,
    Idcurso,
    Idalumno,
}

#[derive(DeriveIden)]
pub enum Resenas {
    Table,
    Idresena,
    Texto,
    Idalumno,
}
