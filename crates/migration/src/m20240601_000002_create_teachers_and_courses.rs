use sea_orm_migration::prelude::*;

use crate::m20240601_000001_create_accounts::Usuario;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Deleting an account removes its teacher row; so does changing its email
        // to one no teacher follows.
        manager
            .create_table(
                Table::create()
                    .table(Profesores::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Profesores::Idprofesor)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Profesores::Nombre).string().not_null())
                    .col(ColumnDef::new(Profesores::Email).string())
                    .col(ColumnDef::new(Profesores::Clave).string())
                    .col(ColumnDef::new(Profesores::Materia).string())
                    .col(ColumnDef::new(Profesores::Experiencia).integer().default(0))
                    .col(ColumnDef::new(Profesores::Fotoperfil).text())
                    .col(ColumnDef::new(Profesores::Valoracion).double().default(0))
                    .col(ColumnDef::new(Profesores::Busquedas).integer().default(0))
                    .col(ColumnDef::new(Profesores::Cantcursos).integer().default(0))
                    .col(ColumnDef::new(Profesores::Cantalumnos).integer().default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_profesores_usuario_email")
                            .from(Profesores::Table, Profesores::Email)
                            .to(Usuario::Table, Usuario::Email)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Cursos::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Cursos::Idcurso)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Cursos::Idprofesor).integer())
                    .col(ColumnDef::new(Cursos::Nombre).string().not_null())
                    .col(ColumnDef::new(Cursos::Materia).string())
                    .col(ColumnDef::new(Cursos::Precio).decimal_len(10, 2))
                    .col(ColumnDef::new(Cursos::Aniosecundaria).integer())
                    .col(ColumnDef::new(Cursos::Descripcion).text())
                    .col(ColumnDef::new(Cursos::Fotocurso).text())
                    .col(ColumnDef::new(Cursos::Videocurso).text())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_cursos_profesor")
                            .from(Cursos::Table, Cursos::Idprofesor)
                            .to(Profesores::Table, Profesores::Idprofesor)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_cursos_idprofesor")
                    .table(Cursos::Table)
                    .col(Cursos::Idprofesor)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Cursos::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Profesores::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Profesores {
    Table,
    Idprofesor,
    Nombre,
    Email,
    Clave,
    Materia,
    Experiencia,
    Fotoperfil,
    Valoracion,
    Busquedas,
    Cantcursos,
    Cantalumnos,
}

#[derive(DeriveIden)]
pub enum Cursos {
    Table,
    Idcurso,
    Idprofesor,
    Nombre,
    Materia,
    Precio,
    Aniosecundaria,
    Descripcion,
    Fotocurso,
    Videocurso,
}
