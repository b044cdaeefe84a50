use sea_orm_migration::prelude::*;

/// Profiles every installation starts with
pub const SEED_PROFILES: [&str; 3] = ["admin", "profesor", "alumno"];

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Perfiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Perfiles::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Perfiles::Nombre).string().not_null().unique_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Usuario::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Usuario::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Usuario::Nombre).string().not_null())
                    .col(ColumnDef::new(Usuario::Username).string().unique_key())
                    .col(ColumnDef::new(Usuario::Contrasena).string())
                    .col(ColumnDef::new(Usuario::Email).string().unique_key())
                    .col(ColumnDef::new(Usuario::Fotoperfil).text())
                    .col(ColumnDef::new(Usuario::Fechanacimiento).date())
                    .col(ColumnDef::new(Usuario::Genero).string())
                    .col(ColumnDef::new(Usuario::Aniosecundaria).integer())
                    .col(ColumnDef::new(Usuario::Telefono).string())
                    .col(ColumnDef::new(Usuario::Edad).integer())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UsuarioPerfil::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(UsuarioPerfil::UsuarioId).integer().not_null())
                    .col(ColumnDef::new(UsuarioPerfil::PerfilId).integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(UsuarioPerfil::UsuarioId)
                            .col(UsuarioPerfil::PerfilId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_usuario_perfil_usuario")
                            .from(UsuarioPerfil::Table, UsuarioPerfil::UsuarioId)
                            .to(Usuario::Table, Usuario::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_usuario_perfil_perfil")
                            .from(UsuarioPerfil::Table, UsuarioPerfil::PerfilId)
                            .to(Perfiles::Table, Perfiles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        let mut seed = Query::insert();
        seed.into_table(Perfiles::Table).columns([Perfiles::Nombre]);
        for name in SEED_PROFILES {
            seed.values([name.into()])
                .map_err(|e| DbErr::Custom(e.to_string()))?;
        }
        seed.on_conflict(OnConflict::column(Perfiles::Nombre).do_nothing().to_owned());
        manager.exec_stmt(seed).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UsuarioPerfil::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Usuario::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Perfiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Perfiles {
    Table,
    Id,
    Nombre,
}

#[derive(DeriveIden)]
pub enum Usuario {
    Table,
    Id,
    Nombre,
    Username,
    #[sea_orm(iden = "contraseña")]
    Contrasena,
    Email,
    Fotoperfil,
    Fechanacimiento,
    Genero,
    Aniosecundaria,
    Telefono,
    Edad,
}

#[derive(DeriveIden)]
pub enum UsuarioPerfil {
    Table,
    UsuarioId,
    PerfilId,
}
