use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OgcServices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OgcServices::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OgcServices::FileId).big_integer().not_null())
                    .col(ColumnDef::new(OgcServices::SpatialTable).string().not_null())
                    .col(ColumnDef::new(OgcServices::Workspace).string().not_null())
                    .col(ColumnDef::new(OgcServices::LayerName).string().not_null())
                    .col(ColumnDef::new(OgcServices::WmsUrl).string().not_null())
                    .col(ColumnDef::new(OgcServices::WfsUrl).string().not_null())
                    .col(ColumnDef::new(OgcServices::Status).string().not_null())
                    .col(ColumnDef::new(OgcServices::UserId).big_integer().not_null())
                    .col(ColumnDef::new(OgcServices::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ogc_services_file_id")
                            .from(OgcServices::Table, OgcServices::FileId)
                            .to(Files::Table, Files::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX idx_ogc_services_file_active \
                 ON ogc_services (file_id) WHERE status = 'active'",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OgcServices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OgcServices {
    Table,
    Id,
    FileId,
    SpatialTable,
    Workspace,
    LayerName,
    WmsUrl,
    WfsUrl,
    Status,
    UserId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Files {
    Table,
    Id,
}
