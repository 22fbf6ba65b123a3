use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VectorServices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VectorServices::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VectorServices::FileId).big_integer().not_null())
                    .col(ColumnDef::new(VectorServices::VectorType).string().not_null())
                    .col(ColumnDef::new(VectorServices::TableName).string())
                    .col(ColumnDef::new(VectorServices::MbtilesName).string())
                    .col(ColumnDef::new(VectorServices::ServiceUrl).string().not_null())
                    .col(ColumnDef::new(VectorServices::MvtUrl).string().not_null())
                    .col(ColumnDef::new(VectorServices::TilejsonUrl).string().not_null())
                    .col(ColumnDef::new(VectorServices::Style).json())
                    .col(ColumnDef::new(VectorServices::Status).string().not_null())
                    .col(ColumnDef::new(VectorServices::UserId).big_integer().not_null())
                    .col(ColumnDef::new(VectorServices::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(VectorServices::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vector_services_file_id")
                            .from(VectorServices::Table, VectorServices::FileId)
                            .to(Files::Table, Files::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // One active service per (file, kind); soft-deleted rows don't count.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX idx_vector_services_file_kind_active \
                 ON vector_services (file_id, vector_type) WHERE status = 'active'",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VectorServices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum VectorServices {
    Table,
    Id,
    FileId,
    VectorType,
    TableName,
    MbtilesName,
    ServiceUrl,
    MvtUrl,
    TilejsonUrl,
    Style,
    Status,
    UserId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Files {
    Table,
    Id,
}
