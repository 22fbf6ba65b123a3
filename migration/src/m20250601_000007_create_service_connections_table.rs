use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ServiceConnections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ServiceConnections::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ServiceConnections::UserId).big_integer().not_null())
                    .col(ColumnDef::new(ServiceConnections::Kind).string().not_null())
                    .col(ColumnDef::new(ServiceConnections::Name).string().not_null())
                    .col(ColumnDef::new(ServiceConnections::Url).string().not_null())
                    .col(ColumnDef::new(ServiceConnections::Credentials).json())
                    .col(
                        ColumnDef::new(ServiceConnections::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ServiceConnections::LastTestTime).timestamp())
                    .col(
                        ColumnDef::new(ServiceConnections::LastTestStatus)
                            .string()
                            .not_null()
                            .default("unknown"),
                    )
                    .col(ColumnDef::new(ServiceConnections::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_service_connections_user_id")
                            .from(ServiceConnections::Table, ServiceConnections::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ServiceConnections::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ServiceConnections {
    Table,
    Id,
    UserId,
    Kind,
    Name,
    Url,
    Credentials,
    IsDefault,
    LastTestTime,
    LastTestStatus,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
