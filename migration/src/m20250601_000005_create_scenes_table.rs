use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Scenes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Scenes::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Scenes::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Scenes::Name).string().not_null())
                    .col(ColumnDef::new(Scenes::Description).text())
                    .col(ColumnDef::new(Scenes::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Scenes::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_scenes_user_id")
                            .from(Scenes::Table, Scenes::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_scenes_user_name")
                    .table(Scenes::Table)
                    .col(Scenes::UserId)
                    .col(Scenes::Name)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Scenes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Scenes {
    Table,
    Id,
    UserId,
    Name,
    Description,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
