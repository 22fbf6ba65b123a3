use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SceneLayers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SceneLayers::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SceneLayers::SceneId).big_integer().not_null())
                    .col(ColumnDef::new(SceneLayers::LayerOrder).integer().not_null())
                    .col(ColumnDef::new(SceneLayers::ServiceKind).string().not_null())
                    .col(ColumnDef::new(SceneLayers::VectorServiceId).big_integer())
                    .col(ColumnDef::new(SceneLayers::OgcServiceId).big_integer())
                    .col(
                        ColumnDef::new(SceneLayers::Visible)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(SceneLayers::Opacity)
                            .double()
                            .not_null()
                            .default(1.0),
                    )
                    .col(ColumnDef::new(SceneLayers::Style).json())
                    .col(ColumnDef::new(SceneLayers::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_scene_layers_scene_id")
                            .from(SceneLayers::Table, SceneLayers::SceneId)
                            .to(Scenes::Table, Scenes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_scene_layers_vector_service_id")
                            .from(SceneLayers::Table, SceneLayers::VectorServiceId)
                            .to(VectorServices::Table, VectorServices::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_scene_layers_ogc_service_id")
                            .from(SceneLayers::Table, SceneLayers::OgcServiceId)
                            .to(OgcServices::Table, OgcServices::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SceneLayers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SceneLayers {
    Table,
    Id,
    SceneId,
    LayerOrder,
    ServiceKind,
    VectorServiceId,
    OgcServiceId,
    Visible,
    Opacity,
    Style,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Scenes {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum VectorServices {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum OgcServices {
    Table,
    Id,
}
