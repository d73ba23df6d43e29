use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // MySQL 不支持在 TEXT 上直接建唯一索引，改用定长 VARCHAR（768 * 4 字节 = 索引上限）
        let mut original_url = ColumnDef::new(Url::OriginalUrl);
        match manager.get_database_backend() {
            DatabaseBackend::MySql => original_url.string_len(768),
            _ => original_url.text(),
        };
        original_url.not_null().unique_key();

        // 创建 urls 表
        manager
            .create_table(
                Table::create()
                    .table(Url::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Url::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Url::ShortUrl)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(&mut original_url)
                    .col(
                        ColumnDef::new(Url::CreatedBy)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Url::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Url::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        // 按用户查询索引
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_urls_created_by")
                    .table(Url::Table)
                    .col(Url::CreatedBy)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_urls_created_by")
                    .table(Url::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Url::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Url {
    #[sea_orm(iden = "urls")]
    Table,
    Id,
    ShortUrl,
    OriginalUrl,
    CreatedBy,
    CreatedAt,
    IsDeleted,
}
