use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_catalog_tables::Migration),
            Box::new(m20240101_000002_create_customers_table::Migration),
            Box::new(m20240101_000003_create_orders_tables::Migration),
            Box::new(m20240101_000004_create_stock_tables::Migration),
            Box::new(m20240101_000005_create_affiliate_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_catalog_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductSets::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductSets::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductSets::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(ProductSets::Price)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductSets::Logos).integer().not_null())
                        .col(ColumnDef::new(ProductSets::Points).integer().not_null())
                        .col(
                            ColumnDef::new(ProductSets::Recommended)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ColorTiers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ColorTiers::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ColorTiers::Num)
                                .integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(ColorTiers::Price)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(ColorTiers::Details).string().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Colors::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Colors::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Colors::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Addons::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Addons::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Addons::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Addons::Price).decimal_len(10, 2).not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PromoCodeTypes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PromoCodeTypes::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodeTypes::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PromoCodes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PromoCodes::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::Discount)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PromoCodes::TypeId).integer().not_null())
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PromoCodes::Table).if_exists().to_owned())
                .await?;
            manager
                .drop_table(
                    Table::drop()
                        .table(PromoCodeTypes::Table)
                        .if_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .drop_table(Table::drop().table(Addons::Table).if_exists().to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Colors::Table).if_exists().to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ColorTiers::Table).if_exists().to_owned())
                .await?;
            manager
                .drop_table(
                    Table::drop()
                        .table(ProductSets::Table)
                        .if_exists()
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(Iden)]
    enum ProductSets {
        Table,
        Id,
        Name,
        Price,
        Logos,
        Points,
        Recommended,
    }

    #[derive(Iden)]
    enum ColorTiers {
        Table,
        Id,
        Num,
        Price,
        Details,
    }

    #[derive(Iden)]
    enum Colors {
        Table,
        Id,
        Name,
    }

    #[derive(Iden)]
    enum Addons {
        Table,
        Id,
        Name,
        Price,
    }

    #[derive(Iden)]
    enum PromoCodeTypes {
        Table,
        Id,
        Name,
    }

    #[derive(Iden)]
    enum PromoCodes {
        Table,
        Id,
        Code,
        Discount,
        TypeId,
    }
}

mod m20240101_000002_create_customers_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_customers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Customers::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Customers::Email)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Customers::FirstName).string().not_null())
                        .col(ColumnDef::new(Customers::LastName).string().not_null())
                        .col(ColumnDef::new(Customers::PasswordHash).string().not_null())
                        .col(
                            ColumnDef::new(Customers::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Customers::Staff)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Customers::CreatedByOrder)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Customers::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Customers::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Customers::Table).if_exists().to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Customers {
        Table,
        Id,
        Email,
        FirstName,
        LastName,
        PasswordHash,
        Active,
        Staff,
        CreatedByOrder,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_orders_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Orders::Id)
                                .string_len(12)
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::CustomerId).integer().not_null())
                        .col(ColumnDef::new(Orders::SetId).integer().not_null())
                        .col(ColumnDef::new(Orders::ColorsNum).integer().not_null())
                        .col(ColumnDef::new(Orders::SetColorId).integer().not_null())
                        .col(ColumnDef::new(Orders::LogoColor1Id).integer().null())
                        .col(ColumnDef::new(Orders::LogoColor2Id).integer().null())
                        .col(ColumnDef::new(Orders::LogoColor3Id).integer().null())
                        .col(ColumnDef::new(Orders::PromoCodeId).integer().null())
                        .col(ColumnDef::new(Orders::Logo).string().null())
                        .col(ColumnDef::new(Orders::FullName).string().not_null())
                        .col(ColumnDef::new(Orders::Country).string().not_null())
                        .col(ColumnDef::new(Orders::State).string().not_null())
                        .col(ColumnDef::new(Orders::City).string().not_null())
                        .col(ColumnDef::new(Orders::PostalCode).string().not_null())
                        .col(ColumnDef::new(Orders::StreetAddress).string().not_null())
                        .col(ColumnDef::new(Orders::Phone).string().not_null())
                        .col(ColumnDef::new(Orders::Comments).string().null())
                        .col(
                            ColumnDef::new(Orders::Total)
                                .decimal_len(10, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(
                            ColumnDef::new(Orders::RemindersSent)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::PaymentLink).string().null())
                        .col(ColumnDef::new(Orders::CheckoutHandle).string().null())
                        .col(ColumnDef::new(Orders::PaymentProvider).string().null())
                        .col(ColumnDef::new(Orders::TrackingNumber).string().null())
                        .col(ColumnDef::new(Orders::InvoiceFile).string().null())
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_customer_status")
                        .table(Orders::Table)
                        .col(Orders::CustomerId)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderAddons::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderAddons::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderAddons::OrderId)
                                .string_len(12)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderAddons::AddonId).integer().not_null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(OrderAddons::Table)
                        .if_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).if_exists().to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
        CustomerId,
        SetId,
        ColorsNum,
        SetColorId,
        #[iden = "logo_color_1_id"]
        LogoColor1Id,
        #[iden = "logo_color_2_id"]
        LogoColor2Id,
        #[iden = "logo_color_3_id"]
        LogoColor3Id,
        PromoCodeId,
        Logo,
        FullName,
        Country,
        State,
        City,
        PostalCode,
        StreetAddress,
        Phone,
        Comments,
        Total,
        Status,
        RemindersSent,
        PaymentLink,
        CheckoutHandle,
        PaymentProvider,
        TrackingNumber,
        InvoiceFile,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum OrderAddons {
        Table,
        Id,
        OrderId,
        AddonId,
    }
}

mod m20240101_000004_create_stock_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_stock_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StoreStatus::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StoreStatus::Key)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StoreStatus::Value).text().not_null())
                        .col(
                            ColumnDef::new(StoreStatus::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StoreStatus::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(FutureStocks::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(FutureStocks::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(FutureStocks::Amount).integer().not_null())
                        .col(
                            ColumnDef::new(FutureStocks::ScheduledAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FutureStocks::Added)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(FutureStocks::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FutureStocks::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockSubscriptions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockSubscriptions::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockSubscriptions::CustomerId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockSubscriptions::FutureStockId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockSubscriptions::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(StockSubscriptions::Notified)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(StockSubscriptions::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockSubscriptions::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Concurrent subscribe requests converge on a single row
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_stock_subscription_customer_future_stock")
                        .table(StockSubscriptions::Table)
                        .col(StockSubscriptions::CustomerId)
                        .col(StockSubscriptions::FutureStockId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(StockSubscriptions::Table)
                        .if_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .drop_table(
                    Table::drop()
                        .table(FutureStocks::Table)
                        .if_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .drop_table(
                    Table::drop()
                        .table(StoreStatus::Table)
                        .if_exists()
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(Iden)]
    enum StoreStatus {
        Table,
        Key,
        Value,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum FutureStocks {
        Table,
        Id,
        Amount,
        ScheduledAt,
        Added,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum StockSubscriptions {
        Table,
        Id,
        CustomerId,
        FutureStockId,
        Active,
        Notified,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_affiliate_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_affiliate_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Affiliates::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Affiliates::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Affiliates::CustomerId)
                                .integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Affiliates::PromoCodeId)
                                .integer()
                                .null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Affiliates::Balance)
                                .decimal_len(10, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Affiliates::SocialMedia).string().null())
                        .col(ColumnDef::new(Affiliates::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Affiliates::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AffiliatePayments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AffiliatePayments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AffiliatePayments::AffiliateId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AffiliatePayments::Amount)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AffiliatePayments::Date)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AffiliatePayments::Status).string().not_null())
                        .col(
                            ColumnDef::new(AffiliatePayments::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AffiliatePayments::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(AffiliatePayments::Table)
                        .if_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .drop_table(
                    Table::drop()
                        .table(Affiliates::Table)
                        .if_exists()
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(Iden)]
    enum Affiliates {
        Table,
        Id,
        CustomerId,
        PromoCodeId,
        Balance,
        SocialMedia,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum AffiliatePayments {
        Table,
        Id,
        AffiliateId,
        Amount,
        Date,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}
