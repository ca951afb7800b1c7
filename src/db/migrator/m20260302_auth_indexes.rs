use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name("idx_user_sessions_user_revoked")
                    .table(UserSessions::Table)
                    .col(UserSessions::UserId)
                    .col(UserSessions::RevokedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_sessions_expires_at")
                    .table(UserSessions::Table)
                    .col(UserSessions::ExpiresAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_password_reset_tokens_user_used")
                    .table(PasswordResetTokens::Table)
                    .col(PasswordResetTokens::UserId)
                    .col(PasswordResetTokens::UsedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_password_reset_tokens_hash")
                    .table(PasswordResetTokens::Table)
                    .col(PasswordResetTokens::TokenHash)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Index on created_at for newest-first paging
        manager
            .create_index(
                Index::create()
                    .name("idx_audit_logs_created_at")
                    .table(AuditLogs::Table)
                    .col(AuditLogs::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_audit_logs_created_at")
                    .table(AuditLogs::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_password_reset_tokens_hash")
                    .table(PasswordResetTokens::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_password_reset_tokens_user_used")
                    .table(PasswordResetTokens::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_user_sessions_expires_at")
                    .table(UserSessions::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_user_sessions_user_revoked")
                    .table(UserSessions::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
enum UserSessions {
    Table,
    UserId,
    RevokedAt,
    ExpiresAt,
}

#[derive(Iden)]
enum PasswordResetTokens {
    Table,
    UserId,
    UsedAt,
    TokenHash,
}

#[derive(Iden)]
enum AuditLogs {
    Table,
    CreatedAt,
}
