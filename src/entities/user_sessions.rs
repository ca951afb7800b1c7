use sea_orm::entity::prelude::*;

/// One link of a refresh-token chain. Rows are never reopened once revoked.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "user_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,

    #[sea_orm(unique)]
    pub session_id: String,

    /// SHA-256 hex digest of the refresh token issued for this link
    pub refresh_token_hash: String,

    pub created_at: DateTimeUtc,

    pub expires_at: DateTimeUtc,

    pub revoked_at: Option<DateTimeUtc>,

    pub last_used_at: Option<DateTimeUtc>,

    pub ip_address: String,

    pub user_agent: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
