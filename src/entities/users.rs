use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    /// Stored lowercased and trimmed.
    #[sea_orm(unique)]
    pub email: String,

    pub mobile: Option<String>,

    /// Argon2id password hash
    pub password_hash: String,

    /// `ADMIN`, `STAFF` or `VIEWER`
    pub role: String,

    pub is_active: bool,

    /// Forces password rotation before any non-auth endpoint is reachable.
    pub must_change_password: bool,

    pub failed_login_count: i32,

    pub lock_until: Option<DateTimeUtc>,

    pub last_login_at: Option<DateTimeUtc>,

    /// Bumped on password change, reset and forced logout. Tokens carrying an
    /// older value are rejected.
    pub token_generation: i32,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_sessions::Entity")]
    Sessions,

    #[sea_orm(has_many = "super::password_reset_tokens::Entity")]
    PasswordResetTokens,
}

impl Related<super::user_sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl Related<super::password_reset_tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PasswordResetTokens.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
