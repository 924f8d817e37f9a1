use crate::auth::{issue_token, AuthConfig, CurrentUser, SESSION_COOKIE};
use crate::filter;
use crate::policy::{self, Action, PolicyError, Role};
use crate::selection::{self, CompanyRef, LocationUpdate, Selection};
use std::sync::Arc;

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use async_graphql::{
    Context, EmptySubscription, Enum, Error, ErrorExtensions, InputObject, Object, Schema,
    SimpleObject, ID,
};
use chrono::{DateTime, Duration, Utc};
use entity::{company, credential, password_reset, user, user_identity, user_secret};
use platform_api::ApiError;
use rand::{distributions::Alphanumeric, Rng};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

pub struct AppSchema(pub Schema<QueryRoot, MutationRoot, EmptySubscription>);

pub fn build_schema(db: Arc<DatabaseConnection>, auth: Arc<AuthConfig>) -> AppSchema {
    let schema = Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(db)
        .data(auth)
        .finish();
    AppSchema(schema)
}

pub struct QueryRoot;
pub struct MutationRoot;

#[Object]
impl QueryRoot {
    async fn vault(&self) -> VaultQuery {
        VaultQuery
    }
}

#[Object]
impl MutationRoot {
    async fn vault(&self) -> VaultMutation {
        VaultMutation
    }
}

#[derive(Default)]
pub struct VaultQuery;

#[derive(Default)]
pub struct VaultMutation;

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum UserRole {
    #[graphql(name = "BASIC")]
    Basic,
    #[graphql(name = "ADMIN")]
    Admin,
    #[graphql(name = "SUPER_ADMIN")]
    SuperAdmin,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum CredentialKind {
    #[graphql(name = "HOSTING")]
    Hosting,
    #[graphql(name = "SERVER")]
    Server,
    #[graphql(name = "DOMAIN_REGISTRAR")]
    DomainRegistrar,
}

/// How the client must rewrite its location to stay in sync with the
/// resolved selection.
#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum LocationAction {
    #[graphql(name = "NONE")]
    None,
    #[graphql(name = "CLEAR")]
    Clear,
    #[graphql(name = "REPLACE")]
    Replace,
    #[graphql(name = "PUSH")]
    Push,
}

#[Object]
impl VaultQuery {
    async fn me(&self, ctx: &Context<'_>) -> async_graphql::Result<MePayload> {
        let viewer = require(ctx, Action::ViewCredentials)?;
        let db = database(ctx)?;
        let model = load_active_user(db.as_ref(), viewer.user_id).await?;
        Ok(MePayload {
            role: role_from_entity(model.role).into(),
            user: UserNode::from_model(model),
        })
    }

    /// Company list plus the resolved active selection for the given
    /// location hint (`?company=<id>`). The location wins when it names an
    /// accessible company; otherwise the first company by name is adopted
    /// and the client is told to rewrite its location.
    async fn workspace(
        &self,
        ctx: &Context<'_>,
        company: Option<ID>,
    ) -> async_graphql::Result<WorkspacePayload> {
        require(ctx, Action::ViewCredentials)?;
        let db = database(ctx)?;
        let hint = match &company {
            Some(id) => Some(parse_uuid(id)?),
            None => None,
        };
        let records = company::Entity::find()
            .order_by_asc(company::Column::Name)
            .all(db.as_ref())
            .await
            .map_err(db_error)?;
        let refs: Vec<CompanyRef> = records
            .iter()
            .map(|c| CompanyRef {
                id: c.id,
                name: c.name.clone(),
            })
            .collect();
        let resolution = selection::resolve(Selection::default(), &refs, hint);
        let selected = resolution
            .selection
            .tenant()
            .and_then(|id| records.iter().find(|c| c.id == id).cloned());
        let (location_action, location_company) = match resolution.location {
            LocationUpdate::None => (
                LocationAction::None,
                resolution.selection.tenant().map(id_of),
            ),
            LocationUpdate::Clear => (LocationAction::Clear, None),
            LocationUpdate::Replace(id) => (LocationAction::Replace, Some(id_of(id))),
            LocationUpdate::Push(id) => (LocationAction::Push, Some(id_of(id))),
        };
        Ok(WorkspacePayload {
            companies: records.into_iter().map(CompanyNode::from).collect(),
            selected: selected.map(CompanyNode::from),
            location_action,
            location_company,
        })
    }

    /// Credentials of one company, newest first. The company scope is
    /// applied in the store query; `q` and `kind` only narrow the result
    /// for display.
    async fn credentials(
        &self,
        ctx: &Context<'_>,
        company: ID,
        q: Option<String>,
        kind: Option<CredentialKind>,
    ) -> async_graphql::Result<Vec<CredentialNode>> {
        require(ctx, Action::ViewCredentials)?;
        let db = database(ctx)?;
        let company_id = parse_uuid(&company)?;
        ensure_company_exists(db.as_ref(), company_id).await?;
        let rows = credential::Entity::find()
            .filter(credential::Column::CompanyId.eq(company_id))
            .order_by_desc(credential::Column::CreatedAt)
            .all(db.as_ref())
            .await
            .map_err(db_error)?;
        let term = sanitize_optional_filter(q);
        let rows = filter::apply(rows, term.as_deref(), kind.map(kind_to_entity));
        Ok(rows.into_iter().map(CredentialNode::from).collect())
    }

    async fn users(
        &self,
        ctx: &Context<'_>,
        q: Option<String>,
    ) -> async_graphql::Result<Vec<UserNode>> {
        require(ctx, Action::ListUsers)?;
        let db = database(ctx)?;
        let mut query = user::Entity::find();
        if let Some(term) = sanitize_optional_filter(q) {
            let pattern = format!("%{}%", term.to_lowercase());
            let email_expr = Expr::expr(Func::lower(Expr::col(user::Column::Email)));
            let name_expr = Expr::expr(Func::lower(Expr::col(user::Column::DisplayName)));
            query = query.filter(
                Condition::any()
                    .add(email_expr.like(pattern.clone()))
                    .add(name_expr.like(pattern)),
            );
        }
        let records = query
            .order_by_asc(user::Column::Email)
            .all(db.as_ref())
            .await
            .map_err(db_error)?;
        Ok(records.into_iter().map(UserNode::from_model).collect())
    }
}

#[Object]
impl VaultMutation {
    async fn login(
        &self,
        ctx: &Context<'_>,
        email: String,
        password: String,
    ) -> async_graphql::Result<AuthPayload> {
        let auth = auth_config(ctx)?;
        let db = database(ctx)?;
        let normalized = normalize_email(&email)?;
        let identity = user_identity::Entity::find()
            .filter(user_identity::Column::Provider.eq("local"))
            .filter(user_identity::Column::Subject.eq(normalized))
            .one(db.as_ref())
            .await
            .map_err(db_error)?;
        let Some(identity) = identity else {
            return Ok(AuthPayload::failed("Invalid credentials"));
        };
        let user = user::Entity::find_by_id(identity.user_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?;
        let Some(user) = user else {
            return Ok(AuthPayload::failed("Invalid credentials"));
        };
        if !user.is_active {
            return Ok(AuthPayload::failed("Account disabled"));
        }
        let secret = user_secret::Entity::find_by_id(user.id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?;
        let Some(secret) = secret else {
            return Ok(AuthPayload::failed("Invalid credentials"));
        };
        let parsed_hash = PasswordHash::new(&secret.password_hash)
            .map_err(|_| upstream_error("stored password hash is unreadable"))?;
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_err()
        {
            return Ok(AuthPayload::failed("Invalid credentials"));
        }
        let role = role_from_entity(user.role);
        let token = issue_token(user.id, role, &auth)
            .map_err(|_| upstream_error("failed to issue session token"))?;
        append_session_cookie(ctx, &token, auth.session_ttl_minutes);
        Ok(AuthPayload {
            ok: true,
            user: Some(UserNode::from_model(user)),
            error: None,
        })
    }

    async fn logout(&self, ctx: &Context<'_>) -> async_graphql::Result<bool> {
        append_session_cookie(ctx, "", -1);
        Ok(true)
    }

    /// Always answers `true` so the endpoint cannot be used to probe which
    /// emails exist. Delivery of the reset link is out of band.
    #[graphql(name = "requestPasswordReset")]
    async fn request_password_reset(
        &self,
        ctx: &Context<'_>,
        email: String,
    ) -> async_graphql::Result<bool> {
        let auth = auth_config(ctx)?;
        let db = database(ctx)?;
        let normalized = normalize_email(&email)?;
        let identity = user_identity::Entity::find()
            .filter(user_identity::Column::Provider.eq("local"))
            .filter(user_identity::Column::Subject.eq(normalized.clone()))
            .one(db.as_ref())
            .await
            .map_err(db_error)?;
        if let Some(identity) = identity {
            let token = issue_reset_token(db.as_ref(), identity.user_id, auth.reset_ttl_hours)
                .await?;
            info!(email = %normalized, reset_token = %token, "password reset issued; deliver the link out of band");
        }
        Ok(true)
    }

    #[graphql(name = "setPassword")]
    async fn set_password(
        &self,
        ctx: &Context<'_>,
        token: String,
        password: String,
    ) -> async_graphql::Result<bool> {
        let db = database(ctx)?;
        let password = validate_password(&password)?;
        let token_id = Uuid::parse_str(token.trim())
            .map_err(|_| validation_error("Invalid reset token"))?;
        let reset = password_reset::Entity::find_by_id(token_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| not_found("reset token"))?;
        let now = Utc::now();
        if reset.used_at.is_some() || reset.expires_at.with_timezone(&Utc) < now {
            return Err(validation_error("Reset token is no longer valid"));
        }
        let user = load_active_user(db.as_ref(), reset.user_id).await?;
        let hash = hash_password(&password)?;
        let txn = db.begin().await.map_err(db_error)?;
        let stamp: DateTimeWithTimeZone = now.into();
        match user_secret::Entity::find_by_id(user.id)
            .one(&txn)
            .await
            .map_err(db_error)?
        {
            Some(secret) => {
                let mut active: user_secret::ActiveModel = secret.into();
                active.password_hash = Set(hash);
                active.updated_at = Set(stamp);
                active.update(&txn).await.map_err(db_error)?;
            }
            None => {
                user_secret::ActiveModel {
                    user_id: Set(user.id),
                    password_hash: Set(hash),
                    updated_at: Set(stamp),
                }
                .insert(&txn)
                .await
                .map_err(db_error)?;
            }
        }
        let mut used: password_reset::ActiveModel = reset.into();
        used.used_at = Set(Some(stamp));
        used.update(&txn).await.map_err(db_error)?;
        txn.commit().await.map_err(db_error)?;
        Ok(true)
    }

    #[graphql(name = "inviteUser")]
    async fn invite_user(
        &self,
        ctx: &Context<'_>,
        input: InviteUserInput,
    ) -> async_graphql::Result<UserNode> {
        let actor = require(ctx, Action::InviteUser)?;
        let auth = auth_config(ctx)?;
        let db = database(ctx)?;
        let email = normalize_email(&input.email)?;
        if !email.ends_with(&auth.invite_email_domain) {
            return Err(validation_error(format!(
                "Only {} addresses can be invited",
                auth.invite_email_domain
            )));
        }
        let display_name = validate_display_name(&input.display_name)?;
        let existing = user::Entity::find()
            .filter(user::Column::Email.eq(email.clone()))
            .one(db.as_ref())
            .await
            .map_err(db_error)?;
        if existing.is_some() {
            return Err(conflict_error("This email is already registered"));
        }
        let txn = db.begin().await.map_err(db_error)?;
        let now: DateTimeWithTimeZone = Utc::now().into();
        let user_id = Uuid::new_v4();
        user::ActiveModel {
            id: Set(user_id),
            email: Set(email.clone()),
            display_name: Set(display_name),
            role: Set(role_to_entity(input.role.into())),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(db_error)?;
        user_identity::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            provider: Set("local".into()),
            subject: Set(email.clone()),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(db_error)?;
        // The account starts with an unguessable placeholder; the invitee
        // sets a real password through the reset token below.
        let placeholder = hash_password(&placeholder_password())?;
        user_secret::ActiveModel {
            user_id: Set(user_id),
            password_hash: Set(placeholder),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(db_error)?;
        let token = issue_reset_token(&txn, user_id, auth.reset_ttl_hours).await?;
        txn.commit().await.map_err(db_error)?;
        info!(
            invited_by = %actor.user_id,
            email = %email,
            reset_token = %token,
            "invitation issued; deliver the set-password link out of band"
        );
        let record = user::Entity::find_by_id(user_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| not_found("user"))?;
        Ok(UserNode::from_model(record))
    }

    #[graphql(name = "updateUserRole")]
    async fn update_user_role(
        &self,
        ctx: &Context<'_>,
        id: ID,
        role: UserRole,
    ) -> async_graphql::Result<UserNode> {
        require(ctx, Action::ChangeUserRole)?;
        let db = database(ctx)?;
        let user_id = parse_uuid(&id)?;
        let record = user::Entity::find_by_id(user_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| not_found("user"))?;
        let mut active: user::ActiveModel = record.into();
        active.role = Set(role_to_entity(role.into()));
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(db.as_ref()).await.map_err(db_error)?;
        Ok(UserNode::from_model(updated))
    }

    #[graphql(name = "createCompany")]
    async fn create_company(
        &self,
        ctx: &Context<'_>,
        input: NewCompanyInput,
    ) -> async_graphql::Result<CompanyNode> {
        let actor = require(ctx, Action::CreateCompany)?;
        let db = database(ctx)?;
        let name = validate_required("name", &input.name, 256)?;
        let description = sanitize_optional_filter(input.description);
        let now: DateTimeWithTimeZone = Utc::now().into();
        let record = company::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            description: Set(description),
            created_by: Set(Some(actor.user_id)),
            updated_by: Set(Some(actor.user_id)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db.as_ref())
        .await
        .map_err(db_error)?;
        Ok(record.into())
    }

    #[graphql(name = "updateCompany")]
    async fn update_company(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: UpdateCompanyInput,
    ) -> async_graphql::Result<CompanyNode> {
        let actor = require(ctx, Action::UpdateCompany)?;
        let db = database(ctx)?;
        let company_id = parse_uuid(&id)?;
        let record = company::Entity::find_by_id(company_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| not_found("company"))?;
        let mut active: company::ActiveModel = record.into();
        if let Some(name) = &input.name {
            active.name = Set(validate_required("name", name, 256)?);
        }
        if let Some(description) = input.description {
            active.description = Set(sanitize_optional_filter(Some(description)));
        }
        active.updated_by = Set(Some(actor.user_id));
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(db.as_ref()).await.map_err(db_error)?;
        Ok(updated.into())
    }

    /// Deleting a company also deletes every credential stored under it,
    /// so the caller must resend the exact company name. The comparison is
    /// byte equality: case matters and whitespace is not trimmed.
    #[graphql(name = "deleteCompany")]
    async fn delete_company(
        &self,
        ctx: &Context<'_>,
        id: ID,
        #[graphql(name = "confirmName")] confirm_name: String,
    ) -> async_graphql::Result<bool> {
        let actor = require(ctx, Action::DeleteCompany)?;
        let db = database(ctx)?;
        let company_id = parse_uuid(&id)?;
        let record = company::Entity::find_by_id(company_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| not_found("company"))?;
        if confirm_name != record.name {
            return Err(validation_error(
                "Confirmation text does not match the company name",
            ));
        }
        company::Entity::delete_by_id(company_id)
            .exec(db.as_ref())
            .await
            .map_err(db_error)?;
        info!(deleted_by = %actor.user_id, company = %company_id, "company and its credentials deleted");
        Ok(true)
    }

    #[graphql(name = "createCredential")]
    async fn create_credential(
        &self,
        ctx: &Context<'_>,
        input: NewCredentialInput,
    ) -> async_graphql::Result<CredentialNode> {
        let actor = require(ctx, Action::CreateCredential)?;
        let db = database(ctx)?;
        let company_id = parse_uuid(&input.company)?;
        ensure_company_exists(db.as_ref(), company_id).await?;
        let name = validate_required("name", &input.name, 256)?;
        let login = validate_required("login", &input.login, 256)?;
        let secret = validate_required("secret", &input.secret, 512)?;
        let url = validate_url(input.url)?;
        let now: DateTimeWithTimeZone = Utc::now().into();
        let record = credential::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(company_id),
            name: Set(name),
            kind: Set(kind_to_entity(input.kind)),
            url: Set(url),
            login: Set(login),
            secret: Set(secret),
            created_by: Set(Some(actor.user_id)),
            updated_by: Set(Some(actor.user_id)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db.as_ref())
        .await
        .map_err(db_error)?;
        Ok(record.into())
    }

    /// The owning company is fixed at creation; this mutation deliberately
    /// has no way to move a credential between companies.
    #[graphql(name = "updateCredential")]
    async fn update_credential(
        &self,
        ctx: &Context<'_>,
        input: UpdateCredentialInput,
    ) -> async_graphql::Result<CredentialNode> {
        let actor = require(ctx, Action::UpdateCredential)?;
        let db = database(ctx)?;
        let credential_id = parse_uuid(&input.id)?;
        let record = credential::Entity::find_by_id(credential_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| not_found("credential"))?;
        let mut active: credential::ActiveModel = record.into();
        if let Some(name) = &input.name {
            active.name = Set(validate_required("name", name, 256)?);
        }
        if let Some(kind) = input.kind {
            active.kind = Set(kind_to_entity(kind));
        }
        if let Some(url) = input.url {
            active.url = Set(validate_url(Some(url))?);
        }
        if let Some(login) = &input.login {
            active.login = Set(validate_required("login", login, 256)?);
        }
        if let Some(secret) = &input.secret {
            active.secret = Set(validate_required("secret", secret, 512)?);
        }
        active.updated_by = Set(Some(actor.user_id));
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(db.as_ref()).await.map_err(db_error)?;
        Ok(updated.into())
    }

    #[graphql(name = "deleteCredential")]
    async fn delete_credential(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        require(ctx, Action::DeleteCredential)?;
        let db = database(ctx)?;
        let credential_id = parse_uuid(&id)?;
        credential::Entity::find_by_id(credential_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| not_found("credential"))?;
        credential::Entity::delete_by_id(credential_id)
            .exec(db.as_ref())
            .await
            .map_err(db_error)?;
        Ok(true)
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct UserNode {
    pub id: ID,
    pub email: String,
    #[graphql(name = "displayName")]
    pub display_name: String,
    pub role: UserRole,
    #[graphql(name = "isActive")]
    pub is_active: bool,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl UserNode {
    fn from_model(model: user::Model) -> Self {
        Self {
            id: id_of(model.id),
            email: model.email,
            display_name: model.display_name,
            role: role_from_entity(model.role).into(),
            is_active: model.is_active,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct CompanyNode {
    pub id: ID,
    pub name: String,
    pub description: Option<String>,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<company::Model> for CompanyNode {
    fn from(model: company::Model) -> Self {
        Self {
            id: id_of(model.id),
            name: model.name,
            description: model.description,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct CredentialNode {
    pub id: ID,
    #[graphql(name = "companyId")]
    pub company_id: ID,
    pub name: String,
    pub kind: CredentialKind,
    pub url: Option<String>,
    pub login: String,
    pub secret: String,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<credential::Model> for CredentialNode {
    fn from(model: credential::Model) -> Self {
        Self {
            id: id_of(model.id),
            company_id: id_of(model.company_id),
            name: model.name,
            kind: kind_from_entity(model.kind),
            url: model.url,
            login: model.login,
            secret: model.secret,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct MePayload {
    pub user: UserNode,
    pub role: UserRole,
}

#[derive(Clone, Debug, SimpleObject)]
pub struct AuthPayload {
    pub ok: bool,
    pub user: Option<UserNode>,
    pub error: Option<String>,
}

impl AuthPayload {
    fn failed(message: &str) -> Self {
        Self {
            ok: false,
            user: None,
            error: Some(message.to_string()),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct WorkspacePayload {
    pub companies: Vec<CompanyNode>,
    pub selected: Option<CompanyNode>,
    #[graphql(name = "locationAction")]
    pub location_action: LocationAction,
    #[graphql(name = "locationCompany")]
    pub location_company: Option<ID>,
}

#[derive(InputObject)]
pub struct NewCompanyInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(InputObject)]
pub struct UpdateCompanyInput {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(InputObject)]
pub struct NewCredentialInput {
    pub company: ID,
    pub name: String,
    pub kind: CredentialKind,
    pub url: Option<String>,
    pub login: String,
    pub secret: String,
}

#[derive(InputObject)]
pub struct UpdateCredentialInput {
    pub id: ID,
    pub name: Option<String>,
    pub kind: Option<CredentialKind>,
    pub url: Option<String>,
    pub login: Option<String>,
    pub secret: Option<String>,
}

#[derive(InputObject)]
pub struct InviteUserInput {
    pub email: String,
    #[graphql(name = "displayName")]
    pub display_name: String,
    pub role: UserRole,
}

impl From<UserRole> for Role {
    fn from(value: UserRole) -> Self {
        match value {
            UserRole::Basic => Role::Basic,
            UserRole::Admin => Role::Admin,
            UserRole::SuperAdmin => Role::SuperAdmin,
        }
    }
}

impl From<Role> for UserRole {
    fn from(value: Role) -> Self {
        match value {
            Role::Basic => UserRole::Basic,
            Role::Admin => UserRole::Admin,
            Role::SuperAdmin => UserRole::SuperAdmin,
        }
    }
}

pub fn role_to_entity(role: Role) -> user::Role {
    match role {
        Role::Basic => user::Role::Basic,
        Role::Admin => user::Role::Admin,
        Role::SuperAdmin => user::Role::SuperAdmin,
    }
}

pub fn role_from_entity(role: user::Role) -> Role {
    match role {
        user::Role::Basic => Role::Basic,
        user::Role::Admin => Role::Admin,
        user::Role::SuperAdmin => Role::SuperAdmin,
    }
}

fn kind_to_entity(kind: CredentialKind) -> credential::Kind {
    match kind {
        CredentialKind::Hosting => credential::Kind::Hosting,
        CredentialKind::Server => credential::Kind::Server,
        CredentialKind::DomainRegistrar => credential::Kind::DomainRegistrar,
    }
}

fn kind_from_entity(kind: credential::Kind) -> CredentialKind {
    match kind {
        credential::Kind::Hosting => CredentialKind::Hosting,
        credential::Kind::Server => CredentialKind::Server,
        credential::Kind::DomainRegistrar => CredentialKind::DomainRegistrar,
    }
}

fn database(ctx: &Context<'_>) -> async_graphql::Result<Arc<DatabaseConnection>> {
    ctx.data::<Arc<DatabaseConnection>>()
        .cloned()
        .map_err(|_| upstream_error("missing database connection"))
}

fn auth_config(ctx: &Context<'_>) -> async_graphql::Result<Arc<AuthConfig>> {
    ctx.data::<Arc<AuthConfig>>()
        .cloned()
        .map_err(|_| upstream_error("missing auth configuration"))
}

/// Policy precondition for every guarded operation: nothing below this call
/// may touch the stores when it fails.
fn require(ctx: &Context<'_>, action: Action) -> async_graphql::Result<CurrentUser> {
    let user = ctx.data_opt::<CurrentUser>().cloned();
    let role = user.as_ref().map(|u| u.role);
    match policy::authorize(role, action) {
        Ok(_) => user.ok_or_else(|| ApiError::Unauthenticated.extend()),
        Err(PolicyError::RoleUnknown) => Err(ApiError::Unauthenticated.extend()),
        Err(PolicyError::Denied { .. }) => Err(ApiError::Unauthorized.extend()),
    }
}

fn parse_uuid(id: &ID) -> async_graphql::Result<Uuid> {
    Uuid::parse_str(id.as_str()).map_err(|_| validation_error("Invalid ID"))
}

fn id_of(id: Uuid) -> ID {
    ID(id.to_string())
}

fn db_error(err: DbErr) -> Error {
    ApiError::upstream(err.into()).extend()
}

fn upstream_error(message: &'static str) -> Error {
    ApiError::upstream(anyhow::anyhow!(message)).extend()
}

fn validation_error(message: impl Into<String>) -> Error {
    ApiError::validation(message).extend()
}

fn conflict_error(message: impl Into<String>) -> Error {
    ApiError::conflict(message).extend()
}

fn not_found(what: &'static str) -> Error {
    ApiError::NotFound(what).extend()
}

async fn ensure_company_exists(
    db: &DatabaseConnection,
    company_id: Uuid,
) -> async_graphql::Result<company::Model> {
    company::Entity::find_by_id(company_id)
        .one(db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("company"))
}

async fn load_active_user(
    db: &DatabaseConnection,
    user_id: Uuid,
) -> async_graphql::Result<user::Model> {
    let model = user::Entity::find_by_id(user_id)
        .one(db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::Unauthenticated.extend())?;
    if !model.is_active {
        return Err(ApiError::Unauthorized.extend());
    }
    Ok(model)
}

fn append_session_cookie(ctx: &Context<'_>, token: &str, ttl_minutes: i64) {
    let max_age = (ttl_minutes.max(0) * 60).to_string();
    let cookie = if ttl_minutes < 0 {
        format!(
            "{}=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE
        )
    } else {
        format!(
            "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE, token, max_age
        )
    };
    ctx.append_http_header("Set-Cookie", cookie);
}

fn normalize_email(value: &str) -> async_graphql::Result<String> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() || !trimmed.contains('@') {
        return Err(validation_error("Invalid email address"));
    }
    Ok(trimmed)
}

fn validate_display_name(value: &str) -> async_graphql::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(validation_error("displayName is required"));
    }
    if trimmed.chars().count() > 128 {
        return Err(validation_error("displayName must be <= 128 characters"));
    }
    Ok(trimmed.to_string())
}

fn validate_required(field: &str, value: &str, max: usize) -> async_graphql::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(validation_error(format!("{} is required", field)));
    }
    if trimmed.chars().count() > max {
        return Err(validation_error(format!(
            "{} must be <= {} characters",
            field, max
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_url(value: Option<String>) -> async_graphql::Result<Option<String>> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(validation_error("url must start with http:// or https://"));
    }
    if trimmed.chars().count() > 512 {
        return Err(validation_error("url must be <= 512 characters"));
    }
    Ok(Some(trimmed.to_string()))
}

fn validate_password(value: &str) -> async_graphql::Result<String> {
    if value.chars().count() < 6 {
        return Err(validation_error("Password must be at least 6 characters"));
    }
    Ok(value.to_string())
}

fn sanitize_optional_filter(value: Option<String>) -> Option<String> {
    value.and_then(|input| {
        let trimmed = input.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

fn hash_password(password: &str) -> async_graphql::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| upstream_error("failed to hash password"))
}

fn placeholder_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

async fn issue_reset_token<C>(conn: &C, user_id: Uuid, ttl_hours: i64) -> async_graphql::Result<Uuid>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let token = Uuid::new_v4();
    password_reset::ActiveModel {
        id: Set(token),
        user_id: Set(user_id),
        expires_at: Set((now + Duration::hours(ttl_hours.max(1))).into()),
        used_at: Set(None),
        created_at: Set(now.into()),
    }
    .insert(conn)
    .await
    .map_err(db_error)?;
    Ok(token)
}

#[derive(Debug, Clone)]
pub struct SeededRecords {
    pub users: Vec<user::Model>,
    pub companies: Vec<company::Model>,
    pub credentials: Vec<credential::Model>,
}

impl SeededRecords {
    pub fn user_email(&self, email: &str) -> Option<&user::Model> {
        self.users.iter().find(|u| u.email == email)
    }

    pub fn company_named(&self, name: &str) -> Option<&company::Model> {
        self.companies.iter().find(|c| c.name == name)
    }

    pub fn credential_named(&self, name: &str) -> Option<&credential::Model> {
        self.credentials.iter().find(|c| c.name == name)
    }
}

/// Demo fixtures for local development (`credvault seed`).
pub async fn seed_demo(db: &DatabaseConnection) -> Result<SeededRecords, DbErr> {
    let seeded_at: DateTimeWithTimeZone = Utc::now().into();
    let root = insert_seed_user(
        db,
        "root@example.com",
        "Root Rivera",
        user::Role::SuperAdmin,
        "rootpass",
    )
    .await?;
    let admin = insert_seed_user(
        db,
        "admin@example.com",
        "Admin Alves",
        user::Role::Admin,
        "adminpass",
    )
    .await?;
    let viewer = insert_seed_user(
        db,
        "viewer@example.com",
        "Viewer Vaz",
        user::Role::Basic,
        "viewerpass",
    )
    .await?;

    let acme = company::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("ACME, Inc.".into()),
        description: Set(Some("Flagship customer".into())),
        created_by: Set(Some(root.id)),
        updated_by: Set(Some(root.id)),
        created_at: Set(seeded_at),
        updated_at: Set(seeded_at),
    }
    .insert(db)
    .await?;

    let beta = company::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Beta Labs".into()),
        description: Set(None),
        created_by: Set(Some(admin.id)),
        updated_by: Set(Some(admin.id)),
        created_at: Set(seeded_at),
        updated_at: Set(seeded_at),
    }
    .insert(db)
    .await?;

    let mut credentials = Vec::new();
    for (company_id, name, kind, url, login) in [
        (
            acme.id,
            "Primary hosting",
            credential::Kind::Hosting,
            Some("https://panel.acme.test"),
            "acme-admin",
        ),
        (
            acme.id,
            "Backup server",
            credential::Kind::Server,
            None,
            "root",
        ),
        (
            beta.id,
            "Domain registrar",
            credential::Kind::DomainRegistrar,
            Some("https://registrar.test"),
            "beta-ops",
        ),
    ] {
        let record = credential::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(company_id),
            name: Set(name.into()),
            kind: Set(kind),
            url: Set(url.map(Into::into)),
            login: Set(login.into()),
            secret: Set("change-me".into()),
            created_by: Set(Some(admin.id)),
            updated_by: Set(Some(admin.id)),
            created_at: Set(seeded_at),
            updated_at: Set(seeded_at),
        }
        .insert(db)
        .await?;
        credentials.push(record);
    }

    Ok(SeededRecords {
        users: vec![root, admin, viewer],
        companies: vec![acme, beta],
        credentials,
    })
}

async fn insert_seed_user(
    db: &DatabaseConnection,
    email: &str,
    display_name: &str,
    role: user::Role,
    password: &str,
) -> Result<user::Model, DbErr> {
    let now: DateTimeWithTimeZone = Utc::now().into();
    let user_id = Uuid::new_v4();
    let record = user::ActiveModel {
        id: Set(user_id),
        email: Set(email.into()),
        display_name: Set(display_name.into()),
        role: Set(role),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    user_identity::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        provider: Set("local".into()),
        subject: Set(email.into()),
        created_at: Set(now),
    }
    .insert(db)
    .await?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| DbErr::Custom(format!("failed to hash seed password: {}", err)))?
        .to_string();
    user_secret::ActiveModel {
        user_id: Set(user_id),
        password_hash: Set(hash),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    Ok(record)
}
