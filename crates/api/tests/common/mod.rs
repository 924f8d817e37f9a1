#![allow(dead_code)]

use std::sync::Arc;

use api::auth::{AuthConfig, CurrentUser};
use api::schema::{build_schema, role_from_entity, AppSchema};
use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::Argon2;
use async_graphql::{EmptySubscription, Request, Schema, Variables};
use chrono::Utc;
use entity::{company, credential, user, user_identity, user_secret};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, Database, DatabaseBackend,
    DatabaseConnection, Statement,
};
use uuid::Uuid;

pub type TestSchema =
    Schema<api::schema::QueryRoot, api::schema::MutationRoot, EmptySubscription>;

pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
    pub schema: TestSchema,
}

pub fn test_auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: "test-secret".into(),
        session_ttl_minutes: 15,
        invite_email_domain: "@example.com".into(),
        reset_ttl_hours: 48,
    }
}

pub async fn setup() -> TestContext {
    let conn = Database::connect("sqlite::memory:").await.unwrap();
    let db = Arc::new(conn);
    bootstrap_sqlite(db.as_ref()).await;
    let AppSchema(schema) = build_schema(db.clone(), Arc::new(test_auth_config()));
    TestContext { db, schema }
}

async fn bootstrap_sqlite(db: &DatabaseConnection) {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await
    .unwrap();

    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        r#"
        CREATE TABLE app_user (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'BASIC',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    ))
    .await
    .unwrap();

    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        r#"
        CREATE TABLE user_identity (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            subject TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES app_user(id) ON DELETE CASCADE
        );
        "#,
    ))
    .await
    .unwrap();

    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        r#"
        CREATE TABLE user_secret (
            user_id TEXT PRIMARY KEY,
            password_hash TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES app_user(id) ON DELETE CASCADE
        );
        "#,
    ))
    .await
    .unwrap();

    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        r#"
        CREATE TABLE password_reset (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            used_at TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES app_user(id) ON DELETE CASCADE
        );
        "#,
    ))
    .await
    .unwrap();

    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        r#"
        CREATE TABLE company (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            created_by TEXT,
            updated_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    ))
    .await
    .unwrap();

    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        r#"
        CREATE TABLE credential (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            url TEXT,
            login TEXT NOT NULL,
            secret TEXT NOT NULL,
            created_by TEXT,
            updated_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(company_id) REFERENCES company(id) ON DELETE CASCADE
        );
        "#,
    ))
    .await
    .unwrap();
}

pub async fn insert_user(
    db: &DatabaseConnection,
    email: &str,
    display_name: &str,
    role: user::Role,
    password: Option<&str>,
) -> user::Model {
    let now = Utc::now().into();
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
    .await
    .unwrap();
    user_identity::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        provider: Set("local".into()),
        subject: Set(email.into()),
        created_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap();
    if let Some(password) = password {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string();
        user_secret::ActiveModel {
            user_id: Set(user_id),
            password_hash: Set(hash),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .unwrap();
    }
    record
}

pub async fn insert_company(db: &DatabaseConnection, name: &str) -> company::Model {
    let now = Utc::now().into();
    company::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.into()),
        description: Set(None),
        created_by: Set(None),
        updated_by: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_credential(
    db: &DatabaseConnection,
    company_id: Uuid,
    name: &str,
    kind: credential::Kind,
    login: &str,
) -> credential::Model {
    let now = Utc::now().into();
    credential::ActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(company_id),
        name: Set(name.into()),
        kind: Set(kind),
        url: Set(None),
        login: Set(login.into()),
        secret: Set("hunter2".into()),
        created_by: Set(None),
        updated_by: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub fn request(doc: &str, vars: serde_json::Value) -> Request {
    Request::new(doc).variables(Variables::from_json(vars))
}

/// Attach an authenticated caller the way the server does after decoding
/// the session token.
pub fn as_user(req: Request, user: &user::Model) -> Request {
    req.data(CurrentUser {
        user_id: user.id,
        role: role_from_entity(user.role),
    })
}

pub fn error_code(resp: &async_graphql::Response) -> Option<String> {
    let err = resp.errors.first()?;
    let ext = err.extensions.as_ref()?;
    let value = serde_json::to_value(ext).ok()?;
    value
        .get("code")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
