mod common;

use common::{as_user, error_code, insert_user, request, setup};
use entity::{password_reset, user};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;

const LOGIN: &str = r#"
    mutation Login($email: String!, $password: String!) {
        vault {
            login(email: $email, password: $password) {
                ok
                user { id email role }
                error
            }
        }
    }
"#;

const INVITE: &str = r#"
    mutation Invite($input: InviteUserInput!) {
        vault { inviteUser(input: $input) { id email displayName role } }
    }
"#;

const SET_PASSWORD: &str = r#"
    mutation SetPassword($token: String!, $password: String!) {
        vault { setPassword(token: $token, password: $password) }
    }
"#;

#[tokio::test]
async fn login_succeeds_with_valid_credentials() {
    let ctx = setup().await;
    insert_user(
        ctx.db.as_ref(),
        "admin@example.com",
        "Admin",
        user::Role::Admin,
        Some("adminpass"),
    )
    .await;

    let resp = ctx
        .schema
        .execute(request(
            LOGIN,
            json!({ "email": "Admin@Example.com ", "password": "adminpass" }),
        ))
        .await;
    assert!(resp.errors.is_empty(), "unexpected errors: {:?}", resp.errors);
    let data = resp.data.into_json().unwrap();
    let payload = &data["vault"]["login"];
    assert_eq!(payload["ok"], true);
    assert_eq!(payload["user"]["email"], "admin@example.com");
    assert_eq!(payload["user"]["role"], "ADMIN");
}

#[tokio::test]
async fn login_fails_closed_on_wrong_password() {
    let ctx = setup().await;
    insert_user(
        ctx.db.as_ref(),
        "admin@example.com",
        "Admin",
        user::Role::Admin,
        Some("adminpass"),
    )
    .await;

    let resp = ctx
        .schema
        .execute(request(
            LOGIN,
            json!({ "email": "admin@example.com", "password": "wrong" }),
        ))
        .await;
    assert!(resp.errors.is_empty());
    let data = resp.data.into_json().unwrap();
    let payload = &data["vault"]["login"];
    assert_eq!(payload["ok"], false);
    assert_eq!(payload["error"], "Invalid credentials");
    assert!(payload["user"].is_null());
}

#[tokio::test]
async fn invite_requires_super_admin() {
    let ctx = setup().await;
    let admin = insert_user(ctx.db.as_ref(), "admin@example.com", "Admin", user::Role::Admin, None).await;
    let vars = json!({ "input": {
        "email": "new@example.com",
        "displayName": "New User",
        "role": "BASIC"
    }});
    let resp = ctx.schema.execute(as_user(request(INVITE, vars), &admin)).await;
    assert_eq!(error_code(&resp).as_deref(), Some("UNAUTHORIZED"));
}

#[tokio::test]
async fn invite_rejects_addresses_outside_the_org_domain() {
    let ctx = setup().await;
    let root = insert_user(ctx.db.as_ref(), "root@example.com", "Root", user::Role::SuperAdmin, None).await;
    let vars = json!({ "input": {
        "email": "someone@elsewhere.net",
        "displayName": "Outsider",
        "role": "BASIC"
    }});
    let resp = ctx.schema.execute(as_user(request(INVITE, vars), &root)).await;
    assert_eq!(error_code(&resp).as_deref(), Some("VALIDATION"));
    let count = user::Entity::find().count(ctx.db.as_ref()).await.unwrap();
    assert_eq!(count, 1, "no account may be created for a rejected invite");
}

#[tokio::test]
async fn invite_conflicts_on_registered_email() {
    let ctx = setup().await;
    let root = insert_user(ctx.db.as_ref(), "root@example.com", "Root", user::Role::SuperAdmin, None).await;
    insert_user(ctx.db.as_ref(), "taken@example.com", "Taken", user::Role::Basic, None).await;
    let vars = json!({ "input": {
        "email": "taken@example.com",
        "displayName": "Duplicate",
        "role": "BASIC"
    }});
    let resp = ctx.schema.execute(as_user(request(INVITE, vars), &root)).await;
    assert_eq!(error_code(&resp).as_deref(), Some("CONFLICT"));
}

#[tokio::test]
async fn invite_then_set_password_then_login() {
    let ctx = setup().await;
    let root = insert_user(ctx.db.as_ref(), "root@example.com", "Root", user::Role::SuperAdmin, None).await;

    let vars = json!({ "input": {
        "email": "new@example.com",
        "displayName": "New User",
        "role": "ADMIN"
    }});
    let resp = ctx.schema.execute(as_user(request(INVITE, vars), &root)).await;
    assert!(resp.errors.is_empty(), "unexpected errors: {:?}", resp.errors);
    let data = resp.data.into_json().unwrap();
    assert_eq!(data["vault"]["inviteUser"]["role"], "ADMIN");
    let invited_id =
        uuid::Uuid::parse_str(data["vault"]["inviteUser"]["id"].as_str().unwrap()).unwrap();

    // The invitation is a single-use reset token delivered out of band.
    let reset = password_reset::Entity::find()
        .filter(password_reset::Column::UserId.eq(invited_id))
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .expect("invite must create a reset token");
    assert!(reset.used_at.is_none());

    let resp = ctx
        .schema
        .execute(request(
            SET_PASSWORD,
            json!({ "token": reset.id, "password": "secret1" }),
        ))
        .await;
    assert!(resp.errors.is_empty(), "unexpected errors: {:?}", resp.errors);

    // Token is consumed.
    let resp = ctx
        .schema
        .execute(request(
            SET_PASSWORD,
            json!({ "token": reset.id, "password": "secret2" }),
        ))
        .await;
    assert_eq!(error_code(&resp).as_deref(), Some("VALIDATION"));

    let resp = ctx
        .schema
        .execute(request(
            LOGIN,
            json!({ "email": "new@example.com", "password": "secret1" }),
        ))
        .await;
    assert!(resp.errors.is_empty());
    let data = resp.data.into_json().unwrap();
    assert_eq!(data["vault"]["login"]["ok"], true);
}

#[tokio::test]
async fn set_password_enforces_minimum_length() {
    let ctx = setup().await;
    let resp = ctx
        .schema
        .execute(request(
            SET_PASSWORD,
            json!({ "token": uuid::Uuid::new_v4(), "password": "short" }),
        ))
        .await;
    assert_eq!(error_code(&resp).as_deref(), Some("VALIDATION"));
}

#[tokio::test]
async fn password_reset_request_does_not_reveal_accounts() {
    let ctx = setup().await;
    let doc = r#"
        mutation Reset($email: String!) { vault { requestPasswordReset(email: $email) } }
    "#;
    let resp = ctx
        .schema
        .execute(request(doc, json!({ "email": "ghost@example.com" })))
        .await;
    assert!(resp.errors.is_empty());
    let data = resp.data.into_json().unwrap();
    assert_eq!(data["vault"]["requestPasswordReset"], true);
    let tokens = password_reset::Entity::find()
        .count(ctx.db.as_ref())
        .await
        .unwrap();
    assert_eq!(tokens, 0, "no token for an unknown address");
}

#[tokio::test]
async fn role_changes_are_super_admin_only() {
    let ctx = setup().await;
    let root = insert_user(ctx.db.as_ref(), "root@example.com", "Root", user::Role::SuperAdmin, None).await;
    let admin = insert_user(ctx.db.as_ref(), "admin@example.com", "Admin", user::Role::Admin, None).await;
    let target = insert_user(ctx.db.as_ref(), "viewer@example.com", "Viewer", user::Role::Basic, None).await;

    let doc = r#"
        mutation SetRole($id: ID!, $role: UserRole!) {
            vault { updateUserRole(id: $id, role: $role) { id role } }
        }
    "#;

    let resp = ctx
        .schema
        .execute(as_user(
            request(doc, json!({ "id": target.id, "role": "ADMIN" })),
            &admin,
        ))
        .await;
    assert_eq!(error_code(&resp).as_deref(), Some("UNAUTHORIZED"));

    let resp = ctx
        .schema
        .execute(as_user(
            request(doc, json!({ "id": target.id, "role": "ADMIN" })),
            &root,
        ))
        .await;
    assert!(resp.errors.is_empty(), "unexpected errors: {:?}", resp.errors);
    let data = resp.data.into_json().unwrap();
    assert_eq!(data["vault"]["updateUserRole"]["role"], "ADMIN");

    let saved = user::Entity::find_by_id(target.id)
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.role, user::Role::Admin);
}

#[tokio::test]
async fn user_listing_is_super_admin_only() {
    let ctx = setup().await;
    let root = insert_user(ctx.db.as_ref(), "root@example.com", "Root", user::Role::SuperAdmin, None).await;
    let viewer = insert_user(ctx.db.as_ref(), "viewer@example.com", "Viewer", user::Role::Basic, None).await;

    let doc = r#"
        query Users($q: String) { vault { users(q: $q) { email role } } }
    "#;

    let resp = ctx
        .schema
        .execute(as_user(request(doc, json!({})), &viewer))
        .await;
    assert_eq!(error_code(&resp).as_deref(), Some("UNAUTHORIZED"));

    let resp = ctx
        .schema
        .execute(as_user(request(doc, json!({ "q": "VIEW" })), &root))
        .await;
    assert!(resp.errors.is_empty(), "unexpected errors: {:?}", resp.errors);
    let data = resp.data.into_json().unwrap();
    let items = data["vault"]["users"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["email"], "viewer@example.com");
}

#[tokio::test]
async fn me_reflects_the_directory_role() {
    let ctx = setup().await;
    let admin = insert_user(ctx.db.as_ref(), "admin@example.com", "Admin", user::Role::Admin, None).await;
    let doc = r#"
        query Me { vault { me { role user { email displayName } } } }
    "#;
    let resp = ctx
        .schema
        .execute(as_user(request(doc, json!({})), &admin))
        .await;
    assert!(resp.errors.is_empty(), "unexpected errors: {:?}", resp.errors);
    let data = resp.data.into_json().unwrap();
    assert_eq!(data["vault"]["me"]["role"], "ADMIN");
    assert_eq!(data["vault"]["me"]["user"]["email"], "admin@example.com");
}
