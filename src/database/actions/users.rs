use chrono::Duration;

use crate::{
    actions::authorize,
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::{generate_jwt_session, SessionData},
    },
    error::{ApiError, QueryError},
    payload::{is_valid_email, normalize_email, Credentials, ProfileChanges, Registration},
    repository::Store,
    schema::{AuthToken, NewUser, User, UserChanges, UserProfile},
};

const EMAIL_TAKEN: &str = "user with this email already exists.";
const INVALID_CREDENTIALS: &str = "Unable to authenticate with provided credentials";

fn email_conflict(e: QueryError) -> ApiError {
    if e.is_unique_violation() {
        ApiError::invalid("email", EMAIL_TAKEN)
    } else {
        e.into()
    }
}

async fn insert_user(store: &dyn Store, user: NewUser) -> Result<User, ApiError> {
    let mut tx = store.begin().await?;

    if tx.get_user_by_email(&user.email).await?.is_some() {
        return Err(ApiError::invalid("email", EMAIL_TAKEN));
    }
    let user = tx.insert_user(user).await.map_err(email_conflict)?;
    tx.commit().await?;

    Ok(user)
}

/// Creates a regular account with a hashed password.
pub async fn register_user(
    store: &dyn Store,
    registration: Registration,
) -> Result<UserProfile, ApiError> {
    let password = hash_password(&registration.password)?;

    let user = insert_user(
        store,
        NewUser {
            email: registration.email,
            password,
            name: registration.name,
            is_staff: false,
            is_superuser: false,
        },
    )
    .await?;
    log::info!("Registered user {}", user.id);

    Ok(user.into())
}

pub async fn create_superuser(
    store: &dyn Store,
    email: &str,
    password: &str,
) -> Result<User, ApiError> {
    if !is_valid_email(email) {
        return Err(ApiError::invalid("email", "Enter a valid email address."));
    }
    if password.is_empty() {
        return Err(ApiError::invalid("password", crate::constants::NOT_BLANK));
    }

    let user = insert_user(
        store,
        NewUser {
            email: normalize_email(email),
            password: hash_password(password)?,
            name: String::new(),
            is_staff: true,
            is_superuser: true,
        },
    )
    .await?;
    log::info!("Created superuser {}", user.id);

    Ok(user)
}

pub async fn login_user(
    store: &dyn Store,
    credentials: Credentials,
    secret: &str,
    lifetime: Duration,
) -> Result<AuthToken, ApiError> {
    let mut tx = store.begin().await?;
    let user = tx.get_user_by_email(&credentials.email).await?;
    drop(tx);

    let user = match user {
        Some(user) if user.is_active => user,
        _ => return Err(ApiError::invalid("non_field_errors", INVALID_CREDENTIALS)),
    };

    if !verify_password(&credentials.password, &user.password)? {
        return Err(ApiError::invalid("non_field_errors", INVALID_CREDENTIALS));
    }

    let token = generate_jwt_session(&user, secret, lifetime)?;

    Ok(AuthToken { token })
}

pub async fn get_profile(store: &dyn Store, session: &SessionData) -> Result<UserProfile, ApiError> {
    let mut tx = store.begin().await?;
    let user = authorize(tx.as_mut(), session).await?;
    drop(tx);

    Ok(user.into())
}

pub async fn update_profile(
    store: &dyn Store,
    session: &SessionData,
    changes: ProfileChanges,
) -> Result<UserProfile, ApiError> {
    let password = changes.password.as_deref().map(hash_password).transpose()?;

    let mut tx = store.begin().await?;
    let user = authorize(tx.as_mut(), session).await?;

    if let Some(email) = &changes.email {
        if let Some(other) = tx.get_user_by_email(email).await? {
            if other.id != user.id {
                return Err(ApiError::invalid("email", EMAIL_TAKEN));
            }
        }
    }

    let updated = tx
        .update_user(
            user.id,
            UserChanges {
                email: changes.email,
                name: changes.name,
                password,
            },
        )
        .await
        .map_err(email_conflict)?
        .ok_or(ApiError::NotFound)?;
    tx.commit().await?;

    Ok(updated.into())
}

/// Deletes the caller along with their recipes, tags and ingredients.
pub async fn delete_account(store: &dyn Store, session: &SessionData) -> Result<(), ApiError> {
    let mut tx = store.begin().await?;
    let user = authorize(tx.as_mut(), session).await?;

    tx.delete_user(user.id).await?;
    tx.commit().await?;
    log::info!("Deleted user {}", user.id);

    Ok(())
}
