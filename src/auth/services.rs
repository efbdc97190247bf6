use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::dto::{ProfileUpdate, RegisterRequest};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::repo::UserRepo;
use crate::auth::repo_types::{NewUser, User, UserChanges};
use crate::error::{single_field, AppError, FieldErrors};
use crate::store::StoreError;

pub const MIN_PASSWORD_LEN: usize = 5;
const MAX_FIELD_LEN: usize = 255;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Lowercases the domain part only; the local part is kept as given.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Creates a regular account. An empty email is rejected before anything
/// is written.
pub async fn create_user(
    repo: &dyn UserRepo,
    email: &str,
    password: &str,
    name: &str,
) -> Result<User, AppError> {
    insert_account(repo, email, password, name, false).await
}

/// Same as [`create_user`] with `is_staff` and `is_superuser` set.
pub async fn create_superuser(
    repo: &dyn UserRepo,
    email: &str,
    password: &str,
    name: &str,
) -> Result<User, AppError> {
    insert_account(repo, email, password, name, true).await
}

async fn insert_account(
    repo: &dyn UserRepo,
    email: &str,
    password: &str,
    name: &str,
    elevated: bool,
) -> Result<User, AppError> {
    if email.trim().is_empty() {
        return Err(single_field("email", "Users must have an email address."));
    }

    let new = NewUser {
        email: normalize_email(email),
        name: name.trim().to_string(),
        password_hash: hash_password(password)?,
        is_staff: elevated,
        is_superuser: elevated,
    };

    let user = repo.insert_user(new).await.map_err(email_conflict)?;
    info!(user_id = %user.id, email = %user.email, superuser = elevated, "user created");
    Ok(user)
}

/// Validates a registration payload and creates the account.
pub async fn register(repo: &dyn UserRepo, req: RegisterRequest) -> Result<User, AppError> {
    let mut errors = FieldErrors::new();

    let email = required(&mut errors, "email", req.email.as_deref());
    if let Some(email) = &email {
        check_email(&mut errors, email);
    }
    let name = required(&mut errors, "name", req.name.as_deref());
    if let Some(name) = &name {
        check_len(&mut errors, "name", name);
    }
    let password = required(&mut errors, "password", req.password.as_deref());
    if let Some(password) = &password {
        check_password(&mut errors, password);
    }
    errors.into_result()?;

    // all three are present once validation passed
    let (Some(email), Some(name), Some(password)) = (email, name, password) else {
        return Err(AppError::BadRequest("Invalid input.".into()));
    };
    create_user(repo, &email, &password, &name).await
}

/// Checks credentials. Unknown email, wrong password and inactive accounts
/// all produce the same error.
pub async fn authenticate(repo: &dyn UserRepo, email: &str, password: &str) -> Result<User, AppError> {
    let mut errors = FieldErrors::new();
    if email.trim().is_empty() {
        errors.add("email", "This field may not be blank.");
    }
    if password.is_empty() {
        errors.add("password", "This field may not be blank.");
    }
    errors.into_result()?;

    let email = normalize_email(email);
    let Some(user) = repo.find_user_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }
    if !user.is_active {
        warn!(user_id = %user.id, "login inactive user");
        return Err(AppError::InvalidCredentials);
    }

    Ok(user)
}

pub async fn load_user(repo: &dyn UserRepo, user_id: Uuid) -> Result<User, AppError> {
    repo.find_user(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found.".into()))
}

/// PUT (`full`) requires email and name; PATCH takes any subset. A new
/// password is re-hashed.
pub async fn update_profile(
    repo: &dyn UserRepo,
    user_id: Uuid,
    update: ProfileUpdate,
    full: bool,
) -> Result<User, AppError> {
    let mut errors = FieldErrors::new();

    let email = if full {
        required(&mut errors, "email", update.email.as_deref())
    } else {
        update.email.clone()
    };
    if let Some(email) = &email {
        check_email(&mut errors, email);
    }

    let name = if full {
        required(&mut errors, "name", update.name.as_deref())
    } else {
        update.name.clone()
    };
    if let Some(name) = &name {
        if name.trim().is_empty() {
            errors.add("name", "This field may not be blank.");
        }
        check_len(&mut errors, "name", name);
    }

    if let Some(password) = &update.password {
        check_password(&mut errors, password);
    }
    errors.into_result()?;

    let password_hash = match update.password.as_deref() {
        Some(p) => Some(hash_password(p)?),
        None => None,
    };

    let changes = UserChanges {
        email: email.map(|e| normalize_email(&e)),
        name: name.map(|n| n.trim().to_string()),
        password_hash,
    };

    let user = repo
        .update_user(user_id, changes)
        .await
        .map_err(email_conflict)?
        .ok_or_else(|| AppError::Unauthorized("User not found.".into()))?;
    info!(user_id = %user.id, "profile updated");
    Ok(user)
}

fn email_conflict(e: StoreError) -> AppError {
    match e {
        StoreError::Conflict(_) => single_field("email", "user with this email already exists."),
        other => other.into(),
    }
}

fn required(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<String> {
    match value {
        None => {
            errors.add(field, "This field is required.");
            None
        }
        Some(v) if v.trim().is_empty() => {
            errors.add(field, "This field may not be blank.");
            None
        }
        Some(v) => Some(v.to_string()),
    }
}

fn check_email(errors: &mut FieldErrors, email: &str) {
    if !is_valid_email(email.trim()) {
        errors.add("email", "Enter a valid email address.");
    }
    check_len(errors, "email", email);
}

fn check_len(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.chars().count() > MAX_FIELD_LEN {
        errors.add(
            field,
            format!("Ensure this field has no more than {MAX_FIELD_LEN} characters."),
        );
    }
}

fn check_password(errors: &mut FieldErrors, password: &str) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("Ensure this field has at least {MIN_PASSWORD_LEN} characters."),
        );
    }
}
