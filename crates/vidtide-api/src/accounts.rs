use std::path::{Path, PathBuf};

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::{
    Extension,
    body::Bytes,
    extract::{Multipart, State, multipart::Field},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::{info, warn};
use uuid::Uuid;

use vidtide_db::models::{NewUser, UserRow};
use vidtide_media::stage_to_spool;
use vidtide_types::api::{
    AuthPayload, ChangePasswordRequest, LoginRequest, RefreshRequest, UpdateDetailsRequest,
};

use crate::error::{ApiError, parse_json, respond};
use crate::middleware::{ACCESS_COOKIE, CurrentUser, REFRESH_COOKIE};
use crate::token::TokenPair;
use crate::{AppState, run_store, user_view};

// -- Registration --

struct RegisterInput {
    display_name: String,
    email: String,
    handle: String,
    password: String,
    avatar: PathBuf,
    cover_image: Option<PathBuf>,
}

pub async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let input = parse_register(&state, multipart).await?;

    // Conflict check happens before any media leaves the spool.
    let existing = {
        let store = state.store.clone();
        let handle = input.handle.clone();
        let email = input.email.clone();
        run_store(move || {
            if let Some(user) = store.find_by_handle_or_email(&handle)? {
                return Ok(Some(user));
            }
            store.find_by_handle_or_email(&email)
        })
        .await?
    };
    if existing.is_some() {
        discard_staged([Some(input.avatar.as_path()), input.cover_image.as_deref()]).await;
        return Err(ApiError::Conflict(
            "user with this handle or email already exists".into(),
        ));
    }

    // The avatar is mandatory: a failed upload aborts the whole registration
    // with nothing persisted.
    let avatar = match state.media.upload(&input.avatar).await {
        Ok(stored) => stored,
        Err(e) => {
            discard_staged([input.cover_image.as_deref()]).await;
            return Err(ApiError::internal(e.context("avatar upload failed")));
        }
    };

    // A failed optional cover upload is tolerated; the field stays empty.
    let cover_url = match input.cover_image {
        Some(staged) => match state.media.upload(&staged).await {
            Ok(stored) => stored.url,
            Err(e) => {
                warn!("Cover image upload failed, continuing without: {e:#}");
                String::new()
            }
        },
        None => String::new(),
    };

    let new_user = NewUser {
        id: Uuid::new_v4().to_string(),
        handle: input.handle,
        email: input.email,
        display_name: input.display_name,
        password: hash_password(&input.password)?,
        avatar_url: avatar.url.clone(),
        cover_image_url: cover_url.clone(),
    };

    let created = {
        let store = state.store.clone();
        run_store(move || store.create_user(&new_user)).await
    };
    let created = match created {
        Ok(row) => row,
        Err(err) => {
            // Keep the media store consistent with the database.
            remove_media(&state, &avatar.url).await;
            if !cover_url.is_empty() {
                remove_media(&state, &cover_url).await;
            }
            return Err(err);
        }
    };

    info!("Registered user {} ({})", created.handle, created.id);
    Ok(respond(
        StatusCode::CREATED,
        user_view(&created),
        "user registered successfully",
    ))
}

#[derive(Default)]
struct RegisterParts {
    display_name: Option<String>,
    email: Option<String>,
    handle: Option<String>,
    password: Option<String>,
    avatar: Option<PathBuf>,
    cover_image: Option<PathBuf>,
}

async fn parse_register(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<RegisterInput, ApiError> {
    let mut parts = RegisterParts::default();

    let collected: Result<(), ApiError> = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::Validation(format!("malformed multipart body: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                return Err(ApiError::Validation("unnamed multipart field".into()));
            };
            match name.as_str() {
                "displayName" => parts.display_name = Some(text_field(field, &name).await?),
                "email" => parts.email = Some(text_field(field, &name).await?),
                "handle" => parts.handle = Some(text_field(field, &name).await?),
                "password" => parts.password = Some(text_field(field, &name).await?),
                "avatar" => parts.avatar = Some(stage_field(state, field).await?),
                "coverImage" => parts.cover_image = Some(stage_field(state, field).await?),
                other => {
                    return Err(ApiError::Validation(format!("unknown field: {other}")));
                }
            }
        }
        Ok(())
    }
    .await;

    if let Err(err) = collected {
        discard_staged([parts.avatar.as_deref(), parts.cover_image.as_deref()]).await;
        return Err(err);
    }

    let validated = validate_register_text(&mut parts);
    let (display_name, email, handle, password) = match validated {
        Ok(texts) => texts,
        Err(err) => {
            discard_staged([parts.avatar.as_deref(), parts.cover_image.as_deref()]).await;
            return Err(err);
        }
    };

    let Some(avatar) = parts.avatar.take() else {
        discard_staged([parts.cover_image.as_deref()]).await;
        return Err(ApiError::Validation("avatar file is required".into()));
    };

    Ok(RegisterInput {
        display_name,
        email,
        handle,
        password,
        avatar,
        cover_image: parts.cover_image.take(),
    })
}

fn validate_register_text(
    parts: &mut RegisterParts,
) -> Result<(String, String, String, String), ApiError> {
    let display_name = required_text(parts.display_name.take(), "displayName")?;
    let email = required_text(parts.email.take(), "email")?.to_lowercase();
    let handle = required_text(parts.handle.take(), "handle")?.to_lowercase();
    let password = parts
        .password
        .take()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::Validation("password is required".into()))?;

    if !(3..=32).contains(&handle.chars().count()) {
        return Err(ApiError::Validation(
            "handle must be between 3 and 32 characters".into(),
        ));
    }
    if password.chars().count() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    Ok((display_name, email, handle, password))
}

// -- Login / logout / refresh --

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: LoginRequest = parse_json(&body)?;
    let identifier = req.identifier.trim().to_lowercase();
    if identifier.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation(
            "identifier and password are required".into(),
        ));
    }

    let user = {
        let store = state.store.clone();
        let identifier = identifier.clone();
        run_store(move || store.find_by_handle_or_email(&identifier)).await?
    }
    .ok_or_else(|| ApiError::NotFound("user does not exist".into()))?;

    if !password_matches(&req.password, &user.password)? {
        return Err(ApiError::Unauthorized("invalid credentials".into()));
    }

    let (pair, user) = state.tokens.issue_pair(state.store.clone(), &user.id).await?;
    info!("User {} logged in", user.handle);

    Ok(session_response(jar, pair, &user, "login successful"))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    state
        .tokens
        .invalidate(state.store.clone(), &current.id)
        .await?;

    let jar = jar
        .remove(removal_cookie(ACCESS_COOKIE))
        .remove(removal_cookie(REFRESH_COOKIE));
    Ok((
        jar,
        respond(StatusCode::OK, serde_json::Value::Null, "logged out"),
    ))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let presented = match jar.get(REFRESH_COOKIE) {
        Some(cookie) => Some(cookie.value().to_string()),
        None if body.is_empty() => None,
        None => parse_json::<RefreshRequest>(&body)?.refresh_token,
    }
    .ok_or_else(|| ApiError::Unauthorized("missing refresh token".into()))?;

    let (pair, user) = state.tokens.rotate(state.store.clone(), &presented).await?;

    Ok(session_response(jar, pair, &user, "token refreshed"))
}

// -- Account maintenance --

pub async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: ChangePasswordRequest = parse_json(&body)?;
    if req.new_password.chars().count() < 8 {
        return Err(ApiError::Validation(
            "new password must be at least 8 characters".into(),
        ));
    }

    let user = {
        let store = state.store.clone();
        let id = current.id.clone();
        run_store(move || store.find_by_id(&id)).await?
    }
    .ok_or_else(|| ApiError::Unauthorized("user no longer exists".into()))?;

    if !password_matches(&req.old_password, &user.password)? {
        return Err(ApiError::Unauthorized("old password is incorrect".into()));
    }

    let hash = hash_password(&req.new_password)?;
    {
        let store = state.store.clone();
        let id = current.id.clone();
        run_store(move || store.update_password(&id, &hash)).await?;
    }

    Ok(respond(
        StatusCode::OK,
        serde_json::Value::Null,
        "password changed",
    ))
}

pub async fn current_user(
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(respond(
        StatusCode::OK,
        current.user.clone(),
        "current user fetched",
    ))
}

pub async fn update_details(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: UpdateDetailsRequest = parse_json(&body)?;
    let display_name = req.display_name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    if display_name.is_empty() || email.is_empty() {
        return Err(ApiError::Validation(
            "displayName and email are required".into(),
        ));
    }

    let updated = {
        let store = state.store.clone();
        let id = current.id.clone();
        run_store(move || store.update_details(&id, &display_name, &email)).await?
    };

    Ok(respond(StatusCode::OK, user_view(&updated), "details updated"))
}

#[derive(Clone, Copy)]
enum MediaSlot {
    Avatar,
    Cover,
}

pub async fn update_avatar(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let updated = replace_media(&state, &current, multipart, MediaSlot::Avatar).await?;
    Ok(respond(StatusCode::OK, user_view(&updated), "avatar updated"))
}

pub async fn update_cover_image(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let updated = replace_media(&state, &current, multipart, MediaSlot::Cover).await?;
    Ok(respond(
        StatusCode::OK,
        user_view(&updated),
        "cover image updated",
    ))
}

async fn replace_media(
    state: &AppState,
    current: &CurrentUser,
    multipart: Multipart,
    slot: MediaSlot,
) -> Result<UserRow, ApiError> {
    let field_name = match slot {
        MediaSlot::Avatar => "avatar",
        MediaSlot::Cover => "coverImage",
    };
    let staged = single_file(state, multipart, field_name).await?;

    let stored = state
        .media
        .upload(&staged)
        .await
        .map_err(|e| ApiError::internal(e.context(format!("{field_name} upload failed"))))?;

    let result = {
        let store = state.store.clone();
        let id = current.id.clone();
        let url = stored.url.clone();
        run_store(move || match slot {
            MediaSlot::Avatar => store.update_avatar(&id, &url),
            MediaSlot::Cover => store.update_cover_image(&id, &url),
        })
        .await
    };

    match result {
        Ok(row) => Ok(row),
        Err(err) => {
            // The upload succeeded but the record write did not; undo the
            // upload so the two stores cannot drift.
            remove_media(state, &stored.url).await;
            Err(err)
        }
    }
}

async fn single_file(
    state: &AppState,
    mut multipart: Multipart,
    expected: &str,
) -> Result<PathBuf, ApiError> {
    let mut staged: Option<PathBuf> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some(name) if name == expected => {
                if staged.is_some() {
                    discard_staged([staged.as_deref()]).await;
                    return Err(ApiError::Validation(format!("duplicate {expected} field")));
                }
                staged = Some(stage_field(state, field).await?);
            }
            other => {
                let other = other.unwrap_or("<unnamed>").to_string();
                discard_staged([staged.as_deref()]).await;
                return Err(ApiError::Validation(format!("unknown field: {other}")));
            }
        }
    }

    staged.ok_or_else(|| ApiError::Validation(format!("{expected} file is required")))
}

// -- Helpers --

async fn text_field(field: Field<'_>, name: &str) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::Validation(format!("unreadable field {name}: {e}")))
}

fn required_text(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{name} is required")))
}

async fn stage_field(state: &AppState, field: Field<'_>) -> Result<PathBuf, ApiError> {
    let field_name = field.name().unwrap_or("file").to_string();
    let original_name = field.file_name().unwrap_or("upload").to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::Validation(format!("unreadable file field {field_name}: {e}")))?;
    if bytes.is_empty() {
        return Err(ApiError::Validation(format!("{field_name} file is empty")));
    }
    stage_to_spool(&state.spool_dir, &original_name, &bytes)
        .await
        .map_err(ApiError::internal)
}

async fn discard_staged<const N: usize>(staged: [Option<&Path>; N]) {
    for path in staged.into_iter().flatten() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to discard staged file {}: {}", path.display(), e);
            }
        }
    }
}

async fn remove_media(state: &AppState, url: &str) {
    if let Err(e) = state.media.remove(url).await {
        warn!("Failed to remove media object {url}: {e:#}");
    }
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::internal(anyhow::anyhow!("password hashing failed: {e}")))
}

fn password_matches(password: &str, hash: &str) -> Result<bool, ApiError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| ApiError::internal(anyhow::anyhow!("corrupt password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn session_response(jar: CookieJar, pair: TokenPair, user: &UserRow, message: &str) -> Response {
    let jar = jar
        .add(auth_cookie(ACCESS_COOKIE, pair.access_token.clone()))
        .add(auth_cookie(REFRESH_COOKIE, pair.refresh_token.clone()));
    let payload = AuthPayload {
        user: user_view(user),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    };
    (jar, respond(StatusCode::OK, payload, message)).into_response()
}

fn auth_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}
