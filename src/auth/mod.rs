// src/auth/mod.rs
//
// Сессия пользователя: вход, регистрация, выход, восстановление из хранилища
// сессии и обновление access-токена.

pub mod mock_api;
pub mod session;

use log::{error, info, warn};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::auth::mock_api::{AuthResponse, Credentials, MockAuthApi};
use crate::auth::session::{KeyValueArea, SessionError, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};
use crate::db::error::{StoreError, ValidationError};
use crate::db::user::{User, UserRepo};
use crate::validator;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("wrong login or password")]
    InvalidCredentials,

    #[error("email is already registered")]
    EmailTaken,

    #[error("name is already registered")]
    NameTaken,

    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("refresh token is not valid")]
    InvalidRefreshToken,

    #[error("account registry is corrupt: {0}")]
    CorruptAccounts(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Данные формы регистрации.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

pub struct AuthService {
    api: MockAuthApi,
    area: Arc<dyn KeyValueArea>,
    users: UserRepo,
    current: Mutex<Option<User>>,
}

impl AuthService {
    pub fn new(area: Arc<dyn KeyValueArea>, users: UserRepo) -> Self {
        Self {
            api: MockAuthApi::new(Arc::clone(&area)),
            area,
            users,
            current: Mutex::new(None),
        }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<User, AuthError> {
        let response = self.api.login(credentials)?;
        self.start_session(response, false).await
    }

    /// Проверяет форму, регистрирует аккаунт и сразу входит в него.
    /// Если войти не удалось, новый аккаунт удаляется из реестра.
    pub async fn register(&self, form: &Registration) -> Result<User, AuthError> {
        validator::check_name(&form.name)?;
        validator::check_email(&form.email)?;
        validator::check_password(&form.password, &form.confirm_password)?;

        let response = self.api.register(form.name.trim(), &form.email, &form.password)?;
        self.start_session(response, true).await
    }

    /// Сначала профиль в коллекцию `user`, потом ключи сессии.
    /// При ошибке ключи не остаются в хранилище.
    async fn start_session(&self, response: AuthResponse, new_account: bool) -> Result<User, AuthError> {
        let saved = match self.users.save_user(&response.user).await {
            Ok(()) => self.store_session(&response),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = saved {
            error!("failed to start session of user {}: {}", response.user.id, e);
            self.clear_stored_session();
            if new_account {
                if let Err(undo) = self.api.remove_account(response.user.id) {
                    error!("failed to roll back account {}: {}", response.user.id, undo);
                }
            }
            return Err(e);
        }

        *self.lock() = Some(response.user.clone());
        info!("user {} signed in", response.user.id);
        Ok(response.user)
    }

    fn store_session(&self, response: &AuthResponse) -> Result<(), AuthError> {
        let profile = serde_json::to_string(&response.user)
            .map_err(|e| StoreError::serialization("user", e))?;
        self.area.set(USER_KEY, &profile)?;
        self.area.set(ACCESS_TOKEN_KEY, &response.access_token)?;
        self.area.set(REFRESH_TOKEN_KEY, &response.refresh_token)?;
        Ok(())
    }

    /// Сбрасывает сессию. Ошибки хранилища только логируются.
    pub fn logout(&self) {
        *self.lock() = None;
        self.clear_stored_session();
        info!("signed out");
    }

    /// Восстанавливает сессию из хранилища. Битый или неполный профиль
    /// (нет id, name или email) удаляется вместе с токенами. Никогда не падает.
    pub fn init_from_storage(&self) -> bool {
        let stored = match self.area.get(USER_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                error!("failed to read stored session: {}", e);
                return false;
            }
        };
        let Some(text) = stored else {
            return false;
        };

        match parse_stored_user(&text) {
            Some(user) => {
                info!("session of user {} restored", user.id);
                *self.lock() = Some(user);
                true
            }
            None => {
                warn!("stored user profile is invalid, clearing session");
                self.clear_stored_session();
                false
            }
        }
    }

    /// Новый access-токен по сохранённому refresh-токену.
    /// При любой ошибке сессия сбрасывается.
    pub fn refresh_access_token(&self) -> Result<String, AuthError> {
        match self.try_refresh() {
            Ok(token) => Ok(token),
            Err(e) => {
                error!("token refresh failed: {}", e);
                self.logout();
                Err(e)
            }
        }
    }

    fn try_refresh(&self) -> Result<String, AuthError> {
        let refresh_token = self.area.get(REFRESH_TOKEN_KEY)?.ok_or(AuthError::MissingRefreshToken)?;
        let access_token = self.api.refresh(&refresh_token)?;
        self.area.set(ACCESS_TOKEN_KEY, &access_token)?;
        Ok(access_token)
    }

    pub fn current_user(&self) -> Option<User> {
        self.lock().clone()
    }

    pub fn current_user_id(&self) -> Option<i64> {
        self.lock().as_ref().map(|u| u.id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().is_some()
    }

    fn clear_stored_session(&self) {
        for key in [USER_KEY, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.area.remove(key) {
                error!("failed to remove '{key}' from session storage: {}", e);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<User>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Профиль валиден, если это объект с ненулевым числовым id и непустыми name и email.
fn parse_stored_user(text: &str) -> Option<User> {
    let value: Value = serde_json::from_str(text).ok()?;
    let id = value.get("id")?.as_i64().filter(|id| *id != 0)?;
    let name = value.get("name")?.as_str().filter(|s| !s.is_empty())?;
    let email = value.get("email")?.as_str().filter(|s| !s.is_empty())?;
    Some(User {
        id,
        name: name.to_string(),
        email: email.to_string(),
    })
}
