// src/auth/mock_api.rs
//
// Имитация удалённого API аутентификации: аккаунты лежат в том же
// хранилище сессии под ключом `users`, пароли сравниваются как есть.

use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::session::{KeyValueArea, USERS_KEY};
use crate::auth::AuthError;
use crate::db::user::User;

pub const ACCESS_TOKEN_PREFIX: &str = "mock-token-";
pub const REFRESH_TOKEN_PREFIX: &str = "mock-refresh-token-";

/// `login` сначала ищется среди имён, потом среди email.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    id: i64,
    name: String,
    email: String,
    password: String,
}

impl Account {
    fn response(&self) -> AuthResponse {
        AuthResponse {
            user: User {
                id: self.id,
                name: self.name.clone(),
                email: self.email.clone(),
            },
            access_token: format!("{ACCESS_TOKEN_PREFIX}{}", self.id),
            refresh_token: format!("{REFRESH_TOKEN_PREFIX}{}", self.id),
        }
    }
}

#[derive(Clone)]
pub struct MockAuthApi {
    area: Arc<dyn KeyValueArea>,
}

impl MockAuthApi {
    pub fn new(area: Arc<dyn KeyValueArea>) -> Self {
        Self { area }
    }

    pub fn login(&self, credentials: &Credentials) -> Result<AuthResponse, AuthError> {
        if credentials.password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }
        if credentials.login.is_empty() {
            return Err(AuthError::MissingField("login"));
        }

        let accounts = self.accounts()?;
        let matches = |a: &&Account| a.password == credentials.password;
        let account = accounts
            .iter()
            .filter(matches)
            .find(|a| a.name == credentials.login)
            .or_else(|| accounts.iter().filter(matches).find(|a| a.email == credentials.login))
            .ok_or(AuthError::InvalidCredentials)?;

        debug!("mock login for account {}", account.id);
        Ok(account.response())
    }

    /// Регистрирует аккаунт. Занятый email проверяется раньше занятого имени.
    pub fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        for (field, value) in [("name", name), ("email", email), ("password", password)] {
            if value.is_empty() {
                return Err(AuthError::MissingField(field));
            }
        }

        let mut accounts = self.accounts()?;
        if accounts.iter().any(|a| a.email == email) {
            return Err(AuthError::EmailTaken);
        }
        if accounts.iter().any(|a| a.name == name) {
            return Err(AuthError::NameTaken);
        }

        // id это время в мс; при совпадении сдвигаем вперёд
        let now = Utc::now().timestamp_millis();
        let id = accounts.iter().map(|a| a.id + 1).fold(now, i64::max);
        let account = Account {
            id,
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = account.response();
        accounts.push(account);
        self.store_accounts(&accounts)?;

        info!("mock account {id} registered");
        Ok(response)
    }

    /// Новый access-токен по refresh-токену известного аккаунта.
    pub fn refresh(&self, refresh_token: &str) -> Result<String, AuthError> {
        let id: i64 = refresh_token
            .strip_prefix(REFRESH_TOKEN_PREFIX)
            .and_then(|rest| rest.parse().ok())
            .ok_or(AuthError::InvalidRefreshToken)?;
        if !self.accounts()?.iter().any(|a| a.id == id) {
            return Err(AuthError::InvalidRefreshToken);
        }
        Ok(format!("{ACCESS_TOKEN_PREFIX}{id}"))
    }

    /// Удаляет аккаунт из реестра. Неизвестный id это no-op.
    pub fn remove_account(&self, id: i64) -> Result<(), AuthError> {
        let mut accounts = self.accounts()?;
        let before = accounts.len();
        accounts.retain(|a| a.id != id);
        if accounts.len() != before {
            self.store_accounts(&accounts)?;
            info!("mock account {id} removed");
        }
        Ok(())
    }

    fn accounts(&self) -> Result<Vec<Account>, AuthError> {
        match self.area.get(USERS_KEY)? {
            Some(text) => serde_json::from_str(&text).map_err(|e| AuthError::CorruptAccounts(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    fn store_accounts(&self, accounts: &[Account]) -> Result<(), AuthError> {
        let text = serde_json::to_string(accounts).map_err(|e| AuthError::CorruptAccounts(e.to_string()))?;
        self.area.set(USERS_KEY, &text)?;
        Ok(())
    }
}
