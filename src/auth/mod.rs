//! Login, logout and the session shared by every screen

mod session;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{tables, Account};
use crate::{ClassVibes, PostgrestClient};

pub use session::*;

/// Columns fetched for a login, with the role embedded through `usuario_perfil`
const ACCOUNT_WITH_ROLE: &str = "*,usuario_perfil(perfiles(id,nombre))";

/// Login form input
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Account id, username or display name
    pub identifier: String,
    pub password: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password: password.into(),
        }
    }
}

/// Client for the login screen
pub struct AuthService<'a> {
    client: &'a ClassVibes,
}

impl<'a> AuthService<'a> {
    pub(crate) fn new(client: &'a ClassVibes) -> Self {
        Self { client }
    }

    /// Check the credentials against `usuario` and store the identity in the session.
    ///
    /// A numeric identifier is tried as an account id first; otherwise (or when
    /// no account has that id) it is matched against `username` and `nombre`.
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionUser> {
        let identifier = credentials.identifier.trim();
        if identifier.is_empty() {
            return Err(Error::validation(
                "identifier",
                "enter your id, username or name",
            ));
        }

        let account = self
            .find_account(identifier)
            .await?
            .ok_or(Error::InvalidCredentials)?;

        if account.password.as_deref() != Some(credentials.password.as_str()) {
            debug!("Password mismatch for account {}", account.id);
            return Err(Error::InvalidCredentials);
        }

        let role = Role::from_profile_name(account.profile_name().as_deref());
        let teacher_id = match role {
            Role::Teacher => self.resolve_teacher_id(&account).await?,
            _ => None,
        };

        let user = SessionUser {
            id: account.id,
            username: account.username.clone().unwrap_or_else(|| account.name.clone()),
            name: account.name,
            role,
            teacher_id,
        };
        self.client.session().set(user.clone())?;
        info!("Logged in {} as {}", user.username, user.role);
        Ok(user)
    }

    /// Clear the session. Returns whether someone was logged in.
    pub fn logout(&self) -> Result<bool> {
        self.client.session().clear()
    }

    /// The logged-in identity, if any
    pub fn current_user(&self) -> Option<SessionUser> {
        self.client.session().current()
    }

    async fn find_account(&self, identifier: &str) -> Result<Option<Account>> {
        if let Ok(id) = identifier.parse::<i64>() {
            let by_id = self
                .unique_account(
                    self.client
                        .from(tables::ACCOUNTS)
                        .select(ACCOUNT_WITH_ROLE)
                        .eq("id", &id.to_string()),
                )
                .await?;
            if by_id.is_some() {
                return Ok(by_id);
            }
        }

        let value = quote_filter_value(identifier);
        self.unique_account(
            self.client
                .from(tables::ACCOUNTS)
                .select(ACCOUNT_WITH_ROLE)
                .or(&format!("username.eq.{},nombre.eq.{}", value, value)),
        )
        .await
    }

    // Several matches or a failed read count as wrong credentials
    async fn unique_account(&self, query: PostgrestClient) -> Result<Option<Account>> {
        let rows = query.limit(2).execute::<Account>().await.map_err(|e| {
            warn!("Account lookup failed: {}", e);
            Error::InvalidCredentials
        })?;
        if rows.len() > 1 {
            warn!("Login identifier matches several accounts");
            return Err(Error::InvalidCredentials);
        }
        Ok(rows.into_iter().next())
    }

    /// Teacher id of a teacher account, by email and then by display name.
    async fn resolve_teacher_id(&self, account: &Account) -> Result<Option<i64>> {
        if let Some(email) = account.email.as_deref().filter(|e| !e.is_empty()) {
            if let Some(id) = teacher_id_by(self.client, "email", email).await? {
                return Ok(Some(id));
            }
        }
        teacher_id_by(self.client, "nombre", &account.name).await
    }
}

pub(crate) async fn teacher_id_by(
    client: &ClassVibes,
    column: &str,
    value: &str,
) -> Result<Option<i64>> {
    let teacher = client
        .from(tables::TEACHERS)
        .select("idprofesor,nombre")
        .eq(column, value)
        .execute_one::<TeacherRef>()
        .await?;
    Ok(teacher.map(|t| t.id))
}

#[derive(serde::Deserialize)]
struct TeacherRef {
    #[serde(rename = "idprofesor")]
    id: i64,
}

// PostgREST needs values with reserved characters double-quoted inside `or=(...)`
fn quote_filter_value(value: &str) -> String {
    if value.contains([',', '.', ':', '(', ')', '"', '\\', ' ']) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}
