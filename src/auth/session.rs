//! Session management: the logged-in identity shared by every screen

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

use crate::error::{Error, Result};

/// Permission level of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "profesor")]
    Teacher,
    #[serde(rename = "alumno")]
    Student,
}

impl Role {
    /// Map a `perfiles.nombre` value to a role. Accounts without a profile are students.
    pub fn from_profile_name(name: Option<&str>) -> Role {
        let Some(name) = name else {
            return Role::Student;
        };
        match name.trim().to_lowercase().as_str() {
            "admin" => Role::Admin,
            "profesor" => Role::Teacher,
            "alumno" => Role::Student,
            other => {
                warn!("Unknown profile name {:?}, treating account as a student", other);
                Role::Student
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "profesor",
            Role::Student => "alumno",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The logged-in identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Account id (`usuario.id`)
    pub id: i64,
    pub name: String,
    pub username: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<i64>,
}

impl SessionUser {
    /// Student id used for subscriptions; only students have one.
    pub fn student_id(&self) -> Option<i64> {
        (self.role == Role::Student).then_some(self.id)
    }
}

/// Holds at most one [`SessionUser`] and notifies subscribers of every change.
///
/// With a path configured the session survives restarts: it is loaded on
/// [`SessionStore::open`] and rewritten on every change.
#[derive(Debug)]
pub struct SessionStore {
    path: Option<PathBuf>,
    sender: watch::Sender<Option<SessionUser>>,
}

impl SessionStore {
    /// A store that lives only as long as the process
    pub fn in_memory() -> Self {
        let (sender, _) = watch::channel(None);
        Self { path: None, sender }
    }

    /// Open a store, loading a previously persisted session from `path`.
    pub fn open(path: Option<PathBuf>) -> Self {
        let initial = path.as_deref().and_then(load_session);
        let (sender, _) = watch::channel(initial);
        Self { path, sender }
    }

    /// The current identity, if any
    pub fn current(&self) -> Option<SessionUser> {
        self.sender.borrow().clone()
    }

    /// Receiver that observes every login and logout
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionUser>> {
        self.sender.subscribe()
    }

    /// Replace the current identity
    pub fn set(&self, user: SessionUser) -> Result<()> {
        if let Some(path) = &self.path {
            fs::write(path, serde_json::to_vec_pretty(&user)?)?;
        }
        info!("Session set for {} ({})", user.username, user.role);
        self.sender.send_replace(Some(user));
        Ok(())
    }

    /// Forget the current identity. Returns whether someone was logged in.
    pub fn clear(&self) -> Result<bool> {
        if let Some(path) = &self.path {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        let previous = self.sender.send_replace(None);
        if let Some(user) = &previous {
            info!("Session cleared for {}", user.username);
        }
        Ok(previous.is_some())
    }

    pub fn require_user(&self) -> Result<SessionUser> {
        self.current().ok_or(Error::NotLoggedIn)
    }

    /// The current identity if it has `role`
    pub fn require_role(&self, role: Role) -> Result<SessionUser> {
        let user = self.require_user()?;
        if user.role != role {
            return Err(Error::wrong_role(role));
        }
        Ok(user)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn load_session(path: &Path) -> Option<SessionUser> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read session file {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(user) => Some(user),
        Err(e) => {
            warn!("Ignoring corrupt session file {}: {}", path.display(), e);
            None
        }
    }
}
