//! ClassVibes client library
//!
//! A Rust client for the ClassVibes course marketplace. All data lives in a
//! hosted PostgREST service; this crate holds the session, validates forms and
//! orchestrates the remote calls behind each screen:
//!
//! - [`auth`]: login, logout and the shared [`SessionStore`]
//! - [`catalog`]: course, teacher and review listings
//! - [`subscriptions`]: free and paid course subscriptions
//! - [`courses`]: the teacher's course editor
//! - [`teachers`]: teacher administration and the onboarding saga

pub mod auth;
pub mod catalog;
pub mod config;
pub mod courses;
pub mod error;
pub mod models;
pub mod subscriptions;
pub mod teachers;

use reqwest::Client;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::auth::{AuthService, SessionStore};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::courses::CourseEditor;
use crate::subscriptions::SubscriptionService;
use crate::teachers::{JsonFileSagaLog, MemorySagaLog, SagaLog, TeacherAdmin};

pub use classvibes_postgrest::{PostgrestClient, PostgrestError, SortOrder};
pub use error::{Error, Result};

/// The main entry point for the ClassVibes client
///
/// Cloning is cheap: the HTTP client, session store and saga log are shared.
#[derive(Clone)]
pub struct ClassVibes {
    config: Arc<Config>,
    http_client: Client,
    session: Arc<SessionStore>,
    saga_log: Arc<dyn SagaLog>,
    payment_in_flight: Arc<AtomicBool>,
}

impl ClassVibes {
    /// Create a client from `config`.
    ///
    /// The session is loaded from `options.session_path` and the saga log is
    /// kept in `options.saga_log_path` when those are set; otherwise both live
    /// in memory.
    ///
    /// # Example
    ///
    /// ```
    /// use classvibes::{ClassVibes, config::Config};
    ///
    /// let config = Config::new("https://your-project.supabase.co", "your-anon-key".to_string()).unwrap();
    /// let client = ClassVibes::new(config).unwrap();
    /// assert!(client.session().current().is_none());
    /// ```
    pub fn new(config: Config) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        let session = SessionStore::open(config.options.session_path.clone());
        let saga_log: Arc<dyn SagaLog> = match &config.options.saga_log_path {
            Some(path) => Arc::new(JsonFileSagaLog::new(path)),
            None => Arc::new(MemorySagaLog::new()),
        };

        Ok(Self {
            config: Arc::new(config),
            http_client,
            session: Arc::new(session),
            saga_log,
            payment_in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Create a client from the `CLASSVIBES_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env()?)
    }

    /// Share an existing session store
    pub fn with_session_store(mut self, session: Arc<SessionStore>) -> Self {
        self.session = session;
        self
    }

    /// Use another saga log implementation
    pub fn with_saga_log(mut self, saga_log: Arc<dyn SagaLog>) -> Self {
        self.saga_log = saga_log;
        self
    }

    /// Create a PostgrestClient for a table
    ///
    /// # Example
    ///
    /// ```
    /// use classvibes::{ClassVibes, config::Config};
    ///
    /// let config = Config::new("https://your-project.supabase.co", "your-anon-key".to_string()).unwrap();
    /// let client = ClassVibes::new(config).unwrap();
    /// let query = client.from("cursos").select("idcurso,nombre");
    /// assert_eq!(query.table(), "cursos");
    /// ```
    pub fn from(&self, table: &str) -> PostgrestClient {
        PostgrestClient::new(
            self.config.base_url(),
            &self.config.anon_key,
            table,
            self.http_client.clone(),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared session store
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn saga_log(&self) -> &Arc<dyn SagaLog> {
        &self.saga_log
    }

    /// Login and logout
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(self)
    }

    /// Course, teacher and review listings
    pub fn catalog(&self) -> Catalog<'_> {
        Catalog::new(self)
    }

    /// Subscriptions of the logged-in student
    pub fn subscriptions(&self) -> SubscriptionService<'_> {
        SubscriptionService::new(self, &self.payment_in_flight)
    }

    /// Course editor of the logged-in teacher
    pub fn courses(&self) -> CourseEditor<'_> {
        CourseEditor::new(self)
    }

    /// Teacher administration (admin only)
    pub fn teachers(&self) -> TeacherAdmin<'_> {
        TeacherAdmin::new(self)
    }
}

/// Commonly used types
pub mod prelude {
    pub use crate::auth::{Credentials, Role, SessionStore, SessionUser};
    pub use crate::catalog::{CourseListing, TeacherListing};
    pub use crate::config::{ClientOptions, Config};
    pub use crate::courses::CourseForm;
    pub use crate::error::{Error, Result};
    pub use crate::models::{Course, Review, Subscription, Teacher};
    pub use crate::subscriptions::SubscribeOutcome;
    pub use crate::teachers::{OnboardingOutcome, SagaStep, TeacherForm};
    pub use crate::ClassVibes;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientOptions;

    #[test]
    fn from_builds_table_client() {
        let config = Config::new("http://localhost:54321/", "anon".to_string()).unwrap();
        let client = ClassVibes::new(config).unwrap();
        assert_eq!(client.from("perfiles").table(), "perfiles");
        assert_eq!(client.config().base_url(), "http://localhost:54321");
    }

    #[tokio::test]
    async fn clones_share_session_and_saga_log() {
        let dir = tempfile::tempdir().unwrap();
        let options = ClientOptions::default()
            .with_saga_log_path(dir.path().join("saga.json"))
            .with_request_timeout(None);
        let config = Config::new("http://localhost:54321", "anon".to_string())
            .unwrap()
            .with_options(options);
        let client = ClassVibes::new(config).unwrap();
        let clone = client.clone();

        assert!(Arc::ptr_eq(client.session(), clone.session()));
        assert!(clone.saga_log().pending().await.unwrap().is_empty());
    }
}
