//! Teacher administration (admin role only)

mod onboarding;
mod saga_log;

use log::{info, warn};

use crate::auth::Role;
use crate::error::{Error, Result};
use crate::models::{first_row, tables, Teacher};
use crate::ClassVibes;
use classvibes_postgrest::{affected_rows, SortOrder};

pub use onboarding::*;
pub use saga_log::*;

/// How a teacher was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeacherDeletion {
    /// The account was deleted; the remote cascade removes the teacher row,
    /// role assignment, courses and subscriptions.
    AccountCascade,
    /// No account matched the teacher's email, so the row was deleted directly.
    TeacherRowOnly,
}

/// Client for the teacher administration screen
pub struct TeacherAdmin<'a> {
    client: &'a ClassVibes,
}

impl<'a> TeacherAdmin<'a> {
    pub(crate) fn new(client: &'a ClassVibes) -> Self {
        Self { client }
    }

    fn require_admin(&self) -> Result<()> {
        self.client.session().require_role(Role::Admin)?;
        Ok(())
    }

    /// All teachers by id
    pub async fn list(&self) -> Result<Vec<Teacher>> {
        self.require_admin()?;
        let teachers = self
            .client
            .from(tables::TEACHERS)
            .select("*")
            .order("idprofesor", SortOrder::Ascending)
            .execute::<Teacher>()
            .await?;
        Ok(teachers)
    }

    pub async fn get(&self, teacher_id: i64) -> Result<Teacher> {
        self.require_admin()?;
        self.fetch(teacher_id).await
    }

    /// Create the account, role assignment and teacher row; see [`OnboardingSaga`].
    pub async fn onboard(&self, form: &TeacherForm) -> Result<OnboardingOutcome> {
        self.require_admin()?;
        OnboardingSaga::new(self.client).run(form).await
    }

    /// Undo onboardings left unfinished by an earlier run
    pub async fn recover(&self) -> Result<RecoveryReport> {
        self.require_admin()?;
        OnboardingSaga::new(self.client).recover().await
    }

    /// Update a teacher. The photo is only replaced when the form has one.
    ///
    /// A changed email is applied to the linked account first so the teacher
    /// row keeps pointing at it. Emails compare case-sensitively, like the
    /// foreign key between the two rows.
    pub async fn update(&self, teacher_id: i64, form: &TeacherForm) -> Result<Teacher> {
        self.require_admin()?;
        let valid = form.validate()?;
        let current = self.fetch(teacher_id).await?;

        let old_email = current.email.as_deref().filter(|e| !e.is_empty());
        if let Some(old_email) = old_email {
            if old_email != valid.email {
                self.move_account_email(old_email, &valid.email).await?;
            }
        }

        let updated = self
            .client
            .from(tables::TEACHERS)
            .eq("idprofesor", &teacher_id.to_string())
            .update(valid.update())
            .await?;
        let teacher: Teacher = first_row(updated)?.ok_or(Error::TeacherNotFound(teacher_id))?;
        info!("Updated teacher {}", teacher_id);

        // The old email no longer identifies this teacher
        if let Some(old_email) = old_email {
            if idempotency_key(old_email) != idempotency_key(&valid.email) {
                self.forget_onboarding(old_email).await;
            }
        }
        Ok(teacher)
    }

    /// Delete a teacher by deleting its account and relying on the cascade.
    pub async fn delete(&self, teacher_id: i64) -> Result<TeacherDeletion> {
        self.require_admin()?;
        let teacher = self.fetch(teacher_id).await?;

        let mut deletion = TeacherDeletion::TeacherRowOnly;
        if let Some(email) = teacher.email.as_deref().filter(|e| !e.is_empty()) {
            let deleted = self
                .client
                .from(tables::ACCOUNTS)
                .eq("email", email)
                .delete()
                .await?;
            if affected_rows(&deleted) > 0 {
                deletion = TeacherDeletion::AccountCascade;
            }

            self.forget_onboarding(email).await;
        }

        if deletion == TeacherDeletion::TeacherRowOnly {
            self.client
                .from(tables::TEACHERS)
                .eq("idprofesor", &teacher_id.to_string())
                .delete()
                .await?;
        }

        info!("Deleted teacher {} ({:?})", teacher_id, deletion);
        Ok(deletion)
    }

    async fn fetch(&self, teacher_id: i64) -> Result<Teacher> {
        self.client
            .from(tables::TEACHERS)
            .select("*")
            .eq("idprofesor", &teacher_id.to_string())
            .execute_one::<Teacher>()
            .await?
            .ok_or(Error::TeacherNotFound(teacher_id))
    }

    async fn forget_onboarding(&self, email: &str) {
        let key = idempotency_key(email);
        if let Err(e) = self.client.saga_log().remove(&key).await {
            warn!("Failed to drop onboarding record of {}: {}", email, e);
        }
    }

    async fn move_account_email(&self, old_email: &str, new_email: &str) -> Result<()> {
        let result = self
            .client
            .from(tables::ACCOUNTS)
            .eq("email", old_email)
            .update(serde_json::json!({ "email": new_email }))
            .await;
        match result {
            Ok(rows) if affected_rows(&rows) == 0 => {
                warn!("No account with email {} to move to {}", old_email, new_email);
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) if e.violates("email") => Err(Error::EmailTaken(new_email.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionUser;
    use crate::config::Config;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn admin_client(server: &MockServer) -> ClassVibes {
        let config = Config::new(&server.uri(), "anon".to_string()).unwrap();
        let client = ClassVibes::new(config).unwrap();
        client
            .session()
            .set(SessionUser {
                id: 1,
                name: "Admin".to_string(),
                username: "admin".to_string(),
                role: Role::Admin,
                teacher_id: None,
            })
            .unwrap();
        client
    }

    fn form() -> TeacherForm {
        TeacherForm {
            name: "Marta".to_string(),
            email: "marta@example.com".to_string(),
            credential: "clave".to_string(),
            subject: "Física".to_string(),
            experience: "4".to_string(),
            photo_url: String::new(),
        }
    }

    async fn mount_teacher(server: &MockServer, email: &str) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/profesores"))
            .and(query_param("idprofesor", "eq.31"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "idprofesor": 31, "nombre": "Marta", "email": email }
            ])))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn non_admin_is_forbidden() {
        let server = MockServer::start().await;
        let config = Config::new(&server.uri(), "anon".to_string()).unwrap();
        let client = ClassVibes::new(config).unwrap();

        assert!(matches!(client.teachers().list().await, Err(Error::NotLoggedIn)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_omits_empty_photo() {
        let server = MockServer::start().await;
        mount_teacher(&server, "marta@example.com").await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/profesores"))
            .and(query_param("idprofesor", "eq.31"))
            .and(body_json(json!({
                "nombre": "Marta",
                "email": "marta@example.com",
                "clave": "clave",
                "materia": "Física",
                "experiencia": 4
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "idprofesor": 31, "nombre": "Marta", "email": "marta@example.com", "experiencia": 4 }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let teacher = admin_client(&server)
            .teachers()
            .update(31, &form())
            .await
            .unwrap();
        assert_eq!(teacher.experience, Some(4));
    }

    async fn mount_teacher_patch(server: &MockServer, email: &str, expected: u64) {
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/profesores"))
            .and(query_param("idprofesor", "eq.31"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "idprofesor": 31, "nombre": "Marta", "email": email }
            ])))
            .expect(expected)
            .mount(server)
            .await;
    }

    fn with_email(email: &str) -> TeacherForm {
        TeacherForm {
            email: email.to_string(),
            ..form()
        }
    }

    #[tokio::test]
    async fn case_only_email_change_moves_account() {
        let server = MockServer::start().await;
        mount_teacher(&server, "Marta@example.com").await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/usuario"))
            .and(query_param("email", "eq.Marta@example.com"))
            .and(body_json(json!({ "email": "marta@example.com" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 8 }])))
            .expect(1)
            .mount(&server)
            .await;
        mount_teacher_patch(&server, "marta@example.com", 1).await;

        let client = admin_client(&server);
        let teacher = client.teachers().update(31, &form()).await.unwrap();
        assert_eq!(teacher.email.as_deref(), Some("marta@example.com"));

        let requests = server.received_requests().await.unwrap();
        let patched: Vec<&str> = requests
            .iter()
            .filter(|r| r.method.to_string() == "PATCH")
            .map(|r| r.url.path())
            .collect();
        assert_eq!(patched, vec!["/rest/v1/usuario", "/rest/v1/profesores"]);
    }

    #[tokio::test]
    async fn email_change_forgets_old_onboarding() {
        let server = MockServer::start().await;
        mount_teacher(&server, "old@example.com").await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/usuario"))
            .and(query_param("email", "eq.old@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 8 }])))
            .expect(1)
            .mount(&server)
            .await;
        mount_teacher_patch(&server, "new@example.com", 1).await;

        let client = admin_client(&server);
        let old_form = with_email("old@example.com");
        let mut record = SagaRecord::start(
            idempotency_key("old@example.com"),
            "old@example.com".to_string(),
        )
        .with_payload_hash(old_form.validate().unwrap().fingerprint());
        record.state = SagaState::Completed;
        record.account_id = Some(8);
        record.teacher_id = Some(31);
        client.saga_log().save(&record).await.unwrap();

        client
            .teachers()
            .update(31, &with_email("new@example.com"))
            .await
            .unwrap();

        assert!(client
            .saga_log()
            .load("old@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn email_move_onto_taken_address_fails() {
        let server = MockServer::start().await;
        mount_teacher(&server, "old@example.com").await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/usuario"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint \"usuario_email_key\"",
                "details": "Key (email)=(taken@example.com) already exists."
            })))
            .mount(&server)
            .await;
        mount_teacher_patch(&server, "taken@example.com", 0).await;

        let result = admin_client(&server)
            .teachers()
            .update(31, &with_email("taken@example.com"))
            .await;
        assert!(matches!(result, Err(Error::EmailTaken(email)) if email == "taken@example.com"));
    }

    #[tokio::test]
    async fn delete_goes_through_account_email() {
        let server = MockServer::start().await;
        mount_teacher(&server, "marta@example.com").await;

        Mock::given(method("DELETE"))
            .and(path("/rest/v1/usuario"))
            .and(query_param("email", "eq.marta@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 8 }])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/profesores"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let deletion = admin_client(&server).teachers().delete(31).await.unwrap();
        assert_eq!(deletion, TeacherDeletion::AccountCascade);
    }

    #[tokio::test]
    async fn delete_without_account_removes_row() {
        let server = MockServer::start().await;
        mount_teacher(&server, "legacy@example.com").await;

        Mock::given(method("DELETE"))
            .and(path("/rest/v1/usuario"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/profesores"))
            .and(query_param("idprofesor", "eq.31"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "idprofesor": 31 }])))
            .expect(1)
            .mount(&server)
            .await;

        let deletion = admin_client(&server).teachers().delete(31).await.unwrap();
        assert_eq!(deletion, TeacherDeletion::TeacherRowOnly);
    }

    #[tokio::test]
    async fn missing_teacher() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profesores"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        assert!(matches!(
            admin_client(&server).teachers().delete(99).await,
            Err(Error::TeacherNotFound(99))
        ));
    }
}
