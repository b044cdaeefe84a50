//! Teacher onboarding: account, role assignment and teacher row, created in
//! order and undone in reverse order when a step fails.

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

use super::saga_log::{SagaClaim, SagaRecord, SagaState};
use crate::error::{Error, Result};
use crate::models::{
    first_row, tables, Account, NewAccount, NewTeacher, Profile, RoleAssignment, Teacher,
    TeacherUpdate,
};
use crate::ClassVibes;

/// Remote steps of the onboarding, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStep {
    CreateAccount,
    LookupRole,
    AssignRole,
    CreateTeacher,
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SagaStep::CreateAccount => "create account",
            SagaStep::LookupRole => "look up role",
            SagaStep::AssignRole => "assign role",
            SagaStep::CreateTeacher => "create teacher",
        };
        f.write_str(name)
    }
}

/// Teacher form as typed by the admin
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeacherForm {
    pub name: String,
    pub email: String,
    pub credential: String,
    pub subject: String,
    /// Years of experience; blank means 0
    pub experience: String,
    /// Blank means no photo
    pub photo_url: String,
}

/// A validated [`TeacherForm`], trimmed
#[derive(Debug, Clone, PartialEq)]
pub struct ValidTeacher {
    pub name: String,
    pub email: String,
    pub credential: String,
    pub subject: String,
    pub experience: i32,
    pub photo_url: Option<String>,
}

impl TeacherForm {
    /// Prefill the form from a stored teacher
    pub fn from_teacher(teacher: &Teacher) -> Self {
        Self {
            name: teacher.name.clone(),
            email: teacher.email.clone().unwrap_or_default(),
            credential: teacher.credential.clone().unwrap_or_default(),
            subject: teacher.subject.clone().unwrap_or_default(),
            experience: teacher.experience.map(|e| e.to_string()).unwrap_or_default(),
            photo_url: teacher.photo_url.clone().unwrap_or_default(),
        }
    }

    pub fn validate(&self) -> Result<ValidTeacher> {
        let required = |value: &str, field: &'static str| -> Result<String> {
            let value = value.trim();
            if value.is_empty() {
                return Err(Error::validation(
                    field,
                    "name, email, credential and subject are required",
                ));
            }
            Ok(value.to_string())
        };

        let name = required(&self.name, "name")?;
        let email = required(&self.email, "email")?;
        let credential = required(&self.credential, "credential")?;
        let subject = required(&self.subject, "subject")?;

        let experience = match self.experience.trim() {
            "" => 0,
            value => value
                .parse::<i32>()
                .ok()
                .filter(|years| *years >= 0)
                .ok_or_else(|| {
                    Error::validation("experience", "years of experience must be a whole number")
                })?,
        };

        let photo_url = Some(self.photo_url.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        Ok(ValidTeacher {
            name,
            email,
            credential,
            subject,
            experience,
            photo_url,
        })
    }
}

impl ValidTeacher {
    /// SHA-256 of the submitted details, keyed by the normalized email
    pub fn fingerprint(&self) -> String {
        let payload = serde_json::json!({
            "email": idempotency_key(&self.email),
            "name": self.name,
            "credential": self.credential,
            "subject": self.subject,
            "experience": self.experience,
            "photo_url": self.photo_url,
        });
        hex::encode(Sha256::digest(payload.to_string().as_bytes()))
    }

    fn new_account(&self, username: &str) -> NewAccount {
        NewAccount {
            name: self.name.clone(),
            username: username.to_string(),
            password: self.credential.clone(),
            email: self.email.clone(),
            photo_url: self.photo_url.clone(),
            birth_date: None,
            gender: None,
            grade: None,
            phone: None,
            age: None,
        }
    }

    fn new_teacher(&self) -> NewTeacher {
        NewTeacher {
            name: self.name.clone(),
            email: self.email.clone(),
            credential: self.credential.clone(),
            subject: self.subject.clone(),
            experience: self.experience,
            photo_url: self.photo_url.clone(),
            rating: 0.0,
            search_count: 0,
            course_count: 0,
            student_count: 0,
        }
    }

    pub(crate) fn update(&self) -> TeacherUpdate {
        TeacherUpdate {
            name: self.name.clone(),
            email: self.email.clone(),
            credential: self.credential.clone(),
            subject: self.subject.clone(),
            experience: self.experience,
            photo_url: self.photo_url.clone(),
        }
    }
}

/// Idempotency key of an onboarding: the trimmed, lower-cased email
pub fn idempotency_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Local part of the email, or the lower-cased name without whitespace.
pub fn username_base(email: &str, name: &str) -> String {
    match email.split('@').next().map(str::trim) {
        Some(local) if !local.is_empty() => local.to_string(),
        _ => name.split_whitespace().collect::<String>().to_lowercase(),
    }
}

/// `base`, `base1`, `base2`, ... up to `attempts` candidates in total.
pub fn username_candidates(base: &str, attempts: u32) -> impl Iterator<Item = String> + '_ {
    (0..attempts).map(move |n| match n {
        0 => base.to_string(),
        n => format!("{}{}", base, n),
    })
}

/// Result of a finished onboarding
#[derive(Debug, Clone, PartialEq)]
pub struct OnboardingOutcome {
    pub account_id: i64,
    pub teacher_id: i64,
    pub username: String,
    /// The key had already completed; nothing was sent
    pub replayed: bool,
}

/// Outcome of [`OnboardingSaga::recover`], by email
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryReport {
    pub compensated: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Deserialize)]
struct IdRow {
    id: i64,
}

#[derive(Deserialize)]
struct UsernameRow {
    username: Option<String>,
}

type StepResult<T> = std::result::Result<T, (SagaStep, Error)>;

/// Creates a teacher together with its account and role.
///
/// Every completed step is written to the client's [`SagaLog`](super::SagaLog)
/// before the next one starts. On failure the completed steps are undone in
/// reverse order; what could not be undone stays in the log for
/// [`OnboardingSaga::recover`].
pub struct OnboardingSaga<'a> {
    client: &'a ClassVibes,
}

impl<'a> OnboardingSaga<'a> {
    pub fn new(client: &'a ClassVibes) -> Self {
        Self { client }
    }

    pub async fn run(&self, form: &TeacherForm) -> Result<OnboardingOutcome> {
        let teacher = form.validate()?;
        let key = idempotency_key(&teacher.email);
        let log = self.client.saga_log();

        let mut record =
            SagaRecord::start(key, teacher.email.clone()).with_payload_hash(teacher.fingerprint());
        if let SagaClaim::Held(previous) = log.claim(&record).await? {
            return Self::replay(previous, &record);
        }
        info!("Onboarding {} (saga {})", record.email, record.saga_id);

        match self.account_exists(&teacher.email).await {
            Ok(false) => {}
            Ok(true) => {
                let cause = Error::EmailTaken(teacher.email.clone());
                return Err(self.abort(record, SagaStep::CreateAccount, cause).await);
            }
            Err(e) => return Err(self.abort(record, SagaStep::CreateAccount, e).await),
        }

        match self.run_steps(&teacher, &mut record).await {
            Ok(()) => {
                info!(
                    "Onboarded {} as teacher {:?} with account {:?}",
                    record.email, record.teacher_id, record.account_id
                );
                match (record.account_id, record.teacher_id) {
                    (Some(account_id), Some(teacher_id)) => Ok(OnboardingOutcome {
                        account_id,
                        teacher_id,
                        username: record.username.unwrap_or_default(),
                        replayed: false,
                    }),
                    _ => Err(Error::missing_row("onboarding")),
                }
            }
            Err((step, cause)) => Err(self.abort(record, step, cause).await),
        }
    }

    // The key is held by another saga: replay it if it completed with the same details
    fn replay(previous: SagaRecord, attempt: &SagaRecord) -> Result<OnboardingOutcome> {
        match previous.state {
            SagaState::Completed => {
                if previous.payload_hash.is_none() || previous.payload_hash != attempt.payload_hash
                {
                    warn!("Onboarding of {} was completed with other details", previous.email);
                    return Err(Error::OnboardingConflict(previous.email));
                }
                match (previous.account_id, previous.teacher_id) {
                    (Some(account_id), Some(teacher_id)) => {
                        info!("Onboarding of {} already completed, replaying", previous.email);
                        Ok(OnboardingOutcome {
                            account_id,
                            teacher_id,
                            username: previous.username.unwrap_or_default(),
                            replayed: true,
                        })
                    }
                    _ => Err(Error::SagaInProgress(previous.email)),
                }
            }
            _ => {
                debug!("Saga {} holds {}", previous.saga_id, previous.key);
                Err(Error::SagaInProgress(previous.email))
            }
        }
    }

    /// Undo every onboarding left unfinished by an earlier run.
    ///
    /// Assumes no onboarding is running concurrently.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let log = self.client.saga_log();
        let mut report = RecoveryReport::default();

        for mut record in log.pending().await? {
            info!("Recovering saga {} for {}", record.saga_id, record.email);
            let complete = self.compensate(&mut record).await;
            record.state = if complete {
                SagaState::Compensated
            } else {
                SagaState::CompensationFailed
            };
            record.touch();
            log.save(&record).await?;

            if complete {
                report.compensated.push(record.email);
            } else {
                report.failed.push(record.email);
            }
        }
        Ok(report)
    }

    async fn run_steps(&self, teacher: &ValidTeacher, record: &mut SagaRecord) -> StepResult<()> {
        let (account_id, username) = self
            .create_account(teacher)
            .await
            .map_err(|e| (SagaStep::CreateAccount, e))?;
        record.account_id = Some(account_id);
        record.username = Some(username);
        self.checkpoint(record, SagaStep::CreateAccount).await?;

        let profile = self
            .lookup_role()
            .await
            .map_err(|e| (SagaStep::LookupRole, e))?;
        record.profile_id = Some(profile.id);
        self.checkpoint(record, SagaStep::LookupRole).await?;

        self.assign_role(account_id, profile.id)
            .await
            .map_err(|e| (SagaStep::AssignRole, e))?;
        record.role_assigned = true;
        self.checkpoint(record, SagaStep::AssignRole).await?;

        let teacher_id = self
            .create_teacher(teacher)
            .await
            .map_err(|e| (SagaStep::CreateTeacher, e))?;
        record.teacher_id = Some(teacher_id);
        record.state = SagaState::Completed;
        self.checkpoint(record, SagaStep::CreateTeacher).await
    }

    // A step only counts as done once it is in the log
    async fn checkpoint(&self, record: &mut SagaRecord, step: SagaStep) -> StepResult<()> {
        record.touch();
        self.client
            .saga_log()
            .save(record)
            .await
            .map_err(|e| (step, e))?;
        debug!("Saga {} completed step {}", record.saga_id, step);
        Ok(())
    }

    async fn abort(&self, mut record: SagaRecord, step: SagaStep, cause: Error) -> Error {
        warn!(
            "Onboarding of {} failed at {}: {}",
            record.email, step, cause
        );
        let had_effects = record.has_remote_effects();
        let compensated = self.compensate(&mut record).await;

        record.state = if compensated {
            SagaState::Compensated
        } else {
            SagaState::CompensationFailed
        };
        record.failed_step = Some(step);
        record.error = Some(cause.to_string());
        record.touch();
        if let Err(e) = self.client.saga_log().save(&record).await {
            error!("Failed to record the outcome of saga {}: {}", record.saga_id, e);
        }

        if !had_effects {
            return cause;
        }
        Error::OnboardingFailed {
            step,
            source: Box::new(cause),
            compensated,
        }
    }

    /// Delete what the record says was created, newest first. Returns whether
    /// everything was undone.
    async fn compensate(&self, record: &mut SagaRecord) -> bool {
        let mut complete = true;

        if let Some(teacher_id) = record.teacher_id {
            match self
                .undo(tables::TEACHERS, &[("idprofesor", teacher_id)])
                .await
            {
                Ok(()) => record.teacher_id = None,
                Err(e) => {
                    error!("Failed to delete teacher {}: {}", teacher_id, e);
                    complete = false;
                }
            }
        }

        if record.role_assigned {
            if let (Some(account_id), Some(profile_id)) = (record.account_id, record.profile_id) {
                match self
                    .undo(
                        tables::ACCOUNT_PROFILES,
                        &[("usuario_id", account_id), ("perfil_id", profile_id)],
                    )
                    .await
                {
                    Ok(()) => record.role_assigned = false,
                    Err(e) => {
                        error!("Failed to remove role of account {}: {}", account_id, e);
                        complete = false;
                    }
                }
            }
        }

        if let Some(account_id) = record.account_id {
            match self.undo(tables::ACCOUNTS, &[("id", account_id)]).await {
                Ok(()) => record.account_id = None,
                Err(e) => {
                    error!("Failed to delete account {}: {}", account_id, e);
                    complete = false;
                }
            }
        }

        complete
    }

    async fn undo(&self, table: &str, filters: &[(&str, i64)]) -> Result<()> {
        let query = filters
            .iter()
            .fold(self.client.from(table), |query, (column, value)| {
                query.eq(column, &value.to_string())
            });
        query.delete().await?;
        info!("Compensated {} {:?}", table, filters);
        Ok(())
    }

    async fn account_exists(&self, email: &str) -> Result<bool> {
        let row = self
            .client
            .from(tables::ACCOUNTS)
            .select("id")
            .eq("email", email)
            .execute_one::<IdRow>()
            .await?;
        Ok(row.is_some())
    }

    async fn taken_usernames(&self, base: &str) -> Result<HashSet<String>> {
        let rows = self
            .client
            .from(tables::ACCOUNTS)
            .select("username")
            .like("username", &format!("{}*", base))
            .execute::<UsernameRow>()
            .await?;
        Ok(rows.into_iter().filter_map(|r| r.username).collect())
    }

    /// Insert the account under the first free username candidate.
    ///
    /// A unique violation on the username moves on to the next candidate; one on
    /// the email means another onboarding won the race.
    async fn create_account(&self, teacher: &ValidTeacher) -> Result<(i64, String)> {
        let attempts = self.client.config().options.max_username_attempts;
        let base = username_base(&teacher.email, &teacher.name);
        let mut taken = self.taken_usernames(&base).await?;

        for candidate in username_candidates(&base, attempts) {
            if taken.contains(&candidate) {
                continue;
            }
            match self
                .client
                .from(tables::ACCOUNTS)
                .insert(vec![teacher.new_account(&candidate)])
                .await
            {
                Ok(value) => {
                    let account: Account =
                        first_row(value)?.ok_or_else(|| Error::missing_row("account insert"))?;
                    info!("Created account {} ({})", account.id, candidate);
                    return Ok((account.id, candidate));
                }
                Err(e) if e.violates("email") => {
                    return Err(Error::EmailTaken(teacher.email.clone()));
                }
                Err(e) if e.violates("username") => {
                    debug!("Username {} was taken meanwhile", candidate);
                    taken.insert(candidate);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::UsernameExhausted { base, attempts })
    }

    async fn lookup_role(&self) -> Result<Profile> {
        let wanted = &self.client.config().options.teacher_role_name;
        let profiles = self
            .client
            .from(tables::PROFILES)
            .select("id,nombre")
            .execute::<Profile>()
            .await?;
        profiles
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::RoleNotFound(wanted.clone()))
    }

    async fn assign_role(&self, account_id: i64, profile_id: i64) -> Result<()> {
        self.client
            .from(tables::ACCOUNT_PROFILES)
            .insert(vec![RoleAssignment {
                usuario_id: account_id,
                perfil_id: profile_id,
            }])
            .await?;
        Ok(())
    }

    async fn create_teacher(&self, teacher: &ValidTeacher) -> Result<i64> {
        let inserted = self
            .client
            .from(tables::TEACHERS)
            .insert(vec![teacher.new_teacher()])
            .await?;
        let row: Teacher =
            first_row(inserted)?.ok_or_else(|| Error::missing_row("teacher insert"))?;
        Ok(row.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> TeacherForm {
        TeacherForm {
            name: "Marta Gómez".to_string(),
            email: " Marta.Gomez@Example.com ".to_string(),
            credential: "clave123".to_string(),
            subject: "Física".to_string(),
            experience: String::new(),
            photo_url: "  ".to_string(),
        }
    }

    #[test]
    fn validation_trims_and_defaults() {
        let valid = form().validate().unwrap();
        assert_eq!(valid.email, "Marta.Gomez@Example.com");
        assert_eq!(valid.experience, 0);
        assert_eq!(valid.photo_url, None);
        assert_eq!(valid.new_teacher().rating, 0.0);
    }

    #[test]
    fn validation_rejects_blank_and_bad_experience() {
        let mut missing = form();
        missing.credential = " ".to_string();
        assert!(matches!(
            missing.validate(),
            Err(Error::Validation { field: "credential", .. })
        ));

        let mut negative = form();
        negative.experience = "-2".to_string();
        assert!(matches!(
            negative.validate(),
            Err(Error::Validation { field: "experience", .. })
        ));
    }

    #[test]
    fn usernames() {
        assert_eq!(username_base("marta.gomez@example.com", "x"), "marta.gomez");
        assert_eq!(username_base("@example.com", "Marta  Gómez"), "martagómez");

        let candidates: Vec<String> = username_candidates("marta", 3).collect();
        assert_eq!(candidates, vec!["marta", "marta1", "marta2"]);
        assert_eq!(username_candidates("marta", 100).count(), 100);
    }

    #[test]
    fn fingerprint_follows_details_not_email_case() {
        let valid = form().validate().unwrap();
        let mut upper = form();
        upper.email = "MARTA.GOMEZ@example.com".to_string();
        assert_eq!(valid.fingerprint(), upper.validate().unwrap().fingerprint());

        let mut other = form();
        other.name = "Someone Else".to_string();
        assert_ne!(valid.fingerprint(), other.validate().unwrap().fingerprint());
        assert_eq!(valid.fingerprint().len(), 64);
    }

    #[test]
    fn key_is_case_insensitive() {
        assert_eq!(idempotency_key(" Ana@Example.COM"), "ana@example.com");
    }

    #[test]
    fn step_names() {
        assert_eq!(SagaStep::AssignRole.to_string(), "assign role");
        assert_eq!(
            serde_json::to_string(&SagaStep::CreateTeacher).unwrap(),
            "\"create_teacher\""
        );
    }
}
