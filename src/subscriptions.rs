//! Course subscriptions of the logged-in student

use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::auth::Role;
use crate::error::{Error, Result};
use crate::models::{tables, Course, Subscription};
use crate::ClassVibes;
use classvibes_postgrest::affected_rows;

/// Unique key of `usuario_cursos`
const SUBSCRIPTION_KEY: &str = "idcurso,idalumno";

/// Result of asking to subscribe to a course
#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeOutcome {
    /// The pair is stored (free course)
    Subscribed { course: Course },
    /// The course has a price; call [`SubscriptionService::confirm_payment`]
    PaymentRequired { course: Course },
}

/// Client for subscribing, paying and unsubscribing
pub struct SubscriptionService<'a> {
    client: &'a ClassVibes,
    payment_in_flight: &'a AtomicBool,
}

// Releases the in-flight flag even if the payment future is dropped
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<'a> SubscriptionService<'a> {
    pub(crate) fn new(client: &'a ClassVibes, payment_in_flight: &'a AtomicBool) -> Self {
        Self {
            client,
            payment_in_flight,
        }
    }

    fn student_id(&self) -> Result<i64> {
        let user = self.client.session().require_role(Role::Student)?;
        user.student_id().ok_or(Error::NotLoggedIn)
    }

    /// Subscribe to a free course, or report that payment is required.
    pub async fn subscribe(&self, course_id: i64) -> Result<SubscribeOutcome> {
        let student_id = self.student_id()?;
        let course = self.subscription_summary(course_id).await?;

        if !course.is_free() {
            debug!("Course {} costs {:?}, payment required", course_id, course.price);
            return Ok(SubscribeOutcome::PaymentRequired { course });
        }

        self.insert_pair(course_id, student_id).await?;
        Ok(SubscribeOutcome::Subscribed { course })
    }

    /// Simulated payment: wait the configured delay, then store the pair.
    ///
    /// Only one confirmation runs at a time; a concurrent call fails with
    /// [`Error::PaymentInFlight`].
    pub async fn confirm_payment(&self, course_id: i64) -> Result<Course> {
        let student_id = self.student_id()?;

        if self
            .payment_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::PaymentInFlight);
        }
        let _in_flight = InFlight(self.payment_in_flight);

        let course = self.subscription_summary(course_id).await?;
        tokio::time::sleep(self.client.config().options.payment_delay).await;
        self.insert_pair(course_id, student_id).await?;
        info!("Payment confirmed for course {} by student {}", course_id, student_id);
        Ok(course)
    }

    /// Remove the subscription. Returns whether a pair was deleted.
    pub async fn unsubscribe(&self, course_id: i64) -> Result<bool> {
        let student_id = self.student_id()?;
        let deleted = self
            .client
            .from(tables::SUBSCRIPTIONS)
            .eq("idcurso", &course_id.to_string())
            .eq("idalumno", &student_id.to_string())
            .delete()
            .await?;
        let removed = affected_rows(&deleted) > 0;
        if removed {
            info!("Student {} unsubscribed from course {}", student_id, course_id);
        } else {
            debug!("Student {} was not subscribed to course {}", student_id, course_id);
        }
        Ok(removed)
    }

    /// Subscriptions of the student, each with its course embedded
    pub async fn my_subscriptions(&self) -> Result<Vec<Subscription>> {
        let student_id = self.student_id()?;
        let rows = self
            .client
            .from(tables::SUBSCRIPTIONS)
            .select("*")
            .include(tables::COURSES, None)
            .eq("idalumno", &student_id.to_string())
            .execute::<Subscription>()
            .await?;
        Ok(rows)
    }

    /// The course shown on the confirmation and payment pages
    pub async fn subscription_summary(&self, course_id: i64) -> Result<Course> {
        self.client
            .from(tables::COURSES)
            .select("*")
            .eq("idcurso", &course_id.to_string())
            .execute_one::<Course>()
            .await?
            .ok_or(Error::CourseNotFound(course_id))
    }

    // A repeated pair is skipped by the unique key instead of failing
    async fn insert_pair(&self, course_id: i64, student_id: i64) -> Result<()> {
        let inserted = self
            .client
            .from(tables::SUBSCRIPTIONS)
            .on_conflict(SUBSCRIPTION_KEY)
            .ignore_duplicates()
            .insert(Subscription::new(course_id, student_id))
            .await?;
        if affected_rows(&inserted) == 0 {
            debug!("Student {} already subscribed to course {}", student_id, course_id);
        } else {
            info!("Student {} subscribed to course {}", student_id, course_id);
        }
        Ok(())
    }
}
