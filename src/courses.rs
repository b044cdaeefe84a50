//! Course editor of the logged-in teacher

use log::info;

use crate::auth::{teacher_id_by, Role};
use crate::error::{Error, Result};
use crate::models::{first_row, tables, Course, CourseRecord};
use crate::ClassVibes;
use classvibes_postgrest::{affected_rows, SortOrder};

/// Course form as typed by the teacher
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseForm {
    pub name: String,
    pub price: String,
    pub subject: String,
    pub grade: String,
    pub image_url: String,
    pub description: String,
    pub video_url: String,
}

impl CourseForm {
    /// Prefill the form from a stored course
    pub fn from_course(course: &Course) -> Self {
        Self {
            name: course.name.clone(),
            price: course.price.map(|p| p.to_string()).unwrap_or_default(),
            subject: course.subject.clone().unwrap_or_default(),
            grade: course.grade.map(|g| g.to_string()).unwrap_or_default(),
            image_url: course.image_url.clone().unwrap_or_default(),
            description: course.description.clone().unwrap_or_default(),
            video_url: course.video_url.clone().unwrap_or_default(),
        }
    }

    /// Check every field in form order and build the row for `teacher_id`.
    ///
    /// The first failing field is reported.
    pub fn validate(&self, teacher_id: i64) -> Result<CourseRecord> {
        let name = required(&self.name, "name", "the course name is required")?;
        let price = self
            .price
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite())
            .ok_or_else(|| Error::validation("price", "the price must be a number"))?;
        let subject = required(&self.subject, "subject", "the subject is required")?;
        let grade = self
            .grade
            .trim()
            .parse::<i32>()
            .map_err(|_| Error::validation("grade", "the grade must be a whole number"))?;
        let image_url = required(&self.image_url, "image_url", "the image URL is required")?;
        let description = required(
            &self.description,
            "description",
            "the description is required",
        )?;
        let video_url = required(&self.video_url, "video_url", "the video URL is required")?;

        Ok(CourseRecord {
            teacher_id,
            name,
            price,
            subject,
            grade,
            image_url,
            description,
            video_url,
        })
    }
}

fn required(value: &str, field: &'static str, message: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(field, message));
    }
    Ok(value.to_string())
}

/// Client for the course editor; every operation is scoped to the session's teacher
pub struct CourseEditor<'a> {
    client: &'a ClassVibes,
}

impl<'a> CourseEditor<'a> {
    pub(crate) fn new(client: &'a ClassVibes) -> Self {
        Self { client }
    }

    /// Teacher id of the session, resolved by name when the session lacks one.
    async fn teacher_id(&self) -> Result<i64> {
        let user = self.client.session().require_role(Role::Teacher)?;
        if let Some(id) = user.teacher_id {
            return Ok(id);
        }
        teacher_id_by(self.client, "nombre", &user.name)
            .await?
            .ok_or(Error::TeacherNotResolved)
    }

    /// Courses owned by the teacher
    pub async fn list_mine(&self) -> Result<Vec<Course>> {
        let teacher_id = self.teacher_id().await?;
        let courses = self
            .client
            .from(tables::COURSES)
            .select("*")
            .eq("idprofesor", &teacher_id.to_string())
            .order("idcurso", SortOrder::Ascending)
            .execute::<Course>()
            .await?;
        Ok(courses)
    }

    /// Load one of the teacher's courses for editing
    pub async fn load(&self, course_id: i64) -> Result<Course> {
        let teacher_id = self.teacher_id().await?;
        self.client
            .from(tables::COURSES)
            .select("*")
            .eq("idcurso", &course_id.to_string())
            .eq("idprofesor", &teacher_id.to_string())
            .execute_one::<Course>()
            .await?
            .ok_or(Error::CourseNotFound(course_id))
    }

    pub async fn create(&self, form: &CourseForm) -> Result<Course> {
        let teacher_id = self.teacher_id().await?;
        let record = form.validate(teacher_id)?;

        let inserted = self
            .client
            .from(tables::COURSES)
            .insert(vec![record])
            .await?;
        let course: Course =
            first_row(inserted)?.ok_or_else(|| Error::missing_row("course insert"))?;
        info!("Teacher {} created course {}", teacher_id, course.id);
        Ok(course)
    }

    pub async fn update(&self, course_id: i64, form: &CourseForm) -> Result<Course> {
        let teacher_id = self.teacher_id().await?;
        let record = form.validate(teacher_id)?;

        let updated = self
            .client
            .from(tables::COURSES)
            .eq("idcurso", &course_id.to_string())
            .eq("idprofesor", &teacher_id.to_string())
            .update(&record)
            .await?;
        let course: Course = first_row(updated)?.ok_or(Error::CourseNotFound(course_id))?;
        info!("Teacher {} updated course {}", teacher_id, course_id);
        Ok(course)
    }

    /// Delete one of the teacher's courses
    pub async fn delete(&self, course_id: i64) -> Result<()> {
        let teacher_id = self.teacher_id().await?;
        let deleted = self
            .client
            .from(tables::COURSES)
            .eq("idcurso", &course_id.to_string())
            .eq("idprofesor", &teacher_id.to_string())
            .delete()
            .await?;
        if affected_rows(&deleted) == 0 {
            return Err(Error::Forbidden(
                "cannot delete courses of another teacher".to_string(),
            ));
        }
        info!("Teacher {} deleted course {}", teacher_id, course_id);
        Ok(())
    }
}
