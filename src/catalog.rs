//! Public listings: courses with their teacher, teachers with their courses,
//! and the home page reviews.
//!
//! Reads here never fail the screen. A failed read is logged and the listing
//! degrades to what could be loaded.

use log::{debug, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::models::{tables, Course, Review, Teacher};
use crate::ClassVibes;
use classvibes_postgrest::SortOrder;

/// Reviews shown on the home page
pub const HOME_REVIEW_COUNT: i32 = 3;

/// Teacher columns joined into the course listing
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TeacherSummary {
    #[serde(rename = "idprofesor")]
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "materia")]
    pub subject: Option<String>,
    #[serde(rename = "fotoperfil")]
    pub photo_url: Option<String>,
}

/// Course columns grouped into the teacher listing
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CourseSummary {
    #[serde(rename = "idcurso")]
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "idprofesor")]
    pub teacher_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseListing {
    pub course: Course,
    pub teacher: Option<TeacherSummary>,
    /// Whether the logged-in student is subscribed
    pub subscribed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeacherListing {
    pub teacher: Teacher,
    pub courses: Vec<CourseSummary>,
}

#[derive(Deserialize)]
struct SubscribedCourse {
    #[serde(rename = "idcurso")]
    course_id: i64,
}

/// Client for the listing screens
pub struct Catalog<'a> {
    client: &'a ClassVibes,
}

impl<'a> Catalog<'a> {
    pub(crate) fn new(client: &'a ClassVibes) -> Self {
        Self { client }
    }

    /// All courses, each joined with its teacher.
    ///
    /// Teachers are fetched in one `in` query over the distinct teacher ids
    /// and joined client-side. When the course read fails the listing is
    /// empty; when the teacher read fails courses come without teachers.
    pub async fn courses(&self) -> Vec<CourseListing> {
        let courses = match self
            .client
            .from(tables::COURSES)
            .select("*")
            .execute::<Course>()
            .await
        {
            Ok(courses) => courses,
            Err(e) => {
                warn!("Failed to load courses: {}", e);
                return Vec::new();
            }
        };
        if courses.is_empty() {
            return Vec::new();
        }

        let teachers = self.teachers_by_id(&courses).await;
        let subscribed = self.subscribed_course_ids().await;

        courses
            .into_iter()
            .map(|course| CourseListing {
                teacher: course.teacher_id.and_then(|id| teachers.get(&id).cloned()),
                subscribed: subscribed.contains(&course.id),
                course,
            })
            .collect()
    }

    /// All teachers, each with the courses they own.
    pub async fn teachers(&self) -> Vec<TeacherListing> {
        let teachers = match self
            .client
            .from(tables::TEACHERS)
            .select("*")
            .execute::<Teacher>()
            .await
        {
            Ok(teachers) => teachers,
            Err(e) => {
                warn!("Failed to load teachers: {}", e);
                return Vec::new();
            }
        };
        if teachers.is_empty() {
            return Vec::new();
        }

        let mut by_teacher: HashMap<i64, Vec<CourseSummary>> = HashMap::new();
        match self
            .client
            .from(tables::COURSES)
            .select("idcurso,nombre,idprofesor")
            .execute::<CourseSummary>()
            .await
        {
            Ok(courses) => {
                for course in courses {
                    if let Some(teacher_id) = course.teacher_id {
                        by_teacher.entry(teacher_id).or_default().push(course);
                    }
                }
            }
            Err(e) => warn!("Failed to load courses for the teacher listing: {}", e),
        }

        teachers
            .into_iter()
            .map(|teacher| TeacherListing {
                courses: by_teacher.remove(&teacher.id).unwrap_or_default(),
                teacher,
            })
            .collect()
    }

    /// The first reviews by id, with their author.
    pub async fn reviews(&self) -> Vec<Review> {
        match self
            .client
            .from(tables::REVIEWS)
            .select("texto,idalumno,usuario(nombre,fotoperfil)")
            .order("idresena", SortOrder::Ascending)
            .limit(HOME_REVIEW_COUNT)
            .execute::<Review>()
            .await
        {
            Ok(reviews) => reviews,
            Err(e) => {
                warn!("Failed to load reviews: {}", e);
                Vec::new()
            }
        }
    }

    async fn teachers_by_id(&self, courses: &[Course]) -> BTreeMap<i64, TeacherSummary> {
        let ids: Vec<i64> = courses
            .iter()
            .filter_map(|c| c.teacher_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return BTreeMap::new();
        }

        match self
            .client
            .from(tables::TEACHERS)
            .select("idprofesor,nombre,materia,fotoperfil")
            .in_list("idprofesor", &ids)
            .execute::<TeacherSummary>()
            .await
        {
            Ok(teachers) => teachers.into_iter().map(|t| (t.id, t)).collect(),
            Err(e) => {
                warn!("Failed to load teachers for the course listing: {}", e);
                BTreeMap::new()
            }
        }
    }

    /// Course ids the logged-in student is subscribed to; empty for anyone else.
    async fn subscribed_course_ids(&self) -> HashSet<i64> {
        let Some(student_id) = self.client.session().current().and_then(|u| u.student_id()) else {
            return HashSet::new();
        };
        debug!("Loading subscriptions of student {}", student_id);
        match self
            .client
            .from(tables::SUBSCRIPTIONS)
            .select("idcurso")
            .eq("idalumno", &student_id.to_string())
            .execute::<SubscribedCourse>()
            .await
        {
            Ok(rows) => rows.into_iter().map(|r| r.course_id).collect(),
            Err(e) => {
                warn!("Failed to load subscriptions: {}", e);
                HashSet::new()
            }
        }
    }
}
