//! Rows of the remote tables as consumed by the client.
//!
//! Field names are English; the serde renames carry the remote column names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Remote table names
pub mod tables {
    pub const COURSES: &str = "cursos";
    pub const TEACHERS: &str = "profesores";
    pub const ACCOUNTS: &str = "usuario";
    pub const PROFILES: &str = "perfiles";
    pub const ACCOUNT_PROFILES: &str = "usuario_perfil";
    pub const SUBSCRIPTIONS: &str = "usuario_cursos";
    pub const REVIEWS: &str = "resenas";
}

/// A course, table `cursos`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Course {
    #[serde(rename = "idcurso")]
    pub id: i64,
    #[serde(rename = "idprofesor")]
    pub teacher_id: Option<i64>,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "materia")]
    pub subject: Option<String>,
    #[serde(rename = "precio")]
    pub price: Option<f64>,
    #[serde(rename = "aniosecundaria")]
    pub grade: Option<i32>,
    #[serde(rename = "descripcion")]
    pub description: Option<String>,
    #[serde(rename = "fotocurso")]
    pub image_url: Option<String>,
    #[serde(rename = "videocurso")]
    pub video_url: Option<String>,
}

impl Course {
    /// Free courses skip the payment step.
    pub fn is_free(&self) -> bool {
        self.price.map_or(true, |price| price <= 0.0)
    }
}

/// Insert/update payload of the course editor
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CourseRecord {
    #[serde(rename = "idprofesor")]
    pub teacher_id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "precio")]
    pub price: f64,
    #[serde(rename = "materia")]
    pub subject: String,
    #[serde(rename = "aniosecundaria")]
    pub grade: i32,
    #[serde(rename = "fotocurso")]
    pub image_url: String,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "videocurso")]
    pub video_url: String,
}

/// A teacher, table `profesores`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Teacher {
    #[serde(rename = "idprofesor")]
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    pub email: Option<String>,
    #[serde(rename = "clave", skip_serializing)]
    pub credential: Option<String>,
    #[serde(rename = "materia")]
    pub subject: Option<String>,
    #[serde(rename = "experiencia")]
    pub experience: Option<i32>,
    #[serde(rename = "fotoperfil")]
    pub photo_url: Option<String>,
    #[serde(rename = "valoracion")]
    pub rating: Option<f64>,
    #[serde(rename = "busquedas")]
    pub search_count: Option<i64>,
    #[serde(rename = "cantcursos")]
    pub course_count: Option<i64>,
    #[serde(rename = "cantalumnos")]
    pub student_count: Option<i64>,
}

/// Insert payload for a new teacher; counters start at zero.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewTeacher {
    #[serde(rename = "nombre")]
    pub name: String,
    pub email: String,
    #[serde(rename = "clave")]
    pub credential: String,
    #[serde(rename = "materia")]
    pub subject: String,
    #[serde(rename = "experiencia")]
    pub experience: i32,
    #[serde(rename = "fotoperfil")]
    pub photo_url: Option<String>,
    #[serde(rename = "valoracion")]
    pub rating: f64,
    #[serde(rename = "busquedas")]
    pub search_count: i64,
    #[serde(rename = "cantcursos")]
    pub course_count: i64,
    #[serde(rename = "cantalumnos")]
    pub student_count: i64,
}

/// Update payload; the photo is only sent when one was given.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TeacherUpdate {
    #[serde(rename = "nombre")]
    pub name: String,
    pub email: String,
    #[serde(rename = "clave")]
    pub credential: String,
    #[serde(rename = "materia")]
    pub subject: String,
    #[serde(rename = "experiencia")]
    pub experience: i32,
    #[serde(rename = "fotoperfil", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// A user account, table `usuario`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Account {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    pub username: Option<String>,
    #[serde(
        rename = "contraseña",
        alias = "contrasena",
        alias = "password",
        alias = "clave"
    )]
    pub password: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "fotoperfil")]
    pub photo_url: Option<String>,
    #[serde(rename = "usuario_perfil", default)]
    pub profiles: Vec<AccountProfile>,
}

impl Account {
    /// Name of the first profile assigned to the account, lower-cased.
    pub fn profile_name(&self) -> Option<String> {
        self.profiles
            .iter()
            .find_map(|p| p.profile.as_ref())
            .map(|p| p.name.to_lowercase())
    }
}

/// Embedded `usuario_perfil(perfiles(id, nombre))` row
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AccountProfile {
    #[serde(rename = "perfiles")]
    pub profile: Option<Profile>,
}

/// Insert payload for a new account; optional demographics are sent as null.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewAccount {
    #[serde(rename = "nombre")]
    pub name: String,
    pub username: String,
    #[serde(rename = "contraseña")]
    pub password: String,
    pub email: String,
    #[serde(rename = "fotoperfil")]
    pub photo_url: Option<String>,
    #[serde(rename = "fechanacimiento")]
    pub birth_date: Option<String>,
    #[serde(rename = "genero")]
    pub gender: Option<String>,
    #[serde(rename = "aniosecundaria")]
    pub grade: Option<i32>,
    #[serde(rename = "telefono")]
    pub phone: Option<String>,
    #[serde(rename = "edad")]
    pub age: Option<i32>,
}

/// A role, table `perfiles`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
}

/// Role assignment, table `usuario_perfil`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleAssignment {
    pub usuario_id: i64,
    pub perfil_id: i64,
}

/// Enrollment of a student in a course, table `usuario_cursos`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    #[serde(rename = "idcurso")]
    pub course_id: i64,
    #[serde(rename = "idalumno")]
    pub student_id: i64,
    #[serde(rename = "cursos", default, skip_serializing)]
    pub course: Option<Course>,
}

impl Subscription {
    pub fn new(course_id: i64, student_id: i64) -> Self {
        Self {
            course_id,
            student_id,
            course: None,
        }
    }
}

/// A review, table `resenas`, with its author embedded
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Review {
    #[serde(rename = "texto")]
    pub text: String,
    #[serde(rename = "idalumno")]
    pub student_id: Option<i64>,
    #[serde(rename = "usuario")]
    pub author: Option<ReviewAuthor>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReviewAuthor {
    #[serde(rename = "nombre")]
    pub name: Option<String>,
    #[serde(rename = "fotoperfil")]
    pub photo_url: Option<String>,
}

/// First `max_chars` characters of `text`.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Decode the first row of a `return=representation` write response.
pub(crate) fn first_row<T: for<'de> Deserialize<'de>>(value: Value) -> Result<Option<T>> {
    let row = match value {
        Value::Array(rows) => rows.into_iter().next(),
        Value::Null => None,
        other => Some(other),
    };
    match row {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}
