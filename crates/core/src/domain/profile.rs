// Profile Persistence Model

use super::payload::{IntakeForm, ProfileAnswers, UserSummary};

pub type UserId = i64;
pub type RequestId = i64;

/// User row about to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub nombre: String,
    pub edad: i32,
    pub correo: Option<String>,
}

impl NewUser {
    pub fn from_form(form: &IntakeForm) -> Self {
        Self {
            nombre: form.nombre_usuario.trim().to_string(),
            edad: form.edad,
            correo: form.correo.clone(),
        }
    }
}

/// One recommendation request (user + test answers + free-text comment)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub id: RequestId,
    pub user_id: UserId,
    pub test_id: i64,
    pub comentario: String,
    /// Milliseconds since epoch
    pub created_at: i64,
}

/// Product URL found for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundUrl {
    pub url: String,
    /// Milliseconds since epoch
    pub found_at: i64,
}

/// Everything stored for a user: profile, latest answers, latest request and its URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProfile {
    pub user: UserSummary,
    /// Answers of the latest request (defaults when the user has none)
    pub answers: ProfileAnswers,
    pub request: Option<RequestRecord>,
    pub urls: Vec<FoundUrl>,
}
