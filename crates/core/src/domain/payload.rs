// Stage Payload Schemas
//
// One typed payload per queue. Each declares the keys its consuming stage
// requires; everything else is optional and defaulted.

use super::error::{DomainError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Upper bound accepted for `edad`
pub const MAX_AGE: i32 = 150;

/// Schema-tagged pipeline payload
pub trait StagePayload: Serialize + DeserializeOwned + Send + 'static {
    /// Schema tag used in logs
    const SCHEMA: &'static str;

    /// Top-level keys that must be present before deserializing
    const REQUIRED_KEYS: &'static [&'static str];

    /// Correlation id (user id) carried on the envelope
    fn correlation_id(&self) -> Option<String>;

    /// Semantic checks that serde cannot express
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Answers to the shopping-profile questionnaire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileAnswers {
    #[serde(deserialize_with = "lenient_text")]
    pub motivo_compra: String,
    #[serde(deserialize_with = "lenient_text")]
    pub fuente_informacion: String,
    #[serde(deserialize_with = "lenient_text")]
    pub temas_de_interes: String,
    #[serde(deserialize_with = "lenient_text")]
    pub compras_no_necesarias: String,
    #[serde(deserialize_with = "lenient_text")]
    pub importancia_marca: String,
    #[serde(deserialize_with = "lenient_text")]
    pub probar_nuevos_productos: String,
    #[serde(deserialize_with = "lenient_text")]
    pub aspiraciones: String,
    #[serde(deserialize_with = "lenient_text")]
    pub nivel_social: String,
    #[serde(deserialize_with = "lenient_text")]
    pub tiempo_libre: String,
    #[serde(deserialize_with = "lenient_text")]
    pub identidad: String,
    #[serde(deserialize_with = "lenient_text")]
    pub tendencias: String,
}

/// Form submitted through the front door (`intake` queue)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeForm {
    pub nombre_usuario: String,
    #[serde(deserialize_with = "flexible_age")]
    pub edad: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correo: Option<String>,
    #[serde(flatten)]
    pub answers: ProfileAnswers,
    #[serde(default, deserialize_with = "lenient_text")]
    pub comentario_solicitud: String,
}

impl StagePayload for IntakeForm {
    const SCHEMA: &'static str = "intake.v1";
    const REQUIRED_KEYS: &'static [&'static str] = &["nombreUsuario", "edad"];

    fn correlation_id(&self) -> Option<String> {
        None
    }

    fn validate(&self) -> Result<()> {
        if self.nombre_usuario.trim().is_empty() {
            return Err(DomainError::InvalidPayload(
                "nombreUsuario cannot be empty".to_string(),
            ));
        }
        if !(0..=MAX_AGE).contains(&self.edad) {
            return Err(DomainError::InvalidPayload(format!(
                "edad out of range (0-{}): {}",
                MAX_AGE, self.edad
            )));
        }
        Ok(())
    }
}

/// Reply to the display surface (`responses` queue)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntakeReply {
    Registered {
        id_usuario: i64,
        nombre: String,
        mensaje: String,
    },
    Failed {
        error: String,
    },
}

impl IntakeReply {
    pub fn registered(user_id: i64, nombre: &str) -> Self {
        IntakeReply::Registered {
            id_usuario: user_id,
            nombre: nombre.to_string(),
            mensaje: format!(
                "Hola {}, tu información ha sido registrada correctamente.",
                nombre
            ),
        }
    }
}

impl StagePayload for IntakeReply {
    const SCHEMA: &'static str = "responses.v1";
    // Either variant is acceptable; the untagged decode enforces the shape
    const REQUIRED_KEYS: &'static [&'static str] = &[];

    fn correlation_id(&self) -> Option<String> {
        match self {
            IntakeReply::Registered { id_usuario, .. } => Some(id_usuario.to_string()),
            IntakeReply::Failed { .. } => None,
        }
    }
}

/// Persisted user as echoed to downstream stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub nombre: String,
    pub edad: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correo: Option<String>,
}

/// Profile analysis request (`ai-requests` queue)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_usuario: Option<i64>,
    #[serde(default)]
    pub usuario: UserSummary,
    pub formulario: ProfileAnswers,
    #[serde(
        default,
        rename = "comentarioSolicitud",
        deserialize_with = "lenient_text"
    )]
    pub comentario_solicitud: String,
}

impl AiRequest {
    /// `id_usuario`, falling back to `usuario.id`
    pub fn user_id(&self) -> Option<i64> {
        self.id_usuario.or(self.usuario.id)
    }
}

impl StagePayload for AiRequest {
    const SCHEMA: &'static str = "ai-requests.v1";
    const REQUIRED_KEYS: &'static [&'static str] = &["formulario"];

    fn correlation_id(&self) -> Option<String> {
        self.user_id().map(|id| id.to_string())
    }

    fn validate(&self) -> Result<()> {
        if self.user_id().is_none() {
            return Err(DomainError::InvalidPayload(
                "missing user id (id_usuario or usuario.id)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Search terms for the marketplace (`scrape-requests` queue)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub user_id: i64,
    pub busquedas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_products_per_search: Option<usize>,
}

impl StagePayload for ScrapeRequest {
    const SCHEMA: &'static str = "scrape-requests.v1";
    const REQUIRED_KEYS: &'static [&'static str] = &["user_id", "busquedas"];

    fn correlation_id(&self) -> Option<String> {
        Some(self.user_id.to_string())
    }

    fn validate(&self) -> Result<()> {
        if self.max_products_per_search == Some(0) {
            return Err(DomainError::InvalidPayload(
                "max_products_per_search must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Collected product URLs (`scraped-urls` queue)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedUrls {
    pub user_id: i64,
    pub urls: Vec<String>,
}

impl StagePayload for ScrapedUrls {
    const SCHEMA: &'static str = "scraped-urls.v1";
    const REQUIRED_KEYS: &'static [&'static str] = &["user_id", "urls"];

    fn correlation_id(&self) -> Option<String> {
        Some(self.user_id.to_string())
    }
}

/// Age as a JSON number or a numeric string ("29")
fn flexible_age<'de, D>(deserializer: D) -> std::result::Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = serde_json::Value::deserialize(deserializer)?;
    let parsed = match &value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| D::Error::custom(format!("edad is not a whole number: {}", value)))
}

/// Free-text answer: strings pass through, lists are joined, scalars stringified, null is empty
fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value_to_text(&value))
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
