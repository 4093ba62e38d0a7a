//! HTTP Request/Response Types

use chrono::{DateTime, SecondsFormat};
use serde::Serialize;
use smartsearch_core::domain::{FoundUrl, ProfileAnswers, StoredProfile};

/// POST /recomendar-productos
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub queue: String,
}

/// GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// GET /formulary/{user_id}
#[derive(Debug, Clone, Serialize)]
pub struct FormularyResponse {
    pub usuario: UsuarioView,
    pub formulario: ProfileAnswers,
    pub solicitud: Option<SolicitudView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsuarioView {
    pub id: i64,
    pub nombre: String,
    pub edad: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolicitudView {
    pub id: i64,
    pub comentario: String,
    pub urls: Vec<UrlView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UrlView {
    pub url: String,
    /// RFC 3339, UTC
    pub fecha: String,
}

impl From<&FoundUrl> for UrlView {
    fn from(found: &FoundUrl) -> Self {
        let fecha = DateTime::from_timestamp_millis(found.found_at)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default();
        Self {
            url: found.url.clone(),
            fecha,
        }
    }
}

impl FormularyResponse {
    pub fn from_profile(user_id: i64, profile: StoredProfile) -> Self {
        let solicitud = profile.request.map(|request| SolicitudView {
            id: request.id,
            comentario: request.comentario,
            urls: profile.urls.iter().map(UrlView::from).collect(),
        });

        Self {
            usuario: UsuarioView {
                id: profile.user.id.unwrap_or(user_id),
                nombre: profile.user.nombre,
                edad: profile.user.edad,
            },
            formulario: profile.answers,
            solicitud,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_view_formats_millis() {
        let view = UrlView::from(&FoundUrl {
            url: "https://articulo.mercadolibre.com.co/MCO-1".to_string(),
            found_at: 1_700_000_000_123,
        });
        assert_eq!(view.fecha, "2023-11-14T22:13:20.123Z");
    }
}
