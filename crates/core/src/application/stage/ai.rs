// AI Stage: turn a stored profile into marketplace search terms
use super::extraction::SearchTermExtractor;
use super::StageHandler;
use crate::application::codec::envelope_for;
use crate::domain::{
    AiRequest, Outbound, PipelineTopology, QueueSpec, ScrapeRequest, StageKind, StageSpec,
};
use crate::error::{AppError, Result};
use crate::port::TextCompleter;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct AiStage {
    spec: StageSpec,
    output: QueueSpec,
    completer: Arc<dyn TextCompleter>,
    extractor: SearchTermExtractor,
}

impl AiStage {
    pub fn new(topology: &PipelineTopology, completer: Arc<dyn TextCompleter>) -> Self {
        let spec = StageSpec::new(
            StageKind::Ai,
            topology.ai_requests.clone(),
            Some(topology.scrape_requests.clone()),
        );
        Self {
            spec,
            output: topology.scrape_requests.clone(),
            completer,
            extractor: SearchTermExtractor::standard(),
        }
    }
}

/// Prompt asking for 10-12 short search terms as a bare JSON array
pub fn build_prompt(request: &AiRequest) -> Result<String> {
    let profile = serde_json::to_string(request)
        .map_err(|e| AppError::Internal(format!("profile serialization failed: {}", e)))?;

    Ok(format!(
        "Analiza el siguiente perfil de usuario y genera entre 10 y 12 términos de búsqueda \
         altamente relevantes y específicos para una tienda online. Enfócate en palabras clave \
         concretas relacionadas con marcas, productos o intereses explícitos del usuario. Usa el \
         lenguaje exacto que un usuario escribiría en un buscador, con términos cortos y \
         accionables como 'cámara nikon', 'sony alpha' o 'cámara para paisajes'.\n\n\
         Perfil del usuario: {}\n\n\
         Responde únicamente con un array JSON de strings, por ejemplo: \
         [\"cámara nikon\", \"sony alpha 7\", \"ofertas cámaras canon\"]. \
         No incluyas texto adicional, explicaciones ni markdown.",
        profile
    ))
}

#[async_trait]
impl StageHandler for AiStage {
    type Input = AiRequest;

    fn spec(&self) -> &StageSpec {
        &self.spec
    }

    async fn handle(&self, request: AiRequest) -> Result<Vec<Outbound>> {
        let user_id = request
            .user_id()
            .ok_or_else(|| AppError::Validation("missing user id".to_string()))?;

        let prompt = build_prompt(&request)?;
        let answer = self.completer.complete(&prompt).await?;
        if answer.trim().is_empty() {
            return Err(AppError::EmptyCompletion(format!(
                "no content for user {}",
                user_id
            )));
        }

        let busquedas = self.extractor.extract(&answer)?;
        info!(user_id, terms = busquedas.len(), "Search terms generated");

        let scrape = ScrapeRequest {
            user_id,
            busquedas,
            max_products_per_search: None,
        };
        Ok(vec![Outbound::new(self.output.clone(), envelope_for(&scrape)?)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::codec::decode_payload;
    use crate::application::failure::{classify, FailureClass};
    use crate::domain::{ProfileAnswers, UserSummary};
    use crate::port::completion::mocks::{CompletionReply, ScriptedCompleter};

    fn request() -> AiRequest {
        AiRequest {
            id_usuario: Some(4),
            usuario: UserSummary {
                id: Some(4),
                nombre: "Ana".to_string(),
                edad: 29,
                correo: None,
            },
            formulario: ProfileAnswers {
                temas_de_interes: "fotografía".to_string(),
                ..Default::default()
            },
            comentario_solicitud: String::new(),
        }
    }

    fn stage(completer: ScriptedCompleter) -> AiStage {
        AiStage::new(&PipelineTopology::standard(), Arc::new(completer))
    }

    #[tokio::test]
    async fn test_terms_become_scrape_request() {
        let completer = ScriptedCompleter::always("```json\n[\"cámara nikon\", \"lente 50mm\"]\n```");
        let out = stage(completer.clone()).handle(request()).await.unwrap();

        assert_eq!(out.len(), 1);
        let scrape: ScrapeRequest = decode_payload(&out[0].envelope.payload).unwrap();
        assert_eq!(scrape.user_id, 4);
        assert_eq!(scrape.busquedas, vec!["cámara nikon", "lente 50mm"]);
        assert!(completer.prompts()[0].contains("fotografía"));
    }

    #[tokio::test]
    async fn test_empty_answer_is_transient() {
        let err = stage(ScriptedCompleter::always("   "))
            .handle(request())
            .await
            .unwrap_err();
        assert_eq!(classify(&err), FailureClass::Transient);
    }

    #[tokio::test]
    async fn test_collaborator_failures_keep_their_class() {
        let missing_key = stage(ScriptedCompleter::new(vec![CompletionReply::MissingKey]))
            .handle(request())
            .await
            .unwrap_err();
        assert_eq!(classify(&missing_key), FailureClass::ConfigFatal);

        let bad_json = stage(ScriptedCompleter::always("no puedo ayudar"))
            .handle(request())
            .await
            .unwrap_err();
        assert_eq!(classify(&bad_json), FailureClass::Permanent);

        let throttled = stage(ScriptedCompleter::new(vec![CompletionReply::Status(429)]))
            .handle(request())
            .await
            .unwrap_err();
        assert_eq!(classify(&throttled), FailureClass::Transient);
    }
}
