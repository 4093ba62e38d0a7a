//! HTTP Route Handlers

use crate::error::ApiError;
use crate::types::{AcceptedResponse, FormularyResponse, HealthResponse};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use smartsearch_core::application::codec::{decode_payload, envelope_for};
use smartsearch_core::application::StageProducer;
use smartsearch_core::domain::{IntakeForm, QueueSpec};
use smartsearch_core::error::AppError;
use smartsearch_core::port::{ChatCompletionRequest, ChatCompletions, ProfileRepository};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared handler dependencies
#[derive(Clone)]
pub struct AppState {
    pub producer: StageProducer,
    pub intake: QueueSpec,
    pub profiles: Arc<dyn ProfileRepository>,
    /// Model provider behind the chat proxy; unset answers 500
    pub chat: Option<Arc<dyn ChatCompletions>>,
}

impl AppState {
    pub fn new(
        producer: StageProducer,
        intake: QueueSpec,
        profiles: Arc<dyn ProfileRepository>,
    ) -> Self {
        Self {
            producer,
            intake,
            profiles,
            chat: None,
        }
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatCompletions>) -> Self {
        self.chat = Some(chat);
        self
    }
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "smartsearch",
        version: smartsearch_core::VERSION,
    })
}

/// POST /recomendar-productos
///
/// Validates the form and publishes it to the intake queue. Never waits for
/// the pipeline: registration happens asynchronously in the Intake Stage.
pub async fn recommend_products(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let form: IntakeForm = decode_payload(body.as_bytes())?;
    let envelope = envelope_for(&form)?;

    state.producer.publish(&state.intake, &envelope).await?;

    info!(
        queue = %state.intake.name,
        nombre = %form.nombre_usuario.trim(),
        edad = form.edad,
        "Form accepted"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "accepted",
            queue: state.intake.name.clone(),
        }),
    ))
}

/// GET /formulary/{user_id}
pub async fn formulary(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<FormularyResponse>, ApiError> {
    let profile = state
        .profiles
        .find_profile(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))?;

    Ok(Json(FormularyResponse::from_profile(user_id, profile)))
}

/// POST /api/v1/chat/completions
///
/// Relays a chat request to the model provider. Provider error statuses are
/// passed back to the caller unchanged.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Response, ApiError> {
    let chat = state
        .chat
        .as_ref()
        .ok_or_else(|| AppError::Config("AI proxy is not configured".to_string()))?;
    let fields: Map<String, Value> = serde_json::from_str(&body)
        .map_err(|_| AppError::Decode("Request body debe ser JSON".to_string()))?;
    let request = ChatCompletionRequest::from_body(&fields)?;

    match chat.chat(&request).await {
        Ok(answer) => Ok(Json(answer).into_response()),
        Err(AppError::Upstream { status, message }) => {
            warn!(status, model = %request.model, "AI provider rejected proxied chat");
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            Ok((
                status,
                Json(json!({
                    "error": "Error en la comunicación con la API de IA",
                    "details": message,
                })),
            )
                .into_response())
        }
        Err(AppError::Network(e)) => {
            warn!(error = %e, model = %request.model, "AI provider unreachable");
            Ok((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Error de red o configuración al contactar la API de IA" })),
            )
                .into_response())
        }
        Err(AppError::Decode(e)) => {
            warn!(error = %e, model = %request.model, "AI provider answered with an unreadable body");
            Ok((
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "Respuesta inválida de la API de IA" })),
            )
                .into_response())
        }
        Err(other) => Err(other.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use smartsearch_core::application::ConnectPolicy;
    use smartsearch_core::domain::{PipelineTopology, INTAKE_QUEUE};
    use smartsearch_core::port::broker::mocks::InMemoryBroker;
    use smartsearch_core::port::completion::mocks::{CompletionReply, ScriptedCompleter};
    use smartsearch_core::port::profile_repository::mocks::InMemoryProfileRepository;
    use std::time::Duration;

    fn state(broker: &InMemoryBroker, repo: &InMemoryProfileRepository) -> Arc<AppState> {
        let producer = StageProducer::new(
            Arc::new(broker.clone()),
            ConnectPolicy {
                max_attempts: 1,
                backoff: Duration::from_millis(1),
            },
        );
        Arc::new(AppState::new(
            producer,
            PipelineTopology::standard().intake,
            Arc::new(repo.clone()),
        ))
    }

    #[tokio::test]
    async fn test_valid_form_is_queued() {
        let broker = InMemoryBroker::new();
        let repo = InMemoryProfileRepository::new();
        let body = r#"{"nombreUsuario":"Ana","edad":"29","temasDeInteres":"fotografía"}"#;

        let (status, Json(resp)) = recommend_products(State(state(&broker, &repo)), body.to_string())
            .await
            .unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(resp.queue, INTAKE_QUEUE);
        let queued = broker.messages(INTAKE_QUEUE);
        assert_eq!(queued.len(), 1);
        let form: IntakeForm = decode_payload(&queued[0].payload).unwrap();
        assert_eq!(form.edad, 29);
        assert_eq!(form.answers.temas_de_interes, "fotografía");
        // Nothing is persisted by the front door
        assert_eq!(repo.user_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_forms_are_rejected() {
        let broker = InMemoryBroker::new();
        let repo = InMemoryProfileRepository::new();

        for body in ["not json", r#"{"edad": 30}"#, r#"{"nombreUsuario":"Ana","edad":"treinta"}"#] {
            let err = recommend_products(State(state(&broker, &repo)), body.to_string())
                .await
                .unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        }
        assert!(broker.messages(INTAKE_QUEUE).is_empty());
    }

    #[tokio::test]
    async fn test_broker_outage_is_service_unavailable() {
        let broker = InMemoryBroker::new();
        broker.fail_publishes_to(INTAKE_QUEUE);
        let repo = InMemoryProfileRepository::new();

        let err = recommend_products(
            State(state(&broker, &repo)),
            r#"{"nombreUsuario":"Ana","edad":29}"#.to_string(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_formulary_lookup() {
        let broker = InMemoryBroker::new();
        let repo = InMemoryProfileRepository::new();
        let (user_id, request_id) = repo.seed_request("Ana", "busco cámaras");
        repo.replace_found_urls(request_id, &["https://articulo.mercadolibre.com.co/MCO-1".to_string()])
            .await
            .unwrap();

        let Json(resp) = formulary(State(state(&broker, &repo)), Path(user_id))
            .await
            .unwrap();
        assert_eq!(resp.usuario.id, user_id);
        assert_eq!(resp.usuario.nombre, "Ana");
        let solicitud = resp.solicitud.unwrap();
        assert_eq!(solicitud.id, request_id);
        assert_eq!(solicitud.comentario, "busco cámaras");
        assert_eq!(solicitud.urls.len(), 1);

        let missing = formulary(State(state(&broker, &repo)), Path(9999))
            .await
            .unwrap_err();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    fn chat_state(completer: &ScriptedCompleter) -> Arc<AppState> {
        let broker = InMemoryBroker::new();
        let repo = InMemoryProfileRepository::new();
        let state = state(&broker, &repo);
        Arc::new((*state).clone().with_chat(Arc::new(completer.clone())))
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const CHAT_BODY: &str = r#"{"model":"qwen/qwen3-235b-a22b","messages":[{"role":"user","content":"hola"}],"top_p":0.9}"#;

    #[tokio::test]
    async fn test_chat_proxy_relays_answer() {
        let completer = ScriptedCompleter::always("¡Hola!");

        let response = chat_completions(State(chat_state(&completer)), CHAT_BODY.to_string())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["choices"][0]["message"]["content"], "¡Hola!");

        let sent = completer.chats();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].model, "qwen/qwen3-235b-a22b");
        assert_eq!(sent[0].options.get("top_p"), Some(&json!(0.9)));
    }

    #[tokio::test]
    async fn test_chat_proxy_rejects_bad_bodies() {
        let completer = ScriptedCompleter::always("unused");

        for body in ["not json", "[1,2]", r#"{"model":"m"}"#, r#"{"messages":[{"role":"user","content":"x"}]}"#] {
            let err = chat_completions(State(chat_state(&completer)), body.to_string())
                .await
                .unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        }
        assert!(completer.chats().is_empty());
    }

    #[tokio::test]
    async fn test_chat_proxy_error_statuses() {
        let upstream = ScriptedCompleter::new(vec![CompletionReply::Status(402)]);
        let response = chat_completions(State(chat_state(&upstream)), CHAT_BODY.to_string())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Error en la comunicación con la API de IA");
        assert_eq!(body["details"], "scripted failure");

        let offline = ScriptedCompleter::new(vec![CompletionReply::Network("refused".into())]);
        let response = chat_completions(State(chat_state(&offline)), CHAT_BODY.to_string())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let keyless = ScriptedCompleter::new(vec![CompletionReply::MissingKey]);
        let err = chat_completions(State(chat_state(&keyless)), CHAT_BODY.to_string())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_chat_proxy_without_provider_is_server_error() {
        let broker = InMemoryBroker::new();
        let repo = InMemoryProfileRepository::new();

        let err = chat_completions(State(state(&broker, &repo)), CHAT_BODY.to_string())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
