// Intake Stage: persist the submitted profile, hand off to the AI stage
use super::StageHandler;
use crate::application::codec::envelope_for;
use crate::domain::{
    AiRequest, IntakeForm, IntakeReply, NewUser, Outbound, PipelineTopology, RequestId,
    StageKind, StageSpec, UserId, UserSummary,
};
use crate::error::{AppError, Result};
use crate::port::{ProfileTransaction, TransactionalProfileRepository};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub struct IntakeStage {
    spec: StageSpec,
    topology: PipelineTopology,
    repo: Arc<dyn TransactionalProfileRepository>,
}

impl IntakeStage {
    pub fn new(topology: PipelineTopology, repo: Arc<dyn TransactionalProfileRepository>) -> Self {
        let spec = StageSpec::new(
            StageKind::Intake,
            topology.intake.clone(),
            Some(topology.ai_requests.clone()),
        );
        Self {
            spec,
            topology,
            repo,
        }
    }

    /// user + test + request, all or nothing
    async fn persist(&self, form: &IntakeForm) -> Result<(UserId, RequestId)> {
        let mut tx = self.repo.begin_transaction().await?;
        match insert_profile(tx.as_mut(), form).await {
            Ok(ids) => {
                tx.commit().await?;
                Ok(ids)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Intake rollback failed");
                }
                Err(e)
            }
        }
    }
}

async fn insert_profile(
    tx: &mut dyn ProfileTransaction,
    form: &IntakeForm,
) -> Result<(UserId, RequestId)> {
    let user_id = tx.insert_user(&NewUser::from_form(form)).await?;
    let test_id = tx.insert_test(&form.answers).await?;
    let request_id = tx
        .insert_request(user_id, test_id, &form.comentario_solicitud)
        .await?;
    Ok((user_id, request_id))
}

#[async_trait]
impl StageHandler for IntakeStage {
    type Input = IntakeForm;

    fn spec(&self) -> &StageSpec {
        &self.spec
    }

    async fn handle(&self, form: IntakeForm) -> Result<Vec<Outbound>> {
        let (user_id, request_id) = self.persist(&form).await?;
        info!(user_id, request_id, "Profile registered");

        let user = NewUser::from_form(&form);
        let ai_request = AiRequest {
            id_usuario: Some(user_id),
            usuario: UserSummary {
                id: Some(user_id),
                nombre: user.nombre.clone(),
                edad: user.edad,
                correo: user.correo,
            },
            formulario: form.answers,
            comentario_solicitud: form.comentario_solicitud,
        };
        let reply = IntakeReply::registered(user_id, &user.nombre);

        Ok(vec![
            Outbound::new(self.topology.ai_requests.clone(), envelope_for(&ai_request)?),
            Outbound::notice(self.topology.responses.clone(), envelope_for(&reply)?),
        ])
    }

    fn rejection_notice(&self, error: &AppError) -> Option<Outbound> {
        let reply = IntakeReply::Failed {
            error: format!("No se pudo registrar la información: {}", error),
        };
        envelope_for(&reply)
            .ok()
            .map(|envelope| Outbound::notice(self.topology.responses.clone(), envelope))
    }
}
