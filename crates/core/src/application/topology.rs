// Queue Topology Registrar
use crate::domain::PipelineTopology;
use crate::error::{AppError, Result};
use crate::port::BrokerConnection;
use tracing::{debug, error, info};

/// Declares every queue the pipeline uses
///
/// Redundant calls (from several processes) are harmless; a conflicting
/// existing declaration is fatal and never retried.
#[derive(Debug, Clone, Default)]
pub struct TopologyRegistrar {
    topology: PipelineTopology,
}

impl TopologyRegistrar {
    pub fn new(topology: PipelineTopology) -> Self {
        Self { topology }
    }

    pub fn topology(&self) -> &PipelineTopology {
        &self.topology
    }

    pub async fn ensure(&self, conn: &dyn BrokerConnection) -> Result<()> {
        for queue in self.topology.queues() {
            queue.validate()?;
            match conn.declare_queue(queue).await {
                Ok(()) => debug!(queue = %queue.name, durable = queue.durable, "Queue declared"),
                Err(e @ AppError::TopologyConflict(_)) => {
                    error!(queue = %queue.name, severity = "critical", error = %e, "Queue topology conflict");
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }

        info!(queues = self.topology.queues().len(), "Pipeline topology ensured");
        Ok(())
    }
}
