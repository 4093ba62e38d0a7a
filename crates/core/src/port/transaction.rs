// Transaction port for the all-or-nothing intake insert

use crate::domain::{NewUser, ProfileAnswers, RequestId, UserId};
use crate::error::Result;
use async_trait::async_trait;

/// Transaction trait for atomic multi-step operations
#[async_trait]
pub trait Transaction: Send {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Repository that can open profile transactions
#[async_trait]
pub trait TransactionalProfileRepository: Send + Sync {
    /// Begin a new transaction
    async fn begin_transaction(&self) -> Result<Box<dyn ProfileTransaction>>;
}

/// Intake inserts, visible to readers only after commit
#[async_trait]
pub trait ProfileTransaction: Transaction {
    /// Insert user, returns its id
    async fn insert_user(&mut self, user: &NewUser) -> Result<UserId>;

    /// Insert questionnaire answers, returns the test id
    async fn insert_test(&mut self, answers: &ProfileAnswers) -> Result<i64>;

    /// Insert the request tying user and test together
    async fn insert_request(
        &mut self,
        user_id: UserId,
        test_id: i64,
        comentario: &str,
    ) -> Result<RequestId>;
}
