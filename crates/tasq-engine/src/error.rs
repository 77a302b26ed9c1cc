use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Task store internal error: {0}")]
    Internal(String),
}
