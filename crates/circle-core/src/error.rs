use uuid::Uuid;

use circle_backend::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("not signed in")]
    NotSignedIn,

    #[error("session expired, sign in again")]
    SessionExpired,

    #[error("no profile row for user {0}")]
    UnknownUser(Uuid),

    #[error("not in a group yet")]
    NoGroup,

    #[error("the group has no active prompt")]
    NoActivePrompt,

    #[error("already responded to this prompt")]
    AlreadySubmitted,

    #[error("message is empty")]
    EmptyMessage,

    #[error("response is empty")]
    EmptyResponse,

    #[error("reaction has no emoji")]
    EmptyReaction,

    #[error("'{answer}' is not a valid answer for {question}")]
    InvalidAnswer { question: String, answer: String },

    #[error("{0} has no answer")]
    UnansweredQuestion(String),

    #[error("finish the personality quiz before joining a group")]
    QuizIncomplete,

    #[error("message {0} is not loaded")]
    UnknownMessage(Uuid),

    #[error("translation failed: {0}")]
    Translation(String),

    #[error("session file: {0}")]
    SessionFile(#[from] std::io::Error),

    #[error("session file is unreadable: {0}")]
    SessionFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
