use crm_auth::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CustomerError {
    #[error("Customer {id} not found")]
    NotFound { id: i64 },

    #[error(transparent)]
    Request(#[from] ClientError),
}

impl CustomerError {
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { .. } => self.to_string(),
            Self::Request(e) => e.user_message(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CustomerError>;
