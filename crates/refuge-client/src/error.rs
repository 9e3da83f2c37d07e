use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// No token configured. Raised before any request goes out.
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("realtime error: {0}")]
    Realtime(String),

    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),
}

impl ClientError {
    /// Text suitable for a toast.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::NotAuthenticated => "Please sign in again.".into(),
            ClientError::Http { message, .. } if !message.is_empty() => message.clone(),
            ClientError::Http { status, .. } => format!("Request failed ({})", status),
            ClientError::Transport(_) | ClientError::Realtime(_) => {
                "Could not reach the server. Check your connection.".into()
            }
            ClientError::Decode(_) => "The server sent an unexpected response.".into(),
            ClientError::Validation(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        assert_eq!(ClientError::NotAuthenticated.to_string(), "Not authenticated");
        let http = ClientError::Http {
            status: 409,
            message: "cannot move a rejected match to accepted".into(),
        };
        assert_eq!(http.user_message(), "cannot move a rejected match to accepted");
        let bare = ClientError::Http {
            status: 502,
            message: String::new(),
        };
        assert_eq!(bare.user_message(), "Request failed (502)");
    }
}
