//! Provider presets and the inference failure taxonomy.

/// Known local inference servers and their conventional ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    LlamaCpp,
    LmStudio,
}

impl Provider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::LlamaCpp => "http://localhost:8080",
            Provider::LmStudio => "http://localhost:1234",
        }
    }
}

/// Everything that can go wrong talking to the endpoint.
///
/// The client never lets a transport fault escape as a panic or an
/// unhandled error type; callers always receive one of these.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The request could not be sent or completed.
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}")]
    Http { status: u16 },

    /// The body was not a recognizable chat completion.
    #[error("invalid response format from server")]
    MalformedResponse,
}

impl InferenceError {
    /// The user-visible message shown in place of a model response.
    ///
    /// Always carries the `Error:` prefix so caption filtering can tell it
    /// apart from real output.
    pub fn display_message(&self) -> String {
        match self {
            InferenceError::Network(e) => format!("Error: {e}"),
            InferenceError::Http { status } => {
                let hint = match status {
                    404 => " - Endpoint not found. Make sure the server is running.",
                    500 => " - Server error. Check if the model supports vision.",
                    400 | 422 => " - Invalid request format.",
                    _ => "",
                };
                format!("Error: server returned {status}{hint}")
            }
            InferenceError::MalformedResponse => {
                "Error: invalid response format from server".to_string()
            }
        }
    }
}
