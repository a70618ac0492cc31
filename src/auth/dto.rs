use serde::Deserialize;

/// Query string Google appends to the redirect URL.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set instead of `code` when the user denies consent.
    pub error: Option<String>,
}
