use crate::{services::FileHub, store::local::LocalStore};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: FileHub,
    /// Set when files live in a [`LocalStore`]; its signed links are served
    /// by `/objects/{bucket}/{*key}`.
    pub local: Option<LocalStore>,
}

impl AppState {
    pub fn new(hub: FileHub, local: Option<LocalStore>) -> Self {
        Self { hub, local }
    }
}
