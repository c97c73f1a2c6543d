use std::sync::Arc;

use reloop_db::Database;

use crate::error::ApiError;
use crate::media::MediaStore;
use crate::policy::AuthorizationPolicy;
use crate::rewrite::DescriptionRewriter;
use crate::tokens::TokenService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenService,
    pub policy: AuthorizationPolicy,
    pub media: MediaStore,
    pub rewriter: DescriptionRewriter,
}

/// Run blocking database work off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state)).await?
}
