//! Demo endpoints under `/user`.
//!
//! Each handler drives one `UserService` operation and answers with an
//! `ApiResult` envelope; failures go through `CommandError`'s response
//! mapping.

use std::time::Duration;

use axum::extract::{Path, State};

use crate::http::scope::ActiveScope;
use crate::http::server::AppState;
use crate::remote::ApiResult;
use crate::resilience::CommandError;

/// Pause between the collapsed pair and the third lookup in `testCollapser`.
const COLLAPSER_DEMO_PAUSE: Duration = Duration::from_millis(200);

pub async fn test_fallback(State(state): State<AppState>, Path(id): Path<i64>) -> Result<ApiResult, CommandError> {
    let user = state.service.get_user(id).await?;
    Ok(ApiResult::success_with(&user))
}

pub async fn test_command(State(state): State<AppState>, Path(id): Path<i64>) -> Result<ApiResult, CommandError> {
    let user = state.service.get_user_command(id).await?;
    Ok(ApiResult::success_with(&user))
}

pub async fn test_exception(State(state): State<AppState>, Path(id): Path<i64>) -> Result<ApiResult, CommandError> {
    let user = state.service.get_user_exception(id).await?;
    Ok(ApiResult::success_with(&user))
}

pub async fn test_cache(
    State(state): State<AppState>,
    ActiveScope(scope): ActiveScope,
    Path(id): Path<i64>,
) -> Result<ApiResult, CommandError> {
    for _ in 0..3 {
        state.service.get_user_cache(&scope, id).await?;
    }
    Ok(ApiResult::success())
}

pub async fn test_remove_cache(
    State(state): State<AppState>,
    ActiveScope(scope): ActiveScope,
    Path(id): Path<i64>,
) -> Result<ApiResult, CommandError> {
    state.service.get_user_cache(&scope, id).await?;
    state.service.remove_cache(&scope, id).await?;
    state.service.get_user_cache(&scope, id).await?;
    Ok(ApiResult::success())
}

pub async fn test_collapser(State(state): State<AppState>) -> Result<ApiResult, CommandError> {
    let (first, second) = tokio::join!(state.service.get_user_future(1), state.service.get_user_future(2));
    let (first, second) = (first?, second?);

    tokio::time::sleep(COLLAPSER_DEMO_PAUSE).await;
    let third = state.service.get_user_future(3).await?;

    Ok(ApiResult::success_with(&[first, second, third]))
}
