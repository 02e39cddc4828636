/// Background task implementations
use crate::{context::AppContext, error::AppResult};

/// Key read by the store probe; it does not need to exist
const HEALTH_PROBE_KEY: &str = "health/probe.json";

/// Remove expired verification codes
pub async fn sweep_verification_codes(ctx: &AppContext) -> AppResult<usize> {
    Ok(ctx.verification.sweep().await?)
}

/// Forget rate limit state for idle clients
pub fn prune_rate_limiters(ctx: &AppContext) -> usize {
    ctx.rate_limiter.prune()
}

/// Health check - verify the object store answers
pub async fn health_check(ctx: &AppContext) -> AppResult<()> {
    ctx.store.get(HEALTH_PROBE_KEY).await?;
    Ok(())
}
