use std::collections::HashSet;

use tracing::debug;

use super::Session;
use stack_core::{Result, StackError};
use stack_orchestrator::update::summary_error;
use stack_orchestrator::{HealthEngine, UpdateOrchestrator, UpdatePlan};

pub fn handle_update(
    session: &Session,
    updates: &[String],
    previous_tag: Option<String>,
) -> Result<()> {
    if session.ctx.is_degraded() {
        return Err(StackError::Configuration(
            "updates need an env file to record the new version tags".to_string(),
        ));
    }

    let plans = build_plans(session, updates, previous_tag)?;
    debug!(?plans, "Update plans");

    let gateway = session.gateway();
    let health = HealthEngine::new(&gateway, &session.settings, &session.clock);
    let orchestrator =
        UpdateOrchestrator::new(&gateway, &health, &session.settings).quiet(session.quiet);

    let mut store = session.store.clone();
    let summary = orchestrator.update_all(plans, &mut store);
    match summary_error(&summary) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn build_plans(
    session: &Session,
    updates: &[String],
    previous_tag: Option<String>,
) -> Result<Vec<UpdatePlan>> {
    let mut plans = updates
        .iter()
        .map(|spec| UpdatePlan::parse(spec, &session.store))
        .collect::<Result<Vec<_>>>()?;

    let mut seen = HashSet::new();
    for plan in &plans {
        if !seen.insert(plan.service) {
            return Err(StackError::Configuration(format!(
                "{} is listed more than once",
                plan.service
            )));
        }
    }

    if let Some(tag) = previous_tag {
        if plans.len() != 1 {
            return Err(StackError::Configuration(
                "--previous-tag applies to a single update only".to_string(),
            ));
        }
        plans = plans
            .into_iter()
            .map(|plan| plan.with_previous_tag(tag.as_str()))
            .collect();
    }
    Ok(plans)
}
