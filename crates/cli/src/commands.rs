//! Command handlers. Every command prints one JSON document to stdout.

use crate::args::Command;
use crate::context::AgentContext;
use anyhow::{bail, Context, Result};
use chainpilot_chain::FeeEstimate;
use chainpilot_core::Address;
use chainpilot_olas::{CheckpointOutcome, ServiceRequest, StepFailure, WorkflowReport};
use serde_json::{json, Value};
use tracing::info;

/// Runs `command` and returns the document to print.
pub async fn run(ctx: &AgentContext, command: Command) -> Result<Value> {
    match command {
        Command::Health => {
            let healthy = ctx.executor().check_health().await;
            Ok(json!({
                "network": ctx.network().name,
                "endpoint": ctx.executor().pool().current(),
                "endpoints": ctx.executor().pool().len(),
                "healthy": healthy,
            }))
        }
        Command::Fees => {
            let fees = ctx.executor().estimate_fees().await?;
            Ok(fees_json(ctx.network().name.as_str(), &fees))
        }
        Command::Status { service } => {
            let operator = ctx.service_manager().await?;
            let service = match service {
                Some(id) => operator.manager.load_or_adopt(id).await?,
                None => {
                    let Some(mut service) = operator
                        .manager
                        .store()
                        .active()
                        .filter(|s| s.network.eq_ignore_ascii_case(&ctx.network().name))
                    else {
                        bail!("no --service given and no active service on {}", ctx.network().name);
                    };
                    operator.manager.refresh(&mut service).await?;
                    service
                }
            };
            operator.save_keyring()?;
            Ok(serde_json::to_value(&service)?)
        }
        Command::StakingStatus { service, staking } => {
            let operator = ctx.service_manager().await?;
            let mut service = operator.manager.load_or_adopt(service).await?;
            service.staking_contract = Some(staking);
            let status = operator.manager.staking_status(&service).await?;
            Ok(serde_json::to_value(&status)?)
        }
        Command::Create {
            name,
            agent_ids,
            token,
            bond,
        } => {
            let bonding_token = token
                .as_deref()
                .map(|token| resolve_token(ctx, token))
                .transpose()?;
            let operator = ctx.service_manager().await?;
            let service = operator
                .manager
                .create(ServiceRequest {
                    name,
                    agent_ids,
                    bonding_token,
                    bond,
                })
                .await?;
            info!(service_id = service.service_id, "service created");
            Ok(serde_json::to_value(&service)?)
        }
        Command::SpinUp {
            service,
            target,
            staking,
        } => {
            let operator = ctx.service_manager().await?;
            let mut service = operator.manager.load_or_adopt(service).await?;
            let outcome = operator.manager.spin_up(&mut service, target.into(), staking).await;
            operator.save_keyring()?;
            workflow_json(outcome)
        }
        Command::WindDown { service, staking } => {
            let operator = ctx.service_manager().await?;
            let mut service = operator.manager.load_or_adopt(service).await?;
            workflow_json(operator.manager.wind_down(&mut service, staking).await)
        }
        Command::Checkpoint { staking } => {
            let operator = ctx.service_manager().await?;
            let outcome = operator.manager.call_checkpoint(staking).await?;
            Ok(checkpoint_json(staking, &outcome))
        }
    }
}

fn resolve_token(ctx: &AgentContext, token: &str) -> Result<Address> {
    if let Some(address) = ctx.network().token_address(token) {
        return Ok(address);
    }
    token
        .parse()
        .with_context(|| format!("'{token}' is neither a known token symbol nor an address"))
}

fn fees_json(network: &str, fees: &FeeEstimate) -> Value {
    match fees {
        FeeEstimate::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => json!({
            "network": network,
            "type": "eip1559",
            "max_fee_per_gas": max_fee_per_gas.to_string(),
            "max_priority_fee_per_gas": max_priority_fee_per_gas.to_string(),
        }),
        FeeEstimate::Legacy { gas_price } => json!({
            "network": network,
            "type": "legacy",
            "gas_price": gas_price.to_string(),
        }),
    }
}

fn report_json(report: &WorkflowReport) -> Value {
    json!({
        "service_id": report.service_id,
        "completed": report.completed.iter().map(|step| step.as_str()).collect::<Vec<_>>(),
        "state": report.state,
        "staking_contract": report.staking_contract.map(|a| a.to_string()),
        "noop": report.is_noop(),
    })
}

fn workflow_json(outcome: Result<WorkflowReport, StepFailure>) -> Result<Value> {
    match outcome {
        Ok(report) => Ok(report_json(&report)),
        Err(failure) => {
            let completed: Vec<_> = failure.completed.iter().map(|step| step.as_str()).collect();
            bail!(
                "{failure} (completed before failure: [{}])",
                completed.join(", ")
            )
        }
    }
}

fn checkpoint_json(staking: Address, outcome: &CheckpointOutcome) -> Value {
    match outcome {
        CheckpointOutcome::NotNeeded { next_checkpoint } => json!({
            "staking_contract": staking.to_string(),
            "called": false,
            "next_checkpoint": next_checkpoint,
        }),
        CheckpointOutcome::Closed {
            tx_hash,
            epoch,
            available_rewards,
            inactive_services,
        } => json!({
            "staking_contract": staking.to_string(),
            "called": true,
            "tx_hash": tx_hash.to_string(),
            "epoch": epoch.to_string(),
            "available_rewards": available_rewards.to_string(),
            "inactive_services": inactive_services.iter().map(u128::to_string).collect::<Vec<_>>(),
        }),
    }
}
