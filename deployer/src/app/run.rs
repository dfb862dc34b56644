//! Command dispatch

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::app::cli::{Cli, Command, HistoryArgs, RecordArgs};
use crate::app::options::{DeployOptions, LedgerOptions};
use crate::app::render;
use crate::deploy::pipeline::{Capabilities, Pipeline};
use crate::deploy::stamp::GitCli;
use crate::errors::DeployError;
use crate::fleet::orchestrator::Orchestrator;
use crate::fleet::services::ServiceRegistry;
use crate::ledger::notify::WebhookNotifier;
use crate::ledger::postgres::PgLedger;
use crate::ledger::{Ledger, RecordRequest};
use crate::models::history::HistoryFilter;
use crate::storage::settings::Settings;

/// Run one CLI invocation
pub async fn run(cli: Cli, settings: Settings) -> Result<(), DeployError> {
    let json = cli.json;
    let registry = ServiceRegistry::builtin();

    match cli.command {
        Some(Command::History(args)) => history(args, &registry, &settings, json).await,
        Some(Command::Record(args)) => record(args, &registry, &settings, json).await,
        None => {
            let mut options = DeployOptions::from_env();
            options.source_root = cli.source_root;
            options.dry_run = cli.dry_run;
            options.ssh_user = settings.ssh_user.clone();
            if let Some(secs) = cli.timeout {
                options.verify = options.verify.with_timeout(Duration::from_secs(secs));
            }

            if cli.status {
                return status(registry, options, json).await;
            }
            match cli.target {
                Some(target) => deploy(&target, registry, options, json).await,
                None => Err(DeployError::ConfigError(
                    "nothing to do: name a service, `all`, or pass --status".to_string(),
                )),
            }
        }
    }
}

fn orchestrator(
    registry: ServiceRegistry,
    options: DeployOptions,
) -> Result<Orchestrator, DeployError> {
    let caps = Capabilities::system(&options)?;
    Ok(Orchestrator::new(registry, Pipeline::new(caps, options)))
}

async fn deploy(
    target: &str,
    registry: ServiceRegistry,
    options: DeployOptions,
    json: bool,
) -> Result<(), DeployError> {
    if target != "all" {
        registry.get(target)?;
    }

    let dry_run = options.dry_run;
    let orchestrator = orchestrator(registry, options)?;

    if dry_run {
        let plans = orchestrator.plan(target)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&plans)?);
        } else {
            print!("{}", render::plans(&plans));
        }
        return Ok(());
    }

    let attempts = if target == "all" {
        orchestrator.deploy_all().await?
    } else {
        vec![orchestrator.deploy_one(target).await?]
    };

    if json {
        let summary: Vec<_> = attempts
            .iter()
            .map(|a| serde_json::json!({ "service": a.service(), "commit": a.expected_commit(), "stage": a.stage() }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render::deployed(&attempts));
    }
    Ok(())
}

async fn status(
    registry: ServiceRegistry,
    options: DeployOptions,
    json: bool,
) -> Result<(), DeployError> {
    let orchestrator = orchestrator(registry, options)?;
    let rows = orchestrator.status().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", render::status_table(&rows));
    }
    Ok(())
}

/// Build the ledger. Only a writer creates the schema.
async fn ledger(settings: &Settings, writer: bool) -> Result<Ledger, DeployError> {
    let ledger_options = LedgerOptions::from_env()?;
    let store = PgLedger::connect(&ledger_options.database_url).await?;
    if writer {
        store.ensure_schema().await?;
    }
    let source = GitCli::new(PathBuf::from("."));

    let mut ledger = Ledger::new(Arc::new(store), Arc::new(source))
        .with_operator(settings.operator.clone());

    if let Some(url) = ledger_options
        .notify_webhook
        .or_else(|| settings.notify_webhook.clone())
    {
        ledger = ledger.with_notifier(Arc::new(WebhookNotifier::new(url)?));
    }
    Ok(ledger)
}

async fn history(
    args: HistoryArgs,
    registry: &ServiceRegistry,
    settings: &Settings,
    json: bool,
) -> Result<(), DeployError> {
    if let Some(service) = &args.service {
        registry.get(service)?;
    }

    let ledger = ledger(settings, false).await?;
    let filter = HistoryFilter {
        service: args.service,
        limit: args.last,
    };
    let entries = ledger.history(&filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print!("{}", render::history(&entries));
    }
    Ok(())
}

async fn record(
    args: RecordArgs,
    registry: &ServiceRegistry,
    settings: &Settings,
    json: bool,
) -> Result<(), DeployError> {
    registry.get(&args.service)?;

    let ledger = ledger(settings, true).await?;
    let request = RecordRequest {
        service: args.service,
        commit: args.commit,
        previous_commit: args.previous_commit,
        deployed_by: args.deployed_by,
        version: args.version,
        changes: args.changes,
        shard_ids: args
            .shard_ids
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        notify: args.notify,
    };

    let outcome = ledger.record(request).await?;
    info!("Ledger entry {} written", outcome.entry.id);

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.entry)?);
    } else {
        print!("{}", render::recorded(&outcome));
    }
    Ok(())
}
