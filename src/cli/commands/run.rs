//! Run command: one scheduled sync pass.
//!
//! Meant to be invoked from cron. Every selected entity is synced in turn
//! against the same database and remote client; each gets its own run id in
//! the sync log. The command exits non-zero when any scan aborted, after
//! printing every report.

use crate::cli::RunArgs;
use crate::config::{load_config, EntitySettings};
use crate::error::{Error, Result};
use crate::remote::http::WooCommerceClient;
use crate::storage::SqliteStorage;
use crate::sync::{
    mapper_for, AuditLogger, DirectionReport, RunReport, ScanOutcome, SqliteAuditLog,
    SyncDirection, SyncEngine, TracingAudit, SUPPORTED_ENTITIES,
};
use colored::Colorize;
use std::path::Path;
use tracing::info;

use super::existing_db_path;

/// Execute the run command.
///
/// # Errors
///
/// Returns an error if the database is missing, the configuration or the
/// arguments are invalid, or a scan aborted.
pub fn execute(
    args: &RunArgs,
    db_path: Option<&Path>,
    config_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let db_path = existing_db_path(db_path)?;
    let config = load_config(config_path)?;
    let entities = selected_entities(args.entity.as_deref())?;
    let overrides = Overrides::from_args(args)?;

    let remote = WooCommerceClient::new(&config.remote)?;
    let mut storage = SqliteStorage::open(&db_path)?;
    let mut audit: Box<dyn AuditLogger> = if args.no_log {
        Box::new(TracingAudit)
    } else {
        Box::new(SqliteAuditLog::open(&db_path)?)
    };

    let mut reports = Vec::with_capacity(entities.len());
    for entity in entities {
        let mapper = mapper_for(entity).ok_or_else(|| Error::UnknownEntity {
            name: entity.to_string(),
        })?;
        let settings = overrides.apply(config.entity(entity));
        info!(entity, direction = %settings.direction, limit = settings.limit, "Sync run");

        let report = SyncEngine::new(&mut storage, &remote, mapper, &mut *audit, settings)
            .log_all(config.log_all)
            .process();
        reports.push(report);
    }

    if json {
        println!("{}", serde_json::to_string(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
    }

    match first_abort(&reports) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Per-invocation overrides of the configured entity settings.
#[derive(Debug, Default, Clone, Copy)]
struct Overrides {
    direction: Option<SyncDirection>,
    limit: Option<u32>,
}

impl Overrides {
    fn from_args(args: &RunArgs) -> Result<Self> {
        let direction = args
            .direction
            .as_deref()
            .map(str::parse::<SyncDirection>)
            .transpose()
            .map_err(Error::InvalidArgument)?;
        if args.limit == Some(0) {
            return Err(Error::InvalidArgument(
                "--limit must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            direction,
            limit: args.limit,
        })
    }

    fn apply(self, mut settings: EntitySettings) -> EntitySettings {
        if let Some(direction) = self.direction {
            settings.direction = direction;
        }
        if let Some(limit) = self.limit {
            settings.limit = limit;
        }
        settings
    }
}

fn selected_entities(entity: Option<&str>) -> Result<Vec<&'static str>> {
    match entity {
        None => Ok(SUPPORTED_ENTITIES.to_vec()),
        Some(name) => SUPPORTED_ENTITIES
            .iter()
            .find(|e| **e == name)
            .map(|e| vec![*e])
            .ok_or_else(|| Error::UnknownEntity {
                name: name.to_string(),
            }),
    }
}

fn first_abort(reports: &[RunReport]) -> Option<Error> {
    reports.iter().find_map(|report| {
        [&report.import, &report.export]
            .into_iter()
            .flatten()
            .find_map(|direction| match &direction.outcome {
                ScanOutcome::Aborted { reason } => Some(Error::ScanAborted {
                    entity: report.entity.clone(),
                    direction: direction.direction.to_string(),
                    reason: reason.clone(),
                }),
                ScanOutcome::Closed => None,
            })
    })
}

fn print_report(report: &RunReport) {
    if !report.active {
        println!("{} {} (disabled)", "○".dimmed(), report.entity.bold());
        return;
    }

    let mark = if report.aborted() {
        "✗".red()
    } else if report.failures() > 0 {
        "!".yellow()
    } else {
        "✓".green()
    };
    println!(
        "{mark} {} {} {}",
        report.entity.bold(),
        report.direction,
        format!("run {}", report.run_id).dimmed()
    );

    for direction in [&report.import, &report.export].into_iter().flatten() {
        print_direction(direction);
    }
}

fn print_direction(report: &DirectionReport) {
    println!(
        "  {:<7} {} written, {} skipped, {} empty, {} failed ({} seen, {} pages)",
        report.direction.to_string(),
        report.written.to_string().green(),
        report.skipped,
        report.empty,
        if report.failed > 0 {
            report.failed.to_string().red()
        } else {
            report.failed.to_string().normal()
        },
        report.seen,
        report.pages,
    );
    if let ScanOutcome::Aborted { reason } = &report.outcome {
        println!("          {} {reason}", "aborted:".red());
    }
}
