use casetrack_core::config::{AppConfig, LoadOptions};
use casetrack_db::{connect, migrations::MIGRATOR};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_relay(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "notification_relay",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "database_schema",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// No relay is a valid setup (messages wait in the queue), but operators should know.
fn check_relay(config: &AppConfig) -> DoctorCheck {
    match &config.relay.url {
        Some(url) => DoctorCheck {
            name: "notification_relay",
            status: CheckStatus::Pass,
            details: format!(
                "delivering through `{url}` (token {})",
                if config.relay.token.is_some() { "set" } else { "unset" }
            ),
        },
        None => DoctorCheck {
            name: "notification_relay",
            status: CheckStatus::Pass,
            details: "no relay configured; notifications stay pending until one is set".to_string(),
        },
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_schema",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        let applied: Result<i64, sqlx::Error> =
            sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
                .fetch_one(&pool)
                .await;
        pool.close().await;
        Ok::<i64, String>(applied.unwrap_or(0))
    });

    let expected = MIGRATOR.iter().filter(|migration| migration.migration_type.is_up_migration()).count();
    match result {
        Ok(applied) if usize::try_from(applied).unwrap_or(0) >= expected => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`; {applied} migration(s) applied", config.database.url),
        },
        Ok(applied) => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Fail,
            details: format!(
                "{applied} of {expected} migration(s) applied; run `casetrack migrate`"
            ),
        },
        Err(error) => DoctorCheck { name: "database_schema", status: CheckStatus::Fail, details: error },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
