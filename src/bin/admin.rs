use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use laburen_trust::config::TrustConfig;
use laburen_trust::domain::{
    AccessInputs, OrgId, PrincipalId, RequirementCatalog, RequirementState, SubmissionStatus,
    SubscriptionSnapshot,
};
use laburen_trust::infra::{
    ChallengeStore, ComplianceStore, PgChallengeStore, PgComplianceStore, PgRefreshTokenStore,
    PgSubmissionStore, PgSubscriptionStore, RefreshTokenStore, SubmissionStore,
};
use laburen_trust::policy::{AccessPolicy, TrialLifecycle};

fn print_help() {
    eprintln!(
        "\
laburen-trust-admin

USAGE:
  laburen-trust-admin <command> [options]

COMMANDS:
  migrate            Run database migrations
  sweep-trials       Expire trials whose window has elapsed
  purge-otp          Delete expired one-time code challenges
  revoke-tokens      Revoke every live session for a principal
  show-access        Print the access decision for an organization

COMMON OPTIONS:
  --database-url <postgres_url>    (defaults to env DATABASE_URL)

revoke-tokens OPTIONS:
  --principal <uuid>              (required)

show-access OPTIONS:
  --org <uuid>                    (required)
"
    );
}

fn require_database_url(database_url: Option<String>) -> anyhow::Result<String> {
    database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (or pass --database-url)"))
}

async fn connect(database_url: &str) -> anyhow::Result<sqlx::PgPool> {
    Ok(PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = args.pop_front() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print_help();
        return Ok(());
    }

    match command.as_str() {
        "migrate" => {
            let mut database_url: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => {
                        database_url =
                            Some(args.pop_front().ok_or_else(|| {
                                anyhow::anyhow!("missing value for --database-url")
                            })?);
                    }
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let database_url = require_database_url(database_url)?;
            let pool = connect(&database_url).await?;
            laburen_trust::migrations::run_postgres(&pool).await?;
            println!("ok: migrations applied");
            Ok(())
        }
        "sweep-trials" => {
            let mut database_url: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => {
                        database_url =
                            Some(args.pop_front().ok_or_else(|| {
                                anyhow::anyhow!("missing value for --database-url")
                            })?);
                    }
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let database_url = require_database_url(database_url)?;
            let pool = connect(&database_url).await?;

            let trials = TrialLifecycle::new(
                Arc::new(PgSubscriptionStore::new(pool)),
                TrustConfig::default(),
            );
            let expired = trials.expire_due_at(Utc::now()).await?;

            for org in &expired {
                println!("expired: {org}");
            }
            println!("ok: expired {} trials", expired.len());
            Ok(())
        }
        "purge-otp" => {
            let mut database_url: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => {
                        database_url =
                            Some(args.pop_front().ok_or_else(|| {
                                anyhow::anyhow!("missing value for --database-url")
                            })?);
                    }
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let database_url = require_database_url(database_url)?;
            let pool = connect(&database_url).await?;

            let purged = PgChallengeStore::new(pool).purge_expired(Utc::now()).await?;
            println!("ok: purged {purged} expired challenges");
            Ok(())
        }
        "revoke-tokens" => {
            let mut database_url: Option<String> = None;
            let mut principal: Option<Uuid> = None;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => {
                        database_url =
                            Some(args.pop_front().ok_or_else(|| {
                                anyhow::anyhow!("missing value for --database-url")
                            })?);
                    }
                    "--principal" => {
                        let raw = args
                            .pop_front()
                            .ok_or_else(|| anyhow::anyhow!("missing value for --principal"))?;
                        principal = Some(Uuid::parse_str(&raw)?);
                    }
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let principal = principal.ok_or_else(|| anyhow::anyhow!("--principal is required"))?;

            let database_url = require_database_url(database_url)?;
            let pool = connect(&database_url).await?;

            let revoked = PgRefreshTokenStore::new(pool)
                .revoke_all(PrincipalId::from_uuid(principal), Utc::now())
                .await?;
            println!("ok: revoked {revoked} sessions for principal {principal}");
            Ok(())
        }
        "show-access" => {
            let mut database_url: Option<String> = None;
            let mut org: Option<Uuid> = None;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => {
                        database_url =
                            Some(args.pop_front().ok_or_else(|| {
                                anyhow::anyhow!("missing value for --database-url")
                            })?);
                    }
                    "--org" => {
                        let raw = args
                            .pop_front()
                            .ok_or_else(|| anyhow::anyhow!("missing value for --org"))?;
                        org = Some(Uuid::parse_str(&raw)?);
                    }
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let org = OrgId::from_uuid(org.ok_or_else(|| anyhow::anyhow!("--org is required"))?);

            let database_url = require_database_url(database_url)?;
            let pool = connect(&database_url).await?;
            let now = Utc::now();

            let trials = TrialLifecycle::new(
                Arc::new(PgSubscriptionStore::new(pool.clone())),
                TrustConfig::default(),
            );
            let subscription = trials
                .get(org)
                .await?
                .ok_or_else(|| anyhow::anyhow!("organization {org} has no subscription"))?;

            let submissions = PgSubmissionStore::new(pool.clone()).list_for_org(org).await?;
            let catalog = RequirementCatalog::standard();
            let requirements: Vec<RequirementState> = catalog
                .iter()
                .map(|requirement| RequirementState {
                    code: requirement.code,
                    required: requirement.required,
                    approved: submissions.iter().any(|s| {
                        s.requirement == requirement.code
                            && s.status == SubmissionStatus::Approved
                    }),
                    expires_at: None,
                })
                .collect();

            let compliance = PgComplianceStore::new(pool).active_flags(org).await?;

            let decision = AccessPolicy::new(TrustConfig::default()).evaluate(
                &AccessInputs {
                    subscription: SubscriptionSnapshot::from(&subscription),
                    requirements,
                    compliance,
                },
                now,
            );

            println!("{}", serde_json::to_string_pretty(&decision)?);
            Ok(())
        }
        other => {
            eprintln!("unknown command: {other}\n");
            print_help();
            anyhow::bail!("unknown command: {other}");
        }
    }
}
