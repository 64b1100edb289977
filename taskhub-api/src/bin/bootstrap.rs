//! # TaskHub bootstrap tool
//!
//! Prepares the database and grants the global `admin` role. Registration
//! never creates admins; this is the only way to get one.
//!
//! ```bash
//! DATABASE_URL=postgresql://… cargo run -p taskhub-api --bin taskhub-bootstrap -- alice
//! DATABASE_URL=postgresql://… cargo run -p taskhub-api --bin taskhub-bootstrap -- alice --revoke
//! ```
//!
//! The database is created if missing and migrations are applied before the
//! role change, so this also works against a fresh server.

use anyhow::Context;
use taskhub_shared::{
    db::{
        migrations::{ensure_database_exists, get_migration_status, run_migrations},
        pool::{close_pool, create_pool, DatabaseConfig},
    },
    models::user::{User, UserRole},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: taskhub-bootstrap <username> [--revoke]";

#[derive(Debug, PartialEq, Eq)]
struct Args {
    username: String,
    role: UserRole,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut username = None;
    let mut role = UserRole::Admin;

    for arg in args {
        match arg.as_str() {
            "--revoke" => role = UserRole::User,
            "-h" | "--help" => anyhow::bail!(USAGE),
            flag if flag.starts_with('-') => anyhow::bail!("unknown flag {}\n{}", flag, USAGE),
            _ if username.is_some() => anyhow::bail!("only one username may be given\n{}", USAGE),
            _ => username = Some(arg),
        }
    }

    Ok(Args {
        username: username.context(USAGE)?,
        role,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskhub_shared=info,taskhub_bootstrap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

    ensure_database_exists(&database_url).await?;

    let pool = create_pool(DatabaseConfig {
        url: database_url,
        max_connections: 2,
        ..Default::default()
    })
    .await?;

    run_migrations(&pool).await?;
    let status = get_migration_status(&pool).await?;
    tracing::info!(
        applied = status.applied_migrations,
        latest = ?status.latest_version,
        "Schema ready"
    );

    let updated = User::set_role(&pool, &args.username, args.role).await?;
    close_pool(pool).await;

    match updated {
        Some(user) => {
            tracing::info!(user_id = %user.id, username = %user.username, role = user.role.as_str(), "Role updated");
            Ok(())
        }
        None => anyhow::bail!("no user named {:?}; register the account first", args.username),
    }
}
