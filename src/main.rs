//! Action log server

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use actionlog::config::{Command, Config, CreateUserArgs};
use actionlog::models::User;
use actionlog::store::{self, Store, MIGRATOR};
use actionlog::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = store::connect(&config.database_url, config.max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;

    // Run migrations
    MIGRATOR.run(&pool).await?;

    match config.command {
        Some(Command::CreateUser(args)) => create_user(Store::new(pool), args).await,
        Some(Command::Serve) | None => {
            let app = actionlog::router(AppState::new(pool));

            let listener = tokio::net::TcpListener::bind(&config.bind).await?;
            tracing::info!("Server listening on {}", listener.local_addr()?);

            axum::serve(listener, app).await?;
            Ok(())
        }
    }
}

async fn create_user(store: Store, args: CreateUserArgs) -> anyhow::Result<()> {
    if let Some(department) = args.department {
        store.get_department(department).await?;
    }
    if let Some(unit) = args.unit {
        store.get_unit(unit).await?;
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        username: args.username,
        email: args.email,
        first_name: args.first_name,
        last_name: args.last_name,
        role: args.role,
        designation: args.designation,
        authorities: args.authorities.into(),
        department_id: args.department,
        unit_id: args.unit,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    store.create_user(&user).await?;

    tracing::info!(user_id = %user.id, role = user.role.as_str(), "User created");
    println!("{}", user.id);
    Ok(())
}
