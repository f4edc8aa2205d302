use std::{process, sync::Arc};

use snapback::{
    application::{
        clock::SystemClock,
        error::{AppError, error_chain},
        jobs::run_undo_reaper,
        undo::{UndoOptions, UndoService},
    },
    config,
    domain::types::UserId,
    infra::{
        db::{SqliteRepositories, entities::EntityRegistry},
        error::InfraError,
        telemetry,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let causes = error_chain(error);
    if dispatcher::has_been_set() {
        error!(error = %error, causes = ?causes, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, causes = ?causes, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Reaper(config::ReaperArgs::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Types => run_types(),
        config::Command::Migrate(_) => run_migrate(&settings).await,
        config::Command::List(args) => run_list(&settings, args).await,
        config::Command::Undo(args) => run_undo(&settings, args).await,
        config::Command::Reap(_) => run_reap(&settings).await,
        config::Command::Reaper(_) => run_reaper(&settings).await,
    }
}

fn run_types() -> Result<(), AppError> {
    let registry = EntityRegistry::standard().map_err(InfraError::from)?;
    for entity_type in registry.entity_types() {
        println!("{entity_type}");
    }
    Ok(())
}

async fn run_migrate(settings: &config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(settings).await?;
    repositories
        .health_check()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    info!(database_url = %settings.database.url, "Migrations applied");
    Ok(())
}

async fn run_list(settings: &config::Settings, args: config::ListArgs) -> Result<(), AppError> {
    let service = build_undo_service(settings).await?;
    let entries = service
        .list_entries(&UserId::from(args.user), args.limit)
        .await?;

    for entry in &entries {
        let line = serde_json::to_string(entry)
            .map_err(|err| AppError::unexpected(format!("failed to encode entry: {err}")))?;
        println!("{line}");
    }
    Ok(())
}

async fn run_undo(settings: &config::Settings, args: config::UndoArgs) -> Result<(), AppError> {
    let service = build_undo_service(settings).await?;
    let restored = service
        .perform_undo(&UserId::from(args.user), args.entry_id)
        .await?;

    let line = serde_json::to_string(&restored)
        .map_err(|err| AppError::unexpected(format!("failed to encode result: {err}")))?;
    println!("{line}");
    Ok(())
}

async fn run_reap(settings: &config::Settings) -> Result<(), AppError> {
    let service = build_undo_service(settings).await?;
    let removed = service.purge_expired().await?;
    println!("{removed}");
    Ok(())
}

async fn run_reaper(settings: &config::Settings) -> Result<(), AppError> {
    let service = Arc::new(build_undo_service(settings).await?);
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => warn!(error = %err, "Failed to listen for shutdown signal"),
        }
        signal_cancel.cancel();
    });

    run_undo_reaper(service, settings.reaper.interval, cancel).await;
    Ok(())
}

async fn build_undo_service(settings: &config::Settings) -> Result<UndoService, AppError> {
    let repositories = init_repositories(settings).await?;
    Ok(UndoService::new(
        Arc::new(repositories),
        Arc::new(SystemClock),
        UndoOptions::from(&settings.undo),
    ))
}

async fn init_repositories(settings: &config::Settings) -> Result<SqliteRepositories, AppError> {
    let pool = SqliteRepositories::connect(
        &settings.database.url,
        settings.database.max_connections.get(),
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    SqliteRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;

    let registry = EntityRegistry::standard().map_err(InfraError::from)?;
    Ok(SqliteRepositories::new(pool, registry))
}
