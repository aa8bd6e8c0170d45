use matrix_orchestrator::config::load_config;
use matrix_orchestrator::matrix::MatrixClient;
use matrix_orchestrator::orchestration::Orchestrator;
use matrix_orchestrator::shared::Logger;
use matrix_orchestrator::spark::SparkCli;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn run(logger: &Logger) -> Result<(), String> {
    let (path, config) =
        load_config().map_err(|err| format!("failed to load configuration: {err}"))?;
    logger.info(&format!("loaded configuration from {}", path.display()));

    let chat = match config
        .bot_access_token
        .as_deref()
        .filter(|v| !v.trim().is_empty())
    {
        Some(token) => {
            MatrixClient::with_access_token(&config.homeserver_url, &config.bot_user_id, token)
        }
        None => {
            // Validation guarantees the password is present in this branch.
            let password = config.bot_password.as_deref().unwrap_or_default();
            MatrixClient::with_password_login(&config.homeserver_url, &config.bot_user_id, password)
                .map_err(|err| format!("password login failed: {err}"))?
        }
    };

    let mut orchestrator = Orchestrator::new(config, chat, SparkCli::default(), logger.clone())
        .map_err(|err| format!("failed to load persisted state: {err}"))?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        let logger = logger.clone();
        ctrlc::set_handler(move || {
            logger.info("signal received, shutting down after the current batch");
            running.store(false, Ordering::SeqCst);
        })
        .map_err(|err| format!("failed to install signal handler: {err}"))?;
    }

    orchestrator
        .initialize()
        .map_err(|err| format!("startup failed: {err}"))?;
    orchestrator
        .run_loop(|| running.load(Ordering::SeqCst))
        .map_err(|err| format!("run loop aborted: {err}"))?;
    Ok(())
}

fn main() {
    let logger = Logger::from_env();
    if let Err(err) = run(&logger) {
        logger.error(&err);
        std::process::exit(1);
    }
}
