//! CLI command handling
//!
//! Builds the task model with the selected strategy and dispatches the
//! textual commands to the controller.

mod controller;

pub use controller::CliController;

use std::sync::Arc;
use std::time::Duration;

use crate::commands::Commands;
use crate::common::config::{Config, StrategyKind};
use crate::common::{Error, Result};
use crate::descriptor::Locale;
use crate::executor::{DefaultRunner, Executor};
use crate::model::{BuildStrategy, ModelBuilder, ToolView};
use crate::service::{LocalCatalog, ServiceClient, ServiceWatcher};

/// Options shared by all textual commands
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Read descriptor files instead of asking the management service
    pub local: bool,
    /// Locale tag overriding config and environment
    pub locale: Option<String>,
}

/// Locale from the flag, then the config file, then the environment
pub fn resolve_locale(options: &GlobalOptions, config: &Config) -> Locale {
    options
        .locale
        .as_deref()
        .or(config.defaults.locale.as_deref())
        .map(Locale::new)
        .unwrap_or_else(Locale::from_env)
}

fn strategy(options: &GlobalOptions, config: &Config) -> Result<BuildStrategy> {
    let kind = if options.local {
        StrategyKind::Local
    } else {
        config.defaults.strategy
    };

    Ok(match kind {
        StrategyKind::Remote => BuildStrategy::Remote {
            service: Arc::new(ServiceClient::new(config.service.clone())),
            coordinates: config.service.clone(),
        },
        StrategyKind::Local => BuildStrategy::Local {
            catalog: Arc::new(LocalCatalog::scan(&config.local)?),
            coordinates: config.service.clone(),
        },
    })
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, options: GlobalOptions) -> Result<()> {
    if matches!(command, Commands::Serve) {
        return Err(Error::Internal(
            "Serve command should be handled in main".to_string(),
        ));
    }

    let config = Config::load()?;
    let locale = resolve_locale(&options, &config);
    let strategy = strategy(&options, &config)?;
    let service = strategy.service();
    let is_remote = matches!(strategy, BuildStrategy::Remote { .. });

    let tree = Arc::new(ModelBuilder::new(strategy, locale).build_model().await?);
    tracing::debug!(tools = tree.tools().len(), "Task model built");

    let (executor, events) = Executor::new(Arc::new(DefaultRunner::new(Arc::clone(&service))));
    let mut controller = CliController::new(ToolView::all(&tree), Arc::clone(&service), executor, events);

    let mut watcher = None;
    if is_remote && matches!(command, Commands::Run { .. }) {
        let interval = Duration::from_millis(config.watcher.poll_interval_ms);
        let (service_events, handle) = ServiceWatcher::new(Arc::clone(&service), interval).spawn();
        controller = controller.with_service_events(service_events);
        watcher = Some(handle);
    }

    let result = match command {
        Commands::List => controller.list_objects(),
        Commands::Tests { tool } => controller.list_tests_of_object(&tool),
        Commands::Run {
            tool,
            test,
            verbose,
        } => {
            controller.set_verbose(verbose);
            match test {
                Some(test) => controller.run_specified_test_of_object(&tool, &test).await,
                None => controller.run_all_tests_of_object(&tool).await,
            }
        }
        Commands::Report { tool, file } => controller.get_tool_report(&tool, &file).await,
        Commands::Serve => Ok(()),
    };

    if let Some(handle) = watcher {
        handle.abort();
    }

    result
}
