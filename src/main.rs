use std::{env, sync::Arc};

use colored::Colorize;
use log::{error, info};
use matinee_collab::{Collab, CollabConfig, LocalMediaStore, MemoryRepository};
use thiserror::Error;
use tokio::runtime::{self, Runtime};

mod logging;

struct Matinee {
    collab: Arc<Collab>,
    runtime: Runtime,
}

#[derive(Debug, Error)]
enum MatineeError {
    #[error("Could not build the async runtime: {0}")]
    Runtime(String),
}

impl Matinee {
    fn new() -> Result<Self, MatineeError> {
        info!("Building async runtime...");
        let main_runtime = runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("matinee-async")
            .build()
            .map_err(|e| MatineeError::Runtime(e.to_string()))?;

        let media_dir = env::var("MATINEE_MEDIA_DIR").unwrap_or_else(|_| "media".to_string());
        let config = CollabConfig::default();

        let collab = Collab::new(
            config.clone(),
            MemoryRepository::new(config.chat_history_limit),
            LocalMediaStore::new(media_dir),
        );

        Ok(Self {
            collab: Arc::new(collab),
            runtime: main_runtime,
        })
    }

    fn run(&self) {
        self.runtime.block_on(async {
            self.collab.start();
            matinee_server::run_server(self.collab.clone()).await
        });
    }
}

impl MatineeError {
    fn hint(&self) -> String {
        match self {
            MatineeError::Runtime(_) => "This error is fatal, and should not happen.".to_string(),
        }
    }
}

fn main() {
    logging::init_logger();

    match Matinee::new() {
        Ok(matinee) => {
            info!("Initialized successfully.");
            matinee.run();
        }
        Err(error) => {
            error!(
                "{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.",
                "Matinee failed to start!".bold().red()
            );
            error!("{}", error);
            error!(
                "{}",
                format!("Hint: {}", error.hint()).bright_black().italic()
            );
        }
    }
}
