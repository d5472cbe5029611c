// CI drivers: source preparation, proof launch, completion handling

pub mod completion;
pub mod launch;
pub mod prepare;

pub use completion::{handle_batch_event, CompletionOutcome};
pub use launch::{child_correlation_list, LaunchRequest, LaunchedJob};
pub use prepare::{PrepareOutcome, PrepareRequest};

use crate::batch::JobSubmitter;
use crate::config::Settings;
use crate::git::CommandRunner;
use crate::github::{StatusReporter, TokenProvider};
use crate::storage::BookkeepingStore;
use std::sync::Arc;

pub const START_CONTEXT: &str = "Proof jobs starting";
pub const CANCELLED_CONTEXT: &str = "Cancelled";

/// Everything the prepare and launch drivers talk to
#[derive(Clone)]
pub struct Pipeline {
    settings: Arc<Settings>,
    runner: Arc<dyn CommandRunner>,
    reporter: Arc<dyn StatusReporter>,
    submitter: Arc<dyn JobSubmitter>,
    bookkeeping: BookkeepingStore,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl Pipeline {
    pub fn new(
        settings: Arc<Settings>,
        runner: Arc<dyn CommandRunner>,
        reporter: Arc<dyn StatusReporter>,
        submitter: Arc<dyn JobSubmitter>,
        bookkeeping: BookkeepingStore,
    ) -> Self {
        Self {
            settings,
            runner,
            reporter,
            submitter,
            bookkeeping,
            tokens: None,
        }
    }

    /// Token used to authenticate https clones
    pub fn with_tokens(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
