// Git and subprocess plumbing

pub mod checkout;
pub mod command;
pub mod repository;

pub use checkout::{checkout_repository, CheckoutOutcome, CheckoutStep};
pub use command::{CommandOutput, CommandRunner, Invocation, SystemCommandRunner};
pub use repository::{
    authenticated_url, clone_repository, redact_url, repository_basename, repository_name,
    strip_credentials,
};
