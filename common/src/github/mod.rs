// GitHub integration: commit statuses, tokens, webhook deliveries

pub mod event;
pub mod status;
pub mod token;

pub use event::{header_value, parse_event, EVENT_HEADER, SIGNATURE_HEADER};
pub use status::{
    target_url, Delivery, GithubStatusClient, StatusPayload, StatusReporter,
    MAX_DESCRIPTION_CHARS,
};
pub use token::{
    parse_token_secret, SecretsManagerTokenProvider, StaticTokenProvider, TokenProvider,
};

#[cfg(test)]
pub use status::MockStatusReporter;
