pub mod artifact;
pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod poll;
pub mod prompt;
pub mod provider;
pub mod request;
pub mod webhook;

pub use client::{Generation, GenerationClient};
pub use config::Config;
pub use error::GenerationError;
pub use pipeline::run;
pub use provider::{Provider, ProviderBox, ProviderKind};
