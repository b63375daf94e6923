// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Interactive prompts.

use inquire::{validator::Validation, Confirm, InquireError, Text};
use tracing::{instrument, warn};

/// Ask the user things.
pub trait Prompter {
    /// Ask a yes/no question.
    ///
    /// Cancelling the prompt, or having no terminal to ask on, counts as
    /// declining.
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;

    /// Ask for a hostname.
    fn hostname(&self, message: &str) -> Result<String>;
}

/// Prompts on the terminal through inquire.
#[derive(Debug, Default, Clone, Copy)]
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    #[instrument(skip(self), level = "debug")]
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        settle_confirm(message, Confirm::new(message).with_default(default).prompt())
    }

    #[instrument(skip(self), level = "debug")]
    fn hostname(&self, message: &str) -> Result<String> {
        let answer = Text::new(message)
            .with_validator(|input: &str| {
                Ok(match validate_hostname(input.trim()) {
                    Ok(()) => Validation::Valid,
                    Err(err) => Validation::Invalid(err.to_string().into()),
                })
            })
            .prompt()?;

        Ok(answer.trim().to_string())
    }
}

/// Turn raw confirmation result into an answer.
///
/// # Errors
///
/// - Return [`PromptError::Inquire`] for failures other than cancellation or
///   a missing terminal.
fn settle_confirm(message: &str, answer: std::result::Result<bool, InquireError>) -> Result<bool> {
    match answer {
        Ok(answer) => Ok(answer),
        Err(InquireError::OperationCanceled) => Ok(false),
        Err(InquireError::NotTTY) => {
            warn!("no terminal available, declining {message:?}");
            Ok(false)
        }
        Err(err) => Err(PromptError::Inquire(err)),
    }
}

/// Validate hostname as a single DNS label.
///
/// # Errors
///
/// - Return [`PromptError::InvalidHostname`] if the label is malformed.
pub fn validate_hostname(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(PromptError::InvalidHostname(name.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// Prompt could not be shown or was interrupted.
    #[error(transparent)]
    Inquire(#[from] InquireError),

    #[error("invalid hostname {0:?}: use 1-63 letters, digits, or inner hyphens")]
    InvalidHostname(String),
}

/// Friendly result alias :3
pub type Result<T, E = PromptError> = std::result::Result<T, E>;
