use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Checkout error: {0}")]
    Checkout(String),

    #[error("Command failed: {command}: {output}")]
    Command { command: String, output: String },

    #[error("Transfer error: {0}")]
    Transfer(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Connection(_) => "CONNECTION_ERROR",
            Error::Checkout(_) => "CHECKOUT_ERROR",
            Error::Command { .. } => "COMMAND_ERROR",
            Error::Transfer(_) => "TRANSFER_ERROR",
        }
    }

    pub fn command(command: impl Into<String>, output: impl Into<String>) -> Self {
        Error::Command {
            command: command.into(),
            output: output.into(),
        }
    }
}
