use std::io;

/// Failure classes surfaced by every command.
///
/// Invocation errors are caught before any file is touched. Input errors
/// describe a file that cannot be used as given. Io errors carry the
/// underlying cause from the operating system.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Invocation(String),
    #[error("{0}")]
    Input(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn invocation(message: impl Into<String>) -> Self {
        Error::Invocation(message.into())
    }

    pub fn input(message: impl Into<String>) -> Self {
        Error::Input(message.into())
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Invocation(_) => 1,
            Error::Input(_) | Error::Io { .. } => 2,
        }
    }
}

pub trait IoContext<T> {
    fn io_context<F, C>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F, C>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|source| Error::io(context(), source))
    }
}

/// Exit code for a failed command line parse. Help and version requests,
/// including a bare invocation that prints help, succeed.
pub fn usage_exit_code(err: &clap::Error) -> u8 {
    use clap::error::ErrorKind;
    match err.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
        _ => 1,
    }
}

/// Exit code for an error bubbled up through `anyhow`.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(Error::exit_code)
        .unwrap_or(2)
}
