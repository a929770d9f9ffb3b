/// Errors raised while validating a user selection.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// A token was not an integer
    #[error("selection must be a whitespace separated list of indices (got '{0}')")]
    NotANumber(String),

    /// An integer that was not offered as a candidate
    #[error("index {0} is not one of the listed entries")]
    UnknownIndex(u32),
}

/// Errors that can occur while driving the audio server.
#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    /// The command could not be started
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited unsuccessfully
    #[error("`{command}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The command succeeded but printed something we could not interpret
    #[error("unexpected output from `{command}`: '{output}'")]
    UnexpectedOutput { command: String, output: String },

    /// A combined sink needs at least one member sink
    #[error("a combined sink needs at least one member sink")]
    NoCombineMembers,

    /// The sink created by a module never showed up in the listing
    #[error("no sink owned by module {module} was found")]
    SinkNotFound { module: u32 },

    /// Invalid user selection
    #[error("invalid selection: {0}")]
    Selection(#[from] SelectionError),

    /// Reading the selection from the terminal failed
    #[error("failed to read selection: {0}")]
    Prompt(String),

    /// Shutdown was requested before setup completed
    #[error("audio setup interrupted")]
    Interrupted,
}

impl AudioError {
    /// Process exit status to use when this error ends the program.
    pub fn exit_code(&self) -> i32 {
        match self {
            AudioError::CommandFailed {
                code: Some(code), ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

pub type AudioResult<T> = Result<T, AudioError>;
