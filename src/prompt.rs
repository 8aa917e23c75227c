//! Interactive prompts on stdin for session tokens and item links.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use indicatif::ProgressBar;
use library_mirror::{SessionError, SessionToken, TokenSource};
use tracing::debug;

/// Asks the operator for values on stderr and reads them from stdin.
///
/// Empty lines are rejected and the question is repeated; end of input fails.
/// While a question is open the attached progress bar is suspended so it does
/// not draw over the prompt.
#[derive(Debug, Clone)]
pub(crate) struct StdinPrompt {
    cookie_name: String,
    progress: ProgressBar,
}

impl StdinPrompt {
    pub(crate) fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Suspends `progress` whenever a question is asked.
    pub(crate) fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Reads one token synchronously. Used for the initial token and from the
    /// blocking pool on refresh.
    pub(crate) fn read_token(&self, reason: &str) -> Result<SessionToken, SessionError> {
        let stdin = io::stdin();
        self.read_token_from(&mut stdin.lock(), &mut io::stderr(), reason)
    }

    /// Reads an item identifier or link synchronously.
    pub(crate) fn read_item(&self) -> io::Result<String> {
        let stdin = io::stdin();
        self.progress.suspend(|| {
            read_answer(
                &mut stdin.lock(),
                &mut io::stderr(),
                "Enter item identifier or link: ",
            )
        })
    }

    fn read_token_from(
        &self,
        input: &mut impl BufRead,
        output: &mut impl Write,
        reason: &str,
    ) -> Result<SessionToken, SessionError> {
        let question = format!("{reason}\nEnter {} cookie value: ", self.cookie_name);
        self.progress.suspend(|| {
            loop {
                let answer = read_answer(input, output, &question)
                    .map_err(|e| SessionError::source(e.to_string()))?;
                let token = SessionToken::from_input(&answer, &self.cookie_name);
                if !token.is_empty() {
                    debug!(?token, "read session token");
                    return Ok(token);
                }
            }
        })
    }
}

/// Asks `question` until a non-empty line is entered.
fn read_answer(
    input: &mut impl BufRead,
    output: &mut impl Write,
    question: &str,
) -> io::Result<String> {
    loop {
        write!(output, "{question}")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stdin closed while waiting for input",
            ));
        }

        let answer = line.trim();
        if !answer.is_empty() {
            return Ok(answer.to_string());
        }
    }
}

#[async_trait]
impl TokenSource for StdinPrompt {
    async fn next_token(&self) -> Result<SessionToken, SessionError> {
        let prompt = self.clone();
        tokio::task::spawn_blocking(move || {
            prompt.read_token("The library session has expired.")
        })
        .await
        .map_err(|e| SessionError::source(e.to_string()))?
    }
}
