use std::io::Write;
use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to start renderer '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("Renderer I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Renderer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("No renderer configured")]
    NotConfigured,
}

/// Turns a quote into image bytes. Blocking; callers run it off the async
/// executor.
pub trait QuoteRenderer: Send + Sync {
    fn render(&self, text: &str, author: &str) -> Result<Vec<u8>, RenderError>;
}

/// Runs an external program with the quote text and author as two lines on
/// stdin and takes whatever it writes to stdout as the image.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a `[program, args...]` list as written in the config file.
    pub fn from_command_line(command: &[String]) -> Result<Self, RenderError> {
        let (program, args) = command.split_first().ok_or(RenderError::NotConfigured)?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }
}

/// One line per field; embedded newlines would shift the author line.
fn single_line(s: &str) -> String {
    s.split(['\r', '\n'])
        .filter(|part| !part.trim().is_empty())
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(" ")
}

impl QuoteRenderer for CommandRenderer {
    fn render(&self, text: &str, author: &str) -> Result<Vec<u8>, RenderError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RenderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let input = format!("{}\n{}\n", single_line(text), single_line(author));
            stdin.write_all(input.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::Failed {
                status: output.status.to_string(),
                stderr: stderr.chars().take(512).collect(),
            });
        }

        tracing::debug!(program = %self.program, bytes = output.stdout.len(), "Rendered quote image");
        Ok(output.stdout)
    }
}
