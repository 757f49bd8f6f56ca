use anyhow::{bail, Result};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};

type Input = Box<dyn AsyncBufRead + Unpin + Send>;
type Output = Box<dyn AsyncWrite + Unpin + Send>;

/// Line-oriented reader shared by the one-shot commands and the shell.
/// Prompts go to `out`; everything else is printed directly.
pub struct Prompter {
    lines: Lines<Input>,
    out: Output,
}

impl Prompter {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }

    pub fn new(
        input: impl AsyncBufRead + Unpin + Send + 'static,
        out: impl AsyncWrite + Unpin + Send + 'static,
    ) -> Self {
        let input: Input = Box::new(input);
        Self {
            lines: input.lines(),
            out: Box::new(out),
        }
    }

    /// Next raw line, `None` at end of input.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.next_line().await?)
    }

    /// Writes `text` without a newline.
    pub async fn prompt(&mut self, text: &str) -> Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }

    pub async fn ask(&mut self, label: &str) -> Result<String> {
        self.prompt(&format!("{label}: ")).await?;
        match self.next_line().await? {
            Some(line) => Ok(line.trim_end_matches(['\r', '\n']).to_string()),
            None => bail!("input closed while waiting for {label}"),
        }
    }

    pub async fn ask_if_missing(&mut self, value: Option<String>, label: &str) -> Result<String> {
        match value {
            Some(value) => Ok(value),
            None => self.ask(label).await,
        }
    }
}
