//! Speech input and output seams
//!
//! The assistant only ever sees text: an input yields one utterance at a
//! time and an output consumes the reply. The console implementations stand
//! in for microphone transcription and text-to-speech.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::warn;

/// Source of user utterances
#[async_trait::async_trait]
pub trait SpeechInput: Send {
    /// Next utterance. `Some("")` means nothing intelligible was heard,
    /// `None` means the input is closed for good.
    async fn transcribe(&mut self) -> Option<String>;
}

/// Sink for assistant replies
#[async_trait::async_trait]
pub trait SpeechOutput: Send {
    async fn speak(&mut self, text: &str);
}

/// Reads utterances line by line from stdin
pub struct ConsoleInput {
    lines: Lines<BufReader<Stdin>>,
}

impl ConsoleInput {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for ConsoleInput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SpeechInput for ConsoleInput {
    async fn transcribe(&mut self) -> Option<String> {
        let mut stdout = tokio::io::stdout();
        let _ = stdout.write_all(b"You: ").await;
        let _ = stdout.flush().await;

        match self.lines.next_line().await {
            Ok(Some(line)) => Some(line.trim().to_lowercase()),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read input: {}", e);
                Some(String::new())
            }
        }
    }
}

/// Prints replies to stdout
#[derive(Default)]
pub struct ConsoleOutput;

#[async_trait::async_trait]
impl SpeechOutput for ConsoleOutput {
    async fn speak(&mut self, text: &str) {
        println!("Assistant: {}", text);
    }
}
