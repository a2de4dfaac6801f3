use color_eyre::{eyre::eyre, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::worker::Event;

/// Event handler that produces worker events from a JSON-lines stream
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Result<Event>>,
}

impl EventHandler {
  /// Read one JSON event per line from `reader`; blank lines are skipped
  pub fn new<R>(reader: R) -> Self
  where
    R: AsyncBufRead + Unpin + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn line reader
    tokio::spawn(async move {
      let mut lines = reader.lines();
      loop {
        match lines.next_line().await {
          Ok(Some(line)) => {
            let line = line.trim();
            if line.is_empty() {
              continue;
            }
            let event = serde_json::from_str::<Event>(line)
              .map_err(|e| eyre!("Invalid event '{}': {}", line, e));
            if tx.send(event).is_err() {
              break;
            }
          }
          Ok(None) => break,
          Err(e) => {
            let _ = tx.send(Err(eyre!("Failed to read event stream: {}", e)));
            break;
          }
        }
      }
    });

    Self { rx }
  }

  /// Events from standard input
  pub fn stdin() -> Self {
    Self::new(BufReader::new(tokio::io::stdin()))
  }

  /// Receive the next event; `None` once the stream is exhausted
  pub async fn next(&mut self) -> Option<Result<Event>> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_reads_events_and_reports_bad_lines() {
    let input: &'static [u8] =
      b"{\"type\":\"install\"}\n\n   \nnot json\n{\"type\":\"sync\",\"tag\":\"incident-sync\"}\n";
    let mut events = EventHandler::new(input);

    assert_eq!(events.next().await.unwrap().unwrap(), Event::Install);
    let bad = events.next().await.unwrap().unwrap_err();
    assert!(bad.to_string().contains("Invalid event 'not json'"));
    assert_eq!(
      events.next().await.unwrap().unwrap(),
      Event::Sync {
        tag: "incident-sync".to_string()
      }
    );
    assert!(events.next().await.is_none());
  }
}
