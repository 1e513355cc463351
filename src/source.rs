//! JSON-lines trip source.
//!
//! Each non-blank line is decoded as a [`RawTrip`] and checked against the
//! input contract. A bad line is fatal for that line only:
//! [`valid_trips`] logs it, counts it in `hopcount_invalid_input_total` and
//! moves on.

use crate::error::SourceError;
use crate::event::{RawTrip, TripEvent};
use crate::metrics;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

/// Decodes one line into an event.
pub fn decode_line(line_no: u64, line: &str) -> Result<TripEvent, SourceError> {
  let raw: RawTrip = serde_json::from_str(line).map_err(|source| SourceError::Malformed {
    line: line_no,
    source,
  })?;
  TripEvent::try_from(raw).map_err(|source| SourceError::Invalid {
    line: line_no,
    source,
  })
}

/// Streams every line of `reader` as a decode result.
///
/// Blank lines are skipped. A read error is yielded once and ends the stream.
pub fn read_trips<R>(reader: R) -> impl Stream<Item = Result<TripEvent, SourceError>> + Send
where
  R: AsyncBufRead + Unpin + Send,
{
  async_stream::stream! {
    let mut lines = reader.lines();
    let mut line_no = 0u64;
    loop {
      match lines.next_line().await {
        Ok(Some(line)) => {
          line_no += 1;
          if line.trim().is_empty() {
            continue;
          }
          yield decode_line(line_no, &line);
        }
        Ok(None) => break,
        Err(e) => {
          yield Err(SourceError::Io(e));
          break;
        }
      }
    }
  }
}

/// Streams only the valid events of `reader`, logging and counting the rest.
pub fn valid_trips<R>(reader: R) -> impl Stream<Item = TripEvent> + Send
where
  R: AsyncBufRead + Unpin + Send,
{
  read_trips(reader).filter_map(|decoded| async move {
    match decoded {
      Ok(event) => Some(event),
      Err(e) => {
        warn!(error = %e, reason = e.reason(), "skipping trip record");
        metrics::record_invalid_input(e.reason());
        None
      }
    }
  })
}
