//! File lists handed to the analyzer as trailing arguments.

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::io::AsyncBufRead;

use crate::command::read_line_lossy;

/// Split newline-separated text into file names, dropping blank lines.
pub fn split_file_list(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Stream file names from `reader` as lines arrive.
///
/// A read error ends the stream after logging it.
pub fn file_list_stream<R>(reader: R) -> BoxStream<'static, String>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    stream::unfold((reader, Vec::new()), |(mut reader, mut buf)| async move {
        loop {
            match read_line_lossy(&mut reader, &mut buf).await {
                Ok(Some(line)) => {
                    if !line.is_empty() {
                        return Some((line, (reader, buf)));
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read file list");
                    return None;
                }
            }
        }
    })
    .boxed()
}
