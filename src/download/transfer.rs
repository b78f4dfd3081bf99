use std::path::Path;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Identifies one transfer in progress events
#[derive(Debug, Clone)]
pub struct TransferContext<'a> {
    pub download_id: usize,
    pub label: &'a str,
}

/// Stream `url` into `output_path`, truncating whatever is there.
///
/// Any status outside 2xx fails before the file is created. Returns the
/// number of bytes written.
pub async fn stream_to_file<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    output_path: &Path,
    context: &TransferContext<'_>,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if !(200..300).contains(&response.status) {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    reporter.report(ProgressEvent::DownloadStarting {
        download_id: context.download_id,
        label: context.label.to_string(),
        content_length: response.content_length,
    });

    let mut file =
        File::create(output_path)
            .await
            .map_err(|e| DownloadError::FileCreateFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::DownloadProgress {
            download_id: context.download_id,
            bytes_downloaded,
            total_bytes: response.content_length,
        });
    }

    // Flush and sync so the rename that follows never exposes a short file
    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;
    file.sync_all()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    Ok(bytes_downloaded)
}
