use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tokio::fs::OpenOptions;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Poll until a possibly mid-write file looks complete.
///
/// A file counts as ready once it can be opened for reading and its size
/// holds steady across one poll interval. Returns `false` once the timeout
/// elapses or the file disappears; the caller treats that as
/// unprocessable-for-now and leaves the file on disk for a future
/// reconciliation pass.
pub async fn wait_until_ready(path: &Path, timeout: Duration, poll_interval: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut last_len: Option<u64> = None;

    loop {
        match OpenOptions::new().read(true).open(path).await {
            Ok(file) => match file.metadata().await {
                Ok(meta) => {
                    let len = meta.len();
                    if last_len == Some(len) {
                        return true;
                    }
                    debug!(
                        "file '{}' still growing ({} bytes), waiting for a stable size",
                        path.display(),
                        len
                    );
                    last_len = Some(len);
                }
                Err(_) => return false,
            },
            Err(err) if err.kind() == ErrorKind::NotFound => return false,
            Err(err) => {
                debug!(
                    "file '{}' not yet readable ({}), backing off",
                    path.display(),
                    err
                );
                last_len = None;
            }
        }

        if Instant::now() + poll_interval > deadline {
            return false;
        }
        sleep(poll_interval).await;
    }
}
