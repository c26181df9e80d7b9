//! Opening, driving and closing the raw file descriptors owned by the file
//! blocks.
//!
//! Pipes and sockets are switched to non-blocking mode and registered with
//! the tokio reactor, so a turn waits for readiness and then performs a
//! single `read(2)` or `write(2)`. Regular files and devices are always
//! ready; their calls run on the blocking pool. A call that outlives its
//! turn budget stays pending in the handle and is collected by the next
//! turn, so a transfer is only ever reported once the OS has completed it.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::task::JoinHandle;
use tokio::time::timeout;

#[cfg(unix)]
use tokio::io::unix::AsyncFd;

use crate::error::BlockError;

/// How a sink opens an existing file.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    #[default]
    Truncate,
    Append,
}

/// An open descriptor. Dropping the handle closes it, unless a blocking
/// call on a regular file is still in flight, in which case the descriptor
/// is closed as soon as that call returns.
pub struct Handle {
    io: Io,
}

enum Io {
    Blocking {
        file: Arc<std::fs::File>,
        pending_read: Option<JoinHandle<io::Result<Vec<u8>>>>,
        pending_write: Option<JoinHandle<io::Result<usize>>>,
    },
    #[cfg(unix)]
    Polled(AsyncFd<std::fs::File>),
}

impl Handle {
    /// Wraps an open file. Must be called within a tokio runtime.
    pub fn new(file: std::fs::File) -> io::Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;

            let file_type = file.metadata()?.file_type();
            if file_type.is_fifo() || file_type.is_socket() {
                set_nonblocking(&file)?;
                return Ok(Handle {
                    io: Io::Polled(AsyncFd::new(file)?),
                });
            }
        }
        Ok(Handle {
            io: Io::Blocking {
                file: Arc::new(file),
                pending_read: None,
                pending_write: None,
            },
        })
    }

    /// Whether readiness comes from the reactor (pipes and sockets).
    pub fn is_polled(&self) -> bool {
        match self.io {
            Io::Blocking { .. } => false,
            #[cfg(unix)]
            Io::Polled(_) => true,
        }
    }

    /// Appends at most `max` bytes to `dst`, waiting at most `budget`.
    ///
    /// Returns `Ok(None)` when nothing completed within the budget and
    /// `Ok(Some(0))` at end of file. A blocking read collected from an
    /// earlier turn may append more than `max` bytes.
    pub async fn read(
        &mut self,
        dst: &mut Vec<u8>,
        max: usize,
        budget: Duration,
    ) -> io::Result<Option<usize>> {
        match &mut self.io {
            Io::Blocking {
                file, pending_read, ..
            } => {
                let task = pending_read.get_or_insert_with(|| {
                    let file = Arc::clone(file);
                    tokio::task::spawn_blocking(move || -> io::Result<Vec<u8>> {
                        let mut buf = vec![0; max];
                        let n = (&*file).read(&mut buf)?;
                        buf.truncate(n);
                        Ok(buf)
                    })
                });
                let Ok(joined) = timeout(budget, task).await else {
                    return Ok(None);
                };
                *pending_read = None;
                let bytes = joined.map_err(io::Error::other)??;
                dst.extend_from_slice(&bytes);
                Ok(Some(bytes.len()))
            }
            #[cfg(unix)]
            Io::Polled(fd) => {
                let mut buf = vec![0; max];
                let read = timeout(budget, async {
                    loop {
                        let mut guard = fd.readable().await?;
                        if let Ok(result) = guard.try_io(|inner| inner.get_ref().read(&mut buf)) {
                            return result;
                        }
                    }
                })
                .await;
                match read {
                    Ok(Ok(n)) => {
                        dst.extend_from_slice(&buf[..n]);
                        Ok(Some(n))
                    }
                    Ok(Err(err)) => Err(err),
                    Err(_) => Ok(None),
                }
            }
        }
    }

    /// Writes a prefix of `data`, waiting at most `budget`. Returns the
    /// number of bytes the OS accepted, or `Ok(None)` when nothing
    /// completed within the budget.
    ///
    /// A blocking write that outlives its turn keeps running on a copy of
    /// `data`; callers must pass the same leading bytes until it completes.
    pub async fn write(&mut self, data: &[u8], budget: Duration) -> io::Result<Option<usize>> {
        match &mut self.io {
            Io::Blocking {
                file,
                pending_write,
                ..
            } => {
                let task = pending_write.get_or_insert_with(|| {
                    let file = Arc::clone(file);
                    let data = data.to_vec();
                    tokio::task::spawn_blocking(move || (&*file).write(&data))
                });
                let Ok(joined) = timeout(budget, task).await else {
                    return Ok(None);
                };
                *pending_write = None;
                joined.map_err(io::Error::other)?.map(Some)
            }
            #[cfg(unix)]
            Io::Polled(fd) => {
                let written = timeout(budget, async {
                    loop {
                        let mut guard = fd.writable().await?;
                        if let Ok(result) = guard.try_io(|inner| inner.get_ref().write(data)) {
                            return result;
                        }
                    }
                })
                .await;
                match written {
                    Ok(result) => result.map(Some),
                    Err(_) => Ok(None),
                }
            }
        }
    }

    /// Waits for calls still in flight on the blocking pool, then closes
    /// the descriptor.
    pub async fn shutdown(self) {
        if let Io::Blocking {
            file,
            pending_read,
            pending_write,
        } = self.io
        {
            if let Some(task) = pending_read {
                let _ = task.await;
            }
            if let Some(task) = pending_write {
                let _ = task.await;
            }
            drop(file);
        }
    }

    /// Seeks back to the start of the file. Fails on pipes and sockets.
    pub fn rewind(&mut self) -> io::Result<()> {
        let mut file: &std::fs::File = match &self.io {
            Io::Blocking { file, .. } => file,
            #[cfg(unix)]
            Io::Polled(fd) => fd.get_ref(),
        };
        file.seek(SeekFrom::Start(0)).map(drop)
    }
}

#[cfg(unix)]
fn set_nonblocking(file: &std::fs::File) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    let fd = file.as_raw_fd();
    // SAFETY: `fd` is owned by `file` and stays open across both calls.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn open_error(path: &str) -> impl FnOnce(io::Error) -> BlockError + '_ {
    move |source| BlockError::Open {
        path: path.to_string(),
        source,
    }
}

pub async fn open_for_read(path: &str) -> Result<Handle, BlockError> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .await
        .map_err(open_error(path))?;
    Handle::new(file.into_std().await).map_err(open_error(path))
}

/// Opens `path` for writing, creating it (owner read/write) if absent.
pub async fn open_for_write(path: &str, mode: WriteMode) -> Result<Handle, BlockError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true);
    match mode {
        WriteMode::Truncate => options.truncate(true),
        WriteMode::Append => options.append(true),
    };
    #[cfg(unix)]
    options.mode(0o600);
    let file = options.open(path).await.map_err(open_error(path))?;
    Handle::new(file.into_std().await).map_err(open_error(path))
}

/// Closes the handle if there is one. Returns whether a handle was closed.
pub async fn close(handle: &mut Option<Handle>) -> bool {
    match handle.take() {
        Some(handle) => {
            handle.shutdown().await;
            true
        }
        None => false,
    }
}
