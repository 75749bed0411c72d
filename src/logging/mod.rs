use std::io::{self, Write};

use env_logger::{Builder, Env};
use tokio::{
    fs::{create_dir_all, metadata, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

use crate::{
    config,
    core::{ClientResult, ErrorContext},
};

pub struct AsyncWriter {
    sender: UnboundedSender<Vec<u8>>,
}

impl Write for AsyncWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let data = buf.to_vec();
        self.sender.send(data).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Installs `env_logger`, piping records to a background file writer when a
/// log path is configured and to stderr otherwise.
///
/// `RUST_LOG` overrides the configured level.
pub struct Logger {
    sender: UnboundedSender<Vec<u8>>,
    receiver: UnboundedReceiver<Vec<u8>>,
    config: config::Log,
}

impl Logger {
    pub fn new(config: config::Log) -> Self {
        let (sender, receiver) = unbounded_channel::<Vec<u8>>();
        Self {
            sender,
            receiver,
            config,
        }
    }

    fn create_async_writer(&self) -> AsyncWriter {
        AsyncWriter {
            sender: self.sender.clone(),
        }
    }

    pub fn init_env_logger(&self) -> ClientResult<()> {
        let mut builder = Builder::from_env(Env::default().default_filter_or(&self.config.level));
        if self.config.path.is_some() {
            builder.target(env_logger::Target::Pipe(Box::new(self.create_async_writer())));
        }
        builder.try_init().with_context("failed to install logger")
    }

    /// Starts the file writer; `None` when logging to stderr.
    ///
    /// The task ends once every writer handed to `env_logger` is gone.
    pub fn spawn_writer(self) -> Option<JoinHandle<ClientResult<()>>> {
        let Self {
            receiver, config, ..
        } = self;
        let path = config.path?;
        Some(tokio::spawn(write_log(path, receiver)))
    }
}

async fn write_log(path: String, mut receiver: UnboundedReceiver<Vec<u8>>) -> ClientResult<()> {
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() && metadata(parent).await.is_err() {
            create_dir_all(parent).await?;
        }
    }

    let mut file = BufWriter::new(
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await?,
    );

    while let Some(data) = receiver.recv().await {
        file.write_all(&data).await?;
        file.flush().await?;
    }

    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_reach_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("client.log");
        let logger = Logger::new(config::Log {
            level: "debug".to_string(),
            path: Some(path.display().to_string()),
        });

        let mut writer = logger.create_async_writer();
        writer.write_all(b"first\n").unwrap();
        let handle = logger.spawn_writer().unwrap();
        writer.write_all(b"second\n").unwrap();
        drop(writer);

        handle.await.unwrap().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_stderr_logging_has_no_writer() {
        let logger = Logger::new(config::Log::default());
        assert!(logger.spawn_writer().is_none());
    }
}
