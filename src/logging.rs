use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

/// Writer factory that copies every formatted line to stdout and to the
/// broadcast channel behind `GET /api/logs`.
#[derive(Clone)]
pub(crate) struct LogTee {
    pub sender: broadcast::Sender<String>,
}

impl<'a> MakeWriter<'a> for LogTee {
    type Writer = LogTeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogTeeWriter {
            sender: self.sender.clone(),
        }
    }
}

pub(crate) struct LogTeeWriter {
    sender: broadcast::Sender<String>,
}

impl std::io::Write for LogTeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        // No receivers is the normal case when nobody tails the stream.
        let _ = self
            .sender
            .send(String::from_utf8_lossy(buf).trim_end().to_string());
        std::io::stdout().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stdout().flush()
    }
}

/// Install the global subscriber and return the sender log lines are
/// published on.
pub(crate) fn init(max_level: Level) -> broadcast::Sender<String> {
    let (log_tx, _) = broadcast::channel::<String>(500);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level)
        .with_writer(LogTee {
            sender: log_tx.clone(),
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    log_tx
}
