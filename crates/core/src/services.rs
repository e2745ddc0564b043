//! Host services the editor reports to
//!
//! The editor never shows UI itself. User-facing messages go to a
//! [`Notifier`], feature checks to an [`AccessGate`] and finished exports to
//! a [`DownloadSink`].

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(name)
    }
}

/// Receives user-facing messages
pub trait Notifier {
    fn notify(&self, message: &str, severity: Severity);
}

/// Forwards messages to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info | Severity::Success => log::info!("{message}"),
            Severity::Warning => log::warn!("{message}"),
            Severity::Error => log::error!("{message}"),
        }
    }
}

/// Decides whether a feature ("editor", "export") may be used
pub trait AccessGate {
    fn check(&self, feature: &str) -> bool;
}

impl<F> AccessGate for F
where
    F: Fn(&str) -> bool,
{
    fn check(&self, feature: &str) -> bool {
        self(feature)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessGate for AllowAll {
    fn check(&self, _feature: &str) -> bool {
        true
    }
}

/// Destination of exported documents
pub trait DownloadSink {
    fn save(&mut self, bytes: &[u8], filename: &str) -> io::Result<()>;
}

/// Writes exports into a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }
}

impl DownloadSink for DirectorySink {
    fn save(&mut self, bytes: &[u8], filename: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(filename);
        fs::write(&path, bytes)?;
        log::info!("saved {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

/// Keeps the last saved document in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub saved: Vec<(String, Vec<u8>)>,
}

impl DownloadSink for MemorySink {
    fn save(&mut self, bytes: &[u8], filename: &str) -> io::Result<()> {
        self.saved.push((filename.to_string(), bytes.to_vec()));
        Ok(())
    }
}

/// Append `.pdf` unless the name already ends with it (any case)
///
/// A blank name becomes `document.pdf`.
pub fn normalize_pdf_filename(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return "document.pdf".to_string();
    }
    if name.to_ascii_lowercase().ends_with(".pdf") {
        name.to_string()
    } else {
        format!("{name}.pdf")
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Collects notifications; clones share the log
    #[derive(Debug, Clone, Default)]
    pub struct RecordingNotifier {
        pub messages: Rc<RefCell<Vec<(Severity, String)>>>,
    }

    impl RecordingNotifier {
        pub fn count(&self, severity: Severity) -> usize {
            self.messages
                .borrow()
                .iter()
                .filter(|(s, _)| *s == severity)
                .count()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, message: &str, severity: Severity) {
            self.messages.borrow_mut().push((severity, message.to_string()));
        }
    }
}
