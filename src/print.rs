//! Printing and pre-opening of uploaded documents.
//!
//! Documents go to the platform's native tooling: the print spooler for
//! `/print`, the default document viewer for `/preopen`. Only the document
//! types the workflow deals in are accepted; anything else is rejected
//! before a process is spawned.

use std::path::Path;
use std::process::ExitStatus;
use tokio::process::Command;
use tracing::info;

const SUPPORTED_EXTENSIONS: &[&str] = &["doc", "docx", "xls", "xlsx", "ppt", "pptx", "pdf"];

#[derive(Debug, thiserror::Error)]
pub enum PrintError {
    #[error("unsupported file type: .{0}")]
    UnsupportedType(String),
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("{command} exited with {status}")]
    CommandFailed { command: String, status: ExitStatus },
}

pub struct PrintService;

impl PrintService {
    /// Sends the document to the default printer.
    pub async fn print_file(&self, path: &Path) -> Result<(), PrintError> {
        check_supported(path)?;
        info!(path = %path.display(), "submitting print job");
        run(print_command(path)).await
    }

    /// Opens the document in the platform's default viewer.
    pub async fn open_file(&self, path: &Path) -> Result<(), PrintError> {
        check_supported(path)?;
        info!(path = %path.display(), "opening document");
        run(open_command(path)).await
    }
}

fn check_supported(path: &Path) -> Result<(), PrintError> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(PrintError::UnsupportedType(ext))
    }
}

#[cfg(windows)]
fn print_command(path: &Path) -> Command {
    let mut cmd = Command::new("powershell");
    cmd.arg("-NoProfile").arg("-Command").arg(format!(
        "Start-Process -FilePath '{}' -Verb Print",
        path.display()
    ));
    cmd
}

#[cfg(unix)]
fn print_command(path: &Path) -> Command {
    let mut cmd = Command::new("lp");
    cmd.arg(path);
    cmd
}

#[cfg(windows)]
fn open_command(path: &Path) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg("start").arg("").arg(path);
    cmd
}

#[cfg(target_os = "macos")]
fn open_command(path: &Path) -> Command {
    let mut cmd = Command::new("open");
    cmd.arg(path);
    cmd
}

#[cfg(all(unix, not(target_os = "macos")))]
fn open_command(path: &Path) -> Command {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(path);
    cmd
}

async fn run(mut cmd: Command) -> Result<(), PrintError> {
    let command = format!("{:?}", cmd.as_std());
    let status = cmd.status().await.map_err(|source| PrintError::Spawn {
        command: command.clone(),
        source,
    })?;
    if !status.success() {
        return Err(PrintError::CommandFailed { command, status });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn accepts_the_document_types_of_the_workflow() {
        for name in [
            "a.pdf", "b.doc", "c.docx", "d.xls", "e.xlsx", "f.ppt", "g.pptx", "H.PDF",
        ] {
            assert!(check_supported(&PathBuf::from(name)).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_everything_else() {
        for name in ["run.exe", "notes.txt", "archive", "image.png"] {
            let err = check_supported(&PathBuf::from(name)).unwrap_err();
            assert!(matches!(err, PrintError::UnsupportedType(_)), "{name}");
        }
    }
}
