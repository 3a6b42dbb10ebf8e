use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// How often a running `pdftoppm` is checked for exit.
const EXIT_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Failed to stage PDF for rendering: {0}")]
    Staging(#[source] std::io::Error),

    #[error("Failed to run pdftoppm: {0}. Make sure poppler-utils is installed.")]
    Spawn(#[source] std::io::Error),

    #[error("pdftoppm did not finish within {}s", .0.as_secs_f64())]
    TimedOut(Duration),

    #[error("pdftoppm failed: {0}")]
    Failed(String),

    #[error("Rendered page image missing: {0}")]
    MissingOutput(#[source] std::io::Error),
}

/// Rasterizes the first page of a PDF through poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PageRenderer {
    program: PathBuf,
    dpi: u32,
    timeout: Duration,
}

impl PageRenderer {
    pub fn new(dpi: u32) -> Self {
        Self {
            program: PathBuf::from("pdftoppm"),
            dpi,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// A render still running after `timeout` is killed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns PNG bytes for page 1.
    pub fn render_first_page(&self, pdf_bytes: &[u8]) -> Result<Vec<u8>, RenderError> {
        let _span = tracing::info_span!("parser.pdf.render", dpi = self.dpi).entered();

        let scratch = ScratchFiles::new();
        std::fs::write(&scratch.pdf, pdf_bytes).map_err(RenderError::Staging)?;

        let mut child = Command::new(&self.program)
            .args(["-png", "-singlefile", "-f", "1", "-l", "1", "-r"])
            .arg(self.dpi.to_string())
            .arg(&scratch.pdf)
            .arg(&scratch.prefix)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RenderError::Spawn)?;

        let status = wait_with_deadline(&mut child, self.timeout)?;
        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Err(RenderError::Failed(stderr.trim().to_string()));
        }

        std::fs::read(scratch.png()).map_err(RenderError::MissingOutput)
    }
}

/// Waits for `child`, killing it once `timeout` has passed.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<ExitStatus, RenderError> {
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                tracing::warn!(timeout_secs = timeout.as_secs_f64(), "killing pdftoppm");
                if let Err(e) = child.kill() {
                    tracing::debug!(error = %e, "pdftoppm exited before it could be killed");
                }
                let _ = child.wait();
                return Err(RenderError::TimedOut(timeout));
            }
            Ok(None) => std::thread::sleep(EXIT_POLL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RenderError::Spawn(e));
            }
        }
    }
}

/// Temp paths removed on drop.
struct ScratchFiles {
    pdf: PathBuf,
    prefix: PathBuf,
}

impl ScratchFiles {
    fn new() -> Self {
        let temp_dir = std::env::temp_dir();
        let id = Uuid::new_v4();
        Self {
            pdf: temp_dir.join(format!("shelf_render_{}.pdf", id)),
            prefix: temp_dir.join(format!("shelf_cover_{}", id)),
        }
    }

    fn png(&self) -> PathBuf {
        self.prefix.with_extension("png")
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        remove_quietly(&self.pdf);
        remove_quietly(&self.png());
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(error = %e, "failed to remove render scratch file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_scratch_paths_are_unique_and_cleaned() {
        let a = ScratchFiles::new();
        let b = ScratchFiles::new();
        assert_ne!(a.pdf, b.pdf);
        assert_eq!(a.png().extension().and_then(|e| e.to_str()), Some("png"));

        std::fs::write(&a.pdf, b"%PDF-").unwrap();
        let staged = a.pdf.clone();
        drop(a);
        assert!(!staged.exists());
    }

    #[test]
    #[serial]
    fn test_invalid_pdf_fails_without_output() {
        let renderer = PageRenderer::new(72);
        // Either pdftoppm is missing or it rejects the input; neither yields an image.
        assert!(renderer.render_first_page(b"not a pdf").is_err());
    }

    #[test]
    #[serial]
    fn test_missing_program_is_a_spawn_error() {
        let renderer = PageRenderer::new(72).with_program("/nonexistent/shelf/pdftoppm");
        assert!(matches!(
            renderer.render_first_page(b"%PDF-1.4"),
            Err(RenderError::Spawn(_))
        ));
    }

    #[cfg(unix)]
    mod fake_pdftoppm {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        /// Installs a shell script standing in for pdftoppm. The output
        /// prefix is its tenth argument.
        fn script(dir: &TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("pdftoppm");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        #[serial]
        fn test_hung_render_is_killed_at_the_deadline() {
            let dir = TempDir::new().unwrap();
            let renderer = PageRenderer::new(72)
                .with_program(script(&dir, "sleep 30"))
                .with_timeout(Duration::from_millis(200));

            let started = Instant::now();
            let result = renderer.render_first_page(b"%PDF-1.4");

            assert!(matches!(result, Err(RenderError::TimedOut(t)) if t == Duration::from_millis(200)));
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[test]
        #[serial]
        fn test_failed_render_reports_stderr() {
            let dir = TempDir::new().unwrap();
            let renderer = PageRenderer::new(72)
                .with_program(script(&dir, "echo 'Syntax Error: broken xref' >&2; exit 1"));

            match renderer.render_first_page(b"%PDF-1.4") {
                Err(RenderError::Failed(stderr)) => assert_eq!(stderr, "Syntax Error: broken xref"),
                other => panic!("expected Failed, got {:?}", other),
            }
        }

        #[test]
        #[serial]
        fn test_rendered_page_is_read_back() {
            let dir = TempDir::new().unwrap();
            let renderer = PageRenderer::new(72)
                .with_program(script(&dir, "printf 'page-one' > \"${10}.png\""));

            assert_eq!(renderer.render_first_page(b"%PDF-1.4").unwrap(), b"page-one");
        }
    }
}
