//! Page image rendering through an external tool.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Produces one PNG per page, named `{prefix}-{page}.png`, in `out_dir`.
pub trait PageRenderer: Send + Sync {
    fn render(&self, pdf: &Path, out_dir: &Path, prefix: &str) -> Result<()>;
}

/// Renders pages with poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    program: PathBuf,
    dpi: Option<u32>,
}

impl PdftoppmRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `pdftoppm` binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Render at this resolution instead of the tool default.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi);
        self
    }
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("pdftoppm"),
            dpi: None,
        }
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn render(&self, pdf: &Path, out_dir: &Path, prefix: &str) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.arg("-png");
        if let Some(dpi) = self.dpi {
            command.arg("-r").arg(dpi.to_string());
        }
        command.arg(pdf).arg(out_dir.join(prefix));

        log::debug!("Running {:?}", command);
        let output = command
            .output()
            .map_err(|e| Error::Render(format!("{}: {}", self.program.display(), e)))?;
        if !output.status.success() {
            return Err(Error::Render(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Page number of a rendered file name such as `doc-3.png` or `doc-03.png`.
pub fn page_number(file_name: &str) -> Option<u32> {
    let stem = file_name.strip_suffix(".png")?;
    let (_, number) = stem.rsplit_once('-')?;
    number.parse().ok()
}

/// Rendered page files currently present in `dir`, by page number.
pub fn rendered_pages(dir: &Path) -> Result<BTreeMap<u32, PathBuf>> {
    let mut pages = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(page) = name.to_str().and_then(page_number) {
            pages.insert(page, entry.path());
        }
    }
    Ok(pages)
}

/// Whether a rendered page can be consumed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageReadiness {
    /// The next page exists, so this one is complete.
    Ready(PathBuf),
    /// The final page exists but may still be being written.
    Settling(PathBuf),
    Pending,
}

/// Decide whether page `page` of `total` can be read from `pages`.
pub fn page_readiness(pages: &BTreeMap<u32, PathBuf>, page: u32, total: u32) -> PageReadiness {
    match pages.get(&page) {
        Some(path) if pages.contains_key(&(page + 1)) => PageReadiness::Ready(path.clone()),
        Some(path) if page >= total => PageReadiness::Settling(path.clone()),
        _ => PageReadiness::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_number() {
        assert_eq!(page_number("abc-3.png"), Some(3));
        assert_eq!(page_number("abc-def-012.png"), Some(12));
        assert_eq!(page_number("abc-3.ppm"), None);
        assert_eq!(page_number("cover.png"), None);
    }

    #[test]
    fn test_readiness() {
        let pages: BTreeMap<u32, PathBuf> = [(1, "d-1.png"), (2, "d-2.png"), (3, "d-3.png")]
            .into_iter()
            .map(|(n, p)| (n, PathBuf::from(p)))
            .collect();
        assert_eq!(page_readiness(&pages, 1, 4), PageReadiness::Ready("d-1.png".into()));
        // page 3 exists but page 4 does not yet
        assert_eq!(page_readiness(&pages, 3, 4), PageReadiness::Pending);
        assert_eq!(page_readiness(&pages, 3, 3), PageReadiness::Settling("d-3.png".into()));
        assert_eq!(page_readiness(&pages, 5, 6), PageReadiness::Pending);
    }

    #[test]
    fn test_rendered_pages_scans_directory() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["job-01.png", "job-02.png", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let pages = rendered_pages(dir.path()).unwrap();
        assert_eq!(pages.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_missing_program_is_render_error() {
        let renderer = PdftoppmRenderer::new().with_program("/nonexistent/pdftoppm");
        let dir = tempfile::tempdir().unwrap();
        let result = renderer.render(Path::new("in.pdf"), dir.path(), "job");
        assert!(matches!(result, Err(Error::Render(_))));
    }
}
