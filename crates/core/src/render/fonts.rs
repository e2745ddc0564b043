//! Installed font lookup for text rasterization
//!
//! Fonts are found by file name: `Arial-Bold.ttf` serves family "Arial"
//! with bold set. Matching is case-insensitive and ignores spaces, dashes
//! and underscores, so "Dancing Script" finds `DancingScript-Regular.ttf`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use fontdue::{Font, FontSettings};

/// Parsed fonts keyed by normalized file stem
#[derive(Clone, Default)]
pub struct FontBook {
    faces: BTreeMap<String, Arc<Font>>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontBook")
            .field("faces", &self.faces.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FontBook {
    /// Book with no fonts; text falls back to placeholder boxes
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scan `dirs` (not recursively) for `.ttf` and `.otf` files
    ///
    /// Unreadable directories and files that fail to parse are skipped with
    /// a warning.
    pub fn load<P: AsRef<Path>>(dirs: &[P]) -> Self {
        let mut book = Self::empty();
        for dir in dirs {
            let dir = dir.as_ref();
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("skipping font directory {}: {e}", dir.display());
                    continue;
                }
            };
            for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
                let is_font = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("ttf") || ext.eq_ignore_ascii_case("otf"));
                if !is_font {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                match fs::read(&path).map_err(|e| e.to_string()).and_then(|bytes| {
                    Font::from_bytes(bytes, FontSettings::default()).map_err(str::to_string)
                }) {
                    Ok(font) => {
                        book.faces.insert(normalize(stem), Arc::new(font));
                    }
                    Err(e) => log::warn!("skipping font {}: {e}", path.display()),
                }
            }
        }

        if book.is_empty() {
            log::warn!("no fonts found, text will render as placeholder boxes");
        } else {
            log::info!("loaded {} font faces", book.len());
        }
        book
    }

    /// Register a face from raw font bytes under `name`
    pub fn insert(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), String> {
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(str::to_string)?;
        self.faces.insert(normalize(name), Arc::new(font));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Best face for a family and style
    ///
    /// Returns the face and whether it actually carries the requested
    /// weight and slant, so the caller can synthesize what is missing. An
    /// unknown family falls back to the first face in name order.
    pub fn resolve(&self, family: &str, bold: bool, italic: bool) -> Option<ResolvedFace> {
        let family = normalize(family);
        let styled = match (bold, italic) {
            (true, true) => vec!["bolditalic", "boldoblique", "bi"],
            (true, false) => vec!["bold", "bd", "b"],
            (false, true) => vec!["italic", "oblique", "i"],
            (false, false) => vec![],
        };
        for suffix in styled {
            if let Some(font) = self.faces.get(&format!("{family}{suffix}")) {
                return Some(ResolvedFace {
                    font: Arc::clone(font),
                    synthetic_bold: false,
                    synthetic_italic: false,
                });
            }
        }

        let regular = ["", "regular", "r"]
            .iter()
            .find_map(|suffix| self.faces.get(&format!("{family}{suffix}")))
            .or_else(|| self.faces.values().next())?;
        Some(ResolvedFace {
            font: Arc::clone(regular),
            synthetic_bold: bold,
            synthetic_italic: italic,
        })
    }
}

/// A face picked by [`FontBook::resolve`]
#[derive(Clone)]
pub struct ResolvedFace {
    pub font: Arc<Font>,
    pub synthetic_bold: bool,
    pub synthetic_italic: bool,
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Dancing Script"), "dancingscript");
        assert_eq!(normalize("DancingScript-Regular"), "dancingscriptregular");
        assert_eq!(normalize("Arial_Bold"), "arialbold");
    }

    #[test]
    fn test_empty_book_resolves_nothing() {
        let book = FontBook::empty();
        assert!(book.resolve("Arial", false, false).is_none());
    }

    #[test]
    fn test_load_skips_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Broken.ttf"), b"not a font").unwrap();
        fs::write(dir.path().join("readme.txt"), b"hello").unwrap();

        let book = FontBook::load(&[dir.path().to_path_buf(), dir.path().join("missing")]);
        assert!(book.is_empty());
    }

    #[test]
    fn test_insert_rejects_garbage() {
        let mut book = FontBook::empty();
        assert!(book.insert("Arial", vec![0u8; 16]).is_err());
        assert!(book.is_empty());
    }
}
