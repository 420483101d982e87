//! Category assignment with a pluggable strategy.
//!
//! Downstream organizers pass the strategy they want instead of swapping out a
//! categorization function at runtime.

use crate::file_types::ContentClassifier;
use crate::signatures::{Category, SignatureDatabase};
use std::path::Path;

/// Extensions with no reliable magic number.
const TEXT_EXTENSIONS: &[(&str, Category)] = &[
    ("txt", Category::Document),
    ("md", Category::Document),
    ("markdown", Category::Document),
    ("csv", Category::Document),
    ("tsv", Category::Document),
    ("tex", Category::Document),
    ("log", Category::Other),
    ("rs", Category::Code),
    ("c", Category::Code),
    ("h", Category::Code),
    ("cpp", Category::Code),
    ("hpp", Category::Code),
    ("go", Category::Code),
    ("java", Category::Code),
    ("kt", Category::Code),
    ("swift", Category::Code),
    ("ts", Category::Code),
    ("tsx", Category::Code),
    ("jsx", Category::Code),
    ("css", Category::Code),
    ("scss", Category::Code),
    ("json", Category::Code),
    ("yaml", Category::Code),
    ("yml", Category::Code),
    ("toml", Category::Code),
    ("sql", Category::Code),
    ("ps1", Category::Code),
    ("bat", Category::Code),
];

/// Category implied by an extension alone.
///
/// Signature database registrations take precedence over the text-format table.
#[must_use]
pub fn category_for_extension(ext: &str) -> Option<Category> {
    if let Some(descriptor) = SignatureDatabase::global().for_extension(ext).first() {
        return Some(descriptor.category);
    }
    let ext = ext.trim_start_matches('.');
    TEXT_EXTENSIONS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, category)| *category)
}

fn extension_category(path: &Path) -> Category {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(category_for_extension)
        .unwrap_or(Category::Other)
}

pub trait CategoryStrategy: Send + Sync {
    /// Assign a category given the path and a prefix of its content (may be empty).
    fn categorize(&self, path: &Path, prefix: &[u8]) -> Category;

    fn name(&self) -> &'static str;
}

/// Looks only at the extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionStrategy;

impl CategoryStrategy for ExtensionStrategy {
    fn categorize(&self, path: &Path, _prefix: &[u8]) -> Category {
        extension_category(path)
    }

    fn name(&self) -> &'static str {
        "extension"
    }
}

/// Trusts the byte signature, falling back to the extension for unrecognized content.
#[derive(Debug, Clone, Default)]
pub struct ContentStrategy {
    classifier: ContentClassifier,
}

impl ContentStrategy {
    #[must_use]
    pub const fn new(classifier: ContentClassifier) -> Self {
        Self { classifier }
    }
}

impl CategoryStrategy for ContentStrategy {
    fn categorize(&self, path: &Path, prefix: &[u8]) -> Category {
        self.classifier
            .classify(prefix)
            .matched_type
            .map_or_else(|| extension_category(path), |descriptor| descriptor.category)
    }

    fn name(&self) -> &'static str {
        "content"
    }
}

/// Categorize `path` with the given strategy.
pub fn categorize_with(path: &Path, prefix: &[u8], strategy: &dyn CategoryStrategy) -> Category {
    let category = strategy.categorize(path, prefix);
    tracing::trace!("Categorized with {} strategy as {}", strategy.name(), category);
    category
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("report.pdf", Category::Document)]
    #[case("photo.JPG", Category::Image)]
    #[case("setup.exe", Category::Executable)]
    #[case("backup.tar", Category::Archive)]
    #[case("song.flac", Category::Audio)]
    #[case("clip.mkv", Category::Video)]
    #[case("main.rs", Category::Code)]
    #[case("notes.txt", Category::Document)]
    #[case("README", Category::Other)]
    #[case("data.unknownext", Category::Other)]
    fn test_extension_strategy(#[case] name: &str, #[case] expected: Category) {
        assert_eq!(categorize_with(Path::new(name), &[], &ExtensionStrategy), expected);
    }

    #[test]
    fn test_content_strategy_trusts_bytes() {
        let strategy = ContentStrategy::default();
        // PE executable saved as a PDF
        assert_eq!(
            categorize_with(Path::new("invoice.pdf"), b"MZ\x90\x00", &strategy),
            Category::Executable
        );
        assert_eq!(
            categorize_with(Path::new("invoice.pdf"), b"MZ\x90\x00", &ExtensionStrategy),
            Category::Document
        );
    }

    #[test]
    fn test_content_strategy_falls_back_to_extension() {
        let strategy = ContentStrategy::default();
        assert_eq!(
            categorize_with(Path::new("notes.md"), b"# Heading", &strategy),
            Category::Document
        );
        assert_eq!(categorize_with(Path::new("empty.bin"), &[], &strategy), Category::Other);
    }

    #[test]
    fn test_strategies_are_object_safe() {
        let strategies: Vec<Box<dyn CategoryStrategy>> =
            vec![Box::new(ExtensionStrategy), Box::new(ContentStrategy::default())];
        let names: Vec<&str> = strategies.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["extension", "content"]);
    }
}
