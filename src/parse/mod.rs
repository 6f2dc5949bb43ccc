pub mod content;
pub mod extractor;

// Re-export common types
pub use content::ContentExtractor;
pub use extractor::PageParser;
