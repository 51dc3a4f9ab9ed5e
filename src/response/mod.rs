//! Artifact handling - base64 payloads from the engine and files on disk

pub mod base64;
pub mod file;

pub use file::ArtifactWriter;
