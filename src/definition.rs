//! Definition documents: the structured text file that describes an archive's contents.
//!
//! Only the format is recognized, by file extension. Parsing the document is
//! left to the caller.

use std::fmt;
use std::path::Path;

use crate::container::Container;
use crate::error::{ZipError, ZipResult};
use crate::io::ByteSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Xml,
    Json,
    Yaml,
    Toml,
}

impl DefinitionKind {
    /// Guess the format from the extension of `path`, ignoring case.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xml" => Some(DefinitionKind::Xml),
            "json" => Some(DefinitionKind::Json),
            "yaml" | "yml" => Some(DefinitionKind::Yaml),
            "toml" => Some(DefinitionKind::Toml),
            _ => None,
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DefinitionKind::Xml => "XML",
            DefinitionKind::Json => "JSON",
            DefinitionKind::Yaml => "YAML",
            DefinitionKind::Toml => "TOML",
        })
    }
}

/// The text of a definition document together with its format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub kind: DefinitionKind,
    pub content: String,
}

impl AsRef<str> for Definition {
    fn as_ref(&self) -> &str {
        &self.content
    }
}

impl<S: ByteSource> Container<S> {
    /// Read the definition document stored at `path`.
    ///
    /// Fails with [`ZipError::UnknownDefinition`] before touching the archive
    /// if the extension isn't one of xml, json, yaml/yml or toml.
    pub async fn read_definition(&self, path: &str) -> ZipResult<Definition> {
        let kind = DefinitionKind::from_path(path)
            .ok_or_else(|| ZipError::UnknownDefinition(path.to_string()))?;
        let content = self.read_to_string(path).await?;
        Ok(Definition { kind, content })
    }
}
