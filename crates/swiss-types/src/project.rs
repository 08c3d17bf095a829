//! Project and resource model.
//!
//! A [`Project`] owns its source table and resource table exclusively; the
//! compiler borrows both read-only. File order is insertion order and is
//! semantic: it fixes symbol layout during code generation.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from project construction and editing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectError {
    #[error("file '{0}' already exists in the project")]
    DuplicateFile(String),

    #[error("resource '{0}' already exists in the project")]
    DuplicateResource(String),

    #[error("entry file '{0}' is not in the project")]
    MissingEntryFile(String),

    #[error("resource '{name}' has {actual} bytes, kind {kind} requires exactly {expected}")]
    BadResourceLength {
        name: String,
        kind: ResourceKind,
        expected: usize,
        actual: usize,
    },
}

/// Kind tag for a typed binary resource, as handed over by the asset
/// editors. The compiler treats payloads as opaque beyond name, kind and
/// length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    TileSet,
    Palette,
    MetatileMap,
    ScreenLayout,
    AudioPattern,
    Instrument,
    SoundEffect,
}

impl ResourceKind {
    /// Wire tag used in the cartridge resource table.
    pub fn tag(self) -> u8 {
        match self {
            Self::TileSet => 0,
            Self::Palette => 1,
            Self::MetatileMap => 2,
            Self::ScreenLayout => 3,
            Self::AudioPattern => 4,
            Self::Instrument => 5,
            Self::SoundEffect => 6,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::TileSet,
            1 => Self::Palette,
            2 => Self::MetatileMap,
            3 => Self::ScreenLayout,
            4 => Self::AudioPattern,
            5 => Self::Instrument,
            6 => Self::SoundEffect,
            _ => return None,
        })
    }

    /// Required payload length for fixed-size kinds.
    pub fn fixed_len(self) -> Option<usize> {
        match self {
            Self::TileSet => Some(4096),
            Self::Palette => Some(4),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TileSet => "tile_set",
            Self::Palette => "palette",
            Self::MetatileMap => "metatile_map",
            Self::ScreenLayout => "screen_layout",
            Self::AudioPattern => "audio_pattern",
            Self::Instrument => "instrument",
            Self::SoundEffect => "sound_effect",
        };
        write!(f, "{name}")
    }
}

/// A named, typed binary resource. Immutable once produced by its editor;
/// embedded by value into the cartridge image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub kind: ResourceKind,
    pub payload: Vec<u8>,
}

impl Resource {
    /// Create a resource, validating fixed-length kinds.
    pub fn new(
        name: impl Into<String>,
        kind: ResourceKind,
        payload: Vec<u8>,
    ) -> Result<Self, ProjectError> {
        let name = name.into();
        if let Some(expected) = kind.fixed_len() {
            if payload.len() != expected {
                return Err(ProjectError::BadResourceLength {
                    name,
                    kind,
                    expected,
                    actual: payload.len(),
                });
            }
        }
        Ok(Self {
            name,
            kind,
            payload,
        })
    }
}

/// One entry in the project's source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub name: String,
    pub text: String,
}

/// A multi-file Swiss project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    /// Source files in insertion order.
    files: Vec<SourceEntry>,
    /// Name of the designated entry file. Always present in `files`.
    entry: String,
    /// Typed binary resources in insertion order.
    resources: Vec<Resource>,
}

impl Project {
    /// Create a project with an (initially empty) entry file.
    pub fn new(name: impl Into<String>, entry_file: impl Into<String>) -> Self {
        let entry = entry_file.into();
        Self {
            name: name.into(),
            files: vec![SourceEntry {
                name: entry.clone(),
                text: String::new(),
            }],
            entry,
            resources: Vec::new(),
        }
    }

    pub fn entry_file(&self) -> &str {
        &self.entry
    }

    pub fn files(&self) -> &[SourceEntry] {
        &self.files
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn file(&self, name: &str) -> Option<&SourceEntry> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Add a new empty file. File names are unique within a project.
    pub fn add_file(&mut self, name: impl Into<String>) -> Result<(), ProjectError> {
        let name = name.into();
        if self.file(&name).is_some() {
            return Err(ProjectError::DuplicateFile(name));
        }
        self.files.push(SourceEntry {
            name,
            text: String::new(),
        });
        Ok(())
    }

    /// Replace a file's source text.
    pub fn set_source(&mut self, name: &str, text: impl Into<String>) -> Result<(), ProjectError> {
        match self.files.iter_mut().find(|f| f.name == name) {
            Some(entry) => {
                entry.text = text.into();
                Ok(())
            }
            None => Err(ProjectError::MissingEntryFile(name.to_string())),
        }
    }

    pub fn add_resource(&mut self, resource: Resource) -> Result<(), ProjectError> {
        if self.resources.iter().any(|r| r.name == resource.name) {
            return Err(ProjectError::DuplicateResource(resource.name));
        }
        self.resources.push(resource);
        Ok(())
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Check the project invariants: unique file names and a present entry
    /// file. `add_file` upholds uniqueness; this guards deserialized input.
    pub fn validate(&self) -> Result<(), ProjectError> {
        for (i, file) in self.files.iter().enumerate() {
            if self.files[..i].iter().any(|f| f.name == file.name) {
                return Err(ProjectError::DuplicateFile(file.name.clone()));
            }
        }
        if self.file(&self.entry).is_none() {
            return Err(ProjectError::MissingEntryFile(self.entry.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project_contains_entry() {
        let p = Project::new("demo", "main.swiss");
        assert_eq!(p.entry_file(), "main.swiss");
        assert_eq!(p.files().len(), 1);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_add_file_preserves_order_and_uniqueness() {
        let mut p = Project::new("demo", "main.swiss");
        p.add_file("lib.swiss").unwrap();
        assert_eq!(p.files().len(), 2);
        assert_eq!(p.files()[0].name, "main.swiss");
        assert_eq!(p.files()[1].name, "lib.swiss");

        let err = p.add_file("lib.swiss").unwrap_err();
        assert_eq!(err, ProjectError::DuplicateFile("lib.swiss".to_string()));
    }

    #[test]
    fn test_set_source_unknown_file() {
        let mut p = Project::new("demo", "main.swiss");
        assert!(p.set_source("other.swiss", "HALT").is_err());
    }

    #[test]
    fn test_palette_length_enforced() {
        let err = Resource::new("bg", ResourceKind::Palette, vec![0x0f; 3]).unwrap_err();
        match err {
            ProjectError::BadResourceLength {
                expected, actual, ..
            } => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(Resource::new("bg", ResourceKind::Palette, vec![0x0f; 4]).is_ok());
    }

    #[test]
    fn test_variable_length_kinds_unrestricted() {
        assert!(Resource::new("track", ResourceKind::AudioPattern, vec![1, 2, 3]).is_ok());
        assert!(Resource::new("map", ResourceKind::MetatileMap, Vec::new()).is_ok());
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let mut p = Project::new("demo", "main.swiss");
        p.add_resource(Resource::new("pal", ResourceKind::Palette, vec![0; 4]).unwrap())
            .unwrap();
        let dup = Resource::new("pal", ResourceKind::Palette, vec![1; 4]).unwrap();
        assert!(matches!(
            p.add_resource(dup),
            Err(ProjectError::DuplicateResource(_))
        ));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut p = Project::new("demo", "main.swiss");
        p.add_file("lib.swiss").unwrap();
        p.set_source("main.swiss", "SUB Main()\nEND SUB").unwrap();
        let json = serde_json::to_string(&p).unwrap();
        let back: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
        assert!(back.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_entry() {
        let json = r#"{"name":"bad","files":[{"name":"lib.swiss","text":""}],"entry":"main.swiss","resources":[]}"#;
        let p: Project = serde_json::from_str(json).unwrap();
        assert!(matches!(
            p.validate(),
            Err(ProjectError::MissingEntryFile(_))
        ));
    }
}
