//! Run configuration.
//!
//! The configuration is a small JSON document that names the active renderer
//! and the asset directories. Directories are resolved against the directory
//! containing the file, so a checkout can be run from any working directory.
//!
//! ```json
//! {
//!     "currentRenderer": "vk",
//!     "renderers": { "vk": { "name": "minercaftVK-App" } },
//!     "shadersDir": "shaders",
//!     "texturesDir": "assets"
//! }
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Environment variable overriding the configuration file location.
pub const RUNCFG_ENV: &str = "VKCRAFT_RUNCFG";

/// File name looked up in the working directory when [`RUNCFG_ENV`] is unset.
pub const DEFAULT_RUNCFG_FILE: &str = "runcfg.json";

/// Per-renderer section of the configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RendererEntry {
    /// Human readable name, used as the window title.
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRunConfig {
    current_renderer: String,
    renderers: HashMap<String, RendererEntry>,
    shaders_dir: PathBuf,
    textures_dir: PathBuf,
    #[serde(default = "default_model_file")]
    model_file: String,
    #[serde(default = "default_texture_file")]
    texture_file: String,
    #[serde(default)]
    default_texture_file: Option<String>,
    #[serde(default)]
    flip_winding: bool,
}

fn default_model_file() -> String {
    "viking_room.obj".to_owned()
}

fn default_texture_file() -> String {
    "viking_room.png".to_owned()
}

/// Resolved run configuration.
///
/// Built once by the application driver and handed to the renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    pub project_dir: PathBuf,
    pub current_renderer: String,
    pub current_renderer_name: String,
    pub shaders_dir: PathBuf,
    pub textures_dir: PathBuf,
    /// Model file name, relative to `textures_dir`.
    pub model_file: String,
    /// Diffuse texture file name, relative to `textures_dir`.
    pub texture_file: String,
    /// Substituted for material textures missing on disk.
    pub default_texture_file: Option<String>,
    pub flip_winding: bool,
}

impl RunConfig {
    /// Parses a configuration document and resolves its directories against
    /// `project_dir`.
    pub fn from_json(json: &str, project_dir: impl Into<PathBuf>) -> Result<Self> {
        let project_dir = project_dir.into();
        let raw: RawRunConfig = serde_json::from_str(json)?;

        let entry = raw.renderers.get(&raw.current_renderer).ok_or_else(|| {
            Error::Config(format!(
                "currentRenderer '{}' has no entry in 'renderers'",
                raw.current_renderer
            ))
        })?;

        Ok(Self {
            shaders_dir: project_dir.join(&raw.shaders_dir),
            textures_dir: project_dir.join(&raw.textures_dir),
            current_renderer_name: entry.name.clone(),
            current_renderer: raw.current_renderer,
            model_file: raw.model_file,
            texture_file: raw.texture_file,
            default_texture_file: raw.default_texture_file,
            flip_winding: raw.flip_winding,
            project_dir,
        })
    }

    /// Loads the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read '{}': {e}", path.display()))
        })?;
        let project_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let config = Self::from_json(&json, project_dir)?;
        info!(
            path = %path.display(),
            renderer = %config.current_renderer,
            "Loaded run configuration"
        );
        Ok(config)
    }

    /// Finds the configuration: [`RUNCFG_ENV`] if set, else
    /// [`DEFAULT_RUNCFG_FILE`] in the working directory, else the defaults.
    pub fn locate() -> Result<Self> {
        if let Ok(path) = env::var(RUNCFG_ENV) {
            return Self::load(Path::new(&path));
        }

        let path = Path::new(DEFAULT_RUNCFG_FILE);
        if path.is_file() {
            Self::load(path)
        } else {
            debug!("No {DEFAULT_RUNCFG_FILE} found, using built-in configuration");
            Ok(Self::default())
        }
    }

    pub fn model_path(&self) -> PathBuf {
        self.textures_dir.join(&self.model_file)
    }

    pub fn texture_path(&self) -> PathBuf {
        self.textures_dir.join(&self.texture_file)
    }

    pub fn default_texture_path(&self) -> Option<PathBuf> {
        self.default_texture_file
            .as_ref()
            .map(|file| self.textures_dir.join(file))
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        let project_dir = PathBuf::from(".");
        Self {
            shaders_dir: project_dir.join("shaders"),
            textures_dir: project_dir.join("assets"),
            project_dir,
            current_renderer: "vk".to_owned(),
            current_renderer_name: "minercaftVK-App".to_owned(),
            model_file: default_model_file(),
            texture_file: default_texture_file(),
            default_texture_file: None,
            flip_winding: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "currentRenderer": "vk",
        "renderers": {
            "vk": { "name": "minercaftVK-App" },
            "gl": { "name": "minercaftGL-App" }
        },
        "shadersDir": "shaders",
        "texturesDir": "assets"
    }"#;

    #[test]
    fn test_from_json_resolves_directories() {
        let config = RunConfig::from_json(SAMPLE, "/project").unwrap();
        assert_eq!(config.current_renderer, "vk");
        assert_eq!(config.current_renderer_name, "minercaftVK-App");
        assert_eq!(config.shaders_dir, PathBuf::from("/project/shaders"));
        assert_eq!(config.textures_dir, PathBuf::from("/project/assets"));
        assert_eq!(
            config.model_path(),
            PathBuf::from("/project/assets/viking_room.obj")
        );
        assert!(!config.flip_winding);
    }

    #[test]
    fn test_unknown_current_renderer_is_rejected() {
        let json = SAMPLE.replace("\"currentRenderer\": \"vk\"", "\"currentRenderer\": \"dx\"");
        let err = RunConfig::from_json(&json, "/project").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_field_is_parse_error() {
        let err = RunConfig::from_json(r#"{ "currentRenderer": "vk" }"#, ".").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_optional_fields() {
        let json = r#"{
            "currentRenderer": "vk",
            "renderers": { "vk": { "name": "x" } },
            "shadersDir": "s",
            "texturesDir": "t",
            "modelFile": "cube.obj",
            "textureFile": "cube.png",
            "defaultTextureFile": "missing.png",
            "flipWinding": true
        }"#;
        let config = RunConfig::from_json(json, "p").unwrap();
        assert_eq!(config.model_path(), PathBuf::from("p/t/cube.obj"));
        assert_eq!(config.texture_path(), PathBuf::from("p/t/cube.png"));
        assert_eq!(
            config.default_texture_path(),
            Some(PathBuf::from("p/t/missing.png"))
        );
        assert!(config.flip_winding);
    }

    #[test]
    fn test_load_uses_file_directory_as_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runcfg.json");
        fs::write(&path, SAMPLE).unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.project_dir, dir.path());
        assert_eq!(config.shaders_dir, dir.path().join("shaders"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
