//! Renderer settings resolved from the run configuration.

use std::path::PathBuf;

use vkcraft_core::RunConfig;
use vkcraft_rhi::shader::ShaderStage;

/// Everything the renderer reads from outside at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    pub shaders_dir: PathBuf,
    pub textures_dir: PathBuf,
    pub model_path: PathBuf,
    pub texture_path: PathBuf,
    pub default_texture_path: Option<PathBuf>,
    pub window_title: String,
    pub enable_validation: bool,
    pub flip_winding: bool,
}

impl RendererConfig {
    /// Validation follows the build profile.
    pub fn from_run_config(run: &RunConfig) -> Self {
        Self {
            shaders_dir: run.shaders_dir.clone(),
            textures_dir: run.textures_dir.clone(),
            model_path: run.model_path(),
            texture_path: run.texture_path(),
            default_texture_path: run.default_texture_path(),
            window_title: run.current_renderer_name.clone(),
            enable_validation: cfg!(debug_assertions),
            flip_winding: run.flip_winding,
        }
    }

    pub fn shader_path(&self, stage: ShaderStage) -> PathBuf {
        self.shaders_dir.join(stage.binary_name())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::from_run_config(&RunConfig::default())
    }
}
