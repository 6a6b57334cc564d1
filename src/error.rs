// Renderer error taxonomy
//
// Each variant names the lifecycle stage that failed. Only presentation
// hiccups inside the frame loop are tolerated; every variant here is fatal
// when it reaches the top level.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Vulkan instance setup failed: {0}")]
    Init(String),

    #[error("No GPU with a graphics-capable queue family was found")]
    NoAdapter,

    #[error("Failed to create logical device: {0:?}")]
    DeviceCreation(vk::Result),

    #[error("Failed to create graphics pipeline: {0}")]
    PipelineCreation(String),

    #[error("Failed to allocate {what}: {reason}")]
    Allocation { what: &'static str, reason: String },

    #[error("Failed to record command buffer: {0:?}")]
    Recording(vk::Result),

    #[error("Failed to submit draw command buffer: {0:?}")]
    Submission(vk::Result),

    #[error("Failed to acquire swapchain image: {0:?}")]
    Presentation(vk::Result),

    #[error("Failed to load shader {path:?}: {reason}")]
    ShaderLoad { path: PathBuf, reason: String },

    #[error("Failed waiting on the in-flight fence: {0:?}")]
    FenceWait(vk::Result),

    #[error("Window error: {0}")]
    Window(String),
}

impl RendererError {
    pub fn allocation(what: &'static str, reason: impl ToString) -> Self {
        Self::Allocation {
            what,
            reason: reason.to_string(),
        }
    }

    pub fn shader_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ShaderLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Short name of the stage that failed, for the exit diagnostic.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Init(_) => "instance creation",
            Self::NoAdapter => "adapter selection",
            Self::DeviceCreation(_) => "logical device creation",
            Self::PipelineCreation(_) => "pipeline creation",
            Self::Allocation { .. } => "resource allocation",
            Self::Recording(_) => "command recording",
            Self::Submission(_) => "queue submission",
            Self::Presentation(_) => "image acquisition",
            Self::ShaderLoad { .. } => "shader loading",
            Self::FenceWait(_) => "fence wait",
            Self::Window(_) => "window system",
        }
    }
}

pub type RendererResult<T> = std::result::Result<T, RendererError>;
