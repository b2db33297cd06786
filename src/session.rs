use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::llm::{ImageArtifact, ImageGenerationError};
use crate::mask::{MaskSurface, Point, PointerKind};
use crate::persona::{AspectRatio, PersonaAttributes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditTab {
    #[default]
    Inpaint,
    NewScene,
    AddText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Mode {
    Creating,
    Editing { tab: EditTab },
}

/// Text the user typed for the edit panels. Kept on failure so they can retry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditInputs {
    pub inpaint_prompt: String,
    pub scene_prompt: String,
    pub scene_aspect_ratio: Option<AspectRatio>,
    pub overlay_text: String,
    pub overlay_language: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditRequest {
    Inpaint { prompt: String, mask_png: Vec<u8> },
    NewScene { prompt: String, aspect_ratio: AspectRatio },
    AddText { text: String, language: String },
}

/// Owned snapshot of everything a remote call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Generate(PersonaAttributes),
    Edit {
        request: EditRequest,
        image: ImageArtifact,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Generate(_) => "generate",
            Operation::Edit { request, .. } => match request {
                EditRequest::Inpaint { .. } => "inpaint",
                EditRequest::NewScene { .. } => "regenerate_scene",
                EditRequest::AddText { .. } => "add_text",
            },
        }
    }

    fn failure_label(&self) -> &'static str {
        match self {
            Operation::Generate(_) => "generate the image",
            Operation::Edit { request, .. } => match request {
                EditRequest::Inpaint { .. } => "apply the edit",
                EditRequest::NewScene { .. } => "create the new scene",
                EditRequest::AddText { .. } => "add the text",
            },
        }
    }
}

/// Ticket for the single operation allowed in flight.
#[derive(Debug)]
pub struct PendingOperation {
    epoch: u64,
    pub operation: Operation,
}

impl PendingOperation {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    Failed,
    /// The session was started over while the call was in flight.
    Discarded,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Another request is still running")]
    Busy,
    #[error("Not available {0}")]
    WrongMode(&'static str),
    #[error("There is no image to edit yet")]
    NoImage,
    #[error("{0}")]
    InvalidInput(String),
    #[error("Failed to encode the mask: {0}")]
    Mask(#[from] image::ImageError),
}

#[derive(Debug, Clone)]
pub struct SessionState {
    mode: Mode,
    is_loading: bool,
    error: Option<String>,
    current_image: Option<ImageArtifact>,
    attributes: PersonaAttributes,
    edit_inputs: EditInputs,
    mask: MaskSurface,
    epoch: u64,
}

impl SessionState {
    pub fn new(brush_width: f32) -> Self {
        Self {
            mode: Mode::Creating,
            is_loading: false,
            error: None,
            current_image: None,
            attributes: PersonaAttributes::default(),
            edit_inputs: EditInputs::default(),
            mask: MaskSurface::new(brush_width),
            epoch: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn current_image(&self) -> Option<&ImageArtifact> {
        self.current_image.as_ref()
    }

    pub fn attributes(&self) -> &PersonaAttributes {
        &self.attributes
    }

    pub fn edit_inputs(&self) -> &EditInputs {
        &self.edit_inputs
    }

    pub fn mask(&self) -> &MaskSurface {
        &self.mask
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.is_loading {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    fn ensure_editing(&self) -> Result<&ImageArtifact, SessionError> {
        if self.mode == Mode::Creating {
            return Err(SessionError::WrongMode("before an image has been generated"));
        }
        self.current_image.as_ref().ok_or(SessionError::NoImage)
    }

    pub fn update_attributes(&mut self, attributes: PersonaAttributes) -> Result<(), SessionError> {
        self.ensure_idle()?;
        if self.mode != Mode::Creating {
            return Err(SessionError::WrongMode("while editing"));
        }
        self.attributes = attributes;
        Ok(())
    }

    pub fn reset_attributes(&mut self) -> Result<(), SessionError> {
        self.update_attributes(PersonaAttributes::default())
    }

    pub fn select_tab(&mut self, tab: EditTab) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.ensure_editing()?;
        self.mode = Mode::Editing { tab };
        Ok(())
    }

    pub fn resize_mask(&mut self, width: u32, height: u32) {
        if self.mask.resize(width, height) {
            debug!("Mask resized to {}x{}", self.mask.width(), self.mask.height());
        }
    }

    pub fn mask_pointer(&mut self, kind: PointerKind, at: Point) -> Result<(), SessionError> {
        self.ensure_editing()?;
        self.mask.pointer(kind, at);
        Ok(())
    }

    pub fn draw_mask_stroke(&mut self, points: &[Point]) -> Result<(), SessionError> {
        self.ensure_editing()?;
        self.mask.draw_stroke(points);
        Ok(())
    }

    pub fn clear_mask(&mut self) {
        self.mask.clear();
    }

    pub fn set_brush_width(&mut self, width: f32) {
        self.mask.set_brush_width(width);
    }

    fn start(&mut self, operation: Operation) -> PendingOperation {
        self.is_loading = true;
        self.error = None;
        info!(operation = operation.name(), epoch = self.epoch, "Operation started");
        PendingOperation {
            epoch: self.epoch,
            operation,
        }
    }

    pub fn begin_generate(&mut self) -> Result<PendingOperation, SessionError> {
        self.ensure_idle()?;
        if self.mode != Mode::Creating {
            return Err(SessionError::WrongMode("while editing; start over first"));
        }
        if !self.attributes.has_description() {
            return Err(SessionError::InvalidInput(
                "Describe the influencer first".to_string(),
            ));
        }
        let attributes = self.attributes.clone();
        Ok(self.start(Operation::Generate(attributes)))
    }

    pub fn begin_inpaint(&mut self, prompt: &str) -> Result<PendingOperation, SessionError> {
        self.ensure_idle()?;
        let image = self.ensure_editing()?.clone();
        self.edit_inputs.inpaint_prompt = prompt.to_string();
        if prompt.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "Describe what should change in the marked area".to_string(),
            ));
        }
        if self.mask.is_empty() {
            return Err(SessionError::InvalidInput(
                "Paint over the area you want to change first".to_string(),
            ));
        }
        // The provider reads the mask in image pixels, not rendered pixels.
        let mask_png = match image.dimensions() {
            Some((width, height)) => self.mask.to_png_scaled(width, height)?,
            None => self.mask.to_png()?,
        };
        Ok(self.start(Operation::Edit {
            request: EditRequest::Inpaint {
                prompt: prompt.trim().to_string(),
                mask_png,
            },
            image,
        }))
    }

    pub fn begin_new_scene(
        &mut self,
        prompt: &str,
        aspect_ratio: Option<AspectRatio>,
    ) -> Result<PendingOperation, SessionError> {
        self.ensure_idle()?;
        let image = self.ensure_editing()?.clone();
        self.edit_inputs.scene_prompt = prompt.to_string();
        self.edit_inputs.scene_aspect_ratio = aspect_ratio;
        if prompt.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "Describe the new scene first".to_string(),
            ));
        }
        let aspect_ratio = aspect_ratio.unwrap_or(self.attributes.aspect_ratio);
        Ok(self.start(Operation::Edit {
            request: EditRequest::NewScene {
                prompt: prompt.trim().to_string(),
                aspect_ratio,
            },
            image,
        }))
    }

    /// `language` is what the user typed; `resolved_language` is what gets sent.
    pub fn begin_add_text(
        &mut self,
        text: &str,
        language: &str,
        resolved_language: &str,
    ) -> Result<PendingOperation, SessionError> {
        self.ensure_idle()?;
        let image = self.ensure_editing()?.clone();
        self.edit_inputs.overlay_text = text.to_string();
        self.edit_inputs.overlay_language = language.to_string();
        if text.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "Enter the text to add first".to_string(),
            ));
        }
        Ok(self.start(Operation::Edit {
            request: EditRequest::AddText {
                text: text.trim().to_string(),
                language: resolved_language.trim().to_string(),
            },
            image,
        }))
    }

    /// Applies the outcome of a remote call. Runs on success and failure alike.
    pub fn complete(
        &mut self,
        pending: PendingOperation,
        result: Result<ImageArtifact, ImageGenerationError>,
    ) -> Completion {
        let name = pending.operation.name();
        if pending.epoch != self.epoch {
            info!(
                operation = name,
                "Discarding result of an operation started before start-over"
            );
            return Completion::Discarded;
        }
        self.is_loading = false;

        let image = match result {
            Ok(image) => image,
            Err(err) => {
                warn!(operation = name, "Operation failed: {}", err.0);
                self.error = Some(format!(
                    "Failed to {}: {}",
                    pending.operation.failure_label(),
                    err.0
                ));
                return Completion::Failed;
            }
        };

        match &pending.operation {
            Operation::Generate(_) => {
                self.mode = Mode::Editing {
                    tab: EditTab::default(),
                };
            }
            Operation::Edit { request, .. } => match request {
                EditRequest::Inpaint { .. } => self.edit_inputs.inpaint_prompt.clear(),
                EditRequest::NewScene { .. } => {
                    self.edit_inputs.scene_prompt.clear();
                    self.edit_inputs.scene_aspect_ratio = None;
                }
                EditRequest::AddText { .. } => {
                    self.edit_inputs.overlay_text.clear();
                    self.edit_inputs.overlay_language.clear();
                }
            },
        }

        // A mask only means something over the image it was drawn on.
        self.mask.clear();
        self.current_image = Some(image);
        self.error = None;
        info!(operation = name, "Operation applied");
        Completion::Applied
    }

    /// Releases the in-flight slot when an operation ended without a result.
    pub fn abandon(&mut self, epoch: u64, message: String) -> Completion {
        if epoch != self.epoch {
            return Completion::Discarded;
        }
        self.is_loading = false;
        self.error = Some(message);
        Completion::Failed
    }

    /// Back to persona creation; the persona fields survive.
    pub fn start_over(&mut self) {
        if self.is_loading {
            info!("Start over while a request is in flight; its result will be ignored");
        }
        self.epoch = self.epoch.wrapping_add(1);
        self.mode = Mode::Creating;
        self.is_loading = false;
        self.error = None;
        self.current_image = None;
        self.edit_inputs = EditInputs::default();
        self.mask.clear();
    }
}
