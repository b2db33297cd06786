use parking_lot::Mutex;
use serde::Serialize;

use crate::llm::ImageArtifact;
use crate::mask::MaskSurface;
use crate::persona::{AspectRatio, PersonaAttributes};
use crate::session::{EditInputs, EditTab, Mode, SessionState};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageView {
    pub data_uri: String,
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskView {
    pub width: u32,
    pub height: u32,
    pub brush_width: f32,
    pub strokes: usize,
    pub drawing: bool,
    pub empty: bool,
}

impl From<&MaskSurface> for MaskView {
    fn from(mask: &MaskSurface) -> Self {
        MaskView {
            width: mask.width(),
            height: mask.height(),
            brush_width: mask.brush_width(),
            strokes: mask.stroke_count(),
            drawing: mask.is_drawing(),
            empty: mask.is_empty(),
        }
    }
}

/// Everything the page renders, derived from the session on each request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub mode: Mode,
    pub edit_tab: Option<EditTab>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub image: Option<ImageView>,
    pub attributes: PersonaAttributes,
    pub aspect_ratios: Vec<AspectRatio>,
    pub edit_inputs: EditInputs,
    pub mask: MaskView,
    pub can_generate: bool,
    pub can_submit_edit: bool,
}

impl From<&ImageArtifact> for ImageView {
    fn from(artifact: &ImageArtifact) -> Self {
        let dimensions = artifact.dimensions();
        ImageView {
            data_uri: artifact.data_uri(),
            mime_type: artifact.mime_type.clone(),
            width: dimensions.map(|(width, _)| width),
            height: dimensions.map(|(_, height)| height),
        }
    }
}

impl SessionView {
    /// Copies the session under the lock, then encodes the image after
    /// releasing it.
    pub fn capture(session: &Mutex<SessionState>) -> Self {
        let (mut view, image) = {
            let state = session.lock();
            (Self::without_image(&state), state.current_image().cloned())
        };
        view.image = image.as_ref().map(ImageView::from);
        view
    }

    fn without_image(state: &SessionState) -> Self {
        let mode = state.mode();
        let edit_tab = match mode {
            Mode::Creating => None,
            Mode::Editing { tab } => Some(tab),
        };
        let idle = !state.is_loading();
        let has_image = state.current_image().is_some();

        SessionView {
            mode,
            edit_tab,
            is_loading: state.is_loading(),
            error: state.error().map(|value| value.to_string()),
            image: None,
            attributes: state.attributes().clone(),
            aspect_ratios: AspectRatio::ALL.to_vec(),
            edit_inputs: state.edit_inputs().clone(),
            mask: MaskView::from(state.mask()),
            can_generate: idle && mode == Mode::Creating && state.attributes().has_description(),
            can_submit_edit: idle && has_image && edit_tab.is_some(),
        }
    }
}

impl From<&SessionState> for SessionView {
    fn from(state: &SessionState) -> Self {
        let mut view = Self::without_image(state);
        view.image = state.current_image().map(ImageView::from);
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::media::sample_jpeg;

    #[test]
    fn fresh_session_view() {
        let state = SessionState::new(12.0);
        let view = SessionView::from(&state);
        assert_eq!(view.mode, Mode::Creating);
        assert!(view.edit_tab.is_none());
        assert!(view.image.is_none());
        assert!(!view.can_generate);
        assert!(!view.can_submit_edit);
        assert_eq!(view.mask.brush_width, 12.0);
        assert_eq!(view.aspect_ratios.len(), 5);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["mode"]["kind"], "creating");
        assert_eq!(json["attributes"]["aspectRatio"], "1:1");
        assert_eq!(json["isLoading"], false);
    }

    #[test]
    fn generate_enabled_once_described() {
        let mut state = SessionState::new(12.0);
        state
            .update_attributes(PersonaAttributes {
                description: "Chef".to_string(),
                ..PersonaAttributes::default()
            })
            .unwrap();
        assert!(SessionView::from(&state).can_generate);

        let _pending = state.begin_generate().unwrap();
        let view = SessionView::from(&state);
        assert!(view.is_loading);
        assert!(!view.can_generate);
    }

    #[test]
    fn captured_view_matches_direct_view() {
        let mut state = SessionState::new(12.0);
        state
            .update_attributes(PersonaAttributes {
                description: "Surfer".to_string(),
                ..PersonaAttributes::default()
            })
            .unwrap();
        let pending = state.begin_generate().unwrap();
        state.complete(pending, Ok(ImageArtifact::new(sample_jpeg(6, 4), None)));

        let direct = serde_json::to_value(SessionView::from(&state)).unwrap();
        let session = Mutex::new(state);
        let captured = SessionView::capture(&session);
        assert!(captured.can_submit_edit);
        let image = captured.image.as_ref().unwrap();
        assert_eq!((image.width, image.height), (Some(6), Some(4)));
        assert_eq!(serde_json::to_value(&captured).unwrap(), direct);
    }
}
