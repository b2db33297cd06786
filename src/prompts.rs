use crate::persona::PersonaAttributes;

const PHOTO_SUFFIX: &str = "Photorealistic, high detail, natural skin texture, soft natural lighting, \
     shot on a professional full-frame camera, sharp focus, social media ready.";

const INPAINT_SUFFIX: &str = "Only change the marked area. Blend the edit seamlessly with the rest of \
     the photo, matching lighting, perspective, color grading and photographic style.";

const SCENE_PREFIX: &str = "Create a new photo of the exact same person shown in the reference image.";

const SCENE_SUFFIX: &str = "Keep the face, hairstyle, skin tone and body proportions identical so the \
     character is clearly recognizable. Photorealistic, consistent identity, high detail.";

const TEXT_SUFFIX: &str = "Render the lettering crisp, correctly spelled and clearly legible, \
     integrated naturally into the scene. Keep everything else in the photo unchanged.";

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn sentence(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.ends_with(['.', '!', '?']) {
        trimmed.to_string()
    } else {
        format!("{trimmed}.")
    }
}

pub fn compose_persona_prompt(attributes: &PersonaAttributes) -> String {
    let mut subject = String::from("A portrait photo of a");
    if let Some(ethnicity) = non_empty(&attributes.ethnicity) {
        subject.push(' ');
        subject.push_str(ethnicity);
    }
    subject.push_str(" social media influencer");
    if let Some(age) = non_empty(&attributes.age) {
        subject.push_str(&format!(", around {age} years old"));
    }
    subject.push('.');

    let mut parts = vec![subject];
    if let Some(description) = non_empty(&attributes.description) {
        parts.push(sentence(description));
    }
    if let Some(style) = non_empty(&attributes.style) {
        parts.push(format!("Style: {style}."));
    }
    if let Some(color) = non_empty(&attributes.dominant_color) {
        parts.push(format!("The dominant color of the image is {color}."));
    }
    parts.push(PHOTO_SUFFIX.to_string());
    parts.join(" ")
}

pub fn compose_inpaint_prompt(edit: &str) -> String {
    match non_empty(edit) {
        Some(edit) => format!("{} {INPAINT_SUFFIX}", sentence(edit)),
        None => INPAINT_SUFFIX.to_string(),
    }
}

pub fn compose_scene_prompt(scene: &str) -> String {
    match non_empty(scene) {
        Some(scene) => format!("{SCENE_PREFIX} New scene: {} {SCENE_SUFFIX}", sentence(scene)),
        None => format!("{SCENE_PREFIX} {SCENE_SUFFIX}"),
    }
}

pub fn compose_text_overlay_prompt(text: &str, language: &str) -> String {
    let quoted = text.trim().replace('"', "'");
    match non_empty(language) {
        Some(language) => format!(
            "Add the text \"{quoted}\" to this image, written in {language}. {TEXT_SUFFIX}"
        ),
        None => format!("Add the text \"{quoted}\" to this image. {TEXT_SUFFIX}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::AspectRatio;

    fn attributes() -> PersonaAttributes {
        PersonaAttributes {
            description: "D".to_string(),
            aspect_ratio: AspectRatio::Square,
            style: "Anime".to_string(),
            age: String::new(),
            dominant_color: String::new(),
            ethnicity: "Asian".to_string(),
        }
    }

    #[test]
    fn persona_prompt_omits_empty_age_and_color() {
        let prompt = compose_persona_prompt(&attributes());
        assert!(prompt.contains("Anime"));
        assert!(prompt.contains("Asian"));
        assert!(prompt.contains("D."));
        assert!(!prompt.contains("years old"));
        assert!(!prompt.contains("dominant color"));
    }

    #[test]
    fn persona_prompt_includes_age_and_color_when_set() {
        let mut attrs = attributes();
        attrs.age = "25".to_string();
        attrs.dominant_color = "teal".to_string();
        let prompt = compose_persona_prompt(&attrs);
        assert!(prompt.contains("around 25 years old"));
        assert!(prompt.contains("dominant color of the image is teal"));
    }

    #[test]
    fn persona_prompt_keeps_description_verbatim() {
        let mut attrs = attributes();
        attrs.description = "Surfer with freckles, holding a coffee cup!".to_string();
        attrs.ethnicity = "   ".to_string();
        let prompt = compose_persona_prompt(&attrs);
        assert!(prompt.contains("Surfer with freckles, holding a coffee cup!"));
        assert!(prompt.starts_with("A portrait photo of a social media influencer."));
    }

    #[test]
    fn edit_prompts_wrap_user_content() {
        assert!(compose_inpaint_prompt("add sunglasses").starts_with("add sunglasses. Only change"));
        let scene = compose_scene_prompt("on a beach at sunset");
        assert!(scene.contains("New scene: on a beach at sunset."));
        assert!(scene.contains("clearly recognizable"));
    }

    #[test]
    fn text_overlay_prompt_quotes_text_and_names_language() {
        let prompt = compose_text_overlay_prompt("Hola \"mundo\"", "Spanish");
        assert!(prompt.contains("\"Hola 'mundo'\""));
        assert!(prompt.contains("written in Spanish"));
        assert!(!compose_text_overlay_prompt("Hi", "").contains("written in"));
    }
}
