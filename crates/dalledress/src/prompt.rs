//! The prompt template family.
//!
//! Five renderers — prompt, data, title, terse and author — compose the
//! dress vocabulary into text. Rendering is pure string substitution with
//! no I/O; the same dress always renders byte-identical output.

use crate::dress::DalleDress;

/// Renders the five prompt variants for a dress.
///
/// The four dress prompts are rendered eagerly on dress construction;
/// `author` renders just-in-time when enhancement runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptRenderer;

impl PromptRenderer {
    /// The main generation prompt.
    pub fn prompt(&self, dd: &DalleDress) -> String {
        let mut out = String::with_capacity(1024);
        out.push_str(&dd.lit_prompt(false));
        out.push_str("Here's the prompt:\n\n");
        out.push_str(&format!(
            "Draw a {} {} {} with human-like\ncharacteristics feeling {}{}.\n\n",
            dd.adverb(false),
            dd.adjective(false),
            dd.noun(true),
            dd.emotion(false),
            dd.occupation(false),
        ));
        out.push_str(&format!(
            "Noun: {} with human-like characteristics.\n",
            dd.noun(false)
        ));
        out.push_str(&format!("Emotion: {}.\n", dd.emotion(false)));
        out.push_str(&format!("Occupation: {}.\n", dd.occupation(false)));
        out.push_str(&format!("Action: {}.\n", dd.action(false)));
        out.push_str(&format!("Artistic style: {}.\n", dd.art_style(false, 1)));
        if dd.has_lit_style() {
            out.push_str(&format!("Literary Style: {}.\n", dd.lit_style(false)));
        }
        out.push_str(&format!(
            "Use only the colors {} and {}.\n",
            dd.color(true, 1),
            dd.color(true, 2)
        ));
        out.push_str(&format!("{}.\n", dd.orientation(false)));
        out.push_str(&format!("{}.\n\n", dd.back_style(false)));
        out.push_str(&format!(
            "Emphasize the emotional aspect of the image. Look deeply into and expand upon the\nmany connotative meanings of \"{},\" \"{},\" \"{}\",\nand \"{}.\" Find the representation that most closely matches all the data.\n\n",
            dd.noun(true),
            dd.emotion(true),
            dd.adjective(true),
            dd.adverb(true),
        ));
        out.push_str("Focus on the emotion, the noun, and the styles.");
        out
    }

    /// The tabular data dump: every attribute, short then full forms.
    pub fn data(&self, dd: &DalleDress) -> String {
        let mut out = String::with_capacity(1024);
        out.push('\n');
        out.push_str(&format!("Adverb:             {}\n", dd.adverb(true)));
        out.push_str(&format!("Adjective:          {}\n", dd.adjective(true)));
        out.push_str(&format!("Noun:               {}\n", dd.noun(true)));
        out.push_str(&format!("Emotion:            {}\n", dd.emotion(true)));
        out.push_str(&format!("Occupation:         {}\n", dd.occupation(true)));
        out.push_str(&format!("Action:             {}\n", dd.action(true)));
        out.push_str(&format!("ArtStyle 1:         {}\n", dd.art_style(true, 1)));
        out.push_str(&format!("ArtStyle 2:         {}\n", dd.art_style(true, 2)));
        if dd.has_lit_style() {
            out.push_str(&format!("LitStyle:           {}\n", dd.lit_style(false)));
        }
        out.push_str(&format!("Orientation:        {}\n", dd.orientation(true)));
        out.push_str(&format!("Gaze:               {}\n", dd.gaze(true)));
        out.push_str(&format!("BackStyle:          {}\n", dd.back_style(true)));
        out.push_str(&format!("Color 1:            {}\n", dd.color(false, 1)));
        out.push_str(&format!("Color 2:            {}\n", dd.color(false, 2)));
        out.push_str(&format!("Color 3:            {}\n", dd.color(false, 3)));
        out.push_str("------------------------------------------\n");
        out.push_str(&format!("Original:           {}\n", dd.original));
        out.push_str(&format!("Filename:           {}\n", dd.file_name));
        out.push_str(&format!("Seed:               {}\n", dd.seed));
        out.push_str(&format!("Adverb (full):      {}\n", dd.adverb(false)));
        out.push_str(&format!("Adjective (full):   {}\n", dd.adjective(false)));
        out.push_str(&format!("Noun (full):        {}\n", dd.noun(false)));
        out.push_str(&format!("Emotion (full):     {}\n", dd.emotion(false)));
        out.push_str(&format!("Occupation (full):  {}\n", dd.occupation(false)));
        out.push_str(&format!("Action (full):      {}\n", dd.action(false)));
        out.push_str(&format!("ArtStyle 1 (full):  {}\n", dd.art_style(false, 1)));
        out.push_str(&format!("ArtStyle 2 (full):  {}\n", dd.art_style(false, 2)));
        if dd.has_lit_style() {
            out.push_str(&format!("LitStyle (full):    {}\n", dd.lit_style(true)));
        }
        out.push_str(&format!("Orientation (full): {}\n", dd.orientation(false)));
        out.push_str(&format!("Gaze (full):        {}\n", dd.gaze(false)));
        out.push_str(&format!("BackStyle:          {}", dd.back_style(false)));
        out
    }

    /// A one-line summary suitable for captions.
    pub fn terse(&self, dd: &DalleDress) -> String {
        format!(
            "{} {} {} with human-like characteristics feeling {}{} in the style of {}",
            dd.adverb(false),
            dd.adjective(false),
            dd.noun(true),
            dd.emotion(false),
            dd.occupation(false),
            dd.art_style(true, 1)
        )
    }

    /// A compact title.
    pub fn title(&self, dd: &DalleDress) -> String {
        format!(
            "{} {} {} {} {}",
            dd.emotion(true),
            dd.adverb(true),
            dd.adjective(true),
            dd.occupation(true),
            dd.noun(true)
        )
    }

    /// The author persona used as the system message during enhancement.
    /// Empty without a literary style, which short-circuits enhancement.
    pub fn author(&self, dd: &DalleDress) -> String {
        if !dd.has_lit_style() {
            return String::new();
        }
        format!(
            "You are an award winning author who writes in the literary\nstyle called {}. Take on the persona of such an author.\n{} is a genre or literary style that {}.",
            dd.lit_style(true),
            dd.lit_style(true),
            dd.lit_style_descr()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attribute;

    fn full_dress() -> DalleDress {
        let mut dress = DalleDress {
            original: "0xabc".into(),
            file_name: "0xabc".into(),
            seed: "feed".into(),
            ..Default::default()
        };
        let slots = [
            ("adverb", "boldly,in a brave manner"),
            ("adjective", "lucid,clear and bright"),
            ("noun", "fox,animal,a small wild canine"),
            ("emotion", "joy,great pleasure,positive,high,elation"),
            ("occupation", "gardener,tends growing things"),
            ("action", "leaping,jumping with force"),
            ("artStyle1", "impressionism,1870s,impressionism loose brushwork"),
            ("artStyle2", "cubism,1910s,cubism fractured geometry"),
            ("litStyle", "haiku,haiku compresses a moment into three lines"),
            ("color1", "crimson,deep red"),
            ("color2", "cobalt,rich blue"),
            ("color3", "teal,sea green"),
            ("orientation", "upright,centered"),
            ("gaze", "forward,direct"),
            ("backStyle", "a wash of [{Color3}] drawn as [{ArtStyle2}]"),
        ];
        for (name, value) in slots {
            dress.attrib_map.insert(
                name.to_string(),
                Attribute {
                    database: String::new(),
                    name: name.to_string(),
                    bytes: String::new(),
                    number: 0,
                    factor: 0.0,
                    count: 1,
                    selector: 0,
                    value: value.to_string(),
                },
            );
        }
        dress
    }

    #[test]
    fn rendering_is_deterministic() {
        let dress = full_dress();
        let renderer = PromptRenderer;
        assert_eq!(renderer.prompt(&dress), renderer.prompt(&dress));
        assert_eq!(renderer.data(&dress), renderer.data(&dress));
        assert_eq!(renderer.terse(&dress), renderer.terse(&dress));
        assert_eq!(renderer.title(&dress), renderer.title(&dress));
        assert_eq!(renderer.author(&dress), renderer.author(&dress));
    }

    #[test]
    fn prompt_weaves_the_vocabulary() {
        let dress = full_dress();
        let prompt = PromptRenderer.prompt(&dress);
        assert!(prompt.starts_with("Please give me a detailed rewrite"));
        assert!(prompt.contains("Draw a boldly (in a brave manner) lucid (clear and bright) fox"));
        assert!(prompt.contains("Use only the colors deep red and rich blue."));
        assert!(prompt.contains("Orient the scene upright and centered"));
        assert!(prompt.contains("sea green"));
        assert!(prompt.ends_with("Focus on the emotion, the noun, and the styles."));
    }

    #[test]
    fn terse_and_title_are_single_line() {
        let dress = full_dress();
        let terse = PromptRenderer.terse(&dress);
        let title = PromptRenderer.title(&dress);
        assert!(!terse.contains('\n'));
        assert!(!title.contains('\n'));
        assert!(terse.contains("in the style of impressionism"));
        assert_eq!(title, "joy boldly lucid gardener fox");
    }

    #[test]
    fn author_requires_a_literary_style() {
        let mut dress = full_dress();
        let persona = PromptRenderer.author(&dress);
        assert!(persona.contains("award winning author"));
        assert!(persona.contains("haiku"));

        dress
            .attrib_map
            .get_mut("litStyle")
            .unwrap()
            .value = "none".to_string();
        assert_eq!(PromptRenderer.author(&dress), "");
    }

    #[test]
    fn lit_style_sections_are_conditional() {
        let mut dress = full_dress();
        assert!(PromptRenderer.prompt(&dress).contains("Literary Style: haiku"));
        dress
            .attrib_map
            .get_mut("litStyle")
            .unwrap()
            .value = "none".to_string();
        let prompt = PromptRenderer.prompt(&dress);
        assert!(prompt.starts_with("Here's the prompt:"));
        assert!(!prompt.contains("Literary Style:"));
    }
}
