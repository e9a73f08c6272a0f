//! The generated artifact bundle and its attribute vocabulary.
//!
//! A `DalleDress` carries the derived attributes, the rendered prompt
//! family and the output bookkeeping for one address within one series.
//! The accessor methods are the vocabulary the prompt renderers compose;
//! each has a short form (bare token) and a long form (token plus its
//! database detail).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attribute::Attribute;

/// One dress: attributes, prompts and artifact paths for an address.
///
/// The JSON field names are the wire contract; `attribMap` is a runtime
/// index only and never serialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DalleDress {
    pub original: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub seed: String,
    pub prompt: String,
    #[serde(rename = "dataPrompt")]
    pub data_prompt: String,
    #[serde(rename = "titlePrompt")]
    pub title_prompt: String,
    #[serde(rename = "tersePrompt")]
    pub terse_prompt: String,
    #[serde(rename = "enhancedPrompt")]
    pub enhanced_prompt: String,
    #[serde(rename = "attributes")]
    pub attribs: Vec<Attribute>,
    #[serde(skip)]
    pub attrib_map: HashMap<String, Attribute>,
    #[serde(rename = "seedChunks")]
    pub seed_chunks: Vec<String>,
    #[serde(rename = "selectedTokens")]
    pub selected_tokens: Vec<String>,
    #[serde(rename = "selectedRecords")]
    pub selected_records: Vec<String>,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    #[serde(rename = "generatedPath")]
    pub generated_path: String,
    #[serde(rename = "annotatedPath")]
    pub annotated_path: String,
    #[serde(rename = "downloadMode")]
    pub download_mode: String,
    #[serde(rename = "ipfsHash")]
    pub ipfs_hash: String,
    #[serde(rename = "cacheHit")]
    pub cache_hit: bool,
    pub completed: bool,
    pub series: String,
}

impl DalleDress {
    /// Pretty JSON rendition, used for the selector dump.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    fn value(&self, name: &str) -> &str {
        self.attrib_map.get(name).map(|a| a.value.as_str()).unwrap_or("")
    }

    fn parts(&self, name: &str) -> Vec<&str> {
        self.value(name).split(',').collect()
    }

    pub fn adverb(&self, short: bool) -> String {
        let parts = self.parts("adverb");
        pair(&parts, short)
    }

    pub fn adjective(&self, short: bool) -> String {
        let parts = self.parts("adjective");
        pair(&parts, short)
    }

    pub fn noun(&self, short: bool) -> String {
        let parts = self.parts("noun");
        if short || parts.len() < 3 {
            parts[0].to_string()
        } else {
            format!("{} ({}, {})", parts[0], parts[1], parts[2])
        }
    }

    pub fn emotion(&self, short: bool) -> String {
        let parts = self.parts("emotion");
        if short || parts.len() < 5 {
            parts[0].to_string()
        } else {
            format!("{} ({}, {})", parts[0], parts[1], parts[4])
        }
    }

    /// Empty when the slot filtered down to `none`; the long form reads
    /// as a clause so it can follow the emotion directly.
    pub fn occupation(&self, short: bool) -> String {
        let parts = self.parts("occupation");
        if parts[0] == "none" {
            return String::new();
        }
        if short || parts.len() < 2 {
            parts[0].to_string()
        } else {
            format!(" who works as a {} ({})", parts[0], parts[1])
        }
    }

    pub fn action(&self, short: bool) -> String {
        let parts = self.parts("action");
        pair(&parts, short)
    }

    pub fn art_style(&self, short: bool, which: usize) -> String {
        let parts = self.parts(&format!("artStyle{which}"));
        if short || parts.len() < 3 {
            parts[0].to_string()
        } else {
            format!("{} ({})", parts[0], strip_leading(parts[2], parts[0]))
        }
    }

    pub fn has_lit_style(&self) -> bool {
        let val = self.value("litStyle");
        val != "none" && !val.is_empty()
    }

    pub fn lit_style(&self, short: bool) -> String {
        let parts = self.parts("litStyle");
        if parts[0] == "none" {
            return String::new();
        }
        if short || parts.len() < 2 {
            parts[0].to_string()
        } else {
            format!("{} ({})", parts[0], strip_leading(parts[1], parts[0]))
        }
    }

    pub fn lit_style_descr(&self) -> String {
        let parts = self.parts("litStyle");
        if parts[0] == "none" || parts.len() < 2 {
            return String::new();
        }
        strip_leading(parts[1], parts[0]).to_string()
    }

    /// Colors read from the second field: the first is the lookup key.
    pub fn color(&self, short: bool, which: usize) -> String {
        let parts = self.parts(&format!("color{which}"));
        if parts.len() < 2 {
            return parts[0].to_string();
        }
        if short {
            parts[1].to_string()
        } else {
            format!("{} ({})", parts[1], parts[0])
        }
    }

    pub fn orientation(&self, short: bool) -> String {
        let val = self.value("orientation");
        if short {
            return val.split(',').next().unwrap_or("").to_string();
        }
        format!(
            "Orient the scene {} and make sure the {} is facing {}",
            val.replace(',', " and "),
            self.noun(true),
            self.gaze(true)
        )
    }

    pub fn gaze(&self, short: bool) -> String {
        let val = self.value("gaze");
        if short {
            val.split(',').next().unwrap_or("").to_string()
        } else {
            val.replace(',', ", ")
        }
    }

    /// The back style text with its color and art-style references
    /// substituted in place.
    pub fn back_style(&self, _short: bool) -> String {
        self.value("backStyle")
            .replace("[{Color3}]", &self.color(true, 3))
            .replace("[{ArtStyle2}]", &self.art_style(false, 2))
    }

    /// Literary rewrite preamble, empty without a literary style.
    pub fn lit_prompt(&self, short: bool) -> String {
        if !self.has_lit_style() {
            return String::new();
        }
        format!(
            "Please give me a detailed rewrite of the following prompt in the literary style {}. Be imaginative, creative, and complete.\n",
            self.lit_style(short)
        )
    }
}

fn pair(parts: &[&str], short: bool) -> String {
    if short || parts.len() < 2 {
        parts[0].to_string()
    } else {
        format!("{} ({})", parts[0], parts[1])
    }
}

fn strip_leading<'a>(detail: &'a str, name: &str) -> &'a str {
    detail.strip_prefix(&format!("{name} ")).unwrap_or(detail)
}

/// A filename-safe rendition of the input: reserved characters become
/// underscores and runs of underscores collapse.
pub fn valid_filename(input: &str) -> String {
    let mut out: String = input
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    while out.contains("__") {
        out = out.replace("__", "_");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dress_with(name: &str, value: &str) -> DalleDress {
        let mut dress = DalleDress::default();
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
        dress
    }

    #[test]
    fn filename_replaces_reserved_characters() {
        let name = valid_filename("0x12:34/56*78?9\"a<b>c|d\\e");
        for forbidden in ['/', '\\', ':', '*', '?', '"', '<', '>', '|'] {
            assert!(!name.contains(forbidden));
        }
        assert!(!name.contains("__"));
    }

    #[test]
    fn filename_collapses_underscore_runs() {
        assert_eq!(valid_filename("a::*b"), "a_b");
        assert_eq!(valid_filename("  plain  "), "plain");
    }

    #[test]
    fn short_and_long_forms() {
        let dress = dress_with("adverb", "boldly,in a brave manner");
        assert_eq!(dress.adverb(true), "boldly");
        assert_eq!(dress.adverb(false), "boldly (in a brave manner)");

        let dress = dress_with("noun", "cat,animal,a small domestic feline");
        assert_eq!(dress.noun(true), "cat");
        assert_eq!(dress.noun(false), "cat (animal, a small domestic feline)");

        let dress = dress_with("color1", "crimson,deep red");
        assert_eq!(dress.color(true, 1), "deep red");
        assert_eq!(dress.color(false, 1), "deep red (crimson)");
    }

    #[test]
    fn none_values_render_empty() {
        let dress = dress_with("occupation", "none");
        assert_eq!(dress.occupation(false), "");

        let dress = dress_with("litStyle", "none");
        assert!(!dress.has_lit_style());
        assert_eq!(dress.lit_style(false), "");
        assert_eq!(dress.lit_prompt(false), "");
    }

    #[test]
    fn art_style_strips_redundant_name_prefix() {
        let dress = dress_with(
            "artStyle1",
            "impressionism,1870s,impressionism loose brushwork and vivid light",
        );
        assert_eq!(
            dress.art_style(false, 1),
            "impressionism (loose brushwork and vivid light)"
        );
    }

    #[test]
    fn back_style_substitutes_references() {
        let mut dress = dress_with(
            "backStyle",
            "a wash of [{Color3}] behind the subject drawn as [{ArtStyle2}]",
        );
        dress.attrib_map.insert(
            "color3".to_string(),
            Attribute {
                database: String::new(),
                name: "color3".to_string(),
                bytes: String::new(),
                number: 0,
                factor: 0.0,
                count: 1,
                selector: 0,
                value: "teal,sea green".to_string(),
            },
        );
        dress.attrib_map.insert(
            "artStyle2".to_string(),
            Attribute {
                database: String::new(),
                name: "artStyle2".to_string(),
                bytes: String::new(),
                number: 0,
                factor: 0.0,
                count: 1,
                selector: 0,
                value: "cubism,1910s,cubism fractured geometry".to_string(),
            },
        );
        let rendered = dress.back_style(false);
        assert!(rendered.contains("sea green"));
        assert!(rendered.contains("cubism (fractured geometry)"));
        assert!(!rendered.contains("[{"));
    }

    #[test]
    fn wire_names_are_exact() {
        let dress = DalleDress {
            original: "0xabc".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&dress).unwrap();
        let obj = json.as_object().unwrap();
        for key in [
            "original",
            "fileName",
            "seed",
            "prompt",
            "dataPrompt",
            "titlePrompt",
            "tersePrompt",
            "enhancedPrompt",
            "attributes",
            "seedChunks",
            "selectedTokens",
            "selectedRecords",
            "imageUrl",
            "generatedPath",
            "annotatedPath",
            "downloadMode",
            "ipfsHash",
            "cacheHit",
            "completed",
            "series",
        ] {
            assert!(obj.contains_key(key), "missing wire key {key}");
        }
        assert!(!obj.contains_key("filename"));
        assert!(!obj.contains_key("imageURL"));
        assert!(!obj.contains_key("attribMap"));
    }
}
