use std::{collections::BTreeMap, fs, path::Path};

use color_eyre::{Result, eyre::WrapErr as _};
use log::{debug, info};
use nonempty::{NonEmpty, nonempty};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ANIMATION_TYPE: &str = "dancing";

pub const DEFAULT_MOTION_DESCRIPTORS: &str = "smooth,fluid,continuous,seamless,rhythmic";
pub const DEFAULT_CAMERA_STABILITY: &str =
    "static,no_movement,fixed_composition,stable_framing";
pub const DEFAULT_DANCE_QUALITY: &str =
    "professional_choreography,human_like_gestures,anthropomorphic_behavior";
pub const DEFAULT_VISUAL_QUALITY: &str = "photorealistic,natural_lighting,cinematic_quality";
pub const DEFAULT_LIGHTING: &str = "natural_warm_professional_food_photography_cinematic";
pub const DEFAULT_STYLE: &str = "realistic_photography_natural_lighting_photorealistic";

/// Number of motion descriptors / camera terms that must end up in every prompt
const REQUIRED_MOTION_TERMS: usize = 3;
const REQUIRED_CAMERA_TERMS: usize = 2;

/// Word lists substituted into prompt templates.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptors {
    pub motion: Vec<String>,
    pub camera_stability: Vec<String>,
    pub dance_quality: Vec<String>,
    pub visual_quality: Vec<String>,
    pub lighting: String,
    pub style: String,
}

impl Default for Descriptors {
    fn default() -> Self {
        Self {
            motion: split_list(DEFAULT_MOTION_DESCRIPTORS),
            camera_stability: split_list(DEFAULT_CAMERA_STABILITY),
            dance_quality: split_list(DEFAULT_DANCE_QUALITY),
            visual_quality: split_list(DEFAULT_VISUAL_QUALITY),
            lighting: DEFAULT_LIGHTING.into(),
            style: DEFAULT_STYLE.into(),
        }
    }
}

impl Descriptors {
    /// Expands a placeholder body like `motion:2` or `lighting`.
    fn expand(&self, key: &str) -> Option<String> {
        let (name, count) = match key.split_once(':') {
            Some((name, count)) => (name, Some(count.trim().parse::<usize>().ok()?)),
            None => (key, None),
        };
        let list = match name.trim() {
            "motion" => &self.motion,
            "camera" => &self.camera_stability,
            "dance" => &self.dance_quality,
            "visual" => &self.visual_quality,
            "lighting" if count.is_none() => return Some(humanize(&self.lighting)),
            "style" if count.is_none() => return Some(humanize(&self.style)),
            _ => return None,
        };
        let take = count.unwrap_or(list.len());
        Some(
            list.iter()
                .take(take)
                .map(|t| humanize(t))
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn humanize(term: &str) -> String {
    term.trim().replace('_', " ")
}

/// Substitutes `{name}` / `{name:N}` placeholders. Unknown ones are kept as they are.
pub fn render(template: &str, descriptors: &Descriptors) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let expansion = after
            .find('}')
            .and_then(|end| descriptors.expand(&after[..end]).map(|v| (end, v)));
        match expansion {
            Some((end, value)) => {
                out.push_str(&value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Prompt templates keyed by animation type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Templates(BTreeMap<String, NonEmpty<String>>);

impl Default for Templates {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert(
            "dancing".to_string(),
            nonempty![
                "Deuce the adorable Shih Tzu standing completely upright on hind legs like a human person, performing smooth fluid dancing with front paws moving exactly like human arms next to elegantly plated trending food on white ceramic plate. Continuous rhythmic human-like dance moves with professional choreography, seamless anthropomorphic behavior throughout, {motion:3}, {visual:2}, static camera".to_string(),
                "Deuce the tiny fluffy Shih Tzu dancing upright like a human next to fancy plated gourmet food, using front paws like human arms with {dance:2}, standing on hind legs throughout like a person, {motion:2} movements, anthropomorphic dancing behavior, {lighting}, static camera position".to_string(),
                "Deuce the cute Shih Tzu doing {dance:1} human-like dance moves while standing upright on back legs like a person around beautifully plated food, front paws moving like arms with {motion:2}, {style}, happy expressions, photorealistic".to_string(),
            ],
        );
        map.insert(
            "eating".to_string(),
            nonempty![
                "Deuce the Shih Tzu puppy naturally eating trending food from elegant plate, realistic chewing motions with {motion:2}, authentic pet behavior, food on whiskers and face, static camera, {visual:2}".to_string(),
                "Deuce the adorable Shih Tzu enjoying delicious meal with {motion:1} natural eating movements, realistic head positioning while eating, elegant food presentation, {lighting}".to_string(),
                "Deuce the tiny Shih Tzu messily eating from fancy white ceramic plate, authentic dog eating behavior with {motion:2}, realistic movements, food getting everywhere".to_string(),
            ],
        );
        map.insert(
            "emergence".to_string(),
            nonempty![
                "Deuce the adorable Shih Tzu naturally approaching delicious trending food from elegant white ceramic plate with {motion:2}, realistic curiosity movements, natural head movements, {visual:2}, static camera".to_string(),
                "Deuce the tiny fluffy Shih Tzu discovering gourmet meal on fancy plate, authentic pet excitement with {motion:1}, realistic tail wagging, {lighting}, static camera position".to_string(),
                "Deuce the cute Shih Tzu excitedly approaching beautifully plated food with {motion:2}, natural dog curiosity, realistic movements, {visual:2}".to_string(),
            ],
        );
        Templates(map)
    }
}

impl Templates {
    pub fn load_ron(path: &Path) -> Result<Self> {
        let src = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading templates from {}", path.display()))?;
        Ok(ron::from_str(&src)?)
    }

    /// Entries of `other` replace entries of `self` with the same key.
    pub fn merge(mut self, other: Templates) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Unknown animation types fall back to the default one.
    pub fn for_type(&self, animation_type: &str) -> Option<&NonEmpty<String>> {
        self.0
            .get(animation_type)
            .or_else(|| self.0.get(DEFAULT_ANIMATION_TYPE))
    }
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    animation_type: String,
    override_prompt: Option<String>,
    templates: Templates,
    descriptors: Descriptors,
}

impl PromptBuilder {
    pub fn new(
        animation_type: impl Into<String>,
        override_prompt: Option<String>,
        templates: Templates,
        descriptors: Descriptors,
    ) -> Self {
        Self {
            animation_type: animation_type.into(),
            override_prompt: override_prompt.filter(|p| !p.trim().is_empty()),
            templates,
            descriptors,
        }
    }

    pub fn animation_type(&self) -> &str {
        &self.animation_type
    }

    /// The configured override is returned as is; otherwise a random template
    /// for the animation type gets rendered and topped up with quality terms.
    pub fn build_prompt<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        if let Some(prompt) = &self.override_prompt {
            info!("Using the configured prompt override");
            return prompt.clone();
        }

        let base = match self.templates.for_type(&self.animation_type) {
            Some(templates) => {
                let idx = rng.gen_range(0..templates.len());
                let template = templates.get(idx).unwrap_or(templates.first());
                debug!("Picked template {idx} for {}", self.animation_type);
                render(template, &self.descriptors)
            }
            None => self.fallback_prompt(),
        };
        self.append_missing_quality_terms(base)
    }

    fn append_missing_quality_terms(&self, base: String) -> String {
        let lowered = base.to_lowercase();
        let mut missing: Vec<String> = vec![];
        let candidates = self
            .descriptors
            .motion
            .iter()
            .take(REQUIRED_MOTION_TERMS)
            .chain(
                self.descriptors
                    .camera_stability
                    .iter()
                    .take(REQUIRED_CAMERA_TERMS),
            );
        for term in candidates.map(|t| humanize(t)) {
            let needle = term.to_lowercase();
            if !needle.is_empty()
                && !lowered.contains(&needle)
                && !missing.iter().any(|m| m.to_lowercase() == needle)
            {
                missing.push(term);
            }
        }

        if missing.is_empty() {
            base
        } else {
            format!("{base}, {}", missing.join(", "))
        }
    }

    /// Still image prompt used as the first frame of an image-to-video job.
    pub fn base_image_prompt(&self) -> String {
        let template = if self.animation_type.contains("dancing") {
            "Deuce, a tiny fluffy Shih Tzu puppy with big expressive eyes, standing upright on hind legs like a human person next to an elegant white ceramic plate with beautifully presented gourmet trending food. Deuce appears ready to dance like a human with {dance:2}, front paws positioned like human arms, standing in anthropomorphic upright pose beside the fancy plated food. {lighting}, {visual:2}, shallow depth of field. The scene captures the moment before Deuce starts {motion:2} human-like dancing."
        } else if self.animation_type.contains("eating") {
            "Deuce, a tiny fluffy Shih Tzu puppy with big expressive eyes positioned close to an elegant white ceramic plate with beautifully presented gourmet trending food. Deuce's head is tilted toward the food, mouth slightly open near the dish, captured in natural pre-eating position with {motion:1}. {lighting}, {visual:2}, shallow depth of field."
        } else {
            "Deuce, a tiny fluffy Shih Tzu puppy with big expressive eyes near an elegant white ceramic plate with beautifully presented trending food. {lighting}, clean background, fancy plating, {visual:2}, high detail."
        };
        render(template, &self.descriptors)
    }

    /// Short prompt for the narrowed retry.
    pub fn fallback_prompt(&self) -> String {
        render(
            "Deuce the Shih Tzu dog dancing like a human upright, {motion:2}, realistic movement, static camera",
            &self.descriptors,
        )
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn builder(animation_type: &str, override_prompt: Option<&str>) -> PromptBuilder {
        PromptBuilder::new(
            animation_type,
            override_prompt.map(String::from),
            Templates::default(),
            Descriptors::default(),
        )
    }

    #[test]
    fn override_is_returned_literally() {
        let b = builder("dancing", Some("A cat in space"));
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(b.build_prompt(&mut rng), "A cat in space");
    }

    #[test]
    fn blank_override_is_ignored() {
        let b = builder("eating", Some("   "));
        let mut rng = StdRng::seed_from_u64(7);
        assert!(b.build_prompt(&mut rng).contains("eating"));
    }

    #[test]
    fn known_types_never_yield_empty_prompts() {
        for ty in ["dancing", "eating", "emergence", "no-such-type"] {
            let b = builder(ty, None);
            for seed in 0..20 {
                let mut rng = StdRng::seed_from_u64(seed);
                let prompt = b.build_prompt(&mut rng);
                assert!(!prompt.trim().is_empty(), "{ty} produced an empty prompt");
                assert!(!prompt.contains('{'), "unrendered placeholder in {prompt}");
            }
        }
    }

    #[test]
    fn unknown_type_uses_dancing_templates() {
        let b = builder("no-such-type", None);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(b.build_prompt(&mut rng).contains("danc"));
    }

    #[test]
    fn missing_quality_terms_are_appended_once() {
        let mut templates = BTreeMap::new();
        templates.insert("napping".to_string(), nonempty!["Deuce naps, SMOOTH".to_string()]);
        let b = PromptBuilder::new(
            "napping",
            None,
            Templates::default().merge(Templates(templates)),
            Descriptors::default(),
        );
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            b.build_prompt(&mut rng),
            "Deuce naps, SMOOTH, fluid, continuous, static, no movement"
        );
    }

    #[test]
    fn placeholders_are_rendered() {
        let d = Descriptors::default();
        assert_eq!(render("{motion:2}", &d), "smooth, fluid");
        assert_eq!(render("{dance:1} in {lighting}", &d), "professional choreography in natural warm professional food photography cinematic");
        assert_eq!(render("{unknown} {motion:x} {", &d), "{unknown} {motion:x} {");
        assert_eq!(render("{motion:0}|", &d), "|");
    }

    #[test]
    fn templates_load_from_ron() {
        let src = indoc::indoc! {r#"
            {
                "sleeping": ["Deuce sleeps {motion:1}"],
                "dancing": ["Deuce dances"],
            }
        "#};
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, src.as_bytes()).unwrap();

        let templates = Templates::default().merge(Templates::load_ron(file.path()).unwrap());
        assert_eq!(
            templates.for_type("sleeping").map(|t| t.first().as_str()),
            Some("Deuce sleeps {motion:1}")
        );
        assert_eq!(templates.for_type("dancing").map(|t| t.len()), Some(1));
        assert!(templates.for_type("eating").is_some());
    }

    #[test]
    fn base_image_prompt_follows_animation_type() {
        assert!(builder("dancing", None).base_image_prompt().contains("ready to dance"));
        assert!(builder("eating", None).base_image_prompt().contains("pre-eating"));
        assert!(builder("emergence", None).base_image_prompt().contains("high detail"));
    }
}
