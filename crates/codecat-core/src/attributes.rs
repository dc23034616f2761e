//! Attribute mapping: normalized score + language + size → cat traits.
//!
//! Every trait is a pure table lookup. The only variation beyond the inputs
//! comes from the SHA-256 digest of the generation id, which picks the
//! accessory and pose and seeds the image, so re-running a generation
//! reproduces the same record.

use codecat_state::{
    AgeClass, AttributeRecord, Breed, CoatClass, Expression, GenerationId, ImagePrompt,
    QualityBand, SizeClass,
};
use sha2::{Digest, Sha256};

use crate::error::MappingError;
use crate::scoring::SCORE_MAX;

pub const IMAGE_WIDTH: u32 = 768;
pub const IMAGE_HEIGHT: u32 = 432;

/// Lower bound (inclusive) of the top band.
pub const LEGIT_THRESHOLD: f64 = 8.0;
/// Lower bound (inclusive) of the middle band.
pub const DECENT_THRESHOLD: f64 = 6.0;

pub const DEFAULT_BACKGROUND: &str =
    "a generic code editor with colorful syntax highlighting and binary matrix";

const BACKGROUNDS: &[(&str, &str)] = &[
    ("Python", "snakes and code snippets in a cozy den"),
    ("JavaScript", "coffee cups and scattered npm packages on a laptop desk"),
    ("TypeScript", "organized coffee cups with a blue bow tie and type annotations"),
    ("Java", "coffee beans and enterprise office buildings with glass windows"),
    ("C#", ".NET framework symbols and Windows logos on a modern workspace"),
    ("C++", "circuit boards and low-level hardware with pointers and wires"),
    ("C", "memory chips and pointer diagrams on vintage computer hardware"),
    ("Go", "gophers running playfully through scenic mountains"),
    ("Rust", "gears, a friendly orange crab named Ferris, and metal safety equipment"),
    ("PHP", "purple elephants and web servers with code scrolls"),
    ("Ruby", "sparkling red gems scattered on polished railway tracks"),
    ("Swift", "elegant bird feathers and sleek iOS devices in a modern studio"),
    ("Kotlin", "friendly Android robots climbing colorful mountains"),
    ("Perl", "wise camels carrying ancient scrolls through desert landscapes"),
    ("Scala", "elegant marble staircases ascending toward JVM clouds"),
    ("Haskell", "lambda symbols and complex mathematical equations on chalkboards"),
    ("Elixir", "mystical potion bottles and alchemy symbols in a magical workshop"),
    ("Clojure", "colorful nested parentheses forming beautiful fractal patterns"),
    ("Lua", "crescent moon and glowing stars in a peaceful night sky"),
    ("R", "statistical graphs and colorful data charts on scientific displays"),
    ("Dart", "delicate Flutter butterflies around vibrant mobile app screens"),
    ("Shell", "terminal windows with green text on black screens"),
    ("Bash", "command prompts and cascading shell scripts in a terminal"),
    ("Objective-C", "classic Apple logos and legacy code blueprints from the past"),
    ("F#", "functional programming pipes and .NET symbols in harmony"),
    ("Erlang", "telephone switches and distributed network diagrams"),
    ("Groovy", "musical notes and Gradle build scripts dancing together"),
    ("Crystal", "sparkling crystal shards and high-performance gemstones"),
];

const BREEDS: &[(Breed, &[&str])] = &[
    (Breed::Tabby, &["Python", "Ruby", "Perl", "PHP", "Shell", "Bash", "Lua"]),
    (Breed::Siamese, &["JavaScript", "TypeScript", "Dart", "CoffeeScript"]),
    (Breed::Persian, &["Java", "C#", "Scala", "Kotlin", "F#"]),
    (Breed::MaineCoon, &["Go", "Rust", "C++", "C", "Zig"]),
    (Breed::ScottishFold, &["Haskell", "Elixir", "Clojure", "Erlang", "OCaml"]),
    (Breed::BritishShorthair, &["Swift", "Objective-C"]),
    (Breed::Ragdoll, &["R", "MATLAB", "Julia"]),
];

const ACCESSORIES_LEGIT: &[&str] = &[
    "a tiny silk bow tie",
    "round reading glasses",
    "a miniature graduation cap",
    "a polished brass collar bell",
];
const ACCESSORIES_DECENT: &[&str] = &[
    "a knitted scarf",
    "a simple leather collar",
    "a small bandana",
    "a pair of oversized headphones",
];
const ACCESSORIES_SPAGHETTI: &[&str] = &[
    "a strand of spaghetti draped over one ear",
    "a tangled ball of yarn",
    "a coffee-stained sticky note",
    "a crooked party hat",
];

const POSES_LEGIT: &[&str] = &[
    "sitting upright with perfect posture",
    "perched regally on a stack of books",
    "calmly surveying the room",
];
const POSES_DECENT: &[&str] = &[
    "lounging on a keyboard",
    "stretching lazily",
    "curled up beside a monitor",
];
const POSES_SPAGHETTI: &[&str] = &[
    "tangled in a nest of cables",
    "sprawled awkwardly across a messy desk",
    "mid-pounce at a falling mug",
];

/// Inputs to [`map_attributes`].
#[derive(Debug, Clone, Copy)]
pub struct MappingInput<'a> {
    /// Normalized score in `[0, 10]`.
    pub score: f64,
    pub language: Option<&'a str>,
    pub size_kb: u64,
    pub generation_id: GenerationId,
}

pub fn quality_band(score: f64) -> QualityBand {
    if score >= LEGIT_THRESHOLD {
        QualityBand::Legit
    } else if score >= DECENT_THRESHOLD {
        QualityBand::Decent
    } else {
        QualityBand::Spaghetti
    }
}

pub fn size_class(size_kb: u64) -> SizeClass {
    match size_kb {
        0..=1_000 => SizeClass::Small,
        1_001..=5_000 => SizeClass::Medium,
        5_001..=10_000 => SizeClass::Large,
        _ => SizeClass::VeryLarge,
    }
}

pub fn breed_for(language: Option<&str>) -> Breed {
    language
        .and_then(|lang| {
            BREEDS
                .iter()
                .find(|(_, names)| names.iter().any(|n| n.eq_ignore_ascii_case(lang.trim())))
                .map(|(breed, _)| *breed)
        })
        .unwrap_or(Breed::DomesticShorthair)
}

pub fn background_for(language: Option<&str>) -> &'static str {
    language
        .and_then(|lang| {
            BACKGROUNDS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(lang.trim()))
                .map(|(_, scene)| *scene)
        })
        .unwrap_or(DEFAULT_BACKGROUND)
}

/// Map a normalized score to the full attribute record.
///
/// Total over `[0, 10]`; anything else (including NaN) is rejected.
pub fn map_attributes(input: &MappingInput<'_>) -> Result<AttributeRecord, MappingError> {
    let score = input.score;
    if !(0.0..=SCORE_MAX).contains(&score) {
        return Err(MappingError::ScoreOutOfRange(score));
    }

    let band = quality_band(score);
    let (age, expression, coat, accessories, poses) = match band {
        QualityBand::Legit => (
            AgeClass::Senior,
            Expression::Happy,
            CoatClass::Groomed,
            ACCESSORIES_LEGIT,
            POSES_LEGIT,
        ),
        QualityBand::Decent => (
            AgeClass::Adult,
            Expression::Neutral,
            CoatClass::Tidy,
            ACCESSORIES_DECENT,
            POSES_DECENT,
        ),
        QualityBand::Spaghetti => (
            AgeClass::Kitten,
            Expression::Grumpy,
            CoatClass::Scruffy,
            ACCESSORIES_SPAGHETTI,
            POSES_SPAGHETTI,
        ),
    };

    let digest = Sha256::digest(input.generation_id.to_string().as_bytes());
    let word = |i: usize| {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[i * 8..(i + 1) * 8]);
        u64::from_be_bytes(bytes)
    };
    let accessory = accessories[(word(0) % accessories.len() as u64) as usize];
    let pose = poses[(word(1) % poses.len() as u64) as usize];
    let seed = word(2);

    let size = size_class(input.size_kb);
    let breed = breed_for(input.language);
    let background = background_for(input.language);

    let text = format!(
        "A {beauty} {age}, {size} {breed}, with a {expression} and a {coat}, wearing {accessory}, {pose}. \
         Background: {background}. \
         Photorealistic, detailed fur texture, professional photography, 8k quality. \
         The cat should look natural and lifelike.",
        beauty = beauty_modifier(score),
        age = age_phrase(age),
        size = size_phrase(size),
        breed = breed_phrase(breed),
        expression = expression_phrase(expression),
        coat = coat_phrase(coat),
    );

    Ok(AttributeRecord {
        size,
        quality_band: band,
        age,
        expression,
        coat,
        breed,
        accessory: accessory.to_string(),
        pose: pose.to_string(),
        background: background.to_string(),
        language: input.language.map(str::to_string),
        beauty_score: score,
        narrative_seed: hex::encode(&digest[..8]),
        prompt: ImagePrompt {
            text,
            width: IMAGE_WIDTH,
            height: IMAGE_HEIGHT,
            seed,
        },
    })
}

fn beauty_modifier(score: f64) -> &'static str {
    if score >= 8.0 {
        "beautiful, well-groomed"
    } else if score >= 6.0 {
        "pleasant-looking"
    } else if score >= 4.0 {
        "ordinary"
    } else {
        "scruffy, disheveled"
    }
}

fn age_phrase(age: AgeClass) -> &'static str {
    match age {
        AgeClass::Senior => "wise senior cat with distinguished grey whiskers",
        AgeClass::Adult => "mature adult cat with confident posture",
        AgeClass::Kitten => "tiny baby kitten with bright curious eyes",
    }
}

fn size_phrase(size: SizeClass) -> &'static str {
    match size {
        SizeClass::Small => "small and adorable",
        SizeClass::Medium => "medium-sized and well-proportioned",
        SizeClass::Large => "large, fluffy and chonky",
        SizeClass::VeryLarge => "absolutely massive, a legendary chonker",
    }
}

fn breed_phrase(breed: Breed) -> &'static str {
    match breed {
        Breed::Tabby => "tabby cat with striped fur pattern",
        Breed::Siamese => "siamese cat with blue eyes and colorpoint markings",
        Breed::Persian => "persian cat with luxurious long fur and flat face",
        Breed::MaineCoon => "maine coon cat, large and majestic with tufted ears",
        Breed::ScottishFold => "scottish fold cat with distinctive folded ears",
        Breed::BritishShorthair => "british shorthair cat with plush coat and round face",
        Breed::Ragdoll => "ragdoll cat with calm, relaxed posture",
        Breed::DomesticShorthair => "domestic shorthair cat",
    }
}

fn expression_phrase(expression: Expression) -> &'static str {
    match expression {
        Expression::Happy => "happy, smiling, content expression with bright eyes",
        Expression::Neutral => "neutral, peaceful expression with calm demeanor",
        Expression::Grumpy => "grumpy, scowling, displeased expression",
    }
}

fn coat_phrase(coat: CoatClass) -> &'static str {
    match coat {
        CoatClass::Groomed => "sleek, glossy coat",
        CoatClass::Tidy => "tidy coat",
        CoatClass::Scruffy => "matted, messy coat",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(score: f64) -> MappingInput<'static> {
        MappingInput {
            score,
            language: Some("Rust"),
            size_kb: 640,
            generation_id: GenerationId::new(),
        }
    }

    #[test]
    fn bands_are_contiguous_with_inclusive_lower_bounds() {
        assert_eq!(quality_band(10.0), QualityBand::Legit);
        assert_eq!(quality_band(8.0), QualityBand::Legit);
        assert_eq!(quality_band(7.9), QualityBand::Decent);
        assert_eq!(quality_band(6.0), QualityBand::Decent);
        assert_eq!(quality_band(5.99), QualityBand::Spaghetti);
        assert_eq!(quality_band(0.0), QualityBand::Spaghetti);
    }

    #[test]
    fn every_valid_score_maps_every_trait() {
        for tenth in 0..=100 {
            let score = f64::from(tenth) / 10.0;
            let record = map_attributes(&input(score)).unwrap();
            assert_eq!(record.quality_band, quality_band(score));
            assert!(!record.accessory.is_empty());
            assert!(!record.pose.is_empty());
            assert!(!record.background.is_empty());
            assert_eq!(record.beauty_score, score);
        }
    }

    #[test]
    fn band_drives_age_expression_and_coat() {
        let top = map_attributes(&input(9.1)).unwrap();
        assert_eq!(
            (top.age, top.expression, top.coat),
            (AgeClass::Senior, Expression::Happy, CoatClass::Groomed)
        );
        let low = map_attributes(&input(2.0)).unwrap();
        assert_eq!(
            (low.age, low.expression, low.coat),
            (AgeClass::Kitten, Expression::Grumpy, CoatClass::Scruffy)
        );
    }

    #[test]
    fn out_of_range_scores_are_rejected() {
        for score in [-0.1, 10.01, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                map_attributes(&input(score)),
                Err(MappingError::ScoreOutOfRange(_))
            ));
        }
    }

    #[test]
    fn same_generation_id_reproduces_the_record() {
        let id = GenerationId::new();
        let a = map_attributes(&MappingInput {
            generation_id: id,
            ..input(7.0)
        })
        .unwrap();
        let b = map_attributes(&MappingInput {
            generation_id: id,
            ..input(7.0)
        })
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.narrative_seed.len(), 16);
    }

    #[test]
    fn size_bands_follow_kilobytes() {
        assert_eq!(size_class(0), SizeClass::Small);
        assert_eq!(size_class(1_000), SizeClass::Small);
        assert_eq!(size_class(1_001), SizeClass::Medium);
        assert_eq!(size_class(5_000), SizeClass::Medium);
        assert_eq!(size_class(10_000), SizeClass::Large);
        assert_eq!(size_class(10_001), SizeClass::VeryLarge);
    }

    #[test]
    fn language_tables_fall_back_to_defaults() {
        assert_eq!(breed_for(Some("rust")), Breed::MaineCoon);
        assert_eq!(breed_for(Some("TypeScript")), Breed::Siamese);
        assert_eq!(breed_for(Some("Haskell")), Breed::ScottishFold);
        assert_eq!(breed_for(Some("Brainfuck")), Breed::DomesticShorthair);
        assert_eq!(breed_for(None), Breed::DomesticShorthair);
        assert_eq!(background_for(None), DEFAULT_BACKGROUND);
        assert!(background_for(Some("Go")).contains("gophers"));
    }

    #[test]
    fn prompt_describes_the_record() {
        let record = map_attributes(&input(8.5)).unwrap();
        assert_eq!(record.prompt.width, IMAGE_WIDTH);
        assert_eq!(record.prompt.height, IMAGE_HEIGHT);
        assert!(record.prompt.text.starts_with("A beautiful, well-groomed"));
        assert!(record.prompt.text.contains("Ferris"));
        assert!(record.prompt.text.contains(&record.accessory));
    }
}
