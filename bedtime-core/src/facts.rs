//! Educational facts lookup.
//!
//! A fixed, read-only table of short facts children's stories can be
//! grounded in. Lookups are pure: an unknown topic yields `None`, never an
//! error, and the table never changes after startup, so it is shared freely
//! between concurrent requests.

use lazy_static::lazy_static;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Broad subject a fact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Space,
    Dinosaurs,
    Animals,
    Ocean,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Space,
        Category::Dinosaurs,
        Category::Animals,
        Category::Ocean,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Space => "space",
            Category::Dinosaurs => "dinosaurs",
            Category::Animals => "animals",
            Category::Ocean => "ocean",
        }
    }

    /// Words that place a topic in this category when no specific fact matches.
    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Category::Space => &[
                "space", "planet", "planets", "solar system", "galaxy", "astronaut",
                "astronauts", "rocket", "rockets", "orbit", "spaceship",
            ],
            Category::Dinosaurs => &[
                "dinosaur", "dinosaurs", "dino", "dinos", "jurassic", "fossil", "fossils",
                "prehistoric", "extinct",
            ],
            Category::Animals => &[
                "animal", "animals", "wildlife", "creature", "creatures", "mammal", "mammals",
                "zoo", "safari", "jungle",
            ],
            Category::Ocean => &[
                "ocean", "sea", "seas", "marine", "underwater", "reef", "fish", "beach",
            ],
        }
    }

    /// The fact served when only the category is recognised.
    pub fn representative(&self) -> &'static Fact {
        FACTS
            .iter()
            .find(|f| f.category == *self)
            .unwrap_or(&FACTS[0])
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single educational fact.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Fact {
    /// Lookup key, lowercase.
    pub key: &'static str,
    pub category: Category,
    pub text: &'static str,
}

static FACTS: &[Fact] = &[
    Fact {
        key: "mars",
        category: Category::Space,
        text: "Mars is the fourth planet from the Sun and is known as the Red Planet because of iron oxide (rust) on its surface. A day on Mars lasts about 24.6 hours, close to a day on Earth. Mars has two small moons called Phobos and Deimos.",
    },
    Fact {
        key: "moon",
        category: Category::Space,
        text: "The Moon is Earth's only natural satellite and takes about 27.3 days to travel around Earth. Its gravity pulls on the oceans and causes the tides. People first walked on the Moon in 1969.",
    },
    Fact {
        key: "sun",
        category: Category::Space,
        text: "The Sun is the star at the center of our solar system. It is about 4.6 billion years old and gives light and warmth to every planet. About 1.3 million Earths could fit inside it.",
    },
    Fact {
        key: "stars",
        category: Category::Space,
        text: "Stars are giant balls of hot gas that shine because of nuclear fusion. The closest star to Earth is the Sun. Stars come in colors from blue (the hottest) to white, yellow, orange and red (the coolest).",
    },
    Fact {
        key: "planets",
        category: Category::Space,
        text: "Our solar system has 8 planets: Mercury, Venus, Earth, Mars, Jupiter, Saturn, Uranus and Neptune. The first four are rocky planets and the last four are giant planets made mostly of gas and ice.",
    },
    Fact {
        key: "t-rex",
        category: Category::Dinosaurs,
        text: "Tyrannosaurus rex lived about 68 to 66 million years ago. It was one of the largest meat-eating dinosaurs, about 40 feet long and 12 feet tall, with teeth up to 8 inches long.",
    },
    Fact {
        key: "triceratops",
        category: Category::Dinosaurs,
        text: "Triceratops was a plant-eating dinosaur with three horns on its head. It lived about 68 to 66 million years ago and was about 30 feet long. Its name means 'three-horned face'.",
    },
    Fact {
        key: "brachiosaurus",
        category: Category::Dinosaurs,
        text: "Brachiosaurus was one of the tallest dinosaurs, with a very long neck for reaching treetops. This plant-eater lived about 154 million years ago and could stand up to 50 feet tall.",
    },
    Fact {
        key: "stegosaurus",
        category: Category::Dinosaurs,
        text: "Stegosaurus was a plant-eating dinosaur with big plates along its back and spikes on its tail. It lived about 155 to 150 million years ago and was about 30 feet long.",
    },
    Fact {
        key: "elephants",
        category: Category::Animals,
        text: "Elephants are the largest land animals on Earth. They have excellent memories and can live up to 70 years. They use their trunks to breathe, smell, touch and pick things up.",
    },
    Fact {
        key: "whales",
        category: Category::Animals,
        text: "Blue whales are the biggest animals that have ever lived, even bigger than the dinosaurs. Whales are mammals, so they breathe air and feed their babies milk.",
    },
    Fact {
        key: "penguins",
        category: Category::Animals,
        text: "Penguins are birds that cannot fly but are excellent swimmers. Many live in cold places like Antarctica. Their waterproof feathers keep them dry, and they often slide on their bellies across the ice.",
    },
    Fact {
        key: "lions",
        category: Category::Animals,
        text: "Lions live in family groups called prides. Male lions have a mane of fur around their heads. Lions can sleep up to 20 hours a day.",
    },
    Fact {
        key: "dolphins",
        category: Category::Animals,
        text: "Dolphins are very clever marine mammals that talk to each other with clicks and whistles. They are playful, can leap high out of the water, and live in groups called pods.",
    },
    Fact {
        key: "coral",
        category: Category::Ocean,
        text: "Coral reefs are built by tiny animals called coral polyps. They are home to many colorful fish and sea creatures, which is why reefs are called the 'rainforests of the sea'.",
    },
    Fact {
        key: "sharks",
        category: Category::Ocean,
        text: "Sharks have been around for more than 400 million years. Their skeletons are made of cartilage instead of bone, and they can sense the tiny electrical signals other animals make. Most sharks are not dangerous to people.",
    },
    Fact {
        key: "octopus",
        category: Category::Ocean,
        text: "An octopus has eight arms, three hearts and blue blood. It can change its color and texture to hide, and it can squeeze through very small spaces.",
    },
];

/// Alternate phrasings mapped to a fact key.
static ALIASES: &[(&str, &str)] = &[
    ("red planet", "mars"),
    ("martian", "mars"),
    ("lunar", "moon"),
    ("solar", "sun"),
    ("sunshine", "sun"),
    ("star", "stars"),
    ("planet", "planets"),
    ("jupiter", "planets"),
    ("saturn", "planets"),
    ("tyrannosaurus rex", "t-rex"),
    ("tyrannosaurus", "t-rex"),
    ("trex", "t-rex"),
    ("elephant", "elephants"),
    ("whale", "whales"),
    ("penguin", "penguins"),
    ("lion", "lions"),
    ("dolphin", "dolphins"),
    ("coral reef", "coral"),
    ("shark", "sharks"),
    ("octopuses", "octopus"),
];

lazy_static! {
    static ref BY_KEY: HashMap<&'static str, &'static Fact> =
        FACTS.iter().map(|f| (f.key, f)).collect();
}

/// Every fact in the table, in table order.
pub fn all() -> &'static [Fact] {
    FACTS
}

/// Find the fact for a topic.
///
/// Matching is case-insensitive and tried in order: exact key, alias
/// phrase, key phrase anywhere in the topic, then category keyword (which
/// yields the category's representative fact).
pub fn lookup(topic: &str) -> Option<&'static Fact> {
    let normalized = normalize(topic);
    if normalized.is_empty() {
        return None;
    }

    if let Some(fact) = FACTS.iter().find(|f| normalize(f.key) == normalized) {
        return Some(fact);
    }

    let padded = pad(&normalized);
    for (alias, key) in ALIASES {
        if contains_phrase(&padded, alias) {
            return BY_KEY.get(key).copied();
        }
    }

    if let Some(fact) = FACTS.iter().find(|f| contains_phrase(&padded, f.key)) {
        return Some(fact);
    }

    Category::ALL
        .iter()
        .find(|c| c.keywords().iter().any(|k| contains_phrase(&padded, k)))
        .map(Category::representative)
}

/// Every fact whose topic is mentioned somewhere in free text.
///
/// A category keyword only contributes its representative fact when no
/// specific fact of that category was already found.
pub fn detect_topics(text: &str) -> Vec<&'static Fact> {
    let padded = pad(&normalize(text));
    if padded.trim().is_empty() {
        return Vec::new();
    }

    let mut found: Vec<&'static Fact> = FACTS
        .iter()
        .filter(|f| contains_phrase(&padded, f.key))
        .collect();

    for (alias, key) in ALIASES {
        if contains_phrase(&padded, alias) {
            if let Some(&fact) = BY_KEY.get(key) {
                if !found.contains(&fact) {
                    found.push(fact);
                }
            }
        }
    }

    for category in Category::ALL {
        let covered = found.iter().any(|f| f.category == category);
        if !covered && category.keywords().iter().any(|k| contains_phrase(&padded, k)) {
            found.push(category.representative());
        }
    }

    found.sort_by_key(|f| table_position(f));
    found
}

fn table_position(fact: &Fact) -> usize {
    FACTS
        .iter()
        .position(|f| f.key == fact.key)
        .unwrap_or(usize::MAX)
}

/// Lowercase words separated by single spaces; hyphens and punctuation split words.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn pad(normalized: &str) -> String {
    format!(" {normalized} ")
}

fn contains_phrase(padded_haystack: &str, phrase: &str) -> bool {
    let phrase = normalize(phrase);
    !phrase.is_empty() && padded_haystack.contains(&pad(&phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_key_is_case_insensitive() {
        assert_eq!(lookup("Mars").map(|f| f.key), Some("mars"));
        assert_eq!(lookup("  OCTOPUS ").map(|f| f.key), Some("octopus"));
        assert_eq!(lookup("T-Rex").map(|f| f.key), Some("t-rex"));
    }

    #[test]
    fn test_alias_and_partial_matches() {
        assert_eq!(lookup("the Red Planet").map(|f| f.key), Some("mars"));
        assert_eq!(lookup("Tyrannosaurus Rex").map(|f| f.key), Some("t-rex"));
        assert_eq!(lookup("a baby penguin").map(|f| f.key), Some("penguins"));
        assert_eq!(lookup("t rex bones").map(|f| f.key), Some("t-rex"));
        assert_eq!(lookup("friendly sharks").map(|f| f.key), Some("sharks"));
    }

    #[test]
    fn test_category_keyword_yields_representative() {
        let fact = lookup("deep ocean adventures").unwrap();
        assert_eq!(fact.category, Category::Ocean);
        assert_eq!(fact.key, "coral");

        let fact = lookup("astronaut").unwrap();
        assert_eq!(fact.key, "mars");
    }

    #[test]
    fn test_unknown_topics_are_absent() {
        for topic in ["", "   ", "unicorns", "baking bread", "sunday", "seasons", "?!"] {
            assert!(lookup(topic).is_none(), "expected no fact for {topic:?}");
        }
    }

    #[test]
    fn test_detect_topics_in_request() {
        let found = detect_topics("A story about a girl who visits Mars and meets a friendly whale");
        let keys: Vec<_> = found.iter().map(|f| f.key).collect();
        assert_eq!(keys, vec!["mars", "whales"]);
    }

    #[test]
    fn test_detect_topics_category_only_when_uncovered() {
        let found = detect_topics("Dolphins playing in the ocean near a coral reef");
        let keys: Vec<_> = found.iter().map(|f| f.key).collect();
        assert_eq!(keys, vec!["dolphins", "coral"]);

        let found = detect_topics("a rocket ride");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].category, Category::Space);
    }

    #[test]
    fn test_detect_topics_nothing_relevant() {
        assert!(detect_topics("A bunny learns to share her carrots").is_empty());
        assert!(detect_topics("").is_empty());
    }

    #[test]
    fn test_every_category_has_a_representative() {
        for category in Category::ALL {
            assert_eq!(category.representative().category, category);
        }
        assert_eq!(all().len(), 17);
    }
}
