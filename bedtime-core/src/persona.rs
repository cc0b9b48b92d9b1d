//! Parent personalization: story personas, values and interests.
//!
//! Parents pick a storytelling persona plus any number of values and
//! interests. Each choice contributes a short instruction to the
//! storyteller prompt, and the persona also sets the sampling temperature.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PersonaError {
    #[error("Unknown persona '{0}' (expected one of: {list})", list = StoryPersona::keys())]
    UnknownPersona(String),

    #[error("Unknown value '{0}' (expected one of: {list})", list = StoryValue::keys())]
    UnknownValue(String),

    #[error("Unknown interest '{0}' (expected one of: {list})", list = Interest::keys())]
    UnknownInterest(String),
}

/// Narrative shape a persona prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryArc {
    HeroJourney,
    ThreeAct,
}

impl StoryArc {
    pub fn describe(&self) -> &'static str {
        match self {
            StoryArc::HeroJourney => {
                "a hero's journey: an ordinary beginning, a call to adventure, a challenge met with help from friends, and a happy return home"
            }
            StoryArc::ThreeAct => {
                "three acts: a cozy setup, a gentle problem that grows, and a warm resolution"
            }
        }
    }
}

/// Storytelling style chosen by the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryPersona {
    AdventurousExplorer,
    CreativeDreamer,
    GentleFriend,
    CuriousLearner,
    #[default]
    BalancedStoryteller,
}

impl StoryPersona {
    pub const ALL: [StoryPersona; 5] = [
        StoryPersona::AdventurousExplorer,
        StoryPersona::CreativeDreamer,
        StoryPersona::GentleFriend,
        StoryPersona::CuriousLearner,
        StoryPersona::BalancedStoryteller,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            StoryPersona::AdventurousExplorer => "adventurous_explorer",
            StoryPersona::CreativeDreamer => "creative_dreamer",
            StoryPersona::GentleFriend => "gentle_friend",
            StoryPersona::CuriousLearner => "curious_learner",
            StoryPersona::BalancedStoryteller => "balanced_storyteller",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoryPersona::AdventurousExplorer => "Adventurous Explorer",
            StoryPersona::CreativeDreamer => "Creative Dreamer",
            StoryPersona::GentleFriend => "Gentle Friend",
            StoryPersona::CuriousLearner => "Curious Learner",
            StoryPersona::BalancedStoryteller => "Balanced Storyteller",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StoryPersona::AdventurousExplorer => {
                "Exciting quests and daring discoveries, with brave characters who explore new places"
            }
            StoryPersona::CreativeDreamer => {
                "Whimsical, magical worlds full of imagination, talking animals and gentle wonder"
            }
            StoryPersona::GentleFriend => {
                "Soft, comforting stories about friendship, feelings and caring for others"
            }
            StoryPersona::CuriousLearner => {
                "Stories that weave in real facts about the world and celebrate asking questions"
            }
            StoryPersona::BalancedStoryteller => {
                "A mix of adventure, heart and learning suited to most children"
            }
        }
    }

    /// Sampling temperature for the storyteller.
    pub fn temperature(&self) -> f32 {
        match self {
            StoryPersona::AdventurousExplorer => 0.85,
            StoryPersona::CreativeDreamer => 0.9,
            StoryPersona::GentleFriend => 0.75,
            StoryPersona::CuriousLearner => 0.7,
            StoryPersona::BalancedStoryteller => 0.8,
        }
    }

    pub fn arc(&self) -> StoryArc {
        match self {
            StoryPersona::GentleFriend | StoryPersona::CuriousLearner => StoryArc::ThreeAct,
            _ => StoryArc::HeroJourney,
        }
    }

    pub fn tone(&self) -> &'static str {
        match self {
            StoryPersona::AdventurousExplorer => "exciting but safe",
            StoryPersona::CreativeDreamer => "mystical but not scary",
            StoryPersona::GentleFriend => "warm and caring",
            StoryPersona::CuriousLearner => "educational and fun",
            StoryPersona::BalancedStoryteller => "uplifting",
        }
    }

    fn keys() -> String {
        Self::ALL.iter().map(|p| p.key()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for StoryPersona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StoryPersona {
    type Err = PersonaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = canonical(s);
        Self::ALL
            .into_iter()
            .find(|p| p.key() == wanted || p.key().split('_').next() == Some(wanted.as_str()))
            .ok_or_else(|| PersonaError::UnknownPersona(s.to_string()))
    }
}

/// A value the story should model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryValue {
    Kindness,
    Friendship,
    Courage,
    Honesty,
    Empathy,
    Perseverance,
    Gratitude,
}

impl StoryValue {
    pub const ALL: [StoryValue; 7] = [
        StoryValue::Kindness,
        StoryValue::Friendship,
        StoryValue::Courage,
        StoryValue::Honesty,
        StoryValue::Empathy,
        StoryValue::Perseverance,
        StoryValue::Gratitude,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            StoryValue::Kindness => "kindness",
            StoryValue::Friendship => "friendship",
            StoryValue::Courage => "courage",
            StoryValue::Honesty => "honesty",
            StoryValue::Empathy => "empathy",
            StoryValue::Perseverance => "perseverance",
            StoryValue::Gratitude => "gratitude",
        }
    }

    pub fn prompt_addition(&self) -> &'static str {
        match self {
            StoryValue::Kindness => {
                "Show characters being kind to others and how kindness makes everyone feel good."
            }
            StoryValue::Friendship => {
                "Highlight the importance of friendship, teamwork and helping friends."
            }
            StoryValue::Courage => {
                "Include characters who are brave and face their fears in a gentle way."
            }
            StoryValue::Honesty => "Show why telling the truth matters, even when it is hard.",
            StoryValue::Empathy => {
                "Help characters understand how others feel and respond with care."
            }
            StoryValue::Perseverance => {
                "Show characters who keep trying and do not give up when things are difficult."
            }
            StoryValue::Gratitude => {
                "Include moments of saying thank you and appreciating what we have."
            }
        }
    }

    fn keys() -> String {
        Self::ALL.iter().map(|v| v.key()).collect::<Vec<_>>().join(", ")
    }
}

impl FromStr for StoryValue {
    type Err = PersonaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = canonical(s);
        Self::ALL
            .into_iter()
            .find(|v| v.key() == wanted)
            .ok_or_else(|| PersonaError::UnknownValue(s.to_string()))
    }
}

/// Something the child enjoys, woven into the story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interest {
    Animals,
    Space,
    Dinosaurs,
    Princesses,
    Superheroes,
    Nature,
    Music,
    Art,
}

impl Interest {
    pub const ALL: [Interest; 8] = [
        Interest::Animals,
        Interest::Space,
        Interest::Dinosaurs,
        Interest::Princesses,
        Interest::Superheroes,
        Interest::Nature,
        Interest::Music,
        Interest::Art,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Interest::Animals => "animals",
            Interest::Space => "space",
            Interest::Dinosaurs => "dinosaurs",
            Interest::Princesses => "princesses",
            Interest::Superheroes => "superheroes",
            Interest::Nature => "nature",
            Interest::Music => "music",
            Interest::Art => "art",
        }
    }

    pub fn prompt_addition(&self) -> &'static str {
        match self {
            Interest::Animals => "Include friendly animals as characters.",
            Interest::Space => "Set part of the story among stars, planets or rockets.",
            Interest::Dinosaurs => "Feature gentle dinosaurs and prehistoric adventures.",
            Interest::Princesses => {
                "Include a clever, kind princess who solves problems herself."
            }
            Interest::Superheroes => {
                "Include a young superhero whose real power is helping others."
            }
            Interest::Nature => "Celebrate forests, gardens, weather and the outdoors.",
            Interest::Music => "Let songs, rhythm or musical instruments play a part.",
            Interest::Art => "Include painting, drawing or making things as part of the plot.",
        }
    }

    fn keys() -> String {
        Self::ALL.iter().map(|i| i.key()).collect::<Vec<_>>().join(", ")
    }
}

impl FromStr for Interest {
    type Err = PersonaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = canonical(s);
        Self::ALL
            .into_iter()
            .find(|i| i.key() == wanted)
            .ok_or_else(|| PersonaError::UnknownInterest(s.to_string()))
    }
}

fn canonical(s: &str) -> String {
    s.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Everything a parent can configure about a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryConstraints {
    pub child_name: Option<String>,
    pub persona: StoryPersona,
    pub values: Vec<StoryValue>,
    pub interests: Vec<Interest>,
    pub custom_elements: Option<String>,
}

impl Default for StoryConstraints {
    fn default() -> Self {
        Self {
            child_name: None,
            persona: StoryPersona::default(),
            values: vec![StoryValue::Kindness, StoryValue::Friendship],
            interests: Vec::new(),
            custom_elements: None,
        }
    }
}

impl StoryConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_child_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.child_name = if name.trim().is_empty() {
            None
        } else {
            Some(name.trim().to_string())
        };
        self
    }

    pub fn with_persona(mut self, persona: StoryPersona) -> Self {
        self.persona = persona;
        self
    }

    /// Replace the value list; duplicates are dropped.
    pub fn with_values(mut self, values: impl IntoIterator<Item = StoryValue>) -> Self {
        self.values.clear();
        for value in values {
            if !self.values.contains(&value) {
                self.values.push(value);
            }
        }
        self
    }

    /// Replace the interest list; duplicates are dropped.
    pub fn with_interests(mut self, interests: impl IntoIterator<Item = Interest>) -> Self {
        self.interests.clear();
        for interest in interests {
            if !self.interests.contains(&interest) {
                self.interests.push(interest);
            }
        }
        self
    }

    pub fn with_custom_elements(mut self, elements: impl Into<String>) -> Self {
        let elements = elements.into();
        self.custom_elements = if elements.trim().is_empty() {
            None
        } else {
            Some(elements.trim().to_string())
        };
        self
    }

    /// The personalization section appended to the storyteller prompt.
    pub fn render_instructions(&self) -> String {
        let mut out = String::from("## Personalization\n\n");

        out.push_str(&format!(
            "Storytelling style: {} ({}). The tone should be {}.\n",
            self.persona.name(),
            self.persona.description(),
            self.persona.tone()
        ));
        out.push_str(&format!("Structure the story as {}.\n", self.persona.arc().describe()));

        if let Some(name) = &self.child_name {
            out.push_str(&format!(
                "The main character is named {name}. Make {name} the hero of the story.\n"
            ));
        }

        if !self.values.is_empty() {
            out.push_str("\nValues to teach:\n");
            for value in &self.values {
                out.push_str(&format!("- {}: {}\n", value.key(), value.prompt_addition()));
            }
        }

        if !self.interests.is_empty() {
            out.push_str("\nThe child loves:\n");
            for interest in &self.interests {
                out.push_str(&format!("- {}: {}\n", interest.key(), interest.prompt_addition()));
            }
        }

        if let Some(custom) = &self.custom_elements {
            out.push_str(&format!("\nAlso include: {custom}\n"));
        }

        out
    }
}
