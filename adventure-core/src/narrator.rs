//! Narration collaborator.
//!
//! The engine never generates prose itself. It hands a [`NarrationRequest`]
//! to whatever [`Narrator`] the front end supplies and records the text that
//! comes back. [`OfflineNarrator`] is a keyword-driven narrator that works
//! without any external service.

use crate::dice::{DiceEngine, RollSummary};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors from a narrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NarrationError {
    #[error("Narrator unavailable: {0}")]
    Unavailable(String),

    #[error("Narration failed: {0}")]
    Failed(String),

    #[error("Narration timed out")]
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown personality: {0}")]
pub struct UnknownPersonality(pub String);

/// Narrator voice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    #[default]
    Serious,
    Comedic,
    Mysterious,
    Chaotic,
}

impl Personality {
    pub fn key(&self) -> &'static str {
        match self {
            Personality::Serious => "serious",
            Personality::Comedic => "comedic",
            Personality::Mysterious => "mysterious",
            Personality::Chaotic => "chaotic",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Personality::Serious => "Master Aldric the Wise",
            Personality::Comedic => "Jester Jim the Mirthful",
            Personality::Mysterious => "The Shadow Weaver",
            Personality::Chaotic => "Wildcard the Unpredictable",
        }
    }

    pub fn all() -> [Personality; 4] {
        [
            Personality::Serious,
            Personality::Comedic,
            Personality::Mysterious,
            Personality::Chaotic,
        ]
    }

    fn openers(&self) -> &'static [&'static str] {
        match self {
            Personality::Serious => &[
                "You proceed with determination.",
                "Your choice carries weight.",
                "You steady yourself for what lies ahead.",
            ],
            Personality::Comedic => &[
                "Well, this should be interesting!",
                "*chuckles* That's certainly one approach!",
                "What could possibly go wrong?",
            ],
            Personality::Mysterious => &[
                "The shadows whisper of your choice...",
                "Something stirs just beyond sight...",
                "Old powers take notice...",
            ],
            Personality::Chaotic => &[
                "Chaos erupts around you!",
                "The unexpected happens!",
                "*rolls dice behind the screen* Interesting...",
            ],
        }
    }
}

impl FromStr for Personality {
    type Err = UnknownPersonality;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Personality::all()
            .into_iter()
            .find(|p| p.key().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownPersonality(s.to_string()))
    }
}

impl fmt::Display for Personality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Canned response used when the narrator fails or times out.
pub fn fallback_response(personality: Personality) -> String {
    let name = personality.display_name();
    let opener = match personality {
        Personality::Serious => format!("{} pauses thoughtfully, gathering wisdom before continuing the tale...", name),
        Personality::Comedic => format!("{} juggles some invisible balls while thinking of the perfect response...", name),
        Personality::Mysterious => format!("{}'s form shimmers as the mystical energies realign...", name),
        Personality::Chaotic => format!("{} spins a wheel of possibilities and grins mischievously...", name),
    };
    format!(
        "{}\n\n*The magical connection wavers for a moment, but your adventure continues!*\n\n\
         Several paths stretch out ahead of you, each waiting for your decision.\n\n\
         What would you like to do next?",
        opener
    )
}

/// Everything a narrator gets to see for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationRequest {
    pub context: String,
    pub action: String,
    pub roll: Option<RollSummary>,
}

impl NarrationRequest {
    pub fn new(context: impl Into<String>, action: impl Into<String>, roll: Option<RollSummary>) -> Self {
        Self {
            context: context.into(),
            action: action.into(),
            roll,
        }
    }

    /// Single prompt string for text-generation backends.
    pub fn prompt(&self) -> String {
        let mut prompt = format!("Player action: {}", self.action);
        if !self.context.trim().is_empty() {
            prompt = format!("Recent story context:\n{}\n\n{}", self.context, prompt);
        }
        if let Some(roll) = &self.roll {
            prompt.push_str(&format!("\n\nDice roll result: {} = {}", roll.description, roll.total));
        }
        prompt
    }
}

/// Something that turns a game turn into prose.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, request: &NarrationRequest) -> Result<String, NarrationError>;
}

// ============================================================================
// Offline narrator
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionTheme {
    Search,
    Attack,
    Talk,
    Travel,
    Rest,
    Magic,
    Athletics,
    Other,
}

impl ActionTheme {
    fn of(action: &str) -> Self {
        const THEMES: [(ActionTheme, &[&str]); 7] = [
            (ActionTheme::Search, &["search", "look", "examine", "investigate", "see"]),
            (ActionTheme::Attack, &["attack", "fight", "strike", "hit"]),
            (ActionTheme::Talk, &["talk", "speak", "say", "tell", "ask"]),
            (ActionTheme::Travel, &["go", "walk", "move", "travel", "head", "forward", "continue"]),
            (ActionTheme::Rest, &["rest", "sleep", "camp"]),
            (ActionTheme::Magic, &["cast", "spell", "magic"]),
            (ActionTheme::Athletics, &["climb", "jump", "leap"]),
        ];
        let action = action.to_lowercase();
        THEMES
            .iter()
            .find(|(_, words)| words.iter().any(|w| action.contains(w)))
            .map(|(theme, _)| *theme)
            .unwrap_or(ActionTheme::Other)
    }

    fn outcomes(&self, roll: Option<&RollSummary>) -> &'static [&'static str] {
        match self {
            ActionTheme::Search => &[
                "You find ancient runes carved into a nearby stone.",
                "Strange tracks lead away from here, heading north.",
                "A glint of metal catches your eye: an old key half-buried in the dirt.",
                "Nothing obvious, but you can't shake the feeling of being watched.",
            ],
            ActionTheme::Attack if roll.map(|r| r.total >= 15).unwrap_or(false) => &[
                "Your attack strikes true and your foe staggers back.",
                "Your blade finds the gap in their armor.",
                "A devastating blow! Your enemy is clearly outmatched.",
            ],
            ActionTheme::Attack => &[
                "Your foe ducks aside at the last second.",
                "A shield deflects your strike with a loud clang.",
                "You stumble, giving your opponent an opening.",
            ],
            ActionTheme::Talk => &[
                "The merchant's eyes light up at your words.",
                "The guard nods slowly, weighing your request.",
                "'Interesting,' the stranger murmurs. 'I may know something.'",
            ],
            ActionTheme::Travel => &[
                "The road winds through changing country until a crossroads comes into view.",
                "After some hours you reach the edge of a dense, quiet forest.",
                "Your journey brings you to a rushing river with a narrow stone bridge.",
            ],
            ActionTheme::Rest => &[
                "You find a sheltered spot and rest. You wake refreshed.",
                "Strange sounds interrupt your sleep, but nothing approaches.",
                "You dream of a hooded figure standing at a crossroads...",
            ],
            ActionTheme::Magic => &[
                "Arcane energy crackles as the spell bends to your will!",
                "Magic flows through you and lights the area for a heartbeat.",
                "Your incantation echoes strangely, as if the air itself is listening.",
            ],
            ActionTheme::Athletics => &[
                "Your training serves you well as you clear the obstacle.",
                "With real effort you manage the manoeuvre.",
                "You make it, though not without a few scrapes.",
            ],
            ActionTheme::Other => &[
                "Your action draws the attention of a curious onlooker.",
                "Something about your surroundings seems different now.",
                "A new opportunity presents itself.",
            ],
        }
    }
}

const STORY_HOOKS: [&str; 6] = [
    "",
    "",
    "",
    "\n\nIn the distance, you hear approaching hoofbeats.",
    "\n\nA figure watches you from the shadows before slipping away.",
    "\n\nStorm clouds gather on the horizon.",
];

fn roll_flavor(total: i32) -> &'static str {
    match total {
        t if t >= 18 => " Your exceptional effort shows remarkable results!",
        t if t >= 15 => " Your efforts prove quite successful!",
        t if t >= 10 => " Things go reasonably well.",
        t if t <= 5 => " Unfortunately, things don't go as planned.",
        _ => " The results are mixed.",
    }
}

/// Keyword-driven narrator that never fails.
#[derive(Debug)]
pub struct OfflineNarrator {
    personality: Personality,
    dice: Mutex<DiceEngine>,
}

impl OfflineNarrator {
    pub fn new(personality: Personality) -> Self {
        Self::with_dice(personality, DiceEngine::new())
    }

    pub fn with_dice(personality: Personality, dice: DiceEngine) -> Self {
        Self {
            personality,
            dice: Mutex::new(dice),
        }
    }

    pub fn personality(&self) -> Personality {
        self.personality
    }
}

#[async_trait]
impl Narrator for OfflineNarrator {
    async fn narrate(&self, request: &NarrationRequest) -> Result<String, NarrationError> {
        let theme = ActionTheme::of(&request.action);
        let mut dice = self.dice.lock().await;

        let opener = dice.choose(self.personality.openers()).copied().unwrap_or_default();
        let outcome = dice
            .choose(theme.outcomes(request.roll.as_ref()))
            .copied()
            .unwrap_or_default();
        let flavor = request.roll.as_ref().map(|r| roll_flavor(r.total)).unwrap_or("");
        let hook = dice.choose(&STORY_HOOKS).copied().unwrap_or_default();

        Ok(format!("{} {}{}{}\n\nWhat do you do next?", opener, outcome, flavor, hook))
    }
}
