use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of reactions to being poked.
///
/// Declaration order is significant: the response pool iterates modules in
/// this order so that selection is reproducible for a given weight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseModule {
    /// Poke the poker back a few times.
    AntiPoke,
    /// Ask the LLM for a short reply.
    Llm,
    /// Reply with a burst of QQ face stickers.
    Face,
    /// Reply with an image from the media pool.
    Meme,
    /// Mute the poker for a while.
    Ban,
    /// Rewrite the poke into a bot command.
    Command,
}

impl ResponseModule {
    pub const ALL: [ResponseModule; 6] = [
        ResponseModule::AntiPoke,
        ResponseModule::Llm,
        ResponseModule::Face,
        ResponseModule::Meme,
        ResponseModule::Ban,
        ResponseModule::Command,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseModule::AntiPoke => "antipoke",
            ResponseModule::Llm => "llm",
            ResponseModule::Face => "face",
            ResponseModule::Meme => "meme",
            ResponseModule::Ban => "ban",
            ResponseModule::Command => "command",
        }
    }
}

impl fmt::Display for ResponseModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
