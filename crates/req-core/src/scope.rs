use serde::{Deserialize, Serialize};

/// Lifetime class of a satisfaction fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Session,
    Branch,
    Permanent,
    SingleUse,
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Session
    }
}

impl Scope {
    /// `branch`/`permanent` requirements have no per-session gate: they are
    /// always considered triggered, since "triggered" only exists to let the
    /// Stop handler skip requirements a session never touched.
    pub fn always_triggered(self) -> bool {
        matches!(self, Scope::Branch | Scope::Permanent)
    }

    pub fn is_session_like(self) -> bool {
        matches!(self, Scope::Session | Scope::SingleUse)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Session => "session",
            Scope::Branch => "branch",
            Scope::Permanent => "permanent",
            Scope::SingleUse => "single_use",
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(Scope::Session),
            "branch" => Ok(Scope::Branch),
            "permanent" => Ok(Scope::Permanent),
            "single_use" => Ok(Scope::SingleUse),
            other => Err(format!("unknown scope: {other}")),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
