use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kacaf_auth::PrincipalId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Support,
    Oppose,
    Abstain,
}

/// A non-binding opinion: a vote on a resolution or a review of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opinion {
    pub stance: Stance,
    #[serde(default)]
    pub note: Option<String>,
}

impl Opinion {
    pub fn new(stance: Stance) -> Self {
        Self { stance, note: None }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryEntry {
    pub principal: PrincipalId,
    pub opinion: Opinion,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryTally {
    pub support: u32,
    pub oppose: u32,
    pub abstain: u32,
}

impl AdvisoryTally {
    pub fn from_entries(entries: &[AdvisoryEntry]) -> Self {
        entries.iter().fold(Self::default(), |mut tally, entry| {
            match entry.opinion.stance {
                Stance::Support => tally.support += 1,
                Stance::Oppose => tally.oppose += 1,
                Stance::Abstain => tally.abstain += 1,
            }
            tally
        })
    }

    pub fn total(&self) -> u32 {
        self.support + self.oppose + self.abstain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_each_stance() {
        let now = Utc::now();
        let entries: Vec<_> = [Stance::Support, Stance::Support, Stance::Oppose, Stance::Abstain]
            .into_iter()
            .map(|stance| AdvisoryEntry {
                principal: PrincipalId::new(),
                opinion: Opinion::new(stance),
                recorded_at: now,
            })
            .collect();

        let tally = AdvisoryTally::from_entries(&entries);
        assert_eq!(
            tally,
            AdvisoryTally {
                support: 2,
                oppose: 1,
                abstain: 1
            }
        );
        assert_eq!(tally.total(), 4);
    }
}
