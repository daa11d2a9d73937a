use crate::*;

/// The election manifest: the contests, their options, and which ballot styles carry them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Manifest {
    pub election_scope_id: String,
    pub spec_version: String,
    pub geopolitical_units: Vec<GeopoliticalUnit>,
    pub ballot_styles: Vec<BallotStyle>,
    pub contests: Vec<ContestDescription>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeopoliticalUnit {
    pub geopolitical_unit_id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BallotStyle {
    pub ballot_style_id: String,
    pub geopolitical_unit_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContestDescription {
    pub contest_id: String,
    pub sequence_order: u32,
    pub geopolitical_unit_id: String,
    /// Maximum number of votes across all selections
    pub votes_allowed: u32,
    /// Maximum number of votes on a single selection
    pub option_limit: u32,
    pub name: String,
    pub selections: Vec<SelectionDescription>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SelectionDescription {
    pub selection_id: String,
    pub sequence_order: u32,
    pub candidate_id: String,
}

impl Manifest {
    pub fn contest(&self, contest_id: &str) -> Option<&ContestDescription> {
        self.contests.iter().find(|c| c.contest_id == contest_id)
    }

    pub fn ballot_style(&self, ballot_style_id: &str) -> Option<&BallotStyle> {
        self.ballot_styles
            .iter()
            .find(|s| s.ballot_style_id == ballot_style_id)
    }

    /// Contests on a ballot style, in sequence order
    pub fn contests_for_style(&self, ballot_style_id: &str) -> Option<Vec<&ContestDescription>> {
        let style = self.ballot_style(ballot_style_id)?;
        let mut contests: Vec<&ContestDescription> = self
            .contests
            .iter()
            .filter(|c| style.geopolitical_unit_ids.contains(&c.geopolitical_unit_id))
            .collect();
        contests.sort_by_key(|c| c.sequence_order);
        Some(contests)
    }

    /// Canonical bytes hashed into H_M
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl ContestDescription {
    pub fn selection(&self, selection_id: &str) -> Option<&SelectionDescription> {
        self.selections
            .iter()
            .find(|s| s.selection_id == selection_id)
    }
}

/// The view of a manifest needed to tally and verify ballots
pub trait ManifestIF {
    fn contest_ids(&self) -> Vec<&str>;

    fn contest_limit(&self, contest_id: &str) -> Option<u32>;

    fn option_limit(&self, contest_id: &str) -> Option<u32>;

    /// Selection ids of a contest, empty if the contest is unknown
    fn selection_ids(&self, contest_id: &str) -> Vec<&str>;

    /// Contest ids on a ballot style, None if the style is unknown
    fn style_contest_ids(&self, ballot_style_id: &str) -> Option<Vec<&str>>;
}

impl ManifestIF for Manifest {
    fn contest_ids(&self) -> Vec<&str> {
        self.contests.iter().map(|c| c.contest_id.as_str()).collect()
    }

    fn contest_limit(&self, contest_id: &str) -> Option<u32> {
        self.contest(contest_id).map(|c| c.votes_allowed)
    }

    fn option_limit(&self, contest_id: &str) -> Option<u32> {
        self.contest(contest_id).map(|c| c.option_limit)
    }

    fn selection_ids(&self, contest_id: &str) -> Vec<&str> {
        match self.contest(contest_id) {
            Some(c) => c.selections.iter().map(|s| s.selection_id.as_str()).collect(),
            None => Vec::new(),
        }
    }

    fn style_contest_ids(&self, ballot_style_id: &str) -> Option<Vec<&str>> {
        self.contests_for_style(ballot_style_id)
            .map(|cs| cs.into_iter().map(|c| c.contest_id.as_str()).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::test_manifest;
    use crate::*;

    #[test]
    fn contests_for_style_are_filtered_and_sorted() {
        let manifest = test_manifest();
        let ids: Vec<&str> = manifest
            .contests_for_style("style-all")
            .unwrap()
            .iter()
            .map(|c| c.contest_id.as_str())
            .collect();
        assert_eq!(ids, vec!["president", "council", "measure"]);

        let ids = manifest.style_contest_ids("style-county").unwrap();
        assert_eq!(ids, vec!["president", "measure"]);
        assert!(manifest.style_contest_ids("nope").is_none());
    }

    #[test]
    fn manifest_bytes_round_trip() {
        let manifest = test_manifest();
        let bytes = manifest.to_bytes().unwrap();
        assert_eq!(Manifest::from_bytes(&bytes).unwrap(), manifest);
        assert_eq!(manifest.contest_limit("council"), Some(2));
        assert_eq!(manifest.selection_ids("measure"), vec!["yes", "no"]);
    }
}
