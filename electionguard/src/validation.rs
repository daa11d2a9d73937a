use crate::*;
use std::collections::HashSet;

/// Check that a manifest is internally consistent
pub fn validate_manifest(manifest: &Manifest) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let units: HashSet<&str> = manifest
        .geopolitical_units
        .iter()
        .map(|g| g.geopolitical_unit_id.as_str())
        .collect();

    for style in &manifest.ballot_styles {
        for unit in &style.geopolitical_unit_ids {
            if !units.contains(unit.as_str()) {
                errors.push(ValidationError::UnknownGeopoliticalUnit(
                    style.ballot_style_id.clone(),
                    unit.clone(),
                ));
            }
        }
    }

    let mut contest_ids = HashSet::new();
    let mut contest_seqs = HashSet::new();
    for contest in &manifest.contests {
        if !contest_ids.insert(contest.contest_id.as_str()) {
            errors.push(ValidationError::DuplicateContestId(contest.contest_id.clone()));
        }
        if !contest_seqs.insert(contest.sequence_order) {
            errors.push(ValidationError::DuplicateContestSequence(contest.sequence_order));
        }
        if contest.votes_allowed == 0 || contest.option_limit == 0 {
            errors.push(ValidationError::InvalidVoteLimit(contest.contest_id.clone()));
        }
        if !units.contains(contest.geopolitical_unit_id.as_str()) {
            errors.push(ValidationError::ContestUnknownGeopoliticalUnit(
                contest.contest_id.clone(),
                contest.geopolitical_unit_id.clone(),
            ));
        }

        let mut selection_ids = HashSet::new();
        let mut selection_seqs = HashSet::new();
        for selection in &contest.selections {
            if !selection_ids.insert(selection.selection_id.as_str()) {
                errors.push(ValidationError::DuplicateSelectionId(
                    contest.contest_id.clone(),
                    selection.selection_id.clone(),
                ));
            }
            if !selection_seqs.insert(selection.sequence_order) {
                errors.push(ValidationError::DuplicateSelectionSequence(
                    contest.contest_id.clone(),
                    selection.sequence_order,
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check a plaintext ballot against the manifest before encryption.
///
/// Vote limits are deliberately not enforced; overvotes are encrypted as such.
pub fn validate_ballot(
    manifest: &Manifest,
    ballot: &PlaintextBallot,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let id = &ballot.ballot_id;

    let style = match manifest.ballot_style(&ballot.ballot_style_id) {
        Some(style) => style,
        None => {
            return Err(vec![ValidationError::UnknownBallotStyle(
                id.clone(),
                ballot.ballot_style_id.clone(),
            )])
        }
    };

    let mut seen_contests = HashSet::new();
    for contest in &ballot.contests {
        if !seen_contests.insert(contest.contest_id.as_str()) {
            errors.push(ValidationError::DuplicateContest(
                id.clone(),
                contest.contest_id.clone(),
            ));
        }

        let mcontest = match manifest.contest(&contest.contest_id) {
            Some(c) => c,
            None => {
                errors.push(ValidationError::UnknownContest(
                    id.clone(),
                    contest.contest_id.clone(),
                ));
                continue;
            }
        };
        if mcontest.sequence_order != contest.sequence_order {
            errors.push(ValidationError::ContestSequenceMismatch(
                id.clone(),
                contest.contest_id.clone(),
                contest.sequence_order,
                mcontest.sequence_order,
            ));
        }
        if !style
            .geopolitical_unit_ids
            .contains(&mcontest.geopolitical_unit_id)
        {
            errors.push(ValidationError::ContestNotInStyle(
                id.clone(),
                contest.contest_id.clone(),
                style.ballot_style_id.clone(),
            ));
        }

        let mut seen_ids = HashSet::new();
        let mut seen_seqs = HashSet::new();
        for selection in &contest.selections {
            if !seen_ids.insert(selection.selection_id.as_str()) {
                errors.push(ValidationError::DuplicateSelection(
                    id.clone(),
                    contest.contest_id.clone(),
                    selection.selection_id.clone(),
                ));
            }
            if !seen_seqs.insert(selection.sequence_order) {
                errors.push(ValidationError::DuplicateBallotSelectionSequence(
                    id.clone(),
                    contest.contest_id.clone(),
                    selection.sequence_order,
                ));
            }
            match mcontest.selection(&selection.selection_id) {
                None => errors.push(ValidationError::UnknownSelection(
                    id.clone(),
                    contest.contest_id.clone(),
                    selection.selection_id.clone(),
                )),
                Some(mselection) if mselection.sequence_order != selection.sequence_order => {
                    errors.push(ValidationError::SelectionSequenceMismatch(
                        id.clone(),
                        selection.selection_id.clone(),
                        selection.sequence_order,
                        mselection.sequence_order,
                    ))
                }
                Some(_) => {}
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::{test_ballot, test_manifest};
    use crate::*;

    #[test]
    fn valid_manifest_and_ballot() {
        let manifest = test_manifest();
        validate_manifest(&manifest).unwrap();
        validate_ballot(&manifest, &test_ballot("b1", &[("president", "alice")])).unwrap();
    }

    #[test]
    fn manifest_errors() {
        let mut manifest = test_manifest();
        let dup = manifest.contests[0].clone();
        manifest.contests.push(dup);
        manifest.contests[1].selections[1].sequence_order = 1;
        manifest.ballot_styles[0].geopolitical_unit_ids.push("atlantis".to_string());

        let errors = validate_manifest(&manifest).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateContestId("president".to_string())));
        assert!(errors.contains(&ValidationError::DuplicateContestSequence(1)));
        assert!(errors.contains(&ValidationError::DuplicateSelectionSequence(
            "council".to_string(),
            1
        )));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownGeopoliticalUnit(_, u) if u == "atlantis")));
    }

    #[test]
    fn ballot_errors() {
        let manifest = test_manifest();

        let mut ballot = test_ballot("b2", &[("president", "alice")]);
        ballot.ballot_style_id = "nope".to_string();
        let errors = validate_ballot(&manifest, &ballot).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().starts_with("Ballot.A.1"));

        let mut ballot = test_ballot("b3", &[("president", "alice")]);
        let dup = ballot.contests[0].clone();
        ballot.contests.push(dup);
        ballot.contests[0].selections[0].selection_id = "zorro".to_string();
        ballot.contests[0].selections[1].sequence_order = 1;
        let errors = validate_ballot(&manifest, &ballot).unwrap_err();
        let rules: Vec<String> = errors
            .iter()
            .map(|e| e.to_string().split(':').next().unwrap_or("").to_string())
            .collect();
        assert!(rules.contains(&"Ballot.B.1".to_string()));
        assert!(rules.contains(&"Ballot.A.4".to_string()));
        assert!(rules.contains(&"Ballot.B.3".to_string()));
        assert!(rules.contains(&"Ballot.A.4.1".to_string()));
    }

    #[test]
    fn overvotes_are_not_validation_errors() {
        let manifest = test_manifest();
        let ballot = test_ballot("b4", &[("president", "alice"), ("president", "bob")]);
        validate_ballot(&manifest, &ballot).unwrap();
    }

    #[test]
    fn contest_not_in_style() {
        let manifest = test_manifest();
        let mut ballot = test_ballot("b5", &[("council", "dave")]);
        ballot.ballot_style_id = "style-county".to_string();
        let errors = validate_ballot(&manifest, &ballot).unwrap_err();
        assert!(errors[0].to_string().starts_with("Ballot.A.3"));
    }
}
