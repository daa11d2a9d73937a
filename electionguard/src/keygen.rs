use crate::*;
use log::{info, warn};

/// The public outcome of a successful key ceremony
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeyCeremonyResults {
    pub guardians: Vec<Guardian>,
}

impl KeyCeremonyResults {
    pub fn make_election_initialized(
        &self,
        group: &GroupContext,
        config: ElectionConfig,
    ) -> Result<ElectionInitialized, Error> {
        ElectionInitialized::new(group, config, self.guardians.clone())
    }
}

/// Run the key ceremony between trustees held in memory.
///
/// Public keys are exchanged first, then every trustee sends each other trustee its
/// encrypted polynomial share. A share that fails to decrypt or verify is retried in
/// the clear; if that fails too the whole ceremony fails.
pub fn key_ceremony_exchange(
    group: &GroupContext,
    trustees: &mut [KeyCeremonyTrustee],
) -> Result<KeyCeremonyResults, Error> {
    let n = trustees.len();
    let public_keys: Vec<Guardian> = trustees.iter().map(|t| t.public_keys()).collect();

    for trustee in trustees.iter_mut() {
        for keys in &public_keys {
            if keys.guardian_id != trustee.id {
                trustee.receive_public_keys(group, keys.clone())?;
            }
        }
    }

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let receiver = trustees[j].id.clone();
            let encrypted = trustees[i].encrypted_key_share_for(group, &receiver)?;
            if let Err(e) = trustees[j].receive_encrypted_key_share(group, &encrypted) {
                warn!(
                    "encrypted share from {} to {} failed ({}), trying the plain share",
                    trustees[i].id, receiver, e
                );
                let plain = trustees[i].key_share_for(group, &receiver)?;
                trustees[j].receive_key_share(group, &plain)?;
            }
        }
    }

    for trustee in trustees.iter() {
        trustee.check_complete(n as u32)?;
    }

    info!("key ceremony complete for {} guardians", n);
    Ok(KeyCeremonyResults {
        guardians: public_keys,
    })
}

/// Create trustees, run the exchange and build the initialized election.
/// Returns the election record and one decrypting trustee per guardian.
pub fn run_key_ceremony<R: rand::RngCore + rand::CryptoRng>(
    group: &GroupContext,
    config: ElectionConfig,
    rng: &mut R,
) -> Result<(ElectionInitialized, Vec<DecryptingTrustee>), Error> {
    let mut trustees = Vec::with_capacity(config.number_of_guardians as usize);
    for x in 1..=config.number_of_guardians {
        trustees.push(KeyCeremonyTrustee::new(
            group,
            &config.parameter_base_hash,
            &format!("guardian{}", x),
            x,
            config.quorum,
            rng,
        )?);
    }

    let results = key_ceremony_exchange(group, &mut trustees)?;
    let init = results.make_election_initialized(group, config)?;
    let decrypting = trustees.iter().map(|t| t.decrypting_trustee()).collect();
    Ok((init, decrypting))
}

#[cfg(test)]
mod tests {
    use crate::tests::test_manifest;
    use crate::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn ceremony_produces_joint_key() {
        let group = GroupContext::tiny();
        let config = ElectionConfig::new(&group, &test_manifest(), 3, 2, false, vec![]).unwrap();
        let mut rng = ChaCha20Rng::from_seed([1u8; 32]);
        let (init, trustees) = run_key_ceremony(&group, config, &mut rng).unwrap();

        assert_eq!(init.guardians.len(), 3);
        assert_eq!(trustees.len(), 3);
        let keys = trustees.iter().map(|t| &t.public_key);
        assert_eq!(init.joint_public_key.0, group.mult_p_all(keys));
        for trustee in &trustees {
            assert_eq!(trustee.key_shares.len(), 2);
        }
    }

    #[test]
    fn ceremony_fails_without_every_share() {
        let group = GroupContext::tiny();
        let hp = parameter_base_hash(&group);
        let mut trustees: Vec<KeyCeremonyTrustee> = (1..=3)
            .map(|x| {
                KeyCeremonyTrustee::from_seed(&group, &hp, &format!("g{}", x), x, 2, [x as u8; 32])
                    .unwrap()
            })
            .collect();

        let keys: Vec<Guardian> = trustees.iter().map(|t| t.public_keys()).collect();
        for t in trustees.iter_mut() {
            for k in &keys {
                if k.guardian_id != t.id {
                    t.receive_public_keys(&group, k.clone()).unwrap();
                }
            }
        }

        // g3 never receives a share from g1
        for (i, j) in &[(0, 1), (0, 2), (1, 0), (1, 2), (2, 0), (2, 1)] {
            if (*i, *j) == (0, 2) {
                continue;
            }
            let to = trustees[*j].id.clone();
            let share = trustees[*i].encrypted_key_share_for(&group, &to).unwrap();
            trustees[*j].receive_encrypted_key_share(&group, &share).unwrap();
        }
        assert!(trustees[0].check_complete(3).is_ok());
        assert!(matches!(
            trustees[2].check_complete(3),
            Err(Error::WrongNumberOfKeyShares(_, 1, 2))
        ));
    }

    #[test]
    fn missing_guardian_fails() {
        let group = GroupContext::tiny();
        let hp = parameter_base_hash(&group);
        let mut trustee = KeyCeremonyTrustee::from_seed(&group, &hp, "g1", 1, 2, [1u8; 32]).unwrap();
        let other = KeyCeremonyTrustee::from_seed(&group, &hp, "g2", 2, 2, [2u8; 32]).unwrap();
        trustee.receive_public_keys(&group, other.public_keys()).unwrap();
        assert!(matches!(
            trustee.check_complete(3),
            Err(Error::WrongNumberOfPublicKeys(_, 2, 3))
        ));
    }

    #[test]
    fn mismatched_quorum_fails() {
        let group = GroupContext::tiny();
        let hp = parameter_base_hash(&group);
        let mut trustees = vec![
            KeyCeremonyTrustee::from_seed(&group, &hp, "g1", 1, 2, [1u8; 32]).unwrap(),
            KeyCeremonyTrustee::from_seed(&group, &hp, "g2", 2, 3, [2u8; 32]).unwrap(),
        ];
        assert!(matches!(
            key_ceremony_exchange(&group, &mut trustees),
            Err(Error::InvalidPublicKeys(_, _))
        ));
    }
}
