//! Human-readable user identifiers derived from email addresses.
//!
//! The base candidate is the local part of the address with everything
//! outside `[0-9a-zA-Z]` removed. Collisions are resolved by appending a
//! random numeric suffix that grows by one digit per retry.

use async_trait::async_trait;
use rand::Rng;
use tracing::{error, warn};

use crate::error::{AdapterError, AdapterResult};

/// Suffixed retries after the bare base candidate; the n-th retry appends n digits.
pub const MAX_SUFFIX_ATTEMPTS: usize = 10;

/// Existence check against whatever store holds user identifiers.
#[async_trait]
pub trait UsernameLookup: Send + Sync {
    async fn user_id_exists(&self, id: &str) -> AdapterResult<bool>;
}

pub fn base_username(email: &str) -> String {
    let local = email.split_once('@').map_or(email, |(local, _)| local);
    local.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// `len` uniformly random decimal digits, leading zeros allowed.
pub fn random_digits<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Probes `base`, then `base` plus 1..=10 random digits, returning the first
/// identifier the lookup reports as free.
///
/// An empty base is never accepted on its own; generation goes straight to
/// suffix-only identifiers. The check is not atomic with the later insert,
/// so the store's uniqueness constraint stays the final arbiter.
pub async fn resolve_unique_username<L, R>(
    lookup: &L,
    base: &str,
    rng: &mut R,
) -> AdapterResult<String>
where
    L: UsernameLookup + ?Sized,
    R: Rng + Send + ?Sized,
{
    if !base.is_empty() && !lookup.user_id_exists(base).await? {
        return Ok(base.to_string());
    }

    for digits in 1..=MAX_SUFFIX_ATTEMPTS {
        let candidate = format!("{base}{}", random_digits(&mut *rng, digits));
        if !lookup.user_id_exists(&candidate).await? {
            warn!(base, %candidate, attempt = digits, "username collision resolved with suffix");
            return Ok(candidate);
        }
        warn!(%candidate, attempt = digits, "username candidate taken");
    }

    error!(base, attempts = MAX_SUFFIX_ATTEMPTS, "username space exhausted");
    Err(AdapterError::UsernameExhausted {
        base: base.to_string(),
        attempts: MAX_SUFFIX_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Reports the first `taken` probes as existing and records every probe.
    struct ScriptedLookup {
        taken: usize,
        probes: Mutex<Vec<String>>,
    }

    impl ScriptedLookup {
        fn new(taken: usize) -> Self {
            Self {
                taken,
                probes: Mutex::new(Vec::new()),
            }
        }

        fn probes(&self) -> Vec<String> {
            self.probes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UsernameLookup for ScriptedLookup {
        async fn user_id_exists(&self, id: &str) -> AdapterResult<bool> {
            let mut probes = self.probes.lock().unwrap();
            probes.push(id.to_string());
            Ok(probes.len() <= self.taken)
        }
    }

    struct SetLookup(HashSet<String>);

    #[async_trait]
    impl UsernameLookup for SetLookup {
        async fn user_id_exists(&self, id: &str) -> AdapterResult<bool> {
            Ok(self.0.contains(id))
        }
    }

    #[test]
    fn base_username_strips_domain_and_punctuation() {
        assert_eq!(base_username("john.doe@example.com"), "johndoe");
        assert_eq!(base_username("a_b-c+tag@x.io"), "abctag");
        assert_eq!(base_username("Mixed.Case99@host"), "MixedCase99");
        assert_eq!(base_username("first@second@host"), "first");
    }

    #[test]
    fn base_username_drops_non_ascii_letters() {
        assert_eq!(base_username("jürgen@example.de"), "jrgen");
    }

    #[test]
    fn base_username_of_empty_local_part_is_empty() {
        assert_eq!(base_username("@example.com"), "");
        assert_eq!(base_username("...@example.com"), "");
    }

    #[test]
    fn random_digits_has_requested_length_and_only_digits() {
        let mut rng = StdRng::seed_from_u64(1);
        for len in 0..=10 {
            let d = random_digits(&mut rng, len);
            assert_eq!(d.len(), len);
            assert!(d.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn free_base_is_used_as_is() {
        let lookup = ScriptedLookup::new(0);
        let mut rng = StdRng::seed_from_u64(7);
        let id = resolve_unique_username(&lookup, "alice", &mut rng)
            .await
            .unwrap();
        assert_eq!(id, "alice");
        assert_eq!(lookup.probes(), vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn suffix_length_matches_attempt_number() {
        for taken in 1..MAX_SUFFIX_ATTEMPTS {
            let lookup = ScriptedLookup::new(taken);
            let mut rng = StdRng::seed_from_u64(taken as u64);
            let id = resolve_unique_username(&lookup, "bob", &mut rng)
                .await
                .unwrap();

            let suffix = id.strip_prefix("bob").expect("keeps base prefix");
            assert_eq!(suffix.len(), taken, "taken = {taken}");
            assert!(suffix.chars().all(|c| c.is_ascii_digit()));

            let probes = lookup.probes();
            assert_eq!(probes.len(), taken + 1);
            for (i, probe) in probes.iter().enumerate() {
                assert_eq!(probe.len(), "bob".len() + i);
            }
        }
    }

    #[tokio::test]
    async fn suffixes_follow_the_rng_sequence() {
        let lookup = ScriptedLookup::new(3);
        let mut rng = StdRng::seed_from_u64(99);
        let id = resolve_unique_username(&lookup, "carol", &mut rng)
            .await
            .unwrap();

        let mut expected = StdRng::seed_from_u64(99);
        let candidates: Vec<String> = (1..=3)
            .map(|n| format!("carol{}", random_digits(&mut expected, n)))
            .collect();
        assert_eq!(lookup.probes()[1..], candidates[..]);
        assert_eq!(id.len(), "carol".len() + 3);
        assert_eq!(id, lookup.probes()[3]);
    }

    #[tokio::test]
    async fn exhausting_every_attempt_is_fatal() {
        let lookup = ScriptedLookup::new(usize::MAX);
        let mut rng = StdRng::seed_from_u64(3);
        let err = resolve_unique_username(&lookup, "dave", &mut rng)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            AdapterError::UsernameExhausted { ref base, attempts } if base == "dave" && attempts == 10
        ));
        let probes = lookup.probes();
        assert_eq!(probes.len(), 1 + MAX_SUFFIX_ATTEMPTS);
        assert_eq!(probes.last().unwrap().len(), "dave".len() + 10);
    }

    #[tokio::test]
    async fn empty_base_goes_straight_to_suffix_only_ids() {
        let lookup = ScriptedLookup::new(0);
        let mut rng = StdRng::seed_from_u64(5);
        let id = resolve_unique_username(&lookup, "", &mut rng).await.unwrap();
        assert_eq!(id.len(), 1);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(lookup.probes(), vec![id]);
    }

    #[tokio::test]
    async fn existing_ids_are_skipped() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut probe_rng = StdRng::seed_from_u64(11);
        let first = format!("erin{}", random_digits(&mut probe_rng, 1));
        let lookup = SetLookup(["erin".to_string(), first.clone()].into_iter().collect());

        let id = resolve_unique_username(&lookup, "erin", &mut rng)
            .await
            .unwrap();
        assert_ne!(id, "erin");
        assert_ne!(id, first);
        assert_eq!(id.len(), "erin".len() + 2);
    }
}
