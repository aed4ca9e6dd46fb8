//! Object key scheme: `{owner}/{group}/{file}`.
//!
//! Nothing else in the crate builds object keys or prefixes by hand.

use uuid::Uuid;

/// Prefix shared by every object of one group upload.
pub fn group_prefix(owner_id: Uuid, group_id: Uuid) -> String {
    format!("{owner_id}/{group_id}")
}

pub fn object_key(owner_id: Uuid, group_id: Uuid, file_id: Uuid) -> String {
    format!("{}/{file_id}", group_prefix(owner_id, group_id))
}

/// Prefix for listing; the trailing `/` keeps `{owner}` from matching
/// another owner whose id merely starts the same way.
pub fn listing_prefix(prefix: &str) -> String {
    format!("{prefix}/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn key_extends_group_prefix() {
        let (o, g, f) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let key = object_key(o, g, f);
        assert_eq!(key, format!("{o}/{g}/{f}"));
        assert!(key.starts_with(&listing_prefix(&group_prefix(o, g))));
        assert_eq!(key, object_key(o, g, f));
    }

    #[test]
    fn distinct_triples_never_collide() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let mut seen = HashSet::new();
        for &o in &ids {
            for &g in &ids {
                for &f in &ids {
                    assert!(seen.insert(object_key(o, g, f)));
                }
            }
        }
        assert_eq!(seen.len(), 64);
    }
}
