use std::collections::HashMap;

use points_core::{User, UserId};

/// Normalizes a person name for matching: strips half-width and full-width
/// spaces, lowercases the remainder. Two names that differ only by spacing
/// or case collide to the same key.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ' ' && *c != '\u{3000}')
        .collect::<String>()
        .to_lowercase()
}

/// A point-in-time index from normalized name to user id, rebuilt once per
/// polling cycle from the active-user set rather than kept live — access
/// events arrive in bursts, not a steady stream, so a fresh snapshot per
/// cycle is simpler than incremental maintenance and cheap enough at this
/// scale.
pub struct NameIndex {
    by_name: HashMap<String, UserId>,
}

impl NameIndex {
    pub fn build(users: &[User]) -> Self {
        let mut by_name = HashMap::with_capacity(users.len());
        for user in users {
            by_name.insert(normalize_name(&user.full_name()), user.id);
        }
        Self { by_name }
    }

    pub fn resolve(&self, event_name: &str) -> Option<UserId> {
        self.by_name.get(&normalize_name(event_name)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_half_and_full_width_spaces() {
        assert_eq!(normalize_name("Yamada Taro"), "yamadataro");
        assert_eq!(normalize_name("山田\u{3000}太郎"), "山田太郎");
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(normalize_name("TARO"), normalize_name("taro"));
    }

    proptest::proptest! {
        /// Normalizing an already-normalized name must be a no-op, for any
        /// input string — the matcher relies on this to compare a freshly
        /// normalized event name against a freshly normalized index key.
        #[test]
        fn normalize_is_idempotent(name in ".*") {
            let once = normalize_name(&name);
            let twice = normalize_name(&once);
            proptest::prop_assert_eq!(once, twice);
        }
    }
}
