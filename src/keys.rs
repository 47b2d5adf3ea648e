//! Redis key derivation.

/// Derive the key under which a member's assignment document is stored.
///
/// The layout is `assignment:{group_id}:{member_id}`. No escaping is
/// performed; callers must not use `:` inside either id. Channel names are
/// used verbatim as stream keys and need no derivation.
pub fn key_for_assignment(group_id: &str, member_id: &str) -> String {
    format!("assignment:{}:{}", group_id, member_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_for_assignment() {
        assert_eq!(
            key_for_assignment("billing", "member-1"),
            "assignment:billing:member-1"
        );
    }

    #[test]
    fn test_key_is_unique_per_pair() {
        assert_ne!(
            key_for_assignment("a", "b"),
            key_for_assignment("b", "a")
        );
    }
}
