//! Role checks for admin-only chat commands.

/// Whether a member holding `held` may run a command gated on `required`.
/// An empty requirement list leaves the command open to everyone.
pub fn roles_satisfy<S: AsRef<str>>(required: &[String], held: &[S]) -> bool {
    required.is_empty()
        || held
            .iter()
            .any(|role| required.iter().any(|r| r.eq_ignore_ascii_case(role.as_ref())))
}
