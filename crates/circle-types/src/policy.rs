/// Decides who the hidden super admin is and what everyone else may see.
///
/// Built once at startup from configuration and shared through the
/// application state. Every endpoint that returns users applies
/// [`AccessPolicy::is_visible`] (or passes [`AccessPolicy::hidden_email`]
/// down to the query) so the super admin never shows up in lists or counts.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    super_admin_email: Option<String>,
}

impl AccessPolicy {
    pub fn new(super_admin_email: Option<&str>) -> Self {
        let super_admin_email = super_admin_email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());
        Self { super_admin_email }
    }

    pub fn is_super_admin(&self, email: &str) -> bool {
        self.super_admin_email
            .as_deref()
            .is_some_and(|sa| sa.eq_ignore_ascii_case(email.trim()))
    }

    pub fn is_visible(&self, email: &str) -> bool {
        !self.is_super_admin(email)
    }

    /// Email to exclude from user queries, if a super admin is configured.
    pub fn hidden_email(&self) -> Option<&str> {
        self.super_admin_email.as_deref()
    }

    pub fn retain_visible<T>(&self, items: Vec<T>, email_of: impl Fn(&T) -> &str) -> Vec<T> {
        items
            .into_iter()
            .filter(|item| self.is_visible(email_of(item)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitively() {
        let policy = AccessPolicy::new(Some("Root@Circle.test "));
        assert!(policy.is_super_admin("root@circle.test"));
        assert!(policy.is_super_admin("ROOT@circle.test"));
        assert!(!policy.is_super_admin("member@circle.test"));
        assert_eq!(policy.hidden_email(), Some("root@circle.test"));
    }

    #[test]
    fn unconfigured_policy_hides_nobody() {
        let policy = AccessPolicy::new(None);
        assert!(!policy.is_super_admin(""));
        assert!(policy.is_visible("anyone@circle.test"));
        assert_eq!(AccessPolicy::new(Some("  ")).hidden_email(), None);
    }

    #[test]
    fn retain_visible_drops_only_super_admin() {
        let policy = AccessPolicy::new(Some("root@circle.test"));
        let emails = vec!["a@circle.test", "root@circle.test", "b@circle.test"];
        let kept = policy.retain_visible(emails, |e| e);
        assert_eq!(kept, vec!["a@circle.test", "b@circle.test"]);
    }
}
