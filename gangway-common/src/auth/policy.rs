use super::{AllowedAuthMethods, AuthMethod};

/// What the session knows about the credential bundle when it asks whether
/// an authentication attempt may proceed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyContext {
    pub has_password: bool,
    pub has_private_key: bool,
    pub requested_keyboard_interactive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Ok,
    Violation(AuthMethod),
}

/// Decides whether the methods implied by `ctx` are permitted by the
/// server-side allow-list. Rules are checked in order; the first violation
/// wins. A password-only bundle is still acceptable when the server allows
/// keyboard-interactive, since the password can be submitted through a
/// prompt round instead.
pub fn evaluate(allowed: &AllowedAuthMethods, ctx: PolicyContext) -> PolicyDecision {
    if ctx.requested_keyboard_interactive && !allowed.contains(AuthMethod::KeyboardInteractive) {
        return PolicyDecision::Violation(AuthMethod::KeyboardInteractive);
    }
    if ctx.has_private_key && !allowed.contains(AuthMethod::PublicKey) {
        return PolicyDecision::Violation(AuthMethod::PublicKey);
    }
    if ctx.has_password
        && !allowed.contains(AuthMethod::Password)
        && !allowed.contains(AuthMethod::KeyboardInteractive)
    {
        return PolicyDecision::Violation(AuthMethod::Password);
    }
    PolicyDecision::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(methods: &[AuthMethod]) -> AllowedAuthMethods {
        AllowedAuthMethods::new(methods.to_vec())
    }

    #[test]
    fn test_default_allows_everything() {
        let decision = evaluate(
            &AllowedAuthMethods::default(),
            PolicyContext {
                has_password: true,
                has_private_key: true,
                requested_keyboard_interactive: true,
            },
        );
        assert_eq!(decision, PolicyDecision::Ok);
    }

    #[test]
    fn test_keyboard_interactive_request_blocked() {
        let decision = evaluate(
            &allowed(&[AuthMethod::Password]),
            PolicyContext {
                has_password: true,
                requested_keyboard_interactive: true,
                ..Default::default()
            },
        );
        assert_eq!(
            decision,
            PolicyDecision::Violation(AuthMethod::KeyboardInteractive)
        );
    }

    #[test]
    fn test_key_blocked_when_publickey_disallowed() {
        let decision = evaluate(
            &allowed(&[AuthMethod::Password]),
            PolicyContext {
                has_private_key: true,
                ..Default::default()
            },
        );
        assert_eq!(decision, PolicyDecision::Violation(AuthMethod::PublicKey));
    }

    #[test]
    fn test_password_blocked_only_without_keyboard_interactive() {
        let ctx = PolicyContext {
            has_password: true,
            ..Default::default()
        };
        assert_eq!(
            evaluate(&allowed(&[AuthMethod::PublicKey]), ctx),
            PolicyDecision::Violation(AuthMethod::Password)
        );
        // Password can ride through a keyboard-interactive round.
        assert_eq!(
            evaluate(
                &allowed(&[AuthMethod::PublicKey, AuthMethod::KeyboardInteractive]),
                ctx
            ),
            PolicyDecision::Ok
        );
    }

    #[test]
    fn test_allow_list_deduplicates() {
        let allowed = AllowedAuthMethods::new(vec![
            AuthMethod::Password,
            AuthMethod::Password,
            AuthMethod::PublicKey,
        ]);
        assert_eq!(allowed.iter().count(), 2);
    }
}
