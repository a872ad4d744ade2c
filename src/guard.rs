use crate::{models::Identity, session::SessionStatus};

pub const LOGIN_ROUTE: &str = "/login";
pub const ADMIN_ROUTE: &str = "/admin";

/// Outcome of guarding a view of type `V`.
#[derive(Debug, PartialEq, Eq)]
pub enum Guarded<V> {
    /// Session not resolved yet; show a placeholder, decide nothing.
    Pending,
    Redirect(&'static str),
    Render(V),
}

/// Renders `view` only for a signed-in identity.
pub fn protect<V>(status: &SessionStatus, view: impl FnOnce(&Identity) -> V) -> Guarded<V> {
    match status {
        SessionStatus::Loading => Guarded::Pending,
        SessionStatus::SignedOut => Guarded::Redirect(LOGIN_ROUTE),
        SessionStatus::SignedIn(identity) => Guarded::Render(view(identity)),
    }
}

/// Where the login view sends a visitor who is already signed in.
pub fn login_redirect(status: &SessionStatus) -> Option<&'static str> {
    match status {
        SessionStatus::SignedIn(_) => Some(ADMIN_ROUTE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn admin() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: Some("admin@toko.id".into()),
        }
    }

    #[test]
    fn loading_renders_neither_view_nor_redirect() {
        let mut rendered = false;
        let outcome = protect(&SessionStatus::Loading, |_| rendered = true);
        assert_eq!(outcome, Guarded::Pending);
        assert!(!rendered);
    }

    #[test]
    fn signed_out_visitors_go_to_login() {
        assert_eq!(
            protect(&SessionStatus::SignedOut, |_| "dashboard"),
            Guarded::Redirect(LOGIN_ROUTE)
        );
    }

    #[test]
    fn signed_in_admins_see_the_view() {
        let identity = admin();
        let outcome = protect(&SessionStatus::SignedIn(identity.clone()), |who| who.id);
        assert_eq!(outcome, Guarded::Render(identity.id));
    }

    #[test]
    fn login_page_bounces_only_signed_in_visitors() {
        assert_eq!(login_redirect(&SessionStatus::SignedIn(admin())), Some(ADMIN_ROUTE));
        assert_eq!(login_redirect(&SessionStatus::SignedOut), None);
        assert_eq!(login_redirect(&SessionStatus::Loading), None);
    }
}
