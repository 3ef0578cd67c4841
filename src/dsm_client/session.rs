use serde::Serialize;

/// Login state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

/// Authentication state of one client instance.
///
/// Either both fields are set or neither is; the only transitions are
/// [`Session::establish`] and [`Session::clear`].
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Option<String>,
    authenticated: bool,
}

impl Session {
    pub fn establish(&mut self, token: String) {
        self.token = Some(token);
        self.authenticated = true;
    }

    pub fn clear(&mut self) {
        self.token = None;
        self.authenticated = false;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn state(&self) -> SessionState {
        if self.authenticated {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }
}
