mod policy;

use std::fmt::{Display, Formatter};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use policy::{evaluate, PolicyContext, PolicyDecision};

/// The closed set of SSH authentication methods the gateway understands.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, JsonSchema)]
pub enum AuthMethod {
    #[serde(rename = "password")]
    Password,
    #[serde(rename = "keyboard-interactive")]
    KeyboardInteractive,
    #[serde(rename = "publickey")]
    PublicKey,
}

impl AuthMethod {
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::KeyboardInteractive => "keyboard-interactive",
            Self::PublicKey => "publickey",
        }
    }
}

impl Display for AuthMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Ordered server-side allow-list of authentication methods.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, JsonSchema)]
#[serde(transparent)]
pub struct AllowedAuthMethods(Vec<AuthMethod>);

impl AllowedAuthMethods {
    pub fn new(methods: Vec<AuthMethod>) -> Self {
        let mut seen = Vec::with_capacity(methods.len());
        for method in methods {
            if !seen.contains(&method) {
                seen.push(method);
            }
        }
        Self(seen)
    }

    pub fn contains(&self, method: AuthMethod) -> bool {
        self.0.contains(&method)
    }

    pub fn iter(&self) -> impl Iterator<Item = AuthMethod> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for AllowedAuthMethods {
    fn default() -> Self {
        Self(vec![
            AuthMethod::Password,
            AuthMethod::KeyboardInteractive,
            AuthMethod::PublicKey,
        ])
    }
}
