use std::borrow::Cow;
use std::collections::HashMap;

/// A source of environment variables, abstracted so that resolution can be
/// tested hermetically against a plain map.
pub trait EnvVar {
    fn read(&self, name: &str) -> Option<Cow<'_, str>>;
}

pub struct SystemEnvVars;

impl EnvVar for SystemEnvVars {
    fn read(&self, name: &str) -> Option<Cow<'_, str>> {
        std::env::var(name).ok().map(Cow::Owned)
    }
}

impl EnvVar for HashMap<String, String> {
    fn read(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|value| Cow::Borrowed(value.as_str()))
    }
}

impl<'a, const N: usize> EnvVar for [(&'a str, &'a str); N] {
    fn read(&self, name: &str) -> Option<Cow<'_, str>> {
        self.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| Cow::Borrowed(*value))
    }
}

impl EnvVar for () {
    fn read(&self, _name: &str) -> Option<Cow<'_, str>> {
        None
    }
}
