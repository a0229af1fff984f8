//! Provider lookup by name.
//!
//! Providers are registered once at startup as factories keyed by the name a
//! connection string carries (`scm:<name>:...`).

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use super::connection::{provider_name, provider_url};
use super::git::GitScmProvider;
use super::svn::{SvnLayout, SvnScmProvider};
use super::ScmProvider;
use crate::errors::{RegistryError, ScmError};

/// Everything a factory needs to build a provider for one working copy.
#[derive(Clone, Default)]
pub struct ProviderSettings {
    pub working_directory: PathBuf,
    /// Provider URL (the part of the connection after the provider name).
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Tracked remote for distributed backends.
    pub remote_name: Option<String>,
    /// Repository layout for centralized backends.
    pub svn_layout: SvnLayout,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("working_directory", &self.working_directory)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("remote_name", &self.remote_name)
            .field("svn_layout", &self.svn_layout)
            .finish()
    }
}

type Factory = Box<dyn Fn(&ProviderSettings) -> Result<Box<dyn ScmProvider>, ScmError> + Send + Sync>;

/// Name-to-factory mapping for [`ScmProvider`]s.
#[derive(Default)]
pub struct ScmProviderRegistry {
    factories: BTreeMap<String, Factory>,
}

impl ScmProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `git` and `svn` backends.
    pub fn with_default_providers() -> Self {
        let mut registry = Self::new();
        registry.register("git", |settings| {
            let mut provider = GitScmProvider::new(&settings.working_directory);
            if let Some(remote) = &settings.remote_name {
                provider = provider.with_remote(remote);
            }
            if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
                provider = provider.with_credentials(user, pass);
            }
            Ok(Box::new(provider))
        });
        registry.register("svn", |settings| {
            let provider = SvnScmProvider::new(
                &settings.working_directory,
                &settings.url,
                settings.svn_layout.clone(),
            )
            .with_credentials(settings.username.clone(), settings.password.clone());
            Ok(Box::new(provider))
        });
        registry
    }

    /// Register (or replace) the factory for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ProviderSettings) -> Result<Box<dyn ScmProvider>, ScmError> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(provider = %name, "registered scm provider");
        self.factories.insert(name, Box::new(factory));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build the provider registered under `name`.
    pub fn create(&self, name: &str, settings: &ProviderSettings) -> Result<Box<dyn ScmProvider>, RegistryError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::NoSuchProvider(name.to_string()))?;
        Ok(factory(settings)?)
    }

    /// Build the provider a connection string names, filling in its URL
    /// when `settings` has none.
    pub fn for_connection(
        &self,
        connection: &str,
        settings: &ProviderSettings,
    ) -> Result<Box<dyn ScmProvider>, RegistryError> {
        let name = provider_name(connection)
            .ok_or_else(|| RegistryError::UnrecognisedConnection(connection.to_string()))?;
        let mut settings = settings.clone();
        if settings.url.is_empty() {
            settings.url = provider_url(connection).unwrap_or_default();
        }
        self.create(&name, &settings)
    }
}

impl fmt::Debug for ScmProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
