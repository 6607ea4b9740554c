//! In-memory caches shared by every UI session of one daemon.
//!
//! Each map has its own lock. Entries are written only by successful live
//! fetches and never expire; a daemon restart clears them.

use std::collections::HashMap;

use tokio::sync::RwLock;

use lantern_core::{FilterPlugin, ProfileKey};

/// Plugin listing as cached per profile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CachedPlugins {
    pub filters: Vec<FilterPlugin>,
    pub roles: Vec<String>,
}

#[derive(Debug, Default)]
pub struct CacheStore {
    hosts: RwLock<HashMap<ProfileKey, Vec<String>>>,
    host_vars: RwLock<HashMap<(ProfileKey, String), Vec<String>>>,
    roles: RwLock<HashMap<ProfileKey, Vec<String>>>,
    plugins: RwLock<HashMap<ProfileKey, CachedPlugins>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached host list. A list holding only the control host counts as absent.
    pub async fn hosts(&self, profile: &ProfileKey) -> Option<Vec<String>> {
        self.hosts
            .read()
            .await
            .get(profile)
            .filter(|hosts| hosts.len() > 1)
            .cloned()
    }

    pub async fn put_hosts(&self, profile: &ProfileKey, hosts: Vec<String>) {
        self.hosts.write().await.insert(profile.clone(), hosts);
    }

    pub async fn host_vars(&self, profile: &ProfileKey, host: &str) -> Option<Vec<String>> {
        self.host_vars
            .read()
            .await
            .get(&(profile.clone(), host.to_string()))
            .cloned()
    }

    pub async fn put_host_vars(&self, profile: &ProfileKey, host: &str, vars: Vec<String>) {
        self.host_vars
            .write()
            .await
            .insert((profile.clone(), host.to_string()), vars);
    }

    pub async fn roles(&self, profile: &ProfileKey) -> Option<Vec<String>> {
        self.roles.read().await.get(profile).cloned()
    }

    pub async fn put_roles(&self, profile: &ProfileKey, roles: Vec<String>) {
        self.roles.write().await.insert(profile.clone(), roles);
    }

    pub async fn plugins(&self, profile: &ProfileKey) -> Option<CachedPlugins> {
        self.plugins.read().await.get(profile).cloned()
    }

    pub async fn put_plugins(&self, profile: &ProfileKey, plugins: CachedPlugins) {
        self.plugins.write().await.insert(profile.clone(), plugins);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn lone_localhost_is_not_served() {
        let cache = CacheStore::new();
        let profile = ProfileKey::from("p");

        cache.put_hosts(&profile, names(&["localhost"])).await;
        assert_eq!(cache.hosts(&profile).await, None);

        cache.put_hosts(&profile, names(&["localhost", "web01"])).await;
        assert_eq!(cache.hosts(&profile).await, Some(names(&["localhost", "web01"])));
    }

    #[tokio::test]
    async fn host_vars_are_keyed_by_profile_and_host() {
        let cache = CacheStore::new();
        let p = ProfileKey::from("p");
        let q = ProfileKey::from("q");

        cache.put_host_vars(&p, "web01", names(&["http_port"])).await;
        assert_eq!(cache.host_vars(&p, "web01").await, Some(names(&["http_port"])));
        assert_eq!(cache.host_vars(&p, "db01").await, None);
        assert_eq!(cache.host_vars(&q, "web01").await, None);
    }

    #[tokio::test]
    async fn put_overwrites_previous_entry() {
        let cache = CacheStore::new();
        let profile = ProfileKey::from("p");

        cache.put_roles(&profile, names(&["", "nginx"])).await;
        cache.put_roles(&profile, names(&[""])).await;
        assert_eq!(cache.roles(&profile).await, Some(names(&[""])));

        cache.put_plugins(&profile, CachedPlugins::default()).await;
        assert_eq!(cache.plugins(&profile).await, Some(CachedPlugins::default()));
    }
}
