//! Request routing with per-kind staleness tracking.
//!
//! Every UI request is admitted synchronously, in arrival order, and gets an
//! [`AnswerToken`]. Its work then runs on its own task. A response reaches the
//! session only while its token is still the newest of its kind; anything
//! older is dropped on the floor. In-flight engine processes are never
//! cancelled, only their answers are discarded.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use lantern_core::{ProfileKey, RenderRequest, Settings};
use lantern_engine::extract::to_pretty_json;
use lantern_engine::Engine;
use lantern_script::probe::{host_list_request, host_vars_request};

use crate::cache::{CacheStore, CachedPlugins};
use crate::protocol::{Request, Response, Status};

/// Current engine snapshot; replaced wholesale when settings change.
pub type EngineHandle = Arc<RwLock<Arc<Engine>>>;

/// Independent staleness domains. Requests of different kinds never
/// supersede each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Render,
    HostList,
    HostVars,
    Roles,
    Plugins,
    Preference,
}

impl RequestKind {
    /// `None` for control messages, which bypass the guard.
    pub fn of(request: &Request) -> Option<Self> {
        match request {
            Request::Render(_) => Some(RequestKind::Render),
            Request::HostList { .. } => Some(RequestKind::HostList),
            Request::HostVars { .. } => Some(RequestKind::HostVars),
            Request::Roles { .. } => Some(RequestKind::Roles),
            Request::Plugins { .. } => Some(RequestKind::Plugins),
            Request::Preference => Some(RequestKind::Preference),
            Request::Status | Request::Stop => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerToken {
    pub kind: RequestKind,
    pub counter: u64,
}

/// Per-session counters plus the session's outgoing message queue.
#[derive(Debug)]
pub struct StalenessGuard {
    counters: Mutex<HashMap<RequestKind, u64>>,
    outbox: mpsc::UnboundedSender<Response>,
}

impl StalenessGuard {
    pub fn new(outbox: mpsc::UnboundedSender<Response>) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            outbox,
        }
    }

    /// Register a new request of `kind`, superseding every earlier one.
    pub fn admit(&self, kind: RequestKind) -> AnswerToken {
        let mut counters = self.counters();
        let counter = counters.entry(kind).or_insert(0);
        *counter += 1;
        AnswerToken {
            kind,
            counter: *counter,
        }
    }

    pub fn is_current(&self, token: AnswerToken) -> bool {
        self.counters().get(&token.kind).copied() == Some(token.counter)
    }

    /// Queue `response` if `token` is still current. Returns whether it was
    /// queued.
    pub fn deliver(&self, token: AnswerToken, response: Response) -> bool {
        // Held across the send so no newer admit can slip in between.
        let counters = self.counters();
        if counters.get(&token.kind).copied() != Some(token.counter) {
            tracing::debug!(kind = ?token.kind, counter = token.counter, "dropping superseded response");
            return false;
        }
        if self.outbox.send(response).is_err() {
            tracing::debug!(kind = ?token.kind, "session closed before response");
            return false;
        }
        true
    }

    fn counters(&self) -> MutexGuard<'_, HashMap<RequestKind, u64>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One UI session's view of the engine and the shared caches.
#[derive(Debug, Clone)]
pub struct Router {
    engine: EngineHandle,
    cache: Arc<CacheStore>,
    guard: Arc<StalenessGuard>,
}

impl Router {
    pub fn new(
        engine: EngineHandle,
        cache: Arc<CacheStore>,
        outbox: mpsc::UnboundedSender<Response>,
    ) -> Self {
        Self {
            engine,
            cache,
            guard: Arc::new(StalenessGuard::new(outbox)),
        }
    }

    pub fn guard(&self) -> &StalenessGuard {
        &self.guard
    }

    /// Admit `request` and answer it on a new task. Control messages are not
    /// routed and yield `None`.
    pub fn dispatch(&self, request: Request) -> Option<JoinHandle<()>> {
        let kind = RequestKind::of(&request)?;
        let token = self.guard.admit(kind);
        let router = self.clone();
        Some(tokio::spawn(async move { router.answer(token, request).await }))
    }

    async fn answer(&self, token: AnswerToken, request: Request) {
        let engine = self.engine.read().await.clone();
        match request {
            Request::Render(render) => {
                let result = engine.render(&render).await;
                self.guard.deliver(token, Response::Render(result));
            }
            Request::HostList {
                profile,
                cache_only,
            } => self.host_list(&engine, token, profile, cache_only).await,
            Request::HostVars {
                profile,
                host,
                role,
                cache_only,
            } => {
                self.host_vars(&engine, token, profile, host, role, cache_only)
                    .await
            }
            Request::Roles {
                profile,
                cache_only,
            } => self.roles(&engine, token, profile, cache_only).await,
            Request::Plugins {
                profile,
                cache_only,
            } => self.plugins(&engine, token, profile, cache_only).await,
            Request::Preference => {
                self.guard.deliver(token, preference(engine.settings()));
            }
            Request::Status | Request::Stop => {}
        }
    }

    async fn host_list(&self, engine: &Engine, token: AnswerToken, profile: ProfileKey, cache_only: bool) {
        let probe = host_list_request(profile.clone());
        if let Some(hosts) = self.cache.hosts(&profile).await {
            self.guard.deliver(token, host_list(Status::Cache, hosts, &probe));
            if cache_only {
                return;
            }
        }

        let listing = engine.list_hosts(&profile).await;
        if listing.successful {
            self.cache.put_hosts(&profile, listing.hosts.clone()).await;
        }
        self.guard.deliver(
            token,
            host_list(Status::live(listing.successful), listing.hosts, &probe),
        );
    }

    async fn host_vars(
        &self,
        engine: &Engine,
        token: AnswerToken,
        profile: ProfileKey,
        host: String,
        role: String,
        cache_only: bool,
    ) {
        let probe = host_vars_request(profile.clone(), &host, &role);
        let response = |status, vars| Response::HostVars {
            status,
            host: host.clone(),
            role: role.clone(),
            vars,
            probe_request: probe.clone(),
        };

        if let Some(vars) = self.cache.host_vars(&profile, &host).await {
            self.guard.deliver(token, response(Status::Cache, vars));
            if cache_only {
                return;
            }
        }

        let listing = engine.list_host_vars(&profile, &host, &role).await;
        if listing.successful {
            self.cache.put_host_vars(&profile, &host, listing.vars.clone()).await;
        }
        self.guard
            .deliver(token, response(Status::live(listing.successful), listing.vars));
    }

    async fn roles(&self, engine: &Engine, token: AnswerToken, profile: ProfileKey, cache_only: bool) {
        if let Some(roles) = self.cache.roles(&profile).await {
            self.guard.deliver(
                token,
                Response::Roles {
                    status: Status::Cache,
                    roles,
                },
            );
            if cache_only {
                return;
            }
        }

        let listing = engine.list_roles(&profile).await;
        if listing.successful {
            self.cache.put_roles(&profile, listing.roles.clone()).await;
        }
        self.guard.deliver(
            token,
            Response::Roles {
                status: Status::live(listing.successful),
                roles: listing.roles,
            },
        );
    }

    async fn plugins(&self, engine: &Engine, token: AnswerToken, profile: ProfileKey, cache_only: bool) {
        if let Some(cached) = self.cache.plugins(&profile).await {
            self.guard.deliver(token, plugins(Status::Cache, cached));
            if cache_only {
                return;
            }
        }

        let listing = engine.list_plugins(&profile).await;
        let fresh = CachedPlugins {
            filters: listing.filters,
            roles: listing.roles,
        };
        if listing.successful {
            self.cache.put_plugins(&profile, fresh.clone()).await;
        }
        self.guard
            .deliver(token, plugins(Status::live(listing.successful), fresh));
    }
}

fn host_list(status: Status, hosts: Vec<String>, probe: &RenderRequest) -> Response {
    Response::HostList {
        status,
        hosts,
        probe_request: probe.clone(),
    }
}

fn plugins(status: Status, plugins: CachedPlugins) -> Response {
    Response::Plugins {
        status,
        filters: plugins.filters,
        roles: plugins.roles,
    }
}

/// Every profile pretty-printed with the configured indent.
pub fn preference(settings: &Settings) -> Response {
    let profiles: BTreeMap<String, String> = settings
        .profiles
        .iter()
        .map(|(key, profile)| (key.0.clone(), to_pretty_json(profile, settings.tab_size)))
        .collect();
    Response::Preference {
        profiles,
        tab_size: settings.tab_size,
    }
}
