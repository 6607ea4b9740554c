//! Router behaviour against a fake playbook tool: staleness, cache-then-refresh
//! and cache-only requests.
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio::sync::{mpsc, RwLock};

use lantern_core::{Profile, ProfileKey, RenderRequest, ResultKind, Settings};
use lantern_daemon::{CacheStore, EngineHandle, Request, Response, Router, Status};
use lantern_engine::Engine;
use lantern_script::probe::host_list_request;
use lantern_script::PLAYBOOK_TITLE;

const PROFILE: &str = "p";

fn report(msg: serde_json::Value) -> String {
    json!({
        "plays": [{
            "play": { "name": PLAYBOOK_TITLE },
            "tasks": [{ "task": { "name": PLAYBOOK_TITLE }, "hosts": { "localhost": { "msg": msg } } }],
        }],
    })
    .to_string()
}

/// Settings whose only profile runs `/bin/sh <dir>/playbook.sh`.
fn settings_with_script(dir: &Path, script: &str) -> Settings {
    let path = dir.join("playbook.sh");
    fs::write(&path, script).expect("write script");

    let mut profile = Profile::stock();
    profile.cmd_playbook = "/bin/sh".to_string();
    profile.args = vec![path.display().to_string()];

    let mut settings = Settings::default();
    settings.profiles.insert(ProfileKey::from(PROFILE), profile);
    settings
}

fn session(settings: Settings, cache: Arc<CacheStore>) -> (Router, mpsc::UnboundedReceiver<Response>) {
    let engine: EngineHandle = Arc::new(RwLock::new(Arc::new(Engine::new(Arc::new(settings), None))));
    let (tx, rx) = mpsc::unbounded_channel();
    (Router::new(engine, cache, tx), rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Response>) -> Vec<Response> {
    let mut out = vec![];
    while let Ok(response) = rx.try_recv() {
        out.push(response);
    }
    out
}

fn host_list(cache_only: bool) -> Request {
    Request::HostList {
        profile: ProfileKey::from(PROFILE),
        cache_only,
    }
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

async fn wait_for(path: &Path) {
    for _ in 0..100 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{} never appeared", path.display());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn superseded_host_list_is_never_delivered() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("old.json"), report(json!(["old01"]))).expect("old");
    fs::write(dir.path().join("new.json"), report(json!(["new01"]))).expect("new");
    // The first run announces itself, then stalls; later runs answer at once.
    let script = format!(
        r#"dir="{dir}"
if mkdir "$dir/first" 2>/dev/null; then
  sleep 1
  cat "$dir/old.json"
else
  cat "$dir/new.json"
fi
"#,
        dir = dir.path().display()
    );
    let (router, mut rx) = session(settings_with_script(dir.path(), &script), Arc::default());

    let first = router.dispatch(host_list(false)).expect("routed");
    wait_for(&dir.path().join("first")).await;
    let second = router.dispatch(host_list(false)).expect("routed");

    second.await.expect("second task");
    first.await.expect("first task");

    let responses = drain(&mut rx);
    assert_eq!(
        responses,
        vec![Response::HostList {
            status: Status::Successful,
            hosts: names(&["localhost", "new01"]),
            probe_request: host_list_request(ProfileKey::from(PROFILE)),
        }]
    );
}

#[tokio::test]
async fn cache_hit_is_served_before_live_refresh() {
    let dir = TempDir::new().expect("tempdir");
    let script = format!("printf '%s' '{}'\n", report(json!(["web01", "db01"])));
    let cache = Arc::new(CacheStore::new());
    let profile = ProfileKey::from(PROFILE);
    cache.put_hosts(&profile, names(&["localhost", "stale01"])).await;
    let (router, mut rx) = session(settings_with_script(dir.path(), &script), cache.clone());

    router
        .dispatch(host_list(false))
        .expect("routed")
        .await
        .expect("task");

    let statuses: Vec<(Status, Vec<String>)> = drain(&mut rx)
        .into_iter()
        .map(|response| match response {
            Response::HostList { status, hosts, .. } => (status, hosts),
            other => panic!("unexpected response {other:?}"),
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            (Status::Cache, names(&["localhost", "stale01"])),
            (Status::Successful, names(&["localhost", "web01", "db01"])),
        ]
    );
    assert_eq!(
        cache.hosts(&profile).await,
        Some(names(&["localhost", "web01", "db01"]))
    );
}

#[tokio::test]
async fn cache_only_skips_the_live_fetch() {
    let dir = TempDir::new().expect("tempdir");
    let marker = dir.path().join("ran");
    let script = format!("touch '{}'\n", marker.display());
    let cache = Arc::new(CacheStore::new());
    let profile = ProfileKey::from(PROFILE);
    cache.put_roles(&profile, names(&["", "nginx"])).await;
    let (router, mut rx) = session(settings_with_script(dir.path(), &script), cache);

    router
        .dispatch(Request::Roles {
            profile,
            cache_only: true,
        })
        .expect("routed")
        .await
        .expect("task");

    assert_eq!(
        drain(&mut rx),
        vec![Response::Roles {
            status: Status::Cache,
            roles: names(&["", "nginx"]),
        }]
    );
    assert!(!marker.exists(), "engine must not run for cache-only hits");
}

#[tokio::test]
async fn cache_only_miss_still_fetches() {
    let dir = TempDir::new().expect("tempdir");
    let script = format!("printf '%s' '{}'\n", report(json!(["b", "A"])));
    let (router, mut rx) = session(settings_with_script(dir.path(), &script), Arc::default());

    router
        .dispatch(Request::Roles {
            profile: ProfileKey::from(PROFILE),
            cache_only: true,
        })
        .expect("routed")
        .await
        .expect("task");

    assert_eq!(
        drain(&mut rx),
        vec![Response::Roles {
            status: Status::Successful,
            roles: names(&["", "A", "b"]),
        }]
    );
}

#[tokio::test]
async fn failed_fetch_is_reported_but_not_cached() {
    let dir = TempDir::new().expect("tempdir");
    let cache = Arc::new(CacheStore::new());
    let (router, mut rx) = session(settings_with_script(dir.path(), "exit 2\n"), cache.clone());

    router
        .dispatch(Request::HostVars {
            profile: ProfileKey::from(PROFILE),
            host: "web01".to_string(),
            role: String::new(),
            cache_only: false,
        })
        .expect("routed")
        .await
        .expect("task");

    let responses = drain(&mut rx);
    let [Response::HostVars { status, host, vars, .. }] = responses.as_slice() else {
        panic!("expected one host vars response, got {responses:?}");
    };
    assert_eq!(*status, Status::Failed);
    assert_eq!(host, "web01");
    assert!(vars.is_empty());
    assert_eq!(cache.host_vars(&ProfileKey::from(PROFILE), "web01").await, None);
}

#[tokio::test]
async fn failed_fetch_keeps_the_previous_roles() {
    let dir = TempDir::new().expect("tempdir");
    let cache = Arc::new(CacheStore::new());
    let profile = ProfileKey::from(PROFILE);
    let known = names(&["", "nginx", "postgres"]);
    cache.put_roles(&profile, known.clone()).await;
    let (router, mut rx) = session(settings_with_script(dir.path(), "exit 2\n"), cache.clone());

    router
        .dispatch(Request::Roles {
            profile: profile.clone(),
            cache_only: false,
        })
        .expect("routed")
        .await
        .expect("task");

    assert_eq!(
        drain(&mut rx),
        vec![
            Response::Roles {
                status: Status::Cache,
                roles: known.clone(),
            },
            Response::Roles {
                status: Status::Failed,
                roles: names(&[""]),
            },
        ]
    );
    assert_eq!(cache.roles(&profile).await, Some(known.clone()));

    router
        .dispatch(Request::Roles {
            profile,
            cache_only: true,
        })
        .expect("routed")
        .await
        .expect("task");
    assert_eq!(
        drain(&mut rx),
        vec![Response::Roles {
            status: Status::Cache,
            roles: known,
        }]
    );
}

#[tokio::test]
async fn failed_host_list_keeps_the_previous_hosts() {
    let dir = TempDir::new().expect("tempdir");
    let cache = Arc::new(CacheStore::new());
    let profile = ProfileKey::from(PROFILE);
    let known = names(&["localhost", "web01"]);
    cache.put_hosts(&profile, known.clone()).await;
    let (router, mut rx) = session(settings_with_script(dir.path(), "exit 2\n"), cache.clone());

    router
        .dispatch(host_list(false))
        .expect("routed")
        .await
        .expect("task");

    let statuses: Vec<Status> = drain(&mut rx)
        .into_iter()
        .map(|response| match response {
            Response::HostList { status, .. } => status,
            other => panic!("unexpected response {other:?}"),
        })
        .collect();
    assert_eq!(statuses, vec![Status::Cache, Status::Failed]);
    assert_eq!(cache.hosts(&profile).await, Some(known));
}

#[tokio::test]
async fn different_kinds_are_answered_independently() {
    let dir = TempDir::new().expect("tempdir");
    let script = format!("printf '%s' '{}'\n", report(json!("rendered")));
    let (router, mut rx) = session(settings_with_script(dir.path(), &script), Arc::default());

    let render = router
        .dispatch(Request::Render(RenderRequest::local(
            ProfileKey::from(PROFILE),
            "{{ x }}",
        )))
        .expect("routed");
    let preference = router.dispatch(Request::Preference).expect("routed");
    render.await.expect("render");
    preference.await.expect("preference");

    let responses = drain(&mut rx);
    assert_eq!(responses.len(), 2);
    assert!(responses.iter().any(|r| matches!(
        r,
        Response::Render(result) if result.successful && result.kind == ResultKind::String && result.result == "rendered"
    )));
    assert!(responses
        .iter()
        .any(|r| matches!(r, Response::Preference { profiles, .. } if profiles.contains_key(PROFILE))));
}

#[tokio::test]
async fn unknown_profile_render_is_answered_without_a_process() {
    let (router, mut rx) = session(Settings::default(), Arc::default());

    router
        .dispatch(Request::Render(RenderRequest::local(
            ProfileKey::from("missing"),
            "{{ x }}",
        )))
        .expect("routed")
        .await
        .expect("task");

    let responses = drain(&mut rx);
    let [Response::Render(result)] = responses.as_slice() else {
        panic!("expected one render response, got {responses:?}");
    };
    assert!(!result.successful);
    assert_eq!(result.result, "Profile cannot be found.");
}

#[test]
fn control_messages_are_not_routed() {
    let (router, _rx) = session(Settings::default(), Arc::default());
    assert!(router.dispatch(Request::Status).is_none());
    assert!(router.dispatch(Request::Stop).is_none());
}
