//! Filter and role plugin lookup through the documentation tool, used to feed
//! autocompletion.

use futures::future::join_all;
use serde_json::Value;

use lantern_core::{ExecutionResult, FilterPlugin, ProfileKey};

use crate::engine::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PluginType {
    Filter,
    Role,
}

impl PluginType {
    fn as_arg(self) -> &'static str {
        match self {
            PluginType::Filter => "filter",
            PluginType::Role => "role",
        }
    }
}

/// Plugins exported by the configured collections.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PluginListing {
    pub successful: bool,
    pub filters: Vec<FilterPlugin>,
    pub roles: Vec<String>,
}

struct Lookup<'a> {
    kind: PluginType,
    collection: &'a str,
    result: ExecutionResult,
}

pub(crate) async fn list_plugins(engine: &Engine, profile: &ProfileKey) -> PluginListing {
    let Some(profile) = engine.settings().resolve(profile) else {
        return PluginListing::default();
    };

    let settings = engine.settings();
    let lookups = settings.collection_imports.iter().flat_map(|collection| {
        [PluginType::Filter, PluginType::Role].map(move |kind| async move {
            let args = [
                "--list".to_string(),
                "--json".to_string(),
                "--type".to_string(),
                kind.as_arg().to_string(),
                collection.clone(),
            ];
            let result = engine.run_tool(&profile.cmd_doc, &args, &profile.env).await;
            Lookup {
                kind,
                collection: collection.as_str(),
                result,
            }
        })
    });
    let results = join_all(lookups).await;

    let mut listing = PluginListing {
        successful: true,
        ..PluginListing::default()
    };
    for lookup in results {
        if !lookup.result.successful {
            tracing::warn!(collection = lookup.collection, kind = lookup.kind.as_arg(), "plugin lookup failed");
            listing.successful = false;
            break;
        }
        let short_names = settings
            .collection_references
            .iter()
            .any(|reference| reference == lookup.collection);
        collect_entries(&mut listing, &lookup, short_names);
    }
    listing
}

fn collect_entries(listing: &mut PluginListing, lookup: &Lookup<'_>, short_names: bool) {
    let Ok(Value::Object(entries)) = serde_json::from_str::<Value>(&lookup.result.stdout) else {
        tracing::debug!(collection = lookup.collection, "plugin listing is not a JSON object");
        return;
    };
    let prefix = format!("{}.", lookup.collection);

    for (name, description) in entries {
        let mut names = vec![name.clone()];
        if short_names {
            names.push(name.replace(&prefix, ""));
        }
        match (lookup.kind, &description) {
            (PluginType::Filter, Value::String(text)) => {
                listing.filters.extend(names.into_iter().map(|name| FilterPlugin {
                    name,
                    description: text.clone(),
                }));
            }
            (PluginType::Role, _) => listing.roles.extend(names),
            (PluginType::Filter, _) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(kind: PluginType, collection: &'a str, stdout: &str) -> Lookup<'a> {
        Lookup {
            kind,
            collection,
            result: ExecutionResult {
                successful: true,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        }
    }

    #[test]
    fn filters_get_short_names_for_referenced_collections() {
        let mut listing = PluginListing::default();
        let l = lookup(
            PluginType::Filter,
            "community.general",
            r#"{"community.general.json_query": "Select a single element or a data subset"}"#,
        );
        collect_entries(&mut listing, &l, true);
        let names: Vec<&str> = listing.filters.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["community.general.json_query", "json_query"]);
        assert_eq!(listing.filters[1].description, "Select a single element or a data subset");
    }

    #[test]
    fn filters_without_string_description_are_skipped() {
        let mut listing = PluginListing::default();
        let l = lookup(PluginType::Filter, "ns.col", r#"{"ns.col.a": null, "ns.col.b": "b"}"#);
        collect_entries(&mut listing, &l, false);
        assert_eq!(listing.filters.len(), 1);
        assert_eq!(listing.filters[0].name, "ns.col.b");
    }

    #[test]
    fn roles_ignore_description_type() {
        let mut listing = PluginListing::default();
        let l = lookup(PluginType::Role, "ns.col", r#"{"ns.col.web": {"main": "x"}}"#);
        collect_entries(&mut listing, &l, false);
        assert_eq!(listing.roles, vec!["ns.col.web"]);
    }

    #[test]
    fn unparsable_listing_is_skipped() {
        let mut listing = PluginListing::default();
        let l = lookup(PluginType::Role, "ns.col", "ERROR! no such collection");
        collect_entries(&mut listing, &l, false);
        assert!(listing.roles.is_empty());
    }
}
