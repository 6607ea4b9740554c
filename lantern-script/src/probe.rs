//! Probe requests: renders whose only purpose is to make the engine emit one
//! designated value through the ordinary render pipeline.

use lantern_core::{ProfileKey, RenderRequest, LOCALHOST};

/// Expression printing every inventory host, sorted and deduplicated.
pub const TEMPLATE_HOSTLIST: &str = "{{ groups.all | default([]) | sort | unique }}";
/// Expression printing the variable names visible to a host.
pub const TEMPLATE_HOSTVARS: &str = "{{ vars.keys() }}";

/// Render request that enumerates the inventory from the control host.
pub fn host_list_request(profile: ProfileKey) -> RenderRequest {
    RenderRequest::local(profile, TEMPLATE_HOSTLIST)
}

/// Render request that enumerates the variables of `host`, with `role`
/// attached so role defaults are included.
pub fn host_vars_request(profile: ProfileKey, host: &str, role: &str) -> RenderRequest {
    RenderRequest {
        profile,
        host: host.to_string(),
        role: role.to_string(),
        gather_facts: false,
        variables: String::new(),
        template: TEMPLATE_HOSTVARS.to_string(),
    }
}

/// Render request used to run the role directory scan. The template is empty
/// because the scan supplies its own playbook.
pub fn role_scan_request(profile: ProfileKey) -> RenderRequest {
    RenderRequest::local(profile, "")
}
