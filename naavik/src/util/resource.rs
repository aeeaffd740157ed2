use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use mesh_types::Rollout;

pub const ENV_DEFAULT: &str = "default";
pub const IS_TRUE: &str = "true";

/// Resources that carry a pod template somewhere under their spec.
/// `Deployment` and `Rollout` both implement this so the workload caches and
/// handlers can derive identity/env symmetrically (spec.md §4.1).
pub trait HasPodTemplate {
    fn pod_template_meta(&self) -> Option<&ObjectMeta>;
}

impl HasPodTemplate for Deployment {
    fn pod_template_meta(&self) -> Option<&ObjectMeta> {
        self.spec.as_ref()?.template.metadata.as_ref()
    }
}

impl HasPodTemplate for Rollout {
    fn pod_template_meta(&self) -> Option<&ObjectMeta> {
        self.spec.template.as_ref()?.metadata.as_ref()
    }
}

pub(crate) fn label_or_annotation(meta: &ObjectMeta, key: &str) -> Option<String> {
    if let Some(labels) = &meta.labels {
        if let Some(v) = labels.get(key) {
            if !v.is_empty() {
                return Some(v.clone());
            }
        }
    }
    if let Some(annotations) = &meta.annotations {
        if let Some(v) = annotations.get(key) {
            if !v.is_empty() {
                return Some(v.clone());
            }
        }
    }
    None
}

/// Reads the workload identity off a pod template's labels/annotations,
/// falling back from label to annotation (never the other way round).
pub fn get_workload_identifier(meta: &ObjectMeta) -> String {
    label_or_annotation(meta, &mesh_common::options::get().args.workload_identity_key).unwrap_or_default()
}

/// Resolves the environment for a workload: label/annotation first, then the
/// deprecated "last namespace segment" heuristic, then a hardcoded default.
pub fn get_env(meta: &ObjectMeta, name: &str, namespace: &str) -> String {
    if let Some(env) = label_or_annotation(meta, &mesh_common::options::get().args.env_key) {
        return env;
    }
    let segments: Vec<&str> = namespace.split('-').collect();
    if segments.len() > 1 {
        tracing::warn!(
            name,
            namespace,
            "using deprecated approach to deduce env from namespace for deployment"
        );
        return segments[segments.len() - 1].to_string();
    }
    ENV_DEFAULT.to_string()
}

pub fn is_resource_mesh_enabled(meta: &ObjectMeta) -> bool {
    label_or_annotation(meta, &mesh_common::options::get().args.mesh_injection_enabled_key)
        .map(|v| v.eq_ignore_ascii_case(IS_TRUE))
        .unwrap_or(false)
}

pub fn is_resource_ignored(meta: &ObjectMeta) -> bool {
    label_or_annotation(meta, &mesh_common::options::get().args.resource_ignore_label)
        .map(|v| v.eq_ignore_ascii_case(IS_TRUE))
        .unwrap_or(false)
}

pub fn is_sync_enabled(meta: &ObjectMeta) -> bool {
    label_or_annotation(meta, &mesh_common::options::get().args.secret_sync_label)
        .map(|v| v.eq_ignore_ascii_case(IS_TRUE))
        .unwrap_or(false)
}

/// Derives `(identity, env)` for a workload from its pod template metadata.
/// Returns empty strings when no pod template metadata is present or the
/// identity label/annotation is unset — callers treat that as a no-op per
/// spec.md §4.1 ("if either is empty the call is a no-op").
pub fn derive_identity_env<T>(resource: &T) -> (String, String)
where
    T: HasPodTemplate + ResourceExt,
{
    let Some(meta) = resource.pod_template_meta() else {
        return (String::new(), String::new());
    };
    let identity = get_workload_identifier(meta);
    if identity.is_empty() {
        return (String::new(), String::new());
    }
    let name = resource.name_any();
    let namespace = resource.namespace().unwrap_or_default();
    let env = get_env(meta, &name, &namespace);
    (identity, env)
}

/// Reads the Kubernetes `metadata.generation` field used by the async key
/// executor's staleness comparison (spec.md §4.3). `None` when absent —
/// callers must log and skip the event rather than guess a rank.
pub fn object_generation(meta: &ObjectMeta) -> Option<i64> {
    meta.generation
}

/// Reads the identity a `TrafficConfig` policy targets off its own
/// labels/annotations (keyed by `--traffic_config_identity_key`, distinct
/// from the workload identity key).
pub fn get_traffic_config_identity(meta: &ObjectMeta) -> String {
    label_or_annotation(
        meta,
        &mesh_common::options::get().args.traffic_config_identity_key,
    )
    .unwrap_or_default()
}

/// True when `meta` carries the well-known disabled marker (label or
/// annotation), used by both the traffic-config and dependency handlers.
pub fn is_marked_disabled(meta: &ObjectMeta) -> bool {
    label_or_annotation(meta, mesh_types::well_known::IS_DISABLED_KEY)
        .map(|v| v.eq_ignore_ascii_case(IS_TRUE))
        .unwrap_or(false)
}

/// True when the resource's pod template is marked ignored or is not
/// mesh-enabled — the early-skip filter workload handlers apply before ever
/// touching the caches (spec.md §4.5).
pub fn should_skip_workload<T: HasPodTemplate>(resource: &T) -> bool {
    match resource.pod_template_meta() {
        None => true,
        Some(meta) => is_resource_ignored(meta) || !is_resource_mesh_enabled(meta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn meta_with(labels: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>()
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        }
    }

    /// Installs the process-wide options singleton with defaults if no
    /// earlier test in this binary has already done so; `options::init` is
    /// idempotent (a second call just logs a warning), so every test in the
    /// crate can safely call this first.
    fn init_opts() {
        use clap::Parser;
        mesh_common::options::init(mesh_common::options::CliArgs::parse_from(["naavik"]));
    }

    #[test]
    fn env_falls_back_to_namespace_suffix() {
        init_opts();
        let meta = meta_with(&[]);
        assert_eq!(get_env(&meta, "svc", "ns-qa"), "qa");
        assert_eq!(get_env(&meta, "svc", "ns"), ENV_DEFAULT);
    }

    #[test]
    fn env_label_takes_precedence() {
        init_opts();
        let meta = meta_with(&[("admiral.io/env", "e2e")]);
        assert_eq!(get_env(&meta, "svc", "ns-qa"), "e2e");
    }

    #[test]
    fn mesh_enabled_is_case_insensitive() {
        init_opts();
        let meta = meta_with(&[("sidecar.istio.io/inject", "TRUE")]);
        assert!(is_resource_mesh_enabled(&meta));
    }
}
