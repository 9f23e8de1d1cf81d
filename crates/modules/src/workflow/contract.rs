//! Serde contract for the Argo workflow spec.
//!
//! Field names and the omit-if-null rule are part of the wire format the
//! cluster controller consumes. Every optional field carries
//! `skip_serializing_if` so absent values disappear from the document
//! instead of serializing as `null`.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSpec {
    pub entrypoint: String,
    pub arguments: Arguments,
    pub templates: Vec<Template>,
    #[serde(rename = "podGC")]
    pub pod_gc: PodGc,
}

#[derive(Debug, Clone, Serialize)]
pub struct Arguments {
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub name: String,
    pub template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,
    #[serde(rename = "withParam", skip_serializing_if = "Option::is_none")]
    pub with_param: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Arguments>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<Vec<Step>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Container {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    #[serde(rename = "volumeMounts", skip_serializing_if = "Option::is_none")]
    pub volume_mounts: Option<Vec<VolumeMount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceAmounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceAmounts>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceAmounts {
    pub cpu: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeMount {
    pub name: String,
    #[serde(rename = "mountPath")]
    pub mount_path: String,
    #[serde(rename = "readOnly")]
    pub read_only: bool,
}

/// `value` is omittable: an env entry without a value is how an unset
/// optional setting reaches the pod.
#[derive(Debug, Clone, Serialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Volume {
    pub name: String,
    #[serde(rename = "configMap")]
    pub config_map: ConfigMapRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigMapRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PodGc {
    pub strategy: String,
    #[serde(rename = "deleteDelayDuration")]
    pub delete_delay_duration: String,
}
