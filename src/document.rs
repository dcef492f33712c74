//! Kubernetes resource documents
//!
//! A [`Document`] is one resource object produced by a renderer. It wraps a
//! `serde_json::Value` tree and only hands out shared references, so rules
//! evaluating the same document in parallel can never observe a mutation.

use crate::finding::ResourceRef;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while building a document or reading its structure
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("document must be an object, found {0}")]
    NotAnObject(&'static str),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{kind}/{name}: expected {expected} at {path}, found {found}")]
    UnexpectedShape {
        kind: String,
        name: String,
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors from path navigation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid path '{path}': {message}")]
    Syntax { path: String, message: String },

    #[error("cannot index {found} with '{segment}' at '{path}'")]
    NotTraversable {
        path: String,
        segment: String,
        found: &'static str,
    },
}

/// Name of a JSON value's type, as reported in errors
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Kinds that carry a pod template (or are a pod)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Pod,
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
}

impl WorkloadKind {
    /// Resolve a kind from its API group and kind name
    pub fn resolve(group: &str, kind: &str) -> Option<Self> {
        match (group, kind) {
            ("", "Pod") => Some(WorkloadKind::Pod),
            ("apps", "Deployment") => Some(WorkloadKind::Deployment),
            ("apps", "StatefulSet") => Some(WorkloadKind::StatefulSet),
            ("apps", "DaemonSet") => Some(WorkloadKind::DaemonSet),
            ("batch", "Job") => Some(WorkloadKind::Job),
            ("batch", "CronJob") => Some(WorkloadKind::CronJob),
            _ => None,
        }
    }

    /// Path of the pod spec inside a document of this kind
    pub fn pod_spec_path(&self) -> &'static str {
        match self {
            WorkloadKind::Pod => "spec",
            WorkloadKind::CronJob => "spec.jobTemplate.spec.template.spec",
            _ => "spec.template.spec",
        }
    }

    /// Controllers only; a bare Pod is not a workload
    pub fn is_workload(&self) -> bool {
        !matches!(self, WorkloadKind::Pod)
    }
}

/// A single resource object
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    value: Value,
    source: Option<PathBuf>,
}

impl Document {
    /// Wrap a value tree; the root must be an object
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        if !value.is_object() {
            return Err(DocumentError::NotAnObject(type_name(&value)));
        }
        Ok(Self {
            value,
            source: None,
        })
    }

    /// Parse a single YAML document
    pub fn from_yaml(content: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_yaml::from_str(content)?;
        Self::from_value(value)
    }

    /// Record the file the document was read from
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// The raw value tree
    pub fn value(&self) -> &Value {
        &self.value
    }

    fn str_at(&self, path: &[&str]) -> &str {
        let mut current = &self.value;
        for key in path {
            match current.get(key) {
                Some(next) => current = next,
                None => return "",
            }
        }
        current.as_str().unwrap_or("")
    }

    pub fn api_version(&self) -> &str {
        self.str_at(&["apiVersion"])
    }

    /// API group, empty for the core group (`v1`)
    pub fn api_group(&self) -> &str {
        match self.api_version().rsplit_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    pub fn kind(&self) -> &str {
        self.str_at(&["kind"])
    }

    pub fn name(&self) -> &str {
        self.str_at(&["metadata", "name"])
    }

    pub fn namespace(&self) -> &str {
        self.str_at(&["metadata", "namespace"])
    }

    /// `metadata.labels`, if present and an object
    pub fn labels(&self) -> Option<&Map<String, Value>> {
        self.value
            .get("metadata")
            .and_then(|m| m.get("labels"))
            .and_then(Value::as_object)
    }

    /// Value of one label, when it is a string
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels().and_then(|l| l.get(key)).and_then(Value::as_str)
    }

    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef::new(self.api_version(), self.kind(), self.namespace(), self.name())
    }

    /// Check kind and API group together
    pub fn is(&self, group: &str, kind: &str) -> bool {
        self.kind() == kind && self.api_group() == group
    }

    pub fn workload_kind(&self) -> Option<WorkloadKind> {
        WorkloadKind::resolve(self.api_group(), self.kind())
    }

    /// Deployment, StatefulSet, DaemonSet, Job or CronJob
    pub fn is_workload(&self) -> bool {
        self.workload_kind().is_some_and(|k| k.is_workload())
    }

    /// Any workload, or a bare Pod
    pub fn is_workload_or_pod(&self) -> bool {
        self.workload_kind().is_some()
    }

    /// Navigate a dotted path such as `spec.template.spec.containers[0].image`.
    ///
    /// Missing keys, out-of-range indices and `null` along the way yield
    /// `Ok(None)`. Stepping into a scalar, or indexing an array with a key
    /// (or an object with an index), is an error.
    pub fn lookup(&self, path: &str) -> Result<Option<&Value>, PathError> {
        lookup(&self.value, path)
    }

    /// Containers of the pod spec, dispatched on kind.
    ///
    /// Kinds without a pod template yield an empty list. A `containers`
    /// field that is present but not a list of objects is an error.
    pub fn containers(&self) -> Result<Vec<Container<'_>>, DocumentError> {
        self.pod_spec_list("containers")
    }

    /// Init containers of the pod spec, with the same dispatch as [`containers`](Self::containers)
    pub fn init_containers(&self) -> Result<Vec<Container<'_>>, DocumentError> {
        self.pod_spec_list("initContainers")
    }

    fn pod_spec_list(&self, field: &str) -> Result<Vec<Container<'_>>, DocumentError> {
        let Some(kind) = self.workload_kind() else {
            return Ok(Vec::new());
        };
        let path = format!("{}.{}", kind.pod_spec_path(), field);

        let found = self.lookup(&path).map_err(|e| self.shape_error(&path, "object", e))?;
        let items = match found {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(DocumentError::UnexpectedShape {
                    kind: self.kind().to_string(),
                    name: self.name().to_string(),
                    path,
                    expected: "array",
                    found: type_name(other),
                })
            }
        };

        let mut containers = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let item_path = format!("{}[{}]", path, index);
            match item.as_object() {
                Some(spec) => containers.push(Container {
                    index,
                    path: item_path,
                    spec,
                }),
                None => {
                    return Err(DocumentError::UnexpectedShape {
                        kind: self.kind().to_string(),
                        name: self.name().to_string(),
                        path: item_path,
                        expected: "object",
                        found: type_name(item),
                    })
                }
            }
        }
        Ok(containers)
    }

    fn shape_error(&self, path: &str, expected: &'static str, err: PathError) -> DocumentError {
        let found = match err {
            PathError::NotTraversable { found, .. } => found,
            PathError::Syntax { .. } => "invalid path",
        };
        DocumentError::UnexpectedShape {
            kind: self.kind().to_string(),
            name: self.name().to_string(),
            path: path.to_string(),
            expected,
            found,
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource_ref())
    }
}

/// One container entry of a pod spec
#[derive(Debug, Clone)]
pub struct Container<'a> {
    pub index: usize,
    path: String,
    pub spec: &'a Map<String, Value>,
}

impl<'a> Container<'a> {
    pub fn name(&self) -> &'a str {
        self.spec.get("name").and_then(Value::as_str).unwrap_or("")
    }

    pub fn image(&self) -> Option<&'a str> {
        self.spec.get("image").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.spec.get(key)
    }

    /// Path of the container itself, e.g. `spec.template.spec.containers[0]`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of a field below the container
    pub fn field(&self, suffix: &str) -> String {
        format!("{}.{}", self.path, suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<Segment>, PathError> {
    let syntax = |message: &str| PathError::Syntax {
        path: path.to_string(),
        message: message.to_string(),
    };

    let mut segments = Vec::new();
    let trimmed = path.strip_prefix('.').unwrap_or(path);
    if trimmed.is_empty() {
        return Ok(segments);
    }

    for part in trimmed.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if key.is_empty() && rest.is_empty() {
            return Err(syntax("empty segment"));
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key.to_string()));
        }
        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(|| syntax("unclosed '['"))?;
            let index = rest[1..close]
                .parse::<usize>()
                .map_err(|_| syntax("index must be a non-negative integer"))?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(syntax("unexpected characters after ']'"));
            }
        }
    }
    Ok(segments)
}

/// Navigate a dotted path inside any value tree. See [`Document::lookup`].
pub fn lookup<'a>(root: &'a Value, path: &str) -> Result<Option<&'a Value>, PathError> {
    let mut current = root;
    let mut walked = String::new();

    for segment in parse_path(path)? {
        let next = match (&segment, current) {
            (_, Value::Null) => return Ok(None),
            (Segment::Key(key), Value::Object(map)) => map.get(key),
            (Segment::Index(i), Value::Array(items)) => items.get(*i),
            (segment, other) => {
                return Err(PathError::NotTraversable {
                    path: if walked.is_empty() { ".".to_string() } else { walked },
                    segment: match segment {
                        Segment::Key(k) => k.clone(),
                        Segment::Index(i) => format!("[{}]", i),
                    },
                    found: type_name(other),
                })
            }
        };
        match &segment {
            Segment::Key(k) if walked.is_empty() => walked.push_str(k),
            Segment::Key(k) => {
                walked.push('.');
                walked.push_str(k);
            }
            Segment::Index(i) => walked.push_str(&format!("[{}]", i)),
        }
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_identity_accessors() {
        let d = doc(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "prod", "labels": {"app": "web"}}
        }));
        assert_eq!(d.api_version(), "apps/v1");
        assert_eq!(d.api_group(), "apps");
        assert_eq!(d.kind(), "Deployment");
        assert_eq!(d.name(), "web");
        assert_eq!(d.namespace(), "prod");
        assert_eq!(d.label("app"), Some("web"));
        assert_eq!(d.label("tier"), None);
        assert_eq!(d.resource_ref().to_string(), "prod/Deployment/web");
        assert!(d.is_workload());
    }

    #[test]
    fn test_core_group_is_empty() {
        let d = doc(json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "p"}}));
        assert_eq!(d.api_group(), "");
        assert!(d.is("", "Pod"));
        assert!(!d.is_workload());
        assert!(d.is_workload_or_pod());
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(matches!(
            Document::from_value(json!([1, 2])),
            Err(DocumentError::NotAnObject("array"))
        ));
    }

    #[test]
    fn test_lookup() {
        let d = doc(json!({
            "kind": "Pod",
            "spec": {"containers": [{"name": "a", "image": "nginx"}], "nodeName": null}
        }));
        assert_eq!(d.lookup("spec.containers[0].image").unwrap(), Some(&json!("nginx")));
        assert_eq!(d.lookup(".kind").unwrap(), Some(&json!("Pod")));
        assert_eq!(d.lookup("spec.containers[3].image").unwrap(), None);
        assert_eq!(d.lookup("spec.missing.deeper").unwrap(), None);
        assert_eq!(d.lookup("spec.nodeName.x").unwrap(), None);
        assert_eq!(d.lookup(".").unwrap(), Some(d.value()));
    }

    #[test]
    fn test_lookup_into_scalar_is_error() {
        let d = doc(json!({"kind": "Pod", "spec": {"containers": [{"name": "a"}]}}));
        let err = d.lookup("kind.name").unwrap_err();
        assert_eq!(
            err,
            PathError::NotTraversable {
                path: "kind".to_string(),
                segment: "name".to_string(),
                found: "string",
            }
        );
        assert!(d.lookup("spec.containers.name").is_err());
        assert!(d.lookup("spec[0]").is_err());
    }

    #[test]
    fn test_lookup_syntax_errors() {
        let d = doc(json!({}));
        assert!(matches!(d.lookup("a..b"), Err(PathError::Syntax { .. })));
        assert!(matches!(d.lookup("a[x]"), Err(PathError::Syntax { .. })));
        assert!(matches!(d.lookup("a[0"), Err(PathError::Syntax { .. })));
    }

    #[test]
    fn test_containers_by_kind() {
        let pod = doc(json!({
            "apiVersion": "v1", "kind": "Pod",
            "spec": {"containers": [{"name": "app", "image": "nginx:1.25"}]}
        }));
        let containers = pod.containers().unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name(), "app");
        assert_eq!(containers[0].image(), Some("nginx:1.25"));
        assert_eq!(containers[0].field("resources"), "spec.containers[0].resources");

        let deploy = doc(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "spec": {"template": {"spec": {"containers": [{"name": "a"}, {"name": "b"}]}}}
        }));
        let containers = deploy.containers().unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[1].path(), "spec.template.spec.containers[1]");

        let cron = doc(json!({
            "apiVersion": "batch/v1", "kind": "CronJob",
            "spec": {"jobTemplate": {"spec": {"template": {"spec": {
                "containers": [{"name": "job"}]
            }}}}}
        }));
        let containers = cron.containers().unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(
            containers[0].path(),
            "spec.jobTemplate.spec.template.spec.containers[0]"
        );
    }

    #[test]
    fn test_unknown_kind_has_no_containers() {
        let cm = doc(json!({"apiVersion": "v1", "kind": "ConfigMap", "data": {"a": "b"}}));
        assert!(cm.containers().unwrap().is_empty());

        // Same kind name in a foreign group is not a workload
        let custom = doc(json!({
            "apiVersion": "example.com/v1", "kind": "Deployment",
            "spec": {"template": {"spec": {"containers": [{"name": "x"}]}}}
        }));
        assert!(custom.containers().unwrap().is_empty());
    }

    #[test]
    fn test_missing_containers_is_empty() {
        let deploy = doc(json!({"apiVersion": "apps/v1", "kind": "Deployment", "spec": {}}));
        assert!(deploy.containers().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_containers_is_error() {
        let pod = doc(json!({"apiVersion": "v1", "kind": "Pod", "spec": {"containers": "nope"}}));
        assert!(matches!(
            pod.containers(),
            Err(DocumentError::UnexpectedShape { expected: "array", found: "string", .. })
        ));

        let pod = doc(json!({"apiVersion": "v1", "kind": "Pod", "spec": {"containers": [42]}}));
        assert!(pod.containers().is_err());
    }

    #[test]
    fn test_from_yaml() {
        let d = Document::from_yaml(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg-a\n",
        )
        .unwrap();
        assert_eq!(d.kind(), "ConfigMap");
        assert_eq!(d.name(), "cfg-a");
        assert_eq!(d.namespace(), "");
    }
}
