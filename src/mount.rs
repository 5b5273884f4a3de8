use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One `source:target[:ro]` entry from a service's volume list. The source is
/// kept as written; `${VAR}` references are only expanded when the stack is
/// actually deployed, so `check` passes on machines where they are unset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "String", into = "String")]
pub(crate) struct VolumeMount {
    pub(crate) source: String,
    pub(crate) target: PathBuf,
    pub(crate) read_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MountSource {
    /// references a top-level named volume declaration
    Named(String),
    /// a host path, possibly still containing `${VAR}` references
    Bind(String),
}

impl VolumeMount {
    pub(crate) fn rw(source: impl ToString, target: impl Into<PathBuf>) -> Self {
        Self { source: source.to_string(), target: target.into(), read_only: false }
    }

    pub(crate) fn source_kind(&self) -> MountSource {
        if self.source.starts_with('/')
            || self.source.starts_with('.')
            || self.source.starts_with('~')
            || self.source.contains("${")
        {
            MountSource::Bind(self.source.clone())
        } else {
            MountSource::Named(self.source.clone())
        }
    }

    /// Expands the source and namespaces named volumes under the project,
    /// yielding the `-v` argument for `docker run`.
    pub(crate) fn binding_arg(&self, project: &str) -> Result<String, Error> {
        let source = match self.source_kind() {
            MountSource::Named(name) => format!("{project}_{name}"),
            MountSource::Bind(raw) => expand_env(&raw)?,
        };
        let flags = if self.read_only { ":ro" } else { "" };
        Ok(format!("{}:{}{}", source, self.target.display(), flags))
    }

    /// The expanded host path, if this mount binds one.
    pub(crate) fn host_path(&self) -> Result<Option<PathBuf>, Error> {
        match self.source_kind() {
            MountSource::Bind(raw) => Ok(Some(PathBuf::from(expand_env(&raw)?))),
            MountSource::Named(_) => Ok(None),
        }
    }
}

impl TryFrom<String> for VolumeMount {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        let mut parts = s.split(':');
        let source = parts.next().filter(|p| !p.is_empty());
        let target = parts.next().filter(|p| !p.is_empty());
        let (source, target) = match (source, target) {
            (Some(source), Some(target)) => (source.to_string(), PathBuf::from(target)),
            _ => return Err(Error::BadSpec(format!("volume mount '{}'", s))),
        };
        let read_only = match parts.next() {
            None => false,
            Some("ro") => true,
            Some("rw") => false,
            Some(other) => {
                return Err(Error::BadSpec(format!("volume mount flag '{}' in '{}'", other, s)));
            }
        };
        if parts.next().is_some() {
            return Err(Error::BadSpec(format!("volume mount '{}'", s)));
        }
        Ok(Self { source, target, read_only })
    }
}

impl From<VolumeMount> for String {
    fn from(m: VolumeMount) -> String {
        let flags = if m.read_only { ":ro" } else { "" };
        format!("{}:{}{}", m.source, m.target.display(), flags)
    }
}

/// Substitutes every `${NAME}` in `raw` from the process environment. An
/// unset or empty variable is a deploy-time error, per the stack contract.
pub(crate) fn expand_env(raw: &str) -> Result<String, Error> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let end = tail
            .find('}')
            .ok_or_else(|| Error::BadSpec(format!("unclosed ${{ in '{}'", raw)))?;
        let var = &tail[..end];
        match std::env::var(var) {
            Ok(val) if !val.is_empty() => out.push_str(&val),
            _ => {
                return Err(Error::MissingEnv { var: var.to_string(), mount: raw.to_string() });
            }
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_target_and_flag() {
        let m: VolumeMount = "redisdata:/data".to_string().try_into().unwrap();
        assert_eq!(m, VolumeMount::rw("redisdata", "/data"));

        let m: VolumeMount = "/etc/secrets:/data/secrets:ro".to_string().try_into().unwrap();
        assert!(m.read_only);
        assert_eq!(m.target, PathBuf::from("/data/secrets"));
    }

    #[test]
    fn rejects_malformed_entries() {
        for bad in [":", "onlysource", "a:/b:zz", "a:/b:ro:extra", ":/target"] {
            assert!(VolumeMount::try_from(bad.to_string()).is_err(), "accepted '{}'", bad);
        }
    }

    #[test]
    fn classifies_named_vs_bind() {
        let named: VolumeMount = "redisdata:/data".to_string().try_into().unwrap();
        assert_eq!(named.source_kind(), MountSource::Named("redisdata".to_string()));

        for bind in ["/abs/path:/x", "./rel:/x", "${LOGS_MOUNT}:/x"] {
            let m: VolumeMount = bind.to_string().try_into().unwrap();
            assert!(matches!(m.source_kind(), MountSource::Bind(_)), "'{}' not a bind", bind);
        }
    }

    #[test]
    fn named_volumes_are_namespaced_by_project() {
        let m: VolumeMount = "redisdata:/data".to_string().try_into().unwrap();
        assert_eq!(m.binding_arg("dalgo").unwrap(), "dalgo_redisdata:/data");
    }

    #[test]
    fn expansion_fails_on_unset_var() {
        let m: VolumeMount = "${FLOTILLA_TEST_UNSET_VAR}:/x".to_string().try_into().unwrap();
        match m.binding_arg("p") {
            Err(Error::MissingEnv { var, .. }) => assert_eq!(var, "FLOTILLA_TEST_UNSET_VAR"),
            other => panic!("expected MissingEnv, got {:?}", other),
        }
    }

    #[test]
    fn expansion_substitutes_set_vars() {
        unsafe { std::env::set_var("FLOTILLA_TEST_MOUNT_VAR", "/srv/logs") };
        assert_eq!(expand_env("${FLOTILLA_TEST_MOUNT_VAR}/sub").unwrap(), "/srv/logs/sub");
    }
}
