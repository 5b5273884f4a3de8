use std::fmt::Display;
use std::path::PathBuf;

#[derive(Debug)]
pub(crate) enum Error {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Json(serde_json::Error),
    /// malformed `source:target` mount or `host:container` port string
    BadSpec(String),
    /// an env var referenced by a bind mount is unset at deploy time
    MissingEnv { var: String, mount: String },
    MissingHostPath { service: String, path: PathBuf },
    MissingEnvFile { service: String, path: PathBuf },
    Validation(Vec<String>),
    DependencyCycle(Vec<String>),
    UnknownService(String),
    Docker { scope: String, detail: String },
    NotReady { service: String, attempts: u32 },
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Yaml(e) => write!(f, "manifest error: {}", e),
            Error::Json(e) => write!(f, "docker output error: {}", e),
            Error::BadSpec(s) => write!(f, "malformed entry: {}", s),
            Error::MissingEnv { var, mount } => {
                write!(f, "mount {}: environment variable {} is not set", mount, var)
            }
            Error::MissingHostPath { service, path } => {
                write!(f, "{}: host path {} does not exist", service, path.display())
            }
            Error::MissingEnvFile { service, path } => {
                write!(f, "{}: env file {} does not exist", service, path.display())
            }
            Error::Validation(problems) => {
                write!(f, "manifest is invalid:")?;
                for p in problems {
                    write!(f, "\n  - {}", p)?;
                }
                Ok(())
            }
            Error::DependencyCycle(names) => {
                write!(f, "dependency cycle involving: {}", names.join(", "))
            }
            Error::UnknownService(name) => write!(f, "unknown service: {}", name),
            Error::Docker { scope, detail } => write!(f, "{}: docker failed: {}", scope, detail),
            Error::NotReady { service, attempts } => {
                write!(f, "{}: not ready after {} probe attempts", service, attempts)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Yaml(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}
