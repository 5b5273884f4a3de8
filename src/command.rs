use serde::{Deserialize, Serialize};

/// A command line as it appears in the manifest: either a single string that
/// is split on whitespace, or an explicit argument list. Quoted arguments
/// need the list form.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub(crate) enum CommandLine {
    Line(String),
    Words(Vec<String>),
}

impl CommandLine {
    pub(crate) fn autosplit(line: impl ToString) -> Self {
        Self::Line(line.to_string())
    }

    pub(crate) fn words(&self) -> Vec<String> {
        match self {
            CommandLine::Line(line) => {
                line.split_whitespace().map(|arg| arg.to_string()).collect()
            }
            CommandLine::Words(words) => words.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_is_split_on_whitespace() {
        let cmd = CommandLine::autosplit("celery -A ddpui worker -n ddpui");
        assert_eq!(cmd.words(), vec!["celery", "-A", "ddpui", "worker", "-n", "ddpui"]);
    }

    #[test]
    fn list_form_is_kept_verbatim() {
        let cmd: CommandLine = serde_yaml::from_str("[\"sh\", \"-c\", \"echo a b\"]").unwrap();
        assert_eq!(cmd.words(), vec!["sh", "-c", "echo a b"]);
    }

    #[test]
    fn string_form_deserializes_as_line() {
        let cmd: CommandLine = serde_yaml::from_str("redis-cli ping").unwrap();
        assert_eq!(cmd, CommandLine::Line("redis-cli ping".to_string()));
    }
}
