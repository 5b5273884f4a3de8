use crate::error::Error;
use crate::mount::MountSource;
use crate::stack::Stack;

/// Structural checks on a parsed manifest: named volumes must be declared
/// top-level, every service must join a declared network to be reachable by
/// peers, and dependencies must name sibling services. Environment and host
/// path resolution are deliberately not checked here; those are deploy-time
/// concerns.
pub(crate) fn validate(stack: &Stack) -> Result<(), Error> {
    let mut problems = Vec::new();

    for (name, service) in &stack.services {
        for mount in &service.volumes {
            if let MountSource::Named(volume) = mount.source_kind() {
                if !stack.volumes.contains_key(&volume) {
                    problems.push(format!("{}: named volume '{}' is not declared", name, volume));
                }
            }
        }

        if service.networks.is_empty() {
            problems.push(format!("{}: joins no network, peers cannot reach it", name));
        }
        for network in &service.networks {
            if !stack.networks.contains_key(network) {
                problems.push(format!("{}: network '{}' is not declared", name, network));
            }
        }

        for dep in &service.depends_on {
            if dep == name {
                problems.push(format!("{}: depends on itself", name));
            } else if !stack.services.contains_key(dep) {
                problems.push(format!("{}: depends on undeclared service '{}'", name, dep));
            }
        }
    }

    if problems.is_empty() { Ok(()) } else { Err(Error::Validation(problems)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problems(stack: &Stack) -> Vec<String> {
        match validate(stack) {
            Ok(()) => Vec::new(),
            Err(Error::Validation(problems)) => problems,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn builtin_stack_is_valid() {
        assert!(validate(&Stack::builtin()).is_ok());
    }

    #[test]
    fn undeclared_volume_is_reported() {
        let mut stack = Stack::builtin();
        stack.volumes.remove("redisdata");
        let found = problems(&stack);
        assert_eq!(found, vec!["redis_server: named volume 'redisdata' is not declared"]);
    }

    #[test]
    fn bind_mounts_need_no_declaration() {
        // the ${...} bind mounts reference no named volume
        let stack = Stack::builtin();
        assert!(!stack.volumes.contains_key("CLIENTS_DBT_MOUNT"));
        assert!(validate(&stack).is_ok());
    }

    #[test]
    fn networkless_service_is_reported() {
        let mut stack = Stack::builtin();
        stack.services.get_mut("celery_worker").unwrap().networks.clear();
        let found = problems(&stack);
        assert_eq!(found, vec!["celery_worker: joins no network, peers cannot reach it"]);
    }

    #[test]
    fn undeclared_network_is_reported() {
        let mut stack = Stack::builtin();
        stack.services.get_mut("backend").unwrap().networks = vec!["phantom".to_string()];
        let found = problems(&stack);
        assert_eq!(found, vec!["backend: network 'phantom' is not declared"]);
    }

    #[test]
    fn dangling_and_self_dependencies_are_reported() {
        let mut stack = Stack::builtin();
        let beat = stack.services.get_mut("celery_beat").unwrap();
        beat.depends_on = vec!["celery_beat".to_string(), "ghost".to_string()];
        let found = problems(&stack);
        assert_eq!(
            found,
            vec![
                "celery_beat: depends on itself",
                "celery_beat: depends on undeclared service 'ghost'",
            ]
        );
    }
}
