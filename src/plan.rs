use std::collections::{BTreeMap, BTreeSet};

use crate::error::Error;
use crate::stack::Stack;

/// Services grouped into start waves: everything in wave N depends only on
/// services in earlier waves, so a wave may start once all earlier waves are
/// ready. Names within a wave are sorted and mutually independent.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StartPlan {
    pub(crate) waves: Vec<Vec<String>>,
}

impl StartPlan {
    /// Flat reverse order, for stopping dependents before their dependencies.
    pub(crate) fn shutdown_order(&self) -> Vec<&str> {
        self.waves.iter().rev().flat_map(|wave| wave.iter().rev()).map(|s| s.as_str()).collect()
    }
}

/// Kahn-style layering of the `depends_on` graph.
pub(crate) fn start_order(stack: &Stack) -> Result<StartPlan, Error> {
    let mut remaining: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (name, service) in &stack.services {
        let mut deps = BTreeSet::new();
        for dep in &service.depends_on {
            if !stack.services.contains_key(dep) {
                return Err(Error::UnknownService(dep.clone()));
            }
            deps.insert(dep.as_str());
        }
        remaining.insert(name.as_str(), deps);
    }

    let mut waves = Vec::new();
    while !remaining.is_empty() {
        let ready: Vec<String> = remaining
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| name.to_string())
            .collect();
        if ready.is_empty() {
            let stuck: Vec<String> = remaining.keys().map(|k| k.to_string()).collect();
            return Err(Error::DependencyCycle(stuck));
        }
        for name in &ready {
            remaining.remove(name.as_str());
        }
        for deps in remaining.values_mut() {
            for name in &ready {
                deps.remove(name.as_str());
            }
        }
        waves.push(ready);
    }

    Ok(StartPlan { waves })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Service;

    #[test]
    fn builtin_waves_leave_cache_first_and_consumers_last() {
        let plan = start_order(&Stack::builtin()).unwrap();
        assert_eq!(
            plan.waves,
            vec![
                vec!["redis_server".to_string()],
                vec!["backend".to_string()],
                vec!["celery_beat".to_string(), "celery_worker".to_string()],
            ]
        );
    }

    #[test]
    fn shutdown_order_reverses_the_waves() {
        let plan = start_order(&Stack::builtin()).unwrap();
        assert_eq!(
            plan.shutdown_order(),
            vec!["celery_worker", "celery_beat", "backend", "redis_server"]
        );
    }

    #[test]
    fn cycle_is_an_error() {
        let mut stack = Stack::builtin();
        stack.services.get_mut("redis_server").unwrap().depends_on =
            vec!["celery_worker".to_string()];
        match start_order(&stack) {
            Err(Error::DependencyCycle(stuck)) => {
                assert!(stuck.contains(&"redis_server".to_string()));
                assert!(stuck.contains(&"celery_worker".to_string()));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn unknown_dependency_is_an_error() {
        let mut stack = Stack::builtin();
        stack.services.get_mut("backend").unwrap().depends_on = vec!["ghost".to_string()];
        match start_order(&stack) {
            Err(Error::UnknownService(name)) => assert_eq!(name, "ghost"),
            other => panic!("expected unknown service, got {:?}", other),
        }
    }

    #[test]
    fn independent_services_share_a_wave() {
        let mut stack = Stack::builtin();
        for svc in stack.services.values_mut() {
            svc.depends_on.clear();
        }
        stack.services.insert("extra".to_string(), Service::new("busybox"));
        let plan = start_order(&stack).unwrap();
        assert_eq!(plan.waves.len(), 1);
        assert_eq!(plan.waves[0].len(), 5);
    }
}
